//! The two signed tokens the protocol exchanges, as named-field values.
//!
//! Field *order* on the wire is fixed by the protocol schema; only the
//! in-memory representation is structural. Decoding never fails: missing
//! trailing fields decode as empty strings, exactly as a positional reader
//! of the raw field list would see them.

use serde::Serialize;

use crate::codec;
use crate::crypto;

/// A `WLS-Response` authentication assertion from the Web Login Service.
///
/// Fourteen ordered fields. The trailing two (`kid`, `sig`) authenticate
/// the rest: the RSA signature covers every preceding field joined with
/// `!`, captured verbatim in [`signed_data`](Self::signed_data) at decode
/// time so that any extra fields an upgraded WLS might append stay inside
/// the signed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WlsResponse {
    /// Protocol version ("3").
    pub ver: String,
    /// Status code reported by the WLS.
    pub status: String,
    /// Optional status message from the WLS.
    pub msg: String,
    /// Issue time, Raven timestamp format.
    pub issue: String,
    /// WLS-assigned assertion identifier.
    pub id: String,
    /// URL the assertion was issued for.
    pub url: String,
    /// Authenticated principal.
    pub principal: String,
    /// Principal tags.
    pub ptags: String,
    /// Authentication method used for this assertion.
    pub auth: String,
    /// Previous SSO methods contributing to this assertion.
    pub sso: String,
    /// Session lifetime hint in seconds (may be empty).
    pub life: String,
    /// Opaque data passed through from the request.
    pub params: String,
    /// Identifier of the WLS key that produced `sig`.
    pub kid: String,
    /// Detached signature, transport-encoded.
    pub sig: String,
    #[serde(skip)]
    signed_data: String,
}

impl WlsResponse {
    /// Decode a raw (already URL-decoded) `WLS-Response` value.
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        let fields = codec::split_fields(raw);
        let n = fields.len();
        let (body, kid, sig) = if n >= 2 {
            (&fields[..n - 2], fields[n - 2].clone(), fields[n - 1].clone())
        } else {
            (&fields[..], String::new(), String::new())
        };
        let signed_data = codec::join_fields(body);
        let field = |i: usize| body.get(i).cloned().unwrap_or_default();

        Self {
            ver: field(0),
            status: field(1),
            msg: field(2),
            issue: field(3),
            id: field(4),
            url: field(5),
            principal: field(6),
            ptags: field(7),
            auth: field(8),
            sso: field(9),
            life: field(10),
            params: field(11),
            kid,
            sig,
            signed_data,
        }
    }

    /// The exact byte sequence covered by [`sig`](Self::sig): every field
    /// before `kid`, joined with `!`.
    #[must_use]
    pub fn signed_data(&self) -> &str {
        &self.signed_data
    }
}

/// The locally issued session ticket, persisted as a signed cookie value.
///
/// Twelve ordered fields; the trailing field is an HMAC-SHA1 signature
/// over fields 0..=10 joined with `!`, keyed with the configured cookie
/// key.
///
/// Serialization is one-way application output; only values produced by
/// [`decode`](Self::decode) carry the signed prefix that
/// [`verify`](Self::verify) checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionTicket {
    /// Ticket format version ("3").
    pub ver: String,
    /// Status recorded at issue time.
    pub status: String,
    /// Message recorded at issue time.
    pub msg: String,
    /// Issue time, Raven timestamp format.
    pub issue: String,
    /// Expiry time, Raven timestamp format.
    pub expire: String,
    /// Assertion identifier this ticket was derived from.
    pub id: String,
    /// Authenticated principal.
    pub principal: String,
    /// Principal tags.
    pub ptags: String,
    /// Authentication method.
    pub auth: String,
    /// SSO methods.
    pub sso: String,
    /// Opaque pass-through data.
    pub params: String,
    /// HMAC signature, double-encoded (hex, then transport base64).
    pub sig: String,
    #[serde(skip)]
    signed_data: String,
}

impl SessionTicket {
    /// Build an unsigned ticket from an accepted WLS assertion and the
    /// locally computed issue/expiry times.
    #[must_use]
    pub fn from_response(response: &WlsResponse, issue: &str, expire: &str) -> Self {
        Self {
            ver: crate::agent::PROTOCOL_VERSION.to_owned(),
            status: crate::status::SUCCESS.to_string(),
            msg: String::new(),
            issue: issue.to_owned(),
            expire: expire.to_owned(),
            id: response.id.clone(),
            principal: response.principal.clone(),
            ptags: response.ptags.clone(),
            auth: response.auth.clone(),
            sso: response.sso.clone(),
            params: response.params.clone(),
            sig: String::new(),
            signed_data: String::new(),
        }
    }

    /// Decode a raw (already URL-decoded) cookie value.
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        let fields = codec::split_fields(raw);
        let n = fields.len();
        let (body, sig) = if n >= 1 {
            (&fields[..n - 1], fields[n - 1].clone())
        } else {
            (&fields[..], String::new())
        };
        let signed_data = codec::join_fields(body);
        let field = |i: usize| body.get(i).cloned().unwrap_or_default();

        Self {
            ver: field(0),
            status: field(1),
            msg: field(2),
            issue: field(3),
            expire: field(4),
            id: field(5),
            principal: field(6),
            ptags: field(7),
            auth: field(8),
            sso: field(9),
            params: field(10),
            sig,
            signed_data,
        }
    }

    /// Serialize the ticket and append a fresh HMAC signature keyed with
    /// `cookie_key`.
    #[must_use]
    pub fn encode_signed(&self, cookie_key: &str) -> String {
        let body = codec::join_fields([
            &self.ver,
            &self.status,
            &self.msg,
            &self.issue,
            &self.expire,
            &self.id,
            &self.principal,
            &self.ptags,
            &self.auth,
            &self.sso,
            &self.params,
        ]);
        let sig = crypto::hmac_sha1(cookie_key, &body);
        format!("{body}!{sig}")
    }

    /// Check the trailing signature against the signed prefix captured at
    /// decode time.
    #[must_use]
    pub fn verify(&self, cookie_key: &str) -> bool {
        crypto::hmac_sha1_verify(cookie_key, &self.signed_data, &self.sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RESPONSE: &str = "3!200!!20240102T030405Z!1391074198-26597-16!https://www.example.ac.uk/secret/!spqr1!current!pwd!!36000!opaque!901!c2lnbmF0dXJl";

    #[test]
    fn decode_wls_response_named_fields() {
        let response = WlsResponse::decode(SAMPLE_RESPONSE);
        assert_eq!(response.ver, "3");
        assert_eq!(response.status, "200");
        assert_eq!(response.msg, "");
        assert_eq!(response.issue, "20240102T030405Z");
        assert_eq!(response.id, "1391074198-26597-16");
        assert_eq!(response.url, "https://www.example.ac.uk/secret/");
        assert_eq!(response.principal, "spqr1");
        assert_eq!(response.ptags, "current");
        assert_eq!(response.auth, "pwd");
        assert_eq!(response.sso, "");
        assert_eq!(response.life, "36000");
        assert_eq!(response.params, "opaque");
        assert_eq!(response.kid, "901");
        assert_eq!(response.sig, "c2lnbmF0dXJl");
    }

    #[test]
    fn signed_data_excludes_kid_and_sig() {
        let response = WlsResponse::decode(SAMPLE_RESPONSE);
        assert_eq!(
            response.signed_data(),
            "3!200!!20240102T030405Z!1391074198-26597-16!https://www.example.ac.uk/secret/!spqr1!current!pwd!!36000!opaque"
        );
    }

    #[test]
    fn extra_fields_stay_in_signed_data() {
        // A future protocol revision may append fields before kid/sig; the
        // signature still covers them.
        let raw = "3!200!!t!id!url!p!pt!pwd!!0!par!extra!901!sig";
        let response = WlsResponse::decode(raw);
        assert_eq!(response.kid, "901");
        assert_eq!(response.sig, "sig");
        assert!(response.signed_data().ends_with("!extra"));
    }

    #[test]
    fn short_response_decodes_to_empty_fields() {
        let response = WlsResponse::decode("3!410");
        assert_eq!(response.kid, "3");
        assert_eq!(response.sig, "410");
        assert_eq!(response.ver, "");
        assert_eq!(response.principal, "");
    }

    #[test]
    fn ticket_sign_verify_roundtrip() {
        let response = WlsResponse::decode(SAMPLE_RESPONSE);
        let ticket =
            SessionTicket::from_response(&response, "20240102T030405Z", "20240102T050405Z");
        let cookie = ticket.encode_signed("secret key");

        let parsed = SessionTicket::decode(&cookie);
        assert!(parsed.verify("secret key"));
        assert_eq!(parsed.ver, "3");
        assert_eq!(parsed.status, "200");
        assert_eq!(parsed.principal, "spqr1");
        assert_eq!(parsed.expire, "20240102T050405Z");
        assert_eq!(parsed.params, "opaque");
    }

    #[test]
    fn ticket_rejects_wrong_key() {
        let response = WlsResponse::decode(SAMPLE_RESPONSE);
        let ticket = SessionTicket::from_response(&response, "a", "b");
        let cookie = ticket.encode_signed("secret key");
        assert!(!SessionTicket::decode(&cookie).verify("other key"));
    }

    #[test]
    fn ticket_rejects_tampered_field() {
        let response = WlsResponse::decode(SAMPLE_RESPONSE);
        let ticket = SessionTicket::from_response(&response, "a", "b");
        let cookie = ticket.encode_signed("secret key");
        let tampered = cookie.replace("spqr1", "mallory");
        assert!(!SessionTicket::decode(&tampered).verify("secret key"));
    }

    #[test]
    fn tickets_serialize_without_the_signed_prefix() {
        let response = WlsResponse::decode(SAMPLE_RESPONSE);
        let ticket = SessionTicket::from_response(&response, "a", "b");
        let json = serde_json::to_value(&ticket).unwrap();
        assert!(json.get("signed_data").is_none());
        assert_eq!(json["principal"], "spqr1");
    }

    #[test]
    fn absent_fields_keep_delimiter_positions() {
        let response = WlsResponse::decode(SAMPLE_RESPONSE);
        let mut ticket = SessionTicket::from_response(&response, "a", "b");
        ticket.sso = String::new();
        ticket.params = String::new();
        let cookie = ticket.encode_signed("k");
        // 12 fields means 11 delimiters regardless of empty values
        assert_eq!(cookie.matches('!').count(), 11);
    }
}
