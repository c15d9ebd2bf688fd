//! Validation of a decoded `WLS-Response` assertion.
//!
//! A pure function over the assertion, the configuration, the current time
//! and the canonical request URL. Checks run in protocol order and each
//! rejection short-circuits, including the timing and URL checks (the
//! reference agents kept populating session state after those failed; here
//! every failed check ends the attempt, see `validator_rejections_carry_no_session`
//! in the agent tests).

use crate::config::Config;
use crate::crypto::WlsSignatureVerifier;
use crate::status;
use crate::timestamp;
use crate::token::WlsResponse;

/// Why an assertion was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The user cancelled at the WLS (provider status 410).
    Cancelled,
    /// The assertion's protocol version is not the supported one.
    WrongVersion,
    /// The WLS reported a non-success status.
    ProviderError {
        /// Provider status code.
        status: u16,
        /// Table description plus any message the WLS attached.
        message: String,
    },
    /// The signature did not verify. Terminates the whole authentication
    /// attempt; see [`Rejection::is_hard_stop`].
    InvalidSignature,
    /// The issue time field could not be parsed.
    UnreadableIssueTime,
    /// Issued later than now plus the allowed clock skew.
    IssuedInFuture {
        /// The assertion's raw issue field.
        issue: String,
    },
    /// Issued longer ago than the response timeout allows.
    Stale {
        /// The assertion's raw issue field.
        issue: String,
    },
    /// The assertion's declared URL does not match the current request URL.
    UrlMismatch {
        /// URL declared in the assertion (query stripped).
        response_url: String,
        /// Canonical URL of the current request (query stripped).
        current_url: String,
    },
}

impl Rejection {
    /// The status code this rejection surfaces as.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Cancelled => status::CANCELLED,
            Self::ProviderError { status, .. } => *status,
            _ => status::LOCAL_ERROR,
        }
    }

    /// Human-readable failure message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Cancelled => status::description(status::CANCELLED)
                .unwrap_or_default()
                .to_owned(),
            Self::WrongVersion => {
                "Wrong protocol version in authentication service reply".to_owned()
            }
            Self::ProviderError { message, .. } => message.clone(),
            Self::InvalidSignature => "Invalid WLS response signature".to_owned(),
            Self::UnreadableIssueTime => {
                "Unable to read issue time in authentication service reply".to_owned()
            }
            Self::IssuedInFuture { issue } => {
                format!("Authentication service reply apparently issued in the future: {issue}")
            }
            Self::Stale { issue } => {
                format!("Stale authentication service reply issued at {issue}")
            }
            Self::UrlMismatch {
                response_url,
                current_url,
            } => format!(
                "URL in response ticket doesn't match this URL: {response_url} != {current_url}"
            ),
        }
    }

    /// A hard stop terminates the authentication attempt outright instead
    /// of merely classifying the assertion (only signature failure).
    #[must_use]
    pub fn is_hard_stop(&self) -> bool {
        matches!(self, Self::InvalidSignature)
    }
}

/// Validate `response` against the configuration, the clock and the
/// canonical URL of the current request.
pub fn validate_response(
    response: &WlsResponse,
    config: &Config,
    verifier: &impl WlsSignatureVerifier,
    now: i64,
    current_url: &str,
) -> Result<(), Rejection> {
    if response.status == status::CANCELLED.to_string() {
        return Err(Rejection::Cancelled);
    }

    if response.ver != crate::agent::PROTOCOL_VERSION {
        return Err(Rejection::WrongVersion);
    }

    if response.status != status::SUCCESS.to_string() {
        let code: u16 = response.status.parse().unwrap_or(status::LOCAL_ERROR);
        let mut message = status::description(code)
            .unwrap_or("Unknown authentication status")
            .to_owned();
        if !response.msg.is_empty() {
            message.push_str(&response.msg);
        }
        return Err(Rejection::ProviderError {
            status: code,
            message,
        });
    }

    if !verifier.verify(response.signed_data(), &response.sig, &response.kid) {
        return Err(Rejection::InvalidSignature);
    }

    let issue = timestamp::decode(&response.issue);
    if issue == 0 {
        return Err(Rejection::UnreadableIssueTime);
    }
    if issue > now + config.clock_skew + 1 {
        return Err(Rejection::IssuedInFuture {
            issue: response.issue.clone(),
        });
    }
    if now - config.clock_skew - 1 > issue + config.response_timeout {
        return Err(Rejection::Stale {
            issue: response.issue.clone(),
        });
    }

    let response_url = strip_query(&response.url);
    let current = strip_query(current_url);
    if response_url != current {
        return Err(Rejection::UrlMismatch {
            response_url: response_url.to_owned(),
            current_url: current.to_owned(),
        });
    }

    Ok(())
}

/// Session lifetime in seconds: the configured maximum, shortened by the
/// WLS's lifetime hint when that parses to a positive number.
#[must_use]
pub fn session_lifetime(config: &Config, life_hint: &str) -> i64 {
    let mut expiry = config.max_session_life;
    if let Ok(hint) = life_hint.parse::<i64>() {
        if hint > 0 && hint < expiry {
            expiry = hint;
        }
    }
    expiry
}

fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    const CURRENT_URL: &str = "https://www.example.ac.uk/secret/";

    struct StaticVerifier(bool);

    impl WlsSignatureVerifier for StaticVerifier {
        fn verify(&self, _signed_data: &str, _sig: &str, _key_id: &str) -> bool {
            self.0
        }
    }

    fn response(status: &str, issue: i64, url: &str) -> WlsResponse {
        let raw = codec::join_fields([
            "3",
            status,
            "",
            &timestamp::encode(issue),
            "1391074198-26597-16",
            url,
            "spqr1",
            "current",
            "pwd",
            "",
            "36000",
            "",
            "901",
            "sig",
        ]);
        WlsResponse::decode(&raw)
    }

    fn config() -> Config {
        Config::new("www.example.ac.uk").with_cookie_key("secret")
    }

    fn now() -> i64 {
        1_704_164_645
    }

    #[test]
    fn accepts_valid_response() {
        let result = validate_response(
            &response("200", now(), CURRENT_URL),
            &config(),
            &StaticVerifier(true),
            now(),
            CURRENT_URL,
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn cancelled_wins_over_everything() {
        // Even an unverifiable cancellation is reported as cancelled.
        let rejection = validate_response(
            &response("410", now(), CURRENT_URL),
            &config(),
            &StaticVerifier(false),
            now(),
            CURRENT_URL,
        )
        .unwrap_err();
        assert_eq!(rejection, Rejection::Cancelled);
        assert_eq!(rejection.status(), 410);
        assert_eq!(
            rejection.message(),
            "The user cancelled the authentication request"
        );
    }

    #[test]
    fn rejects_wrong_version() {
        let mut r = response("200", now(), CURRENT_URL);
        r.ver = "2".into();
        let rejection = validate_response(&r, &config(), &StaticVerifier(true), now(), CURRENT_URL)
            .unwrap_err();
        assert_eq!(rejection, Rejection::WrongVersion);
        assert_eq!(rejection.status(), 600);
    }

    #[test]
    fn provider_error_carries_table_description_and_message() {
        let mut r = response("570", now(), CURRENT_URL);
        r.msg = " (token login disabled)".into();
        let rejection = validate_response(&r, &config(), &StaticVerifier(true), now(), CURRENT_URL)
            .unwrap_err();
        assert_eq!(rejection.status(), 570);
        assert_eq!(
            rejection.message(),
            "Authentication declined (token login disabled)"
        );
        assert!(!rejection.is_hard_stop());
    }

    #[test]
    fn bad_signature_is_a_hard_stop() {
        let rejection = validate_response(
            &response("200", now(), CURRENT_URL),
            &config(),
            &StaticVerifier(false),
            now(),
            CURRENT_URL,
        )
        .unwrap_err();
        assert_eq!(rejection, Rejection::InvalidSignature);
        assert_eq!(rejection.status(), 600);
        assert!(rejection.is_hard_stop());
    }

    #[test]
    fn rejects_unreadable_issue_time() {
        let mut r = response("200", now(), CURRENT_URL);
        r.issue = "yesterday-ish".into();
        let rejection = validate_response(&r, &config(), &StaticVerifier(true), now(), CURRENT_URL)
            .unwrap_err();
        assert_eq!(rejection, Rejection::UnreadableIssueTime);
    }

    #[test]
    fn clock_skew_boundary() {
        let cfg = config();
        // issue = now + skew + 2 -> future-issued
        let rejection = validate_response(
            &response("200", now() + cfg.clock_skew + 2, CURRENT_URL),
            &cfg,
            &StaticVerifier(true),
            now(),
            CURRENT_URL,
        )
        .unwrap_err();
        assert!(matches!(rejection, Rejection::IssuedInFuture { .. }));

        // issue = now + skew -> still acceptable
        assert_eq!(
            validate_response(
                &response("200", now() + cfg.clock_skew, CURRENT_URL),
                &cfg,
                &StaticVerifier(true),
                now(),
                CURRENT_URL,
            ),
            Ok(())
        );
    }

    #[test]
    fn stale_response_rejected() {
        let cfg = config();
        let issue = now() - cfg.response_timeout - cfg.clock_skew - 10;
        let rejection = validate_response(
            &response("200", issue, CURRENT_URL),
            &cfg,
            &StaticVerifier(true),
            now(),
            CURRENT_URL,
        )
        .unwrap_err();
        assert!(matches!(rejection, Rejection::Stale { .. }));
    }

    #[test]
    fn url_mismatch_rejected_with_queries_stripped() {
        let rejection = validate_response(
            &response("200", now(), "https://evil.example.org/secret/"),
            &config(),
            &StaticVerifier(true),
            now(),
            &format!("{CURRENT_URL}?WLS-Response=abc"),
        )
        .unwrap_err();
        assert!(matches!(rejection, Rejection::UrlMismatch { .. }));

        // Same URL modulo query components is a match.
        assert_eq!(
            validate_response(
                &response("200", now(), &format!("{CURRENT_URL}?a=b")),
                &config(),
                &StaticVerifier(true),
                now(),
                &format!("{CURRENT_URL}?WLS-Response=abc"),
            ),
            Ok(())
        );
    }

    #[test]
    fn session_lifetime_is_min_of_config_and_hint() {
        let cfg = config(); // max 7200
        assert_eq!(session_lifetime(&cfg, "3600"), 3600);
        assert_eq!(session_lifetime(&cfg, "36000"), 7200);
        assert_eq!(session_lifetime(&cfg, ""), 7200);
        assert_eq!(session_lifetime(&cfg, "0"), 7200);
        assert_eq!(session_lifetime(&cfg, "-5"), 7200);
        assert_eq!(session_lifetime(&cfg, "soon"), 7200);
    }
}
