//! Wire codecs shared by the WLS response and the session cookie.
//!
//! Both tokens are `!`-delimited field lists. Field positions are fixed by
//! the protocol schema: an absent field is encoded as an empty segment, so
//! the delimiter count is invariant. There is no escaping; a `!` inside a
//! field value corrupts the token. That is a protocol limitation, not
//! something this codec attempts to repair.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Split a raw token into its ordered fields.
///
/// Does not validate arity; callers index by schema position.
#[must_use]
pub fn split_fields(raw: &str) -> Vec<String> {
    raw.split('!').map(str::to_owned).collect()
}

/// Join ordered fields into a raw token. Exact inverse of [`split_fields`]
/// for any fields that contain no `!`.
#[must_use]
pub fn join_fields<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push('!');
        }
        out.push_str(field.as_ref());
    }
    out
}

/// Encode bytes in the WLS transport alphabet: standard base64 with
/// `+` -> `-`, `/` -> `.` and `=` -> `_`, so the result survives URLs and
/// cookie values unescaped.
#[must_use]
pub fn transport_encode(bytes: &[u8]) -> String {
    STANDARD
        .encode(bytes)
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '.',
            '=' => '_',
            other => other,
        })
        .collect()
}

/// Decode a string in the WLS transport alphabet back to bytes.
pub fn transport_decode(raw: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let standard: String = raw
        .chars()
        .map(|c| match c {
            '-' => '+',
            '.' => '/',
            '_' => '=',
            other => other,
        })
        .collect();
    STANDARD.decode(standard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_join_roundtrip() {
        let fields = vec!["3", "200", "", "20240102T030405Z", "id", "value"];
        let raw = join_fields(&fields);
        assert_eq!(raw, "3!200!!20240102T030405Z!id!value");
        assert_eq!(split_fields(&raw), fields);
    }

    #[test]
    fn empty_fields_keep_their_positions() {
        let raw = "a!!!d";
        let fields = split_fields(raw);
        assert_eq!(fields, vec!["a", "", "", "d"]);
        assert_eq!(join_fields(&fields), raw);
    }

    #[test]
    fn single_field() {
        assert_eq!(split_fields("only"), vec!["only"]);
        assert_eq!(join_fields(["only"]), "only");
    }

    #[test]
    fn empty_string_is_one_empty_field() {
        assert_eq!(split_fields(""), vec![""]);
        assert_eq!(join_fields([""]), "");
    }

    #[test]
    fn transport_substitutes_base64_specials() {
        // base64("Test") == "VGVzdA==", padding becomes underscores
        assert_eq!(transport_encode(b"Test"), "VGVzdA__");
        assert_eq!(transport_decode("VGVzdA__").unwrap(), b"Test");
    }

    #[test]
    fn transport_roundtrip() {
        let data: Vec<u8> = (0..=255).collect();
        let encoded = transport_encode(&data);
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
        assert_eq!(transport_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn transport_decode_rejects_garbage() {
        assert!(transport_decode("!!not base64!!").is_err());
    }
}
