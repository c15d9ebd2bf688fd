//! Protocol status codes.
//!
//! Codes below 600 originate from the WLS and are defined by the Raven v3
//! specification. Codes 600 and up are synthesized locally by the agent and
//! never appear on the wire from the WLS.

/// Successful authentication.
pub const SUCCESS: u16 = 200;
/// The user cancelled the authentication request.
pub const CANCELLED: u16 = 410;
/// No mutually acceptable authentication types available.
pub const NO_COMMON_AUTH_TYPES: u16 = 510;
/// Unsupported protocol version.
pub const UNSUPPORTED_VERSION: u16 = 520;
/// General request parameter error.
pub const REQUEST_PARAM_ERROR: u16 = 530;
/// Interaction would be required but `iact=no` was requested.
pub const INTERACTION_REQUIRED: u16 = 540;
/// The WAA is not authorised to use the WLS.
pub const WAA_NOT_AUTHORISED: u16 = 560;
/// Authentication declined.
pub const AUTH_DECLINED: u16 = 570;
/// Local processing, configuration or signature error.
pub const LOCAL_ERROR: u16 = 600;
/// The browser did not return the pre-session cookie.
pub const COOKIE_REJECTED: u16 = 610;

/// Human-readable description for a status code, if it is one of the fixed
/// set the protocol defines.
#[must_use]
pub fn description(code: u16) -> Option<&'static str> {
    match code {
        SUCCESS => Some("Successful authentication"),
        CANCELLED => Some("The user cancelled the authentication request"),
        NO_COMMON_AUTH_TYPES => Some("No mutually acceptable authentication types available"),
        UNSUPPORTED_VERSION => Some("Unsupported protocol version"),
        REQUEST_PARAM_ERROR => Some("General request parameter error"),
        INTERACTION_REQUIRED => Some("Interaction would be required"),
        WAA_NOT_AUTHORISED => Some("WAA not authorised"),
        AUTH_DECLINED => Some("Authentication declined"),
        LOCAL_ERROR => Some("Authentication agent processing error"),
        COOKIE_REJECTED => Some("Browser is not accepting session cookie"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_codes_have_descriptions() {
        for code in [200, 410, 510, 520, 530, 540, 560, 570] {
            assert!(description(code).is_some(), "missing description for {code}");
        }
    }

    #[test]
    fn cancelled_matches_protocol_text() {
        assert_eq!(
            description(CANCELLED),
            Some("The user cancelled the authentication request")
        );
    }

    #[test]
    fn unknown_code_has_no_description() {
        assert_eq!(description(999), None);
        assert_eq!(description(0), None);
    }
}
