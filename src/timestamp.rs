//! Raven timestamp codec.
//!
//! The protocol carries times as a fixed 16-character UTC string,
//! `YYYYMMDDThhmmssZ` (a compressed RFC 3339 profile). Parsing is
//! positional: calendar fields at offsets 0/4/6, clock fields at 9/11/13.

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

/// Format a Unix timestamp (seconds) as a Raven protocol time string.
#[must_use]
pub fn encode(epoch_seconds: i64) -> String {
    let dt = OffsetDateTime::from_unix_timestamp(epoch_seconds)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    )
}

/// Parse a Raven protocol time string into a Unix timestamp (seconds).
///
/// Returns `0` if the string cannot be parsed. `0` is a sentinel, not a
/// real time: callers must treat it as "unreadable" and reject the value
/// carrying it. (Inherited from the protocol's reference agents, which
/// return 0 rather than distinguishing parse failures.)
#[must_use]
pub fn decode(raw: &str) -> i64 {
    try_decode(raw).unwrap_or(0)
}

fn try_decode(raw: &str) -> Option<i64> {
    let year: i32 = raw.get(0..4)?.parse().ok()?;
    let month: u8 = raw.get(4..6)?.parse().ok()?;
    let day: u8 = raw.get(6..8)?.parse().ok()?;
    let hour: u8 = raw.get(9..11)?.parse().ok()?;
    let minute: u8 = raw.get(11..13)?.parse().ok()?;
    let second: u8 = raw.get(13..15)?.parse().ok()?;

    let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
    let time = Time::from_hms(hour, minute, second).ok()?;

    Some(PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_epoch() {
        assert_eq!(encode(0), "19700101T000000Z");
    }

    #[test]
    fn encode_known_instant() {
        // 2024-01-02 03:04:05 UTC
        assert_eq!(encode(1_704_164_645), "20240102T030405Z");
    }

    #[test]
    fn encode_is_sixteen_chars() {
        assert_eq!(encode(0).len(), 16);
        assert_eq!(encode(1_704_164_645).len(), 16);
    }

    #[test]
    fn roundtrip() {
        for t in [0, 1, 946_684_800, 1_704_164_645, 4_102_444_799] {
            assert_eq!(decode(&encode(t)), t, "roundtrip failed for {t}");
        }
    }

    #[test]
    fn decode_known_instant() {
        assert_eq!(decode("20240102T030405Z"), 1_704_164_645);
    }

    #[test]
    fn decode_garbage_returns_sentinel() {
        assert_eq!(decode(""), 0);
        assert_eq!(decode("not a time"), 0);
        assert_eq!(decode("2024010"), 0);
        assert_eq!(decode("20241302T030405Z"), 0); // month 13
        assert_eq!(decode("20240132T030405Z"), 0); // day 32
        assert_eq!(decode("20240102T250405Z"), 0); // hour 25
    }

    #[test]
    fn decode_multibyte_prefix_does_not_panic() {
        assert_eq!(decode("ééééééééTééééééZ"), 0);
    }
}
