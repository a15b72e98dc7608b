//! Timestamps are stored and served as fixed-width RFC 3339 strings
//! (milliseconds, `Z` suffix), so comparing the strings compares the instants.
//! Sorting on `createdAt` relies on this.

use chrono::{DateTime, SecondsFormat, Utc};
use mongodb::bson::Bson;
use serde::Serializer;

pub fn format(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(at))
}

/// The current time, ready for a `$set`.
pub fn now() -> Bson {
    Bson::String(format(&Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn string_order_follows_time_order() {
        let whole = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::microseconds(123_456);
        let later = whole + chrono::Duration::seconds(1);

        let formatted: Vec<String> = [whole, fractional, later].iter().map(format).collect();
        assert_eq!(formatted[0], "2026-03-01T12:00:00.000Z");
        assert_eq!(formatted[1], "2026-03-01T12:00:00.123Z");
        assert!(formatted.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(formatted.iter().all(|s| s.len() == formatted[0].len()));
    }

    #[test]
    fn stored_strings_read_back() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Stamped {
            #[serde(serialize_with = "serialize")]
            at: DateTime<Utc>,
        }

        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let doc = mongodb::bson::to_document(&Stamped { at }).unwrap();
        assert_eq!(doc.get_str("at").unwrap(), "2026-03-01T12:00:00.000Z");

        let back: Stamped = mongodb::bson::from_document(doc).unwrap();
        assert_eq!(back.at, at);
    }
}
