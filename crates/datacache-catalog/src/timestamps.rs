// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Parses the modification dates catalogs publish.
///
/// RFC 3339 values keep their offset; naive date-times (data.gouv.fr emits
/// `2021-04-08T19:03:12.123000`) and bare dates are read as UTC.
#[must_use]
pub fn parse_remote_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::parse_remote_timestamp;
    use chrono::{TimeZone, Utc};

    #[test]
    fn accepts_catalog_date_shapes() {
        let expected = Utc
            .with_ymd_and_hms(2021, 4, 8, 19, 3, 12)
            .single()
            .expect("ts");
        assert_eq!(
            parse_remote_timestamp("2021-04-08T19:03:12.123000").map(|t| t.timestamp()),
            Some(expected.timestamp())
        );
        assert_eq!(
            parse_remote_timestamp("2021-04-08T21:03:12+02:00"),
            Some(expected)
        );
        assert_eq!(
            parse_remote_timestamp("2021-04-08").map(|t| t.timestamp()),
            Utc.with_ymd_and_hms(2021, 4, 8, 0, 0, 0)
                .single()
                .map(|t| t.timestamp())
        );
        assert_eq!(parse_remote_timestamp("last week"), None);
        assert_eq!(parse_remote_timestamp(""), None);
    }
}
