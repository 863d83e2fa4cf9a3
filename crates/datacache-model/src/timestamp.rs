// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::OnceLock;

/// Joins header and trailer in a generic key.
pub const GENERIC_KEY_SEPARATOR: char = '!';

/// A file name split around its embedded timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedName {
    pub header: String,
    pub timestamp: NaiveDateTime,
    pub trailer: String,
}

impl TimestampedName {
    #[must_use]
    pub fn generic_key(&self) -> String {
        format!("{}{}{}", self.header, GENERIC_KEY_SEPARATOR, self.trailer)
    }
}

struct Layout {
    pattern: Regex,
    format: &'static str,
}

fn layouts() -> &'static [Layout] {
    static LAYOUTS: OnceLock<Vec<Layout>> = OnceLock::new();
    LAYOUTS.get_or_init(|| {
        [
            (r"\d{4}-\d{2}-\d{2}-\d{2}h\d{2}", "%Y-%m-%d-%Hh%M"),
            (r"\d{8}-\d{6}", "%Y%m%d-%H%M%S"),
        ]
        .into_iter()
        .filter_map(|(ts, format)| {
            // Greedy header: the last timestamp in the name wins.
            Regex::new(&format!(r"^(?P<header>.*)(?P<ts>{ts})(?P<trailer>.*)$"))
                .ok()
                .map(|pattern| Layout { pattern, format })
        })
        .collect()
    })
}

/// Splits `name` into `header + timestamp + trailer`.
///
/// Accepted layouts are `YYYY-MM-DD-HHhMM` and `YYYYMMDD-HHMMSS`. Digits that
/// fit a layout but not the calendar (month 13, hour 25) do not count.
#[must_use]
pub fn split_timestamped_name(name: &str) -> Option<TimestampedName> {
    for layout in layouts() {
        let Some(caps) = layout.pattern.captures(name) else {
            continue;
        };
        let (Some(header), Some(ts), Some(trailer)) =
            (caps.name("header"), caps.name("ts"), caps.name("trailer"))
        else {
            continue;
        };
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(ts.as_str(), layout.format) {
            return Some(TimestampedName {
                header: header.as_str().to_string(),
                timestamp,
                trailer: trailer.as_str().to_string(),
            });
        }
    }
    None
}

/// Generic key of `name`, or `None` when it carries no recognizable timestamp.
#[must_use]
pub fn generic_key(name: &str) -> Option<String> {
    split_timestamped_name(name).map(|t| t.generic_key())
}
