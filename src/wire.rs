//! Wire-format helpers: the compact date/datetime encodings used in request
//! parameters and response bodies, and a normalization pass for the
//! non-standard JSON the counts/flight-track endpoints emit.

use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime};

/// Calendar dates on the wire: `YYYYMMDD`.
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Timestamps on the wire: `YYYYMMDD_HHMMSS`. Trap-eye photo ids are this
/// format verbatim.
pub const DATETIME_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_datetime(datetime: NaiveDateTime) -> String {
    datetime.format(DATETIME_FORMAT).to_string()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).ok()
}

/// Rewrite the bare `NaN` / `Infinity` / `-Infinity` tokens the server's
/// pandas backend emits into `null`, so the body parses as standard JSON.
/// Tokens inside string literals are left untouched. Bodies that are already
/// clean are returned borrowed.
pub fn normalize_nonfinite(body: &str) -> Cow<'_, str> {
    if !body.contains("NaN") && !body.contains("Infinity") {
        return Cow::Borrowed(body);
    }

    let mut out = String::with_capacity(body.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;
    while i < body.len() {
        let rest = &body[i..];
        let c = rest.chars().next().unwrap_or_default();

        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += c.len_utf8();
            continue;
        }

        if c == '"' {
            in_string = true;
            out.push(c);
            i += 1;
        } else if rest.starts_with("NaN") {
            out.push_str("null");
            i += 3;
        } else if rest.starts_with("-Infinity") {
            out.push_str("null");
            i += 9;
        } else if rest.starts_with("Infinity") {
            out.push_str("null");
            i += 8;
        } else {
            out.push(c);
            i += c.len_utf8();
        }
    }
    Cow::Owned(out)
}

/// Deserialize a float field where `null` stands in for a not-a-number
/// placeholder (the first record of a trap-eye diff series, unexplained
/// flight-track columns).
pub mod nan_float {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Deserialize the 0/1 integers the server uses for boolean flags
/// (`available_in_c`, `beneficial`, ...). Accepts real booleans too.
pub mod int_bool {
    use serde::de::{Deserializer, Error, Unexpected};
    use serde::Deserialize;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Flag {
            Int(i64),
            Bool(bool),
        }

        match Flag::deserialize(deserializer)? {
            Flag::Bool(b) => Ok(b),
            Flag::Int(0) => Ok(false),
            Flag::Int(1) => Ok(true),
            Flag::Int(n) => Err(D::Error::invalid_value(
                Unexpected::Signed(n),
                &"0 or 1",
            )),
        }
    }
}

/// Deserialize a `YYYYMMDD_HHMMSS` timestamp string.
pub mod compact_datetime {
    use chrono::NaiveDateTime;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, super::DATETIME_FORMAT)
            .map_err(|e| D::Error::custom(format!("bad timestamp {s:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_body_is_borrowed() {
        let body = r#"{"counts": [1.0, 2.0, null]}"#;
        assert!(matches!(normalize_nonfinite(body), Cow::Borrowed(_)));
    }

    #[test]
    fn bare_tokens_become_null() {
        let body = r#"{"a": NaN, "b": Infinity, "c": -Infinity, "d": [NaN, 1.5]}"#;
        assert_eq!(
            normalize_nonfinite(body),
            r#"{"a": null, "b": null, "c": null, "d": [null, 1.5]}"#
        );
    }

    #[test]
    fn tokens_inside_strings_survive() {
        let body = r#"{"label": "NaN sightings", "note": "escaped \" NaN", "x": NaN}"#;
        assert_eq!(
            normalize_nonfinite(body),
            r#"{"label": "NaN sightings", "note": "escaped \" NaN", "x": null}"#
        );
    }

    #[test]
    fn normalized_body_parses_with_nan_floats() {
        #[derive(serde::Deserialize)]
        struct Row {
            #[serde(with = "nan_float")]
            value: f64,
        }

        let body = normalize_nonfinite(r#"{"value": NaN}"#);
        let row: Row = serde_json::from_str(&body).unwrap();
        assert!(row.value.is_nan());
    }

    #[test]
    fn compact_formats_round_trip() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 8).unwrap();
        assert_eq!(format_date(date), "20240708");
        assert_eq!(parse_date("20240708"), Some(date));

        let dt = date.and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(format_datetime(dt), "20240708_120000");
        assert_eq!(parse_datetime("20240708_120000"), Some(dt));
        assert_eq!(parse_datetime("2024-07-08"), None);
    }
}
