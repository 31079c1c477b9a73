//! Request-side types. Everything here validates before any network I/O:
//! a value that constructs is a value the server accepts.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::PatsError;
use crate::wire;

/// Count aggregation granularity. On the wire: "D" or "H".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BinMode {
    #[default]
    Daily,
    Hourly,
}

impl BinMode {
    pub fn as_wire(&self) -> &'static str {
        match self {
            BinMode::Daily => "D",
            BinMode::Hourly => "H",
        }
    }
}

impl FromStr for BinMode {
    type Err = PatsError;

    // The server also tolerates lowercase 'h' for hourly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "D" => Ok(BinMode::Daily),
            "H" | "h" => Ok(BinMode::Hourly),
            other => Err(PatsError::InvalidBinMode(other.to_string())),
        }
    }
}

impl fmt::Display for BinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Map snapping applied to the hand-placed sensor locations returned by
/// `/api/spots`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnappingMode {
    /// No snapping, return the originally scanned GPS locations.
    #[default]
    Disabled,
    /// Automatic selection between row and post mode.
    Auto,
    /// Snap assuming most trap-eyes are placed in rows.
    Row,
    /// Snap assuming most trap-eyes are placed on posts.
    Post,
}

impl SnappingMode {
    pub fn as_wire(&self) -> &'static str {
        match self {
            SnappingMode::Disabled => "disabled",
            SnappingMode::Auto => "auto",
            SnappingMode::Row => "row",
            SnappingMode::Post => "post",
        }
    }
}

impl FromStr for SnappingMode {
    type Err = PatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(SnappingMode::Disabled),
            "auto" => Ok(SnappingMode::Auto),
            "row" => Ok(SnappingMode::Row),
            "post" => Ok(SnappingMode::Post),
            other => Err(PatsError::InvalidSnappingMode(other.to_string())),
        }
    }
}

/// Which sensor a detection-features download targets. The two request
/// shapes are mutually exclusive on the wire; `System` is the legacy form
/// for installations that predate row/post locations and is still accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorRef {
    RowPost { row_id: i64, post_id: i64 },
    System { system_id: i64 },
}

/// Parameters for `/api/counts`.
#[derive(Debug, Clone)]
pub struct CountsQuery {
    pub section_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Restricts the returned insect ids; empty means all, and the
    /// parameter is then omitted from the request entirely.
    pub detection_class_ids: Vec<i64>,
    pub bin_mode: BinMode,
    /// Also return the mean 24h distribution over the date range.
    pub average_24h_bin: bool,
}

impl CountsQuery {
    pub fn new(section_id: i64, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            section_id,
            start_date,
            end_date,
            detection_class_ids: Vec::new(),
            bin_mode: BinMode::default(),
            average_24h_bin: false,
        }
    }

    pub fn detection_classes(mut self, ids: &[i64]) -> Self {
        self.detection_class_ids = ids.to_vec();
        self
    }

    pub fn bin_mode(mut self, mode: BinMode) -> Self {
        self.bin_mode = mode;
        self
    }

    pub fn average_24h_bin(mut self, enabled: bool) -> Self {
        self.average_24h_bin = enabled;
        self
    }

    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("section_id", self.section_id.to_string()),
            ("start_date", wire::format_date(self.start_date)),
            ("end_date", wire::format_date(self.end_date)),
        ];
        if !self.detection_class_ids.is_empty() {
            let joined = self
                .detection_class_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            params.push(("detection_class_ids", joined));
        }
        params.push(("bin_mode", self.bin_mode.as_wire().to_string()));
        params.push(("average_24h_bin", i64::from(self.average_24h_bin).to_string()));
        params
    }
}

/// Parameters for `/api/download_detection_features`.
#[derive(Debug, Clone)]
pub struct DetectionFeaturesQuery {
    pub section_id: i64,
    pub sensor: SensorRef,
    pub detection_class_id: i64,
    pub start_datetime: NaiveDateTime,
    pub end_datetime: NaiveDateTime,
}

impl DetectionFeaturesQuery {
    pub fn new(
        section_id: i64,
        sensor: SensorRef,
        detection_class_id: i64,
        start_datetime: NaiveDateTime,
        end_datetime: NaiveDateTime,
    ) -> Self {
        Self {
            section_id,
            sensor,
            detection_class_id,
            start_datetime,
            end_datetime,
        }
    }

    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("section_id", self.section_id.to_string())];
        match self.sensor {
            SensorRef::RowPost { row_id, post_id } => {
                params.push(("row_id", row_id.to_string()));
                params.push(("post_id", post_id.to_string()));
            }
            SensorRef::System { system_id } => {
                params.push(("system_id", system_id.to_string()));
            }
        }
        params.push(("detection_class_id", self.detection_class_id.to_string()));
        params.push(("start_datetime", wire::format_datetime(self.start_datetime)));
        params.push(("end_datetime", wire::format_datetime(self.end_datetime)));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn bin_mode_parses_documented_spellings_only() {
        assert_eq!("D".parse::<BinMode>().unwrap(), BinMode::Daily);
        assert_eq!("H".parse::<BinMode>().unwrap(), BinMode::Hourly);
        assert_eq!("h".parse::<BinMode>().unwrap(), BinMode::Hourly);
        assert!(matches!(
            "d".parse::<BinMode>(),
            Err(PatsError::InvalidBinMode(s)) if s == "d"
        ));
        assert!("weekly".parse::<BinMode>().is_err());
    }

    #[test]
    fn snapping_mode_parses() {
        assert_eq!("auto".parse::<SnappingMode>().unwrap(), SnappingMode::Auto);
        assert!(matches!(
            "grid".parse::<SnappingMode>(),
            Err(PatsError::InvalidSnappingMode(_))
        ));
    }

    #[test]
    fn counts_params_match_documented_field_set() {
        let query = CountsQuery::new(123, date(2024, 7, 8), date(2024, 7, 9))
            .detection_classes(&[3, 24])
            .bin_mode(BinMode::Hourly)
            .average_24h_bin(true);

        assert_eq!(
            query.to_params(),
            vec![
                ("section_id", "123".to_string()),
                ("start_date", "20240708".to_string()),
                ("end_date", "20240709".to_string()),
                ("detection_class_ids", "3,24".to_string()),
                ("bin_mode", "H".to_string()),
                ("average_24h_bin", "1".to_string()),
            ]
        );
    }

    #[test]
    fn counts_params_omit_empty_class_list() {
        let params = CountsQuery::new(1, date(2024, 1, 1), date(2024, 1, 2)).to_params();
        assert!(params.iter().all(|(k, _)| *k != "detection_class_ids"));
        assert_eq!(
            params.last(),
            Some(&("average_24h_bin", "0".to_string()))
        );
    }

    #[test]
    fn feature_params_for_both_sensor_forms() {
        let start = date(2024, 6, 8).and_hms_opt(12, 0, 0).unwrap();
        let end = date(2024, 7, 8).and_hms_opt(12, 0, 0).unwrap();

        let row_post = DetectionFeaturesQuery::new(
            5,
            SensorRef::RowPost { row_id: 43, post_id: 21 },
            3,
            start,
            end,
        );
        assert_eq!(
            row_post.to_params(),
            vec![
                ("section_id", "5".to_string()),
                ("row_id", "43".to_string()),
                ("post_id", "21".to_string()),
                ("detection_class_id", "3".to_string()),
                ("start_datetime", "20240608_120000".to_string()),
                ("end_datetime", "20240708_120000".to_string()),
            ]
        );

        let legacy = DetectionFeaturesQuery::new(
            5,
            SensorRef::System { system_id: 99 },
            3,
            start,
            end,
        );
        let params = legacy.to_params();
        assert!(params.contains(&("system_id", "99".to_string())));
        assert!(params.iter().all(|(k, _)| *k != "row_id" && *k != "post_id"));
    }
}
