//! Typed views of the PATS response bodies. All of these are read-only
//! projections of server state; nothing here is ever sent back.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::wire;

/// A taxonomic category the detection system recognizes (insects mostly,
/// but also rodents, birds, ...). The `/api/detection_classes` endpoint
/// returns these keyed by string-encoded insect id.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionClass {
    pub id: i64,
    pub label: String,
    pub short_name: String,
    /// Legacy bulk-count label, used as the `<bb_label>_diff` column prefix
    /// in trap-eye counts. Null for classes that never had one.
    pub bb_label: Option<String>,
}

/// Per-section detection class: the taxonomy entry plus availability flags
/// and alert thresholds for this particular section.
#[derive(Debug, Clone, Deserialize)]
pub struct SectionDetectionClass {
    pub id: i64,
    pub label: String,
    pub short_name: String,
    pub bb_label: Option<String>,
    #[serde(with = "wire::int_bool")]
    pub available_in_c: bool,
    #[serde(with = "wire::int_bool")]
    pub available_in_trapeye: bool,
    #[serde(with = "wire::int_bool")]
    pub beneficial: bool,
    pub c_level_1: Option<i64>,
    pub c_level_2: Option<i64>,
    pub c_level_3: Option<i64>,
    pub c_level_4: Option<i64>,
    pub trapeye_level_1: Option<i64>,
    pub trapeye_level_2: Option<i64>,
    pub trapeye_level_3: Option<i64>,
    pub trapeye_level_4: Option<i64>,
}

/// A customer site grouping of sensors (a greenhouse or field division).
#[derive(Debug, Clone, Deserialize)]
pub struct Section {
    pub id: i64,
    pub name: Option<String>,
    pub label: Option<String>,
    pub customer_name: Option<String>,
    pub greenhouse_name: Option<String>,
    pub crop: Option<String>,
    pub timezone: Option<String>,
    pub hubspot_company_id: Option<i64>,
    pub n_weekly_trapeye_photos: Option<i64>,
    #[serde(default)]
    pub detection_classes: Vec<SectionDetectionClass>,
}

impl Section {
    /// Human-readable "customer greenhouse name" label, skipping whatever
    /// metadata the section is missing.
    pub fn display_label(&self) -> String {
        let parts: Vec<&str> = [
            self.customer_name.as_deref(),
            self.greenhouse_name.as_deref(),
            self.name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            format!("section {}", self.id)
        } else {
            parts.join(" ")
        }
    }

    /// Ids of the detection classes a pats-c sensor in this section reports.
    pub fn c_class_ids(&self) -> Vec<i64> {
        self.detection_classes
            .iter()
            .filter(|c| c.available_in_c)
            .map(|c| c.id)
            .collect()
    }
}

/// The two sensor populations of a section, from `/api/spots`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Spots {
    #[serde(default)]
    pub c: Vec<CSpot>,
    #[serde(default)]
    pub trapeye: Vec<TrapeyeSpot>,
}

/// Mounting location of a pats-c sensor. Legacy systems predate the
/// row/post scheme and only carry a `system_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct CSpot {
    pub system_id: i64,
    pub label: Option<String>,
    pub row_id: Option<i64>,
    pub post_id: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Mounting location of a trap-eye sensor.
#[derive(Debug, Clone, Deserialize)]
pub struct TrapeyeSpot {
    pub unit_id: i64,
    pub row_id: i64,
    pub post_id: i64,
    pub latitude: f64,
    pub longitude: f64,
}

/// Counts per sensor population, from `/api/counts`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Counts {
    #[serde(default)]
    pub c: Vec<CSensorCounts>,
    #[serde(default)]
    pub trapeye: Vec<TrapeyeSensorCounts>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CSensorCounts {
    pub row_id: Option<i64>,
    pub post_id: Option<i64>,
    pub counts: Vec<CountBin>,
    /// Mean insect-id -> count per hour of day, 24 entries. Only present
    /// when `average_24h_bin` was requested.
    #[serde(default, deserialize_with = "de_avg_counts_24h")]
    pub avg_counts_24h: Option<Vec<BTreeMap<String, f64>>>,
}

/// The timestamp of one count bin. Daily bins are labeled `date` by the
/// server, hourly bins `datetime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinStamp {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl fmt::Display for BinStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinStamp::Date(d) => write!(f, "{}", wire::format_date(*d)),
            BinStamp::DateTime(dt) => write!(f, "{}", wire::format_datetime(*dt)),
        }
    }
}

/// One count bin of a pats-c sensor: a timestamp plus a dynamic set of
/// insect-id -> count columns.
#[derive(Debug, Clone)]
pub struct CountBin {
    pub stamp: BinStamp,
    pub counts: BTreeMap<String, f64>,
}

impl<'de> Deserialize<'de> for CountBin {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = serde_json::Map::deserialize(deserializer)?;
        let mut stamp = None;
        let mut counts = BTreeMap::new();
        for (key, value) in map {
            match key.as_str() {
                "date" => {
                    let s = value.as_str().ok_or_else(|| bad_column::<D>("date", &value))?;
                    let date = wire::parse_date(s)
                        .ok_or_else(|| de::Error::custom(format!("bad bin date {s:?}")))?;
                    stamp = Some(BinStamp::Date(date));
                }
                "datetime" => {
                    let s = value
                        .as_str()
                        .ok_or_else(|| bad_column::<D>("datetime", &value))?;
                    let dt = wire::parse_datetime(s)
                        .ok_or_else(|| de::Error::custom(format!("bad bin datetime {s:?}")))?;
                    stamp = Some(BinStamp::DateTime(dt));
                }
                _ => {
                    counts.insert(key, value_as_f64::<D>(&value)?);
                }
            }
        }
        let stamp = stamp.ok_or_else(|| de::Error::missing_field("date or datetime"))?;
        Ok(CountBin { stamp, counts })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrapeyeSensorCounts {
    pub row_id: i64,
    pub post_id: i64,
    /// Absolute counts per photo date, including the `<bb_label>_diff`
    /// columns. The first row of a series has NaN diffs since there is no
    /// prior row to diff against.
    pub absolute_count: Vec<TrapeyeBin>,
    /// New counts per date: the diff of consecutive absolute counts, keyed
    /// by insect id. NaN exactly where the diffs are NaN.
    pub new_counts: Vec<TrapeyeBin>,
}

/// One dated row of a trap-eye series. Columns are dynamic: insect-id keys
/// and, in `absolute_count` rows, `<bb_label>_diff` keys.
#[derive(Debug, Clone)]
pub struct TrapeyeBin {
    pub date: NaiveDate,
    pub values: BTreeMap<String, f64>,
}

impl TrapeyeBin {
    /// The `<bb_label>_diff` columns of an absolute-count row.
    pub fn diffs(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values
            .iter()
            .filter(|(k, _)| k.ends_with("_diff"))
            .map(|(k, v)| (k.as_str(), *v))
    }

    /// The insect-id columns (everything that is not a diff).
    pub fn counts(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values
            .iter()
            .filter(|(k, _)| !k.ends_with("_diff"))
            .map(|(k, v)| (k.as_str(), *v))
    }
}

impl<'de> Deserialize<'de> for TrapeyeBin {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = serde_json::Map::deserialize(deserializer)?;
        let mut date = None;
        let mut values = BTreeMap::new();
        for (key, value) in map {
            if key == "date" {
                let s = value.as_str().ok_or_else(|| bad_column::<D>("date", &value))?;
                date = Some(
                    wire::parse_date(s)
                        .ok_or_else(|| de::Error::custom(format!("bad row date {s:?}")))?,
                );
            } else {
                values.insert(key, value_as_f64::<D>(&value)?);
            }
        }
        let date = date.ok_or_else(|| de::Error::missing_field("date"))?;
        Ok(TrapeyeBin { date, values })
    }
}

/// One pats-c detection event, from `/api/download_detection_features`.
/// All measurements are SI base units.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionFeature {
    pub uid: i64,
    #[serde(with = "wire::compact_datetime")]
    pub datetime: NaiveDateTime,
    /// Server-side start timestamp in whatever format the server chose;
    /// kept opaque.
    pub start_datetime: String,
    #[serde(with = "wire::nan_float")]
    pub duration: f64,
    #[serde(with = "wire::nan_float")]
    pub size: f64,
    #[serde(with = "wire::nan_float")]
    pub dist_traject: f64,
    #[serde(with = "wire::nan_float")]
    pub dist_traveled: f64,
    #[serde(with = "wire::nan_float")]
    pub light_level: f64,
    #[serde(with = "wire::nan_float")]
    pub vel_max: f64,
    #[serde(with = "wire::nan_float")]
    pub vel_mean: f64,
    #[serde(with = "wire::nan_float")]
    pub vel_std: f64,
    /// Absent when the query used the legacy system_id form.
    pub row_id: Option<i64>,
    pub post_id: Option<i64>,
}

/// One camera frame within a single detection, from
/// `/api/download_c_flight_track`. Columns the source documentation leaves
/// unexplained are passed through untouched in `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct FlightTrackPoint {
    pub rs_id: i64,
    pub hunt_id: i64,
    #[serde(with = "wire::nan_float")]
    pub elapsed: f64,
    #[serde(with = "wire::nan_float")]
    pub light_level: f64,
    /// False-positive classification tag, e.g. "fp_not_a_fp".
    pub fp: String,
    #[serde(rename = "posX_insect", with = "wire::nan_float")]
    pub pos_x: f64,
    #[serde(rename = "posY_insect", with = "wire::nan_float")]
    pub pos_y: f64,
    #[serde(rename = "posZ_insect", with = "wire::nan_float")]
    pub pos_z: f64,
    #[serde(rename = "sposX_insect", with = "wire::nan_float")]
    pub spos_x: f64,
    #[serde(rename = "sposY_insect", with = "wire::nan_float")]
    pub spos_y: f64,
    #[serde(rename = "sposZ_insect", with = "wire::nan_float")]
    pub spos_z: f64,
    #[serde(rename = "svelX_insect", with = "wire::nan_float")]
    pub svel_x: f64,
    #[serde(rename = "svelY_insect", with = "wire::nan_float")]
    pub svel_y: f64,
    #[serde(rename = "svelZ_insect", with = "wire::nan_float")]
    pub svel_z: f64,
    #[serde(rename = "saccX_insect", with = "wire::nan_float")]
    pub sacc_x: f64,
    #[serde(rename = "saccY_insect", with = "wire::nan_float")]
    pub sacc_y: f64,
    #[serde(rename = "saccZ_insect", with = "wire::nan_float")]
    pub sacc_z: f64,
    #[serde(rename = "imLx_insect", with = "wire::nan_float")]
    pub im_lx: f64,
    #[serde(rename = "imLy_insect", with = "wire::nan_float")]
    pub im_ly: f64,
    #[serde(rename = "imLx_pred_insect", with = "wire::nan_float")]
    pub im_lx_pred: f64,
    #[serde(rename = "imLy_pred_insect", with = "wire::nan_float")]
    pub im_ly_pred: f64,
    #[serde(rename = "pos_valid_insect")]
    pub pos_valid: i64,
    #[serde(rename = "vel_valid_insect")]
    pub vel_valid: i64,
    #[serde(rename = "acc_valid_insect")]
    pub acc_valid: i64,
    #[serde(rename = "foundL_insect")]
    pub found_l: i64,
    #[serde(rename = "n_frames_lost_insect")]
    pub n_frames_lost: i64,
    #[serde(rename = "n_frames_tracking_insect")]
    pub n_frames_tracking: i64,
    #[serde(rename = "disparity_insect", with = "wire::nan_float")]
    pub disparity: f64,
    #[serde(rename = "radius_insect", with = "wire::nan_float")]
    pub radius: f64,
    #[serde(rename = "score_insect", with = "wire::nan_float")]
    pub score: f64,
    #[serde(rename = "size_insect", with = "wire::nan_float")]
    pub size: f64,
    #[serde(rename = "motion_sum_insect", with = "wire::nan_float")]
    pub motion_sum: f64,
    /// Columns with no documented meaning (e.g. "Unnamed: 32"), verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn value_as_f64<'de, D>(value: &Value) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match value {
        Value::Null => Ok(f64::NAN),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom(format!("count out of f64 range: {n}"))),
        other => Err(de::Error::custom(format!(
            "expected numeric count column, got {other}"
        ))),
    }
}

fn bad_column<'de, D>(column: &str, value: &Value) -> D::Error
where
    D: Deserializer<'de>,
{
    de::Error::custom(format!("expected string in column {column:?}, got {value}"))
}

fn de_avg_counts_24h<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<BTreeMap<String, f64>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<BTreeMap<String, Option<f64>>>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|bins| {
        bins.into_iter()
            .map(|bin| {
                bin.into_iter()
                    .map(|(k, v)| (k, v.unwrap_or(f64::NAN)))
                    .collect()
            })
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_parses_from_documented_body() {
        let body = r#"{
            "crop": "some_crop",
            "customer_name": "company_name",
            "detection_classes": [
                {
                    "available_in_c": 0,
                    "available_in_trapeye": 1,
                    "bb_label": "ta",
                    "beneficial": 0,
                    "c_level_1": 5,
                    "c_level_2": 15,
                    "c_level_3": 30,
                    "c_level_4": 50,
                    "id": 3,
                    "label": "Tuta absoluta",
                    "short_name": "Tomato leafminer",
                    "trapeye_level_1": 1,
                    "trapeye_level_2": 5,
                    "trapeye_level_3": 10,
                    "trapeye_level_4": 15
                }
            ],
            "greenhouse_name": "your_greenhouse_name",
            "hubspot_company_id": 123456789,
            "id": 123,
            "label": "section_label",
            "n_weekly_trapeye_photos": 3,
            "name": "a_name",
            "timezone": "Europe/Amsterdam"
        }"#;

        let section: Section = serde_json::from_str(body).unwrap();
        assert_eq!(section.id, 123);
        assert_eq!(section.display_label(), "company_name your_greenhouse_name a_name");
        let class = &section.detection_classes[0];
        assert!(!class.available_in_c);
        assert!(class.available_in_trapeye);
        assert_eq!(class.c_level_4, Some(50));
        assert!(section.c_class_ids().is_empty());
    }

    #[test]
    fn display_label_falls_back_to_id() {
        let section: Section = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(section.display_label(), "section 7");
    }

    #[test]
    fn count_bin_accepts_both_stamp_keys() {
        let hourly: CountBin =
            serde_json::from_str(r#"{"1": 0, "2": 3, "datetime": "20240708_130000"}"#).unwrap();
        assert!(matches!(hourly.stamp, BinStamp::DateTime(_)));
        assert_eq!(hourly.counts["2"], 3.0);

        let daily: CountBin = serde_json::from_str(r#"{"1": 4, "date": "20240708"}"#).unwrap();
        assert_eq!(
            daily.stamp,
            BinStamp::Date(NaiveDate::from_ymd_opt(2024, 7, 8).unwrap())
        );
        assert_eq!(daily.stamp.to_string(), "20240708");
    }

    #[test]
    fn count_bin_without_stamp_is_rejected() {
        let err = serde_json::from_str::<CountBin>(r#"{"1": 0}"#).unwrap_err();
        assert!(err.to_string().contains("date or datetime"));
    }

    #[test]
    fn trapeye_bin_splits_diff_columns() {
        let bin: TrapeyeBin = serde_json::from_str(
            r#"{"3": 1.0, "24": 8.0, "ta_diff": null, "wv_diff": 0.5, "date": "20240709"}"#,
        )
        .unwrap();
        let diffs: BTreeMap<&str, f64> = bin.diffs().collect();
        assert_eq!(diffs.len(), 2);
        assert!(diffs["ta_diff"].is_nan());
        assert_eq!(diffs["wv_diff"], 0.5);
        let counts: BTreeMap<&str, f64> = bin.counts().collect();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["24"], 8.0);
    }

    #[test]
    fn flight_track_keeps_unexplained_columns() {
        let body = r#"{
            "Unnamed: 32": null,
            "acc_valid_insect": 0,
            "disparity_insect": 20.8008,
            "elapsed": 1207.1165,
            "foundL_insect": 1,
            "fp": "fp_not_a_fp",
            "hunt_id": -1,
            "imLx_insect": 28,
            "imLx_pred_insect": -1.0,
            "imLy_insect": 268,
            "imLy_pred_insect": -1.0,
            "light_level": 0.226651,
            "motion_sum_insect": 36,
            "n_frames_lost_insect": 0,
            "n_frames_tracking_insect": 1,
            "posX_insect": 1.8169,
            "posY_insect": -1.227,
            "posZ_insect": -1.52218,
            "pos_valid_insect": 1,
            "radius_insect": 0.0102218,
            "rs_id": 108478,
            "saccX_insect": 0.0,
            "saccY_insect": 0.0,
            "saccZ_insect": 0.0,
            "score_insect": 0.0,
            "size_insect": 4.47214,
            "sposX_insect": 1.8169,
            "sposY_insect": -1.227,
            "sposZ_insect": -1.52218,
            "svelX_insect": 0.0,
            "svelY_insect": 0.0,
            "svelZ_insect": 0.0,
            "vel_valid_insect": 0
        }"#;

        let point: FlightTrackPoint = serde_json::from_str(body).unwrap();
        assert_eq!(point.rs_id, 108478);
        assert_eq!(point.hunt_id, -1);
        assert_eq!(point.pos_x, 1.8169);
        assert_eq!(point.im_lx, 28.0);
        assert_eq!(point.fp, "fp_not_a_fp");
        assert!(point.extra.contains_key("Unnamed: 32"));
        assert!(point.extra["Unnamed: 32"].is_null());
    }

    #[test]
    fn detection_feature_parses_compact_datetime() {
        let body = r#"{
            "datetime": "20240708_222545",
            "dist_traject": 3.3145574200059627,
            "dist_traveled": 3.0434154152926607,
            "duration": 2.5037559999998393,
            "light_level": 0.22657637142857143,
            "post_id": 21,
            "row_id": 43,
            "size": 0.014341787433628319,
            "start_datetime": "Mon, 08 Jul 2024 20:25:45 GMT",
            "uid": 12345678,
            "vel_max": 1.7198010272426867,
            "vel_mean": 1.2854506213467454,
            "vel_std": 0.2336045734746302
        }"#;

        let feature: DetectionFeature = serde_json::from_str(body).unwrap();
        assert_eq!(feature.uid, 12345678);
        assert_eq!(wire::format_datetime(feature.datetime), "20240708_222545");
        assert_eq!(feature.row_id, Some(43));
        assert_eq!(feature.start_datetime, "Mon, 08 Jul 2024 20:25:45 GMT");
    }
}
