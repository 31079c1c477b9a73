//! Terminal tables and CSV export for the CLI.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};

use crate::models::{
    CSensorCounts, Counts, DetectionClass, DetectionFeature, Section, Spots, TrapeyeSensorCounts,
};

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
    );
    table
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(T::to_string).unwrap_or_default()
}

/// Column header for an insect-id count column: the class label when the
/// taxonomy knows the id, the raw key otherwise (diff columns, ids the
/// account cannot see).
fn insect_column_label(classes: &BTreeMap<String, DetectionClass>, insect_id: &str) -> String {
    match classes.get(insect_id) {
        Some(class) => format!("{} ({insect_id})", class.label),
        None => insect_id.to_string(),
    }
}

pub fn display_sections(sections: &[Section]) {
    if sections.is_empty() {
        println!("No sections available.");
        return;
    }

    let mut table = new_table(&["id", "label", "crop", "timezone", "classes"]);
    for section in sections {
        table.add_row(vec![
            section.id.to_string(),
            section.display_label(),
            opt(&section.crop),
            opt(&section.timezone),
            section.detection_classes.len().to_string(),
        ]);
    }
    println!("{table}");
    println!("{} sections", sections.len());
}

pub fn display_spots(spots: &Spots) {
    let mut table = new_table(&["kind", "sensor", "label", "row", "post", "latitude", "longitude"]);
    for spot in &spots.c {
        table.add_row(vec![
            "c".to_string(),
            format!("system {}", spot.system_id),
            opt(&spot.label),
            opt(&spot.row_id),
            opt(&spot.post_id),
            spot.latitude.to_string(),
            spot.longitude.to_string(),
        ]);
    }
    for spot in &spots.trapeye {
        table.add_row(vec![
            "trapeye".to_string(),
            format!("unit {}", spot.unit_id),
            String::new(),
            spot.row_id.to_string(),
            spot.post_id.to_string(),
            spot.latitude.to_string(),
            spot.longitude.to_string(),
        ]);
    }
    println!("{table}");
    println!(
        "{} pats-c sensors, {} trap-eyes",
        spots.c.len(),
        spots.trapeye.len()
    );
}

pub fn display_counts(counts: &Counts, classes: &BTreeMap<String, DetectionClass>) {
    for sensor in &counts.c {
        println!(
            "pats-c @ row {} post {}:",
            opt(&sensor.row_id),
            opt(&sensor.post_id)
        );
        let columns: BTreeSet<&str> = sensor
            .counts
            .iter()
            .flat_map(|bin| bin.counts.keys().map(String::as_str))
            .collect();
        let mut headers = vec!["bin".to_string()];
        headers.extend(columns.iter().map(|id| insect_column_label(classes, id)));
        let headers: Vec<&str> = headers.iter().map(String::as_str).collect();
        let mut table = new_table(&headers);
        for bin in &sensor.counts {
            let mut row = vec![bin.stamp.to_string()];
            for column in &columns {
                row.push(
                    bin.counts
                        .get(*column)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                );
            }
            table.add_row(row);
        }
        println!("{table}");
    }

    for sensor in &counts.trapeye {
        println!(
            "trap-eye @ row {} post {}: new counts",
            sensor.row_id, sensor.post_id
        );
        let columns: BTreeSet<&str> = sensor
            .new_counts
            .iter()
            .flat_map(|bin| bin.values.keys().map(String::as_str))
            .collect();
        let mut headers = vec!["date".to_string()];
        headers.extend(columns.iter().map(|id| insect_column_label(classes, id)));
        let headers: Vec<&str> = headers.iter().map(String::as_str).collect();
        let mut table = new_table(&headers);
        for bin in &sensor.new_counts {
            let mut row = vec![crate::wire::format_date(bin.date)];
            for column in &columns {
                row.push(
                    bin.values
                        .get(*column)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                );
            }
            table.add_row(row);
        }
        println!("{table}");
    }
}

pub fn display_detection_features(features: &[DetectionFeature]) {
    if features.is_empty() {
        println!("No detections in the selected window.");
        return;
    }

    let mut table = new_table(&[
        "uid", "datetime", "duration", "size", "vel_mean", "vel_max", "dist_traveled",
    ]);
    for f in features {
        table.add_row(vec![
            f.uid.to_string(),
            crate::wire::format_datetime(f.datetime),
            format!("{:.3}", f.duration),
            format!("{:.5}", f.size),
            format!("{:.3}", f.vel_mean),
            format!("{:.3}", f.vel_max),
            format!("{:.3}", f.dist_traveled),
        ]);
    }
    println!("{table}");
    println!("{} detections", features.len());
}

pub fn export_c_counts_csv(sensors: &[CSensorCounts], path: &Path) -> Result<()> {
    let columns: BTreeSet<&str> = sensors
        .iter()
        .flat_map(|s| s.counts.iter())
        .flat_map(|bin| bin.counts.keys().map(String::as_str))
        .collect();

    let mut wtr = csv::Writer::from_path(path)?;
    let mut header = vec!["row_id", "post_id", "bin"];
    header.extend(columns.iter().copied());
    wtr.write_record(&header)?;

    for sensor in sensors {
        for bin in &sensor.counts {
            let mut record = vec![
                opt(&sensor.row_id),
                opt(&sensor.post_id),
                bin.stamp.to_string(),
            ];
            for column in &columns {
                record.push(
                    bin.counts
                        .get(*column)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                );
            }
            wtr.write_record(&record)?;
        }
    }
    wtr.flush()?;
    println!("pats-c counts exported to {}", path.display());
    Ok(())
}

pub fn export_trapeye_counts_csv(sensors: &[TrapeyeSensorCounts], path: &Path) -> Result<()> {
    let columns: BTreeSet<&str> = sensors
        .iter()
        .flat_map(|s| s.new_counts.iter())
        .flat_map(|bin| bin.values.keys().map(String::as_str))
        .collect();

    let mut wtr = csv::Writer::from_path(path)?;
    let mut header = vec!["row_id", "post_id", "date"];
    header.extend(columns.iter().copied());
    wtr.write_record(&header)?;

    for sensor in sensors {
        for bin in &sensor.new_counts {
            let mut record = vec![
                sensor.row_id.to_string(),
                sensor.post_id.to_string(),
                crate::wire::format_date(bin.date),
            ];
            for column in &columns {
                record.push(
                    bin.values
                        .get(*column)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                );
            }
            wtr.write_record(&record)?;
        }
    }
    wtr.flush()?;
    println!("trap-eye counts exported to {}", path.display());
    Ok(())
}

pub fn export_features_csv(features: &[DetectionFeature], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "uid",
        "datetime",
        "row_id",
        "post_id",
        "duration",
        "size",
        "dist_traject",
        "dist_traveled",
        "light_level",
        "vel_max",
        "vel_mean",
        "vel_std",
    ])?;
    for f in features {
        wtr.write_record([
            f.uid.to_string(),
            crate::wire::format_datetime(f.datetime),
            opt(&f.row_id),
            opt(&f.post_id),
            f.duration.to_string(),
            f.size.to_string(),
            f.dist_traject.to_string(),
            f.dist_traveled.to_string(),
            f.light_level.to_string(),
            f.vel_max.to_string(),
            f.vel_mean.to_string(),
            f.vel_std.to_string(),
        ])?;
    }
    wtr.flush()?;
    println!("detection features exported to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insect_columns_use_class_labels_when_known() {
        let classes: BTreeMap<String, DetectionClass> = serde_json::from_str(
            r#"{"3": {"bb_label": "ta", "id": 3, "label": "Tuta absoluta",
                     "short_name": "Tomato leafminer"}}"#,
        )
        .unwrap();

        assert_eq!(insect_column_label(&classes, "3"), "Tuta absoluta (3)");
        // Unknown ids and diff columns stay raw.
        assert_eq!(insect_column_label(&classes, "24"), "24");
        assert_eq!(insect_column_label(&classes, "ta_diff"), "ta_diff");
    }
}
