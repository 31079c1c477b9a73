use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Local;

use pats_client::client::{PatsClient, Server};
use pats_client::config::{Config, Credentials, SERVER_ENV};
use pats_client::models::Section;
use pats_client::query::{BinMode, CountsQuery, DetectionFeaturesQuery, SensorRef, SnappingMode};
use pats_client::table_display::{
    display_counts, display_detection_features, display_sections, display_spots,
    export_c_counts_csv, export_features_csv, export_trapeye_counts_csv,
};

fn print_help() {
    println!("pats-cli - walk through the PATS pest-monitoring API");
    println!();
    println!("Usage:");
    println!("  pats-cli [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --server <name|url>    production (default), beta, local, or an http(s) URL");
    println!("  --section <id>         section to inspect (default: first visible section)");
    println!("  --days <n>             size of the date window, counting back from today (default 31)");
    println!("  --hourly               hourly count bins instead of daily");
    println!("  --average-24h          also request the mean 24h distribution");
    println!("  --classes <ids>        comma-separated detection class ids (default: all available)");
    println!("  --snapping <mode>      spot snapping: disabled (default), auto, row, post");
    println!("  --photos               download the newest trap-eye photo");
    println!("  --features <class_id>  download pats-c detection features for one class");
    println!("  --flight-track         download the flight track of the first detection");
    println!("  --video                download the video of the first detection");
    println!("  --export-csv           write counts/features to CSV next to the tables");
    println!("  --out <dir>            output directory for downloads (default: current dir)");
    println!("  --auth-file <path>     two-line credentials file (username, then password)");
    println!("  --generate-config      write a commented default config file and exit");
    println!("  --help                 show this help");
    println!();
    println!("Credentials: {} / {} env vars, a .auth file, or the config file.",
        pats_client::config::USERNAME_ENV,
        pats_client::config::PASSWORD_ENV,
    );
}

fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|pos| args.get(pos + 1))
        .cloned()
}

fn pick_section(sections: Vec<Section>, wanted: Option<i64>) -> Result<Section> {
    match wanted {
        Some(id) => sections
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| anyhow!("section {id} is not visible to this account")),
        None => sections
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("this account has no sections")),
    }
}

fn main() -> Result<()> {
    pats_client::logging::init_tracing();

    let args: Vec<String> = std::env::args().collect();

    if args.contains(&"--help".to_string()) {
        print_help();
        return Ok(());
    }

    if args.contains(&"--generate-config".to_string()) {
        let path = Config::get_config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, Config::create_default_with_comments())?;
        println!("Configuration file created at: {}", path.display());
        return Ok(());
    }

    let config = Config::load()?;

    let server: Server = flag_value(&args, "--server")
        .or_else(|| std::env::var(SERVER_ENV).ok())
        .unwrap_or_else(|| config.connection.server.clone())
        .parse()?;

    let auth_override = flag_value(&args, "--auth-file").map(PathBuf::from);
    let creds = Credentials::resolve(&config, auth_override.as_deref())?;

    let out_dir = PathBuf::from(flag_value(&args, "--out").unwrap_or_else(|| ".".to_string()));
    std::fs::create_dir_all(&out_dir)?;

    let client = PatsClient::login_with_timeout(
        server,
        &creds.username,
        &creds.password,
        Duration::from_secs(config.connection.timeout_secs),
    )?;

    let detection_classes = client.detection_classes()?;
    let sections = client.sections()?;
    display_sections(&sections);

    let wanted = flag_value(&args, "--section")
        .map(|s| s.parse::<i64>().context("--section takes a numeric id"))
        .transpose()?;
    let section = pick_section(sections, wanted)?;
    println!("\nUsing section {} ({})", section.id, section.display_label());

    let snapping: SnappingMode = flag_value(&args, "--snapping")
        .map(|s| s.parse())
        .transpose()?
        .unwrap_or_default();
    let spots = client.spots_with_snapping(section.id, snapping)?;
    display_spots(&spots);

    let days: i64 = flag_value(&args, "--days")
        .map(|s| s.parse().context("--days takes a number"))
        .transpose()?
        .unwrap_or(31);
    let end_date = Local::now().date_naive();
    let start_date = end_date - chrono::Duration::days(days);

    let class_ids: Vec<i64> = match flag_value(&args, "--classes") {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().parse().context("--classes takes comma-separated ids"))
            .collect::<Result<_>>()?,
        None => section.detection_classes.iter().map(|c| c.id).collect(),
    };

    let mut counts_query = CountsQuery::new(section.id, start_date, end_date)
        .detection_classes(&class_ids)
        .average_24h_bin(args.contains(&"--average-24h".to_string()));
    if args.contains(&"--hourly".to_string()) {
        counts_query = counts_query.bin_mode(BinMode::Hourly);
    }
    let counts = client.counts(&counts_query)?;
    display_counts(&counts, &detection_classes);

    let export_csv = args.contains(&"--export-csv".to_string());
    if export_csv {
        if !counts.c.is_empty() {
            export_c_counts_csv(&counts.c, &out_dir.join("counts_c.csv"))?;
        }
        if !counts.trapeye.is_empty() {
            export_trapeye_counts_csv(&counts.trapeye, &out_dir.join("counts_trapeye.csv"))?;
        }
    }

    if args.contains(&"--photos".to_string()) {
        if let Some(spot) = spots.trapeye.first() {
            let photos = client.trapeye_photo_list(
                section.id,
                spot.row_id,
                spot.post_id,
                start_date,
                end_date,
            )?;
            println!("{} photos available", photos.len());
            if let Some(photo_id) = photos.first() {
                let bytes = client.download_trapeye_photo(
                    section.id,
                    spot.row_id,
                    spot.post_id,
                    photo_id,
                )?;
                let path = out_dir.join(format!("trapeye_{photo_id}.jpg"));
                std::fs::write(&path, bytes)?;
                println!("Photo saved to {}", path.display());
            }
        } else {
            println!("No trap-eyes in this section, skipping photos.");
        }
    }

    let features_class = flag_value(&args, "--features")
        .map(|s| s.parse::<i64>().context("--features takes a class id"))
        .transpose()?;
    let want_flight_track = args.contains(&"--flight-track".to_string());
    let want_video = args.contains(&"--video".to_string());

    if features_class.is_some() || want_flight_track || want_video {
        let spot = spots
            .c
            .first()
            .ok_or_else(|| anyhow!("no pats-c sensors in this section"))?;
        // Not all legacy systems have a row/post location.
        let sensor = match (spot.row_id, spot.post_id) {
            (Some(row_id), Some(post_id)) => SensorRef::RowPost { row_id, post_id },
            _ => SensorRef::System { system_id: spot.system_id },
        };
        let class_id = match features_class {
            Some(id) => id,
            None => section
                .c_class_ids()
                .first()
                .copied()
                .ok_or_else(|| anyhow!("no detection classes available in pats-c"))?,
        };

        let noon = chrono::NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let query = DetectionFeaturesQuery::new(
            section.id,
            sensor,
            class_id,
            start_date.and_time(noon),
            end_date.and_time(noon),
        );
        let features = client.detection_features(&query)?;
        display_detection_features(&features);
        if export_csv && !features.is_empty() {
            export_features_csv(&features, &out_dir.join("detection_features.csv"))?;
        }

        if let Some(first) = features.first() {
            if want_flight_track {
                let track = client.flight_track(section.id, first.uid)?;
                println!("Flight track of detection {}: {} frames", first.uid, track.len());
            }
            if want_video {
                let video = client.download_video(section.id, first.uid, false)?;
                let path = out_dir.join(format!("detection_{}.mkv", first.uid));
                std::fs::write(&path, video)?;
                println!("Video saved to {}", path.display());
            }
        } else if want_flight_track || want_video {
            println!("No detections in the window, nothing to download.");
        }
    }

    Ok(())
}
