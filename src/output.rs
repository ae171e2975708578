//! Output formatting and persistence for match results.
//!
//! Supports JSON logging, per-sample CSV append, and per-descriptor CSV dumps.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::feed::ResolvedRow;
use crate::stats::MatchStats;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// Logs match statistics as pretty-printed JSON.
pub fn print_json(stats: &MatchStats) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(stats)?);
    Ok(())
}

fn append_rows<T: Serialize>(path: &str, rows: &[T]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, rows = rows.len(), "Appending CSV records");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

/// Appends a [`MatchStats`] record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &str, stats: &MatchStats) -> Result<()> {
    append_rows(path, std::slice::from_ref(stats))
}

/// Appends one row per resolved descriptor to a CSV file.
pub fn write_resolved(path: &str, rows: &[ResolvedRow]) -> Result<()> {
    append_rows(path, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::DescriptorSource;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    #[test]
    fn test_print_json_does_not_panic() {
        let stats = MatchStats::default();
        print_json(&stats).unwrap();
    }

    #[test]
    fn test_append_record_creates_file() {
        let path = temp_path("gtfs_rt_matcher_test_create.csv");
        let _ = fs::remove_file(&path); // clean up any prior run

        let stats = MatchStats::default();
        append_record(&path, &stats).unwrap();

        assert!(Path::new(&path).exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.is_empty());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let path = temp_path("gtfs_rt_matcher_test_header.csv");
        let _ = fs::remove_file(&path);

        let stats = MatchStats::default();
        append_record(&path, &stats).unwrap();
        append_record(&path, &stats).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        // Header line should appear exactly once
        let header_count = content.lines().filter(|l| l.contains("timestamp")).count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 3);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_appended_record_reads_back() {
        let path = temp_path("gtfs_rt_matcher_test_roundtrip.csv");
        let _ = fs::remove_file(&path);

        let mut stats = MatchStats::new().with_feed_id("mbta");
        stats.matched = 4;
        append_record(&path, &stats).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let read: MatchStats = rdr.deserialize().next().unwrap().unwrap();
        assert_eq!(read.feed_id.as_deref(), Some("mbta"));
        assert_eq!(read.matched, 4);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_resolved_rows() {
        let path = temp_path("gtfs_rt_matcher_test_resolved.csv");
        let _ = fs::remove_file(&path);

        let row = ResolvedRow {
            entity_id: "e1".into(),
            source: DescriptorSource::TripUpdate,
            route_id: Some("R".into()),
            direction_id: Some(0),
            start_time: Some("08:00:00".into()),
            start_date: Some("20240315".into()),
            outcome: "matched",
            trip_id: Some("T".into()),
        };
        write_resolved(&path, &[row.clone(), row]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("entity_id,source,"));
        assert!(lines[1].starts_with("e1,trip_update,R,0,08:00:00,20240315,matched,T"));

        fs::remove_file(&path).unwrap();
    }
}
