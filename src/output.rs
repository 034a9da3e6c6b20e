//! JSON output artifact
//!
//! Records go to the requested path as a pretty-printed array. With verbose
//! output the run statistics go next to it as `<stem>_stats.json`.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::HarvestError;
use crate::types::{ReviewRecord, RunStatistics};

/// Write the records array to `path`, creating parent directories
pub fn write_records(path: &Path, records: &[ReviewRecord]) -> Result<(), HarvestError> {
    write_json(path, records)?;
    tracing::info!("Wrote {} reviews to {}", records.len(), path.display());
    Ok(())
}

/// Write statistics beside `records_path`; returns the file written
pub fn write_statistics(records_path: &Path, stats: &RunStatistics) -> Result<PathBuf, HarvestError> {
    let path = statistics_path(records_path);
    write_json(&path, stats)?;
    tracing::info!("Wrote run statistics to {}", path.display());
    Ok(path)
}

/// `reviews.json` -> `reviews_stats.json`
pub fn statistics_path(records_path: &Path) -> PathBuf {
    let stem = records_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reviews".to_string());
    records_path.with_file_name(format!("{}_stats.json", stem))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), HarvestError> {
    let failure = |message: String| HarvestError::PersistenceFailure {
        path: path.display().to_string(),
        message,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| failure(e.to_string()))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| failure(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| failure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceKind;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record() -> ReviewRecord {
        let stamp = NaiveDate::from_ymd_opt(2024, 2, 3).unwrap().and_hms_opt(4, 5, 6).unwrap();
        ReviewRecord::new("g2-1-0", SourceKind::G2, stamp)
            .with_content("Solid")
            .with_date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
            .with_rating(4.5)
    }

    #[test]
    fn records_are_written_in_the_artifact_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/reviews.json");
        write_records(&path, &[record()]).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let first = &value[0];
        assert_eq!(first["id"], "g2-1-0");
        assert_eq!(first["source"], "G2");
        assert_eq!(first["date"], "2024-01-15");
        assert_eq!(first["scraped_at"], "2024-02-03 04:05:06");
        assert_eq!(first["rating"], 4.5);
        assert!(first["title"].is_null());
        assert!(first.get("job_title").is_none());
    }

    #[test]
    fn statistics_sit_next_to_records() {
        let dir = TempDir::new().unwrap();
        let records = dir.path().join("acme.json");
        let mut stats = RunStatistics::default();
        stats.record_source(SourceKind::G2, 4);
        stats.finalize(3, std::time::Duration::from_millis(1200));

        let written = write_statistics(&records, &stats).unwrap();
        assert_eq!(written, dir.path().join("acme_stats.json"));
        let back: RunStatistics = serde_json::from_str(&std::fs::read_to_string(&written).unwrap()).unwrap();
        assert_eq!(back, stats);
        assert_eq!(back.success_rate, 75);
    }

    #[test]
    fn unwritable_path_is_a_persistence_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let err = write_records(&blocker.join("reviews.json"), &[record()]).unwrap_err();
        assert!(matches!(err, HarvestError::PersistenceFailure { .. }));
    }
}
