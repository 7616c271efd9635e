use chrono::Utc;
use tracing::{debug, error, info};

use crate::logs::{LogError, LogStore};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RotationReport {
    /// Archive ids written this cycle.
    pub archived: Vec<String>,
    /// Segments that had nothing to archive.
    pub empty: Vec<String>,
    /// Segments whose read or archive write failed; left untouched.
    pub failed: Vec<String>,
    /// Segments archived but not truncated; their content will be archived again.
    pub untruncated: Vec<String>,
}

enum SegmentRotation {
    Empty,
    Archived { archive_id: String, truncated: bool },
}

pub async fn rotate_logs(logs: &LogStore) -> RotationReport {
    rotate_logs_at(logs, Utc::now().timestamp_millis()).await
}

/// Archives and truncates every live segment, tagging archives with `generation`.
pub async fn rotate_logs_at(logs: &LogStore, generation: i64) -> RotationReport {
    let mut report = RotationReport::default();

    let segments = match logs.list_segments().await {
        Ok(segments) => segments,
        Err(e) => {
            error!(error = %e, "Could not list log segments for rotation");
            return report;
        }
    };
    if segments.is_empty() {
        debug!("No log segments to rotate");
        return report;
    }

    for id in segments {
        match rotate_segment(logs, &id, generation).await {
            Ok(SegmentRotation::Empty) => report.empty.push(id),
            Ok(SegmentRotation::Archived { archive_id, truncated }) => {
                if !truncated {
                    report.untruncated.push(id);
                }
                report.archived.push(archive_id);
            }
            Err(e) => {
                error!(check_id = %id, error = %e, "Log rotation failed, segment kept");
                report.failed.push(id);
            }
        }
    }

    info!(
        archived = report.archived.len(),
        empty = report.empty.len(),
        failed = report.failed.len(),
        untruncated = report.untruncated.len(),
        "Log rotation cycle completed"
    );
    report
}

async fn rotate_segment(logs: &LogStore, id: &str, generation: i64) -> Result<SegmentRotation, LogError> {
    let guard = logs.lock(id).await;
    let result = rotate_locked(logs, id, generation).await;
    drop(guard);
    logs.release(id).await;
    result
}

async fn rotate_locked(logs: &LogStore, id: &str, generation: i64) -> Result<SegmentRotation, LogError> {
    let content = logs.read_segment(id).await?;
    if content.is_empty() {
        return Ok(SegmentRotation::Empty);
    }

    let archive_id = format!("{id}-{generation}");
    logs.write_archive(&archive_id, &content).await?;

    let truncated = match logs.truncate(id).await {
        Ok(()) => true,
        Err(e) => {
            error!(check_id = %id, archive_id = %archive_id, error = %e, "Could not truncate rotated segment");
            false
        }
    };
    Ok(SegmentRotation::Archived { archive_id, truncated })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_segments_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let logs = LogStore::new(dir.path());
        assert_eq!(rotate_logs(&logs).await, RotationReport::default());
    }

    #[tokio::test]
    async fn rotating_an_empty_segment_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let logs = LogStore::new(dir.path());
        logs.append("a", "line").await.unwrap();

        let first = rotate_logs_at(&logs, 1).await;
        assert_eq!(first.archived, vec!["a-1"]);

        let second = rotate_logs_at(&logs, 2).await;
        assert!(second.archived.is_empty());
        assert!(second.failed.is_empty());
        assert_eq!(second.empty, vec!["a"]);
        assert!(!logs.archive_path("a-2").exists());
    }

    #[tokio::test]
    async fn existing_archive_blocks_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let logs = LogStore::new(dir.path());
        logs.append("a", "keep me").await.unwrap();
        std::fs::write(logs.archive_path("a-7"), "occupied").unwrap();

        let report = rotate_logs_at(&logs, 7).await;
        assert_eq!(report.failed, vec!["a"]);
        assert_eq!(logs.read_segment("a").await.unwrap(), "keep me\n");
        assert_eq!(std::fs::read_to_string(logs.archive_path("a-7")).unwrap(), "occupied");
    }
}
