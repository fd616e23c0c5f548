use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{error, info};

use crate::pipeline::{SyncOutcome, SyncPipeline};
use crate::progress::MilestoneLogger;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum BatchStatus {
    Synced { offers: usize, scored: usize },
    Skipped,
    NoData,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchEntry {
    pub course_id: String,
    pub status: BatchStatus,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Re-sync courses whose store already holds today's column.
    pub force: bool,
    pub pause: Duration,
}

/// Syncs each course in turn. One course failing never stops the rest.
pub async fn run_batch(
    pipeline: &SyncPipeline,
    course_ids: &[String],
    captured_at: NaiveDateTime,
    options: &BatchOptions,
) -> Vec<BatchEntry> {
    let mut entries = Vec::with_capacity(course_ids.len());
    for (idx, course_id) in course_ids.iter().enumerate() {
        info!("[{}/{}] course {course_id}", idx + 1, course_ids.len());
        let status = sync_one(pipeline, course_id, captured_at, options.force).await;
        let synced = matches!(status, BatchStatus::Synced { .. });
        entries.push(BatchEntry {
            course_id: course_id.clone(),
            status,
        });
        if synced && idx + 1 < course_ids.len() && !options.pause.is_zero() {
            tokio::time::sleep(options.pause).await;
        }
    }
    let synced = entries
        .iter()
        .filter(|e| matches!(e.status, BatchStatus::Synced { .. }))
        .count();
    info!("batch finished: {synced}/{} courses synced", entries.len());
    entries
}

async fn sync_one(
    pipeline: &SyncPipeline,
    course_id: &str,
    captured_at: NaiveDateTime,
    force: bool,
) -> BatchStatus {
    if !force {
        match pipeline.is_up_to_date(course_id, captured_at.date()) {
            Ok(true) => {
                info!("course {course_id} already updated today, skipping");
                return BatchStatus::Skipped;
            }
            Ok(false) => {}
            Err(err) => {
                error!("course {course_id}: {err:#}");
                return BatchStatus::Failed(format!("{err:#}"));
            }
        }
    }

    let progress = MilestoneLogger::new(format!("course {course_id}"));
    match pipeline.run(course_id, captured_at, &progress).await {
        Ok(SyncOutcome::Completed(report)) => BatchStatus::Synced {
            offers: report.offers.len(),
            scored: report.scored(),
        },
        Ok(SyncOutcome::NoData { .. }) => BatchStatus::NoData,
        Err(err) => {
            error!("course {course_id}: {err:#}");
            BatchStatus::Failed(format!("{err:#}"))
        }
    }
}
