use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::atomic::{write_atomic, FileLock};
use crate::history::table::{HistoryTable, MergeSummary};
use crate::history::{day_column, DescriptivePolicy, HistoryError};
use crate::output::csv::history_to_csv;
use crate::types::Offer;

/// Flat-file history: one delimited file per course (and per non-official source).
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
    policy: DescriptivePolicy,
    lock_stale_after: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub path: PathBuf,
    pub column: String,
    pub summary: MergeSummary,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>, policy: DescriptivePolicy, lock_stale_after: Duration) -> Self {
        Self {
            dir: dir.into(),
            policy,
            lock_stale_after,
        }
    }

    pub fn path_for(&self, course_id: &str, source: &str) -> PathBuf {
        let name = if source == "official" {
            format!("history_course_{course_id}.csv")
        } else {
            format!("history_course_{course_id}_{source}.csv")
        };
        self.dir.join(name)
    }

    pub fn load(&self, course_id: &str, source: &str) -> Result<HistoryTable> {
        load_table(&self.path_for(course_id, source))
    }

    /// Whether a capture for `date` has already been merged into the store.
    pub fn has_day(&self, course_id: &str, source: &str, date: NaiveDate) -> Result<bool> {
        let path = self.path_for(course_id, source);
        if !path.exists() {
            return Ok(false);
        }
        let file = File::open(&path)
            .with_context(|| format!("failed opening history: {}", path.display()))?;
        let mut reader = csv::Reader::from_reader(file);
        let column = day_column(date);
        let headers = reader
            .headers()
            .with_context(|| format!("failed reading history header: {}", path.display()))?;
        Ok(headers.iter().any(|h| h == column))
    }

    /// Loads, merges and atomically rewrites the store while holding its lock.
    pub fn merge_offers(
        &self,
        course_id: &str,
        source: &str,
        offers: &[Offer],
        capture_date: NaiveDate,
    ) -> Result<MergeReport> {
        let mut reports = self.merge_days(course_id, source, &[(capture_date, offers.to_vec())])?;
        reports
            .pop()
            .context("merge produced no report")
    }

    /// Merges several capture days in order under a single lock and a single write.
    pub fn merge_days(
        &self,
        course_id: &str,
        source: &str,
        days: &[(NaiveDate, Vec<Offer>)],
    ) -> Result<Vec<MergeReport>> {
        let path = self.path_for(course_id, source);
        let _lock = FileLock::acquire(&lock_path(&path), self.lock_stale_after)?;

        let mut table = load_table(&path)?;
        let mut reports = Vec::with_capacity(days.len());
        for (date, offers) in days {
            let summary = table.merge_day(offers, *date, self.policy);
            debug!(
                "merged {} offers into {} for {}",
                offers.len(),
                path.display(),
                day_column(*date)
            );
            reports.push(MergeReport {
                path: path.clone(),
                column: day_column(*date),
                summary,
            });
        }
        save_table(&path, &table)?;
        info!(
            "history {} now has {} rows and {} day columns",
            path.display(),
            table.rows().len(),
            table.day_columns().len()
        );
        Ok(reports)
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

pub fn load_table(path: &Path) -> Result<HistoryTable> {
    if !path.exists() {
        return Ok(HistoryTable::default());
    }
    let file =
        File::open(path).with_context(|| format!("failed opening history: {}", path.display()))?;
    let mut reader = csv::Reader::from_reader(file);
    let header = reader
        .headers()
        .map_err(HistoryError::from)?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let records = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect::<Vec<_>>()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(HistoryError::from)?;
    let table = HistoryTable::from_records(header, records)
        .with_context(|| format!("failed parsing history: {}", path.display()))?;
    Ok(table)
}

pub fn save_table(path: &Path, table: &HistoryTable) -> Result<()> {
    write_atomic(path, history_to_csv(table)?.as_bytes())
}
