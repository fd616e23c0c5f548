use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::builder::build_offer;
use crate::config::Config;
use crate::history::{HistoryStore, MergeReport, ScoreLedger};
use crate::progress::ProgressSink;
use crate::providers::specialist::daily_offers;
use crate::providers::ScoreProvider;
use crate::report::{ReportPaths, ReportWriter};
use crate::types::{sort_by_score, Offer, RawOffer};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub workers: usize,
    pub parallel: bool,
    pub request_delay: Duration,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.sync.workers.max(1),
            parallel: config.sync.parallel,
            request_delay: Duration::from_millis(config.sync.request_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub course_id: String,
    pub captured_at: NaiveDateTime,
    pub offers: Vec<Offer>,
    /// Score lookups whose worker task died before producing an offer.
    pub failed: usize,
    pub reports: ReportPaths,
    pub history: MergeReport,
}

impl SyncReport {
    pub fn scored(&self) -> usize {
        self.offers.iter().filter(|o| o.cutoff_score.is_some()).count()
    }

    pub fn unscored(&self) -> usize {
        self.offers.len() - self.scored()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    NoData { course_id: String },
    Completed(SyncReport),
}

/// Fetch, score, report, then merge into history for one course at a time.
pub struct SyncPipeline {
    provider: Arc<dyn ScoreProvider>,
    store: HistoryStore,
    reports: ReportWriter,
    ledger: Option<Mutex<ScoreLedger>>,
    options: SyncOptions,
}

impl SyncPipeline {
    pub fn new(
        provider: Arc<dyn ScoreProvider>,
        store: HistoryStore,
        reports: ReportWriter,
        options: SyncOptions,
    ) -> Self {
        Self {
            provider,
            store,
            reports,
            ledger: None,
            options,
        }
    }

    pub fn with_ledger(mut self, ledger: ScoreLedger) -> Self {
        self.ledger = Some(Mutex::new(ledger));
        self
    }

    pub fn from_config(config: &Config, provider: Arc<dyn ScoreProvider>) -> Result<Self> {
        let store = HistoryStore::new(
            config.history_dir(),
            config.history.descriptive_policy,
            Duration::from_secs(config.history.lock_stale_secs),
        );
        let pipeline = Self::new(
            provider,
            store,
            ReportWriter::new(config.reports_dir()),
            SyncOptions::from_config(config),
        );
        if config.storage.ledger_enabled {
            let ledger = ScoreLedger::open(&config.ledger_path(), config.history.descriptive_policy)?;
            return Ok(pipeline.with_ledger(ledger));
        }
        Ok(pipeline)
    }

    pub fn source(&self) -> &'static str {
        self.provider.kind().as_slug()
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Whether today's column already exists for this course and provider.
    pub fn is_up_to_date(&self, course_id: &str, date: NaiveDate) -> Result<bool> {
        self.store.has_day(course_id, self.source(), date)
    }

    pub async fn run(
        &self,
        course_id: &str,
        captured_at: NaiveDateTime,
        progress: &dyn ProgressSink,
    ) -> Result<SyncOutcome> {
        let raw = self.provider.list_offers(course_id).await;
        if raw.is_empty() {
            warn!("no offers listed for course {course_id}");
            return Ok(SyncOutcome::NoData {
                course_id: course_id.to_string(),
            });
        }
        info!(
            "course {course_id}: fetching {} scores ({})",
            raw.len(),
            if self.options.parallel { "parallel" } else { "sequential" }
        );

        let (mut offers, failed) = if self.options.parallel {
            self.fetch_parallel(raw, progress).await
        } else {
            (self.fetch_sequential(raw, progress).await, 0)
        };
        sort_by_score(&mut offers);

        let reports = self.reports.write(course_id, &offers, captured_at)?;
        let date = captured_at.date();
        let history = self
            .store
            .merge_offers(course_id, self.source(), &offers, date)?;
        self.record_ledger(course_id, &offers, date)?;

        Ok(SyncOutcome::Completed(SyncReport {
            course_id: course_id.to_string(),
            captured_at,
            offers,
            failed,
            reports,
            history,
        }))
    }

    /// Merges every partial day published by a whole-course source.
    pub async fn import_full_history(
        &self,
        course_id: &str,
        course_name: &str,
    ) -> Result<Vec<MergeReport>> {
        let rows = self.provider.full_history(course_name).await;
        if rows.is_empty() {
            warn!("no history rows for {course_name}");
            return Ok(Vec::new());
        }
        let days = daily_offers(&rows, course_name);
        let merged = self.store.merge_days(course_id, self.source(), &days)?;
        for (date, offers) in &days {
            self.record_ledger(course_id, offers, *date)?;
        }
        Ok(merged)
    }

    fn record_ledger(&self, course_id: &str, offers: &[Offer], date: NaiveDate) -> Result<()> {
        let Some(ledger) = &self.ledger else {
            return Ok(());
        };
        let mut ledger = ledger
            .lock()
            .map_err(|_| anyhow!("score ledger lock poisoned"))?;
        ledger.record_day(course_id, self.source(), offers, date)?;
        Ok(())
    }

    async fn fetch_parallel(
        &self,
        raw: Vec<RawOffer>,
        progress: &dyn ProgressSink,
    ) -> (Vec<Offer>, usize) {
        let total = raw.len();
        let permits = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut tasks = JoinSet::new();
        for item in raw {
            let provider = Arc::clone(&self.provider);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let score = provider.cutoff_score(&item.offer_id).await;
                build_offer(item, score)
            });
        }

        let mut offers = Vec::with_capacity(total);
        let mut failed = 0;
        let mut resolved = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(offer) => offers.push(offer),
                Err(err) => {
                    warn!("score task failed: {err}");
                    failed += 1;
                }
            }
            resolved += 1;
            progress.report(resolved as f64 / total as f64);
        }
        (offers, failed)
    }

    async fn fetch_sequential(&self, raw: Vec<RawOffer>, progress: &dyn ProgressSink) -> Vec<Offer> {
        let total = raw.len();
        let mut offers = Vec::with_capacity(total);
        for (idx, item) in raw.into_iter().enumerate() {
            if idx > 0 && !self.options.request_delay.is_zero() {
                tokio::time::sleep(self.options.request_delay).await;
            }
            let score = self.provider.cutoff_score(&item.offer_id).await;
            offers.push(build_offer(item, score));
            progress.report((idx + 1) as f64 / total as f64);
        }
        offers
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};

    use crate::history::{Cell, DescriptivePolicy, HistoryStore, ScoreLedger};
    use crate::pipeline::{SyncOptions, SyncOutcome, SyncPipeline};
    use crate::progress::NoProgress;
    use crate::providers::{ProviderKind, ScoreProvider};
    use crate::report::ReportWriter;
    use crate::types::{DatedScore, RawOffer, SpecialistRow};

    /// In-memory provider; offers whose id is in `panics` kill their worker task.
    #[derive(Default)]
    pub(crate) struct FakeProvider {
        pub kind: Option<ProviderKind>,
        pub offers: HashMap<String, Vec<RawOffer>>,
        pub scores: HashMap<String, f64>,
        pub panics: Vec<String>,
        pub history: Vec<SpecialistRow>,
    }

    impl FakeProvider {
        pub(crate) fn with_course(mut self, course_id: &str, offers: &[(&str, &str, Option<f64>)]) -> Self {
            let raw = offers
                .iter()
                .map(|(id, inst, _)| {
                    RawOffer::new(*id, *inst)
                        .with_campus("Recife", "PE")
                        .with_course("MEDICINA")
                })
                .collect();
            for (id, _, score) in offers {
                if let Some(score) = score {
                    self.scores.insert(id.to_string(), *score);
                }
            }
            self.offers.insert(course_id.to_string(), raw);
            self
        }
    }

    #[async_trait]
    impl ScoreProvider for FakeProvider {
        fn kind(&self) -> ProviderKind {
            self.kind.unwrap_or(ProviderKind::Official)
        }

        async fn list_offers(&self, course_id: &str) -> Vec<RawOffer> {
            self.offers.get(course_id).cloned().unwrap_or_default()
        }

        async fn cutoff_score(&self, offer_id: &str) -> Option<f64> {
            if self.panics.iter().any(|id| id == offer_id) {
                panic!("worker died on {offer_id}");
            }
            self.scores.get(offer_id).copied()
        }

        async fn full_history(&self, _course_name: &str) -> Vec<SpecialistRow> {
            self.history.clone()
        }
    }

    pub(crate) fn pipeline(dir: &std::path::Path, provider: FakeProvider, parallel: bool) -> SyncPipeline {
        SyncPipeline::new(
            Arc::new(provider),
            HistoryStore::new(
                dir.join("history"),
                DescriptivePolicy::FirstWriteWins,
                Duration::from_secs(900),
            ),
            ReportWriter::new(dir.join("reports")),
            SyncOptions {
                workers: 3,
                parallel,
                request_delay: Duration::from_millis(1),
            },
        )
    }

    pub(crate) fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, day)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .expect("valid timestamp")
    }

    fn course_44() -> FakeProvider {
        FakeProvider::default().with_course(
            "44",
            &[
                ("1", "UFPE", Some(760.0)),
                ("2", "UPE", None),
                ("3", "UFRPE", Some(701.5)),
                ("4", "UNIVASF", Some(730.25)),
            ],
        )
    }

    #[tokio::test]
    async fn parallel_sync_writes_reports_and_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = pipeline(dir.path(), course_44(), true);
        let seen = Mutex::new(Vec::new());
        let progress = |f: f64| seen.lock().expect("lock").push(f);

        let outcome = pipeline.run("44", at(21), &progress).await.expect("sync");
        let SyncOutcome::Completed(report) = outcome else {
            panic!("expected a completed sync");
        };
        let scores = report.offers.iter().map(|o| o.cutoff_score).collect::<Vec<_>>();
        assert_eq!(scores, vec![Some(701.5), Some(730.25), Some(760.0), None]);
        assert_eq!(report.scored(), 3);
        assert_eq!(report.unscored(), 1);
        assert_eq!(report.failed, 0);
        assert!(report.reports.json.exists());
        assert!(report.reports.text.exists());
        assert_eq!(report.history.column, "score_21_01");
        assert_eq!(report.history.summary.rows_inserted, 4);

        let fractions = seen.lock().expect("lock").clone();
        assert_eq!(fractions.len(), 4);
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(fractions.last().copied(), Some(1.0));

        let table = pipeline.store().load("44", "official").expect("history");
        assert_eq!(table.row("2").expect("row").cell("score_21_01"), Cell::NotAvailable);
        assert!(pipeline.is_up_to_date("44", at(21).date()).expect("check"));
    }

    #[tokio::test]
    async fn sequential_sync_matches_parallel_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = pipeline(dir.path(), course_44(), false);
        let SyncOutcome::Completed(report) =
            pipeline.run("44", at(21), &NoProgress).await.expect("sync")
        else {
            panic!("expected a completed sync");
        };
        let ids = report.offers.iter().map(|o| o.offer_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["3", "4", "1", "2"]);
    }

    #[tokio::test]
    async fn empty_offer_list_leaves_storage_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = pipeline(dir.path(), course_44(), true);
        let outcome = pipeline.run("999", at(21), &NoProgress).await.expect("sync");
        assert!(matches!(outcome, SyncOutcome::NoData { .. }));
        assert!(!dir.path().join("history").exists());
        assert!(!dir.path().join("reports").exists());
    }

    #[tokio::test]
    async fn dead_worker_is_excluded_not_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut provider = course_44();
        provider.panics.push("3".to_string());
        let pipeline = pipeline(dir.path(), provider, true);
        let SyncOutcome::Completed(report) =
            pipeline.run("44", at(21), &NoProgress).await.expect("sync")
        else {
            panic!("expected a completed sync");
        };
        assert_eq!(report.failed, 1);
        assert_eq!(report.offers.len(), 3);
        assert!(report.offers.iter().all(|o| o.offer_id != "3"));
    }

    #[tokio::test]
    async fn imports_specialist_partial_days_with_ledger() {
        let dir = tempfile::tempdir().expect("tempdir");
        let date = |d| NaiveDate::from_ymd_opt(2026, 1, d).expect("date");
        let provider = FakeProvider {
            kind: Some(ProviderKind::Specialist),
            history: vec![SpecialistRow {
                institution: "UFC".to_string(),
                city: "Fortaleza".to_string(),
                state: "CE".to_string(),
                scores: vec![
                    DatedScore { date: date(20), score: Some(745.0) },
                    DatedScore { date: date(21), score: None },
                ],
            }],
            ..FakeProvider::default()
        };
        let ledger = ScoreLedger::open_in_memory(DescriptivePolicy::FirstWriteWins).expect("ledger");
        let pipeline = pipeline(dir.path(), provider, true).with_ledger(ledger);

        let merged = pipeline
            .import_full_history("12", "DIREITO")
            .await
            .expect("import");
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].column, "score_20_01");

        let table = pipeline.store().load("12", "specialist").expect("history");
        assert_eq!(table.day_columns(), ["score_20_01", "score_21_01"]);
        let row = &table.rows()[0];
        assert!(row.offer_id.starts_with("sp-"));
        assert_eq!(row.cell("score_20_01"), Cell::Score(745.0));
        assert_eq!(row.cell("score_21_01"), Cell::NotAvailable);
        assert!(dir
            .path()
            .join("history")
            .join("history_course_12_specialist.csv")
            .exists());
    }

    #[tokio::test]
    async fn empty_specialist_history_merges_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = FakeProvider {
            kind: Some(ProviderKind::Specialist),
            ..FakeProvider::default()
        };
        let pipeline = pipeline(dir.path(), provider, true);
        let merged = pipeline
            .import_full_history("12", "DIREITO")
            .await
            .expect("import");
        assert!(merged.is_empty());
        assert!(!dir.path().join("history").exists());
    }
}
