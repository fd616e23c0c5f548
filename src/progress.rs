use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

/// Receives the fraction of offers resolved so far, in `[0, 1]`.
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, fraction: f64) {
        self(fraction)
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f64) {}
}

/// Forwards fractions to a receiver polled elsewhere; a dropped receiver is ignored.
pub struct ChannelProgress {
    tx: UnboundedSender<f64>,
}

impl ChannelProgress {
    pub fn new(tx: UnboundedSender<f64>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, fraction: f64) {
        let _ = self.tx.send(fraction);
    }
}

/// Logs once per 10% step crossed.
pub struct MilestoneLogger {
    label: String,
    last_step: Mutex<Option<u32>>,
}

impl MilestoneLogger {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_step: Mutex::new(None),
        }
    }

    /// Returns the percentage to announce when `fraction` enters a new 10% bracket.
    fn advance(&self, fraction: f64) -> Option<u32> {
        let step = (fraction.clamp(0.0, 1.0) * 10.0).floor() as u32;
        let mut last = match self.last_step.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.map(|prev| step > prev).unwrap_or(true) {
            *last = Some(step);
            return Some(step * 10);
        }
        None
    }
}

impl ProgressSink for MilestoneLogger {
    fn report(&self, fraction: f64) {
        if let Some(percent) = self.advance(fraction) {
            info!("{}: {percent}%", self.label);
        }
    }
}
