pub mod ledger;
pub mod migrations;
pub mod store;
pub mod table;

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use ledger::ScoreLedger;
pub use store::{HistoryStore, MergeReport};
pub use table::{merge, HistoryRow, HistoryTable, MergeSummary};

pub const DESCRIPTIVE_COLUMNS: [&str; 5] = ["offer_id", "course", "institution", "city", "state"];
pub const NOT_AVAILABLE: &str = "N/A";
pub const DAY_COLUMN_PREFIX: &str = "score_";

/// Column holding the scores captured on `date`, e.g. `score_05_03`.
pub fn day_column(date: NaiveDate) -> String {
    format!("{DAY_COLUMN_PREFIX}{}", date.format("%d_%m"))
}

/// Whether re-observing an offer may refresh its descriptive fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DescriptivePolicy {
    #[default]
    FirstWriteWins,
    Overwrite,
}

/// One day's value for one offer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    /// The offer was not part of that day's fetch.
    Blank,
    /// Fetched that day, but no open-competition score was published.
    NotAvailable,
    Score(f64),
}

impl Cell {
    pub fn from_score(score: Option<f64>) -> Self {
        score.map(Cell::Score).unwrap_or(Cell::NotAvailable)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Some(Cell::Blank);
        }
        if trimmed == NOT_AVAILABLE {
            return Some(Cell::NotAvailable);
        }
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Cell::Score)
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Blank => Ok(()),
            Cell::NotAvailable => write!(f, "{NOT_AVAILABLE}"),
            Cell::Score(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history header must start with {expected:?}, found {found:?}")]
    MalformedHeader {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("duplicate day column in history header: {0}")]
    DuplicateColumn(String),
    #[error("offer {0} appears more than once in history")]
    DuplicateOffer(String),
    #[error("invalid cell {value:?} for offer {offer_id} in column {column}")]
    InvalidCell {
        offer_id: String,
        column: String,
        value: String,
    },
    #[error("history store is locked by another run: {}", .0.display())]
    Locked(PathBuf),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
