use std::collections::BTreeMap;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::batch::{BatchEntry, BatchStatus};
use crate::history::{Cell as DayCell, HistoryTable};
use crate::types::Offer;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Wide history view; `max_days == 0` shows every captured day.
pub fn render_history_table(history: &HistoryTable, max_days: usize) -> String {
    let columns = history.day_columns();
    let shown = if max_days == 0 || max_days >= columns.len() {
        columns
    } else {
        &columns[columns.len() - max_days..]
    };

    let mut table = new_table();
    let mut header = vec!["IES".to_string(), "City".to_string(), "UF".to_string()];
    header.extend(shown.iter().map(|c| c.trim_start_matches("score_").replace('_', "/")));
    table.set_header(header);

    for row in history.rows() {
        let mut cells = vec![
            Cell::new(&row.institution),
            Cell::new(&row.city),
            Cell::new(&row.state),
        ];
        cells.extend(shown.iter().map(|column| match row.cell(column) {
            DayCell::Score(v) => Cell::new(format!("{v:.2}")),
            DayCell::NotAvailable => Cell::new("N/A").fg(Color::Yellow),
            DayCell::Blank => Cell::new("-").fg(Color::DarkGrey),
        }));
        table.add_row(Row::from(cells));
    }
    table.to_string()
}

pub fn render_offers_table(offers: &[Offer]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Rank", "IES", "City", "UF", "Score"]);
    for (idx, offer) in offers.iter().enumerate() {
        let score = match offer.cutoff_score {
            Some(v) => Cell::new(format!("{v:.2}")),
            None => Cell::new("N/A").fg(Color::Yellow),
        };
        table.add_row(Row::from(vec![
            Cell::new((idx + 1).to_string()),
            Cell::new(&offer.institution),
            Cell::new(&offer.city),
            Cell::new(&offer.state),
            score,
        ]));
    }
    table.to_string()
}

pub fn render_courses_table(courses: &BTreeMap<String, String>) -> String {
    let mut table = new_table();
    table.set_header(vec!["Course", "ID"]);
    for (name, id) in courses {
        table.add_row(vec![name.clone(), id.clone()]);
    }
    table.to_string()
}

pub fn render_batch_table(entries: &[BatchEntry]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Course", "Status", "Details"]);
    for entry in entries {
        let (label, color, details) = match &entry.status {
            BatchStatus::Synced { offers, scored } => (
                "SYNCED",
                Color::Green,
                format!("{scored}/{offers} offers scored"),
            ),
            BatchStatus::Skipped => ("SKIPPED", Color::DarkGrey, "already updated today".to_string()),
            BatchStatus::NoData => ("NO DATA", Color::Yellow, "empty offer list".to_string()),
            BatchStatus::Failed(reason) => ("FAILED", Color::Red, reason.clone()),
        };
        table.add_row(Row::from(vec![
            Cell::new(&entry.course_id),
            Cell::new(label).fg(color),
            Cell::new(details),
        ]));
    }
    table.to_string()
}
