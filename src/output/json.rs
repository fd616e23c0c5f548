use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use crate::history::HistoryTable;

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[derive(Debug, Serialize)]
struct HistoryRowView<'a> {
    offer_id: &'a str,
    course: &'a str,
    institution: &'a str,
    city: &'a str,
    state: &'a str,
    scores: BTreeMap<&'a str, String>,
}

/// Day cells keyed by column; blank cells are omitted and `N/A` stays a string.
pub fn history_to_json(table: &HistoryTable) -> Result<String> {
    let rows = table
        .rows()
        .iter()
        .map(|row| HistoryRowView {
            offer_id: &row.offer_id,
            course: &row.course_name,
            institution: &row.institution,
            city: &row.city,
            state: &row.state,
            scores: table
                .day_columns()
                .iter()
                .filter_map(|column| {
                    let cell = row.days.get(column)?;
                    Some((column.as_str(), cell.to_string()))
                })
                .collect(),
        })
        .collect::<Vec<_>>();
    render_json(&rows)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::history::{merge, DescriptivePolicy, HistoryTable};
    use crate::output::json::history_to_json;
    use crate::types::Offer;

    #[test]
    fn history_json_omits_blank_days() {
        let offer = |id: &str, score| Offer {
            offer_id: id.to_string(),
            institution: "UFSC".to_string(),
            city: "Florianópolis".to_string(),
            state: "SC".to_string(),
            course_name: "MEDICINA".to_string(),
            cutoff_score: score,
        };
        let d1 = NaiveDate::from_ymd_opt(2026, 1, 20).expect("date");
        let d2 = NaiveDate::from_ymd_opt(2026, 1, 21).expect("date");
        let policy = DescriptivePolicy::FirstWriteWins;
        let (table, _) = merge(
            HistoryTable::default(),
            &[offer("A", Some(780.0)), offer("B", None)],
            d1,
            policy,
        );
        let (table, _) = merge(table, &[offer("A", Some(781.0))], d2, policy);
        let rendered: serde_json::Value =
            serde_json::from_str(&history_to_json(&table).expect("json")).expect("parse");
        let b = rendered
            .as_array()
            .and_then(|rows| rows.iter().find(|r| r["offer_id"] == "B"))
            .expect("row B");
        assert_eq!(b["scores"]["score_20_01"], "N/A");
        assert!(b["scores"].get("score_21_01").is_none());
    }
}
