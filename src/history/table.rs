use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::history::{day_column, Cell, DescriptivePolicy, HistoryError, DESCRIPTIVE_COLUMNS};
use crate::types::Offer;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub offer_id: String,
    pub course_name: String,
    pub institution: String,
    pub city: String,
    pub state: String,
    pub days: BTreeMap<String, Cell>,
}

/// Wide time series for one course: fixed descriptive columns plus one column per captured day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryTable {
    day_columns: Vec<String>,
    rows: Vec<HistoryRow>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub column_added: bool,
    pub rows_inserted: usize,
    pub rows_updated: usize,
    pub total_rows: usize,
}

pub fn merge(
    mut existing: HistoryTable,
    offers: &[Offer],
    capture_date: NaiveDate,
    policy: DescriptivePolicy,
) -> (HistoryTable, MergeSummary) {
    let summary = existing.merge_day(offers, capture_date, policy);
    (existing, summary)
}

impl HistoryRow {
    fn from_offer(offer: &Offer) -> Self {
        Self {
            offer_id: offer.offer_id.clone(),
            course_name: offer.course_name.clone(),
            institution: offer.institution.clone(),
            city: offer.city.clone(),
            state: offer.state.clone(),
            days: BTreeMap::new(),
        }
    }

    pub fn cell(&self, column: &str) -> Cell {
        self.days.get(column).copied().unwrap_or(Cell::Blank)
    }

    fn refresh_descriptive(&mut self, offer: &Offer) {
        self.course_name = offer.course_name.clone();
        self.institution = offer.institution.clone();
        self.city = offer.city.clone();
        self.state = offer.state.clone();
    }
}

impl HistoryTable {
    /// Rebuilds a table from a stored header and its records, in file order.
    pub fn from_records(
        header: Vec<String>,
        records: impl IntoIterator<Item = Vec<String>>,
    ) -> Result<Self, HistoryError> {
        let fixed = DESCRIPTIVE_COLUMNS.len();
        if header.len() < fixed || header[..fixed] != DESCRIPTIVE_COLUMNS {
            return Err(HistoryError::MalformedHeader {
                expected: DESCRIPTIVE_COLUMNS.iter().map(|c| c.to_string()).collect(),
                found: header,
            });
        }

        let mut table = Self::default();
        for column in &header[fixed..] {
            if table.day_columns.contains(column) || DESCRIPTIVE_COLUMNS.contains(&column.as_str())
            {
                return Err(HistoryError::DuplicateColumn(column.clone()));
            }
            table.day_columns.push(column.clone());
        }

        for record in records {
            let mut fields = record.into_iter();
            let mut next = || fields.next().unwrap_or_default();
            let mut row = HistoryRow {
                offer_id: next(),
                course_name: next(),
                institution: next(),
                city: next(),
                state: next(),
                days: BTreeMap::new(),
            };
            for column in &table.day_columns {
                let raw = next();
                let cell = Cell::parse(&raw).ok_or_else(|| HistoryError::InvalidCell {
                    offer_id: row.offer_id.clone(),
                    column: column.clone(),
                    value: raw.clone(),
                })?;
                if cell != Cell::Blank {
                    row.days.insert(column.clone(), cell);
                }
            }
            if table.index.contains_key(&row.offer_id) {
                return Err(HistoryError::DuplicateOffer(row.offer_id));
            }
            table.push_row(row);
        }
        Ok(table)
    }

    pub fn header(&self) -> Vec<String> {
        DESCRIPTIVE_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.day_columns.iter().cloned())
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.rows.iter().map(|row| {
            let mut record = vec![
                row.offer_id.clone(),
                row.course_name.clone(),
                row.institution.clone(),
                row.city.clone(),
                row.state.clone(),
            ];
            record.extend(self.day_columns.iter().map(|c| row.cell(c).to_string()));
            record
        })
    }

    pub fn day_columns(&self) -> &[String] {
        &self.day_columns
    }

    pub fn rows(&self) -> &[HistoryRow] {
        &self.rows
    }

    pub fn row(&self, offer_id: &str) -> Option<&HistoryRow> {
        self.index.get(offer_id).map(|&idx| &self.rows[idx])
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.day_columns.iter().any(|c| c == column)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Writes one day's scores. Existing rows and columns are never dropped; rows absent
    /// from `offers` keep whatever they already hold for this day.
    pub fn merge_day(
        &mut self,
        offers: &[Offer],
        capture_date: NaiveDate,
        policy: DescriptivePolicy,
    ) -> MergeSummary {
        let column = day_column(capture_date);
        let mut summary = MergeSummary::default();
        if !self.has_column(&column) {
            self.day_columns.push(column.clone());
            summary.column_added = true;
        }

        for offer in offers {
            let idx = match self.index.get(&offer.offer_id) {
                Some(&idx) => {
                    if policy == DescriptivePolicy::Overwrite {
                        self.rows[idx].refresh_descriptive(offer);
                    }
                    summary.rows_updated += 1;
                    idx
                }
                None => {
                    summary.rows_inserted += 1;
                    self.push_row(HistoryRow::from_offer(offer))
                }
            };
            self.rows[idx]
                .days
                .insert(column.clone(), Cell::from_score(offer.cutoff_score));
        }

        self.sort_rows();
        summary.total_rows = self.rows.len();
        summary
    }

    fn push_row(&mut self, row: HistoryRow) -> usize {
        if let Some(&idx) = self.index.get(&row.offer_id) {
            self.rows[idx] = row;
            return idx;
        }
        let idx = self.rows.len();
        self.index.insert(row.offer_id.clone(), idx);
        self.rows.push(row);
        idx
    }

    fn sort_rows(&mut self) {
        self.rows
            .sort_by_cached_key(|row| row.institution.to_lowercase());
        self.index = self
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (row.offer_id.clone(), idx))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::history::table::{merge, HistoryTable};
    use crate::history::{Cell, DescriptivePolicy, HistoryError};
    use crate::types::Offer;

    fn offer(id: &str, institution: &str, score: Option<f64>) -> Offer {
        Offer {
            offer_id: id.to_string(),
            institution: institution.to_string(),
            city: "Cidade".to_string(),
            state: "MG".to_string(),
            course_name: "PSICOLOGIA".to_string(),
            cutoff_score: score,
        }
    }

    fn day(d: u32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).expect("valid date")
    }

    #[test]
    fn first_merge_into_empty_history() {
        let (table, summary) = merge(
            HistoryTable::default(),
            &[offer("A1", "UFMG", Some(720.5))],
            day(5, 3),
            DescriptivePolicy::FirstWriteWins,
        );
        assert!(summary.column_added);
        assert_eq!(summary.rows_inserted, 1);
        assert_eq!(
            table.header(),
            vec!["offer_id", "course", "institution", "city", "state", "score_05_03"]
        );
        let row = table.row("A1").expect("row A1");
        assert_eq!(row.cell("score_05_03"), Cell::Score(720.5));
    }

    #[test]
    fn next_day_with_absent_score_records_sentinel() {
        let policy = DescriptivePolicy::FirstWriteWins;
        let (table, _) = merge(
            HistoryTable::default(),
            &[offer("A1", "UFMG", Some(720.5))],
            day(5, 3),
            policy,
        );
        let (table, summary) = merge(table, &[offer("A1", "UFMG", None)], day(6, 3), policy);
        assert_eq!(summary.rows_inserted, 0);
        assert_eq!(table.rows().len(), 1);
        let row = table.row("A1").expect("row A1");
        assert_eq!(row.cell("score_05_03"), Cell::Score(720.5));
        assert_eq!(row.cell("score_06_03"), Cell::NotAvailable);
    }

    #[test]
    fn same_day_rerun_is_idempotent() {
        let policy = DescriptivePolicy::FirstWriteWins;
        let offers = vec![offer("A1", "UFMG", Some(700.0)), offer("B2", "UFBA", None)];
        let (once, _) = merge(HistoryTable::default(), &offers, day(5, 3), policy);
        let (twice, summary) = merge(once.clone(), &offers, day(5, 3), policy);
        assert!(!summary.column_added);
        assert_eq!(once, twice);
        assert_eq!(twice.day_columns().len(), 1);
    }

    #[test]
    fn forced_rerun_overwrites_only_fetched_rows() {
        let policy = DescriptivePolicy::FirstWriteWins;
        let (table, _) = merge(
            HistoryTable::default(),
            &[offer("A1", "UFMG", Some(700.0)), offer("B2", "UFBA", Some(650.0))],
            day(5, 3),
            policy,
        );
        let (table, _) = merge(table, &[offer("A1", "UFMG", Some(705.0))], day(5, 3), policy);
        assert_eq!(table.row("A1").expect("A1").cell("score_05_03"), Cell::Score(705.0));
        assert_eq!(table.row("B2").expect("B2").cell("score_05_03"), Cell::Score(650.0));
    }

    #[test]
    fn columns_only_grow_and_old_values_survive() {
        let policy = DescriptivePolicy::FirstWriteWins;
        let mut table = HistoryTable::default();
        let mut previous_header = table.header();
        let mut previous = table.clone();
        for (i, d) in [5, 6, 7, 9].into_iter().enumerate() {
            let score = 700.0 + i as f64;
            let (next, _) = merge(table, &[offer("A1", "UFMG", Some(score))], day(d, 3), policy);
            let header = next.header();
            assert!(previous_header.iter().all(|c| header.contains(c)));
            assert_eq!(&header[..previous_header.len()], previous_header.as_slice());
            for column in previous.day_columns() {
                assert_eq!(
                    previous.row("A1").expect("A1").cell(column),
                    next.row("A1").expect("A1").cell(column)
                );
            }
            previous_header = header;
            previous = next.clone();
            table = next;
        }
        assert_eq!(table.day_columns().len(), 4);
    }

    #[test]
    fn missing_offer_keeps_row_with_blank_cell() {
        let policy = DescriptivePolicy::FirstWriteWins;
        let (table, _) = merge(
            HistoryTable::default(),
            &[offer("A1", "UFMG", Some(700.0)), offer("B2", "UFBA", None)],
            day(5, 3),
            policy,
        );
        let (table, _) = merge(table, &[offer("A1", "UFMG", Some(701.0))], day(6, 3), policy);
        let dropped = table.row("B2").expect("B2 retained");
        assert_eq!(dropped.cell("score_05_03"), Cell::NotAvailable);
        assert_eq!(dropped.cell("score_06_03"), Cell::Blank);
        let record = table
            .records()
            .find(|r| r[0] == "B2")
            .expect("B2 record");
        assert_eq!(record[5], "N/A");
        assert_eq!(record[6], "");
    }

    #[test]
    fn rows_sorted_by_institution_case_insensitively_and_stably() {
        let policy = DescriptivePolicy::FirstWriteWins;
        let (table, _) = merge(
            HistoryTable::default(),
            &[
                offer("1", "ufrj", Some(1.0)),
                offer("2", "UFBA", Some(2.0)),
                offer("3", "UFRJ", Some(3.0)),
                offer("4", "Ufam", Some(4.0)),
            ],
            day(5, 3),
            policy,
        );
        let ids = table
            .rows()
            .iter()
            .map(|r| r.offer_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["4", "2", "1", "3"]);
        let names = table
            .rows()
            .iter()
            .map(|r| r.institution.to_lowercase())
            .collect::<Vec<_>>();
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn descriptive_policy_controls_refresh() {
        let original = offer("A1", "UFMG", Some(700.0));
        let mut renamed = offer("A1", "UFMG", Some(701.0));
        renamed.city = "Montes Claros".to_string();

        let (kept, _) = merge(
            HistoryTable::default(),
            &[original.clone()],
            day(5, 3),
            DescriptivePolicy::FirstWriteWins,
        );
        let (kept, _) = merge(
            kept,
            &[renamed.clone()],
            day(6, 3),
            DescriptivePolicy::FirstWriteWins,
        );
        assert_eq!(kept.row("A1").expect("A1").city, "Cidade");

        let (refreshed, _) = merge(
            HistoryTable::default(),
            &[original],
            day(5, 3),
            DescriptivePolicy::Overwrite,
        );
        let (refreshed, _) = merge(refreshed, &[renamed], day(6, 3), DescriptivePolicy::Overwrite);
        assert_eq!(refreshed.row("A1").expect("A1").city, "Montes Claros");
    }

    #[test]
    fn all_absent_scores_still_create_the_day_column() {
        let (table, summary) = merge(
            HistoryTable::default(),
            &[offer("A1", "UFMG", None), offer("B2", "UFBA", None)],
            day(5, 3),
            DescriptivePolicy::FirstWriteWins,
        );
        assert!(summary.column_added);
        assert!(table
            .rows()
            .iter()
            .all(|r| r.cell("score_05_03") == Cell::NotAvailable));
    }

    #[test]
    fn loads_stored_records_and_rejects_bad_cells() {
        let header = ["offer_id", "course", "institution", "city", "state", "nota_21_01"]
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>();
        let good = vec![vec![
            "A1".to_string(),
            "PSICOLOGIA".to_string(),
            "UFMG".to_string(),
            "BH".to_string(),
            "MG".to_string(),
            "712.3".to_string(),
        ]];
        let table = HistoryTable::from_records(header.clone(), good).expect("valid table");
        assert_eq!(
            table.row("A1").expect("A1").cell("nota_21_01"),
            Cell::Score(712.3)
        );

        let bad = vec![vec![
            "A1".to_string(),
            "PSICOLOGIA".to_string(),
            "UFMG".to_string(),
            "BH".to_string(),
            "MG".to_string(),
            "oops".to_string(),
        ]];
        let err = HistoryTable::from_records(header, bad).expect_err("bad cell");
        assert!(matches!(err, HistoryError::InvalidCell { .. }));

        let err = HistoryTable::from_records(vec!["id".to_string()], Vec::new())
            .expect_err("bad header");
        assert!(matches!(err, HistoryError::MalformedHeader { .. }));
    }

    #[test]
    fn repeated_offer_id_in_stored_file_is_rejected() {
        let header = ["offer_id", "course", "institution", "city", "state", "score_21_01"]
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>();
        let record = |score: &str| {
            ["A1", "PSICOLOGIA", "UFMG", "BH", "MG", score]
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
        };
        let err = HistoryTable::from_records(header, vec![record("712.3"), record("690")])
            .expect_err("duplicate offer");
        assert!(matches!(err, HistoryError::DuplicateOffer(ref id) if id == "A1"));
    }
}
