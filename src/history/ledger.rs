use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};

use crate::history::migrations::BASE_MIGRATION;
use crate::history::table::HistoryTable;
use crate::history::DescriptivePolicy;
use crate::types::Offer;

/// Relational form of the history: one row per (course, offer, date, source).
pub struct ScoreLedger {
    conn: Connection,
    policy: DescriptivePolicy,
}

impl ScoreLedger {
    pub fn open(path: &Path, policy: DescriptivePolicy) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let ledger = Self { conn, policy };
        ledger.migrate()?;
        Ok(ledger)
    }

    pub fn open_in_memory(policy: DescriptivePolicy) -> Result<Self> {
        let ledger = Self {
            conn: Connection::open_in_memory()?,
            policy,
        };
        ledger.migrate()?;
        Ok(ledger)
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(BASE_MIGRATION)?;
        Ok(())
    }

    /// Upserts one day's scores; re-recording the same day replaces the score in place.
    pub fn record_day(
        &mut self,
        course_id: &str,
        source: &str,
        offers: &[Offer],
        date: NaiveDate,
    ) -> Result<usize> {
        let sql = match self.policy {
            DescriptivePolicy::FirstWriteWins => {
                r#"
INSERT INTO score_points(
    course_id, offer_id, university, city, uf, course_name, date, score, source, recorded_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(course_id, offer_id, date, source) DO UPDATE SET
    score = excluded.score,
    recorded_at = excluded.recorded_at
"#
            }
            DescriptivePolicy::Overwrite => {
                r#"
INSERT INTO score_points(
    course_id, offer_id, university, city, uf, course_name, date, score, source, recorded_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(course_id, offer_id, date, source) DO UPDATE SET
    university = excluded.university,
    city = excluded.city,
    uf = excluded.uf,
    course_name = excluded.course_name,
    score = excluded.score,
    recorded_at = excluded.recorded_at
"#
            }
        };

        let recorded_at = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(sql)?;
            for offer in offers {
                stmt.execute(params![
                    course_id,
                    offer.offer_id,
                    offer.institution,
                    offer.city,
                    offer.state,
                    offer.course_name,
                    date.to_string(),
                    offer.cutoff_score,
                    source,
                    recorded_at
                ])?;
            }
        }
        tx.commit()?;
        Ok(offers.len())
    }

    /// Pivots the stored points back into the wide table, replaying days in date order.
    pub fn load_table(&self, course_id: &str, source: &str) -> Result<HistoryTable> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT offer_id, university, city, uf, course_name, date, score
FROM score_points
WHERE course_id = ?1 AND source = ?2
ORDER BY date ASC, id ASC
"#,
        )?;
        let points = stmt
            .query_map(params![course_id, source], |row| {
                Ok((
                    row.get::<_, String>(5)?,
                    Offer {
                        offer_id: row.get(0)?,
                        institution: row.get(1)?,
                        city: row.get(2)?,
                        state: row.get(3)?,
                        course_name: row.get(4)?,
                        cutoff_score: row.get(6)?,
                    },
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut table = HistoryTable::default();
        let mut current: Option<(NaiveDate, Vec<Offer>)> = None;
        for (raw_date, offer) in points {
            let date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d")
                .with_context(|| format!("invalid ledger date: {raw_date}"))?;
            if let Some((_, offers)) = current.as_mut().filter(|(day, _)| *day == date) {
                offers.push(offer);
                continue;
            }
            if let Some((day, offers)) = current.take() {
                table.merge_day(&offers, day, self.policy);
            }
            current = Some((date, vec![offer]));
        }
        if let Some((day, offers)) = current {
            table.merge_day(&offers, day, self.policy);
        }
        Ok(table)
    }

    pub fn dates(&self, course_id: &str, source: &str) -> Result<Vec<NaiveDate>> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT DISTINCT date
FROM score_points
WHERE course_id = ?1 AND source = ?2
ORDER BY date ASC
"#,
        )?;
        let raw = stmt
            .query_map(params![course_id, source], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raw.iter()
            .map(|d| {
                NaiveDate::parse_from_str(d, "%Y-%m-%d")
                    .with_context(|| format!("invalid ledger date: {d}"))
            })
            .collect()
    }
}
