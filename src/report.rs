use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::atomic::write_atomic;
use crate::output::json::render_json;
use crate::types::Offer;

const RULE_WIDTH: usize = 70;

/// Daily snapshots for one course. Overwritten on every run; history lives elsewhere.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub text: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn write(
        &self,
        course_id: &str,
        offers: &[Offer],
        generated_at: NaiveDateTime,
    ) -> Result<ReportPaths> {
        let paths = ReportPaths {
            json: self.dir.join(format!("scores_course_{course_id}.json")),
            text: self.dir.join(format!("scores_course_{course_id}.txt")),
        };
        write_atomic(&paths.json, render_json(offers)?.as_bytes())?;
        write_atomic(
            &paths.text,
            render_listing(course_id, offers, generated_at).as_bytes(),
        )?;
        Ok(paths)
    }
}

pub fn render_listing(course_id: &str, offers: &[Offer], generated_at: NaiveDateTime) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "CUTOFF SCORES - COURSE ID {course_id} | GENERATED AT: {}",
        generated_at.format("%d/%m/%Y %H:%M")
    );
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(out, "{:<10} | {:<25} | {:<3} | SCORE", "IES", "CITY", "UF");
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    for offer in offers {
        let city: String = offer.city.chars().take(25).collect();
        let score = offer
            .cutoff_score
            .map(|s| format!("{s:.2}"))
            .unwrap_or_else(|| "N/A".to_string());
        let _ = writeln!(
            out,
            "{:<10} | {:<25} | {:<3} | {score}",
            offer.institution, city, offer.state
        );
    }
    out
}
