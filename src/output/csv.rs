use std::collections::BTreeMap;

use anyhow::Result;

use crate::history::HistoryTable;
use crate::types::Offer;

pub fn history_to_csv(table: &HistoryTable) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(table.header())?;
    for record in table.records() {
        writer.write_record(record)?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn courses_to_csv(courses: &BTreeMap<String, String>) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["course", "course_id"])?;
    for (name, id) in courses {
        writer.write_record([name, id])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn offers_to_csv(offers: &[Offer]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["offer_id", "course", "institution", "city", "state", "score"])?;
    for offer in offers {
        let score = offer
            .cutoff_score
            .map(|s| s.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        writer.write_record([
            offer.offer_id.as_str(),
            offer.course_name.as_str(),
            offer.institution.as_str(),
            offer.city.as_str(),
            offer.state.as_str(),
            score.as_str(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
