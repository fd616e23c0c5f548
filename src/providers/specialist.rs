use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::SpecialistConfig;
use crate::providers::http::{
    find_key_recursive, number_from_keys, object_get_case_insensitive, sha256_hex,
    string_from_keys, HttpClient,
};
use crate::providers::{ProviderKind, ScoreProvider};
use crate::types::{DatedScore, Offer, RawOffer, SpecialistRow};

const BUTTON_ID: &str = "e3e70682-c209-4cac-629f-6fbed82c07cd";
const TABLE_ID: &str = "82e2e662-f728-b4fa-4248-5e3a0a5d2f34";
const EDITION_INPUT_ID: &str = "e6f4590b-9a16-4106-cf6a-659eb4862b21";
const COURSE_INPUT_ID: &str = "d4713d60-c8a7-0639-eb11-67b367a9c378";
const CATEGORY_INPUT_ID: &str = "23a7711a-8133-2876-37eb-dcd9e87a1613";
const FILTER_INPUT_ID: &str = "f7b0b7d2-cda8-056c-3d15-eef738c1962e";
const ORDER_INPUT_ID: &str = "1759edc3-72ae-2244-8b01-63c1cd9d2b7d";
const ROW_DATA_KEY: &str = "rowData";
const SIMULATED_AREA_SCORE: u32 = 700;

/// Community-run dashboard exposing partial results for a whole course at once.
pub struct SpecialistProvider {
    client: HttpClient,
    config: SpecialistConfig,
}

impl SpecialistProvider {
    pub fn new(client: HttpClient, config: SpecialistConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ScoreProvider for SpecialistProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Specialist
    }

    async fn list_offers(&self, _course_id: &str) -> Vec<RawOffer> {
        Vec::new()
    }

    async fn cutoff_score(&self, _offer_id: &str) -> Option<f64> {
        None
    }

    async fn full_history(&self, course_name: &str) -> Vec<SpecialistRow> {
        let payload = build_payload(course_name, &self.config.edition);
        match self
            .client
            .post_json(&self.config.url, &payload, Some(&self.config.referer))
            .await
        {
            Ok(response) => {
                let rows = parse_rows(&response, &self.config);
                info!("specialist source returned {} rows for {course_name}", rows.len());
                rows
            }
            Err(err) => {
                warn!("specialist fetch failed for {course_name}: {err:#}");
                Vec::new()
            }
        }
    }
}

/// Update-component request that asks the dashboard to render the course table.
pub fn build_payload(course_name: &str, edition: &str) -> Value {
    let area_scores = ["score_LC", "score_CH", "score_CN", "score_MT", "score_RED"]
        .iter()
        .map(|id| json!({ "id": id, "property": "value", "value": SIMULATED_AREA_SCORE }));
    let filters = [
        json!({ "id": EDITION_INPUT_ID, "property": "value", "value": edition }),
        json!({ "id": COURSE_INPUT_ID, "property": "value", "value": course_name }),
        json!({ "id": CATEGORY_INPUT_ID, "property": "value", "value": "Ampla concorrência" }),
        json!({ "id": FILTER_INPUT_ID, "property": "value", "value": [] }),
        json!({ "id": ORDER_INPUT_ID, "property": "value", "value": "Decrescente" }),
    ];
    json!({
        "output": format!("..{BUTTON_ID}.loading...{TABLE_ID}.children...{TABLE_ID}.display.."),
        "outputs": [
            { "id": BUTTON_ID, "property": "loading" },
            { "id": TABLE_ID, "property": "children" },
            { "id": TABLE_ID, "property": "display" }
        ],
        "inputs": [{ "id": BUTTON_ID, "property": "n_clicks", "value": 1 }],
        "changedPropIds": [format!("{BUTTON_ID}.n_clicks")],
        "state": area_scores.chain(filters).collect::<Vec<_>>()
    })
}

pub fn parse_rows(response: &Value, config: &SpecialistConfig) -> Vec<SpecialistRow> {
    let root = response
        .get("response")
        .and_then(|r| r.get(TABLE_ID))
        .unwrap_or(&Value::Null);
    let Some(rows) = find_key_recursive(root, ROW_DATA_KEY).and_then(Value::as_array) else {
        warn!("specialist response has no {ROW_DATA_KEY}");
        return Vec::new();
    };

    rows.iter()
        .filter_map(Value::as_object)
        .filter_map(|object| {
            let institution = string_from_keys(object, &[config.institution_key.as_str()])?;
            // Days not yet published have no key at all; a present but empty key is N/A.
            let scores = config
                .partial_days
                .iter()
                .filter(|partial| object_get_case_insensitive(object, &partial.key).is_some())
                .map(|partial| DatedScore {
                    date: partial.date,
                    score: number_from_keys(object, &[partial.key.as_str()]),
                })
                .collect();
            Some(SpecialistRow {
                institution,
                city: string_from_keys(object, &[config.city_key.as_str()]).unwrap_or_default(),
                state: string_from_keys(object, &[config.state_key.as_str()]).unwrap_or_default(),
                scores,
            })
        })
        .collect()
}

/// Stable identifier for a campus row, which the specialist table does not provide.
pub fn synthetic_offer_id(row: &SpecialistRow) -> String {
    let digest = sha256_hex(&format!("{}|{}|{}", row.institution, row.city, row.state));
    format!("sp-{}", &digest[..12])
}

/// Regroups campus rows into one offer set per partial day, in date order.
///
/// Repeated campuses keep their response order and get a `-2`, `-3`, ... suffix.
/// A row only joins the days it carries a value for.
pub fn daily_offers(rows: &[SpecialistRow], course_name: &str) -> Vec<(NaiveDate, Vec<Offer>)> {
    let mut by_day: BTreeMap<NaiveDate, Vec<Offer>> = BTreeMap::new();
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    for row in rows {
        let base = synthetic_offer_id(row);
        let seen = occurrences.entry(base.clone()).or_insert(0);
        *seen += 1;
        let offer_id = if *seen == 1 {
            base
        } else {
            format!("{base}-{seen}")
        };
        for dated in &row.scores {
            by_day.entry(dated.date).or_default().push(Offer {
                offer_id: offer_id.clone(),
                institution: row.institution.clone(),
                city: row.city.clone(),
                state: row.state.clone(),
                course_name: course_name.to_string(),
                cutoff_score: dated.score,
            });
        }
    }
    by_day.into_iter().collect()
}
