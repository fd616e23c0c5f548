use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::providers::http::{number_from_keys, string_from_keys, HttpClient};
use crate::providers::{ProviderKind, ScoreProvider};
use crate::types::RawOffer;

/// Reserved non-offer key present in every offer-list response.
const SEARCH_RULE_KEY: &str = "search_rule";
const OPEN_COMPETITION: &str = "Ampla concorrência";

pub struct OfficialProvider {
    client: HttpClient,
    base_url: String,
}

impl OfficialProvider {
    pub fn new(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn offers_url(&self, course_id: &str) -> String {
        format!("{}/curso/{course_id}", self.base_url)
    }

    fn modalities_url(&self, offer_id: &str) -> String {
        format!("{}/{offer_id}/modalidades", self.base_url)
    }
}

#[async_trait]
impl ScoreProvider for OfficialProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Official
    }

    async fn list_offers(&self, course_id: &str) -> Vec<RawOffer> {
        match self.client.get_json(&self.offers_url(course_id)).await {
            Ok(payload) => parse_offer_list(&payload),
            Err(err) => {
                warn!("offer list fetch failed for course {course_id}: {err:#}");
                Vec::new()
            }
        }
    }

    async fn cutoff_score(&self, offer_id: &str) -> Option<f64> {
        match self.client.get_json(&self.modalities_url(offer_id)).await {
            Ok(payload) => open_competition_score(&payload),
            Err(err) => {
                debug!("score fetch failed for offer {offer_id}: {err:#}");
                None
            }
        }
    }
}

pub fn parse_offer_list(payload: &Value) -> Vec<RawOffer> {
    let Some(entries) = payload.as_object() else {
        warn!("offer list payload is not an object");
        return Vec::new();
    };
    entries
        .iter()
        .filter(|(key, _)| key.as_str() != SEARCH_RULE_KEY)
        .filter_map(|(key, value)| {
            let object = value.as_object()?;
            let offer_id = string_from_keys(object, &["co_oferta"]).unwrap_or_else(|| key.clone());
            if offer_id.trim().is_empty() {
                return None;
            }
            Some(RawOffer {
                offer_id,
                institution: string_from_keys(object, &["sg_ies"]).unwrap_or_default(),
                city: string_from_keys(object, &["no_municipio_campus"]).unwrap_or_default(),
                state: string_from_keys(object, &["sg_uf_campus"]).unwrap_or_default(),
                course_name: string_from_keys(object, &["no_curso"]).unwrap_or_default(),
            })
        })
        .collect()
}

/// Score of the open-competition modality; quota modalities are ignored.
pub fn open_competition_score(payload: &Value) -> Option<f64> {
    payload
        .get("modalidades")?
        .as_array()?
        .iter()
        .filter_map(Value::as_object)
        .find(|modality| {
            modality
                .get("no_concorrencia")
                .and_then(Value::as_str)
                .map(|label| label.trim() == OPEN_COMPETITION)
                .unwrap_or(false)
        })
        .and_then(|modality| number_from_keys(modality, &["nu_nota_corte"]))
}
