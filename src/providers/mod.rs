pub mod http;
pub mod official;
pub mod specialist;

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::providers::http::HttpClient;
use crate::providers::official::OfficialProvider;
use crate::providers::specialist::SpecialistProvider;
use crate::types::{RawOffer, SpecialistRow};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Official,
    Specialist,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Official, ProviderKind::Specialist];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::Specialist => "specialist",
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::Official => "Official API",
            Self::Specialist => "Specialist",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Error)]
#[error("unknown provider: {0}")]
pub struct ProviderParseError(pub String);

impl FromStr for ProviderKind {
    type Err = ProviderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "official" | "mec" | "sisu" => Ok(Self::Official),
            "specialist" | "fredao" => Ok(Self::Specialist),
            _ => Err(ProviderParseError(s.to_string())),
        }
    }
}

/// A source of cutoff scores. Fetch failures are swallowed and surface as empty results.
#[async_trait]
pub trait ScoreProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn list_offers(&self, course_id: &str) -> Vec<RawOffer>;

    async fn cutoff_score(&self, offer_id: &str) -> Option<f64>;

    async fn full_history(&self, _course_name: &str) -> Vec<SpecialistRow> {
        Vec::new()
    }
}

pub fn build_provider(kind: ProviderKind, config: &Config) -> Result<Arc<dyn ScoreProvider>> {
    let provider: Arc<dyn ScoreProvider> = match kind {
        ProviderKind::Official => Arc::new(OfficialProvider::new(
            HttpClient::new(&config.http)?,
            config.official.base_url.clone(),
        )),
        ProviderKind::Specialist => {
            let client =
                HttpClient::with_timeout(&config.http, config.specialist.timeout_secs)?;
            Arc::new(SpecialistProvider::new(client, config.specialist.clone()))
        }
    };
    Ok(provider)
}
