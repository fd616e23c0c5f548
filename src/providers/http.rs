use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::header::REFERER;
use reqwest::Client;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::config::HttpConfig;

/// Shared connection pool for one provider, built once from configuration.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Self::with_timeout(config, config.timeout_secs)
    }

    pub fn with_timeout(config: &HttpConfig, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(config.pool_size)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    pub async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed GET request: {url}"))?;
        read_json(url, response).await
    }

    pub async fn post_json(&self, url: &str, body: &Value, referer: Option<&str>) -> Result<Value> {
        let mut request = self.client.post(url).json(body);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("failed POST request: {url}"))?;
        read_json(url, response).await
    }
}

async fn read_json(url: &str, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("failed reading response body: {url}"))?;
    if !status.is_success() {
        let preview: String = body.chars().take(180).collect();
        return Err(anyhow!("{url} returned {status}: {preview}"));
    }
    serde_json::from_str(&body).with_context(|| format!("invalid JSON response: {url}"))
}

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Depth-first search for the first non-empty value stored under `key`.
pub fn find_key_recursive<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(object) => {
            if let Some(found) = object.get(key).filter(|v| !is_empty_value(v)) {
                return Some(found);
            }
            object.values().find_map(|v| find_key_recursive(v, key))
        }
        Value::Array(items) => items.iter().find_map(|v| find_key_recursive(v, key)),
        _ => None,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(object) => object.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

pub fn string_from_keys(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        let Some(value) = object_get_case_insensitive(object, key) else {
            continue;
        };
        match value {
            Value::String(s) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Value::Number(n) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

pub fn number_from_keys(object: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| object_get_case_insensitive(object, key))
        .find_map(to_f64)
}

pub fn object_get_case_insensitive<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).or_else(|| {
        object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

pub fn to_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let sanitized = s.trim().replace(',', ".");
            if sanitized.is_empty() {
                None
            } else {
                sanitized.parse::<f64>().ok()
            }
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}
