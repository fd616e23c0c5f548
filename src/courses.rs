use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;

use crate::providers::http::string_from_keys;

/// Course name to course id, sorted by name.
pub type CourseCatalogue = BTreeMap<String, String>;

/// Loads the catalogue file; a missing or unreadable file gives an empty catalogue.
pub fn load_courses(path: &Path) -> CourseCatalogue {
    if !path.exists() {
        warn!("course catalogue not found at {}", path.display());
        return CourseCatalogue::new();
    }
    match read_courses(path) {
        Ok(catalogue) => catalogue,
        Err(err) => {
            warn!("failed loading course catalogue: {err:#}");
            CourseCatalogue::new()
        }
    }
}

fn read_courses(path: &Path) -> Result<CourseCatalogue> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing {}", path.display()))?;
    Ok(parse_courses(&value))
}

/// Flattens the letter-grouped listing; entries without a name or id are dropped.
pub fn parse_courses(value: &Value) -> CourseCatalogue {
    let Some(groups) = value.as_object() else {
        return CourseCatalogue::new();
    };
    groups
        .values()
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_object)
        .filter_map(|item| {
            Some((
                string_from_keys(item, &["no_curso"])?,
                string_from_keys(item, &["co_curso"])?,
            ))
        })
        .collect()
}

/// Case-insensitive substring match on the course name.
pub fn filter_courses(catalogue: &CourseCatalogue, needle: &str) -> CourseCatalogue {
    let needle = needle.trim().to_lowercase();
    catalogue
        .iter()
        .filter(|(name, _)| name.to_lowercase().contains(&needle))
        .map(|(name, id)| (name.clone(), id.clone()))
        .collect()
}

/// Reverse lookup used when a command needs a course name for an id.
pub fn course_name(catalogue: &CourseCatalogue, course_id: &str) -> Option<String> {
    catalogue
        .iter()
        .find(|(_, id)| id.as_str() == course_id)
        .map(|(name, _)| name.clone())
}
