use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One entry of the upstream offer list, before its score is known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawOffer {
    pub offer_id: String,
    pub institution: String,
    pub city: String,
    pub state: String,
    pub course_name: String,
}

/// A course-at-campus admission slot together with the score captured today.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub offer_id: String,
    pub institution: String,
    pub city: String,
    pub state: String,
    pub course_name: String,
    pub cutoff_score: Option<f64>,
}

/// A campus row scraped from the specialist source, with its partial-day scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecialistRow {
    pub institution: String,
    pub city: String,
    pub state: String,
    pub scores: Vec<DatedScore>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DatedScore {
    pub date: NaiveDate,
    pub score: Option<f64>,
}

impl RawOffer {
    pub fn new(offer_id: impl Into<String>, institution: impl Into<String>) -> Self {
        Self {
            offer_id: offer_id.into(),
            institution: institution.into(),
            city: String::new(),
            state: String::new(),
            course_name: String::new(),
        }
    }

    pub fn with_campus(mut self, city: &str, state: &str) -> Self {
        self.city = city.to_string();
        self.state = state.to_string();
        self
    }

    pub fn with_course(mut self, course_name: &str) -> Self {
        self.course_name = course_name.to_string();
        self
    }
}

/// Sorts ascending by cutoff score; offers without a score go last and ties keep input order.
pub fn sort_by_score(offers: &mut [Offer]) {
    offers.sort_by(|a, b| match (a.cutoff_score, b.cutoff_score) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}
