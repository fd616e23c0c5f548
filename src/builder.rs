use crate::types::{Offer, RawOffer};

pub fn build_offer(raw: RawOffer, cutoff_score: Option<f64>) -> Offer {
    Offer {
        offer_id: raw.offer_id,
        institution: raw.institution,
        city: raw.city,
        state: raw.state,
        course_name: raw.course_name,
        cutoff_score,
    }
}
