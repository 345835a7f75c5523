use serde_json::{Map, Value};

use super::record_sanitizer::{
    integer_from_value, is_truthy, number_from_value, parse_number, tolerant_document,
};
use crate::config::{PaymentWeights, ScoringConfig};
use crate::models::{CleanedRecord, FeatureTableBuilder, UserFeatureVector};

/// Piecewise age band score.
pub fn age_score(age: f64) -> f64 {
    if (25.0..=45.0).contains(&age) {
        1.0
    } else if (20.0..25.0).contains(&age) || (age > 45.0 && age <= 55.0) {
        0.7
    } else {
        0.3
    }
}

/// Derives a [`UserFeatureVector`] from one cleaned record. Never fails:
/// unparsable fields degrade to defaults.
pub struct FeatureExtractor {
    payment_weights: PaymentWeights,
    default_payment_status: String,
}

impl FeatureExtractor {
    pub fn new(payment_weights: PaymentWeights, default_payment_status: impl Into<String>) -> Self {
        FeatureExtractor {
            payment_weights,
            default_payment_status: default_payment_status.into(),
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(
            config.payment_weights.clone(),
            config.default_payment_status.clone(),
        )
    }

    pub fn extract(&self, record: &CleanedRecord) -> UserFeatureVector {
        let age = number_or(record.age.as_deref(), f64::NAN);
        let income = number_or(record.income.as_deref(), 0.0);

        let purchase = tolerant_document(record.purchase_history.as_deref());
        let logins = tolerant_document(record.login_history.as_deref());

        UserFeatureVector {
            id: record.id.clone(),
            fullname: record.fullname.clone(),
            age_score: age_score(age),
            income,
            active_score: if is_truthy(record.is_active.as_deref()) {
                1.0
            } else {
                0.0
            },
            purchase_score: self.purchase_score(&purchase),
            login_count: login_count(&logins),
        }
    }

    pub fn extract_all<'a>(
        &self,
        records: impl IntoIterator<Item = &'a CleanedRecord>,
    ) -> FeatureTableBuilder {
        records.into_iter().map(|r| self.extract(r)).collect()
    }

    /// avg_price x payment-status weight. A non-numeric avg_price scores 0.
    pub fn purchase_score(&self, document: &Map<String, Value>) -> f64 {
        let avg_price = match document.get("avg_price") {
            Some(value) => match number_from_value(value) {
                Ok(price) => price,
                Err(_) => return 0.0,
            },
            None => 0.0,
        };

        let weight = match document.get("payment_status") {
            Some(Value::String(status)) => self.payment_weights.weight(status),
            Some(_) => 0.0,
            None => self.payment_weights.weight(&self.default_payment_status),
        };

        avg_price * weight
    }
}

fn number_or(raw: Option<&str>, default: f64) -> f64 {
    raw.and_then(|s| parse_number(s).ok()).unwrap_or(default)
}

pub fn login_count(document: &Map<String, Value>) -> i64 {
    document
        .get("login_count")
        .and_then(|v| integer_from_value(v).ok())
        .unwrap_or(0)
}
