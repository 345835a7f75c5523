use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::PipelineError;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Weights of the composite quality score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub age: f64,
    pub income: f64,
    pub active: f64,
    pub purchase: f64,
    pub login: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            age: 0.15,
            income: 0.25,
            active: 0.15,
            purchase: 0.25,
            login: 0.20,
        }
    }
}

impl ScoreWeights {
    pub fn as_array(&self) -> [f64; 5] {
        [self.age, self.income, self.active, self.purchase, self.login]
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.as_array().iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(PipelineError::Configuration(format!(
                "score weights must be finite and non-negative: {:?}",
                self
            )));
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(PipelineError::Configuration(format!(
                "score weights must sum to 1.0, got {}",
                sum
            )));
        }

        Ok(())
    }
}

/// payment_status -> purchase weight. Unknown statuses weigh 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentWeights(HashMap<String, f64>);

impl Default for PaymentWeights {
    fn default() -> Self {
        let entries = [
            ("fully-paid", 1.0),
            ("partially-refunded", 0.5),
            ("refunded", 0.0),
            // Labels used by the production snapshots
            ("已支付", 1.0),
            ("部分退款", 0.5),
            ("已退款", 0.0),
        ];

        PaymentWeights(
            entries
                .into_iter()
                .map(|(status, weight)| (status.to_string(), weight))
                .collect(),
        )
    }
}

impl PaymentWeights {
    pub fn weight(&self, status: &str) -> f64 {
        self.0.get(status).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    /// Guards min-max normalization against a zero-range population
    pub epsilon: f64,
    pub top_k: usize,
    pub payment_weights: PaymentWeights,
    /// Assumed when a purchase document has no payment_status
    pub default_payment_status: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            epsilon: 1e-6,
            top_k: 100,
            payment_weights: PaymentWeights::default(),
            default_payment_status: "refunded".to_string(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.weights.validate()?;

        if !(self.epsilon > 0.0) {
            return Err(PipelineError::Configuration(format!(
                "scoring.epsilon must be positive, got {}",
                self.epsilon
            )));
        }

        if self.top_k == 0 {
            return Err(PipelineError::Configuration(
                "scoring.top_k must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let weights = ScoreWeights::default();
        assert_eq!(weights.as_array(), [0.15, 0.25, 0.15, 0.25, 0.20]);
        assert!((weights.sum() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE);
        assert!(weights.validate().is_ok());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = ScoreWeights {
            age: -0.15,
            income: 0.55,
            ..ScoreWeights::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_payment_weights() {
        let weights = PaymentWeights::default();
        assert_eq!(weights.weight("fully-paid"), 1.0);
        assert_eq!(weights.weight("partially-refunded"), 0.5);
        assert_eq!(weights.weight("refunded"), 0.0);
        assert_eq!(weights.weight("部分退款"), 0.5);
        assert_eq!(weights.weight("chargeback"), 0.0);
    }

    #[test]
    fn test_payment_weights_from_toml() {
        let config: ScoringConfig = toml::from_str(
            r#"
            top_k = 5
            [payment_weights]
            paid = 1.0
            "#,
        )
        .unwrap();

        assert_eq!(config.top_k, 5);
        assert_eq!(config.payment_weights.weight("paid"), 1.0);
        assert_eq!(config.payment_weights.weight("fully-paid"), 0.0);
        assert_eq!(config.default_payment_status, "refunded");
    }
}
