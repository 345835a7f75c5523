use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Metric a rule threshold applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMetric {
    Confidence,
    Lift,
}

/// One step of a fallback ladder: keep rules with `metric >= min_threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdStep {
    pub metric: RuleMetric,
    pub min_threshold: f64,
}

impl ThresholdStep {
    pub const fn confidence(min_threshold: f64) -> Self {
        Self {
            metric: RuleMetric::Confidence,
            min_threshold,
        }
    }

    pub const fn lift(min_threshold: f64) -> Self {
        Self {
            metric: RuleMetric::Lift,
            min_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetConfig {
    pub min_support: f64,
    /// Tried in order until one yields rules
    pub ladder: Vec<ThresholdStep>,
    pub output_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub category: RuleSetConfig,
    pub payment: RuleSetConfig,
    pub refund: RuleSetConfig,
    /// payment_status values that count as a refund
    pub refund_statuses: Vec<String>,
    /// Purchases priced above this feed the high-value payment report
    pub high_value_price: f64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            category: RuleSetConfig {
                min_support: 0.02,
                ladder: vec![ThresholdStep::confidence(0.3), ThresholdStep::lift(1.0)],
                output_file: "main_category_rules.csv".to_string(),
            },
            payment: RuleSetConfig {
                min_support: 0.01,
                ladder: vec![
                    ThresholdStep::confidence(0.6),
                    ThresholdStep::confidence(0.3),
                    ThresholdStep::confidence(0.05),
                    ThresholdStep::lift(0.3),
                    ThresholdStep::lift(0.1),
                    ThresholdStep::confidence(0.0),
                ],
                output_file: "payment_to_category_rules.csv".to_string(),
            },
            refund: RuleSetConfig {
                min_support: 0.005,
                ladder: vec![
                    ThresholdStep::confidence(0.4),
                    ThresholdStep::confidence(0.2),
                    ThresholdStep::confidence(0.05),
                ],
                output_file: "refund_category_rules.csv".to_string(),
            },
            refund_statuses: vec![
                "refunded".to_string(),
                "partially-refunded".to_string(),
                "已退款".to_string(),
                "部分退款".to_string(),
            ],
            high_value_price: 5000.0,
        }
    }
}

impl RuleSetConfig {
    fn validate(&self, name: &str) -> Result<(), PipelineError> {
        if !(self.min_support > 0.0 && self.min_support <= 1.0) {
            return Err(PipelineError::Configuration(format!(
                "rules.{}.min_support must be in (0, 1], got {}",
                name, self.min_support
            )));
        }

        if self.ladder.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "rules.{}.ladder needs at least one threshold step",
                name
            )));
        }

        Ok(())
    }
}

impl RulesConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.category.validate("category")?;
        self.payment.validate("payment")?;
        self.refund.validate("refund")?;

        if !(self.high_value_price.is_finite() && self.high_value_price >= 0.0) {
            return Err(PipelineError::Configuration(format!(
                "rules.high_value_price must be a non-negative number, got {}",
                self.high_value_price
            )));
        }
        Ok(())
    }

    pub fn is_refund(&self, status: &str) -> bool {
        self.refund_statuses.iter().any(|s| s == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladders() {
        let config = RulesConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.payment.ladder.len(), 6);
        assert_eq!(config.category.ladder[1], ThresholdStep::lift(1.0));
        assert!(config.is_refund("部分退款"));
        assert!(!config.is_refund("fully-paid"));
    }

    #[test]
    fn test_ladder_from_toml() {
        let set: RuleSetConfig = toml::from_str(
            r#"
            min_support = 0.1
            output_file = "rules.csv"
            ladder = [
                { metric = "confidence", min_threshold = 0.5 },
                { metric = "lift", min_threshold = 1.2 },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(set.ladder[0], ThresholdStep::confidence(0.5));
        assert_eq!(set.ladder[1].metric, RuleMetric::Lift);
    }

    #[test]
    fn test_empty_ladder_rejected() {
        let mut config = RulesConfig::default();
        config.refund.ladder.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_high_value_price_rejected() {
        let mut config = RulesConfig::default();
        assert_eq!(config.high_value_price, 5000.0);
        config.high_value_price = -1.0;
        assert!(config.validate().is_err());
    }
}
