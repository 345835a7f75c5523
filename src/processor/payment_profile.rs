use anyhow::Result;
use polars::prelude::*;
use std::collections::BTreeMap;

use crate::models::StructuredTransaction;

pub const HIGH_VALUE_METHODS_FILE: &str = "high_value_payment_methods.csv";

/// Payment method counts over transactions priced strictly above a threshold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighValuePayments {
    pub min_price: f64,
    pub counts: BTreeMap<String, u32>,
}

impl HighValuePayments {
    pub fn from_transactions(transactions: &[StructuredTransaction], min_price: f64) -> Self {
        let mut counts = BTreeMap::new();
        for transaction in transactions.iter().filter(|t| t.price > min_price) {
            *counts.entry(transaction.payment_method.clone()).or_default() += 1;
        }

        HighValuePayments { min_price, counts }
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    /// Most used method; ties go to the smallest method name.
    pub fn preferred(&self) -> Option<(&str, u32)> {
        self.ranked().into_iter().next()
    }

    /// Methods by count descending, then by name.
    pub fn ranked(&self) -> Vec<(&str, u32)> {
        let mut ranked: Vec<(&str, u32)> = self
            .counts
            .iter()
            .map(|(method, &count)| (method.as_str(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    pub fn to_frame(&self) -> Result<DataFrame> {
        let ranked = self.ranked();
        let methods: Vec<&str> = ranked.iter().map(|(m, _)| *m).collect();
        let counts: Vec<u32> = ranked.iter().map(|(_, c)| *c).collect();

        let df = DataFrame::new(vec![
            Series::new("payment_method".into(), methods).into(),
            Series::new("count".into(), counts).into(),
        ])?;
        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn tx(method: &str, price: f64) -> StructuredTransaction {
        StructuredTransaction {
            user_id: "u".to_string(),
            purchase_date: "2024-01-01".to_string(),
            main_categories: BTreeSet::from(["电子产品".to_string()]),
            payment_method: method.to_string(),
            payment_status: "已支付".to_string(),
            price,
        }
    }

    #[test]
    fn test_preferred_method_above_threshold() {
        let report = HighValuePayments::from_transactions(
            &[
                tx("信用卡", 6000.0),
                tx("信用卡", 8000.0),
                tx("支付宝", 5001.0),
                tx("现金", 5000.0),
                tx("现金", 100.0),
                tx("现金", 20.0),
            ],
            5000.0,
        );

        assert_eq!(report.total(), 3);
        assert_eq!(report.preferred(), Some(("信用卡", 2)));
        assert!(!report.counts.contains_key("现金"));
    }

    #[test]
    fn test_ties_go_to_smallest_name() {
        let report =
            HighValuePayments::from_transactions(&[tx("银联", 9000.0), tx("储蓄卡", 9000.0)], 5000.0);
        let ranked = report.ranked();
        assert_eq!(ranked[0].1, ranked[1].1);
        assert!(ranked[0].0 < ranked[1].0);
        assert_eq!(report.preferred(), Some(ranked[0]));
    }

    #[test]
    fn test_no_high_value_purchases() {
        let report = HighValuePayments::from_transactions(&[tx("现金", 10.0)], 5000.0);
        assert_eq!(report.preferred(), None);
        assert_eq!(report.to_frame().unwrap().height(), 0);
    }
}
