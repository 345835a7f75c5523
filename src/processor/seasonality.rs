use anyhow::Result;
use chrono::{Datelike, NaiveDateTime};
use polars::prelude::*;
use std::collections::BTreeMap;

use super::record_sanitizer::parse_timestamp;
use crate::models::StructuredTransaction;

pub const MONTH_COUNTS_FILE: &str = "purchases_by_month.csv";
pub const QUARTER_COUNTS_FILE: &str = "purchases_by_quarter.csv";
pub const CATEGORY_MONTH_COUNTS_FILE: &str = "category_by_month.csv";
pub const WEEKDAY_COUNTS_FILE: &str = "purchases_by_weekday.csv";
pub const TRANSITIONS_FILE: &str = "category_transitions.csv";

/// Purchase counts by calendar month (1-12), quarter (1-4), weekday
/// (0 = Monday) and month x main category, plus per-user category
/// transitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeasonalityReport {
    pub by_month: BTreeMap<u32, u32>,
    pub by_quarter: BTreeMap<u32, u32>,
    pub by_weekday: BTreeMap<u32, u32>,
    pub by_month_category: BTreeMap<(u32, String), u32>,
    pub transitions: BTreeMap<(String, String), u32>,
    /// Transactions left out because their purchase_date did not parse
    pub undated: usize,
}

impl SeasonalityReport {
    pub fn from_transactions(transactions: &[StructuredTransaction]) -> Self {
        let mut report = SeasonalityReport::default();
        let mut by_user: BTreeMap<&str, Vec<(NaiveDateTime, &StructuredTransaction)>> =
            BTreeMap::new();

        for transaction in transactions {
            let Some(date) = purchase_date(transaction) else {
                report.undated += 1;
                continue;
            };

            let month = date.month();
            *report.by_month.entry(month).or_default() += 1;
            *report.by_quarter.entry(quarter(month)).or_default() += 1;
            *report
                .by_weekday
                .entry(date.weekday().num_days_from_monday())
                .or_default() += 1;
            by_user
                .entry(transaction.user_id.as_str())
                .or_default()
                .push((date, transaction));

            for category in &transaction.main_categories {
                *report
                    .by_month_category
                    .entry((month, category.clone()))
                    .or_default() += 1;
            }
        }

        for purchases in by_user.values_mut() {
            // Stable, so same-date purchases keep file order
            purchases.sort_by_key(|(date, _)| *date);
            let sequence: Vec<&String> = purchases
                .iter()
                .flat_map(|(_, t)| t.main_categories.iter())
                .collect();
            for pair in sequence.windows(2) {
                *report
                    .transitions
                    .entry((pair[0].clone(), pair[1].clone()))
                    .or_default() += 1;
            }
        }

        report
    }

    /// Transitions by count descending, then by `(from, to)`.
    pub fn ranked_transitions(&self) -> Vec<(&str, &str, u32)> {
        let mut ranked: Vec<(&str, &str, u32)> = self
            .transitions
            .iter()
            .map(|((from, to), &count)| (from.as_str(), to.as_str(), count))
            .collect();
        // BTreeMap order already settles ties
        ranked.sort_by(|a, b| b.2.cmp(&a.2));
        ranked
    }

    pub fn dated(&self) -> u32 {
        self.by_month.values().sum()
    }

    pub fn month_frame(&self) -> Result<DataFrame> {
        counts_frame("month", &self.by_month)
    }

    pub fn quarter_frame(&self) -> Result<DataFrame> {
        counts_frame("quarter", &self.by_quarter)
    }

    pub fn weekday_frame(&self) -> Result<DataFrame> {
        counts_frame("weekday", &self.by_weekday)
    }

    pub fn transitions_frame(&self) -> Result<DataFrame> {
        let ranked = self.ranked_transitions();
        let from: Vec<&str> = ranked.iter().map(|(f, _, _)| *f).collect();
        let to: Vec<&str> = ranked.iter().map(|(_, t, _)| *t).collect();
        let counts: Vec<u32> = ranked.iter().map(|(_, _, c)| *c).collect();

        let df = DataFrame::new(vec![
            Series::new("from".into(), from).into(),
            Series::new("to".into(), to).into(),
            Series::new("count".into(), counts).into(),
        ])?;
        Ok(df)
    }

    pub fn category_month_frame(&self) -> Result<DataFrame> {
        let months: Vec<u32> = self.by_month_category.keys().map(|(m, _)| *m).collect();
        let categories: Vec<&str> = self
            .by_month_category
            .keys()
            .map(|(_, c)| c.as_str())
            .collect();
        let counts: Vec<u32> = self.by_month_category.values().copied().collect();

        let df = DataFrame::new(vec![
            Series::new("month".into(), months).into(),
            Series::new("category".into(), categories).into(),
            Series::new("count".into(), counts).into(),
        ])?;
        Ok(df)
    }
}

fn purchase_date(transaction: &StructuredTransaction) -> Option<NaiveDateTime> {
    parse_timestamp(&transaction.purchase_date).ok()
}

fn quarter(month: u32) -> u32 {
    (month - 1) / 3 + 1
}

fn counts_frame(key: &str, counts: &BTreeMap<u32, u32>) -> Result<DataFrame> {
    let keys: Vec<u32> = counts.keys().copied().collect();
    let values: Vec<u32> = counts.values().copied().collect();

    let df = DataFrame::new(vec![
        Series::new(key.into(), keys).into(),
        Series::new("count".into(), values).into(),
    ])?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn tx(date: &str, categories: &[&str]) -> StructuredTransaction {
        user_tx("u", date, categories)
    }

    fn user_tx(user: &str, date: &str, categories: &[&str]) -> StructuredTransaction {
        StructuredTransaction {
            user_id: user.to_string(),
            purchase_date: date.to_string(),
            main_categories: categories.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
            payment_method: "现金".to_string(),
            payment_status: "已支付".to_string(),
            price: 1.0,
        }
    }

    #[test]
    fn test_counts_by_month_and_quarter() {
        let report = SeasonalityReport::from_transactions(&[
            tx("2024-01-05 10:00:00", &["食品"]),
            tx("2023-01-20 00:00:00", &["食品", "服装"]),
            tx("2024-04-01 00:00:00", &["服装"]),
            tx("2024-12-31 23:59:59", &["家居"]),
            tx("", &["食品"]),
            tx("not a date", &["食品"]),
        ]);

        assert_eq!(report.undated, 2);
        assert_eq!(report.dated(), 4);
        assert_eq!(report.by_month.get(&1), Some(&2));
        assert_eq!(report.by_quarter.get(&1), Some(&2));
        assert_eq!(report.by_quarter.get(&2), Some(&1));
        assert_eq!(report.by_quarter.get(&4), Some(&1));
        assert_eq!(report.by_month_category.get(&(1, "食品".to_string())), Some(&2));
        assert_eq!(report.by_month_category.get(&(1, "服装".to_string())), Some(&1));
    }

    #[test]
    fn test_frames() {
        let report = SeasonalityReport::from_transactions(&[
            tx("2024-02-01 00:00:00", &["食品", "服装"]),
            tx("2024-07-01 00:00:00", &["食品"]),
        ]);

        assert_eq!(report.month_frame().unwrap().height(), 2);
        assert_eq!(report.quarter_frame().unwrap().height(), 2);
        assert_eq!(report.weekday_frame().unwrap().height(), 2);

        let long = report.category_month_frame().unwrap();
        assert_eq!(long.height(), 3);
        assert_eq!(long.get_column_names().len(), 3);
    }

    #[test]
    fn test_counts_by_weekday() {
        let report = SeasonalityReport::from_transactions(&[
            tx("2024-01-01 09:00:00", &["食品"]),
            tx("2024-01-08 09:00:00", &["食品"]),
            tx("2024-01-07 09:00:00", &["食品"]),
            tx("garbage", &["食品"]),
        ]);

        // Mondays are 0, Sundays 6
        assert_eq!(report.by_weekday.get(&0), Some(&2));
        assert_eq!(report.by_weekday.get(&6), Some(&1));
        assert_eq!(report.by_weekday.values().sum::<u32>(), report.dated());
    }

    #[test]
    fn test_transitions_follow_purchase_order_per_user() {
        let report = SeasonalityReport::from_transactions(&[
            // Out of order on purpose; u1 buys 服装 first
            user_tx("u1", "2024-03-01 00:00:00", &["食品"]),
            user_tx("u2", "2024-01-01 00:00:00", &["食品"]),
            user_tx("u1", "2024-01-01 00:00:00", &["服装", "家居"]),
            user_tx("u2", "2024-02-01 00:00:00", &["服装"]),
            user_tx("u1", "bad date", &["电子产品"]),
        ]);

        // u1: 家居, 服装, 食品 (categories sorted inside a purchase)
        // u2: 食品, 服装
        assert_eq!(report.transitions.len(), 3);
        assert_eq!(
            report.transitions.get(&("家居".to_string(), "服装".to_string())),
            Some(&1)
        );
        assert_eq!(
            report.transitions.get(&("服装".to_string(), "食品".to_string())),
            Some(&1)
        );
        assert_eq!(
            report.transitions.get(&("食品".to_string(), "服装".to_string())),
            Some(&1)
        );
        assert!(!report.transitions.keys().any(|(f, t)| f == "电子产品" || t == "电子产品"));
    }

    #[test]
    fn test_transitions_ranked_by_count_then_pair() {
        let report = SeasonalityReport::from_transactions(&[
            user_tx("a", "2024-01-01 00:00:00", &["b"]),
            user_tx("a", "2024-01-02 00:00:00", &["c"]),
            user_tx("x", "2024-01-01 00:00:00", &["b"]),
            user_tx("x", "2024-01-02 00:00:00", &["c"]),
            user_tx("y", "2024-01-01 00:00:00", &["a"]),
            user_tx("y", "2024-01-01 00:00:00", &["z"]),
            user_tx("w", "2024-01-01 00:00:00", &["a"]),
            user_tx("w", "2024-01-02 00:00:00", &["d"]),
        ]);

        assert_eq!(
            report.ranked_transitions(),
            vec![("b", "c", 2), ("a", "d", 1), ("a", "z", 1)]
        );

        let frame = report.transitions_frame().unwrap();
        assert_eq!(frame.height(), 3);
        assert_eq!(
            frame.column("from").unwrap().str().unwrap().get(0),
            Some("b")
        );
    }

    #[test]
    fn test_quarter_boundaries() {
        assert_eq!(quarter(1), 1);
        assert_eq!(quarter(3), 1);
        assert_eq!(quarter(4), 2);
        assert_eq!(quarter(12), 4);
    }
}
