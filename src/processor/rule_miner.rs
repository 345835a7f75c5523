//! Apriori frequent itemsets and association rules over categorical
//! transactions.

use anyhow::Result;
use polars::prelude::*;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

use super::category_list::format_list;
use crate::config::{RuleMetric, RuleSetConfig, ThresholdStep};
use crate::models::StructuredTransaction;

pub const RULE_COLUMNS: [&str; 7] = [
    "antecedents",
    "consequents",
    "antecedent_support",
    "consequent_support",
    "support",
    "confidence",
    "lift",
];

#[derive(Debug, Clone, PartialEq)]
pub struct AssociationRule {
    pub antecedents: Vec<String>,
    pub consequents: Vec<String>,
    pub antecedent_support: f64,
    pub consequent_support: f64,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
}

impl AssociationRule {
    pub fn metric(&self, metric: RuleMetric) -> f64 {
        match metric {
            RuleMetric::Confidence => self.confidence,
            RuleMetric::Lift => self.lift,
        }
    }

    /// True when any antecedent item is in `items`.
    pub fn has_antecedent_in(&self, items: &BTreeSet<String>) -> bool {
        self.antecedents.iter().any(|item| items.contains(item))
    }
}

/// Frequent itemsets over an item vocabulary. Itemsets are sorted vocabulary
/// indices.
#[derive(Debug, Clone, Default)]
pub struct FrequentItemsets {
    vocabulary: Vec<String>,
    supports: HashMap<Vec<usize>, f64>,
    transaction_count: usize,
}

impl FrequentItemsets {
    pub fn len(&self) -> usize {
        self.supports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supports.is_empty()
    }

    pub fn transaction_count(&self) -> usize {
        self.transaction_count
    }

    pub fn support_of(&self, items: &[&str]) -> Option<f64> {
        let mut indices: Vec<usize> = items
            .iter()
            .map(|item| self.vocabulary.iter().position(|v| v == item))
            .collect::<Option<_>>()?;
        indices.sort_unstable();
        self.supports.get(&indices).copied()
    }

    /// Every rule `A -> C` with A, C non-empty, disjoint and `A ∪ C` frequent.
    pub fn rules(&self) -> Vec<AssociationRule> {
        let mut rules = Vec::new();

        for (itemset, &support) in &self.supports {
            if itemset.len() >= 2 {
                self.split_rules(itemset, support, &mut rules);
            }
        }

        sort_rules(&mut rules);
        rules
    }

    /// One rule per proper non-empty subset of `itemset` used as antecedent.
    /// Itemsets too wide for a 64-bit split mask are skipped.
    fn split_rules(&self, itemset: &[usize], support: f64, rules: &mut Vec<AssociationRule>) {
        let n = itemset.len();
        let Some(all) = u32::try_from(n).ok().and_then(|bits| 1u64.checked_shl(bits)) else {
            warn!("⚠️ Skipping rules for a {}-item itemset, too wide to split", n);
            return;
        };

        for mask in 1..all - 1 {
            let (antecedent, consequent): (Vec<usize>, Vec<usize>) =
                (0..n).partition(|bit| mask & (1u64 << bit) != 0);
            let antecedent: Vec<usize> = antecedent.into_iter().map(|i| itemset[i]).collect();
            let consequent: Vec<usize> = consequent.into_iter().map(|i| itemset[i]).collect();

            let (Some(&antecedent_support), Some(&consequent_support)) = (
                self.supports.get(&antecedent),
                self.supports.get(&consequent),
            ) else {
                continue;
            };

            let confidence = support / antecedent_support;
            rules.push(AssociationRule {
                antecedents: self.names(&antecedent),
                consequents: self.names(&consequent),
                antecedent_support,
                consequent_support,
                support,
                confidence,
                lift: confidence / consequent_support,
            });
        }
    }

    fn names(&self, indices: &[usize]) -> Vec<String> {
        indices.iter().map(|&i| self.vocabulary[i].clone()).collect()
    }
}

fn sort_rules(rules: &mut [AssociationRule]) {
    rules.sort_by(|a, b| {
        b.lift
            .total_cmp(&a.lift)
            .then(b.confidence.total_cmp(&a.confidence))
            .then_with(|| a.antecedents.cmp(&b.antecedents))
            .then_with(|| a.consequents.cmp(&b.consequents))
    });
}

pub struct RuleMiner {
    min_support: f64,
}

impl RuleMiner {
    pub fn new(min_support: f64) -> Self {
        RuleMiner { min_support }
    }

    /// Level-wise Apriori: candidates of size k are joins of frequent
    /// (k-1)-itemsets whose every (k-1)-subset is frequent.
    pub fn frequent_itemsets(&self, transactions: &[Vec<String>]) -> FrequentItemsets {
        let vocabulary: Vec<String> = transactions
            .iter()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: HashMap<&str, usize> = vocabulary
            .iter()
            .enumerate()
            .map(|(i, item)| (item.as_str(), i))
            .collect();

        let encoded: Vec<Vec<usize>> = transactions
            .iter()
            .map(|t| {
                t.iter()
                    .map(|item| index[item.as_str()])
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .collect();

        let transaction_count = encoded.len();
        let mut supports = HashMap::new();
        if transaction_count == 0 {
            return FrequentItemsets {
                vocabulary,
                supports,
                transaction_count,
            };
        }

        let mut level: Vec<Vec<usize>> = (0..vocabulary.len()).map(|i| vec![i]).collect();
        while !level.is_empty() {
            let frequent: Vec<(Vec<usize>, f64)> = level
                .into_iter()
                .filter_map(|candidate| {
                    let count = encoded
                        .iter()
                        .filter(|t| is_subset(&candidate, t))
                        .count();
                    let support = count as f64 / transaction_count as f64;
                    (support >= self.min_support).then_some((candidate, support))
                })
                .collect();

            let keys: Vec<Vec<usize>> = frequent.iter().map(|(items, _)| items.clone()).collect();
            supports.extend(frequent);
            level = next_candidates(&keys, &supports);
        }

        FrequentItemsets {
            vocabulary,
            supports,
            transaction_count,
        }
    }

    /// Walk the ladder and return the first step that yields any rule.
    pub fn mine_with_ladder(
        &self,
        transactions: &[Vec<String>],
        ladder: &[ThresholdStep],
    ) -> Option<(ThresholdStep, Vec<AssociationRule>)> {
        self.mine_with_ladder_where(transactions, ladder, |_| true)
    }

    /// Like [`RuleMiner::mine_with_ladder`], but only rules accepted by
    /// `keep` count towards a step.
    pub fn mine_with_ladder_where(
        &self,
        transactions: &[Vec<String>],
        ladder: &[ThresholdStep],
        keep: impl Fn(&AssociationRule) -> bool,
    ) -> Option<(ThresholdStep, Vec<AssociationRule>)> {
        let itemsets = self.frequent_itemsets(transactions);
        info!(
            "Found {} frequent itemsets (min support {}) over {} transactions",
            itemsets.len(),
            self.min_support,
            itemsets.transaction_count()
        );

        let candidates: Vec<AssociationRule> =
            itemsets.rules().into_iter().filter(|rule| keep(rule)).collect();
        for step in ladder {
            let rules: Vec<AssociationRule> = candidates
                .iter()
                .filter(|rule| rule.metric(step.metric) >= step.min_threshold)
                .cloned()
                .collect();

            if !rules.is_empty() {
                info!(
                    "{} rules pass {:?} >= {}",
                    rules.len(),
                    step.metric,
                    step.min_threshold
                );
                return Some((*step, rules));
            }

            info!(
                "No rules pass {:?} >= {}, relaxing threshold",
                step.metric, step.min_threshold
            );
        }

        None
    }

    pub fn mine_rule_set(
        transactions: &[Vec<String>],
        config: &RuleSetConfig,
        keep: impl Fn(&AssociationRule) -> bool,
    ) -> Vec<AssociationRule> {
        RuleMiner::new(config.min_support)
            .mine_with_ladder_where(transactions, &config.ladder, keep)
            .map(|(_, rules)| rules)
            .unwrap_or_default()
    }
}

/// Both slices sorted ascending.
fn is_subset(candidate: &[usize], transaction: &[usize]) -> bool {
    let mut t = transaction.iter();
    candidate.iter().all(|c| t.any(|x| x == c))
}

fn next_candidates(
    frequent: &[Vec<usize>],
    supports: &HashMap<Vec<usize>, f64>,
) -> Vec<Vec<usize>> {
    let mut sorted = frequent.to_vec();
    sorted.sort();

    let mut candidates = Vec::new();
    for (i, a) in sorted.iter().enumerate() {
        for b in &sorted[i + 1..] {
            let k = a.len();
            if a[..k - 1] != b[..k - 1] {
                break;
            }

            let mut candidate = a.clone();
            candidate.push(b[k - 1]);

            let all_subsets_frequent = (0..candidate.len()).all(|skip| {
                let subset: Vec<usize> = candidate
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != skip)
                    .map(|(_, item)| *item)
                    .collect();
                supports.contains_key(&subset)
            });

            if all_subsets_frequent {
                candidates.push(candidate);
            }
        }
    }

    candidates
}

pub fn category_transactions(transactions: &[StructuredTransaction]) -> Vec<Vec<String>> {
    transactions
        .iter()
        .map(|t| t.main_categories.iter().cloned().collect())
        .collect()
}

/// One `[payment_method, category]` pair per category of each transaction.
pub fn payment_transactions(transactions: &[StructuredTransaction]) -> Vec<Vec<String>> {
    transactions
        .iter()
        .flat_map(|t| {
            t.main_categories
                .iter()
                .map(|category| vec![t.payment_method.clone(), category.clone()])
        })
        .collect()
}

/// Distinct payment methods seen in the transactions.
pub fn payment_methods(transactions: &[StructuredTransaction]) -> BTreeSet<String> {
    transactions
        .iter()
        .map(|t| t.payment_method.clone())
        .collect()
}

pub fn refund_transactions(
    transactions: &[StructuredTransaction],
    is_refund: impl Fn(&str) -> bool,
) -> Vec<Vec<String>> {
    transactions
        .iter()
        .filter(|t| is_refund(&t.payment_status))
        .map(|t| t.main_categories.iter().cloned().collect())
        .collect()
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

pub fn rules_to_frame(rules: &[AssociationRule]) -> Result<DataFrame> {
    let antecedents: Vec<String> = rules.iter().map(|r| format_list(&r.antecedents)).collect();
    let consequents: Vec<String> = rules.iter().map(|r| format_list(&r.consequents)).collect();
    let metric = |f: fn(&AssociationRule) -> f64| -> Vec<f64> {
        rules.iter().map(|r| round3(f(r))).collect()
    };

    let df = DataFrame::new(vec![
        Series::new(RULE_COLUMNS[0].into(), antecedents).into(),
        Series::new(RULE_COLUMNS[1].into(), consequents).into(),
        Series::new(RULE_COLUMNS[2].into(), metric(|r| r.antecedent_support)).into(),
        Series::new(RULE_COLUMNS[3].into(), metric(|r| r.consequent_support)).into(),
        Series::new(RULE_COLUMNS[4].into(), metric(|r| r.support)).into(),
        Series::new(RULE_COLUMNS[5].into(), metric(|r| r.confidence)).into(),
        Series::new(RULE_COLUMNS[6].into(), metric(|r| r.lift)).into(),
    ])?;

    Ok(df)
}
