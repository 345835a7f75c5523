//! Population-wide normalization and ranking.
//!
//! Runs only on a frozen [`FeatureTable`]: min and max are properties of the
//! whole population, so nothing here is incremental.

use anyhow::Result;
use ndarray::{Array1, ArrayView1};
use polars::prelude::*;
use std::cmp::Ordering;

use crate::config::ScoreWeights;
use crate::models::{FeatureTable, RankedUser};

/// `(x - min) / (max - min + epsilon)` over the whole population.
pub fn min_max_normalize(values: ArrayView1<'_, f64>, epsilon: f64) -> Array1<f64> {
    if values.is_empty() {
        return Array1::zeros(0);
    }

    let min = values.fold(f64::INFINITY, |acc, v| acc.min(*v));
    let max = values.fold(f64::NEG_INFINITY, |acc, v| acc.max(*v));

    values.mapv(|v| (v - min) / (max - min + epsilon))
}

/// Row indices ordered by score, highest first. Stable: equal scores keep
/// input order.
pub fn rank_descending(scores: ArrayView1<'_, f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| descending(scores[a], scores[b]));
    order
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or_else(|| b.total_cmp(&a))
}

pub struct ScoreAggregator {
    weights: ScoreWeights,
    epsilon: f64,
}

/// Normalized columns and the composite score, row-aligned with the table.
pub struct ScoredPopulation<'a> {
    table: &'a FeatureTable,
    pub income_score: Array1<f64>,
    pub purchase_score_norm: Array1<f64>,
    pub login_score: Array1<f64>,
    pub quality_score: Array1<f64>,
}

impl ScoreAggregator {
    pub fn new(weights: ScoreWeights, epsilon: f64) -> Self {
        ScoreAggregator { weights, epsilon }
    }

    pub fn score<'a>(&self, table: &'a FeatureTable) -> ScoredPopulation<'a> {
        let income_score = min_max_normalize(table.income(), self.epsilon);
        let purchase_score_norm = min_max_normalize(table.purchase_score(), self.epsilon);
        let login_score = min_max_normalize(table.login_count(), self.epsilon);

        let w = &self.weights;
        let quality_score = &table.age_score() * w.age
            + &income_score * w.income
            + &table.active_score() * w.active
            + &purchase_score_norm * w.purchase
            + &login_score * w.login;

        ScoredPopulation {
            table,
            income_score,
            purchase_score_norm,
            login_score,
            quality_score,
        }
    }
}

impl ScoredPopulation<'_> {
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// The `k` best users, best first. Fewer when the population is smaller.
    pub fn top_k(&self, k: usize) -> Vec<RankedUser> {
        rank_descending(self.quality_score.view())
            .into_iter()
            .take(k)
            .map(|row| RankedUser {
                id: self.table.id(row).to_string(),
                fullname: self.table.fullname(row).to_string(),
                quality_score: self.quality_score[row],
            })
            .collect()
    }
}

/// `id,fullname,quality_score`, in ranking order.
pub fn ranked_to_frame(users: &[RankedUser]) -> Result<DataFrame> {
    let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
    let names: Vec<&str> = users.iter().map(|u| u.fullname.as_str()).collect();
    let scores: Vec<f64> = users.iter().map(|u| u.quality_score).collect();

    let df = DataFrame::new(vec![
        Series::new("id".into(), ids).into(),
        Series::new("fullname".into(), names).into(),
        Series::new("quality_score".into(), scores).into(),
    ])?;
    Ok(df)
}
