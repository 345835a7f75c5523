//! Columnar storage for the whole-population feature set.
//!
//! Scoring is two-phase: every shard appends into a [`FeatureTableBuilder`]
//! (collect), which is then frozen into an immutable [`FeatureTable`] that the
//! normalizer consumes. One column per feature keeps the population barrier
//! affordable at tens of millions of users.

use ndarray::{Array1, ArrayView1};

use super::data_models::UserFeatureVector;

#[derive(Debug, Clone, Default)]
pub struct FeatureTableBuilder {
    ids: Vec<String>,
    fullnames: Vec<String>,
    age_score: Vec<f64>,
    income: Vec<f64>,
    active_score: Vec<f64>,
    purchase_score: Vec<f64>,
    login_count: Vec<f64>,
}

impl FeatureTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, features: UserFeatureVector) {
        self.ids.push(features.id);
        self.fullnames.push(features.fullname);
        self.age_score.push(features.age_score);
        self.income.push(features.income);
        self.active_score.push(features.active_score);
        self.purchase_score.push(features.purchase_score);
        self.login_count.push(features.login_count as f64);
    }

    /// Append another shard's rows after this one's, preserving order.
    pub fn append(&mut self, mut other: FeatureTableBuilder) {
        self.ids.append(&mut other.ids);
        self.fullnames.append(&mut other.fullnames);
        self.age_score.append(&mut other.age_score);
        self.income.append(&mut other.income);
        self.active_score.append(&mut other.active_score);
        self.purchase_score.append(&mut other.purchase_score);
        self.login_count.append(&mut other.login_count);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn finish(self) -> FeatureTable {
        FeatureTable {
            ids: self.ids,
            fullnames: self.fullnames,
            age_score: Array1::from_vec(self.age_score),
            income: Array1::from_vec(self.income),
            active_score: Array1::from_vec(self.active_score),
            purchase_score: Array1::from_vec(self.purchase_score),
            login_count: Array1::from_vec(self.login_count),
        }
    }
}

impl FromIterator<UserFeatureVector> for FeatureTableBuilder {
    fn from_iter<I: IntoIterator<Item = UserFeatureVector>>(iter: I) -> Self {
        let mut builder = FeatureTableBuilder::new();
        for features in iter {
            builder.push(features);
        }
        builder
    }
}

/// Frozen population. Row order is input order.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    ids: Vec<String>,
    fullnames: Vec<String>,
    age_score: Array1<f64>,
    income: Array1<f64>,
    active_score: Array1<f64>,
    purchase_score: Array1<f64>,
    login_count: Array1<f64>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, row: usize) -> &str {
        &self.ids[row]
    }

    pub fn fullname(&self, row: usize) -> &str {
        &self.fullnames[row]
    }

    pub fn age_score(&self) -> ArrayView1<'_, f64> {
        self.age_score.view()
    }

    pub fn income(&self) -> ArrayView1<'_, f64> {
        self.income.view()
    }

    pub fn active_score(&self) -> ArrayView1<'_, f64> {
        self.active_score.view()
    }

    pub fn purchase_score(&self) -> ArrayView1<'_, f64> {
        self.purchase_score.view()
    }

    pub fn login_count(&self) -> ArrayView1<'_, f64> {
        self.login_count.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, income: f64, logins: i64) -> UserFeatureVector {
        UserFeatureVector {
            id: id.to_string(),
            fullname: format!("User {}", id),
            age_score: 1.0,
            income,
            active_score: 0.0,
            purchase_score: 0.0,
            login_count: logins,
        }
    }

    #[test]
    fn test_append_preserves_order() {
        let mut first: FeatureTableBuilder = vec![user("a", 1.0, 1), user("b", 2.0, 2)]
            .into_iter()
            .collect();
        let second: FeatureTableBuilder = vec![user("c", 3.0, 3)].into_iter().collect();
        first.append(second);

        let table = first.finish();
        assert_eq!(table.len(), 3);
        assert_eq!(table.id(0), "a");
        assert_eq!(table.id(2), "c");
        assert_eq!(table.income().to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(table.fullname(2), "User c");
        assert_eq!(table.login_count().to_vec(), vec![1.0, 2.0, 3.0]);
    }
}
