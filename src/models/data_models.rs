use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::error::PipelineError;

/// Column names of the raw snapshot schema.
pub mod columns {
    pub const ID: &str = "id";
    pub const FULLNAME: &str = "fullname";
    pub const AGE: &str = "age";
    pub const INCOME: &str = "income";
    pub const IS_ACTIVE: &str = "is_active";
    pub const REGISTRATION_DATE: &str = "registration_date";
    pub const LAST_LOGIN: &str = "last_login";
    pub const PURCHASE_HISTORY: &str = "purchase_history";
    pub const LOGIN_HISTORY: &str = "login_history";

    /// Columns the scoring pass reads from a cleaned shard
    pub const SCORING: [&str; 7] = [
        ID,
        FULLNAME,
        AGE,
        INCOME,
        IS_ACTIVE,
        PURCHASE_HISTORY,
        LOGIN_HISTORY,
    ];

    /// Columns the transaction pass reads from a cleaned shard
    pub const TRANSACTIONS: [&str; 2] = [ID, PURCHASE_HISTORY];
}

/// Row view over a cleaned shard, restricted to the fields downstream
/// consumers read. Values stay as text; typing happens in the sanitizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanedRecord {
    pub id: String,
    pub fullname: String,
    pub age: Option<String>,
    pub income: Option<String>,
    pub is_active: Option<String>,
    pub purchase_history: Option<String>,
    pub login_history: Option<String>,
}

/// Per-user features produced by the extractor. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct UserFeatureVector {
    pub id: String,
    pub fullname: String,
    pub age_score: f64,
    pub income: f64,
    pub active_score: f64,
    pub purchase_score: f64,
    pub login_count: i64,
}

/// Projection written to the top-K file.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedUser {
    pub id: String,
    pub fullname: String,
    pub quality_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructuredTransaction {
    pub user_id: String,
    pub purchase_date: String,
    pub main_categories: BTreeSet<String>,
    pub payment_method: String,
    pub payment_status: String,
    pub price: f64,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    products: Vec<CatalogProduct>,
}

#[derive(Debug, Deserialize)]
struct CatalogProduct {
    id: Value,
    category: String,
}

/// Read-only product_id -> subcategory lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductCatalog {
    subcategories: HashMap<String, String>,
}

impl ProductCatalog {
    /// Load the full catalog document. A malformed catalog is a deployment
    /// problem, not bad data, so it is reported as a configuration error.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "cannot read product catalog {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json_str(&content).map_err(|e| {
            PipelineError::Configuration(format!(
                "malformed product catalog {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self, serde_json::Error> {
        let file: CatalogFile = serde_json::from_str(content)?;

        let subcategories = file
            .products
            .into_iter()
            .filter_map(|product| Self::key_for(&product.id).map(|id| (id, product.category)))
            .collect();

        Ok(ProductCatalog { subcategories })
    }

    /// Canonical lookup key for an id that may arrive as a number or a string.
    pub fn key_for(id: &Value) -> Option<String> {
        match id {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(i.to_string())
                } else if let Some(u) = n.as_u64() {
                    Some(u.to_string())
                } else {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| (f as i64).to_string())
                }
            }
            _ => None,
        }
    }

    pub fn subcategory(&self, id: &Value) -> Option<&str> {
        Self::key_for(id)
            .and_then(|key| self.subcategories.get(&key))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.subcategories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subcategories.is_empty()
    }
}

impl FromIterator<(String, String)> for ProductCatalog {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        ProductCatalog {
            subcategories: iter.into_iter().collect(),
        }
    }
}
