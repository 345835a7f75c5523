use anyhow::Result;
use polars::prelude::*;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

use super::category_list::{format_list, parse_list};
use super::record_sanitizer::{
    normalize_timestamp, number_from_value, parse_number, text_column, tolerant_document,
};
use crate::config::SubcategoryMap;
use crate::models::{ProductCatalog, StructuredTransaction, columns};

pub const TRANSACTION_COLUMNS: [&str; 6] = [
    "user_id",
    "purchase_date",
    "main_categories",
    "payment_method",
    "payment_status",
    "price",
];

/// Maps purchase documents to [`StructuredTransaction`]s through the product
/// catalog and the subcategory table.
pub struct TransactionStructurer {
    catalog: ProductCatalog,
    categories: SubcategoryMap,
}

impl TransactionStructurer {
    pub fn new(catalog: ProductCatalog, categories: SubcategoryMap) -> Self {
        TransactionStructurer {
            catalog,
            categories,
        }
    }

    pub fn structure(&self, user_id: &str, purchase_history: Option<&str>) -> Option<StructuredTransaction> {
        let document = tolerant_document(purchase_history);

        let items = match document.get("items") {
            Some(Value::Array(items)) if !items.is_empty() => items,
            _ => return None,
        };

        let main_categories: BTreeSet<String> = items
            .iter()
            .filter_map(|item| item.get("id"))
            .filter_map(|id| self.catalog.subcategory(id))
            .filter_map(|sub| self.categories.main_category(sub))
            .map(str::to_string)
            .collect();

        if main_categories.is_empty() {
            return None;
        }

        let payment_method = non_empty_text(&document, "payment_method")?;
        let payment_status = non_empty_text(&document, "payment_status")?;
        let purchase_date = non_empty_text(&document, "purchase_date")?;
        let price = match document.get("avg_price") {
            Some(Value::Null) | None => return None,
            Some(value) => match number_from_value(value) {
                // A zero price counts as absent, like an empty method or date
                Ok(price) if price == 0.0 => return None,
                Ok(price) => price,
                Err(e) => {
                    debug!("Skipping purchase for user {}: {}", user_id, e);
                    return None;
                }
            },
        };

        Some(StructuredTransaction {
            user_id: user_id.to_string(),
            purchase_date: normalize_timestamp(&purchase_date).unwrap_or_default(),
            main_categories,
            payment_method,
            payment_status,
            price,
        })
    }

    /// Structure every row of a cleaned shard that has `id` and
    /// `purchase_history` columns.
    pub fn structure_frame(&self, df: &DataFrame) -> Result<Vec<StructuredTransaction>> {
        let ids = text_column(df, columns::ID)?;
        let purchases = text_column(df, columns::PURCHASE_HISTORY)?;

        Ok(ids
            .iter()
            .zip(purchases.iter())
            .filter_map(|(id, purchase)| {
                let id = id.as_deref()?;
                self.structure(id, purchase.as_deref())
            })
            .collect())
    }
}

/// Present, string-valued (numbers are rendered) and not blank.
fn non_empty_text(document: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match document.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

pub fn transactions_to_frame(transactions: &[StructuredTransaction]) -> Result<DataFrame> {
    let user_ids: Vec<&str> = transactions.iter().map(|t| t.user_id.as_str()).collect();
    let dates: Vec<Option<&str>> = transactions
        .iter()
        .map(|t| Some(t.purchase_date.as_str()).filter(|d| !d.is_empty()))
        .collect();
    let categories: Vec<String> = transactions
        .iter()
        .map(|t| format_list(&t.main_categories))
        .collect();
    let methods: Vec<&str> = transactions.iter().map(|t| t.payment_method.as_str()).collect();
    let statuses: Vec<&str> = transactions.iter().map(|t| t.payment_status.as_str()).collect();
    let prices: Vec<f64> = transactions.iter().map(|t| t.price).collect();

    let df = DataFrame::new(vec![
        Series::new(TRANSACTION_COLUMNS[0].into(), user_ids).into(),
        Series::new(TRANSACTION_COLUMNS[1].into(), dates).into(),
        Series::new(TRANSACTION_COLUMNS[2].into(), categories).into(),
        Series::new(TRANSACTION_COLUMNS[3].into(), methods).into(),
        Series::new(TRANSACTION_COLUMNS[4].into(), statuses).into(),
        Series::new(TRANSACTION_COLUMNS[5].into(), prices).into(),
    ])?;

    Ok(df)
}

/// Read back a structured transactions frame (all columns as text).
/// Rows whose category list or price no longer parse are skipped.
pub fn transactions_from_frame(df: &DataFrame) -> Result<Vec<StructuredTransaction>> {
    let user_ids = text_column(df, TRANSACTION_COLUMNS[0])?;
    let dates = text_column(df, TRANSACTION_COLUMNS[1])?;
    let categories = text_column(df, TRANSACTION_COLUMNS[2])?;
    let methods = text_column(df, TRANSACTION_COLUMNS[3])?;
    let statuses = text_column(df, TRANSACTION_COLUMNS[4])?;
    let prices = text_column(df, TRANSACTION_COLUMNS[5])?;

    let mut transactions = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let Some(main_categories) = categories[row]
            .as_deref()
            .and_then(|c| parse_list(c).ok())
        else {
            debug!("Skipping transaction row {}: unreadable categories", row);
            continue;
        };
        let Some(price) = prices[row].as_deref().and_then(|p| parse_number(p).ok()) else {
            continue;
        };

        transactions.push(StructuredTransaction {
            user_id: user_ids[row].clone().unwrap_or_default(),
            purchase_date: dates[row].clone().unwrap_or_default(),
            main_categories: main_categories.into_iter().collect(),
            payment_method: methods[row].clone().unwrap_or_default(),
            payment_status: statuses[row].clone().unwrap_or_default(),
            price,
        });
    }

    Ok(transactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn structurer() -> TransactionStructurer {
        let catalog: ProductCatalog = vec![
            ("1".to_string(), "智能手机".to_string()),
            ("2".to_string(), "耳机".to_string()),
            ("3".to_string(), "外套".to_string()),
            ("4".to_string(), "神秘物品".to_string()),
        ]
        .into_iter()
        .collect();
        TransactionStructurer::new(catalog, SubcategoryMap::default())
    }

    fn purchase(items: Value) -> String {
        json!({
            "items": items,
            "payment_method": "支付宝",
            "payment_status": "已支付",
            "avg_price": 199.5,
            "purchase_date": "2024-03-15"
        })
        .to_string()
    }

    #[test]
    fn test_same_category_collapses_to_one() {
        let doc = purchase(json!([{"id": 1}, {"id": 2}]));
        let tx = structurer().structure("u1", Some(&doc)).unwrap();

        assert_eq!(tx.main_categories.len(), 1);
        assert!(tx.main_categories.contains("电子产品"));
        assert_eq!(tx.price, 199.5);
        assert_eq!(tx.purchase_date, "2024-03-15 00:00:00");
        assert_eq!(tx.payment_method, "支付宝");
    }

    #[test]
    fn test_unresolvable_items_are_skipped() {
        let doc = purchase(json!([{"id": 99}, {"id": 3}, {"id": 4}, {"name": "no id"}]));
        let tx = structurer().structure("u1", Some(&doc)).unwrap();
        assert_eq!(tx.main_categories.into_iter().collect::<Vec<_>>(), vec!["服装"]);
    }

    #[test]
    fn test_skip_conditions() {
        let s = structurer();
        assert!(s.structure("u1", None).is_none());
        assert!(s.structure("u1", Some("{bad json")).is_none());
        assert!(s.structure("u1", Some(&purchase(json!([])))).is_none());
        assert!(s.structure("u1", Some(&purchase(json!([{"id": 4}])))).is_none());

        let no_method = json!({
            "items": [{"id": 1}],
            "payment_method": "",
            "payment_status": "已支付",
            "avg_price": 10,
            "purchase_date": "2024-01-01"
        })
        .to_string();
        assert!(s.structure("u1", Some(&no_method)).is_none());

        let bad_price = json!({
            "items": [{"id": 1}],
            "payment_method": "现金",
            "payment_status": "已支付",
            "avg_price": "expensive",
            "purchase_date": "2024-01-01"
        })
        .to_string();
        assert!(s.structure("u1", Some(&bad_price)).is_none());
    }

    #[test]
    fn test_zero_price_is_skipped() {
        let s = structurer();
        let priced = |price: serde_json::Value| {
            json!({
                "items": [{"id": 1}],
                "payment_method": "现金",
                "payment_status": "已支付",
                "avg_price": price,
                "purchase_date": "2024-01-01"
            })
            .to_string()
        };

        assert!(s.structure("u1", Some(&priced(json!(0)))).is_none());
        assert!(s.structure("u1", Some(&priced(json!("0.0")))).is_none());
        assert_eq!(s.structure("u1", Some(&priced(json!(0.5)))).unwrap().price, 0.5);
    }

    #[test]
    fn test_frame_round_trip_through_list_parser() {
        let s = structurer();
        let doc = purchase(json!([{"id": 1}, {"id": 3}]));
        let tx = s.structure("u9", Some(&doc)).unwrap();

        let df = transactions_to_frame(std::slice::from_ref(&tx)).unwrap();
        assert_eq!(df.get_column_names().len(), 6);

        let back = transactions_from_frame(&df).unwrap();
        assert_eq!(back, vec![tx]);
    }
}
