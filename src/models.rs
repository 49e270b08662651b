use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// One item of the catalog, flattened with its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub category: String,
    pub name: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSpec {
    pub name: String,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCategory {
    pub name: String,
    #[serde(default)]
    pub items: Vec<ItemSpec>,
}

/// Ordered catalog as read in a single pass. Category order, then item order
/// within each category, is the canonical ledger row order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    pub categories: Vec<CatalogCategory>,
}

impl CatalogSnapshot {
    pub fn items(&self) -> impl Iterator<Item = CatalogItem> + '_ {
        self.categories.iter().flat_map(|cat| {
            cat.items.iter().map(move |item| CatalogItem {
                category: cat.name.clone(),
                name: item.name.clone(),
                unit: item.unit.clone(),
            })
        })
    }

    pub fn item_count(&self) -> usize {
        self.categories.iter().map(|c| c.items.len()).sum()
    }
}

/// Case-insensitive identity of a ledger row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey {
    pub category: String,
    pub item: String,
}

impl RowKey {
    pub fn new(category: &str, item: &str) -> Self {
        Self {
            category: category.trim().to_lowercase(),
            item: item.trim().to_lowercase(),
        }
    }
}

/// Wire shape of one submitted item: `{"quantity": "5", "category": "Dairy"}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEntry {
    #[serde(default, deserialize_with = "quantity_text")]
    pub quantity: String,
    #[serde(default)]
    pub category: String,
}

/// Body of a synchronization request. Both fields are optional at the wire
/// level so that their absence surfaces as a validation error, not a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub data: Option<BTreeMap<String, RawEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionEntry {
    pub item_name: String,
    pub quantity: String,
    pub category: String,
}

/// A validated submission, all entries implicitly dated "today".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub entries: Vec<SubmissionEntry>,
}

fn quantity_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "quantity must be a string or number, got {other}"
        ))),
    }
}

/// Where a reconciled row's prior values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrigin {
    /// A prior persisted row existed for this (category, item).
    Carried,
    /// No prior row; the row was synthesized blank.
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub category: String,
    pub item: String,
    pub unit: String,
    /// Sparse: an absent date means no recorded quantity.
    pub cells: BTreeMap<NaiveDate, String>,
    pub origin: RowOrigin,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub items_new: usize,
    pub items_updated: usize,
    pub items_preserved: usize,
    pub items_unmatched: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_key_ignores_case_and_padding() {
        assert_eq!(RowKey::new(" Dairy", "MILK "), RowKey::new("dairy", "milk"));
        assert_ne!(RowKey::new("Dairy", "Milk"), RowKey::new("Bakery", "Milk"));
    }

    #[test]
    fn test_snapshot_items_follow_catalog_order() {
        let snapshot = CatalogSnapshot {
            categories: vec![
                CatalogCategory {
                    name: "Dairy".into(),
                    items: vec![
                        ItemSpec { name: "Milk".into(), unit: "ml".into() },
                        ItemSpec { name: "Cream".into(), unit: "ml".into() },
                    ],
                },
                CatalogCategory {
                    name: "Bakery".into(),
                    items: vec![ItemSpec { name: "Bread".into(), unit: "pc".into() }],
                },
            ],
        };
        let names: Vec<String> = snapshot.items().map(|i| i.name).collect();
        assert_eq!(names, vec!["Milk", "Cream", "Bread"]);
        assert_eq!(snapshot.item_count(), 3);
    }

    #[test]
    fn test_request_accepts_numeric_quantity() {
        let json = r#"{"branch": "Delhi", "data": {"Milk": {"quantity": 5.5, "category": "Dairy"}}}"#;
        let req: SyncRequest = serde_json::from_str(json).unwrap();
        let data = req.data.unwrap();
        assert_eq!(data["Milk"].quantity, "5.5");
        assert_eq!(data["Milk"].category, "Dairy");
    }

    #[test]
    fn test_request_missing_fields_parse_as_none() {
        let req: SyncRequest = serde_json::from_str("{}").unwrap();
        assert!(req.branch.is_none());
        assert!(req.data.is_none());
    }

    #[test]
    fn test_request_rejects_object_quantity() {
        let json = r#"{"branch": "Delhi", "data": {"Milk": {"quantity": {"x": 1}}}}"#;
        assert!(serde_json::from_str::<SyncRequest>(json).is_err());
    }
}
