use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current backup document version. Bumped when the shape changes.
pub const BACKUP_VERSION: i64 = 1;

/// Denormalized, point-in-time snapshot of a vault. Category and store
/// names, not ids, are the join keys back to items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultBackup {
    pub timestamp: i64,
    pub version: i64,
    pub categories: Vec<BackupCategory>,
    pub items: Vec<BackupItem>,
    pub stores: Vec<BackupStore>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub carts: Vec<BackupCart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCategory {
    pub name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupItem {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub category_name: String,
    pub price_options: Vec<BackupPriceOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPriceOption {
    pub store: String,
    pub price: Decimal,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStore {
    pub name: String,
    pub created_at: i64,
}

/// Cart statuses travel as integers: 0 planning, 1 shopping, 2 completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCart {
    pub id: String,
    pub name: String,
    pub budget: Decimal,
    pub status: i64,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub items: Vec<CartItemRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemRecord {
    pub item_id: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub is_fulfilled: bool,
    #[serde(default)]
    pub is_skipped_during_shopping: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_store: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_store: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_quantity: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_unit: Option<String>,
    #[serde(default)]
    pub is_shopping_only_item: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shopping_only_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shopping_only_store: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shopping_only_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shopping_only_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shopping_only_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_planning_quantity: Option<Decimal>,
    #[serde(default)]
    pub added_during_shopping: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<i64>,
}
