use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::id::new_uuid_v7;
use crate::time::now_ms;

/// Aggregate root for one user's catalog and shopping history.
///
/// Every live `Item` lives in exactly one category; soft-deleted items move
/// to `deleted_items` and soft-deleted (completed) carts to `deleted_carts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vault {
    pub id: String,
    pub categories: Vec<Category>,
    #[serde(default)]
    pub deleted_items: Vec<Item>,
    #[serde(default)]
    pub carts: Vec<Cart>,
    #[serde(default)]
    pub deleted_carts: Vec<Cart>,
    #[serde(default)]
    pub stores: Vec<Store>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub sort_order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_hex: Option<String>,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    #[serde(default)]
    pub price_options: Vec<PriceOption>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_from_category_name: Option<String>,
    /// Undo log for the carts this item was pulled from when it was
    /// soft-deleted. Populated only while the item sits in the trash.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_cart_item_snapshots: Vec<DeletedCartItemSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceOption {
    pub store: String,
    pub price: Decimal,
    pub unit: String,
}

/// Lightweight store registry entry. Loosely synchronized with the
/// free-form `PriceOption.store` strings; renames rewrite both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    Planning,
    Shopping,
    Completed,
}

impl CartStatus {
    /// Wire encoding used by the backup document.
    pub fn backup_code(self) -> i64 {
        match self {
            CartStatus::Planning => 0,
            CartStatus::Shopping => 1,
            CartStatus::Completed => 2,
        }
    }

    pub fn from_backup_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(CartStatus::Planning),
            1 => Some(CartStatus::Shopping),
            2 => Some(CartStatus::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CartStatus::Planning => "planning",
            CartStatus::Shopping => "shopping",
            CartStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: String,
    pub name: String,
    pub budget: Decimal,
    pub status: CartStatus,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// Derived: sum of line totals, recomputed synchronously by mutators.
    #[serde(default)]
    pub total_spent: Decimal,
    /// Derived: progress in [0, 1], meaning depends on `status`.
    #[serde(default)]
    pub fulfillment_status: f64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
    #[serde(default)]
    pub cart_items: Vec<CartItem>,
}

/// What a cart row points at: a real catalog item, or an ad hoc entry typed
/// in during a trip that never touches the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CartItemKind {
    CatalogBacked {
        item_id: String,
    },
    ShoppingOnly {
        /// Locally-scoped id; has no catalog entry.
        id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        store: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        price: Option<Decimal>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub kind: CartItemKind,
    pub quantity: Decimal,
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
    pub is_fulfilled: bool,
    #[serde(default)]
    pub is_skipped_during_shopping: bool,
    #[serde(default)]
    pub was_edited_during_shopping: bool,
    #[serde(default)]
    pub added_during_shopping: bool,
    pub added_at: i64,
    /// Quantity at the moment shopping started; restored by
    /// "return to planning".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_planning_quantity: Option<Decimal>,
    /// Label captured at completion so history survives later catalog
    /// renames and deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_item_name_snapshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_item_category_snapshot: Option<String>,
}

/// Full copy of a cart row taken when its catalog item was soft-deleted.
/// References the cart by id only; ownership stays with the deleted item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedCartItemSnapshot {
    pub cart_id: String,
    pub cart_item: CartItem,
}

impl Vault {
    pub fn new(id: impl Into<String>) -> Self {
        Vault {
            id: id.into(),
            categories: Vec::new(),
            deleted_items: Vec::new(),
            carts: Vec::new(),
            deleted_carts: Vec::new(),
            stores: Vec::new(),
        }
    }

    pub fn find_category(&self, name: &str) -> Option<&Category> {
        let needle = name.trim();
        self.categories
            .iter()
            .find(|c| c.name.trim().eq_ignore_ascii_case(needle))
    }

    pub fn find_category_mut(&mut self, name: &str) -> Option<&mut Category> {
        let needle = name.trim().to_string();
        self.categories
            .iter_mut()
            .find(|c| c.name.trim().eq_ignore_ascii_case(&needle))
    }

    /// Looks through live categories only; trashed items are not returned.
    pub fn find_item(&self, item_id: &str) -> Option<&Item> {
        self.categories
            .iter()
            .flat_map(|c| c.items.iter())
            .find(|i| i.id == item_id)
    }

    pub fn find_item_mut(&mut self, item_id: &str) -> Option<&mut Item> {
        self.categories
            .iter_mut()
            .flat_map(|c| c.items.iter_mut())
            .find(|i| i.id == item_id)
    }

    pub fn find_deleted_item(&self, item_id: &str) -> Option<&Item> {
        self.deleted_items.iter().find(|i| i.id == item_id)
    }

    pub fn item_category_name(&self, item_id: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.items.iter().any(|i| i.id == item_id))
            .map(|c| c.name.as_str())
    }

    pub fn find_cart(&self, cart_id: &str) -> Option<&Cart> {
        self.carts.iter().find(|c| c.id == cart_id)
    }

    pub fn find_cart_mut(&mut self, cart_id: &str) -> Option<&mut Cart> {
        self.carts.iter_mut().find(|c| c.id == cart_id)
    }

    pub fn find_deleted_cart(&self, cart_id: &str) -> Option<&Cart> {
        self.deleted_carts.iter().find(|c| c.id == cart_id)
    }

    /// Duplicate identity for items is the `(name, store)` pair,
    /// case-insensitive across the whole live catalog.
    pub fn duplicate_item_exists(&self, name: &str, store: &str, exclude_id: Option<&str>) -> bool {
        let name = name.trim();
        let store = store.trim();
        self.categories
            .iter()
            .flat_map(|c| c.items.iter())
            .filter(|i| Some(i.id.as_str()) != exclude_id)
            .any(|i| {
                i.name.trim().eq_ignore_ascii_case(name)
                    && i.price_options
                        .iter()
                        .any(|p| p.store.trim().eq_ignore_ascii_case(store))
            })
    }

    pub fn duplicate_cart_name_exists(&self, name: &str, exclude_id: Option<&str>) -> bool {
        let needle = name.trim();
        self.carts
            .iter()
            .chain(self.deleted_carts.iter())
            .filter(|c| Some(c.id.as_str()) != exclude_id)
            .any(|c| c.name.trim().eq_ignore_ascii_case(needle))
    }

    pub fn find_store(&self, name: &str) -> Option<&Store> {
        let needle = name.trim();
        self.stores
            .iter()
            .find(|s| s.name.trim().eq_ignore_ascii_case(needle))
    }
}

impl Category {
    pub fn new(name: impl Into<String>, sort_order: i64) -> Self {
        Category {
            id: new_uuid_v7(),
            name: name.into(),
            sort_order,
            emoji: None,
            color_hex: None,
            items: Vec::new(),
        }
    }
}

impl Item {
    pub fn new(name: impl Into<String>, price_option: PriceOption) -> Self {
        Item {
            id: new_uuid_v7(),
            name: name.into(),
            created_at: now_ms(),
            price_options: vec![price_option],
            is_deleted: false,
            deleted_at: None,
            deleted_from_category_name: None,
            deleted_cart_item_snapshots: Vec::new(),
        }
    }

    pub fn price_option_for_store(&self, store: &str) -> Option<&PriceOption> {
        let needle = store.trim();
        self.price_options
            .iter()
            .find(|p| p.store.trim().eq_ignore_ascii_case(needle))
    }

    /// Overwrites the option matching `store` (case-insensitive) or appends
    /// a new one. Same-store replacement never duplicates entries.
    pub fn upsert_price_option(&mut self, store: &str, price: Decimal, unit: &str) {
        let needle = store.trim();
        if let Some(existing) = self
            .price_options
            .iter_mut()
            .find(|p| p.store.trim().eq_ignore_ascii_case(needle))
        {
            existing.price = price;
            existing.unit = unit.to_string();
        } else {
            self.price_options.push(PriceOption {
                store: store.to_string(),
                price,
                unit: unit.to_string(),
            });
        }
    }
}

impl Cart {
    pub fn new(name: impl Into<String>, budget: Decimal) -> Self {
        let now = now_ms();
        Cart {
            id: new_uuid_v7(),
            name: name.into(),
            budget,
            status: CartStatus::Planning,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            total_spent: Decimal::ZERO,
            fulfillment_status: 0.0,
            is_deleted: false,
            deleted_at: None,
            cart_items: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted && self.status != CartStatus::Completed
    }

    pub fn contains_catalog_item(&self, item_id: &str) -> bool {
        self.cart_items
            .iter()
            .any(|ci| ci.catalog_item_id() == Some(item_id))
    }

    /// Rows are addressed by the catalog item id for catalog-backed rows and
    /// by the local id for shopping-only rows.
    pub fn find_cart_item(&self, id: &str) -> Option<&CartItem> {
        self.cart_items.iter().find(|ci| ci.item_id() == id)
    }

    pub fn find_cart_item_mut(&mut self, id: &str) -> Option<&mut CartItem> {
        self.cart_items.iter_mut().find(|ci| ci.item_id() == id)
    }
}

impl CartItem {
    pub fn catalog_backed(item_id: impl Into<String>, quantity: Decimal) -> Self {
        CartItem::with_kind(
            CartItemKind::CatalogBacked {
                item_id: item_id.into(),
            },
            quantity,
        )
    }

    pub fn shopping_only(
        name: impl Into<String>,
        store: Option<String>,
        price: Option<Decimal>,
        unit: Option<String>,
        category: Option<String>,
        quantity: Decimal,
    ) -> Self {
        CartItem::with_kind(
            CartItemKind::ShoppingOnly {
                id: new_uuid_v7(),
                name: name.into(),
                store,
                price,
                unit,
                category,
            },
            quantity,
        )
    }

    fn with_kind(kind: CartItemKind, quantity: Decimal) -> Self {
        CartItem {
            kind,
            quantity,
            planned_store: None,
            planned_price: None,
            planned_unit: None,
            actual_store: None,
            actual_price: None,
            actual_quantity: None,
            actual_unit: None,
            is_fulfilled: false,
            is_skipped_during_shopping: false,
            was_edited_during_shopping: false,
            added_during_shopping: false,
            added_at: now_ms(),
            original_planning_quantity: None,
            vault_item_name_snapshot: None,
            vault_item_category_snapshot: None,
        }
    }

    pub fn is_shopping_only(&self) -> bool {
        matches!(self.kind, CartItemKind::ShoppingOnly { .. })
    }

    /// The id this row answers to: the catalog item id, or the
    /// locally-scoped shopping-only id.
    pub fn item_id(&self) -> &str {
        match &self.kind {
            CartItemKind::CatalogBacked { item_id } => item_id,
            CartItemKind::ShoppingOnly { id, .. } => id,
        }
    }

    pub fn catalog_item_id(&self) -> Option<&str> {
        match &self.kind {
            CartItemKind::CatalogBacked { item_id } => Some(item_id),
            CartItemKind::ShoppingOnly { .. } => None,
        }
    }

    /// Price used for spend totals: actual wins once recorded.
    pub fn effective_price(&self) -> Option<Decimal> {
        self.actual_price.or(self.planned_price)
    }

    pub fn effective_quantity(&self) -> Decimal {
        self.actual_quantity.unwrap_or(self.quantity)
    }

    pub fn clear_actuals(&mut self) {
        self.actual_store = None;
        self.actual_price = None;
        self.actual_quantity = None;
        self.actual_unit = None;
    }
}
