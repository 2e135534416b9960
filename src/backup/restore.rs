use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::cart::update_cart_totals;
use crate::db::VaultDb;
use crate::model::{
    Cart, CartItem, CartItemKind, CartStatus, Category, Item, PriceOption, Store, Vault,
};
use crate::{AppError, AppResult};

use super::document::{BackupCart, CartItemRecord, VaultBackup, BACKUP_VERSION};

const BACKUP_FORMAT_CODE: &str = "BACKUP/FORMAT";

#[derive(Debug, Error)]
pub enum BackupFormatError {
    #[error("unsupported backup version {0}")]
    UnsupportedVersion(i64),
    #[error("unknown cart status code {0} in cart {1}")]
    InvalidStatusCode(i64, String),
}

impl From<BackupFormatError> for AppError {
    fn from(error: BackupFormatError) -> Self {
        AppError::new(BACKUP_FORMAT_CODE, error.to_string())
    }
}

/// Counts of what the merge did, in the shape callers log and display.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreReport {
    pub stores_added: u64,
    pub categories_added: u64,
    pub items_added: u64,
    pub items_merged: u64,
    pub carts_added: u64,
    pub carts_skipped: u64,
    /// Cart rows whose catalog record was unrecoverable and which were
    /// converted to shopping-only entries to preserve spend history.
    pub cart_items_recovered: u64,
}

/// Merges a backup document into a live vault. Never a destructive
/// overwrite: stores and categories are unioned, items are matched by name
/// within their category, and carts are only added when their id is new.
///
/// Persists once after the catalog merge and, when carts are included,
/// again after the cart merge. A persistence failure surfaces the error and
/// leaves the in-memory state for the caller to retry or discard.
pub async fn restore_backup(
    db: &VaultDb,
    vault: &mut Vault,
    backup: &VaultBackup,
    include_carts: bool,
) -> AppResult<RestoreReport> {
    // Format validation happens before any mutation.
    if backup.version > BACKUP_VERSION || backup.version < 0 {
        return Err(BackupFormatError::UnsupportedVersion(backup.version).into());
    }
    if include_carts {
        for cart in &backup.carts {
            if CartStatus::from_backup_code(cart.status).is_none() {
                return Err(
                    BackupFormatError::InvalidStatusCode(cart.status, cart.id.clone()).into(),
                );
            }
        }
    }

    let mut report = RestoreReport::default();

    // Step 1: stores, unioned by case-insensitive name.
    for backup_store in &backup.stores {
        if vault.find_store(&backup_store.name).is_none() {
            vault.stores.push(Store {
                name: backup_store.name.clone(),
                created_at: backup_store.created_at,
            });
            report.stores_added += 1;
        }
    }

    // Step 2: categories, unioned by exact name at the next sort position.
    for backup_category in &backup.categories {
        if vault.categories.iter().any(|c| c.name == backup_category.name) {
            continue;
        }
        let next_sort = vault
            .categories
            .iter()
            .map(|c| c.sort_order + 1)
            .max()
            .unwrap_or(0);
        vault
            .categories
            .push(Category::new(backup_category.name.clone(), next_sort));
        report.categories_added += 1;
    }

    // Step 3: items. A same-named item in the target category is treated as
    // the same item and only gains price options for stores it lacks; the
    // mapping feeds cart reconstruction in step 4.
    let mut id_map: HashMap<String, String> = HashMap::new();
    for backup_item in &backup.items {
        let category_index = vault
            .categories
            .iter()
            .position(|c| c.name == backup_item.category_name)
            .unwrap_or(0);
        let category = &mut vault.categories[category_index];

        let existing = category.items.iter_mut().find(|i| {
            i.name
                .trim()
                .eq_ignore_ascii_case(backup_item.name.trim())
        });
        match existing {
            Some(item) => {
                for option in &backup_item.price_options {
                    if item.price_option_for_store(&option.store).is_none() {
                        item.price_options.push(PriceOption {
                            store: option.store.clone(),
                            price: option.price,
                            unit: option.unit.clone(),
                        });
                    }
                }
                id_map.insert(backup_item.id.clone(), item.id.clone());
                report.items_merged += 1;
            }
            None => {
                // The backup id is preserved; a collision with a live id is
                // assumed astronomically unlikely and not defended against.
                category.items.push(Item {
                    id: backup_item.id.clone(),
                    name: backup_item.name.clone(),
                    created_at: backup_item.created_at,
                    price_options: backup_item
                        .price_options
                        .iter()
                        .map(|p| PriceOption {
                            store: p.store.clone(),
                            price: p.price,
                            unit: p.unit.clone(),
                        })
                        .collect(),
                    is_deleted: false,
                    deleted_at: None,
                    deleted_from_category_name: None,
                    deleted_cart_item_snapshots: Vec::new(),
                });
                id_map.insert(backup_item.id.clone(), backup_item.id.clone());
                report.items_added += 1;
            }
        }
    }

    db.persist_vault(vault).await?;

    if include_carts {
        for backup_cart in &backup.carts {
            // Id scan covers the trash too, so an orphaned duplicate can
            // never be resurrected.
            if vault.find_cart(&backup_cart.id).is_some()
                || vault.find_deleted_cart(&backup_cart.id).is_some()
            {
                report.carts_skipped += 1;
                continue;
            }

            let mut cart = rebuild_cart(vault, backup_cart, &id_map, &mut report);
            update_cart_totals(&vault.categories, &mut cart);
            vault.carts.push(cart);
            report.carts_added += 1;
        }

        db.persist_vault(vault).await?;
    }

    info!(
        stores_added = report.stores_added,
        categories_added = report.categories_added,
        items_added = report.items_added,
        items_merged = report.items_merged,
        carts_added = report.carts_added,
        carts_skipped = report.carts_skipped,
        cart_items_recovered = report.cart_items_recovered,
        "backup merged into vault"
    );
    Ok(report)
}

fn rebuild_cart(
    vault: &Vault,
    backup_cart: &BackupCart,
    id_map: &HashMap<String, String>,
    report: &mut RestoreReport,
) -> Cart {
    let status = CartStatus::from_backup_code(backup_cart.status)
        .expect("status codes validated before mutation");

    let cart_items = backup_cart
        .items
        .iter()
        .map(|record| rebuild_cart_item(vault, record, id_map, report))
        .collect();

    Cart {
        id: backup_cart.id.clone(),
        name: backup_cart.name.clone(),
        budget: backup_cart.budget,
        status,
        created_at: backup_cart.created_at,
        updated_at: backup_cart.updated_at,
        started_at: backup_cart.started_at,
        completed_at: backup_cart.completed_at,
        total_spent: Default::default(),
        fulfillment_status: 0.0,
        is_deleted: false,
        deleted_at: None,
        cart_items,
    }
}

fn rebuild_cart_item(
    vault: &Vault,
    record: &CartItemRecord,
    id_map: &HashMap<String, String>,
    report: &mut RestoreReport,
) -> CartItem {
    let kind = if record.is_shopping_only_item {
        CartItemKind::ShoppingOnly {
            id: record.item_id.clone(),
            name: record
                .shopping_only_name
                .clone()
                .unwrap_or_else(|| synthesize_name(record)),
            store: record.shopping_only_store.clone(),
            price: record.shopping_only_price,
            unit: record.shopping_only_unit.clone(),
            category: record.shopping_only_category.clone(),
        }
    } else if let Some(local_id) = id_map.get(&record.item_id) {
        CartItemKind::CatalogBacked {
            item_id: local_id.clone(),
        }
    } else if vault.find_item(&record.item_id).is_some() {
        CartItemKind::CatalogBacked {
            item_id: record.item_id.clone(),
        }
    } else {
        // The referenced item is absent from the backup's own item list and
        // from the live catalog: keep the row as spend history instead of
        // leaving it dangling.
        report.cart_items_recovered += 1;
        CartItemKind::ShoppingOnly {
            id: record.item_id.clone(),
            name: synthesize_name(record),
            store: record.planned_store.clone(),
            price: record.planned_price,
            unit: record.planned_unit.clone(),
            category: None,
        }
    };

    CartItem {
        kind,
        quantity: record.quantity,
        planned_store: record.planned_store.clone(),
        planned_price: record.planned_price,
        planned_unit: record.planned_unit.clone(),
        actual_store: record.actual_store.clone(),
        actual_price: record.actual_price,
        actual_quantity: record.actual_quantity,
        actual_unit: record.actual_unit.clone(),
        is_fulfilled: record.is_fulfilled,
        is_skipped_during_shopping: record.is_skipped_during_shopping,
        was_edited_during_shopping: false,
        added_during_shopping: record.added_during_shopping,
        added_at: record.added_at.unwrap_or_else(crate::time::now_ms),
        original_planning_quantity: record.original_planning_quantity,
        vault_item_name_snapshot: None,
        vault_item_category_snapshot: None,
    }
}

fn synthesize_name(record: &CartItemRecord) -> String {
    match (&record.planned_store, record.planned_price) {
        (Some(store), Some(price)) => format!("Unknown item ({store}, {price})"),
        (Some(store), None) => format!("Unknown item ({store})"),
        (None, Some(price)) => format!("Unknown item ({price})"),
        (None, None) => "Unknown item".to_string(),
    }
}
