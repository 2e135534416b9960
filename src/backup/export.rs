use crate::model::{Cart, CartItem, CartItemKind, Vault};
use crate::time::now_ms;

use super::document::{
    BackupCart, BackupCategory, BackupItem, BackupPriceOption, BackupStore, CartItemRecord,
    VaultBackup, BACKUP_VERSION,
};

/// Produces a point-in-time, denormalized snapshot of the live catalog.
/// Trashed items and trashed carts are a local recovery affordance and are
/// not part of the portable document.
pub fn export_vault(vault: &Vault, include_carts: bool) -> VaultBackup {
    let categories = vault
        .categories
        .iter()
        .map(|c| BackupCategory {
            name: c.name.clone(),
            sort_order: c.sort_order,
        })
        .collect();

    let items = vault
        .categories
        .iter()
        .flat_map(|category| {
            category.items.iter().map(|item| BackupItem {
                id: item.id.clone(),
                name: item.name.clone(),
                created_at: item.created_at,
                category_name: category.name.clone(),
                price_options: item
                    .price_options
                    .iter()
                    .map(|p| BackupPriceOption {
                        store: p.store.clone(),
                        price: p.price,
                        unit: p.unit.clone(),
                    })
                    .collect(),
            })
        })
        .collect();

    let stores = vault
        .stores
        .iter()
        .map(|s| BackupStore {
            name: s.name.clone(),
            created_at: s.created_at,
        })
        .collect();

    let carts = if include_carts {
        vault.carts.iter().map(cart_to_backup).collect()
    } else {
        Vec::new()
    };

    VaultBackup {
        timestamp: now_ms(),
        version: BACKUP_VERSION,
        categories,
        items,
        stores,
        carts,
    }
}

fn cart_to_backup(cart: &Cart) -> BackupCart {
    BackupCart {
        id: cart.id.clone(),
        name: cart.name.clone(),
        budget: cart.budget,
        status: cart.status.backup_code(),
        created_at: cart.created_at,
        updated_at: cart.updated_at,
        started_at: cart.started_at,
        completed_at: cart.completed_at,
        items: cart.cart_items.iter().map(cart_item_to_record).collect(),
    }
}

fn cart_item_to_record(cart_item: &CartItem) -> CartItemRecord {
    let (item_id, is_shopping_only, so_name, so_store, so_price, so_unit, so_category) =
        match &cart_item.kind {
            CartItemKind::CatalogBacked { item_id } => {
                (item_id.clone(), false, None, None, None, None, None)
            }
            CartItemKind::ShoppingOnly {
                id,
                name,
                store,
                price,
                unit,
                category,
            } => (
                id.clone(),
                true,
                Some(name.clone()),
                store.clone(),
                *price,
                unit.clone(),
                category.clone(),
            ),
        };

    CartItemRecord {
        item_id,
        quantity: cart_item.quantity,
        is_fulfilled: cart_item.is_fulfilled,
        is_skipped_during_shopping: cart_item.is_skipped_during_shopping,
        planned_store: cart_item.planned_store.clone(),
        planned_price: cart_item.planned_price,
        planned_unit: cart_item.planned_unit.clone(),
        actual_store: cart_item.actual_store.clone(),
        actual_price: cart_item.actual_price,
        actual_quantity: cart_item.actual_quantity,
        actual_unit: cart_item.actual_unit.clone(),
        is_shopping_only_item: is_shopping_only,
        shopping_only_name: so_name,
        shopping_only_store: so_store,
        shopping_only_price: so_price,
        shopping_only_unit: so_unit,
        shopping_only_category: so_category,
        original_planning_quantity: cart_item.original_planning_quantity,
        added_during_shopping: cart_item.added_during_shopping,
        added_at: Some(cart_item.added_at),
    }
}
