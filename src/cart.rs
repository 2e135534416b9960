use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::catalog::ensure_store_registered;
use crate::db::VaultDb;
use crate::model::{Cart, CartItem, CartItemKind, CartStatus, Category, Item, Vault};
use crate::time::now_ms;
use crate::{AppError, AppResult};

const EMPTY_NAME_CODE: &str = "VALIDATION/EMPTY_NAME";
const DUPLICATE_CART_CODE: &str = "VALIDATION/DUPLICATE_CART";
const CART_NOT_FOUND_CODE: &str = "CART/NOT_FOUND";
const CART_INVALID_STATE_CODE: &str = "CART/INVALID_STATE";
const CART_ITEM_NOT_FOUND_CODE: &str = "CART_ITEM/NOT_FOUND";
const ITEM_NOT_FOUND_CODE: &str = "ITEM/NOT_FOUND";

/// Payload for an ad hoc cart row entered during a trip. Never touches the
/// catalog.
#[derive(Debug, Clone)]
pub struct ShoppingOnlyDraft {
    pub name: String,
    pub store: Option<String>,
    pub price: Option<Decimal>,
    pub unit: Option<String>,
    pub category: Option<String>,
    pub quantity: Decimal,
}

/// Cart lifecycle state machine and cart item operations.
///
/// Legal transitions: planning → shopping → completed, shopping → planning
/// ("return to planning") and completed → shopping ("reopen"). Every other
/// transition fails the precondition check before any mutation happens.
pub struct CartManager {
    db: VaultDb,
}

impl CartManager {
    pub fn new(db: VaultDb) -> Self {
        CartManager { db }
    }

    pub async fn create_cart(
        &self,
        vault: &mut Vault,
        name: &str,
        budget: Decimal,
    ) -> AppResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::new(EMPTY_NAME_CODE, "Cart name cannot be empty"));
        }
        if vault.duplicate_cart_name_exists(name, None) {
            return Err(
                AppError::new(DUPLICATE_CART_CODE, "A cart with this name already exists")
                    .with_context("name", name.to_string()),
            );
        }

        let cart = Cart::new(name, budget);
        let cart_id = cart.id.clone();
        vault.carts.push(cart);
        debug!(cart_id, "cart created");
        self.db.persist_vault(vault).await?;
        Ok(cart_id)
    }

    /// Completed carts are history: they go to the trash and can be
    /// restored. Carts that never completed are deleted outright.
    pub async fn delete_cart(&self, vault: &mut Vault, cart_id: &str) -> AppResult<()> {
        let position = vault
            .carts
            .iter()
            .position(|c| c.id == cart_id)
            .ok_or_else(|| cart_not_found(cart_id))?;

        let mut cart = vault.carts.remove(position);
        if cart.status == CartStatus::Completed {
            cart.is_deleted = true;
            cart.deleted_at = Some(now_ms());
            vault.deleted_carts.push(cart);
            info!(cart_id, "completed cart moved to trash");
        } else {
            info!(cart_id, "cart hard-deleted");
        }
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    pub async fn restore_deleted_cart(&self, vault: &mut Vault, cart_id: &str) -> AppResult<()> {
        let position = vault
            .deleted_carts
            .iter()
            .position(|c| c.id == cart_id)
            .ok_or_else(|| {
                AppError::new(CART_NOT_FOUND_CODE, "Cart is not in the trash")
                    .with_context("cart_id", cart_id.to_string())
            })?;

        let mut cart = vault.deleted_carts.remove(position);
        cart.is_deleted = false;
        cart.deleted_at = None;
        vault.carts.push(cart);
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    pub async fn permanently_delete_cart_from_trash(
        &self,
        vault: &mut Vault,
        cart_id: &str,
    ) -> AppResult<()> {
        let position = vault
            .deleted_carts
            .iter()
            .position(|c| c.id == cart_id)
            .ok_or_else(|| {
                AppError::new(CART_NOT_FOUND_CODE, "Cart is not in the trash")
                    .with_context("cart_id", cart_id.to_string())
            })?;
        vault.deleted_carts.remove(position);
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    /// planning → shopping. Purges leftover shopping-only rows from a prior
    /// aborted session, snapshots each remaining row's planning quantity and
    /// captures planned price/unit/store from the current catalog.
    pub async fn start_shopping(&self, vault: &mut Vault, cart_id: &str) -> AppResult<()> {
        let now = now_ms();
        {
            let (categories, cart) = split_cart(vault, cart_id)?;
            require_status(cart, CartStatus::Planning, "start shopping")?;

            cart.cart_items.retain(|ci| !ci.is_shopping_only());
            for cart_item in &mut cart.cart_items {
                cart_item.original_planning_quantity = Some(cart_item.quantity);
                capture_planned(categories, cart_item);
            }

            cart.status = CartStatus::Shopping;
            cart.started_at = Some(now);
            cart.updated_at = now;
            update_cart_totals(categories, cart);
        }
        info!(cart_id, "shopping started");
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    /// shopping → completed. Defaults actuals from planned, snapshots
    /// historical name/category labels for catalog-backed rows, then writes
    /// the recorded actual price/unit back into the catalog price option for
    /// the actual store. Shopping-only rows never touch the catalog.
    pub async fn complete_shopping(&self, vault: &mut Vault, cart_id: &str) -> AppResult<()> {
        let now = now_ms();
        let mut write_backs: Vec<(String, String, Decimal, String)> = Vec::new();
        {
            let (categories, cart) = split_cart(vault, cart_id)?;
            require_status(cart, CartStatus::Shopping, "complete shopping")?;

            for cart_item in &mut cart.cart_items {
                if cart_item.actual_store.is_none() {
                    cart_item.actual_store = cart_item.planned_store.clone();
                }
                if cart_item.actual_price.is_none() {
                    cart_item.actual_price = cart_item.planned_price;
                }
                if cart_item.actual_quantity.is_none() {
                    cart_item.actual_quantity = Some(cart_item.quantity);
                }
                if cart_item.actual_unit.is_none() {
                    cart_item.actual_unit = cart_item.planned_unit.clone();
                }

                let catalog_id = cart_item.catalog_item_id().map(str::to_string);
                if let Some(item_id) = catalog_id {
                    let label = categories.iter().find_map(|c| {
                        c.items
                            .iter()
                            .find(|i| i.id == item_id)
                            .map(|i| (i.name.clone(), c.name.clone()))
                    });
                    if cart_item.vault_item_name_snapshot.is_none() {
                        cart_item.vault_item_name_snapshot = Some(
                            label
                                .as_ref()
                                .map(|(name, _)| name.clone())
                                .unwrap_or_else(|| "Unknown Item".to_string()),
                        );
                    }
                    if cart_item.vault_item_category_snapshot.is_none() {
                        cart_item.vault_item_category_snapshot =
                            label.map(|(_, category)| category);
                    }

                    if let (Some(store), Some(price)) =
                        (cart_item.actual_store.clone(), cart_item.actual_price)
                    {
                        let unit = cart_item.actual_unit.clone().unwrap_or_default();
                        write_backs.push((item_id, store, price, unit));
                    }
                }
            }

            cart.status = CartStatus::Completed;
            cart.completed_at = Some(now);
            cart.updated_at = now;
            update_cart_totals(categories, cart);
        }

        for (item_id, store, price, unit) in write_backs {
            if let Some(item) = vault.find_item_mut(&item_id) {
                item.upsert_price_option(&store, price, &unit);
            }
            ensure_store_registered(vault, &store);
        }

        info!(cart_id, "shopping completed");
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    /// completed → shopping. Clears the completion snapshot so the trip
    /// resumes against current catalog prices rather than the frozen ones.
    pub async fn reopen_cart(&self, vault: &mut Vault, cart_id: &str) -> AppResult<()> {
        let now = now_ms();
        {
            let (categories, cart) = split_cart(vault, cart_id)?;
            require_status(cart, CartStatus::Completed, "reopen")?;

            cart.completed_at = None;
            for cart_item in &mut cart.cart_items {
                cart_item.clear_actuals();
                cart_item.is_fulfilled = false;
                capture_planned(categories, cart_item);
            }
            cart.status = CartStatus::Shopping;
            cart.updated_at = now;
            update_cart_totals(categories, cart);
        }
        info!(cart_id, "cart reopened");
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    /// shopping → planning. Rows that only belong to a trip (shopping-only,
    /// added during shopping) are dropped; the rest revert to their planning
    /// quantities and get fresh planned data from the current catalog.
    pub async fn return_to_planning(&self, vault: &mut Vault, cart_id: &str) -> AppResult<()> {
        let now = now_ms();
        {
            let (categories, cart) = split_cart(vault, cart_id)?;
            require_status(cart, CartStatus::Shopping, "return to planning")?;

            cart.cart_items
                .retain(|ci| !ci.is_shopping_only() && !ci.added_during_shopping);
            for cart_item in &mut cart.cart_items {
                cart_item.is_fulfilled = false;
                cart_item.is_skipped_during_shopping = false;
                cart_item.was_edited_during_shopping = false;
                cart_item.clear_actuals();
                if let Some(quantity) = cart_item.original_planning_quantity.take() {
                    cart_item.quantity = quantity;
                }
                capture_planned(categories, cart_item);
            }

            cart.status = CartStatus::Planning;
            cart.started_at = None;
            cart.updated_at = now;
            update_cart_totals(categories, cart);
        }
        info!(cart_id, "cart returned to planning");
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    /// Adds a catalog item to a cart. An existing row for the same item
    /// accumulates quantity instead of duplicating; a new row snapshots
    /// planned data from the chosen store and, mid-trip, actual data too.
    pub async fn add_vault_item_to_cart(
        &self,
        vault: &mut Vault,
        cart_id: &str,
        item_id: &str,
        quantity: Decimal,
        store: Option<&str>,
    ) -> AppResult<()> {
        let now = now_ms();
        {
            let (categories, cart) = split_cart(vault, cart_id)?;
            forbid_completed(cart, "add an item")?;

            if let Some(existing) = cart
                .cart_items
                .iter_mut()
                .find(|ci| ci.catalog_item_id() == Some(item_id))
            {
                existing.quantity += quantity;
                existing.added_at = now;
            } else {
                let item = find_catalog_item(categories, item_id).ok_or_else(|| {
                    AppError::new(ITEM_NOT_FOUND_CODE, "Item not found")
                        .with_context("item_id", item_id.to_string())
                })?;
                let mut cart_item = CartItem::catalog_backed(item_id, quantity);
                cart_item.planned_store = store.map(|s| s.trim().to_string());
                let option = cart_item
                    .planned_store
                    .as_deref()
                    .and_then(|s| item.price_option_for_store(s))
                    .or_else(|| item.price_options.first());
                if let Some(option) = option {
                    cart_item.planned_store = Some(option.store.clone());
                    cart_item.planned_price = Some(option.price);
                    cart_item.planned_unit = Some(option.unit.clone());
                }
                if cart.status == CartStatus::Shopping {
                    // Items added mid-trip behave as already priced.
                    cart_item.actual_store = cart_item.planned_store.clone();
                    cart_item.actual_price = cart_item.planned_price;
                    cart_item.actual_unit = cart_item.planned_unit.clone();
                    cart_item.added_during_shopping = true;
                }
                cart.cart_items.push(cart_item);
            }

            cart.updated_at = now;
            update_cart_totals(categories, cart);
        }
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    pub async fn add_shopping_only_item(
        &self,
        vault: &mut Vault,
        cart_id: &str,
        draft: ShoppingOnlyDraft,
    ) -> AppResult<String> {
        if draft.name.trim().is_empty() {
            return Err(AppError::new(EMPTY_NAME_CODE, "Item name cannot be empty"));
        }
        let now = now_ms();
        let local_id;
        {
            let (categories, cart) = split_cart(vault, cart_id)?;
            forbid_completed(cart, "add an item")?;

            let mut cart_item = CartItem::shopping_only(
                draft.name.trim(),
                draft.store,
                draft.price,
                draft.unit,
                draft.category,
                draft.quantity,
            );
            capture_planned(categories, &mut cart_item);
            if cart.status == CartStatus::Shopping {
                cart_item.actual_store = cart_item.planned_store.clone();
                cart_item.actual_price = cart_item.planned_price;
                cart_item.actual_unit = cart_item.planned_unit.clone();
                cart_item.added_during_shopping = true;
            }
            local_id = cart_item.item_id().to_string();
            cart.cart_items.push(cart_item);

            cart.updated_at = now;
            update_cart_totals(categories, cart);
        }
        self.db.persist_vault(vault).await?;
        Ok(local_id)
    }

    /// Removal semantics depend on status: hard removal while planning; in
    /// shopping a catalog-backed row is only skip-flagged (reversible within
    /// the trip) while a shopping-only row is removed outright.
    pub async fn remove_item_from_cart(
        &self,
        vault: &mut Vault,
        cart_id: &str,
        cart_item_id: &str,
    ) -> AppResult<()> {
        let now = now_ms();
        {
            let (categories, cart) = split_cart(vault, cart_id)?;
            forbid_completed(cart, "remove an item")?;

            let position = cart
                .cart_items
                .iter()
                .position(|ci| ci.item_id() == cart_item_id)
                .ok_or_else(|| cart_item_not_found(cart_id, cart_item_id))?;

            match cart.status {
                CartStatus::Planning => {
                    cart.cart_items.remove(position);
                }
                CartStatus::Shopping => {
                    if cart.cart_items[position].is_shopping_only() {
                        cart.cart_items.remove(position);
                    } else {
                        let cart_item = &mut cart.cart_items[position];
                        cart_item.is_skipped_during_shopping = true;
                        cart_item.is_fulfilled = false;
                    }
                }
                CartStatus::Completed => unreachable!("guarded above"),
            }

            cart.updated_at = now;
            update_cart_totals(categories, cart);
        }
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    pub async fn toggle_fulfillment(
        &self,
        vault: &mut Vault,
        cart_id: &str,
        cart_item_id: &str,
    ) -> AppResult<()> {
        let now = now_ms();
        {
            let (categories, cart) = split_cart(vault, cart_id)?;
            require_status(cart, CartStatus::Shopping, "toggle fulfillment")?;

            let cart_item = cart
                .find_cart_item_mut(cart_item_id)
                .ok_or_else(|| cart_item_not_found(cart_id, cart_item_id))?;
            cart_item.is_fulfilled = !cart_item.is_fulfilled;
            if cart_item.is_fulfilled {
                cart_item.is_skipped_during_shopping = false;
            }

            cart.updated_at = now;
            update_cart_totals(categories, cart);
        }
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    /// Rewrites the planned (planning) or actual (shopping) snapshot from
    /// the catalog's current price at the new store.
    pub async fn change_cart_item_store(
        &self,
        vault: &mut Vault,
        cart_id: &str,
        cart_item_id: &str,
        new_store: &str,
    ) -> AppResult<()> {
        let now = now_ms();
        {
            let (categories, cart) = split_cart(vault, cart_id)?;
            forbid_completed(cart, "change an item's store")?;
            let status = cart.status;

            let cart_item = cart
                .find_cart_item_mut(cart_item_id)
                .ok_or_else(|| cart_item_not_found(cart_id, cart_item_id))?;

            let store = new_store.trim().to_string();
            let option = cart_item.catalog_item_id().and_then(|item_id| {
                find_catalog_item(categories, item_id)
                    .and_then(|item| item.price_option_for_store(&store))
                    .cloned()
            });
            let price = option.as_ref().map(|o| o.price);
            let unit = option.map(|o| o.unit);

            match status {
                CartStatus::Planning => {
                    cart_item.planned_store = Some(store);
                    cart_item.planned_price = price;
                    cart_item.planned_unit = unit;
                }
                CartStatus::Shopping => {
                    cart_item.actual_store = Some(store);
                    cart_item.actual_price = price;
                    cart_item.actual_unit = unit;
                    cart_item.was_edited_during_shopping = true;
                }
                CartStatus::Completed => unreachable!("guarded above"),
            }

            cart.updated_at = now;
            update_cart_totals(categories, cart);
        }
        self.db.persist_vault(vault).await?;
        Ok(())
    }
}

/// Recomputes `total_spent` and `fulfillment_status`. Always invoked
/// synchronously by the mutator that changed the cart; never a background
/// job. While shopping, unfulfilled rows still missing a planned price get
/// their planned snapshot captured lazily.
pub fn update_cart_totals(categories: &[Category], cart: &mut Cart) {
    if cart.status == CartStatus::Shopping {
        for cart_item in &mut cart.cart_items {
            if !cart_item.is_fulfilled && cart_item.planned_price.is_none() {
                capture_planned(categories, cart_item);
            }
        }
    }

    let total: Decimal = cart
        .cart_items
        .iter()
        .filter(|ci| !ci.is_skipped_during_shopping)
        .filter_map(|ci| ci.effective_price().map(|price| price * ci.effective_quantity()))
        .sum();
    cart.total_spent = total;

    cart.fulfillment_status = match cart.status {
        CartStatus::Planning => {
            if cart.budget > Decimal::ZERO {
                let ratio = (total / cart.budget).to_f64().unwrap_or(0.0);
                ratio.clamp(0.0, 1.0)
            } else {
                cart.fulfillment_status
            }
        }
        CartStatus::Shopping => {
            let total_count = cart.cart_items.len();
            if total_count == 0 {
                0.0
            } else {
                let fulfilled = cart.cart_items.iter().filter(|ci| ci.is_fulfilled).count();
                fulfilled as f64 / total_count as f64
            }
        }
        CartStatus::Completed => 1.0,
    };
    debug!(
        cart_id = %cart.id,
        total = %cart.total_spent,
        fulfillment = cart.fulfillment_status,
        "cart totals recomputed"
    );
}

/// Captures planned store/price/unit from the current catalog state. For a
/// catalog-backed row the option matching the planned store wins, falling
/// back to the item's first option; shopping-only rows plan from their own
/// payload.
pub(crate) fn capture_planned(categories: &[Category], cart_item: &mut CartItem) {
    match &cart_item.kind {
        CartItemKind::CatalogBacked { item_id } => {
            let Some(item) = find_catalog_item(categories, item_id) else {
                return;
            };
            let option = cart_item
                .planned_store
                .as_deref()
                .and_then(|store| item.price_option_for_store(store))
                .or_else(|| item.price_options.first());
            if let Some(option) = option {
                cart_item.planned_store = Some(option.store.clone());
                cart_item.planned_price = Some(option.price);
                cart_item.planned_unit = Some(option.unit.clone());
            }
        }
        CartItemKind::ShoppingOnly {
            store, price, unit, ..
        } => {
            cart_item.planned_store = store.clone();
            cart_item.planned_price = *price;
            cart_item.planned_unit = unit.clone();
        }
    }
}

fn find_catalog_item<'a>(categories: &'a [Category], item_id: &str) -> Option<&'a Item> {
    categories
        .iter()
        .flat_map(|c| c.items.iter())
        .find(|i| i.id == item_id)
}

/// Splits the vault into the catalog (shared) and one live cart (mutable)
/// so totals can read prices while the cart is being mutated.
fn split_cart<'a>(vault: &'a mut Vault, cart_id: &str) -> AppResult<(&'a [Category], &'a mut Cart)> {
    let Vault {
        categories, carts, ..
    } = vault;
    let cart = carts
        .iter_mut()
        .find(|c| c.id == cart_id)
        .ok_or_else(|| cart_not_found(cart_id))?;
    Ok((categories.as_slice(), cart))
}

fn require_status(cart: &Cart, expected: CartStatus, action: &str) -> AppResult<()> {
    if cart.status != expected {
        return Err(AppError::new(
            CART_INVALID_STATE_CODE,
            format!("Cannot {action} from the {} state", cart.status.as_str()),
        )
        .with_context("cart_id", cart.id.clone())
        .with_context("status", cart.status.as_str()));
    }
    Ok(())
}

fn forbid_completed(cart: &Cart, action: &str) -> AppResult<()> {
    if cart.status == CartStatus::Completed {
        return Err(AppError::new(
            CART_INVALID_STATE_CODE,
            format!("Cannot {action} in a completed cart"),
        )
        .with_context("cart_id", cart.id.clone()));
    }
    Ok(())
}

fn cart_not_found(cart_id: &str) -> AppError {
    AppError::new(CART_NOT_FOUND_CODE, "Cart not found")
        .with_context("cart_id", cart_id.to_string())
}

fn cart_item_not_found(cart_id: &str, cart_item_id: &str) -> AppError {
    AppError::new(CART_ITEM_NOT_FOUND_CODE, "Item is not in this cart")
        .with_context("cart_id", cart_id.to_string())
        .with_context("cart_item_id", cart_item_id.to_string())
}
