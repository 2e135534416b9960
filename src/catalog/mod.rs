pub mod reconcile;

use std::collections::HashMap;
use std::mem;

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::cart::update_cart_totals;
use crate::db::VaultDb;
use crate::model::{
    CartStatus, Category, DeletedCartItemSnapshot, Item, PriceOption, Store, Vault,
};
use crate::time::now_ms;
use crate::{AppError, AppResult};

use self::reconcile::{first_default_category_name, DEFAULT_CATEGORIES};

const EMPTY_NAME_CODE: &str = "VALIDATION/EMPTY_NAME";
const DUPLICATE_ITEM_CODE: &str = "VALIDATION/DUPLICATE_ITEM";
const ITEM_NOT_FOUND_CODE: &str = "ITEM/NOT_FOUND";
const CART_NOT_FOUND_CODE: &str = "CART/NOT_FOUND";
const ITEM_INVALID_STATE_CODE: &str = "ITEM/INVALID_STATE";
const CART_INVALID_STATE_CODE: &str = "CART/INVALID_STATE";
const STORE_NOT_FOUND_CODE: &str = "STORES/NOT_FOUND";

/// Input for creating or editing a catalog item. Edits carry exactly one
/// store: the first price option is overwritten, never appended to.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub name: String,
    pub category: String,
    pub store: String,
    pub price: Decimal,
    pub unit: String,
}

/// Read-only view produced by the item lookup fallback chain. Callers never
/// need to know whether the id resolved to a live catalog item, a
/// shopping-only cart row, or a trashed item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemView {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub price_options: Vec<PriceOption>,
    pub is_deleted: bool,
    pub is_shopping_only: bool,
}

impl ItemView {
    /// Placeholder used on display paths when an id resolves to nothing, so
    /// history views stay renderable with broken references.
    pub fn unknown(id: &str) -> Self {
        ItemView {
            id: id.to_string(),
            name: "Unknown Item".to_string(),
            category: None,
            price_options: Vec::new(),
            is_deleted: false,
            is_shopping_only: false,
        }
    }
}

/// Item-id to category-name cache, owned by one manager instance and
/// invalidated by it on every structural mutation. Staleness here is a
/// correctness bug: lookups feed the historical label snapshots.
#[derive(Debug, Default)]
struct CategoryNameCache {
    map: HashMap<String, String>,
}

impl CategoryNameCache {
    fn get(&mut self, vault: &Vault, item_id: &str) -> Option<String> {
        if let Some(name) = self.map.get(item_id) {
            return Some(name.clone());
        }
        let name = vault.item_category_name(item_id)?.to_string();
        self.map.insert(item_id.to_string(), name.clone());
        Some(name)
    }

    fn invalidate(&mut self, item_id: &str) {
        self.map.remove(item_id);
    }

    fn clear(&mut self) {
        self.map.clear();
    }
}

/// Category, item and store CRUD over the vault aggregate.
pub struct CatalogManager {
    db: VaultDb,
    category_cache: CategoryNameCache,
}

impl CatalogManager {
    pub fn new(db: VaultDb) -> Self {
        CatalogManager {
            db,
            category_cache: CategoryNameCache::default(),
        }
    }

    /// Category name for a live item, via the manager-scoped cache.
    pub fn category_name_for_item(&mut self, vault: &Vault, item_id: &str) -> Option<String> {
        self.category_cache.get(vault, item_id)
    }

    /// Drops all cached category lookups. Called after bulk structural
    /// changes such as a backup merge.
    pub fn invalidate_category_cache(&mut self) {
        self.category_cache.clear();
    }

    pub async fn add_item(&mut self, vault: &mut Vault, draft: ItemDraft) -> AppResult<String> {
        let name = validate_item_draft(vault, &draft, None)?;

        let category_name = ensure_category(vault, &draft.category);
        let item = Item::new(
            name,
            PriceOption {
                store: draft.store.trim().to_string(),
                price: draft.price,
                unit: draft.unit.clone(),
            },
        );
        let item_id = item.id.clone();
        vault
            .find_category_mut(&category_name)
            .expect("category ensured above")
            .items
            .push(item);

        debug!(item_id, category = %category_name, "item added to catalog");
        self.db.persist_vault(vault).await?;
        Ok(item_id)
    }

    /// Renames the item, overwrites its first price option and moves it
    /// between categories when the target differs. Planning carts containing
    /// the item get their planned snapshots refreshed; shopping and
    /// completed carts keep theirs frozen.
    pub async fn update_item(
        &mut self,
        vault: &mut Vault,
        item_id: &str,
        draft: ItemDraft,
    ) -> AppResult<()> {
        let name = validate_item_draft(vault, &draft, Some(item_id))?;

        let current_category = vault
            .item_category_name(item_id)
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::new(ITEM_NOT_FOUND_CODE, "Item not found")
                    .with_context("item_id", item_id.to_string())
            })?;

        {
            let item = vault.find_item_mut(item_id).expect("category lookup hit");
            item.name = name;
            let store = draft.store.trim().to_string();
            match item.price_options.first_mut() {
                Some(option) => {
                    option.store = store;
                    option.price = draft.price;
                    option.unit = draft.unit.clone();
                }
                None => item.price_options.push(PriceOption {
                    store,
                    price: draft.price,
                    unit: draft.unit.clone(),
                }),
            }
        }

        let target_category = draft.category.trim();
        if !current_category.trim().eq_ignore_ascii_case(target_category) {
            let item = take_item_from_category(vault, &current_category, item_id)
                .expect("item located above");
            let target = ensure_category(vault, target_category);
            vault
                .find_category_mut(&target)
                .expect("category ensured above")
                .items
                .push(item);
            self.category_cache.invalidate(item_id);
        }

        refresh_planning_snapshots(vault, item_id, &draft);
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    /// Edit initiated from within a cart; behavior branches on cart status.
    /// Planning edits flow through the catalog, shopping edits touch only
    /// the fulfilled cart row's actual fields, completed carts are frozen.
    pub async fn update_item_from_cart(
        &mut self,
        vault: &mut Vault,
        item_id: &str,
        cart_id: &str,
        draft: ItemDraft,
        quantity: Option<Decimal>,
    ) -> AppResult<()> {
        let status = vault
            .find_cart(cart_id)
            .ok_or_else(|| {
                AppError::new(CART_NOT_FOUND_CODE, "Cart not found")
                    .with_context("cart_id", cart_id.to_string())
            })?
            .status;

        match status {
            CartStatus::Planning => self.update_item(vault, item_id, draft).await,
            CartStatus::Shopping => {
                {
                    let cart = vault.find_cart_mut(cart_id).expect("status lookup hit");
                    let cart_item = cart.find_cart_item_mut(item_id).ok_or_else(|| {
                        AppError::new(ITEM_NOT_FOUND_CODE, "Item is not in this cart")
                            .with_context("cart_id", cart_id.to_string())
                            .with_context("item_id", item_id.to_string())
                    })?;
                    if !cart_item.is_fulfilled {
                        return Err(AppError::new(
                            ITEM_INVALID_STATE_CODE,
                            "Only fulfilled items can be edited during shopping",
                        )
                        .with_context("item_id", item_id.to_string()));
                    }
                    cart_item.actual_store = Some(draft.store.trim().to_string());
                    cart_item.actual_price = Some(draft.price);
                    cart_item.actual_unit = Some(draft.unit.clone());
                    if let Some(quantity) = quantity {
                        cart_item.actual_quantity = Some(quantity);
                    }
                    cart_item.was_edited_during_shopping = true;
                }
                let Vault {
                    categories, carts, ..
                } = vault;
                let cart = carts
                    .iter_mut()
                    .find(|c| c.id == cart_id)
                    .expect("status lookup hit");
                update_cart_totals(categories, cart);
                self.db.persist_vault(vault).await?;
                Ok(())
            }
            CartStatus::Completed => Err(AppError::new(
                CART_INVALID_STATE_CODE,
                "Completed carts cannot be edited",
            )
            .with_context("cart_id", cart_id.to_string())),
        }
    }

    /// Soft-deletes an item into the trash. Active carts lose their rows for
    /// it, each captured as a snapshot on the item for later restoration;
    /// completed carts keep referencing the id and resolve through the
    /// lookup fallback chain.
    pub async fn delete_item(&mut self, vault: &mut Vault, item_id: &str) -> AppResult<()> {
        if vault.find_deleted_item(item_id).is_some() {
            return Ok(());
        }

        let category_name = vault
            .item_category_name(item_id)
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::new(ITEM_NOT_FOUND_CODE, "Item not found")
                    .with_context("item_id", item_id.to_string())
            })?;

        let mut item =
            take_item_from_category(vault, &category_name, item_id).expect("item located above");
        item.is_deleted = true;
        item.deleted_at = Some(now_ms());
        item.deleted_from_category_name = Some(category_name);

        let mut snapshot_count = 0_usize;
        {
            let Vault {
                categories, carts, ..
            } = vault;
            for cart in carts.iter_mut().filter(|c| c.is_active()) {
                if let Some(position) = cart
                    .cart_items
                    .iter()
                    .position(|ci| ci.catalog_item_id() == Some(item_id))
                {
                    let cart_item = cart.cart_items.remove(position);
                    item.deleted_cart_item_snapshots.push(DeletedCartItemSnapshot {
                        cart_id: cart.id.clone(),
                        cart_item,
                    });
                    snapshot_count += 1;
                    update_cart_totals(categories, cart);
                }
            }
        }

        vault.deleted_items.push(item);
        self.category_cache.invalidate(item_id);

        info!(item_id, snapshots = snapshot_count, "item moved to trash");
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    /// Restores a trashed item into its origin category, recreating the
    /// category when it no longer exists and falling back to the first
    /// default otherwise. Snapshots are optionally replayed into carts that
    /// are still active and discarded afterwards either way.
    pub async fn restore_deleted_item(
        &mut self,
        vault: &mut Vault,
        item_id: &str,
        restore_to_active_carts: bool,
    ) -> AppResult<()> {
        let position = vault
            .deleted_items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| {
                AppError::new(ITEM_NOT_FOUND_CODE, "Item is not in the trash")
                    .with_context("item_id", item_id.to_string())
            })?;

        let mut item = vault.deleted_items.remove(position);
        let snapshots = mem::take(&mut item.deleted_cart_item_snapshots);
        item.is_deleted = false;
        item.deleted_at = None;
        let origin = item
            .deleted_from_category_name
            .take()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| first_default_category_name().to_string());

        let category_name = ensure_category(vault, &origin);
        vault
            .find_category_mut(&category_name)
            .expect("category ensured above")
            .items
            .push(item);

        let mut replayed = 0_usize;
        if restore_to_active_carts {
            let Vault {
                categories, carts, ..
            } = vault;
            for snapshot in &snapshots {
                let Some(cart) = carts
                    .iter_mut()
                    .find(|c| c.id == snapshot.cart_id && c.is_active())
                else {
                    continue;
                };
                if cart.contains_catalog_item(item_id) {
                    continue;
                }
                cart.cart_items.push(snapshot.cart_item.clone());
                replayed += 1;
                update_cart_totals(categories, cart);
            }
        }

        self.category_cache.invalidate(item_id);
        info!(
            item_id,
            category = %category_name,
            replayed,
            discarded = snapshots.len() - replayed,
            "item restored from trash"
        );
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    /// Hard-removes a trashed item and, transitively, its snapshots.
    pub async fn permanently_delete_item_from_trash(
        &mut self,
        vault: &mut Vault,
        item_id: &str,
    ) -> AppResult<()> {
        let position = vault
            .deleted_items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| {
                AppError::new(ITEM_NOT_FOUND_CODE, "Item is not in the trash")
                    .with_context("item_id", item_id.to_string())
            })?;
        vault.deleted_items.remove(position);
        self.category_cache.invalidate(item_id);
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    pub async fn add_store(&mut self, vault: &mut Vault, name: &str) -> AppResult<()> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(AppError::new(EMPTY_NAME_CODE, "Store name cannot be empty"));
        }
        if ensure_store_registered(vault, trimmed) {
            self.db.persist_vault(vault).await?;
        }
        Ok(())
    }

    /// Renames a registry entry and rewrites every matching
    /// `PriceOption.store` string, keeping the two loosely-synchronized
    /// representations in step.
    pub async fn rename_store(
        &mut self,
        vault: &mut Vault,
        old_name: &str,
        new_name: &str,
    ) -> AppResult<()> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(AppError::new(EMPTY_NAME_CODE, "Store name cannot be empty"));
        }
        let old_trimmed = old_name.trim().to_string();

        let store = vault
            .stores
            .iter_mut()
            .find(|s| s.name.trim().eq_ignore_ascii_case(&old_trimmed))
            .ok_or_else(|| {
                AppError::new(STORE_NOT_FOUND_CODE, "Store not found")
                    .with_context("store", old_trimmed.clone())
            })?;
        store.name = new_name.to_string();

        let mut rewritten = 0_usize;
        for item in vault
            .categories
            .iter_mut()
            .flat_map(|c| c.items.iter_mut())
            .chain(vault.deleted_items.iter_mut())
        {
            for option in &mut item.price_options {
                if option.store.trim().eq_ignore_ascii_case(&old_trimmed) {
                    option.store = new_name.to_string();
                    rewritten += 1;
                }
            }
        }

        debug!(old = %old_trimmed, new = %new_name, rewritten, "store renamed");
        self.db.persist_vault(vault).await?;
        Ok(())
    }

    /// Resolves an id through the fallback chain: live catalog item,
    /// shopping-only cart row, then trashed item. Unknown ids fail with
    /// `ITEM/NOT_FOUND`.
    pub fn find_item_by_id(&mut self, vault: &Vault, item_id: &str) -> AppResult<ItemView> {
        if let Some(item) = vault.find_item(item_id) {
            let category = self.category_cache.get(vault, item_id);
            return Ok(ItemView {
                id: item.id.clone(),
                name: item.name.clone(),
                category,
                price_options: item.price_options.clone(),
                is_deleted: false,
                is_shopping_only: false,
            });
        }

        for cart in vault.carts.iter().chain(vault.deleted_carts.iter()) {
            for cart_item in &cart.cart_items {
                if let crate::model::CartItemKind::ShoppingOnly {
                    id,
                    name,
                    store,
                    price,
                    unit,
                    category,
                } = &cart_item.kind
                {
                    if id == item_id {
                        let price_options = match (store, price) {
                            (Some(store), Some(price)) => vec![PriceOption {
                                store: store.clone(),
                                price: *price,
                                unit: unit.clone().unwrap_or_default(),
                            }],
                            _ => Vec::new(),
                        };
                        return Ok(ItemView {
                            id: id.clone(),
                            name: name.clone(),
                            category: category.clone(),
                            price_options,
                            is_deleted: false,
                            is_shopping_only: true,
                        });
                    }
                }
            }
        }

        if let Some(item) = vault.find_deleted_item(item_id) {
            return Ok(ItemView {
                id: item.id.clone(),
                name: item.name.clone(),
                category: item.deleted_from_category_name.clone(),
                price_options: item.price_options.clone(),
                is_deleted: true,
                is_shopping_only: false,
            });
        }

        Err(AppError::new(ITEM_NOT_FOUND_CODE, "Item not found")
            .with_context("item_id", item_id.to_string()))
    }

    /// Display-path lookup: never fails, substitutes an "Unknown Item"
    /// placeholder instead so aggregates downstream keep rendering.
    pub fn display_item(&mut self, vault: &Vault, item_id: &str) -> ItemView {
        self.find_item_by_id(vault, item_id)
            .unwrap_or_else(|_| ItemView::unknown(item_id))
    }
}

/// Shared add/update validation. Returns the trimmed name on success;
/// nothing is mutated on failure.
fn validate_item_draft(
    vault: &Vault,
    draft: &ItemDraft,
    exclude_id: Option<&str>,
) -> AppResult<String> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(AppError::new(EMPTY_NAME_CODE, "Item name cannot be empty"));
    }
    if vault.duplicate_item_exists(name, &draft.store, exclude_id) {
        return Err(AppError::new(
            DUPLICATE_ITEM_CODE,
            "An item with this name already exists for this store",
        )
        .with_context("name", name.to_string())
        .with_context("store", draft.store.trim().to_string()));
    }
    Ok(name.to_string())
}

/// Finds a category by name, creating a custom one at the next sort
/// position when absent. Returns the actual (stored) category name.
pub(crate) fn ensure_category(vault: &mut Vault, name: &str) -> String {
    if let Some(category) = vault.find_category(name) {
        return category.name.clone();
    }
    let trimmed = name.trim();
    let next_sort = vault
        .categories
        .iter()
        .map(|c| c.sort_order + 1)
        .max()
        .unwrap_or(DEFAULT_CATEGORIES.len() as i64);
    let category = Category::new(trimmed, next_sort);
    let stored = category.name.clone();
    vault.categories.push(category);
    stored
}

/// Registers a store name if not already present (case-insensitive).
/// Returns whether the registry changed.
pub(crate) fn ensure_store_registered(vault: &mut Vault, name: &str) -> bool {
    if vault.find_store(name).is_some() {
        return false;
    }
    vault.stores.push(Store {
        name: name.trim().to_string(),
        created_at: now_ms(),
    });
    true
}

fn take_item_from_category(vault: &mut Vault, category_name: &str, item_id: &str) -> Option<Item> {
    let category = vault.find_category_mut(category_name)?;
    let position = category.items.iter().position(|i| i.id == item_id)?;
    Some(category.items.remove(position))
}

/// Fans a catalog edit out to every planning-status cart containing the
/// item. Shopping and completed carts keep their frozen snapshots.
fn refresh_planning_snapshots(vault: &mut Vault, item_id: &str, draft: &ItemDraft) {
    let Vault {
        categories, carts, ..
    } = vault;
    for cart in carts
        .iter_mut()
        .filter(|c| !c.is_deleted && c.status == CartStatus::Planning)
    {
        let Some(cart_item) = cart.find_cart_item_mut(item_id) else {
            continue;
        };
        cart_item.planned_store = Some(draft.store.trim().to_string());
        cart_item.planned_price = Some(draft.price);
        cart_item.planned_unit = Some(draft.unit.clone());
        update_cart_totals(categories, cart);
    }
}
