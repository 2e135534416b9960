use anyhow::Result;
use rust_decimal::Decimal;
use trolley_lib::model::CartStatus;
use trolley_lib::{CartManager, CatalogManager};

#[path = "util.rs"]
mod util;

#[tokio::test]
async fn deleting_an_item_snapshots_rows_from_active_carts() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let mut catalog = CatalogManager::new(db.clone());
    let carts = CartManager::new(db.clone());

    let item_id = catalog
        .add_item(&mut vault, util::draft("Yoghurt", "Dairy", "Market", 220, "pot"))
        .await?;
    let first = carts
        .create_cart(&mut vault, "First", Decimal::from(30))
        .await?;
    let second = carts
        .create_cart(&mut vault, "Second", Decimal::from(30))
        .await?;
    carts
        .add_vault_item_to_cart(&mut vault, &first, &item_id, Decimal::from(2), None)
        .await?;
    carts
        .add_vault_item_to_cart(&mut vault, &second, &item_id, Decimal::ONE, None)
        .await?;

    catalog.delete_item(&mut vault, &item_id).await?;

    assert!(vault.find_item(&item_id).is_none());
    let trashed = vault.find_deleted_item(&item_id).expect("in trash");
    assert!(trashed.is_deleted);
    assert!(trashed.deleted_at.is_some());
    assert_eq!(trashed.deleted_from_category_name.as_deref(), Some("Dairy"));
    assert_eq!(trashed.deleted_cart_item_snapshots.len(), 2);

    for cart_id in [&first, &second] {
        let cart = vault.find_cart(cart_id).unwrap();
        assert!(cart.cart_items.is_empty());
        assert_eq!(cart.total_spent, Decimal::ZERO);
    }

    // Deleting again is a no-op, not an error.
    catalog.delete_item(&mut vault, &item_id).await?;
    assert_eq!(
        vault
            .find_deleted_item(&item_id)
            .unwrap()
            .deleted_cart_item_snapshots
            .len(),
        2
    );
    Ok(())
}

#[tokio::test]
async fn completed_carts_keep_their_rows_and_render_via_fallback() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let mut catalog = CatalogManager::new(db.clone());
    let carts = CartManager::new(db.clone());

    let item_id = catalog
        .add_item(&mut vault, util::draft("Salmon", "Meat & Fish", "Market", 899, "fillet"))
        .await?;
    let cart_id = carts
        .create_cart(&mut vault, "Done", Decimal::from(20))
        .await?;
    carts
        .add_vault_item_to_cart(&mut vault, &cart_id, &item_id, Decimal::ONE, None)
        .await?;
    carts.start_shopping(&mut vault, &cart_id).await?;
    carts.toggle_fulfillment(&mut vault, &cart_id, &item_id).await?;
    carts.complete_shopping(&mut vault, &cart_id).await?;

    catalog.delete_item(&mut vault, &item_id).await?;

    // The completed cart is untouched and no snapshot was taken for it.
    let cart = vault.find_cart(&cart_id).unwrap();
    assert_eq!(cart.cart_items.len(), 1);
    let trashed = vault.find_deleted_item(&item_id).unwrap();
    assert!(trashed.deleted_cart_item_snapshots.is_empty());

    // The row still resolves (now to the trashed item) for history display.
    let view = catalog.display_item(&vault, &item_id);
    assert!(view.is_deleted);
    assert_eq!(view.name, "Salmon");

    // And after a permanent delete the display path degrades gracefully.
    catalog
        .permanently_delete_item_from_trash(&mut vault, &item_id)
        .await?;
    let view = catalog.display_item(&vault, &item_id);
    assert_eq!(view.name, "Unknown Item");
    let row = vault.find_cart(&cart_id).unwrap().find_cart_item(&item_id);
    assert!(row.is_some(), "dangling reference is kept in history");
    Ok(())
}

#[tokio::test]
async fn restore_replays_snapshots_into_still_active_carts() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let mut catalog = CatalogManager::new(db.clone());
    let carts = CartManager::new(db.clone());

    let item_id = catalog
        .add_item(&mut vault, util::draft("Crisps", "Pantry", "Market", 125, "bag"))
        .await?;
    let active = carts
        .create_cart(&mut vault, "Active", Decimal::from(15))
        .await?;
    let doomed = carts
        .create_cart(&mut vault, "Doomed", Decimal::from(15))
        .await?;
    carts
        .add_vault_item_to_cart(&mut vault, &active, &item_id, Decimal::from(3), None)
        .await?;
    carts
        .add_vault_item_to_cart(&mut vault, &doomed, &item_id, Decimal::ONE, None)
        .await?;

    catalog.delete_item(&mut vault, &item_id).await?;
    carts.delete_cart(&mut vault, &doomed).await?;

    catalog.restore_deleted_item(&mut vault, &item_id, true).await?;

    assert!(vault.find_deleted_item(&item_id).is_none());
    assert_eq!(vault.item_category_name(&item_id), Some("Pantry"));

    let cart = vault.find_cart(&active).unwrap();
    let row = cart.find_cart_item(&item_id).expect("row replayed");
    assert_eq!(row.quantity, Decimal::from(3));
    assert_eq!(cart.total_spent, Decimal::new(375, 2));

    // Snapshots are consumed by the restore either way.
    let item = vault.find_item(&item_id).unwrap();
    assert!(item.deleted_cart_item_snapshots.is_empty());
    Ok(())
}

#[tokio::test]
async fn restore_recreates_a_missing_origin_category() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let mut catalog = CatalogManager::new(db.clone());

    let item_id = catalog
        .add_item(&mut vault, util::draft("Dog food", "Pets", "Market", 1299, "kg"))
        .await?;
    catalog.delete_item(&mut vault, &item_id).await?;

    // The custom category empties out and gets removed by the user.
    vault.categories.retain(|c| c.name != "Pets");
    db.persist_vault(&vault).await?;

    catalog.restore_deleted_item(&mut vault, &item_id, false).await?;

    let pets = vault.find_category("Pets").expect("category recreated");
    assert_eq!(pets.items.len(), 1);
    assert_eq!(vault.item_category_name(&item_id), Some("Pets"));
    Ok(())
}

#[tokio::test]
async fn restore_without_replay_discards_snapshots() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let mut catalog = CatalogManager::new(db.clone());
    let carts = CartManager::new(db.clone());

    let item_id = catalog
        .add_item(&mut vault, util::draft("Juice", "Drinks", "Market", 250, "l"))
        .await?;
    let cart_id = carts
        .create_cart(&mut vault, "Weekly", Decimal::from(25))
        .await?;
    carts
        .add_vault_item_to_cart(&mut vault, &cart_id, &item_id, Decimal::ONE, None)
        .await?;

    catalog.delete_item(&mut vault, &item_id).await?;
    catalog.restore_deleted_item(&mut vault, &item_id, false).await?;

    let cart = vault.find_cart(&cart_id).unwrap();
    assert!(cart.cart_items.is_empty());
    let item = vault.find_item(&item_id).unwrap();
    assert!(item.deleted_cart_item_snapshots.is_empty());
    Ok(())
}

#[tokio::test]
async fn trash_operations_reject_unknown_ids() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let mut catalog = CatalogManager::new(db.clone());

    let err = catalog
        .restore_deleted_item(&mut vault, "missing", true)
        .await
        .expect_err("not in trash");
    assert_eq!(err.code(), "ITEM/NOT_FOUND");

    let err = catalog
        .permanently_delete_item_from_trash(&mut vault, "missing")
        .await
        .expect_err("not in trash");
    assert_eq!(err.code(), "ITEM/NOT_FOUND");

    let err = catalog
        .delete_item(&mut vault, "missing")
        .await
        .expect_err("not in catalog");
    assert_eq!(err.code(), "ITEM/NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn completed_cart_goes_to_trash_and_comes_back() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let carts = CartManager::new(db.clone());

    let planning = carts
        .create_cart(&mut vault, "Abandoned plan", Decimal::from(10))
        .await?;
    let completed = carts
        .create_cart(&mut vault, "Finished trip", Decimal::from(10))
        .await?;
    carts.start_shopping(&mut vault, &completed).await?;
    carts.complete_shopping(&mut vault, &completed).await?;

    // A cart that never completed is deleted outright.
    carts.delete_cart(&mut vault, &planning).await?;
    assert!(vault.find_cart(&planning).is_none());
    assert!(vault.find_deleted_cart(&planning).is_none());

    // A completed one is history and goes to the trash instead.
    carts.delete_cart(&mut vault, &completed).await?;
    assert!(vault.find_cart(&completed).is_none());
    let trashed = vault.find_deleted_cart(&completed).expect("in trash");
    assert!(trashed.is_deleted);
    assert!(trashed.deleted_at.is_some());

    // Its name stays reserved while trashed.
    let err = carts
        .create_cart(&mut vault, "finished trip", Decimal::from(10))
        .await
        .expect_err("name reserved by trash");
    assert_eq!(err.code(), "VALIDATION/DUPLICATE_CART");

    carts.restore_deleted_cart(&mut vault, &completed).await?;
    let cart = vault.find_cart(&completed).expect("restored");
    assert!(!cart.is_deleted);
    assert_eq!(cart.status, CartStatus::Completed);

    carts.delete_cart(&mut vault, &completed).await?;
    carts
        .permanently_delete_cart_from_trash(&mut vault, &completed)
        .await?;
    assert!(vault.find_deleted_cart(&completed).is_none());
    Ok(())
}
