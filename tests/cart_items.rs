use anyhow::Result;
use rust_decimal::Decimal;
use trolley_lib::{CartManager, CatalogManager, ShoppingOnlyDraft};

#[path = "util.rs"]
mod util;

#[tokio::test]
async fn adding_the_same_item_accumulates_quantity() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let mut catalog = CatalogManager::new(db.clone());
    let carts = CartManager::new(db.clone());

    let item_id = catalog
        .add_item(&mut vault, util::draft("Pasta", "Pantry", "Market", 120, "pack"))
        .await?;
    let cart_id = carts
        .create_cart(&mut vault, "Weekly", Decimal::from(20))
        .await?;

    carts
        .add_vault_item_to_cart(&mut vault, &cart_id, &item_id, Decimal::from(2), None)
        .await?;
    carts
        .add_vault_item_to_cart(&mut vault, &cart_id, &item_id, Decimal::from(3), None)
        .await?;

    let cart = vault.find_cart(&cart_id).unwrap();
    assert_eq!(cart.cart_items.len(), 1);
    assert_eq!(cart.cart_items[0].quantity, Decimal::from(5));
    assert_eq!(cart.total_spent, Decimal::from(6));
    Ok(())
}

#[tokio::test]
async fn adding_picks_the_requested_store_option() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let mut catalog = CatalogManager::new(db.clone());
    let carts = CartManager::new(db.clone());

    let item_id = catalog
        .add_item(&mut vault, util::draft("Honey", "Pantry", "Market", 450, "jar"))
        .await?;
    vault
        .find_item_mut(&item_id)
        .unwrap()
        .upsert_price_option("Farm Shop", Decimal::new(520, 2), "jar");
    db.persist_vault(&vault).await?;

    let cart_id = carts
        .create_cart(&mut vault, "Weekly", Decimal::from(20))
        .await?;
    carts
        .add_vault_item_to_cart(&mut vault, &cart_id, &item_id, Decimal::ONE, Some("farm shop"))
        .await?;

    let row = vault
        .find_cart(&cart_id)
        .unwrap()
        .find_cart_item(&item_id)
        .unwrap();
    assert_eq!(row.planned_store.as_deref(), Some("Farm Shop"));
    assert_eq!(row.planned_price, Some(Decimal::new(520, 2)));

    let err = carts
        .add_vault_item_to_cart(&mut vault, &cart_id, "missing", Decimal::ONE, None)
        .await
        .expect_err("unknown item");
    assert_eq!(err.code(), "ITEM/NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn items_added_mid_trip_carry_actuals_from_the_start() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let mut catalog = CatalogManager::new(db.clone());
    let carts = CartManager::new(db.clone());

    let item_id = catalog
        .add_item(&mut vault, util::draft("Tea", "Drinks", "Market", 280, "box"))
        .await?;
    let cart_id = carts
        .create_cart(&mut vault, "Trip", Decimal::from(10))
        .await?;
    carts.start_shopping(&mut vault, &cart_id).await?;
    carts
        .add_vault_item_to_cart(&mut vault, &cart_id, &item_id, Decimal::ONE, None)
        .await?;

    let row = vault
        .find_cart(&cart_id)
        .unwrap()
        .find_cart_item(&item_id)
        .unwrap();
    assert!(row.added_during_shopping);
    assert_eq!(row.actual_price, Some(Decimal::new(280, 2)));
    assert_eq!(row.actual_store.as_deref(), Some("Market"));
    Ok(())
}

#[tokio::test]
async fn shopping_only_items_live_and_die_with_the_trip() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let carts = CartManager::new(db.clone());

    let cart_id = carts
        .create_cart(&mut vault, "Trip", Decimal::from(10))
        .await?;
    carts.start_shopping(&mut vault, &cart_id).await?;

    let err = carts
        .add_shopping_only_item(
            &mut vault,
            &cart_id,
            ShoppingOnlyDraft {
                name: "  ".to_string(),
                store: None,
                price: None,
                unit: None,
                category: None,
                quantity: Decimal::ONE,
            },
        )
        .await
        .expect_err("empty name");
    assert_eq!(err.code(), "VALIDATION/EMPTY_NAME");

    let local_id = carts
        .add_shopping_only_item(
            &mut vault,
            &cart_id,
            ShoppingOnlyDraft {
                name: "Charcoal".to_string(),
                store: Some("Garage".to_string()),
                price: Some(Decimal::new(650, 2)),
                unit: Some("bag".to_string()),
                category: None,
                quantity: Decimal::from(2),
            },
        )
        .await?;

    let cart = vault.find_cart(&cart_id).unwrap();
    let row = cart.find_cart_item(&local_id).unwrap();
    assert!(row.added_during_shopping);
    assert_eq!(row.planned_price, Some(Decimal::new(650, 2)));
    assert_eq!(cart.total_spent, Decimal::from(13));
    // Never registered in the catalog.
    assert!(vault.find_item(&local_id).is_none());

    // Removal during shopping deletes a shopping-only row outright.
    carts
        .remove_item_from_cart(&mut vault, &cart_id, &local_id)
        .await?;
    assert!(vault
        .find_cart(&cart_id)
        .unwrap()
        .find_cart_item(&local_id)
        .is_none());
    Ok(())
}

#[tokio::test]
async fn removal_semantics_follow_cart_status() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let mut catalog = CatalogManager::new(db.clone());
    let carts = CartManager::new(db.clone());

    let item_id = catalog
        .add_item(&mut vault, util::draft("Soap", "Household", "Market", 199, "bar"))
        .await?;
    let cart_id = carts
        .create_cart(&mut vault, "Weekly", Decimal::from(10))
        .await?;
    carts
        .add_vault_item_to_cart(&mut vault, &cart_id, &item_id, Decimal::ONE, None)
        .await?;

    // Planning removal is a hard removal.
    carts
        .remove_item_from_cart(&mut vault, &cart_id, &item_id)
        .await?;
    assert!(vault.find_cart(&cart_id).unwrap().cart_items.is_empty());
    let err = carts
        .remove_item_from_cart(&mut vault, &cart_id, &item_id)
        .await
        .expect_err("already gone");
    assert_eq!(err.code(), "CART_ITEM/NOT_FOUND");

    // Shopping removal of a catalog-backed row is a reversible skip.
    carts
        .add_vault_item_to_cart(&mut vault, &cart_id, &item_id, Decimal::ONE, None)
        .await?;
    carts.start_shopping(&mut vault, &cart_id).await?;
    carts
        .remove_item_from_cart(&mut vault, &cart_id, &item_id)
        .await?;
    let row = vault
        .find_cart(&cart_id)
        .unwrap()
        .find_cart_item(&item_id)
        .expect("row kept, flagged");
    assert!(row.is_skipped_during_shopping);
    assert!(!row.is_fulfilled);
    assert_eq!(vault.find_cart(&cart_id).unwrap().total_spent, Decimal::ZERO);

    // Fulfilling again clears the skip flag.
    carts.toggle_fulfillment(&mut vault, &cart_id, &item_id).await?;
    let row = vault
        .find_cart(&cart_id)
        .unwrap()
        .find_cart_item(&item_id)
        .unwrap();
    assert!(row.is_fulfilled && !row.is_skipped_during_shopping);

    carts.complete_shopping(&mut vault, &cart_id).await?;
    let err = carts
        .remove_item_from_cart(&mut vault, &cart_id, &item_id)
        .await
        .expect_err("completed carts are frozen");
    assert_eq!(err.code(), "CART/INVALID_STATE");
    Ok(())
}

#[tokio::test]
async fn toggle_fulfillment_only_works_while_shopping() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let mut catalog = CatalogManager::new(db.clone());
    let carts = CartManager::new(db.clone());

    let item_id = catalog
        .add_item(&mut vault, util::draft("Foil", "Household", "Market", 250, "roll"))
        .await?;
    let cart_id = carts
        .create_cart(&mut vault, "Weekly", Decimal::from(10))
        .await?;
    carts
        .add_vault_item_to_cart(&mut vault, &cart_id, &item_id, Decimal::ONE, None)
        .await?;

    let err = carts
        .toggle_fulfillment(&mut vault, &cart_id, &item_id)
        .await
        .expect_err("planning carts have no fulfillment");
    assert_eq!(err.code(), "CART/INVALID_STATE");

    carts.start_shopping(&mut vault, &cart_id).await?;
    carts.toggle_fulfillment(&mut vault, &cart_id, &item_id).await?;
    assert!(vault
        .find_cart(&cart_id)
        .unwrap()
        .find_cart_item(&item_id)
        .unwrap()
        .is_fulfilled);
    carts.toggle_fulfillment(&mut vault, &cart_id, &item_id).await?;
    assert!(!vault
        .find_cart(&cart_id)
        .unwrap()
        .find_cart_item(&item_id)
        .unwrap()
        .is_fulfilled);

    let err = carts
        .toggle_fulfillment(&mut vault, &cart_id, "missing")
        .await
        .expect_err("unknown row");
    assert_eq!(err.code(), "CART_ITEM/NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn changing_store_rewrites_the_snapshot_for_the_current_phase() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let mut catalog = CatalogManager::new(db.clone());
    let carts = CartManager::new(db.clone());

    let item_id = catalog
        .add_item(&mut vault, util::draft("Olives", "Pantry", "Market", 300, "jar"))
        .await?;
    vault
        .find_item_mut(&item_id)
        .unwrap()
        .upsert_price_option("Deli", Decimal::new(425, 2), "jar");
    db.persist_vault(&vault).await?;

    let cart_id = carts
        .create_cart(&mut vault, "Weekly", Decimal::from(20))
        .await?;
    carts
        .add_vault_item_to_cart(&mut vault, &cart_id, &item_id, Decimal::from(2), None)
        .await?;

    carts
        .change_cart_item_store(&mut vault, &cart_id, &item_id, "Deli")
        .await?;
    let cart = vault.find_cart(&cart_id).unwrap();
    let row = cart.find_cart_item(&item_id).unwrap();
    assert_eq!(row.planned_store.as_deref(), Some("Deli"));
    assert_eq!(row.planned_price, Some(Decimal::new(425, 2)));
    assert_eq!(cart.total_spent, Decimal::new(850, 2));

    carts.start_shopping(&mut vault, &cart_id).await?;
    carts
        .change_cart_item_store(&mut vault, &cart_id, &item_id, "Market")
        .await?;
    let row = vault
        .find_cart(&cart_id)
        .unwrap()
        .find_cart_item(&item_id)
        .unwrap();
    assert_eq!(row.actual_store.as_deref(), Some("Market"));
    assert_eq!(row.actual_price, Some(Decimal::from(3)));
    assert!(row.was_edited_during_shopping);
    // The planned snapshot from the trip start is untouched.
    assert_eq!(row.planned_store.as_deref(), Some("Deli"));

    // A store the catalog has no price for leaves the price unknown.
    carts
        .change_cart_item_store(&mut vault, &cart_id, &item_id, "Corner Shop")
        .await?;
    let row = vault
        .find_cart(&cart_id)
        .unwrap()
        .find_cart_item(&item_id)
        .unwrap();
    assert_eq!(row.actual_store.as_deref(), Some("Corner Shop"));
    assert!(row.actual_price.is_none());
    Ok(())
}
