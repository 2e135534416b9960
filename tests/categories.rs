use anyhow::Result;
use trolley_lib::catalog::reconcile::{reconcile_default_categories, DEFAULT_CATEGORIES};
use trolley_lib::model::Category;
use trolley_lib::CatalogManager;

#[path = "util.rs"]
mod util;

#[tokio::test]
async fn fresh_vault_is_seeded_with_default_categories() -> Result<()> {
    let db = util::memory_db().await;
    let vault = util::seeded_vault(&db).await;

    assert_eq!(vault.categories.len(), DEFAULT_CATEGORIES.len());
    for (idx, (name, _)) in DEFAULT_CATEGORIES.iter().enumerate() {
        assert_eq!(vault.categories[idx].name, *name);
        assert_eq!(vault.categories[idx].sort_order, idx as i64);
    }

    // The seeded vault survives a reload and needs no further changes.
    let mut reloaded = db.load_or_create("default").await?;
    assert!(!reconcile_default_categories(&mut reloaded));
    Ok(())
}

#[tokio::test]
async fn custom_categories_follow_the_default_block() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;
    let mut catalog = CatalogManager::new(db.clone());

    catalog
        .add_item(&mut vault, util::draft("Dog food", "Pets", "Market", 1299, "kg"))
        .await?;
    catalog
        .add_item(&mut vault, util::draft("Nappies", "Baby", "Market", 899, "pack"))
        .await?;

    let default_len = DEFAULT_CATEGORIES.len() as i64;
    let pets = vault.find_category("Pets").expect("Pets created");
    let baby = vault.find_category("Baby").expect("Baby created");
    assert_eq!(pets.sort_order, default_len);
    assert_eq!(baby.sort_order, default_len + 1);

    // Reconciliation keeps creation order for custom categories.
    assert!(!reconcile_default_categories(&mut vault));
    Ok(())
}

#[tokio::test]
async fn misformatted_default_names_are_normalised() -> Result<()> {
    let db = util::memory_db().await;
    let mut vault = util::seeded_vault(&db).await;

    // Simulate an older store where a default drifted in case and position.
    let dairy = vault.find_category_mut("Dairy").expect("dairy seeded");
    dairy.name = " dairy ".to_string();
    dairy.sort_order = 42;
    vault.categories.push(Category::new("Snacks", 3));

    assert!(reconcile_default_categories(&mut vault));
    let dairy = vault.find_category("Dairy").expect("dairy normalised");
    assert_eq!(dairy.name, "Dairy");
    assert_eq!(dairy.sort_order, 1);

    let snacks = vault.find_category("Snacks").expect("custom kept");
    assert_eq!(snacks.sort_order, DEFAULT_CATEGORIES.len() as i64);

    // Categories are listed in sort order afterwards.
    assert!(vault
        .categories
        .windows(2)
        .all(|w| w[0].sort_order <= w[1].sort_order));
    Ok(())
}
