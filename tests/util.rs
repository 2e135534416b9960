#![allow(dead_code)]

use rust_decimal::Decimal;
use trolley_lib::model::Vault;
use trolley_lib::{ItemDraft, VaultDb};

pub async fn memory_db() -> VaultDb {
    VaultDb::open_memory().await.expect("open in-memory store")
}

pub async fn seeded_vault(db: &VaultDb) -> Vault {
    db.load_or_create("default").await.expect("seed vault")
}

/// Item draft with the price given in cents.
pub fn draft(name: &str, category: &str, store: &str, price_cents: i64, unit: &str) -> ItemDraft {
    ItemDraft {
        name: name.to_string(),
        category: category.to_string(),
        store: store.to_string(),
        price: Decimal::new(price_cents, 2),
        unit: unit.to_string(),
    }
}
