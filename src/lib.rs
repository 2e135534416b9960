pub mod backup;
pub mod cart;
pub mod catalog;
pub mod db;
pub mod error;
pub mod id;
pub mod logging;
pub mod model;
pub mod time;

pub use cart::{CartManager, ShoppingOnlyDraft};
pub use catalog::{CatalogManager, ItemDraft, ItemView};
pub use db::VaultDb;
pub use error::{AppError, AppResult};
