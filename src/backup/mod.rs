//! Point-in-time backup of the catalog and carts, and the merge-based
//! reconciler that imports one into a live vault without duplicating
//! entries or dropping orphaned references.

pub mod document;
pub mod export;
pub mod restore;

pub use document::{BackupCart, BackupItem, CartItemRecord, VaultBackup, BACKUP_VERSION};
pub use export::export_vault;
pub use restore::{restore_backup, RestoreReport};
