use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

use crate::catalog::reconcile::reconcile_default_categories;
use crate::model::Vault;
use crate::time::now_ms;
use crate::{AppError, AppResult};

const STORE_OPEN_CODE: &str = "STORE/OPEN";
const STORE_LOAD_CODE: &str = "STORE/LOAD";
const STORE_DECODE_CODE: &str = "STORE/DECODE";
const STORE_PERSIST_CODE: &str = "STORE/PERSIST";

/// Transactional object store for the vault aggregate.
///
/// The whole aggregate is committed as one serialized document so a failed
/// commit can never leave a partially-applied mutation on disk. In-memory
/// state is deliberately kept on failure; callers decide to retry or discard.
#[derive(Debug, Clone)]
pub struct VaultDb {
    pool: SqlitePool,
}

impl VaultDb {
    pub async fn open(path: &Path) -> AppResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|err| {
                AppError::new(STORE_OPEN_CODE, "Failed to open vault store")
                    .with_context("path", path.display().to_string())
                    .with_cause(AppError::from(err))
            })?;
        let db = VaultDb { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// In-memory store for tests and scratch sessions. A single connection
    /// is required: every sqlite `:memory:` connection is its own database.
    pub async fn open_memory() -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|err| {
                AppError::new(STORE_OPEN_CODE, "Failed to open in-memory vault store")
                    .with_cause(AppError::from(err))
            })?;
        let db = VaultDb { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vaults (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|err| {
            AppError::new(STORE_OPEN_CODE, "Failed to initialise vault schema")
                .with_cause(AppError::from(err))
        })?;
        Ok(())
    }

    pub async fn load_vault(&self, vault_id: &str) -> AppResult<Option<Vault>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM vaults WHERE id = ?1")
            .bind(vault_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| {
                AppError::new(STORE_LOAD_CODE, "Failed to load vault")
                    .with_context("vault_id", vault_id.to_string())
                    .with_cause(AppError::from(err))
            })?;

        match row {
            Some((data,)) => {
                let vault: Vault = serde_json::from_str(&data).map_err(|err| {
                    AppError::new(STORE_DECODE_CODE, "Stored vault document is not readable")
                        .with_context("vault_id", vault_id.to_string())
                        .with_cause(AppError::from(err))
                })?;
                Ok(Some(vault))
            }
            None => Ok(None),
        }
    }

    /// Loads the vault, creating and seeding it on first use. Default
    /// categories are reconciled on every load; the result is persisted only
    /// when reconciliation actually changed something.
    pub async fn load_or_create(&self, vault_id: &str) -> AppResult<Vault> {
        match self.load_vault(vault_id).await? {
            Some(mut vault) => {
                if reconcile_default_categories(&mut vault) {
                    debug!(vault_id, "default categories reconciled on load");
                    self.persist_vault(&vault).await?;
                }
                Ok(vault)
            }
            None => {
                let mut vault = Vault::new(vault_id);
                reconcile_default_categories(&mut vault);
                self.persist_vault(&vault).await?;
                Ok(vault)
            }
        }
    }

    /// Commits the whole aggregate in one transaction.
    pub async fn persist_vault(&self, vault: &Vault) -> AppResult<()> {
        let data = serde_json::to_string(vault).map_err(|err| {
            AppError::new(STORE_PERSIST_CODE, "Failed to encode vault document")
                .with_context("vault_id", vault.id.clone())
                .with_cause(AppError::from(err))
        })?;

        let mut tx = self.pool.begin().await.map_err(|err| {
            AppError::new(STORE_PERSIST_CODE, "Failed to begin vault transaction")
                .with_context("vault_id", vault.id.clone())
                .with_cause(AppError::from(err))
        })?;

        sqlx::query(
            "INSERT INTO vaults (id, data, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(&vault.id)
        .bind(&data)
        .bind(now_ms())
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            AppError::new(STORE_PERSIST_CODE, "Failed to write vault document")
                .with_context("vault_id", vault.id.clone())
                .with_cause(AppError::from(err))
        })?;

        tx.commit().await.map_err(|err| {
            AppError::new(STORE_PERSIST_CODE, "Failed to commit vault transaction")
                .with_context("vault_id", vault.id.clone())
                .with_cause(AppError::from(err))
        })?;

        Ok(())
    }
}
