use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use trolley_lib::backup::{export_vault, restore_backup, VaultBackup};
use trolley_lib::{logging, VaultDb};

#[derive(Parser)]
#[command(name = "trolley", about = "Personal shopping-budget vault", version)]
struct Cli {
    /// Path to the vault store.
    #[arg(long, default_value = "trolley.db")]
    db: PathBuf,

    /// Vault to operate on.
    #[arg(long, default_value = "default")]
    vault: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the store and seed the default categories.
    Init,
    /// List catalog items grouped by category.
    Items,
    /// List carts with status, spend and fulfillment.
    Carts,
    /// Write a backup document to a file.
    Export {
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        include_carts: bool,
    },
    /// Merge a backup document into the vault.
    Import {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        include_carts: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let db = VaultDb::open(&cli.db).await?;
    let mut vault = db.load_or_create(&cli.vault).await?;

    match cli.command {
        Command::Init => {
            println!(
                "vault '{}' ready: {} categories, {} items, {} carts",
                vault.id,
                vault.categories.len(),
                vault
                    .categories
                    .iter()
                    .map(|c| c.items.len())
                    .sum::<usize>(),
                vault.carts.len()
            );
        }
        Command::Items => {
            for category in &vault.categories {
                if category.items.is_empty() {
                    continue;
                }
                println!("{} ({})", category.name, category.items.len());
                for item in &category.items {
                    let prices: Vec<String> = item
                        .price_options
                        .iter()
                        .map(|p| format!("{} @ {}/{}", p.store, p.price, p.unit))
                        .collect();
                    println!("  {}  [{}]", item.name, prices.join(", "));
                }
            }
        }
        Command::Carts => {
            for cart in &vault.carts {
                let when = cart
                    .completed_at
                    .or(cart.started_at)
                    .unwrap_or(cart.created_at);
                println!(
                    "{}  {}  spent {} of {}  fulfillment {:.0}%  {}",
                    cart.name,
                    cart.status.as_str(),
                    cart.total_spent,
                    cart.budget,
                    cart.fulfillment_status * 100.0,
                    trolley_lib::time::to_date(when).format("%Y-%m-%d")
                );
            }
            for cart in &vault.deleted_carts {
                println!("{}  (in trash)", cart.name);
            }
        }
        Command::Export {
            output,
            include_carts,
        } => {
            let backup = export_vault(&vault, include_carts);
            let data = serde_json::to_string_pretty(&backup)?;
            fs::write(&output, data)
                .with_context(|| format!("write backup to {}", output.display()))?;
            println!(
                "exported {} items, {} carts to {}",
                backup.items.len(),
                backup.carts.len(),
                output.display()
            );
        }
        Command::Import {
            input,
            include_carts,
        } => {
            let data = fs::read_to_string(&input)
                .with_context(|| format!("read backup from {}", input.display()))?;
            let backup: VaultBackup = serde_json::from_str(&data)
                .with_context(|| format!("parse backup {}", input.display()))?;
            let report = restore_backup(&db, &mut vault, &backup, include_carts).await?;
            println!(
                "merged: {} items added, {} merged, {} carts added, {} skipped, {} rows recovered",
                report.items_added,
                report.items_merged,
                report.carts_added,
                report.carts_skipped,
                report.cart_items_recovered
            );
        }
    }

    Ok(())
}
