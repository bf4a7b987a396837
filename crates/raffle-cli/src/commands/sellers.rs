//! Sellers command - Manage seller accounts
//!
//! Superuser only. Sellers are listed alphabetically with their holdings; a
//! seller who still owns sales or reservations cannot be deleted.

use anyhow::{Context, Result};
use clap::Subcommand;
use raffle_core::domain::{Identity, UserId};

use super::context::{Desk, GlobalOptions};
use super::display_time;

/// Seller account subcommands
#[derive(Debug, Subcommand)]
pub enum SellersCommand {
    /// List sellers with their sold and reserved counts
    List,
    /// Create a seller account
    Add {
        /// Username for the new seller
        username: String,
        /// Initial password, at least six characters
        #[arg(long, env = "RAFFLE_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
    },
    /// Delete a seller that holds no numbers
    Delete {
        /// Username of the seller to delete
        username: String,
    },
}

impl SellersCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let desk = Desk::open(options).await?;
        let me = desk.login(options).await?;

        let result = match self {
            SellersCommand::List => list(&desk, &me, options).await,
            SellersCommand::Add {
                username,
                new_password,
            } => add(&desk, &me, username, new_password, options).await,
            SellersCommand::Delete { username } => delete(&desk, &me, username, options).await,
        };

        desk.close().await;
        result
    }
}

async fn list(desk: &Desk, me: &Identity, options: &GlobalOptions) -> Result<()> {
    let formatter = options.formatter();
    let sellers = desk.desk.accounts.list_sellers(me).await?;

    if options.format.is_json() {
        formatter.print_json(&serde_json::to_value(&sellers)?);
        return Ok(());
    }

    if sellers.is_empty() {
        formatter.info("No sellers yet. Add one with 'raffle sellers add <username>'.");
        return Ok(());
    }

    formatter.success(&format!("{} seller(s)", sellers.len()));
    formatter.info("");
    let rows: Vec<Vec<String>> = sellers
        .iter()
        .map(|seller| {
            vec![
                seller.username.to_string(),
                seller.sold_count.to_string(),
                seller.reserved_count.to_string(),
                display_time(seller.created_at),
            ]
        })
        .collect();
    formatter.table(
        &[("Username", 20), ("Sold", 6), ("Reserved", 9), ("Created", 19)],
        &rows,
    );
    Ok(())
}

async fn add(
    desk: &Desk,
    me: &Identity,
    username: &str,
    password: &str,
    options: &GlobalOptions,
) -> Result<()> {
    let formatter = options.formatter();
    let user = desk.desk.accounts.create_seller(me, username, password).await?;

    if options.format.is_json() {
        formatter.print_json(&serde_json::json!({ "success": true, "seller": user }));
    } else {
        formatter.success(&format!("Seller '{}' created.", user.username));
    }
    Ok(())
}

async fn delete(
    desk: &Desk,
    me: &Identity,
    username: &str,
    options: &GlobalOptions,
) -> Result<()> {
    let formatter = options.formatter();
    let seller_id = resolve(desk, me, username).await?;
    let user = desk.desk.accounts.delete_seller(me, seller_id).await?;

    if options.format.is_json() {
        formatter.print_json(&serde_json::json!({ "success": true, "deleted": user }));
    } else {
        formatter.success(&format!("Seller '{}' deleted.", user.username));
    }
    Ok(())
}

/// Look a seller up by username through the seller listing
async fn resolve(desk: &Desk, me: &Identity, username: &str) -> Result<UserId> {
    let wanted = username.trim();
    let sellers = desk.desk.accounts.list_sellers(me).await?;
    sellers
        .iter()
        .find(|s| s.username.as_str() == wanted)
        .map(|s| s.id)
        .with_context(|| format!("No seller named '{}'", wanted))
}
