//! Init command - Create the database and the first superuser
//!
//! Opening the desk applies migrations and bootstraps the superuser from the
//! `bootstrap` section when no superuser exists yet. Running it again is a
//! no-op.

use anyhow::Result;
use clap::Args;

use super::context::{Desk, GlobalOptions};

/// Create the database and bootstrap the superuser
#[derive(Debug, Args)]
pub struct InitCommand {}

impl InitCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let desk = Desk::open(options).await?;
        let path = desk.config.database.path.display().to_string();

        if options.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "database": path,
                "bootstrapped": desk.bootstrapped.as_ref().map(|u| u.username.to_string()),
            }));
        } else {
            formatter.success(&format!("Database ready at {}", path));
            match &desk.bootstrapped {
                Some(user) => formatter.info(&format!(
                    "Created superuser '{}'. Change the bootstrap password in the config file.",
                    user.username
                )),
                None => formatter.info("A superuser already exists."),
            }
        }

        desk.close().await;
        Ok(())
    }
}
