//! Export command - Download all sales as CSV
//!
//! Writes `number,buyer_name` rows, ascending by number, to stdout or to the
//! file given with `--output`.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::context::{Desk, GlobalOptions};

/// Export every sale as CSV
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Write to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl ExportCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let desk = Desk::open(options).await?;
        let me = desk.login(options).await?;

        let export = desk.desk.reporting.export_sales(&me).await?;
        desk.close().await;

        match &self.output {
            Some(path) => {
                std::fs::write(path, export.body.as_bytes())
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), rows = export.rows, "Wrote sales export");

                if options.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": true,
                        "path": path.display().to_string(),
                        "rows": export.rows,
                        "content_type": export.content_type,
                    }));
                } else {
                    formatter.success(&format!(
                        "Exported {} sale(s) to {}",
                        export.rows,
                        path.display()
                    ));
                }
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout
                    .write_all(export.body.as_bytes())
                    .context("Failed to write export")?;
                stdout.flush().context("Failed to write export")?;
            }
        }

        Ok(())
    }
}
