use std::path::Path;

use dialoguer::Confirm;
use snomed_clusters::{Config, storage::CONFIG_FILE};
use tracing::instrument;

#[derive(Debug, clap::Parser)]
pub struct Init {
    /// Overwrite an existing clusters.toml without asking
    #[arg(long)]
    force: bool,
}

impl Init {
    #[instrument]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let config_path = root.join(CONFIG_FILE);

        if config_path.exists() && !self.force {
            let overwrite = Confirm::new()
                .with_prompt(format!("{} already exists. Overwrite?", config_path.display()))
                .default(false)
                .interact()?;
            if !overwrite {
                anyhow::bail!("Project already initialized (found existing {CONFIG_FILE})");
            }
        }

        Config::example()
            .save(&config_path)
            .map_err(|e| anyhow::anyhow!("Failed to create {CONFIG_FILE}: {e}"))?;

        println!("Initialized cluster project in {}", root.display());
        println!("  Created: {CONFIG_FILE}");
        println!();
        println!("Next steps:");
        println!("  Place the closure and history tables next to {CONFIG_FILE}");
        println!("  clusters check  # Audit the history table");
        println!("  clusters build");

        Ok(())
    }
}
