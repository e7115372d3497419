use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use crate::config::{Config, CONFIG_FILE_NAME};

use super::resolve_workspace_dir;

/// Load a workspace's config file and print the effective settings.
#[derive(Debug, Parser)]
pub struct CheckConfigCommand {
    /// Workspace directory. Defaults to the current directory.
    pub dir: Option<PathBuf>,
}

impl CheckConfigCommand {
    pub fn run(self) -> anyhow::Result<()> {
        let dir = resolve_workspace_dir(self.dir.as_deref());
        let config = Config::load_from_dir(&dir)
            .with_context(|| format!("Could not load {}", dir.join(CONFIG_FILE_NAME).display()))?;

        println!("{}", serde_json::to_string_pretty(&config)?);
        Ok(())
    }
}
