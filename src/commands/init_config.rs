use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use crate::config::{CONFIG_TOML, Config};
use crate::error::ExitError;

#[derive(Debug, Args)]
pub struct InitConfigArgs {
    /// Where to write the config
    #[arg(short, long, default_value = CONFIG_TOML)]
    pub output: PathBuf,
    /// Working directory for agents (default: current directory)
    #[arg(long)]
    pub workdir: Option<PathBuf>,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

impl InitConfigArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        if self.output.exists() && !self.force {
            return Err(ExitError::Config(format!(
                "{} already exists (use --force to overwrite)",
                self.output.display()
            ))
            .into());
        }

        let workdir = match self.workdir.clone() {
            Some(dir) => dir,
            None => std::env::current_dir().context("determining current directory")?,
        };

        let text = Config::starter(&workdir).to_toml()?;
        std::fs::write(&self.output, text)
            .with_context(|| format!("writing {}", self.output.display()))?;

        tracing::info!(path = %self.output.display(), "wrote starter config");
        println!(
            "Wrote {}. Fill in [channels] and export SLACK_BOT_TOKEN, then run `boss-relay doctor`.",
            self.output.display()
        );
        Ok(())
    }
}
