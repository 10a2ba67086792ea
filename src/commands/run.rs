use std::path::PathBuf;

use clap::Args;

use crate::config::{self, Config};
use crate::error::ExitError;
use crate::relay::Session;
use crate::slack::SlackClient;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Config file (default: ./boss-relay.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override the poll interval in seconds
    #[arg(long)]
    pub interval: Option<u64>,
}

impl RunArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let path = config::resolve_config_path(self.config.as_deref())?;
        let mut config = Config::load(&path)?;
        if let Some(interval) = self.interval {
            config.poll_interval_secs = interval;
            config.validate()?;
        }

        let token = config::slack_token()?;
        let workdir = config.workdir();
        if !workdir.is_dir() {
            return Err(ExitError::Config(format!(
                "workdir {} does not exist",
                workdir.display()
            ))
            .into());
        }

        tracing::info!(
            config = %path.display(),
            workdir = %workdir.display(),
            channels = config.channels.len(),
            agent = %config.agent.program,
            "starting boss-relay"
        );

        let client = SlackClient::new(&token, config.http_timeout());
        let mut session = Session::from_config(&config, client)?;

        register_interrupt_handler();
        session.run()
    }
}

/// Ctrl-C ends the process immediately. Nothing is checkpointed; the next
/// start re-seeds from current channel history. Running agents are left alone.
fn register_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| {
        tracing::info!("interrupted, exiting");
        std::process::exit(130);
    }) {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }
}
