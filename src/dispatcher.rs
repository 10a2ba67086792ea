//! Agent dispatcher: one agent process per principal message.
//!
//! Dispatch never waits. Handles are kept in an unordered list and reconciled
//! once per tick; an agent may run as long as it likes.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::agent::{AgentCommand, Launcher, Task};
use crate::config::Config;
use crate::message::Delivery;
use crate::template::{PromptContext, PromptTemplate};

/// An agent whose exit was observed during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub channel: String,
    pub ts: String,
    pub pid: Option<u32>,
    /// `None` when the exit could not be observed (wait failed).
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

struct Tracked {
    channel: String,
    ts: String,
    started: Instant,
    task: Box<dyn Task>,
}

pub struct Dispatcher {
    launcher: Box<dyn Launcher>,
    template: PromptTemplate,
    workdir: PathBuf,
    instruction_files: Vec<String>,
    active: Vec<Tracked>,
}

impl Dispatcher {
    pub fn new(
        launcher: Box<dyn Launcher>,
        template: PromptTemplate,
        workdir: PathBuf,
        instruction_files: Vec<String>,
    ) -> Self {
        Self {
            launcher,
            template,
            workdir,
            instruction_files,
            active: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            Box::new(AgentCommand::from_config(config)),
            PromptTemplate::from_config(config)?,
            config.workdir(),
            config.agent.instruction_files.clone(),
        ))
    }

    pub fn prompt_for(&self, delivery: &Delivery) -> anyhow::Result<String> {
        let ctx = PromptContext::new(delivery, &self.workdir, &self.instruction_files);
        self.template.render(&ctx)
    }

    /// Render the prompt and start an agent for it. On error nothing is
    /// tracked and the caller decides what to log.
    pub fn dispatch(&mut self, delivery: &Delivery) -> anyhow::Result<()> {
        let prompt = self.prompt_for(delivery)?;
        let task = self.launcher.launch(&prompt)?;
        tracing::info!(
            channel = %delivery.channel.label,
            ts = %delivery.message.ts,
            pid = task.pid(),
            "agent started"
        );
        self.active.push(Tracked {
            channel: delivery.channel.label.clone(),
            ts: delivery.message.ts.clone(),
            started: Instant::now(),
            task,
        });
        Ok(())
    }

    /// Drop every handle whose process has exited, keep the rest.
    pub fn reconcile(&mut self) -> Vec<Finished> {
        let mut finished = Vec::new();
        let mut running = Vec::with_capacity(self.active.len());

        for mut tracked in self.active.drain(..) {
            let exit_code = match tracked.task.poll_exit() {
                Ok(None) => {
                    running.push(tracked);
                    continue;
                }
                Ok(Some(code)) => Some(code),
                Err(e) => {
                    tracing::warn!(
                        channel = %tracked.channel,
                        ts = %tracked.ts,
                        error = %e,
                        "could not check agent status; dropping handle"
                    );
                    None
                }
            };
            let done = Finished {
                channel: tracked.channel,
                ts: tracked.ts,
                pid: tracked.task.pid(),
                exit_code,
                elapsed: tracked.started.elapsed(),
            };
            match done.exit_code {
                Some(0) => tracing::info!(
                    channel = %done.channel,
                    ts = %done.ts,
                    pid = done.pid,
                    elapsed_secs = done.elapsed.as_secs(),
                    "agent finished"
                ),
                code => tracing::warn!(
                    channel = %done.channel,
                    ts = %done.ts,
                    pid = done.pid,
                    exit_code = code,
                    elapsed_secs = done.elapsed.as_secs(),
                    "agent exited with failure"
                ),
            }
            finished.push(done);
        }

        self.active = running;
        finished
    }

    /// Number of agents still being tracked.
    pub fn active(&self) -> usize {
        self.active.len()
    }
}
