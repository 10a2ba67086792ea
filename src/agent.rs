//! Launching agent processes.
//!
//! A [`Launcher`] turns a prompt into a running [`Task`]; the dispatcher only
//! ever polls tasks for their exit code.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::subprocess::{Running, Tool};

/// Something started in the background that eventually exits.
pub trait Task {
    fn pid(&self) -> Option<u32>;

    /// Non-blocking. `Ok(Some(code))` once the task has exited.
    fn poll_exit(&mut self) -> std::io::Result<Option<i32>>;
}

impl Task for Running {
    fn pid(&self) -> Option<u32> {
        Some(self.id())
    }

    fn poll_exit(&mut self) -> std::io::Result<Option<i32>> {
        self.try_exit()
    }
}

pub trait Launcher {
    /// Start an agent for `prompt` without waiting for it.
    fn launch(&self, prompt: &str) -> anyhow::Result<Box<dyn Task>>;
}

/// The configured agent executable.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    program: String,
    args: Vec<String>,
    model: Option<String>,
    skip_permissions: bool,
    workdir: PathBuf,
}

impl AgentCommand {
    pub fn from_config(config: &Config) -> Self {
        Self {
            program: config.agent.program.clone(),
            args: config.agent.args.clone(),
            model: config.agent.model.clone(),
            skip_permissions: config.agent.skip_permissions,
            workdir: config.workdir(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Full invocation: configured args, model, permission flag, then `-p <prompt>`.
    pub fn tool(&self, prompt: &str) -> Tool {
        let mut tool = Tool::new(&self.program)
            .args(self.args.as_slice())
            .current_dir(&self.workdir);
        if let Some(ref model) = self.model {
            tool = tool.arg("--model").arg(model);
        }
        if self.skip_permissions {
            tool = tool.arg("--dangerously-skip-permissions");
        }
        tool.arg("-p").arg(prompt)
    }
}

impl Launcher for AgentCommand {
    fn launch(&self, prompt: &str) -> anyhow::Result<Box<dyn Task>> {
        // A missing cwd surfaces as ENOENT from spawn, which would read as
        // "tool not found".
        if !self.workdir.is_dir() {
            anyhow::bail!("working directory {} does not exist", self.workdir.display());
        }
        let running = self.tool(prompt).spawn()?;
        Ok(Box::new(running))
    }
}
