use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ExitError;
use crate::message::Channel;

/// Config file name constants.
pub const CONFIG_TOML: &str = "boss-relay.toml";
pub const CONFIG_JSON: &str = "boss-relay.json";

/// Environment variable holding the Slack bot token.
pub const TOKEN_ENV: &str = "SLACK_BOT_TOKEN";

/// Find the config file path, preferring boss-relay.toml over boss-relay.json.
/// Returns None if neither exists.
pub fn find_config(dir: &Path) -> Option<PathBuf> {
    let toml_path = dir.join(CONFIG_TOML);
    if toml_path.exists() {
        return Some(toml_path);
    }
    let json_path = dir.join(CONFIG_JSON);
    if json_path.exists() {
        return Some(json_path);
    }
    None
}

/// Resolve the config path: an explicit `--config` wins, otherwise look in the
/// current directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("determining current directory")?;
    find_config(&cwd).ok_or_else(|| {
        ExitError::Config(format!(
            "no {CONFIG_TOML} or {CONFIG_JSON} found in {} (run `boss-relay init-config`)",
            cwd.display()
        ))
        .into()
    })
}

/// Top-level boss-relay.toml config.
///
/// Everything is read once at startup; there is no reload.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Working directory for agent processes and base for instruction files.
    pub workdir: PathBuf,
    #[serde(default = "default_poll_interval", alias = "pollIntervalSecs")]
    pub poll_interval_secs: u64,
    /// Messages fetched per channel on each tick.
    #[serde(default = "default_history_limit", alias = "historyLimit")]
    pub history_limit: u32,
    /// Messages fetched per channel when seeding the seen-set at startup.
    #[serde(default = "default_seed_limit", alias = "seedLimit")]
    pub seed_limit: u32,
    #[serde(default = "default_http_timeout", alias = "httpTimeoutSecs")]
    pub http_timeout_secs: u64,
    /// Posted to every channel once seeding is done.
    #[serde(default, alias = "startupMessage", skip_serializing_if = "Option::is_none")]
    pub startup_message: Option<String>,
    /// Channel label -> Slack channel ID.
    pub channels: BTreeMap<String, String>,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Extra arguments placed before the prompt.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Pass `--dangerously-skip-permissions` (the agent runs unattended).
    #[serde(default, alias = "skipPermissions")]
    pub skip_permissions: bool,
    /// Custom minijinja prompt template; relative paths resolve against `workdir`.
    #[serde(default, alias = "promptTemplate", skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<PathBuf>,
    /// Files the agent is told to read first, relative to `workdir`.
    #[serde(default = "default_instruction_files", alias = "instructionFiles")]
    pub instruction_files: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            model: None,
            skip_permissions: false,
            prompt_template: None,
            instruction_files: default_instruction_files(),
        }
    }
}

/// Optional narrowing of which principal messages get dispatched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FilterConfig {
    /// Only dispatch messages authored by this Slack user ID.
    #[serde(default, alias = "principalUser", skip_serializing_if = "Option::is_none")]
    pub principal_user: Option<String>,
    /// Only dispatch messages starting with this prefix; the prefix is stripped.
    #[serde(default, alias = "commandPrefix", skip_serializing_if = "Option::is_none")]
    pub command_prefix: Option<String>,
}

// Default value functions for serde
const fn default_poll_interval() -> u64 { 5 }
const fn default_history_limit() -> u32 { 5 }
const fn default_seed_limit() -> u32 { 100 }
const fn default_http_timeout() -> u64 { 10 }
fn default_program() -> String { "claude".into() }
fn default_instruction_files() -> Vec<String> { vec!["CLAUDE.md".into()] }

const MAX_HISTORY_LIMIT: u32 = 100;
const MAX_SEED_LIMIT: u32 = 1000;

impl Config {
    /// Load config from a file (TOML or JSON, auto-detected by extension) and
    /// validate it.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ExitError::Config(format!("reading {}: {e}", path.display())))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config = match ext {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => Self::parse_toml(&contents).or_else(|_| Self::parse_json(&contents))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse config from a TOML string.
    pub fn parse_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| ExitError::Config(format!("invalid {CONFIG_TOML}: {e}")).into())
    }

    /// Parse config from a JSON string.
    pub fn parse_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ExitError::Config(format!("invalid {CONFIG_JSON}: {e}")).into())
    }

    /// Check the invariants the relay relies on.
    pub fn validate(&self) -> Result<(), ExitError> {
        if self.channels.is_empty() {
            return Err(ExitError::Config("at least one channel is required".into()));
        }
        if let Some((label, _)) = self.channels.iter().find(|(_, id)| id.trim().is_empty()) {
            return Err(ExitError::Config(format!("channel {label:?} has an empty ID")));
        }
        if self.poll_interval_secs == 0 {
            return Err(ExitError::Config("poll_interval_secs must be at least 1".into()));
        }
        if !(1..=MAX_HISTORY_LIMIT).contains(&self.history_limit) {
            return Err(ExitError::Config(format!(
                "history_limit must be between 1 and {MAX_HISTORY_LIMIT}"
            )));
        }
        if !(1..=MAX_SEED_LIMIT).contains(&self.seed_limit) {
            return Err(ExitError::Config(format!(
                "seed_limit must be between 1 and {MAX_SEED_LIMIT}"
            )));
        }
        if self.agent.program.trim().is_empty() {
            return Err(ExitError::Config("agent.program must not be empty".into()));
        }
        Ok(())
    }

    /// Serialize config to a TOML string with helpful comments.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        fn set_table_comment(doc: &mut toml_edit::DocumentMut, key: &str, comment: &str) {
            if let Some(tbl) = doc.get_mut(key).and_then(toml_edit::Item::as_table_mut) {
                tbl.decor_mut().set_prefix(comment);
            }
        }

        let raw = toml::to_string_pretty(self).context("serializing config to TOML")?;

        let mut doc: toml_edit::DocumentMut = raw
            .parse()
            .context("parsing generated TOML for comment injection")?;

        doc.decor_mut().set_prefix(
            "# boss-relay configuration\n# The Slack bot token is read from SLACK_BOT_TOKEN (a .env file works too).\n\n",
        );

        set_table_comment(&mut doc, "channels", "\n# Channels to watch: label = \"Slack channel ID\"\n");
        set_table_comment(&mut doc, "agent", "\n# Agent launched for every BOSS message\n");
        set_table_comment(&mut doc, "filter", "\n# Optional narrowing of which messages count as instructions\n");

        Ok(doc.to_string())
    }

    /// A starter config pointing at `workdir`.
    pub fn starter(workdir: &Path) -> Self {
        let mut channels = BTreeMap::new();
        channels.insert("general".to_string(), "C0000000000".to_string());
        Self {
            workdir: workdir.to_path_buf(),
            poll_interval_secs: default_poll_interval(),
            history_limit: default_history_limit(),
            seed_limit: default_seed_limit(),
            http_timeout_secs: default_http_timeout(),
            startup_message: Some("boss-relay is online. Post an instruction here.".into()),
            channels,
            agent: AgentConfig::default(),
            filter: FilterConfig::default(),
        }
    }

    /// Configured channels in label order.
    pub fn channels(&self) -> Vec<Channel> {
        self.channels
            .iter()
            .map(|(label, id)| Channel::new(label, id.trim()))
            .collect()
    }

    /// `workdir` with a leading `~` expanded.
    pub fn workdir(&self) -> PathBuf {
        expand_home(&self.workdir)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Custom prompt template path, resolved against `workdir`.
    pub fn prompt_template_path(&self) -> Option<PathBuf> {
        self.agent.prompt_template.as_ref().map(|p| {
            let p = expand_home(p);
            if p.is_absolute() { p } else { self.workdir().join(p) }
        })
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().map_or_else(|| path.to_path_buf(), |home| home.join(rest)),
        Err(_) => path.to_path_buf(),
    }
}

/// Read the Slack token from the environment.
pub fn slack_token() -> Result<String, ExitError> {
    std::env::var(TOKEN_ENV)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ExitError::MissingCredential {
            var: TOKEN_ENV.to_string(),
        })
}
