use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::config::{self, Config, TOKEN_ENV};
use crate::error::ExitError;
use crate::slack::{ApiError, ChatApi, SlackClient};
use crate::subprocess::Tool;
use crate::template::PromptTemplate;

const VERSION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Args)]
pub struct DoctorArgs {
    /// Path to boss-relay.toml (default: search the current directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Skip Slack API calls
    #[arg(long)]
    pub offline: bool,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Text,
    Json,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DoctorReport {
    pub config: ConfigStatus,
    pub slack: SlackStatus,
    pub channels: Vec<ChannelStatus>,
    pub agent: AgentStatus,
    pub files: Vec<FileStatus>,
    pub issues: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigStatus {
    pub path: String,
    pub workdir: String,
    pub poll_interval_secs: u64,
    pub history_limit: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SlackStatus {
    pub token_present: bool,
    pub checked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub label: String,
    pub id: String,
    /// "ok", "not a member (relay will join)", "unchecked", or the error
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentStatus {
    pub program: String,
    pub version: Option<String>,
    pub present: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileStatus {
    pub path: String,
    pub exists: bool,
}

impl DoctorArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let path = config::resolve_config_path(self.config.as_deref())?;
        let config = Config::load(&path)?;

        let format = self.format.unwrap_or_else(|| {
            if std::io::stdout().is_terminal() {
                OutputFormat::Pretty
            } else {
                OutputFormat::Text
            }
        });

        let workdir = config.workdir();
        let mut report = DoctorReport {
            config: ConfigStatus {
                path: path.display().to_string(),
                workdir: workdir.display().to_string(),
                poll_interval_secs: config.poll_interval_secs,
                history_limit: config.history_limit,
            },
            slack: SlackStatus::default(),
            channels: vec![],
            agent: AgentStatus {
                program: config.agent.program.clone(),
                version: None,
                present: false,
            },
            files: vec![],
            issues: vec![],
        };

        let client = match config::slack_token() {
            Ok(token) => {
                report.slack.token_present = true;
                Some(SlackClient::new(&token, config.http_timeout()))
            }
            Err(_) => {
                report.issues.push(format!("{TOKEN_ENV} is not set"));
                None
            }
        };

        match client.as_ref().filter(|_| !self.offline) {
            Some(client) => {
                report.slack.checked = true;
                match client.auth_test() {
                    Ok(identity) => {
                        report.slack.team = Some(identity.team);
                        report.slack.user = Some(identity.user);
                    }
                    Err(e) => report.issues.push(format!("Slack auth.test: {e}")),
                }
                for channel in config.channels() {
                    let status = match client.history(&channel.id, 1) {
                        Ok(_) => "ok".to_string(),
                        Err(ApiError::NotInChannel { .. }) => {
                            "not a member (relay will join)".to_string()
                        }
                        Err(e) => {
                            report.issues.push(format!("#{}: {e}", channel.label));
                            e.to_string()
                        }
                    };
                    report.channels.push(ChannelStatus {
                        label: channel.label,
                        id: channel.id,
                        status,
                    });
                }
            }
            None => {
                report.channels = config
                    .channels()
                    .into_iter()
                    .map(|c| ChannelStatus {
                        label: c.label,
                        id: c.id,
                        status: "unchecked".to_string(),
                    })
                    .collect();
            }
        }

        match Tool::new(&config.agent.program)
            .arg("--version")
            .timeout(VERSION_TIMEOUT)
            .run()
        {
            Ok(output) if output.success() => {
                report.agent.present = true;
                report.agent.version = Some(output.stdout.trim().to_string());
            }
            Ok(output) => {
                report.agent.present = true;
                report.issues.push(format!(
                    "{} --version exited with {}: {}",
                    config.agent.program,
                    output.exit_code,
                    output.stderr.trim()
                ));
            }
            Err(e) => match e.downcast_ref::<ExitError>() {
                Some(ExitError::ToolNotFound { .. }) => report
                    .issues
                    .push(format!("Agent not found: {}", config.agent.program)),
                _ => report.issues.push(format!("{e:#}")),
            },
        }

        let workdir_exists = workdir.is_dir();
        report.files.push(FileStatus {
            path: workdir.display().to_string(),
            exists: workdir_exists,
        });
        if !workdir_exists {
            report
                .issues
                .push(format!("workdir {} does not exist", workdir.display()));
        }

        for file in &config.agent.instruction_files {
            let full = workdir.join(file);
            let exists = full.exists();
            report.files.push(FileStatus {
                path: full.display().to_string(),
                exists,
            });
            if !exists {
                report
                    .issues
                    .push(format!("instruction file not found: {}", full.display()));
            }
        }

        if let Err(e) = PromptTemplate::from_config(&config) {
            report.issues.push(format!("prompt template: {e:#}"));
        }

        let issue_count = report.issues.len();

        match format {
            OutputFormat::Pretty => print_pretty(&report),
            OutputFormat::Text => print_text(&report),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }

        if issue_count > 0 {
            let code = u8::try_from(issue_count.min(125)).unwrap_or(125);
            return Err(
                ExitError::new(code, format!("{issue_count} issue(s) found")).into(),
            );
        }

        Ok(())
    }
}

fn print_pretty(report: &DoctorReport) {
    println!("=== boss-relay doctor ===\n");
    println!("Config:   {}", report.config.path);
    println!("Workdir:  {}", report.config.workdir);
    println!(
        "Polling:  every {}s, {} messages per channel",
        report.config.poll_interval_secs, report.config.history_limit
    );
    println!();

    println!("Slack:");
    if !report.slack.token_present {
        println!("  ✗ {TOKEN_ENV}: NOT SET");
    } else if !report.slack.checked {
        println!("  - {TOKEN_ENV}: set (not checked)");
    } else if let (Some(team), Some(user)) = (&report.slack.team, &report.slack.user) {
        println!("  ✓ authenticated as {user} in {team}");
    } else {
        println!("  ✗ authentication failed");
    }

    println!("\nChannels:");
    for channel in &report.channels {
        let mark = match channel.status.as_str() {
            "ok" => "✓",
            "unchecked" => "-",
            s if s.starts_with("not a member") => "~",
            _ => "✗",
        };
        println!("  {mark} #{} ({}): {}", channel.label, channel.id, channel.status);
    }

    println!("\nAgent:");
    if report.agent.present {
        println!(
            "  ✓ {}: {}",
            report.agent.program,
            report.agent.version.as_deref().unwrap_or("OK")
        );
    } else {
        println!("  ✗ {}: NOT FOUND", report.agent.program);
    }

    println!("\nFiles:");
    for file in &report.files {
        let mark = if file.exists { "✓" } else { "✗" };
        println!("  {mark} {}", file.path);
    }

    if report.issues.is_empty() {
        println!("\n✓ No issues found");
    } else {
        println!("\nIssues ({}):", report.issues.len());
        for issue in &report.issues {
            println!("  • {issue}");
        }
    }
}

fn print_text(report: &DoctorReport) {
    println!(
        "boss-relay-doctor  config={}  workdir={}  interval={}s",
        report.config.path, report.config.workdir, report.config.poll_interval_secs
    );

    let slack = if !report.slack.token_present {
        "missing-token"
    } else if !report.slack.checked {
        "unchecked"
    } else if report.slack.team.is_some() {
        "ok"
    } else {
        "auth-failed"
    };
    println!("slack  {slack}");

    for channel in &report.channels {
        println!("channel  {}  {}  {}", channel.label, channel.id, channel.status);
    }

    let agent = if report.agent.present {
        format!("ok  {}", report.agent.version.as_deref().unwrap_or_default())
    } else {
        "missing".to_string()
    };
    println!("agent  {}  {agent}", report.agent.program);

    for file in &report.files {
        let status = if file.exists { "ok" } else { "missing" };
        println!("file  {}  {status}", file.path);
    }

    if !report.issues.is_empty() {
        println!("issues  count={}", report.issues.len());
        for issue in &report.issues {
            println!("issue  {issue}");
        }
    }
}
