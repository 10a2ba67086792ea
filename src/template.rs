//! Prompt rendering for dispatched agents.

use std::path::Path;

use anyhow::Context;
use minijinja::Environment;
use serde::Serialize;

use crate::config::Config;
use crate::message::Delivery;

const BUILTIN_PROMPT: &str = include_str!("templates/prompt.md.jinja");

/// Context data passed to the prompt template
#[derive(Debug, Serialize)]
pub struct PromptContext {
    pub channel_label: String,
    pub channel_id: String,
    pub ts: String,
    /// `ts` rendered as UTC, when it parses
    pub posted_at: Option<String>,
    pub user: Option<String>,
    /// Instruction text (markup reduced, command prefix stripped)
    pub text: String,
    pub workdir: String,
    /// Absolute paths of files the agent should read first
    pub instruction_files: Vec<String>,
}

impl PromptContext {
    pub fn new(delivery: &Delivery, workdir: &Path, instruction_files: &[String]) -> Self {
        Self {
            channel_label: delivery.channel.label.clone(),
            channel_id: delivery.channel.id.clone(),
            ts: delivery.message.ts.clone(),
            posted_at: delivery
                .message
                .timestamp()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            user: delivery.message.user.clone(),
            text: delivery.instruction.clone(),
            workdir: workdir.display().to_string(),
            instruction_files: instruction_files
                .iter()
                .map(|f| workdir.join(f).display().to_string())
                .collect(),
        }
    }
}

/// The built-in prompt or a user-supplied one.
#[derive(Debug, Clone, Default)]
pub struct PromptTemplate {
    custom: Option<String>,
}

impl PromptTemplate {
    pub const fn builtin() -> Self {
        Self { custom: None }
    }

    /// Load a template from disk, failing early if it does not compile.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading prompt template {}", path.display()))?;
        {
            let mut env = Environment::new();
            env.add_template("prompt", &source)
                .with_context(|| format!("compiling prompt template {}", path.display()))?;
        }
        Ok(Self {
            custom: Some(source),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config
            .prompt_template_path()
            .map_or_else(|| Ok(Self::builtin()), |path| Self::from_file(&path))
    }

    pub fn render(&self, ctx: &PromptContext) -> anyhow::Result<String> {
        let source = self.custom.as_deref().unwrap_or(BUILTIN_PROMPT);
        let mut env = Environment::new();
        env.add_template("prompt", source)?;
        let rendered = env.get_template("prompt")?.render(ctx)?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Channel, Message};

    fn delivery(label: &str, text: &str) -> Delivery {
        Delivery {
            channel: Channel::new(label, "C0OPS"),
            message: Message {
                ts: "1700000000.000100".into(),
                text: text.into(),
                user: Some("U0BOSS".into()),
                ..Message::default()
            },
            instruction: text.into(),
        }
    }

    #[test]
    fn builtin_prompt_embeds_message_and_channel() {
        let ctx = PromptContext::new(
            &delivery("ops", "hello"),
            Path::new("/srv/company"),
            &["CLAUDE.md".to_string()],
        );
        let prompt = PromptTemplate::builtin().render(&ctx).unwrap();

        assert!(prompt.contains("#ops"));
        assert!(prompt.contains("C0OPS"));
        assert!(prompt.contains("\nhello\n"));
        assert!(prompt.contains("2023-11-14 22:13:20 UTC"));
        assert!(prompt.contains("You are working in /srv/company."));
        assert!(prompt.contains("read:\n- /srv/company/CLAUDE.md\n\nCarry out"));
    }

    #[test]
    fn builtin_prompt_without_instruction_files() {
        let ctx = PromptContext::new(&delivery("ops", "hello"), Path::new("/srv"), &[]);
        let prompt = PromptTemplate::builtin().render(&ctx).unwrap();
        assert!(!prompt.contains("read:"));
        assert!(prompt.contains("You are working in /srv.\n\nCarry out"));
    }

    #[test]
    fn text_is_not_html_escaped() {
        let ctx = PromptContext::new(&delivery("ops", "a < b && \"c\""), Path::new("/srv"), &[]);
        let prompt = PromptTemplate::builtin().render(&ctx).unwrap();
        assert!(prompt.contains("a < b && \"c\""));
    }

    #[test]
    fn custom_template_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boss.jinja");
        std::fs::write(&path, "[{{ channel_label }}] {{ text }}").unwrap();

        let template = PromptTemplate::from_file(&path).unwrap();
        let ctx = PromptContext::new(&delivery("hr", "hire someone"), dir.path(), &[]);
        assert_eq!(template.render(&ctx).unwrap(), "[hr] hire someone");
    }

    #[test]
    fn broken_template_is_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jinja");
        std::fs::write(&path, "{% if %}").unwrap();
        assert!(PromptTemplate::from_file(&path).is_err());
    }

    #[test]
    fn missing_template_is_an_error() {
        assert!(PromptTemplate::from_file(Path::new("/nonexistent/boss.jinja")).is_err());
    }
}
