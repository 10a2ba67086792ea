//! Channels and messages as the relay sees them.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;

/// A configured channel. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub label: String,
    pub id: String,
}

impl Channel {
    pub fn new(label: &str, id: &str) -> Self {
        Self {
            label: label.to_string(),
            id: id.to_string(),
        }
    }
}

/// One entry of `conversations.history`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Message {
    pub ts: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
}

impl Message {
    /// A human-authored message: no bot marker and no system subtype
    /// (`channel_join`, `channel_topic`, edits, ...). Text is irrelevant.
    pub const fn is_principal(&self) -> bool {
        self.bot_id.is_none() && self.subtype.is_none()
    }

    /// `ts` as a wall-clock time, if it parses as `<secs>.<micros>`.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let (secs, frac) = self.ts.split_once('.').unwrap_or((self.ts.as_str(), "0"));
        let secs: i64 = secs.parse().ok()?;
        let micros: u32 = format!("{frac:0<6}").get(..6)?.parse().ok()?;
        DateTime::from_timestamp(secs, micros * 1_000)
    }

    /// Message text with Slack markup reduced to something a model reads
    /// naturally: entities unescaped, `<url|label>` turned into `label (url)`,
    /// and user/channel references kept as bare ids.
    pub fn plain_text(&self) -> String {
        let replaced = re_markup().replace_all(&self.text, |caps: &regex::Captures| {
            let target = caps.get(1).map_or("", |m| m.as_str());
            let label = caps.get(2).map(|m| m.as_str());
            match (target.chars().next(), label) {
                (Some('@' | '#'), Some(label)) => format!("{}{label}", &target[..1]),
                (Some('@' | '#' | '!'), None) => target.to_string(),
                (_, Some(label)) => format!("{label} ({target})"),
                (_, None) => target.to_string(),
            }
        });
        replaced
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&")
    }
}

fn re_markup() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([^<>|]+)(?:\|([^<>]*))?>").expect("valid regex"))
}

/// A new principal message paired with the channel it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: Channel,
    pub message: Message,
    /// Text to hand to the agent (command prefix already stripped).
    pub instruction: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(bot_id: Option<&str>, subtype: Option<&str>) -> Message {
        Message {
            ts: "1700000000.000100".into(),
            text: "deploy the thing".into(),
            user: Some("U1".into()),
            bot_id: bot_id.map(Into::into),
            subtype: subtype.map(Into::into),
        }
    }

    #[test]
    fn human_message_is_principal() {
        assert!(msg(None, None).is_principal());
    }

    #[test]
    fn bot_message_is_not_principal() {
        assert!(!msg(Some("B1"), None).is_principal());
    }

    #[test]
    fn channel_join_is_never_principal() {
        assert!(!msg(None, Some("channel_join")).is_principal());
        assert!(!msg(Some("B1"), Some("channel_join")).is_principal());
    }

    #[test]
    fn deserialize_history_entry() {
        let json = r#"{"type":"message","user":"U42","text":"hi","ts":"1700000000.000200"}"#;
        let m: Message = serde_json::from_str(json).unwrap();
        assert_eq!(m.ts, "1700000000.000200");
        assert_eq!(m.user.as_deref(), Some("U42"));
        assert!(m.is_principal());
    }

    #[test]
    fn timestamp_parses_slack_ts() {
        let ts = msg(None, None).timestamp().unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_micros(), 100);
    }

    #[test]
    fn timestamp_rejects_garbage() {
        let m = Message {
            ts: "not-a-ts".into(),
            ..Message::default()
        };
        assert!(m.timestamp().is_none());
    }

    #[test]
    fn plain_text_unwraps_markup() {
        let m = Message {
            ts: "1.0".into(),
            text: "ask <@U123> about <https://example.com|the doc> &amp; <#C9|ops>".into(),
            ..Message::default()
        };
        assert_eq!(
            m.plain_text(),
            "ask @U123 about the doc (https://example.com) & #ops"
        );
    }

    #[test]
    fn plain_text_keeps_bare_links() {
        let m = Message {
            ts: "1.0".into(),
            text: "see <https://example.com> a &lt; b".into(),
            ..Message::default()
        };
        assert_eq!(m.plain_text(), "see https://example.com a < b");
    }
}
