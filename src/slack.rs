//! Minimal blocking Slack Web API client.
//!
//! Only the calls the relay needs: channel history, posting, joining, and
//! `auth.test` for `doctor`. Slack answers almost everything with HTTP 200 and
//! an `{"ok": false, "error": "..."}` envelope, so errors are read from the body.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::message::Message;

pub const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Failure talking to the chat platform.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The bot is not a member of the channel (`not_in_channel`).
    #[error("not a member of channel {channel}")]
    NotInChannel { channel: String },

    #[error("{method} failed: {code}")]
    Slack { method: &'static str, code: String },

    #[error("{method} request failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: ureq::Error,
    },

    #[error("{method} returned an unreadable response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// The chat operations the relay depends on.
pub trait ChatApi {
    /// Most recent messages of a channel, newest first (Slack's order).
    fn history(&self, channel_id: &str, limit: u32) -> Result<Vec<Message>, ApiError>;

    fn post_message(&self, channel_id: &str, text: &str) -> Result<(), ApiError>;

    fn join(&self, channel_id: &str) -> Result<(), ApiError>;
}

/// Identity returned by `auth.test`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthIdentity {
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<Message>,
}

pub struct SlackClient {
    agent: ureq::Agent,
    auth_header: String,
    base_url: String,
}

impl SlackClient {
    /// Create a client; every request is bounded by `timeout`.
    pub fn new(token: &str, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            agent,
            auth_header: format!("Bearer {token}"),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root (tests, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Verify the token and report who we are.
    pub fn auth_test(&self) -> Result<AuthIdentity, ApiError> {
        let method = "auth.test";
        let value = self.post(method, None, &json!({}))?;
        serde_json::from_value(value).map_err(|source| ApiError::Decode { method, source })
    }

    fn get(
        &self,
        method: &'static str,
        channel: Option<&str>,
        query: &[(&str, &str)],
    ) -> Result<Value, ApiError> {
        let url = format!("{}/{method}", self.base_url);
        let mut request = self
            .agent
            .get(&url)
            .header("Authorization", self.auth_header.as_str());
        for (key, value) in query {
            request = request.query(*key, *value);
        }
        let body = request
            .call()
            .map_err(|source| ApiError::Transport { method, source })?
            .into_body()
            .read_to_string()
            .map_err(|source| ApiError::Transport { method, source })?;
        check_envelope(method, channel, &body)
    }

    fn post(
        &self,
        method: &'static str,
        channel: Option<&str>,
        payload: &Value,
    ) -> Result<Value, ApiError> {
        let url = format!("{}/{method}", self.base_url);
        let body = self
            .agent
            .post(&url)
            .header("Authorization", self.auth_header.as_str())
            .header("Content-Type", "application/json; charset=utf-8")
            .send(payload.to_string())
            .map_err(|source| ApiError::Transport { method, source })?
            .into_body()
            .read_to_string()
            .map_err(|source| ApiError::Transport { method, source })?;
        check_envelope(method, channel, &body)
    }
}

impl ChatApi for SlackClient {
    fn history(&self, channel_id: &str, limit: u32) -> Result<Vec<Message>, ApiError> {
        let method = "conversations.history";
        let limit = limit.to_string();
        let value = self.get(
            method,
            Some(channel_id),
            &[("channel", channel_id), ("limit", &limit), ("inclusive", "true")],
        )?;
        let response: HistoryResponse =
            serde_json::from_value(value).map_err(|source| ApiError::Decode { method, source })?;
        Ok(response.messages)
    }

    fn post_message(&self, channel_id: &str, text: &str) -> Result<(), ApiError> {
        self.post(
            "chat.postMessage",
            Some(channel_id),
            &json!({ "channel": channel_id, "text": text }),
        )
        .map(drop)
    }

    fn join(&self, channel_id: &str) -> Result<(), ApiError> {
        self.post(
            "conversations.join",
            Some(channel_id),
            &json!({ "channel": channel_id }),
        )
        .map(drop)
    }
}

/// Decode a Slack response body and turn `ok: false` into an [`ApiError`].
fn check_envelope(method: &'static str, channel: Option<&str>, body: &str) -> Result<Value, ApiError> {
    let value: Value =
        serde_json::from_str(body).map_err(|source| ApiError::Decode { method, source })?;
    if value.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(value);
    }
    let code = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error")
        .to_string();
    if code == "not_in_channel" {
        return Err(ApiError::NotInChannel {
            channel: channel.unwrap_or_default().to_string(),
        });
    }
    Err(ApiError::Slack { method, code })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_ok_passes_through() {
        let value = check_envelope("conversations.history", Some("C1"), r#"{"ok":true,"messages":[]}"#)
            .unwrap();
        assert_eq!(value["messages"], json!([]));
    }

    #[test]
    fn envelope_not_in_channel_is_membership_error() {
        let err = check_envelope(
            "conversations.history",
            Some("C1"),
            r#"{"ok":false,"error":"not_in_channel"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::NotInChannel { ref channel } if channel == "C1"));
    }

    #[test]
    fn envelope_other_error_keeps_code() {
        let err = check_envelope(
            "chat.postMessage",
            Some("C1"),
            r#"{"ok":false,"error":"channel_not_found"}"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "chat.postMessage failed: channel_not_found");
    }

    #[test]
    fn envelope_missing_error_code() {
        let err = check_envelope("auth.test", None, r#"{"ok":false}"#).unwrap_err();
        assert!(matches!(err, ApiError::Slack { ref code, .. } if code == "unknown_error"));
    }

    #[test]
    fn envelope_garbage_is_decode_error() {
        let err = check_envelope("auth.test", None, "<html>").unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }

    #[test]
    fn history_response_decodes_messages() {
        let value = json!({
            "ok": true,
            "messages": [
                {"type": "message", "user": "U1", "text": "newer", "ts": "2.0"},
                {"type": "message", "subtype": "channel_join", "user": "U2", "text": "joined", "ts": "1.0"}
            ]
        });
        let response: HistoryResponse = serde_json::from_value(value).unwrap();
        assert_eq!(response.messages.len(), 2);
        assert!(response.messages[0].is_principal());
        assert!(!response.messages[1].is_principal());
    }

    #[test]
    fn unreachable_host_is_transport_error() {
        let client = SlackClient::new("xoxb-test", Duration::from_secs(2))
            .with_base_url("http://127.0.0.1:1/api/");
        let err = client.history("C1", 5).unwrap_err();
        assert!(matches!(err, ApiError::Transport { .. }));
    }
}
