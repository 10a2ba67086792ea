//! boss-relay - dispatch agents on instructions posted to Slack

pub mod agent;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod poller;
pub mod relay;
pub mod slack;
pub mod subprocess;
pub mod telemetry;
pub mod template;
