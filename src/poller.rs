//! Channel poller: turns channel history into new principal messages.
//!
//! Every identifier the poller has looked at ends up in the seen-set, either
//! because it existed at startup, because it was ignored (bot, system
//! subtype, filtered out), or because the main loop dispatched it. The set
//! only grows.
//!
//! A channel whose history could not be read during seeding is seeded by its
//! first successful fetch instead; that fetch yields nothing.

use std::collections::HashSet;

use crate::config::{Config, FilterConfig};
use crate::message::{Channel, Delivery, Message};
use crate::slack::{ApiError, ChatApi};

/// Message identifiers the relay will never act on again, keyed per channel.
#[derive(Debug, Default)]
pub struct SeenSet {
    ids: HashSet<(String, String)>,
}

impl SeenSet {
    pub fn contains(&self, channel_id: &str, ts: &str) -> bool {
        self.ids.contains(&(channel_id.to_string(), ts.to_string()))
    }

    /// Returns true if the identifier was not present before.
    pub fn insert(&mut self, channel_id: &str, ts: &str) -> bool {
        self.ids.insert((channel_id.to_string(), ts.to_string()))
    }
}

pub struct Poller {
    channels: Vec<Channel>,
    history_limit: u32,
    seed_limit: u32,
    filter: FilterConfig,
    seen: SeenSet,
    /// Channels whose join attempt failed. Never retried in this process.
    join_failed: HashSet<String>,
    /// Channels with no baseline yet because seeding could not read them.
    unseeded: HashSet<String>,
}

impl Poller {
    pub fn new(channels: Vec<Channel>, history_limit: u32, seed_limit: u32, filter: FilterConfig) -> Self {
        Self {
            channels,
            history_limit,
            seed_limit,
            filter,
            seen: SeenSet::default(),
            join_failed: HashSet::new(),
            unseeded: HashSet::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.channels(),
            config.history_limit,
            config.seed_limit,
            config.filter.clone(),
        )
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub const fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn join_suppressed(&self, channel_id: &str) -> bool {
        self.join_failed.contains(channel_id)
    }

    /// True while a channel still waits for its first readable history.
    pub fn awaiting_seed(&self, channel_id: &str) -> bool {
        self.unseeded.contains(channel_id)
    }

    /// Absorb the current history of every channel into the seen-set.
    /// Returns how many identifiers were added.
    pub fn seed<A: ChatApi + ?Sized>(&mut self, api: &A) -> usize {
        let mut added = 0;
        for channel in self.channels.clone() {
            let Some(messages) = self.fetch(api, &channel, self.seed_limit) else {
                tracing::warn!(channel = %channel.label, "history unreadable; seeding on first successful fetch");
                self.unseeded.insert(channel.id.clone());
                continue;
            };
            let seeded = self.absorb(&channel, &messages);
            added += seeded;
            tracing::info!(channel = %channel.label, seeded, "seeded channel history");
        }
        added
    }

    /// One pass over all channels. New principal messages come back oldest
    /// first within each channel; the caller marks them seen once handled.
    pub fn poll<A: ChatApi + ?Sized>(&mut self, api: &A) -> Vec<Delivery> {
        let mut fresh = Vec::new();
        for channel in self.channels.clone() {
            let late_seed = self.unseeded.contains(&channel.id);
            let limit = if late_seed { self.seed_limit } else { self.history_limit };
            let Some(mut messages) = self.fetch(api, &channel, limit) else {
                continue;
            };
            if late_seed {
                let seeded = self.absorb(&channel, &messages);
                self.unseeded.remove(&channel.id);
                tracing::info!(channel = %channel.label, seeded, "seeded channel history late");
                continue;
            }
            // Slack returns newest first.
            messages.reverse();
            for message in messages {
                if self.seen.contains(&channel.id, &message.ts) {
                    continue;
                }
                if let Some(instruction) = self.accept(&message) {
                    fresh.push(Delivery {
                        channel: channel.clone(),
                        message,
                        instruction,
                    });
                } else {
                    tracing::debug!(
                        channel = %channel.label,
                        ts = %message.ts,
                        subtype = message.subtype.as_deref().unwrap_or(""),
                        bot = message.bot_id.is_some(),
                        "ignoring message"
                    );
                    self.seen.insert(&channel.id, &message.ts);
                }
            }
        }
        fresh
    }

    pub fn mark_seen(&mut self, delivery: &Delivery) {
        self.seen.insert(&delivery.channel.id, &delivery.message.ts);
    }

    /// Insert every identifier of `messages`; returns how many were new.
    fn absorb(&mut self, channel: &Channel, messages: &[Message]) -> usize {
        let mut added = 0;
        for message in messages {
            if self.seen.insert(&channel.id, &message.ts) {
                added += 1;
            }
        }
        added
    }

    /// The instruction text if this message should be dispatched.
    fn accept(&self, message: &Message) -> Option<String> {
        if !message.is_principal() {
            return None;
        }
        if let Some(user) = &self.filter.principal_user
            && message.user.as_deref() != Some(user.as_str())
        {
            return None;
        }
        let text = message.plain_text();
        match &self.filter.command_prefix {
            Some(prefix) => text
                .trim_start()
                .strip_prefix(prefix.as_str())
                .map(str::trim)
                .filter(|rest| !rest.is_empty())
                .map(ToString::to_string),
            None => Some(text.trim().to_string()),
        }
    }

    /// `None` when the history could not be read this time.
    fn fetch<A: ChatApi + ?Sized>(&mut self, api: &A, channel: &Channel, limit: u32) -> Option<Vec<Message>> {
        match api.history(&channel.id, limit) {
            Ok(messages) => Some(messages),
            Err(ApiError::NotInChannel { .. }) => self.join_and_refetch(api, channel, limit),
            Err(e) => {
                tracing::warn!(channel = %channel.label, error = %e, "fetching history failed");
                None
            }
        }
    }

    fn join_and_refetch<A: ChatApi + ?Sized>(
        &mut self,
        api: &A,
        channel: &Channel,
        limit: u32,
    ) -> Option<Vec<Message>> {
        if self.join_failed.contains(&channel.id) {
            tracing::debug!(channel = %channel.label, "not a member and joining already failed");
            return None;
        }

        tracing::info!(channel = %channel.label, id = %channel.id, "not a member, joining");
        if let Err(e) = api.join(&channel.id) {
            tracing::warn!(
                channel = %channel.label,
                error = %e,
                "joining failed; channel stays unread until restart"
            );
            self.join_failed.insert(channel.id.clone());
            return None;
        }

        match api.history(&channel.id, limit) {
            Ok(messages) => Some(messages),
            Err(e) => {
                tracing::warn!(channel = %channel.label, error = %e, "fetching history after join failed");
                None
            }
        }
    }
}
