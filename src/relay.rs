//! The relay session: INIT -> SEED -> POLL, forever.
//!
//! All mutable state (seen-set, failed joins, live agents) lives in the
//! session's poller and dispatcher, so each test can build its own.

use std::time::Duration;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::poller::Poller;
use crate::slack::ChatApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Seed,
    Poll,
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: usize,
    pub failed: usize,
    pub finished: usize,
    pub active: usize,
}

pub struct Session<A: ChatApi> {
    api: A,
    poller: Poller,
    dispatcher: Dispatcher,
    poll_interval: Duration,
    startup_message: Option<String>,
    state: State,
}

impl<A: ChatApi> Session<A> {
    pub const fn new(
        api: A,
        poller: Poller,
        dispatcher: Dispatcher,
        poll_interval: Duration,
        startup_message: Option<String>,
    ) -> Self {
        Self {
            api,
            poller,
            dispatcher,
            poll_interval,
            startup_message,
            state: State::Init,
        }
    }

    pub fn from_config(config: &Config, api: A) -> anyhow::Result<Self> {
        Ok(Self::new(
            api,
            Poller::from_config(config),
            Dispatcher::from_config(config)?,
            config.poll_interval(),
            config.startup_message.clone(),
        ))
    }

    pub const fn state(&self) -> State {
        self.state
    }

    pub const fn api(&self) -> &A {
        &self.api
    }

    pub const fn poller(&self) -> &Poller {
        &self.poller
    }

    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// SEED: absorb existing history, then announce. Returns the number of
    /// identifiers seeded.
    pub fn start(&mut self) -> usize {
        self.state = State::Seed;
        let seeded = self.poller.seed(&self.api);
        tracing::info!(
            channels = self.poller.channels().len(),
            seeded,
            "seen-set initialized"
        );

        if let Some(ref text) = self.startup_message {
            for channel in self.poller.channels() {
                if let Err(e) = self.api.post_message(&channel.id, text) {
                    tracing::warn!(channel = %channel.label, error = %e, "startup notification failed");
                }
            }
        }

        self.state = State::Poll;
        seeded
    }

    /// One POLL iteration without the sleep. Seeds first if `start` was
    /// never called.
    pub fn tick(&mut self) -> TickReport {
        if self.state != State::Poll {
            self.start();
        }

        let mut report = TickReport::default();
        for delivery in self.poller.poll(&self.api) {
            tracing::info!(
                channel = %delivery.channel.label,
                ts = %delivery.message.ts,
                text = %preview(&delivery.instruction, 80),
                "instruction received"
            );
            match self.dispatcher.dispatch(&delivery) {
                Ok(()) => report.dispatched += 1,
                Err(e) => {
                    tracing::error!(
                        channel = %delivery.channel.label,
                        ts = %delivery.message.ts,
                        error = %format!("{e:#}"),
                        "dispatch failed; instruction dropped"
                    );
                    report.failed += 1;
                }
            }
            // Seen whether or not the launch worked: no second attempt.
            self.poller.mark_seen(&delivery);
        }

        report.finished = self.dispatcher.reconcile().len();
        report.active = self.dispatcher.active();
        report
    }

    /// Run until the process is killed.
    pub fn run(&mut self) -> anyhow::Result<()> {
        self.start();
        tracing::info!(interval_secs = self.poll_interval.as_secs(), "polling");
        loop {
            let report = self.tick();
            if report != TickReport::default() {
                tracing::debug!(?report, "tick");
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

/// First line of `text`, cut at a char boundary.
fn preview(text: &str, max_bytes: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.len() <= max_bytes {
        return line.to_string();
    }
    let mut end = max_bytes;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &line[..end])
}
