//! The message monitor: a single background loop that polls the chat page,
//! answers messages containing a trigger, and reports how it is doing.
//!
//! All mutable state (lifecycle, seen messages, health counters) sits behind
//! one lock that is never held across browser calls. The browser session is
//! owned by the worker task alone.

mod matcher;
mod seen;

pub use matcher::TriggerSet;
use seen::SeenSet;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::session::{BrowserError, ChatMessage, ChatSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    #[default]
    Idle,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    #[default]
    Healthy,
    /// The last poll or reply failed; the loop keeps going.
    Degraded,
    /// The page is gone or keeps failing; needs a human to log in again.
    SessionLost,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("monitor is already running")]
    AlreadyRunning,
    #[error("monitor is still stopping")]
    Stopping,
    #[error("monitor is not running")]
    NotRunning,
}

/// Point-in-time view of the monitor for control surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub state: MonitorState,
    pub health: Health,
    pub cycles: u64,
    pub messages_seen: usize,
    pub replies_sent: u64,
    pub reply_failures: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_reply_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    state: MonitorState,
    seen: SeenSet,
    health: Health,
    cycles: u64,
    replies_sent: u64,
    reply_failures: u64,
    consecutive_failures: u32,
    last_error: Option<String>,
    last_reply_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    shutdown: Option<watch::Sender<bool>>,
    worker: Option<JoinHandle<()>>,
}

impl Inner {
    /// Fresh bookkeeping for a new monitoring session.
    fn reset(&mut self) {
        self.seen.clear();
        self.health = Health::Healthy;
        self.cycles = 0;
        self.replies_sent = 0;
        self.reply_failures = 0;
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_reply_at = None;
        self.started_at = Some(Utc::now());
    }

    // A worker that died without passing through its shutdown path (panic)
    // would otherwise leave the state stuck.
    fn reap(&mut self) {
        let finished = self.worker.as_ref().is_some_and(|h| h.is_finished());
        if finished {
            self.worker = None;
            if self.state != MonitorState::Idle {
                error!("Monitor worker exited unexpectedly");
                self.state = MonitorState::Idle;
                self.shutdown = None;
            }
        }
    }

    fn record_query_success(&mut self) {
        if self.health == Health::SessionLost {
            info!("Browser session is responding again");
        }
        self.consecutive_failures = 0;
        self.health = Health::Healthy;
    }

    fn record_query_failure(&mut self, err: &BrowserError, lost_after: u32) {
        self.consecutive_failures += 1;
        self.last_error = Some(err.to_string());

        if err.is_session_lost() || self.consecutive_failures >= lost_after {
            if self.health != Health::SessionLost {
                error!(
                    "Browser session lost ({}); log in again or restart monitoring",
                    err
                );
            }
            self.health = Health::SessionLost;
        } else {
            warn!(
                "Poll failed ({} in a row), retrying next cycle: {}",
                self.consecutive_failures, err
            );
            self.health = Health::Degraded;
        }
    }

    fn record_reply(&mut self) {
        self.replies_sent += 1;
        self.last_reply_at = Some(Utc::now());
    }

    fn record_reply_failure(&mut self, err: &BrowserError) {
        self.reply_failures += 1;
        self.last_error = Some(err.to_string());
        if self.health == Health::Healthy {
            self.health = Health::Degraded;
        }
    }

    fn snapshot(&self) -> MonitorStatus {
        MonitorStatus {
            state: self.state,
            health: self.health,
            cycles: self.cycles,
            messages_seen: self.seen.len(),
            replies_sent: self.replies_sent,
            reply_failures: self.reply_failures,
            consecutive_failures: self.consecutive_failures,
            last_error: self.last_error.clone(),
            last_reply_at: self.last_reply_at,
            started_at: self.started_at,
        }
    }
}

/// Handle to the monitor. Cheap to clone; all clones share one monitor.
#[derive(Clone, Default)]
pub struct Monitor {
    inner: Arc<Mutex<Inner>>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a monitoring session on `session`.
    ///
    /// Refused unless the monitor is idle; a refused session is closed.
    pub async fn start(
        &self,
        config: &Config,
        mut session: Box<dyn ChatSession>,
    ) -> Result<(), LifecycleError> {
        let mut inner = self.inner.lock().await;
        inner.reap();

        let refused = match inner.state {
            MonitorState::Idle => None,
            MonitorState::Running => Some(LifecycleError::AlreadyRunning),
            MonitorState::Stopping => Some(LifecycleError::Stopping),
        };
        if let Some(err) = refused {
            drop(inner);
            warn!("Start refused: {}", err);
            session.close().await;
            return Err(err);
        }

        inner.reset();
        inner.state = MonitorState::Running;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Worker::new(Arc::clone(&self.inner), config, shutdown_rx);
        inner.shutdown = Some(shutdown_tx);
        inner.worker = Some(tokio::spawn(worker.run(session)));

        info!(
            "Monitoring started: {} trigger(s), polling every {}ms",
            config.triggers.len(),
            config.monitor.poll_interval_ms
        );
        Ok(())
    }

    /// Ask the worker to exit at its next loop boundary.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let mut inner = self.inner.lock().await;
        inner.reap();

        if inner.state != MonitorState::Running {
            return Err(LifecycleError::NotRunning);
        }
        inner.state = MonitorState::Stopping;
        if let Some(tx) = inner.shutdown.take() {
            let _ = tx.send(true);
        }
        info!("Monitoring shutdown requested");
        Ok(())
    }

    pub async fn state(&self) -> MonitorState {
        let mut inner = self.inner.lock().await;
        inner.reap();
        inner.state
    }

    pub async fn status(&self) -> MonitorStatus {
        let mut inner = self.inner.lock().await;
        inner.reap();
        inner.snapshot()
    }

    /// Wait for the current worker, if any, to finish.
    pub async fn join(&self) {
        let handle = self.inner.lock().await.worker.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                // The worker never reached its own shutdown path.
                error!("Monitor worker failed: {}", e);
                let mut inner = self.inner.lock().await;
                inner.state = MonitorState::Idle;
                inner.shutdown = None;
            }
        }
    }
}

struct Worker {
    inner: Arc<Mutex<Inner>>,
    triggers: TriggerSet,
    reply_text: String,
    poll_interval: Duration,
    call_timeout: Duration,
    session_lost_after: u32,
    skip_existing: bool,
    /// Whether messages on screen have been recorded for the current page.
    primed: bool,
    location: Option<String>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    fn new(inner: Arc<Mutex<Inner>>, config: &Config, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            inner,
            triggers: TriggerSet::new(&config.triggers),
            reply_text: config.reply_text.clone(),
            poll_interval: config.monitor.poll_interval(),
            call_timeout: config.monitor.call_timeout(),
            session_lost_after: config.monitor.session_lost_after,
            skip_existing: config.monitor.skip_existing,
            primed: !config.monitor.skip_existing,
            location: None,
            shutdown,
        }
    }

    async fn run(mut self, mut session: Box<dyn ChatSession>) {
        debug!("Worker watching for {} trigger(s)", self.triggers.len());
        // The baseline poll runs right away; after that every poll waits first.
        let mut wait_first = self.primed;

        loop {
            if wait_first && self.wait_or_stop().await {
                break;
            }
            wait_first = true;
            if self.stop_requested() {
                break;
            }
            self.poll_once(session.as_mut()).await;
        }

        session.close().await;

        let mut inner = self.inner.lock().await;
        inner.state = MonitorState::Idle;
        inner.shutdown = None;
        info!(
            "Monitoring stopped after {} poll(s), {} repl(ies) sent",
            inner.cycles, inner.replies_sent
        );
    }

    /// Sleep one poll interval. Returns true if a stop arrived meanwhile.
    async fn wait_or_stop(&mut self) -> bool {
        let interval = self.poll_interval;
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(interval) => false,
            _ = self.shutdown.changed() => true,
        };
        interrupted || self.stop_requested()
    }

    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// One poll cycle.
    async fn poll_once(&mut self, session: &mut dyn ChatSession) {
        let messages = match self.bounded(session.visible_messages()).await {
            Ok(messages) => messages,
            Err(e) => {
                let mut inner = self.inner.lock().await;
                inner.cycles += 1;
                inner.record_query_failure(&e, self.session_lost_after);
                return;
            }
        };

        // The login screen and each channel live at their own path. Whatever
        // a new view shows on arrival is history, not something to answer.
        let location = session.location();
        if self.skip_existing && self.location.is_some() && location != self.location {
            info!(
                "Page changed from {} to {}; recording its messages as seen",
                self.location.as_deref().unwrap_or("?"),
                location.as_deref().unwrap_or("?")
            );
            self.primed = false;
        }
        self.location = location;

        let pending = {
            let mut inner = self.inner.lock().await;
            inner.cycles += 1;
            inner.record_query_success();
            let fresh = inner.seen.take_unseen(messages);

            if !self.primed {
                info!(
                    "Recorded {} message(s) already on screen; only newer messages are answered",
                    fresh.len()
                );
                self.primed = true;
                return;
            }
            self.select_replies(fresh)
        };

        for (message, trigger) in pending {
            info!("Trigger '{}' matched message {}", trigger, message.id);
            match self.inject(session).await {
                Ok(()) => {
                    info!("Reply sent: '{}'", self.reply_text);
                    self.inner.lock().await.record_reply();
                }
                Err(e) => {
                    warn!("Could not send reply to {}: {}", message.id, e);
                    self.inner.lock().await.record_reply_failure(&e);
                }
            }
        }
    }

    fn select_replies(&self, fresh: Vec<ChatMessage>) -> Vec<(ChatMessage, String)> {
        let own_reply = self.reply_text.trim();
        fresh
            .into_iter()
            .filter_map(|message| {
                if message.text.trim() == own_reply {
                    debug!("Ignoring our own reply {}", message.id);
                    return None;
                }
                let trigger = self.triggers.first_match(&message.text)?.to_string();
                Some((message, trigger))
            })
            .collect()
    }

    async fn inject(&self, session: &mut dyn ChatSession) -> Result<(), BrowserError> {
        self.bounded(session.focus_input()).await?;
        self.bounded(session.type_text(&self.reply_text)).await?;
        self.bounded(session.submit()).await
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, BrowserError>
    where
        F: Future<Output = Result<T, BrowserError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Timeout),
        }
    }
}
