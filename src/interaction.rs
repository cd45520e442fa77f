//! User-interaction tracking and the graceful reconnect window.
//!
//! The server asks for a connection switch with a graceful-reconnection
//! advisory that names a time window. Switching sockets mid-gesture would
//! stall the stream in front of the user, so the client waits for the
//! window to open, then switches as soon as the user has been idle for a
//! cool-down period, or at the end of the window, whichever comes first.

use std::{
    sync::{
        Arc,
        Mutex,
        Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, sleep, sleep_until},
};
use tracing::debug;

use crate::{sync::lock, wire::messages::GracefulReconnection};

/// Idle time required after an interaction ends.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(2_000);

/// Where the user is in a gesture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InteractionState {
    /// No gesture in progress and the cool-down has elapsed.
    Idle,
    /// Between begin-interaction and end-interaction.
    Interacting,
    /// A gesture ended recently; reverts to idle unless a new one begins.
    CoolingDown,
}

struct TrackerInner {
    cooldown: Duration,
    state: watch::Sender<InteractionState>,
    generation: AtomicU64,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Tracks [`InteractionState`] and exposes an awaitable idle signal.
///
/// Cloning is cheap; clones observe the same state.
#[derive(Clone)]
pub struct InteractionTracker {
    inner: Arc<TrackerInner>,
}

impl std::fmt::Debug for InteractionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionTracker")
            .field("state", &self.state())
            .field("cooldown", &self.inner.cooldown)
            .finish()
    }
}

impl Default for InteractionTracker {
    fn default() -> Self { Self::new(DEFAULT_COOLDOWN) }
}

impl InteractionTracker {
    /// Create an idle tracker with the given cool-down.
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        let (state, _) = watch::channel(InteractionState::Idle);
        Self {
            inner: Arc::new(TrackerInner {
                cooldown,
                state,
                generation: AtomicU64::new(0),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> InteractionState { *self.inner.state.borrow() }

    /// A gesture started; cancels any running cool-down.
    pub fn begin(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(timer) = lock(&self.inner.timer).take() {
            timer.abort();
        }
        self.inner.state.send_replace(InteractionState::Interacting);
    }

    /// A gesture ended; idle follows after the cool-down.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn end(&self) {
        let generation = self
            .inner
            .generation
            .fetch_add(1, Ordering::SeqCst)
            .wrapping_add(1);
        self.inner.state.send_replace(InteractionState::CoolingDown);
        let weak = Arc::downgrade(&self.inner);
        // A cool-down past the clock's range never elapses.
        let deadline = Instant::now().checked_add(self.inner.cooldown);
        let timer = tokio::spawn(async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending().await,
            }
            settle(&weak, generation);
        });
        if let Some(previous) = lock(&self.inner.timer).replace(timer) {
            previous.abort();
        }
    }

    /// Resolve once the tracker is idle; immediately if it already is.
    pub async fn wait_for_idle(&self) {
        let mut states = self.inner.state.subscribe();
        // The sender lives in `self.inner`, so the channel never closes here.
        if states
            .wait_for(|state| *state == InteractionState::Idle)
            .await
            .is_err()
        {
            debug!("interaction state channel closed");
        }
    }
}

fn settle(tracker: &Weak<TrackerInner>, generation: u64) {
    let Some(inner) = tracker.upgrade() else {
        return;
    };
    if inner.generation.load(Ordering::SeqCst) == generation {
        debug!("interaction cool-down elapsed");
        inner.state.send_replace(InteractionState::Idle);
    }
}

/// Server-advised range of instants in which to switch connections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectWindow {
    /// Earliest instant to switch.
    pub start: DateTime<Utc>,
    /// Latest instant to switch.
    pub end: DateTime<Utc>,
}

impl ReconnectWindow {
    /// Derive the window from a graceful-reconnection advisory.
    ///
    /// A missing start means "now". A missing end falls back to
    /// `now + time_to_connection_close`, and then to the start. The end is
    /// never earlier than the start.
    #[must_use]
    pub fn from_advisory(advisory: &GracefulReconnection, now: DateTime<Utc>) -> Self {
        let start = advisory.reconnect_window_start_time.to_datetime().unwrap_or(now);
        let end = advisory
            .reconnect_window_end_time
            .to_datetime()
            .or_else(|| {
                let close = advisory.time_to_connection_close.to_std()?;
                now.checked_add_signed(TimeDelta::from_std(close).ok()?)
            })
            .unwrap_or(start);
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Time from `now` until the window opens and until it closes.
    ///
    /// Instants already in the past yield zero.
    #[must_use]
    pub fn delays_from(&self, now: DateTime<Utc>) -> (Duration, Duration) {
        let until = |instant: DateTime<Utc>| (instant - now).to_std().unwrap_or(Duration::ZERO);
        (until(self.start), until(self.end))
    }
}

/// How a reconnect window was left.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WindowOutcome {
    /// The user was idle inside the window.
    Idle,
    /// The window closed while the user was still busy.
    Deadline,
}

/// Wait until it is acceptable to switch connections.
///
/// Sleeps until the window opens, then races the tracker's idle signal
/// against the end of the window.
pub async fn await_reconnect_window(
    window: ReconnectWindow,
    tracker: &InteractionTracker,
) -> WindowOutcome {
    let (until_start, until_end) = window.delays_from(Utc::now());
    let deadline = Instant::now().checked_add(until_end);
    debug!(?until_start, ?until_end, "waiting for reconnect window");
    sleep(until_start).await;
    let window_closed = async {
        match deadline {
            Some(at) => sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        () = tracker.wait_for_idle() => WindowOutcome::Idle,
        () = window_closed => WindowOutcome::Deadline,
    }
}
