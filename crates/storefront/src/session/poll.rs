//! Periodic session re-classification.
//!
//! A background task re-runs [`SessionClassifier::classify`] on every tick
//! of an injected [`Ticker`] and reports only actual transitions. Hosts use
//! [`IntervalTicker`]; tests drive ticks by hand.

use std::future::Future;
use std::time::Duration;

use bazaar_core::SessionState;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use super::SessionClassifier;

/// Source of poll ticks.
pub trait Ticker: Send + 'static {
    /// Wait for the next tick. Returns `false` once no more ticks will come.
    fn tick(&mut self) -> impl Future<Output = bool> + Send;
}

/// [`Ticker`] firing on a fixed wall-clock period.
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    /// Tick every `period`, first tick one period from now.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn every(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        // A suspended device should re-check once on wake, not replay every missed tick.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Remembers the last classification and reports only differences.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChangeDetector {
    last: SessionState,
}

impl ChangeDetector {
    pub(crate) const fn new(initial: SessionState) -> Self {
        Self { last: initial }
    }

    pub(crate) fn observe(&mut self, next: SessionState) -> Option<SessionState> {
        if next == self.last {
            None
        } else {
            self.last = next;
            Some(next)
        }
    }
}

/// Handle to a running session poll. Dropping it stops the poll.
#[derive(Debug)]
pub struct SessionPoll {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl SessionPoll {
    /// Stop polling. Safe to call any number of times.
    pub fn cancel(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Session poll cancelled");
        }
    }

    /// Whether the poll task is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for SessionPoll {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Session transitions as a subscribable channel.
///
/// The receiver always holds the latest classification; `changed()` resolves
/// on each transition. Dropping the subscription stops the underlying poll.
#[derive(Debug)]
pub struct SessionSubscription {
    pub receiver: watch::Receiver<SessionState>,
    pub poll: SessionPoll,
}

impl SessionClassifier {
    /// Re-classify on every tick and call `on_change` when the result differs
    /// from the last observed value.
    ///
    /// The baseline is the classification at the time of the call. Must be
    /// called from within a Tokio runtime.
    pub fn poll_for_change<T, F>(&self, mut ticker: T, mut on_change: F) -> SessionPoll
    where
        T: Ticker,
        F: FnMut(SessionState) + Send + 'static,
    {
        let classifier = self.clone();
        let mut detector = ChangeDetector::new(classifier.classify());
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    alive = ticker.tick() => {
                        if !alive {
                            break;
                        }
                        if let Some(next) = detector.observe(classifier.classify()) {
                            info!(session = %next, "Session changed");
                            on_change(next);
                        }
                    }
                }
            }
        });

        SessionPoll {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Publish session transitions through a `watch` channel.
    pub fn subscribe<T: Ticker>(&self, ticker: T) -> SessionSubscription {
        let (sender, receiver) = watch::channel(self.classify());
        let poll = self.poll_for_change(ticker, move |state| {
            sender.send_replace(state);
        });
        SessionSubscription { receiver, poll }
    }
}
