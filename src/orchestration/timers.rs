//! # Timer Service
//!
//! Non-blocking, cancellable timers for delayed re-dispatch and step timeouts. Each
//! timer is a tokio task that sleeps and then emits a [`TimerEvent`] on a channel.
//! Timers are keyed by (instance, kind); scheduling a key that already has a timer
//! replaces it. A timer that already woke when it was cancelled may still deliver its
//! event, so consumers check the event against current instance state.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Backoff elapsed; dispatch the current step again
    Redispatch,
    /// The outstanding attempt did not report in time
    StepTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEvent {
    pub timer_id: Uuid,
    pub instance_id: Uuid,
    pub kind: TimerKind,
    pub step_name: String,
    pub attempt: u32,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug)]
struct ScheduledTimer {
    timer_id: Uuid,
    handle: JoinHandle<()>,
}

type TimerKey = (Uuid, TimerKind);

#[derive(Debug, Clone)]
pub struct TimerService {
    timers: Arc<DashMap<TimerKey, ScheduledTimer>>,
    events: mpsc::UnboundedSender<TimerEvent>,
}

impl TimerService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                timers: Arc::new(DashMap::new()),
                events,
            },
            rx,
        )
    }

    /// Schedule a timer, replacing any existing timer with the same key
    pub fn schedule(
        &self,
        instance_id: Uuid,
        kind: TimerKind,
        step_name: &str,
        attempt: u32,
        delay: Duration,
    ) -> Uuid {
        let timer_id = Uuid::new_v4();
        let event = TimerEvent {
            timer_id,
            instance_id,
            kind,
            step_name: step_name.to_string(),
            attempt,
            scheduled_at: Utc::now(),
        };

        let timers = self.timers.clone();
        let sender = self.events.clone();
        let key = (instance_id, kind);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // A replacement may already own the key
            timers.remove_if(&key, |_, t| t.timer_id == timer_id);

            if let Err(e) = sender.send(event) {
                warn!(instance_id = %instance_id, ?kind, "Failed to send timer event: {}", e);
            }
        });

        if let Some(previous) = self
            .timers
            .insert(key, ScheduledTimer { timer_id, handle })
        {
            previous.handle.abort();
            debug!(instance_id = %instance_id, ?kind, "Replaced existing timer");
        }

        timer_id
    }

    /// Cancel the timer for a key; returns whether one was pending
    pub fn cancel(&self, instance_id: Uuid, kind: TimerKind) -> bool {
        match self.timers.remove(&(instance_id, kind)) {
            Some((_, timer)) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every timer of an instance
    pub fn cancel_all(&self, instance_id: Uuid) -> usize {
        [TimerKind::Redispatch, TimerKind::StepTimeout]
            .into_iter()
            .filter(|kind| self.cancel(instance_id, *kind))
            .count()
    }

    pub fn is_scheduled(&self, instance_id: Uuid, kind: TimerKind) -> bool {
        self.timers.contains_key(&(instance_id, kind))
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    pub fn shutdown(&self) {
        self.timers.retain(|_, timer| {
            timer.handle.abort();
            false
        });
    }
}
