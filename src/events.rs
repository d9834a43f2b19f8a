//! In-process event bus.
//!
//! Typed publish/subscribe for state-change notifications. Each subscriber
//! owns a bounded queue; when a slow subscriber overflows, the oldest event
//! for that subscriber is dropped and a counter ticks. Publication order is
//! preserved per subscriber. The bus never blocks a publisher.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::alerts::Alert;
use crate::backlog::StatusCounts;
use crate::error::classification::ClassifiedError;
use crate::session::SessionOutcome;

/// Live scheduler state exposed over telemetry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub current_feature_id: Option<String>,
    pub current_session_id: Option<String>,
    pub context_percent: f64,
    pub counts: StatusCounts,
    pub sessions_run: u32,
}

/// Every event the harness publishes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum HarnessEvent {
    #[serde(rename = "status.updated")]
    StatusUpdated(StatusSnapshot),
    #[serde(rename = "backlog.updated")]
    BacklogUpdated { counts: StatusCounts },
    #[serde(rename = "feature.updated")]
    FeatureUpdated { feature_id: String, status: String },
    #[serde(rename = "session.started")]
    SessionStarted {
        session_id: String,
        feature_id: Option<String>,
        agent_kind: String,
        model: String,
    },
    #[serde(rename = "session.ended")]
    SessionEnded {
        session_id: String,
        feature_id: Option<String>,
        outcome: SessionOutcome,
        turns: u32,
        cost_usd: f64,
        error: Option<ClassifiedError>,
    },
    #[serde(rename = "cost.update")]
    CostUpdate {
        session_id: String,
        session_cost_usd: f64,
        total_cost_usd: f64,
    },
    #[serde(rename = "progress.update")]
    ProgressUpdate { entry: String },
    #[serde(rename = "alert.created")]
    AlertCreated(Alert),
}

impl HarnessEvent {
    /// Stable event name used on the push channel.
    pub fn name(&self) -> &'static str {
        match self {
            HarnessEvent::StatusUpdated(_) => "status.updated",
            HarnessEvent::BacklogUpdated { .. } => "backlog.updated",
            HarnessEvent::FeatureUpdated { .. } => "feature.updated",
            HarnessEvent::SessionStarted { .. } => "session.started",
            HarnessEvent::SessionEnded { .. } => "session.ended",
            HarnessEvent::CostUpdate { .. } => "cost.update",
            HarnessEvent::ProgressUpdate { .. } => "progress.update",
            HarnessEvent::AlertCreated(_) => "alert.created",
        }
    }

    /// Wire envelope: `{event, data, timestamp}`.
    pub fn envelope(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Some(obj) = value.as_object_mut() {
            obj.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
        }
        value
    }
}

struct SubQueue {
    buf: Mutex<VecDeque<HarnessEvent>>,
    notify: tokio::sync::Notify,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
}

/// Receiving half of a subscription.
pub struct EventReceiver {
    queue: Arc<SubQueue>,
}

impl EventReceiver {
    /// Next event in publication order. `None` only after `close`.
    pub async fn recv(&mut self) -> Option<HarnessEvent> {
        loop {
            {
                let mut buf = match self.queue.buf.lock() {
                    Ok(b) => b,
                    Err(_) => return None,
                };
                if let Some(event) = buf.pop_front() {
                    return Some(event);
                }
            }
            if self.queue.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Non-blocking variant.
    pub fn try_recv(&mut self) -> Option<HarnessEvent> {
        self.queue.buf.lock().ok()?.pop_front()
    }

    /// Events dropped from this subscriber's queue by overflow.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::SeqCst)
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        self.queue.closed.store(true, Ordering::SeqCst);
    }
}

/// The shared bus handle. Cloning is cheap.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Arc<SubQueue>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe with a bounded per-subscriber buffer.
    pub fn subscribe(&self, capacity: usize) -> EventReceiver {
        let queue = Arc::new(SubQueue {
            buf: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: tokio::sync::Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        if let Ok(mut subs) = self.subscribers.lock() {
            // Prune subscribers whose receivers are gone.
            subs.retain(|q| !q.closed.load(Ordering::SeqCst));
            subs.push(Arc::clone(&queue));
        }
        EventReceiver { queue }
    }

    /// Deliver to every live subscriber. Oldest-drop on overflow.
    pub fn publish(&self, event: HarnessEvent) {
        let Ok(subs) = self.subscribers.lock() else {
            return;
        };
        for queue in subs.iter() {
            if queue.closed.load(Ordering::SeqCst) {
                continue;
            }
            if let Ok(mut buf) = queue.buf.lock() {
                if buf.len() >= queue.capacity {
                    buf.pop_front();
                    queue.dropped.fetch_add(1, Ordering::SeqCst);
                }
                buf.push_back(event.clone());
            }
            queue.notify.notify_one();
        }
    }

    /// Total events dropped across current subscribers, for telemetry.
    pub fn dropped_total(&self) -> u64 {
        self.subscribers
            .lock()
            .map(|subs| subs.iter().map(|q| q.dropped.load(Ordering::SeqCst)).sum())
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|subs| {
                subs.iter()
                    .filter(|q| !q.closed.load(Ordering::SeqCst))
                    .count()
            })
            .unwrap_or(0)
    }
}
