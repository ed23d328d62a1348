//! In-process named-signal event bus.
//!
//! Producers enqueue and return immediately; a dispatcher task fans each
//! event out to subscribers on a bounded worker pool. Progress streams skip
//! the subscriber fan-out entirely and only reach the WebSocket sink.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};

use super::catalog::is_progress_event;

/// An emitted event with its capture timestamp.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub name: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Sink for WebSocket broadcast; the server plugs its broadcaster in here.
pub trait WsSink: Send + Sync {
    fn send(&self, event_name: &str, payload: &Value);
}

/// A bus subscriber (shell hooks, webhooks).
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &str;

    /// Does this subscriber want the event? Used to break cycles: the hook
    /// and webhook subscribers both refuse `hook_executed`.
    fn wants(&self, event_name: &str) -> bool;

    /// Deliver one event. Failures are the subscriber's problem; they never
    /// propagate to the producer.
    async fn deliver(&self, event: &EventEnvelope);
}

/// Handle for emitting events. Cheap to clone.
#[derive(Clone)]
pub struct EventHandle {
    tx: mpsc::Sender<EventEnvelope>,
    ws: Option<Arc<dyn WsSink>>,
}

/// Weak emit handle for subscribers that feed events back into the bus.
///
/// Holding a strong `EventHandle` inside a subscriber would keep the queue
/// open forever and stall the dispatcher drain at shutdown.
#[derive(Clone)]
pub struct WeakEventHandle {
    tx: mpsc::WeakSender<EventEnvelope>,
    ws: Option<Arc<dyn WsSink>>,
}

impl WeakEventHandle {
    /// Emit if the bus is still alive; a closed bus drops the event.
    pub fn emit(&self, name: &str, payload: Value) {
        if let Some(tx) = self.tx.upgrade() {
            EventHandle {
                tx,
                ws: self.ws.clone(),
            }
            .emit(name, payload);
        }
    }
}

impl EventHandle {
    pub fn downgrade(&self) -> WeakEventHandle {
        WeakEventHandle {
            tx: self.tx.downgrade(),
            ws: self.ws.clone(),
        }
    }

    /// Emit an event. Never blocks: progress events go straight to the
    /// WebSocket sink; business events are additionally queued for the
    /// dispatcher. A full queue drops the event with a log line.
    pub fn emit(&self, name: &str, payload: Value) {
        if let Some(ws) = &self.ws {
            ws.send(name, &payload);
        }

        if is_progress_event(name) {
            return;
        }

        let envelope = EventEnvelope {
            name: name.to_string(),
            payload,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.tx.try_send(envelope) {
            tracing::error!(event = name, "Failed to enqueue event: {}", e);
        }
    }
}

/// Dispatcher task draining the queue into subscribers.
pub struct EventDispatcher {
    rx: mpsc::Receiver<EventEnvelope>,
    subscribers: Vec<Arc<dyn EventSubscriber>>,
    pool: Arc<Semaphore>,
}

impl EventDispatcher {
    /// Run until the channel closes. Spawn with `tokio::spawn(d.run())`.
    pub async fn run(mut self) {
        tracing::info!(
            subscribers = self.subscribers.len(),
            "Event dispatcher started"
        );

        while let Some(envelope) = self.rx.recv().await {
            let envelope = Arc::new(envelope);
            for subscriber in &self.subscribers {
                if !subscriber.wants(&envelope.name) {
                    continue;
                }
                let subscriber = Arc::clone(subscriber);
                let envelope = Arc::clone(&envelope);
                let pool = Arc::clone(&self.pool);
                tokio::spawn(async move {
                    // Bound concurrent deliveries; ordering across
                    // subscribers is explicitly not guaranteed.
                    let _permit = pool.acquire_owned().await;
                    subscriber.deliver(&envelope).await;
                });
            }
        }

        tracing::info!("Event dispatcher shutting down");
    }
}

/// Assemble the bus: an emit handle plus the dispatcher to spawn.
pub fn create_event_bus(
    subscribers: Vec<Arc<dyn EventSubscriber>>,
    ws: Option<Arc<dyn WsSink>>,
    queue_size: usize,
    pool_size: usize,
) -> (EventHandle, EventDispatcher) {
    let (tx, rx) = mpsc::channel(queue_size);
    let handle = EventHandle { tx, ws };
    let dispatcher = EventDispatcher {
        rx,
        subscribers,
        pool: Arc::new(Semaphore::new(pool_size)),
    };
    (handle, dispatcher)
}

/// Default subscriber pool size.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default queue capacity.
pub const DEFAULT_QUEUE_SIZE: usize = 1024;
