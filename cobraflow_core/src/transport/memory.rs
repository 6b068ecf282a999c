//! In-process broker with one unbounded channel per bound queue
//!
//! Messages published before a queue is consumed are buffered until the consumer subscribes.
//! A transport built with [`InMemoryTransport::with_recording`] also keeps every published
//! envelope in a log so callers can inspect traffic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::jobs::CorrelationId;
use crate::transport::routing::RoutingTable;
use crate::transport::{Envelope, Subscription, Transport, TransportError};

struct Queue {
    sender: Option<UnboundedSender<Envelope>>,
    receiver: Option<UnboundedReceiver<Envelope>>,
}

pub struct InMemoryTransport {
    routing: RoutingTable,
    queues: DashMap<String, Queue>,
    recording: Option<Mutex<Vec<Envelope>>>,
    online: AtomicBool,
}

impl InMemoryTransport {
    /// Create a broker with one queue per binding in `routing`
    pub fn new(routing: RoutingTable) -> Self {
        let queues = DashMap::new();
        for binding in routing.bindings() {
            queues.entry(binding.queue.clone()).or_insert_with(|| {
                let (sender, receiver) = unbounded_channel();
                Queue {
                    sender: Some(sender),
                    receiver: Some(receiver),
                }
            });
        }
        Self {
            routing,
            queues,
            recording: None,
            online: AtomicBool::new(true),
        }
    }

    /// Keep a log of every envelope published from now on
    ///
    /// The log grows with the traffic, request bodies included.
    pub fn with_recording(mut self) -> Self {
        self.recording = Some(Mutex::new(Vec::new()));
        self
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    /// Simulate losing (or regaining) the broker connection
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Close every queue, consumers see the end of their stream once it is drained
    pub fn shutdown(&self) {
        self.set_online(false);
        for mut queue in self.queues.iter_mut() {
            queue.sender = None;
        }
    }

    /// Every envelope published so far, oldest first, empty unless recording
    pub fn published(&self) -> Vec<Envelope> {
        self.log().map(|log| log.clone()).unwrap_or_default()
    }

    /// Recorded envelopes published with `routing_key`
    pub fn published_to(&self, routing_key: &str) -> Vec<Envelope> {
        self.published()
            .into_iter()
            .filter(|e| e.routing_key == routing_key)
            .collect()
    }

    fn log(&self) -> Option<MutexGuard<'_, Vec<Envelope>>> {
        // The log is append only, a poisoned lock still holds complete entries
        self.recording
            .as_ref()
            .map(|log| log.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn deliver(&self, envelope: Envelope) -> Result<(), TransportError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable(format!(
                "exchange {} is offline",
                self.routing.exchange()
            )));
        }
        let targets = self.routing.route(&envelope.routing_key);
        if targets.is_empty() {
            return Err(TransportError::Unroutable(envelope.routing_key));
        }
        for target in targets {
            let Some(queue) = self.queues.get(target) else {
                continue;
            };
            match &queue.sender {
                Some(sender) => {
                    if sender.send(envelope.clone()).is_err() {
                        warn!(queue = %target, routing_key = %envelope.routing_key, "queue consumer is gone, message dropped");
                    }
                }
                None => warn!(queue = %target, "queue is closed, message dropped"),
            }
        }
        debug!(
            routing_key = %envelope.routing_key,
            correlation_id = %envelope.correlation_id,
            "published"
        );
        if let Some(mut log) = self.log() {
            log.push(envelope);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(&self, routing_key: &str, body: Value) -> Result<CorrelationId, TransportError> {
        let correlation_id = CorrelationId::new();
        self.publish_correlated(routing_key, correlation_id, body)
            .await
            .map(|_| correlation_id)
    }

    async fn publish_correlated(
        &self,
        routing_key: &str,
        correlation_id: CorrelationId,
        body: Value,
    ) -> Result<(), TransportError> {
        self.deliver(Envelope {
            routing_key: routing_key.to_string(),
            correlation_id,
            body,
            published_at: Utc::now(),
        })
    }

    fn subscribe(&self, queue: &str) -> Result<Subscription, TransportError> {
        let mut slot = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::UnknownQueue(queue.to_string()))?;
        let receiver = slot
            .receiver
            .take()
            .ok_or_else(|| TransportError::AlreadyConsumed(queue.to_string()))?;
        Ok(Subscription::new(queue, receiver))
    }
}
