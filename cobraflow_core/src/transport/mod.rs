//! Message transport between the orchestrator and solver workers
//!
//! Requests, results and cancellations travel over one topic exchange. Each published message
//! carries a correlation id; requests get a fresh one, results and cancellations reuse the id
//! of the request they answer.

pub mod memory;
pub mod routing;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::jobs::messages::CancelRequest;
use crate::jobs::CorrelationId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("No queue is bound for routing key {0}")]
    Unroutable(String),
    #[error("Queue {0} does not exist")]
    UnknownQueue(String),
    #[error("Queue {0} already has a consumer")]
    AlreadyConsumed(String),
    #[error("Unable to encode message body: {0}")]
    Encoding(String),
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

/// A delivered message
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub routing_key: String,
    pub correlation_id: CorrelationId,
    pub body: Value,
    pub published_at: DateTime<Utc>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a new request, returning the correlation id assigned to it
    async fn publish(&self, routing_key: &str, body: Value) -> Result<CorrelationId, TransportError>;

    /// Publish a message answering the request with `correlation_id`
    async fn publish_correlated(
        &self,
        routing_key: &str,
        correlation_id: CorrelationId,
        body: Value,
    ) -> Result<(), TransportError>;

    /// Start consuming a queue
    fn subscribe(&self, queue: &str) -> Result<Subscription, TransportError>;

    /// Ask workers to drop the request with `correlation_id`
    ///
    /// Delivery is at most once, a worker that already finished the request ignores it.
    async fn revoke(&self, control_key: &str, correlation_id: CorrelationId) -> Result<(), TransportError> {
        let body = serde_json::to_value(CancelRequest { correlation_id })
            .map_err(|err| TransportError::Encoding(err.to_string()))?;
        self.publish_correlated(control_key, correlation_id, body).await
    }
}

/// Stream of envelopes delivered to one queue
#[derive(Debug)]
pub struct Subscription {
    queue: String,
    receiver: UnboundedReceiver<Envelope>,
}

impl Subscription {
    pub fn new(queue: impl Into<String>, receiver: UnboundedReceiver<Envelope>) -> Self {
        Self {
            queue: queue.into(),
            receiver,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Wait for the next envelope, `None` once the transport is shut down and the queue is empty
    pub async fn next(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    /// The next envelope if one is already queued
    pub fn try_next(&mut self) -> Option<Envelope> {
        match self.receiver.try_recv() {
            Ok(envelope) => Some(envelope),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Every envelope already queued
    pub fn drain(&mut self) -> Vec<Envelope> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}
