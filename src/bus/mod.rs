//! Message bus abstraction.
//!
//! A [`Transport`] routes payloads by subject. Subscribing yields a
//! [`Subscription`], an ordered stream of [`Message`]s. A message may carry a
//! reply capability which is consumed on first use, so a request can be
//! answered at most once.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;

pub use memory::MemoryBus;
pub use self::redis::RedisBus;

/// Ordered stream of inbound messages for one subject.
pub type Subscription = BoxStream<'static, Message>;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Start receiving messages published on `subject`.
    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError>;

    /// Fire-and-forget publish. Returns the number of receivers reached.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<usize, TransportError>;

    /// Publish with a private reply subject and wait for the first answer.
    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;
}

/// One-shot reply capability attached to a message.
#[async_trait]
pub trait Responder: Send {
    async fn respond(self: Box<Self>, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// Inbound message as delivered by a transport.
pub struct Message {
    subject: String,
    payload: Vec<u8>,
    reply: Option<Box<dyn Responder>>,
}

impl Message {
    pub fn new(subject: String, payload: Vec<u8>, reply: Option<Box<dyn Responder>>) -> Self {
        Self {
            subject,
            payload,
            reply,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Answer the message. Fails with [`TransportError::NoReply`] if the
    /// sender did not ask for a reply or it was already sent.
    pub async fn respond(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        match self.reply.take() {
            Some(reply) => reply.respond(payload).await,
            None => Err(TransportError::NoReply),
        }
    }

    /// Split into the handler-visible request and the reply capability.
    pub fn into_parts(self) -> (Request, Option<Box<dyn Responder>>) {
        (
            Request {
                subject: self.subject,
                payload: self.payload,
            },
            self.reply,
        )
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("subject", &self.subject)
            .field("payload_len", &self.payload.len())
            .field("has_reply", &self.reply.is_some())
            .finish()
    }
}

/// What a handler gets to see of a message.
#[derive(Debug, Clone)]
pub struct Request {
    pub subject: String,
    pub payload: Vec<u8>,
}

impl Request {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(String),

    #[error("Malformed envelope: {0}")]
    Envelope(String),

    #[error("No responders for subject {0}")]
    NoResponders(String),

    #[error("Request on {0} timed out")]
    Timeout(String),

    #[error("Reply channel closed before an answer arrived")]
    ReplyClosed,

    #[error("Message has no reply capability")]
    NoReply,
}

impl From<deadpool_redis::PoolError> for TransportError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        TransportError::Pool(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Envelope(err.to_string())
    }
}
