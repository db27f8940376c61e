//! Redis pub/sub transport.
//!
//! Subjects map one-to-one onto Redis channels. Every published value is a
//! JSON envelope `{"reply_to": <subject or null>, "data": <base64 payload>}`;
//! a request subscribes to a private `_INBOX.<uuid>` channel first, then
//! publishes with `reply_to` pointing at it.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use deadpool_redis::{Config as RedisConfig, Pool, Runtime};
use futures::StreamExt;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Message, Responder, Subscription, Transport, TransportError};

const INBOX_PREFIX: &str = "_INBOX";

#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(default)]
    reply_to: Option<String>,
    data: String,
}

/// Redis-backed bus. Publishing goes through a pooled connection, each
/// subscription holds its own dedicated pub/sub connection.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    pool: Pool,
}

impl RedisBus {
    pub fn connect(url: &str) -> Result<Self, TransportError> {
        let client = redis::Client::open(url)?;
        let pool = RedisConfig::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| TransportError::Pool(format!("Failed to create Redis pool: {}", e)))?;

        Ok(Self { client, pool })
    }

    pub async fn health_check(&self) -> Result<bool, TransportError> {
        let mut conn = self.pool.get().await?;

        let pong: String = redis::cmd("PING").query_async(&mut *conn).await?;

        Ok(pong == "PONG")
    }
}

#[async_trait]
impl Transport for RedisBus {
    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(subject).await?;

        tracing::info!(subject = %subject, "Subscribed to Redis channel");

        let pool = self.pool.clone();
        let stream = pubsub
            .into_on_message()
            .filter_map(move |msg| futures::future::ready(decode_message(&pool, &msg)));

        Ok(stream.boxed())
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<usize, TransportError> {
        publish_envelope(&self.pool, subject, None, &payload).await
    }

    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let inbox = format!("{}.{}", INBOX_PREFIX, Uuid::new_v4().simple());
        let mut replies = self.subscribe(&inbox).await?;

        let receivers = publish_envelope(&self.pool, subject, Some(&inbox), &payload).await?;
        if receivers == 0 {
            return Err(TransportError::NoResponders(subject.to_string()));
        }

        match tokio::time::timeout(timeout, replies.next()).await {
            Ok(Some(reply)) => Ok(reply.payload().to_vec()),
            Ok(None) => Err(TransportError::ReplyClosed),
            Err(_) => Err(TransportError::Timeout(subject.to_string())),
        }
    }
}

struct RedisResponder {
    pool: Pool,
    reply_to: String,
}

#[async_trait]
impl Responder for RedisResponder {
    async fn respond(self: Box<Self>, payload: Vec<u8>) -> Result<(), TransportError> {
        publish_envelope(&self.pool, &self.reply_to, None, &payload).await?;
        Ok(())
    }
}

async fn publish_envelope(
    pool: &Pool,
    subject: &str,
    reply_to: Option<&str>,
    payload: &[u8],
) -> Result<usize, TransportError> {
    let body = encode_envelope(reply_to, payload)?;
    let mut conn = pool.get().await?;

    let receivers: usize = conn.publish(subject, body).await?;

    tracing::trace!(subject = %subject, receivers, "Published to Redis channel");
    Ok(receivers)
}

fn encode_envelope(reply_to: Option<&str>, payload: &[u8]) -> Result<String, TransportError> {
    let envelope = WireEnvelope {
        reply_to: reply_to.map(str::to_string),
        data: BASE64.encode(payload),
    };
    Ok(serde_json::to_string(&envelope)?)
}

fn decode_envelope(raw: &[u8]) -> Result<(Option<String>, Vec<u8>), TransportError> {
    let envelope: WireEnvelope = serde_json::from_slice(raw)?;
    let payload = BASE64
        .decode(envelope.data.as_bytes())
        .map_err(|e| TransportError::Envelope(format!("invalid base64 data: {}", e)))?;

    Ok((envelope.reply_to, payload))
}

fn decode_message(pool: &Pool, msg: &redis::Msg) -> Option<Message> {
    let subject = msg.get_channel_name().to_string();

    match decode_envelope(msg.get_payload_bytes()) {
        Ok((reply_to, payload)) => {
            let reply = reply_to.map(|reply_to| {
                Box::new(RedisResponder {
                    pool: pool.clone(),
                    reply_to,
                }) as Box<dyn Responder>
            });
            Some(Message::new(subject, payload, reply))
        }
        Err(e) => {
            // No reply subject can be recovered from a broken envelope.
            tracing::warn!(subject = %subject, error = %e, "Dropping malformed bus message");
            None
        }
    }
}
