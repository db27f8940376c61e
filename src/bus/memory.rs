use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{Message, Responder, Subscription, Transport, TransportError};

type ReplySlot = Arc<Mutex<Option<oneshot::Sender<Vec<u8>>>>>;

/// In-process bus.
///
/// Every subscriber of a subject receives its own copy of each publish, in
/// publish order. For requests, the first responder to answer wins and later
/// answers are discarded. Useful for tests and for running the worker without
/// a broker.
#[derive(Clone, Default)]
pub struct MemoryBus {
    subjects: Arc<DashMap<String, Vec<mpsc::UnboundedSender<Message>>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every subscriber; their subscriptions end once drained.
    pub fn close(&self) {
        self.subjects.clear();
    }

    fn deliver(&self, subject: &str, mut make: impl FnMut() -> Message) -> usize {
        let Some(mut senders) = self.subjects.get_mut(subject) else {
            return 0;
        };

        senders.retain(|tx| !tx.is_closed());
        senders.iter().filter(|tx| tx.send(make()).is_ok()).count()
    }
}

#[async_trait]
impl Transport for MemoryBus {
    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subjects.entry(subject.to_string()).or_default().push(tx);

        tracing::debug!(subject = %subject, "Memory subscription created");
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<usize, TransportError> {
        Ok(self.deliver(subject, || {
            Message::new(subject.to_string(), payload.clone(), None)
        }))
    }

    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let (tx, rx) = oneshot::channel();
        let slot: ReplySlot = Arc::new(Mutex::new(Some(tx)));

        let delivered = self.deliver(subject, || {
            Message::new(
                subject.to_string(),
                payload.clone(),
                Some(Box::new(MemoryResponder {
                    slot: Arc::clone(&slot),
                }) as Box<dyn Responder>),
            )
        });
        // Only the delivered messages may hold the sender now.
        drop(slot);

        if delivered == 0 {
            return Err(TransportError::NoResponders(subject.to_string()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(TransportError::ReplyClosed),
            Err(_) => Err(TransportError::Timeout(subject.to_string())),
        }
    }
}

struct MemoryResponder {
    slot: ReplySlot,
}

#[async_trait]
impl Responder for MemoryResponder {
    async fn respond(self: Box<Self>, payload: Vec<u8>) -> Result<(), TransportError> {
        let sender = self.slot.lock().await.take();
        match sender {
            Some(tx) => tx.send(payload).map_err(|_| TransportError::ReplyClosed),
            // Another subscriber already answered.
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_in_order() {
        let bus = MemoryBus::new();
        let mut a = bus.subscribe("events").await.unwrap();
        let mut b = bus.subscribe("events").await.unwrap();

        assert_eq!(bus.publish("events", b"1".to_vec()).await.unwrap(), 2);
        assert_eq!(bus.publish("events", b"2".to_vec()).await.unwrap(), 2);

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.next().await.unwrap().payload(), b"1");
            assert_eq!(sub.next().await.unwrap().payload(), b"2");
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = MemoryBus::new();
        assert_eq!(bus.publish("nobody", Vec::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_request_reply() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe("echo").await.unwrap();

        tokio::spawn(async move {
            while let Some(mut msg) = sub.next().await {
                let payload = msg.payload().to_vec();
                msg.respond(payload).await.unwrap();
                assert!(matches!(
                    msg.respond(Vec::new()).await,
                    Err(TransportError::NoReply)
                ));
            }
        });

        let reply = bus
            .request("echo", b"hello".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, b"hello");
    }

    #[tokio::test]
    async fn test_request_without_responders() {
        let bus = MemoryBus::new();
        let result = bus
            .request("missing", Vec::new(), Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(TransportError::NoResponders(_))));
    }

    #[tokio::test]
    async fn test_request_dropped_without_reply() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe("sink").await.unwrap();

        tokio::spawn(async move {
            while let Some(msg) = sub.next().await {
                drop(msg);
            }
        });

        let result = bus
            .request("sink", Vec::new(), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(TransportError::ReplyClosed)));
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe("events").await.unwrap();
        assert_eq!(bus.publish("events", b"a".to_vec()).await.unwrap(), 1);

        bus.close();
        assert!(sub.next().await.is_some());
        assert!(sub.next().await.is_none());
        assert_eq!(bus.publish("events", b"b".to_vec()).await.unwrap(), 0);
    }
}
