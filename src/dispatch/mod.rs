//! Subscription dispatch.
//!
//! Each bound subject gets one task which pulls messages from its
//! subscription and runs the handler on them one at a time. A message is
//! handled and answered before the next one is pulled, so side effects keep
//! delivery order within a subject, while different subjects run
//! concurrently.
//!
//! Handlers return the reply body instead of replying themselves; the
//! dispatcher owns the reply capability and answers every request exactly
//! once, with a failure acknowledgement when the handler errors or panics.

pub mod registry;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::bus::{Message, Request, Subscription, Transport, TransportError};
use crate::error::{failure_reply, HandlerResult};

pub use registry::{Binding, Registry, Route};

#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, request: Request) -> HandlerResult;
}

/// Handler that only needs the message.
pub struct ContextFree<F> {
    f: F,
}

impl<F> ContextFree<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Handler for ContextFree<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, request: Request) -> HandlerResult {
        (self.f)(request).await
    }
}

/// Handler that also receives a shared context, captured once at bind time
/// and passed unchanged to every invocation.
pub struct ContextBound<C, F> {
    context: Arc<C>,
    f: F,
}

impl<C, F> ContextBound<C, F> {
    pub fn new(context: Arc<C>, f: F) -> Self {
        Self { context, f }
    }
}

#[async_trait]
impl<C, F, Fut> Handler for ContextBound<C, F>
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, request: Request) -> HandlerResult {
        (self.f)(Arc::clone(&self.context), request).await
    }
}

/// Drain `subscription`, dispatching every message to `handler` in order.
/// Returns once the subscription ends.
pub async fn run_subscription(
    subject: String,
    mut subscription: Subscription,
    handler: Arc<dyn Handler>,
) {
    tracing::info!(subject = %subject, "Dispatch loop started");

    while let Some(message) = subscription.next().await {
        dispatch_one(handler.as_ref(), message).await;
    }

    tracing::warn!(subject = %subject, "Subscription ended");
}

/// Handle one message and send exactly one reply if the sender asked for it.
pub async fn dispatch_one(handler: &dyn Handler, message: Message) {
    let (request, reply) = message.into_parts();
    let span = tracing::info_span!("dispatch", subject = %request.subject);

    async move {
        let body = invoke(handler, request).await;

        match reply {
            Some(reply) => {
                let payload = match serde_json::to_vec(&body) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode reply");
                        return;
                    }
                };
                if let Err(e) = reply.respond(payload).await {
                    tracing::warn!(error = %e, "Failed to send reply");
                }
            }
            None => tracing::debug!("Message has no reply subject, dropping response"),
        }
    }
    .instrument(span)
    .await
}

async fn invoke(handler: &dyn Handler, request: Request) -> Value {
    match AssertUnwindSafe(handler.call(request)).catch_unwind().await {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => {
            tracing::error!(code = e.code(), error = %e, "Handler failed");
            e.to_reply()
        }
        Err(_) => {
            tracing::error!("Handler panicked");
            failure_reply("internal_error", "handler panicked")
        }
    }
}

/// Subscribe every binding in `registry` and spawn its dispatch loop.
///
/// All subscriptions are established before any loop is spawned, so a
/// subscribe failure aborts startup without leaving half the subjects live.
/// Each task yields its subject when its subscription ends.
pub async fn spawn_all(
    transport: &dyn Transport,
    registry: &Registry,
) -> Result<JoinSet<String>, TransportError> {
    let mut subscriptions = Vec::with_capacity(registry.bindings().len());
    for binding in registry.bindings() {
        let subject = binding.route.subject();
        let subscription = transport.subscribe(subject).await?;
        subscriptions.push((subject, subscription, Arc::clone(&binding.handler)));
    }

    let mut tasks = JoinSet::new();
    for (subject, subscription, handler) in subscriptions {
        tasks.spawn(async move {
            run_subscription(subject.to_string(), subscription, handler).await;
            subject.to_string()
        });
    }

    Ok(tasks)
}
