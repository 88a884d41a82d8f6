pub mod events;

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use crate::broadcast::events::StreamEvent;
use crate::error::{Error, Result};
use crate::observability::metrics::{ACTIVE_SUBSCRIBERS, DELIVERY_FAILURES};
use crate::types::ids::SubscriberId;
use crate::types::price::PricePoint;

/// Connection-side half of a subscriber, supplied by the transport layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriberTransport: Send + Sync {
    async fn send(&self, event: &StreamEvent) -> Result<()>;
    async fn close(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberHandle {
    id: SubscriberId,
}

impl SubscriberHandle {
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Fans events out to every live subscriber.
///
/// Sends run concurrently and each is bounded by `send_timeout`. A subscriber
/// whose send fails or times out is removed and closed; the rest still get
/// the event.
pub struct Broadcaster {
    subscribers: DashMap<SubscriberId, Arc<dyn SubscriberTransport>>,
    send_timeout: Duration,
}

impl Broadcaster {
    pub fn new(send_timeout: Duration) -> Self {
        Broadcaster {
            subscribers: DashMap::new(),
            send_timeout,
        }
    }

    /// Registers the connection, then replays `latest` to it right away.
    pub async fn subscribe(
        &self,
        transport: Arc<dyn SubscriberTransport>,
        latest: Option<PricePoint>,
    ) -> Result<SubscriberHandle> {
        let id = SubscriberId::new();
        self.subscribers.insert(id, transport.clone());
        ACTIVE_SUBSCRIBERS.set(self.subscribers.len() as i64);
        tracing::info!("Subscriber {} connected. Total subscribers: {}", id, self.subscribers.len());

        if let Some(point) = latest {
            let event = StreamEvent::PriceUpdate(point);
            if let Err(e) = self.deliver(id, transport.as_ref(), &event).await {
                self.drop_subscriber(id, &e).await;
                return Err(e);
            }
        }

        Ok(SubscriberHandle { id })
    }

    /// Idempotent. Returns whether the subscriber was still registered.
    pub async fn unsubscribe(&self, handle: SubscriberHandle) -> bool {
        match self.subscribers.remove(&handle.id) {
            Some((_, transport)) => {
                ACTIVE_SUBSCRIBERS.set(self.subscribers.len() as i64);
                transport.close().await;
                tracing::info!(
                    "Subscriber {} disconnected. Total subscribers: {}",
                    handle.id,
                    self.subscribers.len()
                );
                true
            }
            None => false,
        }
    }

    pub async fn broadcast(&self, event: &StreamEvent) -> BroadcastReport {
        // Snapshot so no map guard is held across a send
        let targets: Vec<(SubscriberId, Arc<dyn SubscriberTransport>)> = self.subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let results = join_all(targets.iter().map(|(id, transport)| async move {
            (*id, self.deliver(*id, transport.as_ref(), event).await)
        }))
        .await;

        let mut report = BroadcastReport::default();
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    self.drop_subscriber(id, &e).await;
                    report.dropped += 1;
                }
            }
        }

        tracing::debug!(
            "Broadcast {}: delivered={}, dropped={}",
            event.kind(),
            report.delivered,
            report.dropped
        );
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_subscribed(&self, handle: SubscriberHandle) -> bool {
        self.subscribers.contains_key(&handle.id)
    }

    async fn deliver(
        &self,
        id: SubscriberId,
        transport: &dyn SubscriberTransport,
        event: &StreamEvent,
    ) -> Result<()> {
        match tokio::time::timeout(self.send_timeout, transport.send(event)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::delivery(id, e.to_string())),
            Err(_) => Err(Error::delivery(id, format!("send timed out after {:?}", self.send_timeout))),
        }
    }

    async fn drop_subscriber(&self, id: SubscriberId, cause: &Error) {
        DELIVERY_FAILURES.inc();
        if let Some((_, transport)) = self.subscribers.remove(&id) {
            ACTIVE_SUBSCRIBERS.set(self.subscribers.len() as i64);
            tracing::warn!("Dropping subscriber {}: {}", id, cause);
            transport.close().await;
        }
    }
}
