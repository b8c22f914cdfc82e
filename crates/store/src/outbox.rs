//! Transactional outbox records and their dispatcher.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::EventId;
use domain::PlacementEvent;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::channel::EventChannel;
use crate::error::Result;
use crate::order_store::OrderStore;

/// A placement event as persisted in the outbox.
///
/// `sequence` is assigned by the store at commit time and defines the
/// delivery order. `published_at` stays `None` until every handler has
/// acknowledged the event, so a crash mid-dispatch results in
/// redelivery rather than loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub sequence: i64,
    pub event_id: EventId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    /// Builds an unpublished record from an event. The sequence is a
    /// placeholder until the store assigns one at commit.
    pub fn pending(event: &PlacementEvent) -> Result<Self> {
        Ok(Self {
            sequence: 0,
            event_id: event.event_id,
            event_type: event.event_type().to_string(),
            payload: serde_json::to_value(event)?,
            created_at: Utc::now(),
            published_at: None,
        })
    }

    /// Decodes the stored payload back into an event.
    pub fn event(&self) -> Result<PlacementEvent> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Pumps unpublished outbox records into the event channel.
///
/// Records are delivered in sequence order and marked published only
/// after the channel accepts them. A failed publish stops the pass so
/// per-order event ordering is preserved; the record is retried on the
/// next pass.
pub struct OutboxDispatcher<S: OrderStore> {
    store: S,
    channel: Arc<dyn EventChannel>,
}

impl<S: OrderStore> OutboxDispatcher<S> {
    pub fn new(store: S, channel: Arc<dyn EventChannel>) -> Self {
        Self { store, channel }
    }

    /// Delivers pending records once, returning how many were published.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<usize> {
        let pending = self.store.unpublished_events().await?;
        let mut published = 0;

        for record in pending {
            let event = record.event()?;
            if let Err(error) = self.channel.publish(&event).await {
                tracing::warn!(
                    event_id = %record.event_id,
                    event_type = %record.event_type,
                    %error,
                    "publish not acknowledged, will redeliver"
                );
                break;
            }
            self.store.mark_published(record.event_id).await?;
            metrics::counter!("outbox_events_published_total").increment(1);
            published += 1;
        }

        Ok(published)
    }

    /// Runs passes until no record is published, for tests and draining
    /// cascades of handler-appended events.
    pub async fn drain(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let published = self.run_once().await?;
            if published == 0 {
                return Ok(total);
            }
            total += published;
        }
    }
}

impl<S: OrderStore + 'static> OutboxDispatcher<S> {
    /// Spawns the dispatch loop on the given interval.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(error) = self.run_once().await {
                    tracing::error!(%error, "outbox dispatch pass failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{EventHandler, HandlerError, InMemoryEventChannel};
    use crate::memory::InMemoryStore;
    use async_trait::async_trait;
    use common::OrderId;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingHandler {
        seen: AtomicUsize,
        fail: AtomicBool,
    }

    impl CountingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn name(&self) -> &'static str {
            "counting-handler"
        }

        async fn handle(&self, _event: &PlacementEvent) -> std::result::Result<(), HandlerError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(HandlerError::new(self.name(), "induced failure"));
            }
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_once_marks_acknowledged_events_published() {
        let store = InMemoryStore::new();
        let channel = Arc::new(InMemoryEventChannel::new());
        let handler = CountingHandler::new();
        channel.register(handler.clone());

        let order_id = OrderId::new();
        store
            .append_events(vec![
                PlacementEvent::order_confirmed(order_id),
                PlacementEvent::order_cancelled(order_id),
            ])
            .await
            .unwrap();

        let dispatcher = OutboxDispatcher::new(store.clone(), channel);
        assert_eq!(dispatcher.run_once().await.unwrap(), 2);
        assert_eq!(handler.seen.load(Ordering::SeqCst), 2);
        assert!(store.unpublished_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_publish_leaves_record_for_redelivery() {
        let store = InMemoryStore::new();
        let channel = Arc::new(InMemoryEventChannel::new());
        let handler = CountingHandler::new();
        handler.fail.store(true, Ordering::SeqCst);
        channel.register(handler.clone());

        store
            .append_events(vec![PlacementEvent::order_confirmed(OrderId::new())])
            .await
            .unwrap();

        let dispatcher = OutboxDispatcher::new(store.clone(), channel);
        assert_eq!(dispatcher.run_once().await.unwrap(), 0);
        assert_eq!(store.unpublished_events().await.unwrap().len(), 1);

        // Handler recovers; the same record is delivered on the next pass.
        handler.fail.store(false, Ordering::SeqCst);
        assert_eq!(dispatcher.run_once().await.unwrap(), 1);
        assert!(store.unpublished_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_record_blocks_later_records_in_same_pass() {
        let store = InMemoryStore::new();
        let channel = Arc::new(InMemoryEventChannel::new());
        let handler = CountingHandler::new();
        handler.fail.store(true, Ordering::SeqCst);
        channel.register(handler.clone());

        let order_id = OrderId::new();
        store
            .append_events(vec![
                PlacementEvent::order_confirmed(order_id),
                PlacementEvent::order_cancelled(order_id),
            ])
            .await
            .unwrap();

        let dispatcher = OutboxDispatcher::new(store.clone(), channel);
        dispatcher.run_once().await.unwrap();
        // Neither record may be published out of order.
        assert_eq!(store.unpublished_events().await.unwrap().len(), 2);
    }
}
