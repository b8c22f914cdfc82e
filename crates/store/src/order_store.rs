//! The order store trait: atomic order writes plus outbox access.

use async_trait::async_trait;
use common::{EventId, OrderId, Version};
use domain::{Order, PlacementEvent, Product};

use crate::error::Result;
use crate::outbox::OutboxRecord;

/// Persistence for orders, products and the transactional outbox.
///
/// Each `commit_*` method is a single atomic unit: either every write in
/// it lands (including the outbox appends) or none do.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts or replaces a product record.
    async fn upsert_product(&self, product: Product) -> Result<()>;

    /// Reads an order by ID.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Atomically inserts the order, applies the compare-and-swap stock
    /// decrement against `expected_version`, and appends the events to
    /// the outbox. Returns the product's new version.
    async fn commit_placement(
        &self,
        order: Order,
        expected_version: Version,
        events: Vec<PlacementEvent>,
    ) -> Result<Version>;

    /// Atomically upserts the order and appends the events to the outbox.
    async fn commit_order_update(&self, order: Order, events: Vec<PlacementEvent>) -> Result<()>;

    /// Appends events to the outbox with no accompanying domain write.
    async fn append_events(&self, events: Vec<PlacementEvent>) -> Result<()>;

    /// Returns unpublished outbox records in append order.
    async fn unpublished_events(&self) -> Result<Vec<OutboxRecord>>;

    /// Marks an outbox record as published after handler acknowledgement.
    async fn mark_published(&self, event_id: EventId) -> Result<()>;

    /// Inserts or replaces the durable saga record for an order.
    ///
    /// The payload is an opaque JSON document owned by the orchestrator;
    /// the store only keys it by order.
    async fn save_saga(&self, order_id: OrderId, saga: serde_json::Value) -> Result<()>;

    /// Reads the durable saga record for an order, if one exists.
    async fn load_saga(&self, order_id: OrderId) -> Result<Option<serde_json::Value>>;
}
