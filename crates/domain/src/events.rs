//! Placement event schema.
//!
//! Every consequential fact about an order's placement is recorded as a
//! [`PlacementEvent`] appended to the transactional outbox. Delivery is
//! at-least-once; consumers deduplicate by `event_id`.

use chrono::{DateTime, Utc};
use common::{EventId, OrderId, ReservationId, UserId};
use serde::{Deserialize, Serialize};

use crate::order::OrderStatus;
use crate::value_objects::{Money, ProductId, Quantity};

/// The kind-specific payload of a placement event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventKind {
    /// A flash-sale order was accepted and handed to the saga.
    OrderCreationRequested {
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    },

    /// The saga asks the reservation service to place a hold.
    ReservationRequested {
        product_id: ProductId,
        quantity: Quantity,
    },

    /// Stock was held for the order.
    InventoryReserved {
        product_id: ProductId,
        quantity: Quantity,
        reservation_id: ReservationId,
    },

    /// The hold could not be placed.
    InventoryReservationFailed {
        product_id: ProductId,
        quantity: Quantity,
        reason: String,
    },

    /// The saga asks the payment adapter to charge the order total.
    ChargeRequested { amount: Money },

    /// The charge settled.
    PaymentSucceeded { amount: Money },

    /// The charge was declined or the gateway stayed unavailable.
    PaymentFailed { amount: Money, reason: String },

    /// The saga asks the reservation service to release a hold.
    ReservationReleaseRequested { reservation_id: ReservationId },

    /// A hold aged past its TTL and its stock was returned.
    ReservationExpired {
        reservation_id: ReservationId,
        product_id: ProductId,
        quantity: Quantity,
    },

    /// The order reached its confirmed terminal status.
    OrderConfirmed { status: OrderStatus },

    /// The order reached its cancelled terminal status.
    OrderCancelled { status: OrderStatus },
}

/// A placement event as appended to the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementEvent {
    pub event_id: EventId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl PlacementEvent {
    fn new(order_id: OrderId, kind: EventKind) -> Self {
        Self {
            event_id: EventId::new(),
            order_id,
            occurred_at: Utc::now(),
            kind,
        }
    }

    /// Returns the event type name used for outbox routing.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            EventKind::OrderCreationRequested { .. } => "OrderCreationRequested",
            EventKind::ReservationRequested { .. } => "ReservationRequested",
            EventKind::InventoryReserved { .. } => "InventoryReserved",
            EventKind::InventoryReservationFailed { .. } => "InventoryReservationFailed",
            EventKind::ChargeRequested { .. } => "ChargeRequested",
            EventKind::PaymentSucceeded { .. } => "PaymentSucceeded",
            EventKind::PaymentFailed { .. } => "PaymentFailed",
            EventKind::ReservationReleaseRequested { .. } => "ReservationReleaseRequested",
            EventKind::ReservationExpired { .. } => "ReservationExpired",
            EventKind::OrderConfirmed { .. } => "OrderConfirmed",
            EventKind::OrderCancelled { .. } => "OrderCancelled",
        }
    }

    pub fn order_creation_requested(
        order_id: OrderId,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Self {
        Self::new(
            order_id,
            EventKind::OrderCreationRequested {
                user_id,
                product_id,
                quantity,
            },
        )
    }

    pub fn reservation_requested(
        order_id: OrderId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Self {
        Self::new(
            order_id,
            EventKind::ReservationRequested {
                product_id,
                quantity,
            },
        )
    }

    pub fn inventory_reserved(
        order_id: OrderId,
        product_id: ProductId,
        quantity: Quantity,
        reservation_id: ReservationId,
    ) -> Self {
        Self::new(
            order_id,
            EventKind::InventoryReserved {
                product_id,
                quantity,
                reservation_id,
            },
        )
    }

    pub fn inventory_reservation_failed(
        order_id: OrderId,
        product_id: ProductId,
        quantity: Quantity,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            order_id,
            EventKind::InventoryReservationFailed {
                product_id,
                quantity,
                reason: reason.into(),
            },
        )
    }

    pub fn charge_requested(order_id: OrderId, amount: Money) -> Self {
        Self::new(order_id, EventKind::ChargeRequested { amount })
    }

    pub fn payment_succeeded(order_id: OrderId, amount: Money) -> Self {
        Self::new(order_id, EventKind::PaymentSucceeded { amount })
    }

    pub fn payment_failed(order_id: OrderId, amount: Money, reason: impl Into<String>) -> Self {
        Self::new(
            order_id,
            EventKind::PaymentFailed {
                amount,
                reason: reason.into(),
            },
        )
    }

    pub fn reservation_release_requested(
        order_id: OrderId,
        reservation_id: ReservationId,
    ) -> Self {
        Self::new(
            order_id,
            EventKind::ReservationReleaseRequested { reservation_id },
        )
    }

    pub fn reservation_expired(
        order_id: OrderId,
        reservation_id: ReservationId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Self {
        Self::new(
            order_id,
            EventKind::ReservationExpired {
                reservation_id,
                product_id,
                quantity,
            },
        )
    }

    pub fn order_confirmed(order_id: OrderId) -> Self {
        Self::new(
            order_id,
            EventKind::OrderConfirmed {
                status: OrderStatus::Confirmed,
            },
        )
    }

    pub fn order_cancelled(order_id: OrderId) -> Self {
        Self::new(
            order_id,
            EventKind::OrderCancelled {
                status: OrderStatus::Cancelled,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::Currency;

    #[test]
    fn event_type_matches_kind() {
        let order_id = OrderId::new();
        let event = PlacementEvent::reservation_requested(
            order_id,
            ProductId::new("SKU-001"),
            Quantity::new(2).unwrap(),
        );
        assert_eq!(event.event_type(), "ReservationRequested");
        assert_eq!(event.order_id, order_id);
    }

    #[test]
    fn events_get_unique_ids() {
        let order_id = OrderId::new();
        let a = PlacementEvent::order_confirmed(order_id);
        let b = PlacementEvent::order_confirmed(order_id);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn serialization_is_tagged_by_type() {
        let event = PlacementEvent::charge_requested(
            OrderId::new(),
            Money::new(5000, Currency::Usd),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ChargeRequested");
        assert_eq!(json["data"]["amount"]["minor_units"], 5000);

        let back: PlacementEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn confirmed_event_carries_terminal_status() {
        let event = PlacementEvent::order_confirmed(OrderId::new());
        assert!(matches!(
            event.kind,
            EventKind::OrderConfirmed {
                status: OrderStatus::Confirmed
            }
        ));
    }
}
