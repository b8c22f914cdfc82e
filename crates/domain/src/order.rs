//! The order aggregate and its lifecycle.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::product::Product;
use crate::value_objects::{InvalidQuantity, Money, MoneyError, ProductId, Quantity};

/// The lifecycle status of an order.
///
/// ```text
/// Pending ──┬──► Confirmed
///           └──► Cancelled
/// ```
///
/// `Confirmed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order accepted but placement has not finished yet.
    #[default]
    Pending,

    /// Stock decremented and payment settled (terminal).
    Confirmed,

    /// Placement failed or was compensated (terminal).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the order can be confirmed.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Cancelled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    /// Parses a status name previously produced by [`OrderStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(OrderStatus::Pending),
            "Confirmed" => Some(OrderStatus::Confirmed),
            "Cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors from order creation and lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error(transparent)]
    InvalidQuantity(#[from] InvalidQuantity),

    #[error("insufficient stock for {product_id}: available {available}, requested {requested}")]
    OutOfStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    #[error("cannot {action} a {status} order")]
    InvalidStateTransition {
        status: OrderStatus,
        action: &'static str,
    },

    #[error("price computation failed: {0}")]
    Price(#[from] MoneyError),
}

/// An order for a single product.
///
/// Orders are created `Pending` with the total price captured at creation
/// time, then move to exactly one terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    order_id: OrderId,
    user_id: UserId,
    product_id: ProductId,
    quantity: Quantity,
    total_price: Money,
    status: OrderStatus,
    created_at: DateTime<Utc>,
}

impl Order {
    /// Validates the request against the product and creates a pending order.
    ///
    /// The stock check here is advisory: the ledger's compare-and-swap is
    /// the authoritative check at commit time.
    pub fn create(
        user_id: UserId,
        quantity: u32,
        product: &Product,
    ) -> Result<Self, OrderError> {
        let quantity = Quantity::new(quantity)?;

        if !product.can_cover(quantity) {
            return Err(OrderError::OutOfStock {
                product_id: product.product_id.clone(),
                available: product.stock,
                requested: quantity.get(),
            });
        }

        let total_price = product.price.multiply(quantity)?;

        Ok(Self {
            order_id: OrderId::new(),
            user_id,
            product_id: product.product_id.clone(),
            quantity,
            total_price,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        })
    }

    /// Reconstructs an order from stored fields.
    pub fn from_parts(
        order_id: OrderId,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
        total_price: Money,
        status: OrderStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            user_id,
            product_id,
            quantity,
            total_price,
            status,
            created_at,
        }
    }

    /// Confirms a pending order.
    pub fn confirm(&mut self) -> Result<(), OrderError> {
        if !self.status.can_confirm() {
            return Err(OrderError::InvalidStateTransition {
                status: self.status,
                action: "confirm",
            });
        }
        self.status = OrderStatus::Confirmed;
        Ok(())
    }

    /// Cancels a pending order.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidStateTransition {
                status: self.status,
                action: "cancel",
            });
        }
        self.status = OrderStatus::Cancelled;
        Ok(())
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::Currency;

    fn widget(stock: u32) -> Product {
        Product::new("SKU-001", stock, Money::new(2999, Currency::Usd))
    }

    #[test]
    fn create_captures_total_price() {
        let order = Order::create(UserId::new(), 3, &widget(10)).unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.total_price(), Money::new(8997, Currency::Usd));
        assert_eq!(order.quantity().get(), 3);
    }

    #[test]
    fn create_rejects_zero_quantity() {
        let result = Order::create(UserId::new(), 0, &widget(10));
        assert!(matches!(result, Err(OrderError::InvalidQuantity(_))));
    }

    #[test]
    fn create_rejects_quantity_above_stock() {
        let result = Order::create(UserId::new(), 11, &widget(10));
        assert!(matches!(
            result,
            Err(OrderError::OutOfStock {
                available: 10,
                requested: 11,
                ..
            })
        ));
    }

    #[test]
    fn confirm_moves_pending_to_confirmed() {
        let mut order = Order::create(UserId::new(), 1, &widget(10)).unwrap();
        order.confirm().unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
    }

    #[test]
    fn terminal_statuses_reject_further_transitions() {
        let mut order = Order::create(UserId::new(), 1, &widget(10)).unwrap();
        order.cancel().unwrap();

        assert!(matches!(
            order.confirm(),
            Err(OrderError::InvalidStateTransition {
                status: OrderStatus::Cancelled,
                action: "confirm",
            })
        ));
        assert!(order.cancel().is_err());
    }

    #[test]
    fn status_parse_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("Unknown"), None);
    }
}
