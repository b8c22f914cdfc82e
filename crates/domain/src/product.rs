//! Product inventory record.

use common::Version;
use serde::{Deserialize, Serialize};

use crate::value_objects::{Money, ProductId, Quantity};

/// A product as tracked by the inventory ledger.
///
/// The `version` field changes on every committed stock write and is the
/// comparand for compare-and-swap updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: ProductId,
    pub stock: u32,
    pub version: Version,
    pub price: Money,
    /// High-contention products go through the reservation and saga path
    /// instead of the single-transaction path.
    pub flash_sale: bool,
}

impl Product {
    /// Creates a new product record at the initial version.
    pub fn new(product_id: impl Into<ProductId>, stock: u32, price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            stock,
            version: Version::initial(),
            price,
            flash_sale: false,
        }
    }

    /// Marks the product as a flash-sale item.
    pub fn flash_sale(mut self, flash_sale: bool) -> Self {
        self.flash_sale = flash_sale;
        self
    }

    /// Returns true if current stock covers the requested quantity.
    pub fn can_cover(&self, quantity: Quantity) -> bool {
        self.stock >= quantity.get()
    }
}
