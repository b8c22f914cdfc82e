//! The inventory ledger trait and its retry extension.

use async_trait::async_trait;
use common::Version;
use domain::{Product, ProductId, Quantity};

use crate::error::{Result, StoreError};

/// Maximum compare-and-swap attempts before giving up on a product.
pub const MAX_RESERVE_ATTEMPTS: u32 = 3;

/// The authoritative record of per-product stock.
///
/// `reserve` is a compare-and-swap: it decrements stock only if the
/// caller's `expected_version` still matches, so lost updates are
/// impossible and oversell is prevented at the ledger. `release` is
/// idempotent per `release_key` to stay safe under redelivery.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Reads the current product record, or `None` if unknown.
    async fn product(&self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Decrements stock by `quantity` if the version still matches.
    ///
    /// Returns the new version on success. Fails with
    /// [`StoreError::ConcurrencyConflict`] on a version mismatch and
    /// [`StoreError::OutOfStock`] when stock does not cover the request.
    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: Quantity,
        expected_version: Version,
    ) -> Result<Version>;

    /// Returns `quantity` to stock. Repeated calls with the same
    /// `release_key` are no-ops.
    async fn release(
        &self,
        product_id: &ProductId,
        quantity: Quantity,
        release_key: &str,
    ) -> Result<()>;
}

/// Convenience methods layered on any [`InventoryLedger`].
#[async_trait]
pub trait InventoryLedgerExt: InventoryLedger {
    /// Reserves stock, re-reading and retrying on version conflicts.
    ///
    /// After [`MAX_RESERVE_ATTEMPTS`] conflicting attempts the ledger is
    /// under too much contention and [`StoreError::TooManyConflicts`]
    /// is returned instead of spinning further.
    async fn reserve_with_retry(
        &self,
        product_id: &ProductId,
        quantity: Quantity,
    ) -> Result<Version> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let product = self
                .product(product_id)
                .await?
                .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;

            match self.reserve(product_id, quantity, product.version).await {
                Err(StoreError::ConcurrencyConflict { .. }) if attempt < MAX_RESERVE_ATTEMPTS => {
                    metrics::counter!("ledger_reserve_conflicts_total").increment(1);
                    tracing::debug!(%product_id, attempt, "reserve lost the version race, retrying");
                }
                Err(StoreError::ConcurrencyConflict { .. }) => {
                    metrics::counter!("ledger_reserve_conflicts_total").increment(1);
                    return Err(StoreError::TooManyConflicts {
                        product_id: product_id.clone(),
                        attempts: attempt,
                    });
                }
                other => return other,
            }
        }
    }
}

impl<T: InventoryLedger + ?Sized> InventoryLedgerExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Currency, Money};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Ledger double whose reserve always loses the version race.
    struct ContendedLedger {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl InventoryLedger for ContendedLedger {
        async fn product(&self, product_id: &ProductId) -> Result<Option<Product>> {
            Ok(Some(Product::new(
                product_id.clone(),
                10,
                Money::new(100, Currency::Usd),
            )))
        }

        async fn reserve(
            &self,
            product_id: &ProductId,
            _quantity: Quantity,
            expected_version: Version,
        ) -> Result<Version> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::ConcurrencyConflict {
                product_id: product_id.clone(),
                expected: expected_version,
                actual: expected_version.next(),
            })
        }

        async fn release(
            &self,
            _product_id: &ProductId,
            _quantity: Quantity,
            _release_key: &str,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let ledger = ContendedLedger {
            attempts: AtomicU32::new(0),
        };
        let product_id = ProductId::new("SKU-001");
        let quantity = Quantity::new(1).unwrap();

        let result = ledger.reserve_with_retry(&product_id, quantity).await;

        assert!(matches!(
            result,
            Err(StoreError::TooManyConflicts {
                attempts: MAX_RESERVE_ATTEMPTS,
                ..
            })
        ));
        assert_eq!(ledger.attempts.load(Ordering::SeqCst), MAX_RESERVE_ATTEMPTS);
    }
}
