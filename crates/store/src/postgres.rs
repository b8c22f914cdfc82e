//! PostgreSQL store backend.
//!
//! Uses a guarded `UPDATE` for stock decrements so the read-check-write
//! cycle collapses into one statement: the `WHERE` clause carries both
//! the version comparand and the stock floor, and zero affected rows
//! means the decrement did not happen.

use async_trait::async_trait;
use common::{EventId, OrderId, UserId, Version};
use domain::{
    Currency, Money, Order, OrderStatus, PlacementEvent, Product, ProductId, Quantity,
};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction as PgTransaction};

use crate::error::{Result, StoreError};
use crate::ledger::InventoryLedger;
use crate::order_store::OrderStore;
use crate::outbox::OutboxRecord;

/// Store backend over a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs schema migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Transaction(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Applies the guarded decrement inside `tx` and classifies failure.
    async fn reserve_in_tx(
        tx: &mut PgTransaction<'_, Postgres>,
        product_id: &ProductId,
        quantity: Quantity,
        expected_version: Version,
    ) -> Result<Version> {
        let updated = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2, version = version + 1
            WHERE id = $1 AND version = $3 AND stock >= $2
            RETURNING version
            "#,
        )
        .bind(product_id.as_str())
        .bind(i64::from(quantity.get()))
        .bind(expected_version.as_i64())
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(row) = updated {
            return Ok(Version::new(row.get::<i64, _>("version")));
        }

        // The guard rejected the write; re-read to say why.
        let current = sqlx::query("SELECT stock, version FROM products WHERE id = $1")
            .bind(product_id.as_str())
            .fetch_optional(&mut **tx)
            .await?;

        match current {
            None => Err(StoreError::ProductNotFound(product_id.clone())),
            Some(row) => {
                let actual = Version::new(row.get::<i64, _>("version"));
                if actual != expected_version {
                    Err(StoreError::ConcurrencyConflict {
                        product_id: product_id.clone(),
                        expected: expected_version,
                        actual,
                    })
                } else {
                    Err(StoreError::OutOfStock {
                        product_id: product_id.clone(),
                        available: row.get::<i64, _>("stock") as u32,
                        requested: quantity.get(),
                    })
                }
            }
        }
    }

    async fn insert_order_in_tx(
        tx: &mut PgTransaction<'_, Postgres>,
        order: &Order,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, product_id, quantity, total_minor, currency, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status
            "#,
        )
        .bind(order.order_id().as_uuid())
        .bind(order.user_id().as_uuid())
        .bind(order.product_id().as_str())
        .bind(i64::from(order.quantity().get()))
        .bind(order.total_price().minor_units())
        .bind(order.total_price().currency().code())
        .bind(order.status().as_str())
        .bind(order.created_at())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn append_events_in_tx(
        tx: &mut PgTransaction<'_, Postgres>,
        events: &[PlacementEvent],
    ) -> Result<()> {
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO outbox (event_id, event_type, payload)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(event.event_type())
            .bind(serde_json::to_value(event)?)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    let currency_code: String = row.get("currency");
    let currency = Currency::from_code(&currency_code)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown currency '{currency_code}'")))?;

    Ok(Product {
        product_id: ProductId::new(row.get::<String, _>("id")),
        stock: row.get::<i64, _>("stock") as u32,
        version: Version::new(row.get::<i64, _>("version")),
        price: Money::new(row.get::<i64, _>("price_minor"), currency),
        flash_sale: row.get("flash_sale"),
    })
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let currency_code: String = row.get("currency");
    let currency = Currency::from_code(&currency_code)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown currency '{currency_code}'")))?;
    let status_name: String = row.get("status");
    let status = OrderStatus::parse(&status_name)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown order status '{status_name}'")))?;
    let quantity = Quantity::new(row.get::<i64, _>("quantity") as u32)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;

    Ok(Order::from_parts(
        OrderId::from_uuid(row.get("id")),
        UserId::from_uuid(row.get("user_id")),
        ProductId::new(row.get::<String, _>("product_id")),
        quantity,
        Money::new(row.get::<i64, _>("total_minor"), currency),
        status,
        row.get("created_at"),
    ))
}

fn row_to_outbox(row: &PgRow) -> OutboxRecord {
    OutboxRecord {
        sequence: row.get("sequence"),
        event_id: EventId::from_uuid(row.get("event_id")),
        event_type: row.get("event_type"),
        payload: row.get("payload"),
        created_at: row.get("created_at"),
        published_at: row.get("published_at"),
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn upsert_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, stock, version, price_minor, currency, flash_sale)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET stock = EXCLUDED.stock,
                version = EXCLUDED.version,
                price_minor = EXCLUDED.price_minor,
                currency = EXCLUDED.currency,
                flash_sale = EXCLUDED.flash_sale
            "#,
        )
        .bind(product.product_id.as_str())
        .bind(i64::from(product.stock))
        .bind(product.version.as_i64())
        .bind(product.price.minor_units())
        .bind(product.price.currency().code())
        .bind(product.flash_sale)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, product_id, quantity, total_minor, currency, status, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn commit_placement(
        &self,
        order: Order,
        expected_version: Version,
        events: Vec<PlacementEvent>,
    ) -> Result<Version> {
        let mut tx = self.pool.begin().await?;
        let new_version = Self::reserve_in_tx(
            &mut tx,
            order.product_id(),
            order.quantity(),
            expected_version,
        )
        .await?;
        Self::insert_order_in_tx(&mut tx, &order).await?;
        Self::append_events_in_tx(&mut tx, &events).await?;
        tx.commit().await?;
        Ok(new_version)
    }

    async fn commit_order_update(&self, order: Order, events: Vec<PlacementEvent>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_order_in_tx(&mut tx, &order).await?;
        Self::append_events_in_tx(&mut tx, &events).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_events(&self, events: Vec<PlacementEvent>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::append_events_in_tx(&mut tx, &events).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn unpublished_events(&self) -> Result<Vec<OutboxRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, event_id, event_type, payload, created_at, published_at
            FROM outbox
            WHERE published_at IS NULL
            ORDER BY sequence ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_outbox).collect())
    }

    async fn mark_published(&self, event_id: EventId) -> Result<()> {
        sqlx::query(
            "UPDATE outbox SET published_at = NOW() WHERE event_id = $1 AND published_at IS NULL",
        )
        .bind(event_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_saga(&self, order_id: OrderId, saga: serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sagas (order_id, data)
            VALUES ($1, $2)
            ON CONFLICT (order_id) DO UPDATE
            SET data = EXCLUDED.data, updated_at = NOW()
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(saga)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_saga(&self, order_id: OrderId) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT data FROM sagas WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("data")))
    }
}

#[async_trait]
impl InventoryLedger for PostgresStore {
    async fn product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, stock, version, price_minor, currency, flash_sale FROM products WHERE id = $1",
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: Quantity,
        expected_version: Version,
    ) -> Result<Version> {
        let mut tx = self.pool.begin().await?;
        let new_version =
            Self::reserve_in_tx(&mut tx, product_id, quantity, expected_version).await?;
        tx.commit().await?;
        Ok(new_version)
    }

    async fn release(
        &self,
        product_id: &ProductId,
        quantity: Quantity,
        release_key: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO stock_releases (release_key) VALUES ($1) ON CONFLICT DO NOTHING",
        )
        .bind(release_key)
        .execute(&mut *tx)
        .await?;

        // Key already used: the stock was returned by an earlier delivery.
        if inserted.rows_affected() == 0 {
            tx.commit().await?;
            return Ok(());
        }

        let updated = sqlx::query(
            "UPDATE products SET stock = stock + $2, version = version + 1 WHERE id = $1",
        )
        .bind(product_id.as_str())
        .bind(i64::from(quantity.get()))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(product_id.clone()));
        }

        tx.commit().await?;
        Ok(())
    }
}
