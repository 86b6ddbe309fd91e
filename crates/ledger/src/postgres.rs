use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use common::{Money, OrderId, OrderItemId, ShipmentId, UserId};

use crate::record::{
    CommittedShipment, NewOrder, OrderItemRecord, OrderRecord, OrderSnapshot, ShipmentCommit,
    ShipmentItemRecord, ShipmentRecord,
};
use crate::status::{OrderStatus, StatusCounts};
use crate::store::Ledger;
use crate::{LedgerError, Result};

/// PostgreSQL-backed ledger implementation.
///
/// Shipment commits run inside a transaction that takes a `FOR UPDATE`
/// lock on the order row, so concurrent commits against one order
/// serialize while other orders proceed independently. The schema also
/// carries a CHECK constraint keeping `shipped_quantity` within the
/// ordered quantity as a storage-level guard.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a new PostgreSQL ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database and wraps the pool in a ledger.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: &PgRow) -> Result<OrderRecord> {
        let status_raw: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status_raw).ok_or_else(|| {
            LedgerError::InvalidRecord(format!("unknown order status '{status_raw}'"))
        })?;

        Ok(OrderRecord {
            id: OrderId::new(row.try_get("id")?),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            status,
            notes: row.try_get("notes")?,
            user_id: UserId::new(row.try_get("user_id")?),
            version: row.try_get("version")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItemRecord> {
        Ok(OrderItemRecord {
            id: OrderItemId::new(row.try_get("id")?),
            order_id: OrderId::new(row.try_get("order_id")?),
            variant_id: row.try_get("variant_id")?,
            product_name: row.try_get("product_name")?,
            variant_size: row.try_get("variant_size")?,
            price_at_order: row
                .try_get::<Option<i64>, _>("price_at_order")?
                .map(Money::from_cents),
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            shipped_quantity: row.try_get::<i32, _>("shipped_quantity")? as u32,
        })
    }

    async fn items_for_order(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
    ) -> Result<Vec<OrderItemRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, variant_id, product_name, variant_size,
                   price_at_order, quantity, shipped_quantity
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }

    async fn items_via_pool(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, variant_id, product_name, variant_size,
                   price_at_order, quantity, shipped_quantity
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }
}

#[async_trait]
impl Ledger for PostgresLedger {
    async fn create_order(&self, new_order: NewOrder) -> Result<OrderSnapshot> {
        if new_order.items.is_empty() {
            return Err(LedgerError::InvalidRecord(
                "order must have at least one item".to_string(),
            ));
        }
        if let Some(bad) = new_order.items.iter().find(|i| i.quantity == 0) {
            return Err(LedgerError::InvalidRecord(format!(
                "ordered quantity for '{}' must be positive",
                bad.product_name
            )));
        }

        let mut tx = self.pool.begin().await?;

        let order_row = sqlx::query(
            r#"
            INSERT INTO orders (status, notes, user_id, version)
            VALUES ('new', $1, $2, 0)
            RETURNING id, created_at, status, notes, user_id, version
            "#,
        )
        .bind(&new_order.notes)
        .bind(new_order.user_id.as_i64())
        .fetch_one(&mut *tx)
        .await?;
        let order = Self::row_to_order(&order_row)?;

        for item in &new_order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items
                    (order_id, variant_id, product_name, variant_size, price_at_order, quantity, shipped_quantity)
                VALUES ($1, $2, $3, $4, $5, $6, 0)
                "#,
            )
            .bind(order.id.as_i64())
            .bind(item.variant_id)
            .bind(&item.product_name)
            .bind(&item.variant_size)
            .bind(item.price_at_order.map(|p| p.cents()))
            .bind(item.quantity as i32)
            .execute(&mut *tx)
            .await?;
        }

        let items = Self::items_for_order(&mut tx, order.id).await?;
        tx.commit().await?;

        Ok(OrderSnapshot { order, items })
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderSnapshot>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT id, created_at, status, notes, user_id, version FROM orders WHERE id = $1",
        )
        .bind(order_id.as_i64())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let order = Self::row_to_order(&row)?;
        let items = Self::items_for_order(&mut tx, order.id).await?;
        tx.commit().await?;

        Ok(Some(OrderSnapshot { order, items }))
    }

    async fn get_order_item(&self, item_id: OrderItemId) -> Result<Option<OrderItemRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, variant_id, product_name, variant_size,
                   price_at_order, quantity, shipped_quantity
            FROM order_items
            WHERE id = $1
            "#,
        )
        .bind(item_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_item).transpose()
    }

    #[tracing::instrument(skip(self, commit), fields(order_id = %commit.order_id))]
    async fn commit_shipment(&self, commit: ShipmentCommit) -> Result<CommittedShipment> {
        if commit.lines.is_empty() {
            return Err(LedgerError::InvalidRecord(
                "shipment must have at least one line".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        // Lock the order row for the duration of the commit.
        let order_row = sqlx::query(
            r#"
            SELECT id, created_at, status, notes, user_id, version
            FROM orders
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(commit.order_id.as_i64())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::OrderNotFound(commit.order_id))?;
        let order = Self::row_to_order(&order_row)?;

        if order.version != commit.expected_version {
            return Err(LedgerError::ConcurrencyConflict {
                order_id: commit.order_id,
                expected: commit.expected_version,
                actual: order.version,
            });
        }

        let items = Self::items_for_order(&mut tx, commit.order_id).await?;
        let display: HashMap<OrderItemId, (String, String)> = items
            .iter()
            .map(|i| (i.id, (i.product_name.clone(), i.variant_size.clone())))
            .collect();

        for line in &commit.lines {
            let (product_name, _) = display
                .get(&line.order_item_id)
                .ok_or(LedgerError::OrderItemNotFound(line.order_item_id))?;
            if line.quantity == 0 {
                return Err(LedgerError::InvalidRecord(format!(
                    "shipment quantity for '{product_name}' must be positive"
                )));
            }

            sqlx::query(
                r#"
                UPDATE order_items
                SET shipped_quantity = shipped_quantity + $1
                WHERE id = $2
                "#,
            )
            .bind(line.quantity as i32)
            .bind(line.order_item_id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // The shipped_within_ordered CHECK catches increments
                // beyond the ordered quantity.
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_check_violation()
                {
                    return LedgerError::InvalidRecord(format!(
                        "shipping {} of '{}' would exceed the ordered quantity",
                        line.quantity, product_name
                    ));
                }
                LedgerError::Database(e)
            })?;
        }

        let shipment_row = sqlx::query(
            r#"
            INSERT INTO shipments (order_id, shipped_by)
            VALUES ($1, $2)
            RETURNING id, created_at
            "#,
        )
        .bind(commit.order_id.as_i64())
        .bind(commit.shipped_by.map(|u| u.as_i64()))
        .fetch_one(&mut *tx)
        .await?;
        let shipment_id = ShipmentId::new(shipment_row.try_get("id")?);
        let shipment_created_at: DateTime<Utc> = shipment_row.try_get("created_at")?;

        let mut shipment_items = Vec::with_capacity(commit.lines.len());
        for line in &commit.lines {
            let (product_name, variant_size) = &display[&line.order_item_id];
            let item_row = sqlx::query(
                r#"
                INSERT INTO shipment_items
                    (shipment_id, order_item_id, quantity_shipped, product_name, variant_size)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(shipment_id.as_i64())
            .bind(line.order_item_id.as_i64())
            .bind(line.quantity as i32)
            .bind(product_name)
            .bind(variant_size)
            .fetch_one(&mut *tx)
            .await?;

            shipment_items.push(ShipmentItemRecord {
                id: item_row.try_get("id")?,
                shipment_id,
                order_item_id: line.order_item_id,
                quantity_shipped: line.quantity,
                product_name: product_name.clone(),
                variant_size: variant_size.clone(),
            });
        }

        sqlx::query("UPDATE orders SET status = $1, version = version + 1 WHERE id = $2")
            .bind(commit.new_status.as_str())
            .bind(commit.order_id.as_i64())
            .execute(&mut *tx)
            .await?;

        let updated_items = Self::items_for_order(&mut tx, commit.order_id).await?;
        tx.commit().await?;

        let mut updated_order = order;
        updated_order.status = commit.new_status;
        updated_order.version += 1;

        Ok(CommittedShipment {
            order: OrderSnapshot {
                order: updated_order,
                items: updated_items,
            },
            shipment: ShipmentRecord {
                id: shipment_id,
                order_id: commit.order_id,
                created_at: shipment_created_at,
                shipped_by: commit.shipped_by,
                items: shipment_items,
            },
        })
    }

    async fn shipments_for_order(&self, order_id: OrderId) -> Result<Vec<ShipmentRecord>> {
        let shipment_rows = sqlx::query(
            r#"
            SELECT id, order_id, created_at, shipped_by
            FROM shipments
            WHERE order_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let mut shipments = Vec::with_capacity(shipment_rows.len());
        for row in shipment_rows {
            let shipment_id = ShipmentId::new(row.try_get("id")?);
            let item_rows = sqlx::query(
                r#"
                SELECT id, shipment_id, order_item_id, quantity_shipped, product_name, variant_size
                FROM shipment_items
                WHERE shipment_id = $1
                ORDER BY id ASC
                "#,
            )
            .bind(shipment_id.as_i64())
            .fetch_all(&self.pool)
            .await?;

            let items = item_rows
                .iter()
                .map(|r| {
                    Ok(ShipmentItemRecord {
                        id: r.try_get("id")?,
                        shipment_id,
                        order_item_id: OrderItemId::new(r.try_get("order_item_id")?),
                        quantity_shipped: r.try_get::<i32, _>("quantity_shipped")? as u32,
                        product_name: r.try_get("product_name")?,
                        variant_size: r.try_get("variant_size")?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            shipments.push(ShipmentRecord {
                id: shipment_id,
                order_id,
                created_at: row.try_get("created_at")?,
                shipped_by: row
                    .try_get::<Option<i64>, _>("shipped_by")?
                    .map(UserId::new),
                items,
            });
        }

        Ok(shipments)
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<OrderSnapshot>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    r#"
                    SELECT id, created_at, status, notes, user_id, version
                    FROM orders
                    WHERE status = $1
                    ORDER BY created_at DESC, id DESC
                    "#,
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, created_at, status, notes, user_id, version
                    FROM orders
                    ORDER BY created_at DESC, id DESC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in &rows {
            let order = Self::row_to_order(row)?;
            let items = self.items_via_pool(order.id).await?;
            snapshots.push(OrderSnapshot { order, items });
        }

        Ok(snapshots)
    }

    async fn status_counts(&self) -> Result<StatusCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM orders GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status_raw: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            match OrderStatus::parse(&status_raw) {
                Some(OrderStatus::New) => counts.new = count as u64,
                Some(OrderStatus::Partial) => counts.partial = count as u64,
                Some(OrderStatus::Completed) => counts.completed = count as u64,
                None => {
                    return Err(LedgerError::InvalidRecord(format!(
                        "unknown order status '{status_raw}'"
                    )));
                }
            }
        }

        Ok(counts)
    }
}
