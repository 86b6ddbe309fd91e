//! Order creation and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{Money, OrderId, UserId};
use fulfillment::FulfillmentEngine;
use ledger::{Ledger, NewOrder, NewOrderItem, OrderSnapshot, ShipmentRecord};
use notifier::{InMemoryMailer, InMemoryNotificationLog, InMemoryUserDirectory};
use serde::{Deserialize, Serialize};

use crate::AppDispatcher;
use crate::error::ApiError;
use crate::extract::ApiJson;

/// Shared application state accessible from all handlers.
pub struct AppState<L: Ledger> {
    pub ledger: Arc<L>,
    pub engine: FulfillmentEngine<L, AppDispatcher>,
    pub directory: InMemoryUserDirectory,
    pub notifications: InMemoryNotificationLog,
    pub mailer: InMemoryMailer,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: i64,
    pub notes: Option<String>,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub variant_id: i64,
    pub product_name: String,
    pub variant_size: String,
    pub price_at_order_cents: Option<i64>,
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: i64,
    pub created_at: String,
    pub status: String,
    pub notes: Option<String>,
    pub user_id: i64,
    pub version: i64,
    pub items: Vec<OrderItemResponse>,
    pub total_ordered: u64,
    pub total_shipped: u64,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub id: i64,
    pub variant_id: i64,
    pub product_name: String,
    pub variant_size: String,
    pub price_at_order_cents: Option<i64>,
    pub quantity: u32,
    pub shipped_quantity: u32,
    pub remaining: u32,
}

#[derive(Serialize)]
pub struct ShipmentResponse {
    pub id: i64,
    pub order_id: i64,
    pub created_at: String,
    pub shipped_by: Option<i64>,
    pub items: Vec<ShipmentItemResponse>,
}

#[derive(Serialize)]
pub struct ShipmentItemResponse {
    pub id: i64,
    pub order_item_id: i64,
    pub quantity_shipped: u32,
    pub product_name: String,
    pub variant_size: String,
}

impl OrderResponse {
    pub fn from_snapshot(snapshot: &OrderSnapshot) -> Self {
        let items = snapshot
            .items
            .iter()
            .map(|item| OrderItemResponse {
                id: item.id.as_i64(),
                variant_id: item.variant_id,
                product_name: item.product_name.clone(),
                variant_size: item.variant_size.clone(),
                price_at_order_cents: item.price_at_order.map(|m| m.cents()),
                quantity: item.quantity,
                shipped_quantity: item.shipped_quantity,
                remaining: item.remaining(),
            })
            .collect();

        OrderResponse {
            id: snapshot.order.id.as_i64(),
            created_at: snapshot.order.created_at.to_rfc3339(),
            status: snapshot.order.status.to_string(),
            notes: snapshot.order.notes.clone(),
            user_id: snapshot.order.user_id.as_i64(),
            version: snapshot.order.version,
            items,
            total_ordered: snapshot.total_ordered(),
            total_shipped: snapshot.total_shipped(),
        }
    }
}

impl ShipmentResponse {
    pub fn from_record(record: &ShipmentRecord) -> Self {
        ShipmentResponse {
            id: record.id.as_i64(),
            order_id: record.order_id.as_i64(),
            created_at: record.created_at.to_rfc3339(),
            shipped_by: record.shipped_by.map(|u| u.as_i64()),
            items: record
                .items
                .iter()
                .map(|item| ShipmentItemResponse {
                    id: item.id,
                    order_item_id: item.order_item_id.as_i64(),
                    quantity_shipped: item.quantity_shipped,
                    product_name: item.product_name.clone(),
                    variant_size: item.variant_size.clone(),
                })
                .collect(),
        }
    }
}

// -- Handlers --

/// POST /orders — create a new order with its items.
#[tracing::instrument(skip(state, req))]
pub async fn create<L: Ledger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    ApiJson(req): ApiJson<CreateOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<OrderResponse>), ApiError> {
    let items = req
        .items
        .into_iter()
        .map(|item| NewOrderItem {
            variant_id: item.variant_id,
            product_name: item.product_name,
            variant_size: item.variant_size,
            price_at_order: item.price_at_order_cents.map(Money::from_cents),
            quantity: item.quantity,
        })
        .collect();

    let snapshot = state
        .ledger
        .create_order(NewOrder {
            user_id: UserId::new(req.user_id),
            notes: req.notes,
            items,
        })
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(OrderResponse::from_snapshot(&snapshot)),
    ))
}

/// GET /orders/:id — load an order with its items.
#[tracing::instrument(skip(state))]
pub async fn get<L: Ledger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<i64>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = OrderId::new(id);
    let snapshot = state
        .ledger
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order not found: {order_id}")))?;

    Ok(Json(OrderResponse::from_snapshot(&snapshot)))
}

/// GET /orders/:id/shipments — shipment history of an order, newest first.
#[tracing::instrument(skip(state))]
pub async fn shipments<L: Ledger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ShipmentResponse>>, ApiError> {
    let order_id = OrderId::new(id);
    state
        .ledger
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order not found: {order_id}")))?;

    let shipments = state.ledger.shipments_for_order(order_id).await?;
    Ok(Json(
        shipments.iter().map(ShipmentResponse::from_record).collect(),
    ))
}
