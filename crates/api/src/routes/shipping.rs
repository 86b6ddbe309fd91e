//! Shipping panel endpoints: processing shipments and listing orders by
//! fulfillment status.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use common::{OrderId, UserId};
use fulfillment::ShipmentRequest;
use ledger::{Ledger, OrderStatus};
use notifier::UserDirectory;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::routes::orders::{AppState, OrderResponse, ShipmentResponse};

/// Header carrying the id of the staff member processing a shipment.
/// Absent for system-initiated shipments.
const STAFF_ID_HEADER: &str = "x-staff-id";

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct ShipOrderResponse {
    pub order: OrderResponse,
    pub shipment: ShipmentResponse,
    /// Identity summary of the acting staff member, when known.
    pub user_info: Option<StaffInfo>,
}

#[derive(Serialize)]
pub struct StaffInfo {
    pub id: i64,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Serialize)]
pub struct StatusCountsResponse {
    pub new: u64,
    pub partial: u64,
    pub completed: u64,
    pub total: u64,
}

fn staff_id_from_headers(headers: &HeaderMap) -> Result<Option<UserId>, ApiError> {
    let Some(value) = headers.get(STAFF_ID_HEADER) else {
        return Ok(None);
    };
    let id: i64 = value
        .to_str()
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {STAFF_ID_HEADER} header")))?;
    Ok(Some(UserId::new(id)))
}

/// POST /shipping/orders/:id/ship — process a shipment against an order.
#[tracing::instrument(skip(state, headers, req))]
pub async fn ship<L: Ledger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<ShipmentRequest>,
) -> Result<Json<ShipOrderResponse>, ApiError> {
    let order_id = OrderId::new(id);
    let shipped_by = staff_id_from_headers(&headers)?;

    let committed = state
        .engine
        .process_shipment(order_id, shipped_by, &req)
        .await?;

    let user_info = match shipped_by {
        Some(user_id) => state
            .directory
            .contact_for(user_id)
            .await
            .map(|contact| StaffInfo {
                id: user_id.as_i64(),
                username: contact.username,
                first_name: contact.first_name,
                last_name: contact.last_name,
            }),
        None => None,
    };

    Ok(Json(ShipOrderResponse {
        order: OrderResponse::from_snapshot(&committed.order),
        shipment: ShipmentResponse::from_record(&committed.shipment),
        user_info,
    }))
}

/// GET /shipping/orders?status= — list orders, optionally by status.
#[tracing::instrument(skip(state))]
pub async fn list<L: Ledger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(
            OrderStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown status: {raw}")))?,
        ),
    };

    let orders = state.ledger.list_orders(status).await?;
    Ok(Json(
        orders.iter().map(OrderResponse::from_snapshot).collect(),
    ))
}

/// GET /shipping/orders/counts — number of orders per status.
#[tracing::instrument(skip(state))]
pub async fn counts<L: Ledger + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<Json<StatusCountsResponse>, ApiError> {
    let counts = state.ledger.status_counts().await?;
    Ok(Json(StatusCountsResponse {
        new: counts.new,
        partial: counts.partial,
        completed: counts.completed,
        total: counts.total(),
    }))
}
