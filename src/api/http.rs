//! Order HTTP API.
//!
//! Endpoints, all JSON:
//! - `POST /api/v1/orders` creates an order
//! - `GET /api/v1/orders/{order_uuid}` fetches one
//! - `POST /api/v1/orders/{order_uuid}/pay` pays it
//! - `POST /api/v1/orders/{order_uuid}/cancel` cancels it
//! - `GET /health`
//!
//! Errors are `{"code": ..., "message": ...}` with the status from
//! [`OrderError::http_status`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Order, PaymentMethod};
use crate::services::order::OrderError;
use crate::services::OrderService;

type AppState = Arc<OrderService>;

/// Serve the API until `ctx` is cancelled.
pub async fn serve(
    service: Arc<OrderService>,
    addr: SocketAddr,
    ctx: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Order HTTP API listening");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(ctx.cancelled_owned())
        .await
}

/// Build the axum router (separated for testing).
pub fn router(service: Arc<OrderService>) -> Router {
    let orders = Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{order_uuid}", get(get_order))
        .route("/orders/{order_uuid}/pay", post(pay_order))
        .route("/orders/{order_uuid}/cancel", post(cancel_order));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", orders)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn create_order(
    State(service): State<AppState>,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    let Json(body) = body?;
    let user_id = parse_uuid("user_uuid", &body.user_uuid)?;
    let part_ids = body
        .part_uuids
        .iter()
        .map(|id| parse_uuid("part_uuids", id))
        .collect::<Result<Vec<_>, _>>()?;

    let order = service.create_order(user_id, part_ids).await?;
    Ok(Json(CreateOrderResponse {
        order_uuid: order.order_id.to_string(),
        total_price: order.total_price,
    }))
}

async fn get_order(
    State(service): State<AppState>,
    Path(order_uuid): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id = parse_uuid("order_uuid", &order_uuid)?;
    let order = service.get_order(order_id).await?;
    Ok(Json(OrderView::from(order)))
}

async fn pay_order(
    State(service): State<AppState>,
    Path(order_uuid): Path<String>,
    body: Result<Json<PayOrderRequest>, JsonRejection>,
) -> Result<Json<PayOrderResponse>, ApiError> {
    let order_id = parse_uuid("order_uuid", &order_uuid)?;
    let Json(body) = body?;
    let method: PaymentMethod = body
        .payment_method
        .parse()
        .map_err(|_| OrderError::InvalidPaymentMethod(body.payment_method.clone()))?;

    let transaction_id = service.pay_order(order_id, method).await?;
    Ok(Json(PayOrderResponse {
        transaction_uuid: transaction_id,
    }))
}

async fn cancel_order(
    State(service): State<AppState>,
    Path(order_uuid): Path<String>,
) -> Result<StatusCode, ApiError> {
    let order_id = parse_uuid("order_uuid", &order_uuid)?;
    service.cancel_order(order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, OrderError> {
    Uuid::parse_str(value)
        .map_err(|_| OrderError::InvalidArgument(format!("{field} is not a valid UUID: '{value}'")))
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateOrderRequest {
    user_uuid: String,
    #[serde(default)]
    part_uuids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CreateOrderResponse {
    order_uuid: String,
    total_price: i64,
}

#[derive(Debug, Deserialize)]
struct PayOrderRequest {
    payment_method: String,
}

#[derive(Debug, Serialize)]
struct PayOrderResponse {
    transaction_uuid: String,
}

#[derive(Debug, Serialize)]
struct OrderView {
    order_uuid: String,
    user_uuid: String,
    part_uuids: Vec<String>,
    total_price: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_method: Option<PaymentMethod>,
    status: String,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            order_uuid: order.order_id.to_string(),
            user_uuid: order.user_id.to_string(),
            part_uuids: order.part_ids.iter().map(Uuid::to_string).collect(),
            total_price: order.total_price,
            transaction_uuid: order.transaction_id,
            payment_method: order.payment_method,
            status: order.status.to_string(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

/// HTTP rendering of [`OrderError`].
#[derive(Debug)]
pub struct ApiError(OrderError);

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(OrderError::InvalidArgument(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.http_status();
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            code: self.0.code(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
