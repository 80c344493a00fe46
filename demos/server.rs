//! Simple REST API server example for the bodega ledger.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /orders` - Place an order from checkout
//! - `GET /orders` - List orders (`?bodegaId=&courierId=&status=`)
//! - `GET /orders/{id}` - Get an order
//! - `PATCH /orders/{id}` - Change status and/or assign a courier
//! - `GET /balances/{shopkeeper}` - Points balance (`?bodegaId=`)
//! - `POST /redemptions` - Redeem points
//! - `GET /ledger/{order}` - Settlement entry of an order
//! - `GET /couriers/{id}/ledger` - Courier entries and earnings (`?from=&to=`)
//! - `GET /notifications` - Notification feed (`?audience=&bodegaId=&courierId=&unreadOnly=`)
//! - `GET /accounts` - All cached account aggregates
//!
//! ## Example Usage
//!
//! ```bash
//! # Place an order
//! curl -X POST http://localhost:3000/orders \
//!   -H "Content-Type: application/json" \
//!   -d '{"id": "P1", "bodegaId": "B1", "total": "37000", "customerName": "Ana", "customerPhone": "300 555 1234"}'
//!
//! # Confirm, then assign a courier
//! curl -X PATCH http://localhost:3000/orders/P1 \
//!   -H "Content-Type: application/json" -d '{"status": "confirmed"}'
//! curl -X PATCH http://localhost:3000/orders/P1 \
//!   -H "Content-Type: application/json" \
//!   -d '{"status": "assigned", "courierId": "C1", "courierName": "Luz", "courierPhone": "3100000000"}'
//!
//! # Points balance of the shopkeeper
//! curl http://localhost:3000/balances/3005551234
//! ```

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bodega_ledger::{
    BodegaId, CourierId, DateRange, EarningsSummary, Engine, FeedFilter, LedgerEntry, LedgerError,
    Movement, NewOrder, Notification, Order, OrderFilter, OrderId, OrderPatch, OrderStatus,
    ShopkeeperId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

// === Request/Response DTOs ===

/// Query string for `GET /orders`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersQuery {
    pub bodega_id: Option<BodegaId>,
    pub courier_id: Option<CourierId>,
    pub status: Option<OrderStatus>,
}

impl From<OrdersQuery> for OrderFilter {
    fn from(query: OrdersQuery) -> Self {
        OrderFilter {
            bodega_id: query.bodega_id,
            courier_id: query.courier_id,
            status: query.status,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceQuery {
    pub bodega_id: Option<BodegaId>,
}

/// Response body for a points balance.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub shopkeeper_id: ShopkeeperId,
    pub bodega_id: Option<BodegaId>,
    pub points: i64,
}

/// Request body for `POST /redemptions`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionRequest {
    pub shopkeeper_id: ShopkeeperId,
    pub points: i64,
}

/// Response body for a courier's ledger.
#[derive(Debug, Serialize)]
pub struct CourierLedgerResponse {
    pub entries: Vec<LedgerEntry>,
    pub summary: EarningsSummary,
}

/// Response body for errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the ledger engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Error Handling ===

/// Wrapper for converting `LedgerError` into HTTP responses.
pub struct AppError(LedgerError);

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            LedgerError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            LedgerError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            LedgerError::UnknownStatus(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_STATUS"),
            LedgerError::MissingCourier(_) => (StatusCode::BAD_REQUEST, "MISSING_COURIER"),
            LedgerError::InsufficientBalance { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_BALANCE")
            }
            LedgerError::InvalidPoints => (StatusCode::BAD_REQUEST, "INVALID_POINTS"),
            LedgerError::InvalidAmount => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
            LedgerError::NotDelivered(_) => (StatusCode::CONFLICT, "NOT_DELIVERED"),
            LedgerError::DuplicateOrder(_) => (StatusCode::CONFLICT, "DUPLICATE_ORDER"),
            LedgerError::DuplicateSettlement(_) => (StatusCode::CONFLICT, "DUPLICATE_SETTLEMENT"),
            LedgerError::SettlementPending(_) => (StatusCode::CONFLICT, "SETTLEMENT_PENDING"),
            LedgerError::OrderClosed { .. } => (StatusCode::CONFLICT, "ORDER_CLOSED"),
            LedgerError::PersistenceFailure(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "PERSISTENCE_FAILURE")
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /orders - Place a new order.
async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = state.engine.place_order(request)?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders - List orders.
async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.engine.orders(&query.into())?))
}

/// GET /orders/{id} - Get an order.
async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.engine.order(&OrderId::new(id))?))
}

/// PATCH /orders/{id} - Status change and/or courier assignment.
async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<OrderPatch>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.engine.update_order(&OrderId::new(id), patch)?))
}

/// GET /balances/{shopkeeper} - Points balance, optionally per bodega.
async fn get_balance(
    State(state): State<AppState>,
    Path(shopkeeper): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> Json<BalanceResponse> {
    let shopkeeper_id = ShopkeeperId::new(shopkeeper);
    let points = state
        .engine
        .balance(&shopkeeper_id, query.bodega_id.as_ref());
    Json(BalanceResponse {
        shopkeeper_id,
        bodega_id: query.bodega_id,
        points,
    })
}

/// POST /redemptions - Redeem points.
async fn create_redemption(
    State(state): State<AppState>,
    Json(request): Json<RedemptionRequest>,
) -> Result<(StatusCode, Json<Movement>), AppError> {
    let movement = state
        .engine
        .redeem(&request.shopkeeper_id, request.points)?;
    Ok((StatusCode::CREATED, Json(movement)))
}

/// GET /ledger/{order} - Settlement entry of an order.
async fn get_ledger_entry(
    State(state): State<AppState>,
    Path(order): Path<String>,
) -> Result<Json<LedgerEntry>, AppError> {
    state
        .engine
        .ledger_entry(&OrderId::new(order.as_str()))
        .map(Json)
        .ok_or_else(|| {
            AppError(LedgerError::NotFound {
                kind: "ledger entry",
                id: order,
            })
        })
}

/// GET /couriers/{id}/ledger - Entries and earnings of a courier.
async fn get_courier_ledger(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(range): Query<DateRange>,
) -> Json<CourierLedgerResponse> {
    let courier_id = CourierId::new(id);
    Json(CourierLedgerResponse {
        entries: state.engine.ledger_entries_for_courier(&courier_id, &range),
        summary: state.engine.courier_earnings_summary(&courier_id, &range),
    })
}

/// GET /notifications - Notification feed.
async fn list_notifications(
    State(state): State<AppState>,
    Query(filter): Query<FeedFilter>,
) -> Json<Vec<Notification>> {
    Json(state.engine.notifications(&filter))
}

/// GET /accounts - List all cached account aggregates.
async fn list_accounts(State(state): State<AppState>) -> Json<serde_json::Value> {
    let accounts: Vec<serde_json::Value> = state
        .engine
        .accounts()
        .filter_map(|ref_multi| serde_json::to_value(ref_multi.value()).ok())
        .collect();

    Json(serde_json::Value::Array(accounts))
}

// === Router ===

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/{id}", get(get_order).patch(update_order))
        .route("/balances/{shopkeeper}", get(get_balance))
        .route("/redemptions", post(create_redemption))
        .route("/ledger/{order}", get(get_ledger_entry))
        .route("/couriers/{id}/ledger", get(get_courier_ledger))
        .route("/notifications", get(list_notifications))
        .route("/accounts", get(list_accounts))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let state = AppState {
        engine: Arc::new(Engine::new()),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Bodega ledger API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST  /orders                 - Place an order");
    println!("  GET   /orders                 - List orders");
    println!("  GET   /orders/{{id}}            - Get an order");
    println!("  PATCH /orders/{{id}}            - Update status / courier");
    println!("  GET   /balances/{{shopkeeper}}  - Points balance");
    println!("  POST  /redemptions            - Redeem points");
    println!("  GET   /ledger/{{order}}         - Settlement entry");
    println!("  GET   /couriers/{{id}}/ledger   - Courier earnings");
    println!("  GET   /notifications          - Notification feed");
    println!("  GET   /accounts               - Account aggregates");

    axum::serve(listener, app).await.unwrap();
}
