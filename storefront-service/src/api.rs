use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, patch, post, put},
    Router,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use shared::{ColumnMapping, DuplicateAction, OrderStatus, ProductRef};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::cart::{CartError, CartLine, CartService};
use crate::coupons::{CouponDraft, CouponError, CouponQuote, CouponService, CouponUpdate};
use crate::csv_import::{DuplicateReport, ImportError, ImportService, ImportSummary, ParsedRow, RowError};
use crate::db::DbPool;
use crate::models::*;
use crate::notifier::Notifier;
use crate::orders::{
    CheckoutError, CheckoutRequest, OrderCreationError, OrderFilter, OrderService, OrderStatusError,
};

const CHECKOUT_FAILED: &str = "Unable to process order. Please try again.";
const DEFAULT_HISTORY_LIMIT: i64 = 20;

#[derive(Clone)]
pub struct AppState {
    pub cart: CartService,
    pub orders: OrderService,
    pub coupons: CouponService,
    pub imports: ImportService,
}

impl AppState {
    pub fn new(pool: DbPool, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            cart: CartService::new(pool.clone()),
            orders: OrderService::new(pool.clone(), notifier),
            coupons: CouponService::new(pool.clone()),
            imports: ImportService::new(pool),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<T, ApiError>;

fn reject(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    error!("Request failed: {}", e);
    reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn cart_error(e: CartError) -> ApiError {
    match e {
        CartError::InvalidQuantity => reject(StatusCode::BAD_REQUEST, e.to_string()),
        CartError::LineNotFound(_) | CartError::ProductNotFound(_) => {
            reject(StatusCode::NOT_FOUND, e.to_string())
        }
        other => internal(other),
    }
}

fn coupon_error(e: CouponError) -> ApiError {
    match e {
        CouponError::Rejected(rejection) => reject(StatusCode::BAD_REQUEST, rejection.to_string()),
        CouponError::NotFound(_) => reject(StatusCode::NOT_FOUND, e.to_string()),
        CouponError::InUse(_) => reject(StatusCode::CONFLICT, e.to_string()),
        other => internal(other),
    }
}

fn checkout_error(e: CheckoutError) -> ApiError {
    match e {
        e @ CheckoutError::InvalidDetails(_) => reject(StatusCode::BAD_REQUEST, e.to_string()),
        CheckoutError::Order(OrderCreationError::Coupon(rejection)) => {
            reject(StatusCode::BAD_REQUEST, rejection.to_string())
        }
        CheckoutError::Order(e @ OrderCreationError::EmptyCart) => {
            reject(StatusCode::BAD_REQUEST, e.to_string())
        }
        CheckoutError::Order(e @ OrderCreationError::OutOfStock { .. }) => {
            reject(StatusCode::CONFLICT, e.to_string())
        }
        other => {
            error!("Checkout failed: {}", other);
            reject(StatusCode::INTERNAL_SERVER_ERROR, CHECKOUT_FAILED)
        }
    }
}

fn status_error(e: OrderStatusError) -> ApiError {
    match e {
        OrderStatusError::NotFound(_) => reject(StatusCode::NOT_FOUND, e.to_string()),
        OrderStatusError::IllegalTransition { .. } => {
            reject(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        OrderStatusError::Conflict(_) => reject(StatusCode::CONFLICT, e.to_string()),
        other => internal(other),
    }
}

fn import_error(e: ImportError) -> ApiError {
    match e {
        ImportError::Csv(_) => reject(StatusCode::BAD_REQUEST, e.to_string()),
        other => internal(other),
    }
}

fn parse_status(raw: &str) -> ApiResult<OrderStatus> {
    raw.parse()
        .map_err(|e: shared::DomainError| reject(StatusCode::BAD_REQUEST, e.to_string()))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/cart/:user_id", get(get_cart).delete(clear_cart))
        .route("/cart/:user_id/items", post(add_cart_item))
        .route(
            "/cart/:user_id/items/:line_id",
            patch(update_cart_item).delete(remove_cart_item),
        )
        .route("/checkout/:user_id", post(checkout))
        .route("/orders", get(list_orders))
        .route("/orders/:order_id", get(get_order))
        .route("/orders/:order_id/items", get(get_order_items))
        .route("/orders/:order_id/status", put(update_order_status))
        .route("/users/:user_id/orders", get(get_user_orders))
        .route("/coupons", post(create_coupon).get(list_coupons))
        .route("/coupons/validate", post(validate_coupon))
        .route("/coupons/:coupon_id", put(update_coupon).delete(delete_coupon))
        .route("/coupons/:coupon_id/active", put(set_coupon_active))
        .route("/imports", post(import_csv).get(import_history))
        .route("/imports/preview", post(preview_csv))
        .route("/imports/template", get(import_template))
        .route("/imports/:import_id", get(get_import))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub total: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product: ProductRef,
    pub quantity: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: i32,
}

pub async fn get_cart(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<CartView>> {
    let items = state.cart.items(user_id).await.map_err(cart_error)?;
    let total = items
        .iter()
        .filter_map(CartLine::line_total)
        .fold(BigDecimal::from(0), |acc, line| acc + line);
    Ok(Json(CartView { items, total }))
}

pub async fn add_cart_item(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<AddItemRequest>,
) -> ApiResult<(StatusCode, Json<CartItem>)> {
    let item = state
        .cart
        .add_item(user_id, request.product, request.quantity.unwrap_or(1))
        .await
        .map_err(cart_error)?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_cart_item(
    State(state): State<AppState>,
    Path((user_id, line_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<QuantityRequest>,
) -> ApiResult<Json<CartItem>> {
    let item = state
        .cart
        .update_quantity(line_id, user_id, request.quantity)
        .await
        .map_err(cart_error)?;
    Ok(Json(item))
}

pub async fn remove_cart_item(
    State(state): State<AppState>,
    Path((user_id, line_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    state
        .cart
        .remove_item(line_id, user_id)
        .await
        .map_err(cart_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_cart(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let removed = state.cart.clear(user_id).await.map_err(cart_error)?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

pub async fn checkout(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = state
        .orders
        .checkout(user_id, request)
        .await
        .map_err(checkout_error)?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
) -> ApiResult<Json<Vec<Order>>> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(parse_status(raw)?),
        None => None,
    };
    let filter = OrderFilter {
        status,
        search: query.search,
    };
    let found = state.orders.find_all(filter).await.map_err(internal)?;
    Ok(Json(found))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    state
        .orders
        .find_by_id(order_id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, format!("order {} not found", order_id)))
}

pub async fn get_order_items(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<Vec<OrderItemDetail>>> {
    let items = state.orders.items(order_id).await.map_err(internal)?;
    Ok(Json(items))
}

pub async fn get_user_orders(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Order>>> {
    let found = state.orders.find_by_user(user_id).await.map_err(internal)?;
    Ok(Json(found))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<Order>> {
    let next = parse_status(&request.status)?;
    let order = state
        .orders
        .update_status(order_id, next)
        .await
        .map_err(status_error)?;
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub subtotal: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

pub async fn create_coupon(
    State(state): State<AppState>,
    Json(draft): Json<CouponDraft>,
) -> ApiResult<(StatusCode, Json<Coupon>)> {
    let coupon = state.coupons.create(draft).await.map_err(coupon_error)?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

pub async fn list_coupons(State(state): State<AppState>) -> ApiResult<Json<Vec<Coupon>>> {
    let all = state.coupons.list().await.map_err(coupon_error)?;
    Ok(Json(all))
}

pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(request): Json<ValidateCouponRequest>,
) -> ApiResult<Json<CouponQuote>> {
    let quote = state
        .coupons
        .validate(&request.code, &request.subtotal)
        .await
        .map_err(coupon_error)?;
    Ok(Json(quote))
}

pub async fn update_coupon(
    State(state): State<AppState>,
    Path(coupon_id): Path<Uuid>,
    Json(changes): Json<CouponUpdate>,
) -> ApiResult<Json<Coupon>> {
    let coupon = state
        .coupons
        .update(coupon_id, changes)
        .await
        .map_err(coupon_error)?;
    Ok(Json(coupon))
}

pub async fn delete_coupon(
    State(state): State<AppState>,
    Path(coupon_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.coupons.delete(coupon_id).await.map_err(coupon_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_coupon_active(
    State(state): State<AppState>,
    Path(coupon_id): Path<Uuid>,
    Json(request): Json<ActiveRequest>,
) -> ApiResult<Json<Coupon>> {
    let coupon = state
        .coupons
        .set_active(coupon_id, request.active)
        .await
        .map_err(coupon_error)?;
    Ok(Json(coupon))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub user_id: Uuid,
    pub filename: String,
    pub csv: String,
    #[serde(default)]
    pub mapping: ColumnMapping,
    pub duplicate_action: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub csv: String,
    #[serde(default)]
    pub mapping: ColumnMapping,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub total_rows: usize,
    pub valid_rows: Vec<ParsedRow>,
    pub errors: Vec<RowError>,
    pub duplicates: DuplicateReport,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn import_csv(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<Json<ImportSummary>> {
    let action = match request.duplicate_action.as_deref() {
        Some(raw) => raw
            .parse::<DuplicateAction>()
            .map_err(|e| reject(StatusCode::BAD_REQUEST, e.to_string()))?,
        None => DuplicateAction::default(),
    };
    let parsed = ImportService::parse(request.csv.as_bytes(), &request.mapping).map_err(import_error)?;

    info!(
        "Import of {} requested by {} ({} rows)",
        request.filename, request.user_id, parsed.total_rows
    );

    let summary = state
        .imports
        .import_cards(request.user_id, &request.filename, &parsed, action)
        .await
        .map_err(import_error)?;
    Ok(Json(summary))
}

pub async fn preview_csv(
    State(state): State<AppState>,
    Json(request): Json<PreviewRequest>,
) -> ApiResult<Json<PreviewResponse>> {
    let parsed = ImportService::parse(request.csv.as_bytes(), &request.mapping).map_err(import_error)?;
    let duplicates = state
        .imports
        .detect_duplicates(&parsed.rows)
        .await
        .map_err(import_error)?;
    Ok(Json(PreviewResponse {
        total_rows: parsed.total_rows,
        valid_rows: parsed.rows,
        errors: parsed.errors,
        duplicates,
    }))
}

pub async fn import_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<CsvImport>>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 100);
    let runs = state.imports.history(limit).await.map_err(import_error)?;
    Ok(Json(runs))
}

pub async fn get_import(
    State(state): State<AppState>,
    Path(import_id): Path<Uuid>,
) -> ApiResult<Json<CsvImport>> {
    state
        .imports
        .find(import_id)
        .await
        .map_err(import_error)?
        .map(Json)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, format!("import {} not found", import_id)))
}

pub async fn import_template() -> impl IntoResponse {
    let template = ImportService::template();
    (
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=card_import_template.csv",
            ),
        ],
        template.csv,
    )
}
