use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::supply::{SupplyCategory, SupplyLocation, SupplyStatus},
    errors::ServiceError,
    services::supplies::{
        AdjustRequest, CheckInRequest, CheckOutRequest, CreateSupplyRequest, SetStatusRequest,
        SupplyFilters, TransferRequest, UpdateSupplyRequest, WasteRequest,
    },
    ApiResponse, AppState, PaginatedResponse,
};

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SupplyListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub category: Option<SupplyCategory>,
    pub status: Option<SupplyStatus>,
    pub location: Option<SupplyLocation>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

/// Create the supplies router
pub fn supplies_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_supplies).post(create_supply))
        .route("/low-stock", get(get_low_stock))
        .route("/process-expired", post(process_expired))
        .route(
            "/:id",
            get(get_supply).put(update_supply).delete(delete_supply),
        )
        .route("/:id/check-out", post(check_out_supply))
        .route("/:id/check-in", post(check_in_supply))
        .route("/:id/waste", post(waste_supply))
        .route("/:id/adjust", post(adjust_supply))
        .route("/:id/transfer", post(transfer_supply))
        .route("/:id/status", put(set_supply_status))
        .route("/:id/transactions", get(list_supply_transactions))
}

/// List supplies with optional filtering
#[utoipa::path(
    get,
    path = "/api/v1/supplies",
    params(SupplyListQuery),
    responses(
        (status = 200, description = "Supply list returned"),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "supplies"
)]
pub async fn list_supplies(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SupplyListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let filters = SupplyFilters {
        category: query.category,
        status: query.status,
        location: query.location,
    };
    let (items, total) = state
        .supply_service
        .list_supplies(user.staff_id, filters, query.page, query.limit)
        .await?;

    let total_pages = total.div_ceil(query.limit.max(1));
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page: query.page,
        limit: query.limit,
        total_pages,
    })))
}

/// Create a new supply
#[utoipa::path(
    post,
    path = "/api/v1/supplies",
    request_body = CreateSupplyRequest,
    responses(
        (status = 201, description = "Supply created"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::errors::ErrorResponse)
    ),
    tag = "supplies"
)]
pub async fn create_supply(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateSupplyRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state
        .supply_service
        .create_supply(user.staff_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

/// Supplies at or below their minimum threshold
#[utoipa::path(
    get,
    path = "/api/v1/supplies/low-stock",
    responses(
        (status = 200, description = "Low stock report returned"),
        (status = 403, description = "Permission denied", body = crate::errors::ErrorResponse)
    ),
    tag = "supplies"
)]
pub async fn get_low_stock(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = state.supply_service.low_stock(user.staff_id).await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Zero out all expired supplies
#[utoipa::path(
    post,
    path = "/api/v1/supplies/process-expired",
    responses(
        (status = 200, description = "Sweep completed", body = crate::services::supplies::ExpirationSweepOutcome),
        (status = 403, description = "Permission denied", body = crate::errors::ErrorResponse)
    ),
    tag = "supplies"
)]
pub async fn process_expired(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.supply_service.process_expired(user.staff_id).await?;
    Ok(Json(outcome))
}

/// Get one supply
#[utoipa::path(
    get,
    path = "/api/v1/supplies/{id}",
    params(("id" = Uuid, Path, description = "Supply ID")),
    responses(
        (status = 200, description = "Supply returned"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "supplies"
)]
pub async fn get_supply(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let supply = state.supply_service.get_supply(id, user.staff_id).await?;
    Ok(Json(ApiResponse::success(supply)))
}

/// Administrative field update; quantity edits through this path are
/// reconciled by the status consistency check
#[utoipa::path(
    put,
    path = "/api/v1/supplies/{id}",
    params(("id" = Uuid, Path, description = "Supply ID")),
    request_body = UpdateSupplyRequest,
    responses(
        (status = 200, description = "Supply updated"),
        (status = 403, description = "Permission denied", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "supplies"
)]
pub async fn update_supply(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSupplyRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .supply_service
        .update_supply(id, user.staff_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Hard delete for administrative cleanup
#[utoipa::path(
    delete,
    path = "/api/v1/supplies/{id}",
    params(("id" = Uuid, Path, description = "Supply ID")),
    responses(
        (status = 204, description = "Supply deleted"),
        (status = 403, description = "Permission denied", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "supplies"
)]
pub async fn delete_supply(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.supply_service.delete_supply(id, user.staff_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Check out supplies for patient use
#[utoipa::path(
    post,
    path = "/api/v1/supplies/{id}/check-out",
    params(("id" = Uuid, Path, description = "Supply ID")),
    request_body = CheckOutRequest,
    responses(
        (status = 200, description = "Supply checked out", body = crate::services::supplies::MutationOutcome),
        (status = 403, description = "Permission denied", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient quantity", body = crate::errors::ErrorResponse)
    ),
    tag = "supplies"
)]
pub async fn check_out_supply(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CheckOutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .supply_service
        .check_out(id, user.staff_id, payload)
        .await?;
    Ok(Json(outcome))
}

/// Check in supplies (also restock and return)
#[utoipa::path(
    post,
    path = "/api/v1/supplies/{id}/check-in",
    params(("id" = Uuid, Path, description = "Supply ID")),
    request_body = CheckInRequest,
    responses(
        (status = 200, description = "Supply checked in", body = crate::services::supplies::MutationOutcome),
        (status = 403, description = "Permission denied", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "supplies"
)]
pub async fn check_in_supply(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CheckInRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .supply_service
        .check_in(id, user.staff_id, payload)
        .await?;
    Ok(Json(outcome))
}

/// Waste/discard supplies with a mandatory reason
#[utoipa::path(
    post,
    path = "/api/v1/supplies/{id}/waste",
    params(("id" = Uuid, Path, description = "Supply ID")),
    request_body = WasteRequest,
    responses(
        (status = 200, description = "Supply wasted", body = crate::services::supplies::MutationOutcome),
        (status = 403, description = "Permission denied", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient quantity", body = crate::errors::ErrorResponse)
    ),
    tag = "supplies"
)]
pub async fn waste_supply(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WasteRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.supply_service.waste(id, user.staff_id, payload).await?;
    Ok(Json(outcome))
}

/// Set the inventory to an absolute quantity
#[utoipa::path(
    post,
    path = "/api/v1/supplies/{id}/adjust",
    params(("id" = Uuid, Path, description = "Supply ID")),
    request_body = AdjustRequest,
    responses(
        (status = 200, description = "Inventory adjusted", body = crate::services::supplies::MutationOutcome),
        (status = 403, description = "Permission denied", body = crate::errors::ErrorResponse)
    ),
    tag = "supplies"
)]
pub async fn adjust_supply(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdjustRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .supply_service
        .adjust(id, user.staff_id, payload)
        .await?;
    Ok(Json(outcome))
}

/// Transfer supplies between locations
#[utoipa::path(
    post,
    path = "/api/v1/supplies/{id}/transfer",
    params(("id" = Uuid, Path, description = "Supply ID")),
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Supply transferred", body = crate::services::supplies::TransferOutcome),
        (status = 403, description = "Permission denied", body = crate::errors::ErrorResponse),
        (status = 422, description = "Precondition failed", body = crate::errors::ErrorResponse)
    ),
    tag = "supplies"
)]
pub async fn transfer_supply(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransferRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .supply_service
        .transfer(id, user.staff_id, payload)
        .await?;
    Ok(Json(outcome))
}

/// Set an administrative status (on_order / discontinued)
#[utoipa::path(
    put,
    path = "/api/v1/supplies/{id}/status",
    params(("id" = Uuid, Path, description = "Supply ID")),
    request_body = SetStatusRequest,
    responses(
        (status = 200, description = "Status set"),
        (status = 400, description = "Not an administrative status", body = crate::errors::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::errors::ErrorResponse)
    ),
    tag = "supplies"
)]
pub async fn set_supply_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .supply_service
        .set_status(id, user.staff_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Ledger entries for one supply, newest first
#[utoipa::path(
    get,
    path = "/api/v1/supplies/{id}/transactions",
    params(("id" = Uuid, Path, description = "Supply ID"), PageQuery),
    responses(
        (status = 200, description = "Transactions returned"),
        (status = 403, description = "Permission denied", body = crate::errors::ErrorResponse)
    ),
    tag = "supplies"
)]
pub async fn list_supply_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (items, total) = state
        .supply_service
        .list_transactions(id, user.staff_id, query.page, query.limit)
        .await?;

    let total_pages = total.div_ceil(query.limit.max(1));
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page: query.page,
        limit: query.limit,
        total_pages,
    })))
}
