use axum::{
    extract::{Extension, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    auth::permissions::OperationClass,
    auth::AuthUser,
    entities::audit_log::AuditSeverity,
    errors::ServiceError,
    services::audit::{self, AuditLogFilters},
    ApiResponse, AppState, PaginatedResponse,
};

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    50
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditLogQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub severity: Option<AuditSeverity>,
    pub operation: Option<String>,
    pub actor_id: Option<Uuid>,
    pub success: Option<bool>,
}

pub fn audit_logs_router() -> Router<AppState> {
    Router::new().route("/", get(list_audit_logs))
}

/// Query the audit trail (inventory managers and admins only)
#[utoipa::path(
    get,
    path = "/api/v1/audit-logs",
    params(AuditLogQuery),
    responses(
        (status = 200, description = "Audit entries returned"),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::errors::ErrorResponse)
    ),
    tag = "audit"
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<AuditLogQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    if !state
        .permissions
        .authorize(user.staff_id, OperationClass::Manage)
        .await
    {
        return Err(ServiceError::PermissionDenied(
            "You do not have permission to view audit logs".into(),
        ));
    }

    let filters = AuditLogFilters {
        severity: query.severity,
        operation: query.operation,
        actor_id: query.actor_id,
        success: query.success,
    };
    let (items, total) = audit::list_entries(&state.db, &filters, query.page, query.limit).await?;

    let total_pages = total.div_ceil(query.limit.max(1));
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page: query.page,
        limit: query.limit,
        total_pages,
    })))
}
