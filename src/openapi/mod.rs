use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MedSupply API",
        version = "0.2.0",
        description = r#"
# Emergency Department Medical Supply Inventory API

Tracks medical supplies through their full lifecycle: check-out for patient
use, check-in/restock/return, waste with mandatory reasons, location
transfers, absolute adjustments, and automatic expiration processing.

Every quantity change writes an immutable ledger entry in the same database
transaction, and every operation attempt (including rejected ones) is
recorded in an independent audit trail.

## Authentication

All endpoints under `/api/v1` (except status and health) require a JWT
bearer token whose subject is a staff profile id:

```
Authorization: Bearer <your-jwt-token>
```

Authorization is role-based per operation: check-out requires clinical
staff roles, check-in and transfers require inventory roles, and
management operations (adjust, create, expire processing) require admin or
inventory-manager roles. Controlled substances require additional
role-specific access.
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "supplies", description = "Supply inventory operations"),
        (name = "audit", description = "Audit trail queries"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::supplies::list_supplies,
        crate::handlers::supplies::create_supply,
        crate::handlers::supplies::get_low_stock,
        crate::handlers::supplies::process_expired,
        crate::handlers::supplies::get_supply,
        crate::handlers::supplies::update_supply,
        crate::handlers::supplies::delete_supply,
        crate::handlers::supplies::check_out_supply,
        crate::handlers::supplies::check_in_supply,
        crate::handlers::supplies::waste_supply,
        crate::handlers::supplies::adjust_supply,
        crate::handlers::supplies::transfer_supply,
        crate::handlers::supplies::set_supply_status,
        crate::handlers::supplies::list_supply_transactions,
        crate::handlers::audit_logs::list_audit_logs,
    ),
    components(
        schemas(
            crate::entities::supply::Model,
            crate::entities::supply::SupplyCategory,
            crate::entities::supply::SupplyStatus,
            crate::entities::supply::SupplyUnit,
            crate::entities::supply::SupplyLocation,
            crate::entities::supply_transaction::Model,
            crate::entities::supply_transaction::TransactionType,
            crate::entities::audit_log::Model,
            crate::entities::audit_log::AuditSeverity,
            crate::services::supplies::CheckOutRequest,
            crate::services::supplies::CheckInRequest,
            crate::services::supplies::CheckInKind,
            crate::services::supplies::WasteRequest,
            crate::services::supplies::AdjustRequest,
            crate::services::supplies::TransferRequest,
            crate::services::supplies::CreateSupplyRequest,
            crate::services::supplies::UpdateSupplyRequest,
            crate::services::supplies::SetStatusRequest,
            crate::services::supplies::MutationOutcome,
            crate::services::supplies::TransferOutcome,
            crate::services::supplies::ExpirationSweepOutcome,
            crate::services::supplies::ExpiredSupplySummary,
            crate::services::supplies::LowStockReport,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
