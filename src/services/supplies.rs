use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::permissions::{OperationClass, PermissionService},
    entities::{
        supply::{self, Entity as Supply, SupplyCategory, SupplyLocation, SupplyStatus, SupplyUnit},
        supply_transaction::{self, Entity as SupplyTransaction, TransactionType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    middleware_helpers::retry::{with_retry, RetryConfig, TxnRetryPolicy},
    services::audit::AuditRecorder,
};

lazy_static! {
    static ref SUPPLY_MUTATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("supply_mutations_total", "Total number of supply mutations"),
        &["operation"]
    )
    .expect("metric can be created");
    static ref SUPPLY_MUTATION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "supply_mutation_failures_total",
            "Total number of failed supply mutations"
        ),
        &["operation", "kind"]
    )
    .expect("metric can be created");
}

pub const OP_CREATE: &str = "create_supply";
pub const OP_CHECKOUT: &str = "checkout_supply";
pub const OP_CHECKIN: &str = "checkin_supply";
pub const OP_WASTE: &str = "waste_supply";
pub const OP_ADJUST: &str = "adjust_inventory";
pub const OP_TRANSFER: &str = "transfer_supply";
pub const OP_PROCESS_EXPIRED: &str = "process_expired_supplies";
pub const OP_UPDATE: &str = "update_supply";
pub const OP_SET_STATUS: &str = "set_supply_status";
pub const OP_DELETE: &str = "delete_supply";

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckOutRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub patient_id: Option<Uuid>,
    #[validate(length(max = 200))]
    pub patient_name: Option<String>,
    pub destination: Option<SupplyLocation>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

/// Which inbound ledger type a check-in should record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckInKind {
    CheckIn,
    Restock,
    Return,
}

impl CheckInKind {
    fn transaction_type(self) -> TransactionType {
        match self {
            CheckInKind::CheckIn => TransactionType::CheckIn,
            CheckInKind::Restock => TransactionType::Restock,
            CheckInKind::Return => TransactionType::Return,
        }
    }

    /// Restocks default to arriving from central supply
    fn default_source(self) -> Option<SupplyLocation> {
        match self {
            CheckInKind::Restock => Some(SupplyLocation::CentralSupply),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckInRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Defaults to `check_in`; `restock` and `return` reuse the same path
    pub kind: Option<CheckInKind>,
    #[validate(length(max = 100))]
    pub lot_number: Option<String>,
    /// RFC 3339; an unparseable value is logged and skipped, not fatal
    pub expiration_date: Option<String>,
    pub source: Option<SupplyLocation>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct WasteRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AdjustRequest {
    /// Absolute quantity to set; the only operation that is not a delta
    #[validate(range(min = 0))]
    pub new_quantity: i32,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct TransferRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub source: SupplyLocation,
    pub destination: SupplyLocation,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateSupplyRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: SupplyCategory,
    pub manufacturer: Option<String>,
    pub model_number: Option<String>,
    pub lot_number: Option<String>,
    pub unit: SupplyUnit,
    pub unit_price: Option<Decimal>,
    pub location: SupplyLocation,
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub current_quantity: i32,
    #[validate(range(min = 0))]
    pub minimum_quantity: i32,
    #[validate(range(min = 0))]
    pub critical_quantity: i32,
    #[serde(default)]
    pub is_controlled: bool,
    #[serde(default)]
    pub requires_signature: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateSupplyRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub current_quantity: Option<i32>,
    #[validate(range(min = 0))]
    pub minimum_quantity: Option<i32>,
    #[validate(range(min = 0))]
    pub critical_quantity: Option<i32>,
    pub location: Option<SupplyLocation>,
    pub unit_price: Option<Decimal>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetStatusRequest {
    /// Must be one of the administrative statuses: `on_order`, `discontinued`
    pub status: SupplyStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SupplyFilters {
    pub category: Option<SupplyCategory>,
    pub status: Option<SupplyStatus>,
    pub location: Option<SupplyLocation>,
}

/// Result of a quantity-changing mutation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MutationOutcome {
    pub success: bool,
    pub supply_id: Uuid,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub status: SupplyStatus,
    pub timestamp: DateTime<Utc>,
}

/// Result of a transfer; quantity is unchanged, only location may move
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferOutcome {
    pub success: bool,
    pub supply_id: Uuid,
    pub quantity: i32,
    pub source: SupplyLocation,
    pub destination: SupplyLocation,
    pub new_location: SupplyLocation,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExpiredSupplySummary {
    pub id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub expiration_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExpirationSweepOutcome {
    pub success: bool,
    pub expired_count: usize,
    pub processed_supplies: Vec<ExpiredSupplySummary>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LowStockReport {
    pub low_stock_count: usize,
    pub critical_stock_count: usize,
    pub supplies: Vec<supply::Model>,
}

/// The supply mutation engine.
///
/// Sole writer of `supplies` and `supply_transactions`. Every mutation
/// validates, authorizes, re-checks preconditions against a fresh read
/// inside a database transaction, recomputes the derived status, and writes
/// the supply update and its ledger entry atomically. Audit entries are
/// queued after the transaction settles, success or failure.
#[derive(Clone)]
pub struct SupplyService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    audit: AuditRecorder,
    permissions: PermissionService,
    retry: RetryConfig,
}

impl SupplyService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        audit: AuditRecorder,
        permissions: PermissionService,
    ) -> Self {
        Self {
            db,
            event_sender,
            audit,
            permissions,
            retry: RetryConfig::default(),
        }
    }

    /// Check out supplies for patient use
    #[instrument(skip(self, request))]
    pub async fn check_out(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        request: CheckOutRequest,
    ) -> Result<MutationOutcome, ServiceError> {
        let details = json!({ "supply_id": supply_id, "request": request });
        let result = self.check_out_inner(supply_id, actor_id, &request).await;
        self.finish(OP_CHECKOUT, Some(actor_id), details, &result);
        result
    }

    async fn check_out_inner(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        request: &CheckOutRequest,
    ) -> Result<MutationOutcome, ServiceError> {
        request.validate()?;

        if !self
            .permissions
            .authorize(actor_id, OperationClass::Checkout)
            .await
        {
            return Err(ServiceError::PermissionDenied(
                "You do not have permission to check out supplies".into(),
            ));
        }

        let current = self.find_supply(supply_id).await?;

        if current.is_controlled || current.requires_signature {
            if !self
                .permissions
                .authorize_controlled_substance(actor_id)
                .await
            {
                return Err(ServiceError::PermissionDenied(
                    "You do not have permission to check out controlled substances".into(),
                ));
            }
        }

        // Optimistic check for fast feedback; the transaction is authoritative
        if current.current_quantity < request.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Requested: {}, Available: {}",
                request.quantity, current.current_quantity
            )));
        }

        let actor_name = self.permissions.display_name(actor_id).await;
        let outcome = with_retry(&self.retry, TxnRetryPolicy, || {
            self.check_out_txn(supply_id, actor_id, actor_name.clone(), request.clone())
        })
        .await?;

        info!(
            supply_id = %supply_id,
            quantity = %request.quantity,
            new_quantity = %outcome.new_quantity,
            "Supply checked out"
        );
        self.emit(Event::SupplyCheckedOut {
            supply_id,
            quantity: request.quantity,
            new_quantity: outcome.new_quantity,
        })
        .await;

        Ok(outcome)
    }

    async fn check_out_txn(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        actor_name: String,
        request: CheckOutRequest,
    ) -> Result<MutationOutcome, ServiceError> {
        self.db
            .transaction::<_, MutationOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    // Fresh read closes the race between the optimistic check and commit
                    let latest = Supply::find_by_id(supply_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| ServiceError::NotFound("Supply not found".into()))?;

                    if latest.current_quantity < request.quantity {
                        return Err(ServiceError::InsufficientStock(format!(
                            "Requested: {}, Available: {}",
                            request.quantity, latest.current_quantity
                        )));
                    }

                    let previous_quantity = latest.current_quantity;
                    let new_quantity = previous_quantity - request.quantity;
                    let new_status = SupplyStatus::derive(
                        new_quantity,
                        latest.minimum_quantity,
                        latest.critical_quantity,
                    );
                    let now = Utc::now();
                    let supply_name = latest.name.clone();

                    let mut active: supply::ActiveModel = latest.into();
                    active.current_quantity = Set(new_quantity);
                    active.status = Set(new_status);
                    active.last_updated = Set(now);
                    active.update(txn).await.map_err(ServiceError::db_error)?;

                    let entry = supply_transaction::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        supply_id: Set(supply_id),
                        supply_name: Set(supply_name),
                        transaction_type: Set(TransactionType::CheckOut),
                        quantity: Set(request.quantity),
                        previous_quantity: Set(previous_quantity),
                        new_quantity: Set(new_quantity),
                        performed_by: Set(Some(actor_id)),
                        performed_by_name: Set(actor_name),
                        patient_id: Set(request.patient_id),
                        patient_name: Set(request.patient_name),
                        source_location: Set(None),
                        destination_location: Set(request.destination),
                        notes: Set(request.notes),
                        lot_number: Set(None),
                        expiration_date: Set(None),
                        created_at: Set(now),
                    };
                    entry.insert(txn).await.map_err(ServiceError::db_error)?;

                    Ok(MutationOutcome {
                        success: true,
                        supply_id,
                        previous_quantity,
                        new_quantity,
                        status: new_status,
                        timestamp: now,
                    })
                })
            })
            .await
            .map_err(unwrap_txn_err)
    }

    /// Check in supplies; restock and return are variants of the same path
    #[instrument(skip(self, request))]
    pub async fn check_in(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        request: CheckInRequest,
    ) -> Result<MutationOutcome, ServiceError> {
        let details = json!({ "supply_id": supply_id, "request": request });
        let result = self.check_in_inner(supply_id, actor_id, &request).await;
        self.finish(OP_CHECKIN, Some(actor_id), details, &result);
        result
    }

    async fn check_in_inner(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        request: &CheckInRequest,
    ) -> Result<MutationOutcome, ServiceError> {
        request.validate()?;

        if !self
            .permissions
            .authorize(actor_id, OperationClass::Checkin)
            .await
        {
            return Err(ServiceError::PermissionDenied(
                "You do not have permission to check in supplies".into(),
            ));
        }

        // Existence check before entering the transaction
        self.find_supply(supply_id).await?;

        let actor_name = self.permissions.display_name(actor_id).await;
        let expiration = parse_expiration(request.expiration_date.as_deref());
        let outcome = with_retry(&self.retry, TxnRetryPolicy, || {
            self.check_in_txn(
                supply_id,
                actor_id,
                actor_name.clone(),
                request.clone(),
                expiration,
            )
        })
        .await?;

        info!(
            supply_id = %supply_id,
            quantity = %request.quantity,
            new_quantity = %outcome.new_quantity,
            "Supply checked in"
        );
        self.emit(Event::SupplyCheckedIn {
            supply_id,
            quantity: request.quantity,
            new_quantity: outcome.new_quantity,
        })
        .await;

        Ok(outcome)
    }

    async fn check_in_txn(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        actor_name: String,
        request: CheckInRequest,
        expiration: Option<DateTime<Utc>>,
    ) -> Result<MutationOutcome, ServiceError> {
        self.db
            .transaction::<_, MutationOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let latest = Supply::find_by_id(supply_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound("Supply not found during transaction".into())
                        })?;

                    let kind = request.kind.unwrap_or(CheckInKind::CheckIn);
                    let previous_quantity = latest.current_quantity;
                    let new_quantity = previous_quantity + request.quantity;
                    let new_status = SupplyStatus::derive(
                        new_quantity,
                        latest.minimum_quantity,
                        latest.critical_quantity,
                    );
                    let now = Utc::now();
                    let supply_name = latest.name.clone();

                    let mut active: supply::ActiveModel = latest.into();
                    active.current_quantity = Set(new_quantity);
                    active.status = Set(new_status);
                    active.last_updated = Set(now);
                    active.last_restock_date = Set(Some(now));
                    if let Some(lot) = request.lot_number.clone() {
                        active.lot_number = Set(Some(lot));
                    }
                    if let Some(exp) = expiration {
                        active.expiration_date = Set(Some(exp));
                    }
                    active.update(txn).await.map_err(ServiceError::db_error)?;

                    let entry = supply_transaction::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        supply_id: Set(supply_id),
                        supply_name: Set(supply_name),
                        transaction_type: Set(kind.transaction_type()),
                        quantity: Set(request.quantity),
                        previous_quantity: Set(previous_quantity),
                        new_quantity: Set(new_quantity),
                        performed_by: Set(Some(actor_id)),
                        performed_by_name: Set(actor_name),
                        patient_id: Set(None),
                        patient_name: Set(None),
                        source_location: Set(request.source.or_else(|| kind.default_source())),
                        destination_location: Set(None),
                        notes: Set(request.notes),
                        lot_number: Set(request.lot_number),
                        expiration_date: Set(expiration),
                        created_at: Set(now),
                    };
                    entry.insert(txn).await.map_err(ServiceError::db_error)?;

                    Ok(MutationOutcome {
                        success: true,
                        supply_id,
                        previous_quantity,
                        new_quantity,
                        status: new_status,
                        timestamp: now,
                    })
                })
            })
            .await
            .map_err(unwrap_txn_err)
    }

    /// Waste/discard supplies with a mandatory reason
    #[instrument(skip(self, request))]
    pub async fn waste(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        request: WasteRequest,
    ) -> Result<MutationOutcome, ServiceError> {
        let details = json!({ "supply_id": supply_id, "request": request });
        let result = self.waste_inner(supply_id, actor_id, &request).await;
        self.finish(OP_WASTE, Some(actor_id), details, &result);
        result
    }

    async fn waste_inner(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        request: &WasteRequest,
    ) -> Result<MutationOutcome, ServiceError> {
        request.validate()?;

        let current = self.find_supply(supply_id).await?;

        // Controlled substances require manage-level permission plus the
        // controlled-substance gate; everything else needs checkout only
        if current.is_controlled {
            if !self
                .permissions
                .authorize_controlled_substance(actor_id)
                .await
            {
                return Err(ServiceError::PermissionDenied(
                    "You do not have permission to waste controlled substances".into(),
                ));
            }
            if !self
                .permissions
                .authorize(actor_id, OperationClass::Manage)
                .await
            {
                return Err(ServiceError::PermissionDenied(
                    "You do not have permission to waste supplies".into(),
                ));
            }
        } else if !self
            .permissions
            .authorize(actor_id, OperationClass::Checkout)
            .await
        {
            return Err(ServiceError::PermissionDenied(
                "You do not have permission to waste supplies".into(),
            ));
        }

        if current.current_quantity < request.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Requested: {}, Available: {}",
                request.quantity, current.current_quantity
            )));
        }

        let actor_name = self.permissions.display_name(actor_id).await;
        let outcome = with_retry(&self.retry, TxnRetryPolicy, || {
            self.waste_txn(supply_id, actor_id, actor_name.clone(), request.clone())
        })
        .await?;

        info!(
            supply_id = %supply_id,
            quantity = %request.quantity,
            reason = %request.reason,
            "Supply wasted"
        );
        self.emit(Event::SupplyWasted {
            supply_id,
            quantity: request.quantity,
            new_quantity: outcome.new_quantity,
        })
        .await;

        Ok(outcome)
    }

    async fn waste_txn(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        actor_name: String,
        request: WasteRequest,
    ) -> Result<MutationOutcome, ServiceError> {
        self.db
            .transaction::<_, MutationOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let latest = Supply::find_by_id(supply_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| ServiceError::NotFound("Supply not found".into()))?;

                    if latest.current_quantity < request.quantity {
                        return Err(ServiceError::InsufficientStock(format!(
                            "Requested: {}, Available: {}",
                            request.quantity, latest.current_quantity
                        )));
                    }

                    let previous_quantity = latest.current_quantity;
                    let new_quantity = previous_quantity - request.quantity;
                    let new_status = SupplyStatus::derive(
                        new_quantity,
                        latest.minimum_quantity,
                        latest.critical_quantity,
                    );
                    let now = Utc::now();
                    let supply_name = latest.name.clone();

                    let mut active: supply::ActiveModel = latest.into();
                    active.current_quantity = Set(new_quantity);
                    active.status = Set(new_status);
                    active.last_updated = Set(now);
                    active.update(txn).await.map_err(ServiceError::db_error)?;

                    let entry = supply_transaction::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        supply_id: Set(supply_id),
                        supply_name: Set(supply_name),
                        transaction_type: Set(TransactionType::Waste),
                        quantity: Set(request.quantity),
                        previous_quantity: Set(previous_quantity),
                        new_quantity: Set(new_quantity),
                        performed_by: Set(Some(actor_id)),
                        performed_by_name: Set(actor_name),
                        patient_id: Set(None),
                        patient_name: Set(None),
                        source_location: Set(None),
                        destination_location: Set(None),
                        notes: Set(Some(format!("Reason for waste: {}", request.reason))),
                        lot_number: Set(None),
                        expiration_date: Set(None),
                        created_at: Set(now),
                    };
                    entry.insert(txn).await.map_err(ServiceError::db_error)?;

                    Ok(MutationOutcome {
                        success: true,
                        supply_id,
                        previous_quantity,
                        new_quantity,
                        status: new_status,
                        timestamp: now,
                    })
                })
            })
            .await
            .map_err(unwrap_txn_err)
    }

    /// Set the inventory to an absolute quantity (administrative correction)
    #[instrument(skip(self, request))]
    pub async fn adjust(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        request: AdjustRequest,
    ) -> Result<MutationOutcome, ServiceError> {
        let details = json!({ "supply_id": supply_id, "request": request });
        let result = self.adjust_inner(supply_id, actor_id, &request).await;
        self.finish(OP_ADJUST, Some(actor_id), details, &result);
        result
    }

    async fn adjust_inner(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        request: &AdjustRequest,
    ) -> Result<MutationOutcome, ServiceError> {
        request.validate()?;

        if !self
            .permissions
            .authorize(actor_id, OperationClass::Manage)
            .await
        {
            return Err(ServiceError::PermissionDenied(
                "You do not have permission to adjust inventory".into(),
            ));
        }

        self.find_supply(supply_id).await?;

        let actor_name = self.permissions.display_name(actor_id).await;
        let outcome = with_retry(&self.retry, TxnRetryPolicy, || {
            self.adjust_txn(supply_id, actor_id, actor_name.clone(), request.clone())
        })
        .await?;

        info!(
            supply_id = %supply_id,
            previous_quantity = %outcome.previous_quantity,
            new_quantity = %outcome.new_quantity,
            reason = %request.reason,
            "Inventory adjusted"
        );
        self.emit(Event::InventoryAdjusted {
            supply_id,
            previous_quantity: outcome.previous_quantity,
            new_quantity: outcome.new_quantity,
        })
        .await;

        Ok(outcome)
    }

    async fn adjust_txn(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        actor_name: String,
        request: AdjustRequest,
    ) -> Result<MutationOutcome, ServiceError> {
        self.db
            .transaction::<_, MutationOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let latest = Supply::find_by_id(supply_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| ServiceError::NotFound("Supply not found".into()))?;

                    // Absolute set: any value is legal, so there is no
                    // staleness precondition beyond the transaction itself
                    let previous_quantity = latest.current_quantity;
                    let new_quantity = request.new_quantity;
                    let new_status = SupplyStatus::derive(
                        new_quantity,
                        latest.minimum_quantity,
                        latest.critical_quantity,
                    );
                    let now = Utc::now();
                    let supply_name = latest.name.clone();

                    let mut active: supply::ActiveModel = latest.into();
                    active.current_quantity = Set(new_quantity);
                    active.status = Set(new_status);
                    active.last_updated = Set(now);
                    active.update(txn).await.map_err(ServiceError::db_error)?;

                    let entry = supply_transaction::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        supply_id: Set(supply_id),
                        supply_name: Set(supply_name),
                        transaction_type: Set(TransactionType::Adjust),
                        quantity: Set((new_quantity - previous_quantity).abs()),
                        previous_quantity: Set(previous_quantity),
                        new_quantity: Set(new_quantity),
                        performed_by: Set(Some(actor_id)),
                        performed_by_name: Set(actor_name),
                        patient_id: Set(None),
                        patient_name: Set(None),
                        source_location: Set(None),
                        destination_location: Set(None),
                        notes: Set(Some(request.reason)),
                        lot_number: Set(None),
                        expiration_date: Set(None),
                        created_at: Set(now),
                    };
                    entry.insert(txn).await.map_err(ServiceError::db_error)?;

                    Ok(MutationOutcome {
                        success: true,
                        supply_id,
                        previous_quantity,
                        new_quantity,
                        status: new_status,
                        timestamp: now,
                    })
                })
            })
            .await
            .map_err(unwrap_txn_err)
    }

    /// Transfer supplies between locations.
    ///
    /// The model tracks one location per supply: a full-quantity transfer
    /// moves the supply's location, a partial transfer only records the
    /// movement in the ledger.
    #[instrument(skip(self, request))]
    pub async fn transfer(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        request: TransferRequest,
    ) -> Result<TransferOutcome, ServiceError> {
        let details = json!({ "supply_id": supply_id, "request": request });
        let result = self.transfer_inner(supply_id, actor_id, &request).await;
        self.finish(OP_TRANSFER, Some(actor_id), details, &result);
        result
    }

    async fn transfer_inner(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, ServiceError> {
        request.validate()?;

        if request.source == request.destination {
            return Err(ServiceError::ValidationError(
                "Source and destination locations must be different".into(),
            ));
        }

        if !self
            .permissions
            .authorize(actor_id, OperationClass::Checkin)
            .await
        {
            return Err(ServiceError::PermissionDenied(
                "You do not have permission to transfer supplies".into(),
            ));
        }

        let current = self.find_supply(supply_id).await?;

        if current.location != request.source {
            return Err(ServiceError::FailedPrecondition(format!(
                "Supply is not at the specified source location. Current location: {}",
                current.location.as_str()
            )));
        }

        if current.current_quantity < request.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Requested: {}, Available: {}",
                request.quantity, current.current_quantity
            )));
        }

        let actor_name = self.permissions.display_name(actor_id).await;
        let outcome = with_retry(&self.retry, TxnRetryPolicy, || {
            self.transfer_txn(supply_id, actor_id, actor_name.clone(), request.clone())
        })
        .await?;

        info!(
            supply_id = %supply_id,
            quantity = %request.quantity,
            source = %request.source.as_str(),
            destination = %request.destination.as_str(),
            "Supply transferred"
        );
        self.emit(Event::SupplyTransferred {
            supply_id,
            quantity: request.quantity,
            source: request.source,
            destination: request.destination,
        })
        .await;

        Ok(outcome)
    }

    async fn transfer_txn(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        actor_name: String,
        request: TransferRequest,
    ) -> Result<TransferOutcome, ServiceError> {
        self.db
            .transaction::<_, TransferOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let latest = Supply::find_by_id(supply_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| ServiceError::NotFound("Supply not found".into()))?;

                    if latest.location != request.source {
                        return Err(ServiceError::FailedPrecondition(format!(
                            "Supply is not at the specified source location. Current location: {}",
                            latest.location.as_str()
                        )));
                    }

                    if latest.current_quantity < request.quantity {
                        return Err(ServiceError::InsufficientStock(format!(
                            "Requested: {}, Available: {}",
                            request.quantity, latest.current_quantity
                        )));
                    }

                    let quantity_on_hand = latest.current_quantity;
                    // Only a full transfer moves the supply's location
                    let new_location = if request.quantity == quantity_on_hand {
                        request.destination
                    } else {
                        latest.location
                    };
                    let now = Utc::now();
                    let supply_name = latest.name.clone();

                    let mut active: supply::ActiveModel = latest.into();
                    active.location = Set(new_location);
                    active.last_updated = Set(now);
                    active.update(txn).await.map_err(ServiceError::db_error)?;

                    let entry = supply_transaction::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        supply_id: Set(supply_id),
                        supply_name: Set(supply_name),
                        transaction_type: Set(TransactionType::Transfer),
                        quantity: Set(request.quantity),
                        // Quantity doesn't change; only the location may
                        previous_quantity: Set(quantity_on_hand),
                        new_quantity: Set(quantity_on_hand),
                        performed_by: Set(Some(actor_id)),
                        performed_by_name: Set(actor_name),
                        patient_id: Set(None),
                        patient_name: Set(None),
                        source_location: Set(Some(request.source)),
                        destination_location: Set(Some(request.destination)),
                        notes: Set(Some(request.notes.unwrap_or_else(|| {
                            format!(
                                "Transferred from {} to {}",
                                request.source.as_str(),
                                request.destination.as_str()
                            )
                        }))),
                        lot_number: Set(None),
                        expiration_date: Set(None),
                        created_at: Set(now),
                    };
                    entry.insert(txn).await.map_err(ServiceError::db_error)?;

                    Ok(TransferOutcome {
                        success: true,
                        supply_id,
                        quantity: request.quantity,
                        source: request.source,
                        destination: request.destination,
                        new_location,
                        timestamp: now,
                    })
                })
            })
            .await
            .map_err(unwrap_txn_err)
    }

    /// Zero out every expired supply (manage-gated endpoint)
    #[instrument(skip(self))]
    pub async fn process_expired(
        &self,
        actor_id: Uuid,
    ) -> Result<ExpirationSweepOutcome, ServiceError> {
        let result = self.process_expired_inner(actor_id).await;
        let details = match &result {
            Ok(outcome) => json!({
                "expired_count": outcome.expired_count,
                "processed_supplies": outcome.processed_supplies,
            }),
            Err(_) => json!({}),
        };
        self.finish(OP_PROCESS_EXPIRED, Some(actor_id), details, &result);
        result
    }

    async fn process_expired_inner(
        &self,
        actor_id: Uuid,
    ) -> Result<ExpirationSweepOutcome, ServiceError> {
        if !self
            .permissions
            .authorize(actor_id, OperationClass::Manage)
            .await
        {
            return Err(ServiceError::PermissionDenied(
                "You do not have permission to process expired supplies".into(),
            ));
        }

        let actor_name = self.permissions.display_name(actor_id).await;
        self.run_expiration_sweep(Some(actor_id), &actor_name).await
    }

    /// Expiration sweep shared by the endpoint and the scheduled task.
    ///
    /// Each expired supply is processed in its own transaction; one failure
    /// is logged and skipped without aborting the rest of the batch.
    pub async fn run_expiration_sweep(
        &self,
        actor_id: Option<Uuid>,
        actor_name: &str,
    ) -> Result<ExpirationSweepOutcome, ServiceError> {
        let now = Utc::now();
        let expired = Supply::find()
            .filter(supply::Column::ExpirationDate.lt(now))
            .filter(supply::Column::CurrentQuantity.gt(0))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut processed = Vec::new();

        for candidate in expired {
            let supply_id = candidate.id;
            let result = with_retry(&self.retry, TxnRetryPolicy, || {
                self.expire_txn(supply_id, actor_id, actor_name.to_string())
            })
            .await;

            match result {
                Ok(Some(summary)) => {
                    self.emit(Event::SupplyExpired {
                        supply_id,
                        quantity_discarded: summary.quantity,
                    })
                    .await;
                    processed.push(summary);
                }
                Ok(None) => {} // drained concurrently; nothing to expire
                Err(e) => {
                    warn!(
                        supply_id = %supply_id,
                        error = %e,
                        "Failed to process expired supply; continuing with the rest"
                    );
                }
            }
        }

        info!(count = processed.len(), "Expiration sweep completed");

        Ok(ExpirationSweepOutcome {
            success: true,
            expired_count: processed.len(),
            processed_supplies: processed,
            timestamp: Utc::now(),
        })
    }

    async fn expire_txn(
        &self,
        supply_id: Uuid,
        actor_id: Option<Uuid>,
        actor_name: String,
    ) -> Result<Option<ExpiredSupplySummary>, ServiceError> {
        self.db
            .transaction::<_, Option<ExpiredSupplySummary>, ServiceError>(move |txn| {
                Box::pin(async move {
                    let Some(latest) = Supply::find_by_id(supply_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                    else {
                        return Ok(None);
                    };

                    if latest.current_quantity <= 0 {
                        return Ok(None);
                    }

                    let discarded = latest.current_quantity;
                    let expiration_date = latest.expiration_date;
                    let now = Utc::now();
                    let supply_name = latest.name.clone();

                    let mut active: supply::ActiveModel = latest.into();
                    active.current_quantity = Set(0);
                    active.status = Set(SupplyStatus::CriticalStock);
                    active.last_updated = Set(now);
                    active.update(txn).await.map_err(ServiceError::db_error)?;

                    let notes = match expiration_date {
                        Some(date) => format!(
                            "Automatically processed expired supply. Expiration date: {}",
                            date.format("%Y-%m-%d")
                        ),
                        None => "Automatically processed expired supply".to_string(),
                    };

                    let entry = supply_transaction::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        supply_id: Set(supply_id),
                        supply_name: Set(supply_name.clone()),
                        transaction_type: Set(TransactionType::Expire),
                        quantity: Set(discarded),
                        previous_quantity: Set(discarded),
                        new_quantity: Set(0),
                        performed_by: Set(actor_id),
                        performed_by_name: Set(actor_name),
                        patient_id: Set(None),
                        patient_name: Set(None),
                        source_location: Set(None),
                        destination_location: Set(None),
                        notes: Set(Some(notes)),
                        lot_number: Set(None),
                        expiration_date: Set(expiration_date),
                        created_at: Set(now),
                    };
                    entry.insert(txn).await.map_err(ServiceError::db_error)?;

                    Ok(Some(ExpiredSupplySummary {
                        id: supply_id,
                        name: supply_name,
                        quantity: discarded,
                        expiration_date,
                    }))
                })
            })
            .await
            .map_err(unwrap_txn_err)
    }

    /// Create a supply, recording an initial restock ledger entry when it
    /// arrives with stock on hand
    #[instrument(skip(self, request))]
    pub async fn create_supply(
        &self,
        actor_id: Uuid,
        request: CreateSupplyRequest,
    ) -> Result<supply::Model, ServiceError> {
        let details = json!({ "request": request });
        let result = self.create_supply_inner(actor_id, &request).await;
        self.finish(OP_CREATE, Some(actor_id), details, &result);
        result
    }

    async fn create_supply_inner(
        &self,
        actor_id: Uuid,
        request: &CreateSupplyRequest,
    ) -> Result<supply::Model, ServiceError> {
        request.validate()?;

        if request.critical_quantity > request.minimum_quantity {
            return Err(ServiceError::ValidationError(
                "critical_quantity must not exceed minimum_quantity".into(),
            ));
        }

        if !self
            .permissions
            .authorize(actor_id, OperationClass::Manage)
            .await
        {
            return Err(ServiceError::PermissionDenied(
                "You do not have permission to create supplies".into(),
            ));
        }

        let actor_name = self.permissions.display_name(actor_id).await;
        let created = with_retry(&self.retry, TxnRetryPolicy, || {
            self.create_supply_txn(actor_id, actor_name.clone(), request.clone())
        })
        .await?;

        info!(supply_id = %created.id, name = %created.name, "Supply created");
        self.emit(Event::SupplyCreated {
            supply_id: created.id,
            initial_quantity: created.current_quantity,
        })
        .await;

        Ok(created)
    }

    async fn create_supply_txn(
        &self,
        actor_id: Uuid,
        actor_name: String,
        request: CreateSupplyRequest,
    ) -> Result<supply::Model, ServiceError> {
        self.db
            .transaction::<_, supply::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let id = Uuid::new_v4();
                    let status = SupplyStatus::derive(
                        request.current_quantity,
                        request.minimum_quantity,
                        request.critical_quantity,
                    );

                    let model = supply::ActiveModel {
                        id: Set(id),
                        name: Set(request.name.clone()),
                        description: Set(request.description.clone()),
                        category: Set(request.category),
                        manufacturer: Set(request.manufacturer.clone()),
                        model_number: Set(request.model_number.clone()),
                        lot_number: Set(request.lot_number.clone()),
                        status: Set(status),
                        current_quantity: Set(request.current_quantity),
                        minimum_quantity: Set(request.minimum_quantity),
                        critical_quantity: Set(request.critical_quantity),
                        unit: Set(request.unit),
                        unit_price: Set(request.unit_price),
                        location: Set(request.location),
                        expiration_date: Set(request.expiration_date),
                        last_restock_date: Set((request.current_quantity > 0).then_some(now)),
                        last_updated: Set(now),
                        is_controlled: Set(request.is_controlled),
                        requires_signature: Set(request.requires_signature),
                        notes: Set(request.notes.clone()),
                    };
                    let created = model.insert(txn).await.map_err(ServiceError::db_error)?;

                    if request.current_quantity > 0 {
                        let entry = supply_transaction::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            supply_id: Set(id),
                            supply_name: Set(request.name.clone()),
                            transaction_type: Set(TransactionType::Restock),
                            quantity: Set(request.current_quantity),
                            previous_quantity: Set(0),
                            new_quantity: Set(request.current_quantity),
                            performed_by: Set(Some(actor_id)),
                            performed_by_name: Set(actor_name),
                            patient_id: Set(None),
                            patient_name: Set(None),
                            source_location: Set(None),
                            destination_location: Set(Some(request.location)),
                            notes: Set(Some("Initial stock".to_string())),
                            lot_number: Set(request.lot_number),
                            expiration_date: Set(request.expiration_date),
                            created_at: Set(now),
                        };
                        entry.insert(txn).await.map_err(ServiceError::db_error)?;
                    }

                    Ok(created)
                })
            })
            .await
            .map_err(unwrap_txn_err)
    }

    /// Administrative field update outside the mutation engine's ledgered
    /// operations. A quantity edited through here is reconciled by the
    /// status consistency check, not ledgered.
    #[instrument(skip(self, request))]
    pub async fn update_supply(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        request: UpdateSupplyRequest,
    ) -> Result<supply::Model, ServiceError> {
        let details = json!({ "supply_id": supply_id, "request": request });
        let result = self.update_supply_inner(supply_id, actor_id, &request).await;
        self.finish(OP_UPDATE, Some(actor_id), details, &result);
        result
    }

    async fn update_supply_inner(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        request: &UpdateSupplyRequest,
    ) -> Result<supply::Model, ServiceError> {
        request.validate()?;

        if !self
            .permissions
            .authorize(actor_id, OperationClass::Manage)
            .await
        {
            return Err(ServiceError::PermissionDenied(
                "You do not have permission to update supplies".into(),
            ));
        }

        let current = self.find_supply(supply_id).await?;

        let minimum = request.minimum_quantity.unwrap_or(current.minimum_quantity);
        let critical = request
            .critical_quantity
            .unwrap_or(current.critical_quantity);
        if critical > minimum {
            return Err(ServiceError::ValidationError(
                "critical_quantity must not exceed minimum_quantity".into(),
            ));
        }

        let mut active: supply::ActiveModel = current.into();
        if let Some(name) = request.name.clone() {
            active.name = Set(name);
        }
        if let Some(description) = request.description.clone() {
            active.description = Set(description);
        }
        if let Some(quantity) = request.current_quantity {
            active.current_quantity = Set(quantity);
        }
        if let Some(minimum) = request.minimum_quantity {
            active.minimum_quantity = Set(minimum);
        }
        if let Some(critical) = request.critical_quantity {
            active.critical_quantity = Set(critical);
        }
        if let Some(location) = request.location {
            active.location = Set(location);
        }
        if let Some(price) = request.unit_price {
            active.unit_price = Set(Some(price));
        }
        if let Some(expiration) = request.expiration_date {
            active.expiration_date = Set(Some(expiration));
        }
        if let Some(notes) = request.notes.clone() {
            active.notes = Set(Some(notes));
        }
        active.last_updated = Set(Utc::now());

        let updated = active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        self.emit(Event::SupplyUpdated { supply_id }).await;

        Ok(updated)
    }

    /// Set an administrative status (`on_order` or `discontinued`).
    ///
    /// The consistency check never touches administrative statuses, so this
    /// sticks until quantity is next adjusted through the engine.
    #[instrument(skip(self, request))]
    pub async fn set_status(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        request: SetStatusRequest,
    ) -> Result<supply::Model, ServiceError> {
        let details = json!({ "supply_id": supply_id, "status": request.status });
        let result = self.set_status_inner(supply_id, actor_id, &request).await;
        self.finish(OP_SET_STATUS, Some(actor_id), details, &result);
        result
    }

    async fn set_status_inner(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        request: &SetStatusRequest,
    ) -> Result<supply::Model, ServiceError> {
        if !request.status.is_administrative() {
            return Err(ServiceError::InvalidOperation(
                "Only on_order and discontinued may be set directly; stock statuses are derived"
                    .into(),
            ));
        }

        if !self
            .permissions
            .authorize(actor_id, OperationClass::Manage)
            .await
        {
            return Err(ServiceError::PermissionDenied(
                "You do not have permission to set supply status".into(),
            ));
        }

        let current = self.find_supply(supply_id).await?;

        let mut active: supply::ActiveModel = current.into();
        active.status = Set(request.status);
        active.last_updated = Set(Utc::now());
        let updated = active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        self.emit(Event::SupplyStatusOverridden {
            supply_id,
            status: request.status,
        })
        .await;

        Ok(updated)
    }

    /// Hard delete, reserved for administrative cleanup. Normal retirement
    /// goes through the `discontinued` status instead.
    #[instrument(skip(self))]
    pub async fn delete_supply(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
    ) -> Result<(), ServiceError> {
        let details = json!({ "supply_id": supply_id });
        let result = self.delete_supply_inner(supply_id, actor_id).await;
        self.finish(OP_DELETE, Some(actor_id), details, &result);
        result
    }

    async fn delete_supply_inner(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
    ) -> Result<(), ServiceError> {
        if !self
            .permissions
            .authorize(actor_id, OperationClass::Manage)
            .await
        {
            return Err(ServiceError::PermissionDenied(
                "You do not have permission to delete supplies".into(),
            ));
        }

        let current = self.find_supply(supply_id).await?;
        current
            .delete(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        self.emit(Event::SupplyDeleted { supply_id }).await;

        Ok(())
    }

    /// Fetch one supply
    #[instrument(skip(self))]
    pub async fn get_supply(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
    ) -> Result<supply::Model, ServiceError> {
        if !self
            .permissions
            .authorize(actor_id, OperationClass::Read)
            .await
        {
            return Err(ServiceError::PermissionDenied(
                "You do not have permission to view supplies".into(),
            ));
        }
        self.find_supply(supply_id).await
    }

    /// List supplies with optional filters and pagination
    #[instrument(skip(self))]
    pub async fn list_supplies(
        &self,
        actor_id: Uuid,
        filters: SupplyFilters,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<supply::Model>, u64), ServiceError> {
        if !self
            .permissions
            .authorize(actor_id, OperationClass::Read)
            .await
        {
            return Err(ServiceError::PermissionDenied(
                "You do not have permission to view supplies".into(),
            ));
        }

        let mut query = Supply::find().order_by_asc(supply::Column::Name);
        if let Some(category) = filters.category {
            query = query.filter(supply::Column::Category.eq(category));
        }
        if let Some(status) = filters.status {
            query = query.filter(supply::Column::Status.eq(status));
        }
        if let Some(location) = filters.location {
            query = query.filter(supply::Column::Location.eq(location));
        }

        let paginator = query.paginate(&*self.db, limit.max(1));
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page.max(1) - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((items, total))
    }

    /// Supplies at or below their minimum threshold
    #[instrument(skip(self))]
    pub async fn low_stock(&self, actor_id: Uuid) -> Result<LowStockReport, ServiceError> {
        if !self
            .permissions
            .authorize(actor_id, OperationClass::Read)
            .await
        {
            return Err(ServiceError::PermissionDenied(
                "You do not have permission to view stock levels".into(),
            ));
        }

        let supplies = Supply::find()
            .filter(
                supply::Column::Status
                    .is_in([SupplyStatus::LowStock, SupplyStatus::CriticalStock]),
            )
            .order_by_asc(supply::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let low_stock_count = supplies
            .iter()
            .filter(|s| s.status == SupplyStatus::LowStock)
            .count();
        let critical_stock_count = supplies
            .iter()
            .filter(|s| s.status == SupplyStatus::CriticalStock)
            .count();

        Ok(LowStockReport {
            low_stock_count,
            critical_stock_count,
            supplies,
        })
    }

    /// Ledger entries for one supply, newest first
    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        supply_id: Uuid,
        actor_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<supply_transaction::Model>, u64), ServiceError> {
        if !self
            .permissions
            .authorize(actor_id, OperationClass::Read)
            .await
        {
            return Err(ServiceError::PermissionDenied(
                "You do not have permission to view supply transactions".into(),
            ));
        }

        let paginator = SupplyTransaction::find()
            .filter(supply_transaction::Column::SupplyId.eq(supply_id))
            .order_by_desc(supply_transaction::Column::CreatedAt)
            .paginate(&*self.db, limit.max(1));

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page.max(1) - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((items, total))
    }

    async fn find_supply(&self, supply_id: Uuid) -> Result<supply::Model, ServiceError> {
        Supply::find_by_id(supply_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound("Supply not found".into()))
    }

    /// Record the operation's audit entry and bump metrics.
    ///
    /// Runs after the primary operation settled either way; the recorder is
    /// non-blocking and can't change the result.
    fn finish<T>(
        &self,
        operation: &str,
        actor_id: Option<Uuid>,
        details: serde_json::Value,
        result: &Result<T, ServiceError>,
    ) {
        match result {
            Ok(_) => {
                SUPPLY_MUTATIONS.with_label_values(&[operation]).inc();
                self.audit.record(operation, actor_id, details, true, None);
            }
            Err(e) => {
                SUPPLY_MUTATION_FAILURES
                    .with_label_values(&[operation, e.kind()])
                    .inc();
                self.audit
                    .record(operation, actor_id, details, false, Some(e.to_string()));
            }
        }
    }

    /// Publish an event. The mutation already committed, so a full or closed
    /// channel is logged rather than surfaced.
    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            warn!("Failed to publish supply event: {}", e);
        }
    }
}

fn unwrap_txn_err(e: TransactionError<ServiceError>) -> ServiceError {
    match e {
        TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}

/// Parse an RFC 3339 expiration date. Invalid input is tolerated: the value
/// is logged and skipped rather than failing the check-in.
fn parse_expiration(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(e) => {
            warn!(value = %raw, error = %e, "Invalid expiration date format; skipping");
            None
        }
    }
}
