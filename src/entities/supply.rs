use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Supply categories for organization
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum SupplyCategory {
    #[sea_orm(string_value = "medication")]
    Medication,
    #[sea_orm(string_value = "disposable")]
    Disposable,
    #[sea_orm(string_value = "equipment")]
    Equipment,
    #[sea_orm(string_value = "ppe")]
    Ppe,
    #[sea_orm(string_value = "fluid")]
    Fluid,
    #[sea_orm(string_value = "diagnostic")]
    Diagnostic,
    #[sea_orm(string_value = "respiratory")]
    Respiratory,
    #[sea_orm(string_value = "trauma")]
    Trauma,
    #[sea_orm(string_value = "other")]
    Other,
}

/// Stock status of a supply.
///
/// `InStock`/`LowStock`/`CriticalStock` are derived from quantity thresholds;
/// `OnOrder` and `Discontinued` are administrative states set explicitly and
/// never produced by [`SupplyStatus::derive`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum SupplyStatus {
    #[sea_orm(string_value = "in_stock")]
    InStock,
    #[sea_orm(string_value = "low_stock")]
    LowStock,
    #[sea_orm(string_value = "critical_stock")]
    CriticalStock,
    #[sea_orm(string_value = "on_order")]
    OnOrder,
    #[sea_orm(string_value = "discontinued")]
    Discontinued,
}

impl SupplyStatus {
    /// Derive the stock status from the current quantity and thresholds.
    ///
    /// Total over all inputs; the three derived statuses partition the
    /// non-negative quantities with no gaps or overlaps when
    /// `critical <= minimum`.
    pub fn derive(current: i32, minimum: i32, critical: i32) -> SupplyStatus {
        if current <= 0 {
            SupplyStatus::CriticalStock
        } else if current <= critical {
            SupplyStatus::CriticalStock
        } else if current <= minimum {
            SupplyStatus::LowStock
        } else {
            SupplyStatus::InStock
        }
    }

    /// Whether this status was set administratively rather than derived.
    pub fn is_administrative(&self) -> bool {
        matches!(self, SupplyStatus::OnOrder | SupplyStatus::Discontinued)
    }
}

/// Units of measure for supplies
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum SupplyUnit {
    #[sea_orm(string_value = "each")]
    Each,
    #[sea_orm(string_value = "box")]
    Box,
    #[sea_orm(string_value = "case")]
    Case,
    #[sea_orm(string_value = "pack")]
    Pack,
    #[sea_orm(string_value = "bottle")]
    Bottle,
    #[sea_orm(string_value = "vial")]
    Vial,
    #[sea_orm(string_value = "ampule")]
    Ampule,
    #[sea_orm(string_value = "syringe")]
    Syringe,
    #[sea_orm(string_value = "bag")]
    Bag,
    #[sea_orm(string_value = "pair")]
    Pair,
    #[sea_orm(string_value = "roll")]
    Roll,
    #[sea_orm(string_value = "kit")]
    Kit,
}

/// Storage locations tracked by the department
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum SupplyLocation {
    #[sea_orm(string_value = "central_supply")]
    CentralSupply,
    #[sea_orm(string_value = "emergency_dept")]
    EmergencyDept,
    #[sea_orm(string_value = "trauma_room")]
    TraumaRoom,
    #[sea_orm(string_value = "med_surg")]
    MedSurg,
    #[sea_orm(string_value = "icu")]
    Icu,
    #[sea_orm(string_value = "pediatrics")]
    Pediatrics,
    #[sea_orm(string_value = "ob_gyn")]
    ObGyn,
    #[sea_orm(string_value = "operating_room")]
    OperatingRoom,
    #[sea_orm(string_value = "other")]
    Other,
}

impl SupplyLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupplyLocation::CentralSupply => "central_supply",
            SupplyLocation::EmergencyDept => "emergency_dept",
            SupplyLocation::TraumaRoom => "trauma_room",
            SupplyLocation::MedSurg => "med_surg",
            SupplyLocation::Icu => "icu",
            SupplyLocation::Pediatrics => "pediatrics",
            SupplyLocation::ObGyn => "ob_gyn",
            SupplyLocation::OperatingRoom => "operating_room",
            SupplyLocation::Other => "other",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = Supply)]
#[sea_orm(table_name = "supplies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: SupplyCategory,
    pub manufacturer: Option<String>,
    pub model_number: Option<String>,
    pub lot_number: Option<String>,
    pub status: SupplyStatus,
    pub current_quantity: i32,
    pub minimum_quantity: i32,
    pub critical_quantity: i32,
    pub unit: SupplyUnit,
    pub unit_price: Option<Decimal>,
    pub location: SupplyLocation,
    pub expiration_date: Option<DateTime<Utc>>,
    pub last_restock_date: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    /// Controlled substances require elevated, role-specific authorization
    pub is_controlled: bool,
    /// Whether a signature/authorization check applies on checkout
    pub requires_signature: bool,
    pub notes: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
