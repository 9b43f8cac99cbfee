use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::supply::SupplyLocation;

/// Types of supply transactions recorded in the ledger
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[sea_orm(string_value = "check_in")]
    CheckIn,
    #[sea_orm(string_value = "check_out")]
    CheckOut,
    #[sea_orm(string_value = "restock")]
    Restock,
    #[sea_orm(string_value = "return")]
    Return,
    #[sea_orm(string_value = "waste")]
    Waste,
    #[sea_orm(string_value = "transfer")]
    Transfer,
    #[sea_orm(string_value = "adjust")]
    Adjust,
    #[sea_orm(string_value = "expire")]
    Expire,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::CheckIn => "check_in",
            TransactionType::CheckOut => "check_out",
            TransactionType::Restock => "restock",
            TransactionType::Return => "return",
            TransactionType::Waste => "waste",
            TransactionType::Transfer => "transfer",
            TransactionType::Adjust => "adjust",
            TransactionType::Expire => "expire",
        }
    }
}

/// Immutable ledger record of one inventory-changing event.
///
/// Rows are only ever inserted, inside the same database transaction as the
/// supply update they describe. No update or delete path exists.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = SupplyTransaction)]
#[sea_orm(table_name = "supply_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub supply_id: Uuid,
    /// Denormalized so the ledger stays readable after a supply is deleted
    pub supply_name: String,
    pub transaction_type: TransactionType,
    pub quantity: i32,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub performed_by: Option<Uuid>,
    pub performed_by_name: String,
    pub patient_id: Option<Uuid>,
    pub patient_name: Option<String>,
    pub source_location: Option<SupplyLocation>,
    pub destination_location: Option<SupplyLocation>,
    pub notes: Option<String>,
    pub lot_number: Option<String>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
