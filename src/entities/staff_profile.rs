use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Staff identity profile consulted for every authorization decision.
///
/// `roles` is a JSON array of role strings parsed against the closed
/// [`crate::auth::permissions::Role`] enumeration; unrecognized entries are
/// ignored with a warning rather than granting anything.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "staff_profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
    pub roles: Json,
    /// Override flag: checkout allowed regardless of role
    pub can_checkout_supplies: bool,
    /// Override flag: check-in/manage allowed regardless of role
    pub can_manage_inventory: bool,
    /// Required (together with the nurse role) for controlled substances
    pub can_access_controlled_substances: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
