use sea_orm::{DatabaseConnection, EntityTrait};
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::warn;
use uuid::Uuid;

use crate::entities::staff_profile::{self, Entity as StaffProfile};

/// Closed set of staff roles.
///
/// Authorization decisions match exhaustively against these variants; role
/// strings that don't parse grant nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Staff,
    Nurse,
    Physician,
    Pharmacist,
    Admin,
    InventoryManager,
    Viewer,
}

/// Classes of supply operations gated by the permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum OperationClass {
    Read,
    Checkout,
    Checkin,
    Manage,
}

/// Pure authorization decision for an operation class.
///
/// Kept free of I/O so the role matrix is unit-testable on its own.
fn decide(operation: OperationClass, roles: &[Role], profile: &staff_profile::Model) -> bool {
    match operation {
        // Everyone with a resolvable profile can read
        OperationClass::Read => true,
        OperationClass::Checkout => {
            roles.iter().any(|r| {
                matches!(r, Role::Staff | Role::Nurse | Role::Physician | Role::Admin)
            }) || profile.can_checkout_supplies
        }
        OperationClass::Checkin => {
            roles
                .iter()
                .any(|r| matches!(r, Role::Admin | Role::InventoryManager | Role::Nurse))
                || profile.can_manage_inventory
        }
        OperationClass::Manage => {
            roles
                .iter()
                .any(|r| matches!(r, Role::Admin | Role::InventoryManager))
                || profile.can_manage_inventory
        }
    }
}

/// Pure controlled-substance decision
fn decide_controlled(roles: &[Role], profile: &staff_profile::Model) -> bool {
    roles.iter().any(|r| {
        matches!(r, Role::Physician | Role::Pharmacist | Role::Admin)
    }) || (roles.contains(&Role::Nurse) && profile.can_access_controlled_substances)
}

/// Parse the profile's JSON role array against the closed [`Role`] set.
/// Unrecognized entries are dropped with a warning.
pub fn parse_roles(profile: &staff_profile::Model) -> Vec<Role> {
    let Some(entries) = profile.roles.as_array() else {
        warn!(staff_id = %profile.id, "Staff profile roles field is not an array");
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|v| v.as_str())
        .filter_map(|s| match s.parse::<Role>() {
            Ok(role) => Some(role),
            Err(_) => {
                warn!(staff_id = %profile.id, role = %s, "Ignoring unknown role on staff profile");
                None
            }
        })
        .collect()
}

/// Authorization oracle over stored staff profiles.
///
/// Every check resolves the actor's profile fresh from the database and
/// fails closed: a missing profile, unreadable roles, or a database error
/// all deny the operation rather than erroring out.
#[derive(Clone)]
pub struct PermissionService {
    db: Arc<DatabaseConnection>,
}

impl PermissionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Fetch a staff profile by id
    pub async fn profile(&self, actor_id: Uuid) -> Option<staff_profile::Model> {
        match StaffProfile::find_by_id(actor_id).one(&*self.db).await {
            Ok(profile) => {
                if profile.is_none() {
                    warn!(staff_id = %actor_id, "Staff profile not found");
                }
                profile
            }
            Err(e) => {
                warn!(staff_id = %actor_id, error = %e, "Failed to load staff profile; denying");
                None
            }
        }
    }

    /// Check whether the actor may perform the given operation class
    pub async fn authorize(&self, actor_id: Uuid, operation: OperationClass) -> bool {
        let Some(profile) = self.profile(actor_id).await else {
            return false;
        };
        let roles = parse_roles(&profile);
        decide(operation, &roles, &profile)
    }

    /// Check whether the actor may handle controlled substances
    pub async fn authorize_controlled_substance(&self, actor_id: Uuid) -> bool {
        let Some(profile) = self.profile(actor_id).await else {
            return false;
        };
        let roles = parse_roles(&profile);
        decide_controlled(&roles, &profile)
    }

    /// Display name for ledger attribution; falls back when the profile is
    /// missing so attribution never blocks a mutation.
    pub async fn display_name(&self, actor_id: Uuid) -> String {
        self.profile(actor_id)
            .await
            .map(|p| p.display_name)
            .unwrap_or_else(|| "Unknown User".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn profile_with(roles: serde_json::Value) -> staff_profile::Model {
        staff_profile::Model {
            id: Uuid::new_v4(),
            display_name: "Test Staff".into(),
            email: None,
            roles,
            can_checkout_supplies: false,
            can_manage_inventory: false,
            can_access_controlled_substances: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn viewer_can_read_but_not_mutate() {
        let profile = profile_with(json!(["viewer"]));
        let roles = parse_roles(&profile);

        assert!(decide(OperationClass::Read, &roles, &profile));
        assert!(!decide(OperationClass::Checkout, &roles, &profile));
        assert!(!decide(OperationClass::Checkin, &roles, &profile));
        assert!(!decide(OperationClass::Manage, &roles, &profile));
    }

    #[test]
    fn nurse_can_checkout_and_checkin_but_not_manage() {
        let profile = profile_with(json!(["nurse"]));
        let roles = parse_roles(&profile);

        assert!(decide(OperationClass::Checkout, &roles, &profile));
        assert!(decide(OperationClass::Checkin, &roles, &profile));
        assert!(!decide(OperationClass::Manage, &roles, &profile));
    }

    #[test]
    fn inventory_manager_can_manage_but_not_checkout() {
        let profile = profile_with(json!(["inventory_manager"]));
        let roles = parse_roles(&profile);

        assert!(!decide(OperationClass::Checkout, &roles, &profile));
        assert!(decide(OperationClass::Checkin, &roles, &profile));
        assert!(decide(OperationClass::Manage, &roles, &profile));
    }

    #[test]
    fn capability_flags_override_roles() {
        let mut profile = profile_with(json!(["viewer"]));
        profile.can_checkout_supplies = true;
        let roles = parse_roles(&profile);
        assert!(decide(OperationClass::Checkout, &roles, &profile));

        let mut profile = profile_with(json!(["viewer"]));
        profile.can_manage_inventory = true;
        let roles = parse_roles(&profile);
        assert!(decide(OperationClass::Checkin, &roles, &profile));
        assert!(decide(OperationClass::Manage, &roles, &profile));
    }

    #[test]
    fn controlled_substance_gate() {
        for role in ["physician", "pharmacist", "admin"] {
            let profile = profile_with(json!([role]));
            let roles = parse_roles(&profile);
            assert!(decide_controlled(&roles, &profile), "{role} should pass");
        }

        // Nurse needs the explicit flag
        let profile = profile_with(json!(["nurse"]));
        let roles = parse_roles(&profile);
        assert!(!decide_controlled(&roles, &profile));

        let mut profile = profile_with(json!(["nurse"]));
        profile.can_access_controlled_substances = true;
        let roles = parse_roles(&profile);
        assert!(decide_controlled(&roles, &profile));

        // The flag alone is not enough without the nurse role
        let mut profile = profile_with(json!(["staff"]));
        profile.can_access_controlled_substances = true;
        let roles = parse_roles(&profile);
        assert!(!decide_controlled(&roles, &profile));
    }

    #[test]
    fn unknown_roles_are_ignored() {
        let profile = profile_with(json!(["superuser", "nurse"]));
        let roles = parse_roles(&profile);
        assert_eq!(roles, vec![Role::Nurse]);
    }

    #[test]
    fn malformed_roles_grant_nothing() {
        let profile = profile_with(json!("nurse"));
        let roles = parse_roles(&profile);
        assert!(roles.is_empty());
        assert!(!decide(OperationClass::Checkout, &roles, &profile));
    }
}
