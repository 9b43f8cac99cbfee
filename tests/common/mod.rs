#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use medsupply_api::{
    auth::permissions::PermissionService,
    db::{self, DbConfig},
    entities::{
        audit_log::{self, Entity as AuditLog},
        staff_profile,
        supply::{self, Entity as Supply, SupplyCategory, SupplyLocation, SupplyStatus, SupplyUnit},
        supply_transaction::{self, Entity as SupplyTransaction},
    },
    events::{process_events, EventSender},
    services::{
        audit::{run_writer, AuditRecorder},
        supplies::SupplyService,
    },
};

pub struct TestContext {
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub service: SupplyService,
    pub audit: AuditRecorder,
}

impl TestContext {
    /// Build the full HTTP app around this context's services
    pub fn app(&self) -> (axum::Router, Arc<medsupply_api::auth::AuthService>) {
        let cfg = medsupply_api::config::AppConfig::new(
            "sqlite::memory:".into(),
            "test_secret_key_for_testing_purposes_only_32chars".into(),
            3600,
            "127.0.0.1".into(),
            18080,
            "test".into(),
        );
        let auth = Arc::new(medsupply_api::auth::AuthService::new((&cfg).into()));
        let permissions = PermissionService::new(self.db.clone());
        let (event_tx, event_rx) = mpsc::channel(100);
        tokio::spawn(process_events(event_rx, self.db.clone()));

        let state = medsupply_api::AppState {
            db: self.db.clone(),
            config: cfg,
            event_sender: EventSender::new(event_tx),
            supply_service: self.service.clone(),
            audit: self.audit.clone(),
            permissions,
            auth: auth.clone(),
        };

        let router = axum::Router::new()
            .nest("/api/v1", medsupply_api::api_v1_routes(auth.clone()))
            .with_state(state);
        (router, auth)
    }
}

/// Spin up an in-memory database with migrations applied, the event loop,
/// and the audit writer. A single-connection pool keeps the in-memory
/// database alive and shared.
pub async fn setup() -> TestContext {
    let cfg = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let pool = db::establish_connection_with_config(&cfg)
        .await
        .expect("db connect");
    db::run_migrations(&pool).await.expect("migrations");

    let db = Arc::new(pool);

    let (tx, rx) = mpsc::channel(100);
    let sender = EventSender::new(tx);
    tokio::spawn(process_events(rx, db.clone()));

    let (audit, audit_rx) = AuditRecorder::channel(100);
    tokio::spawn(run_writer(audit_rx, db.clone()));

    let permissions = PermissionService::new(db.clone());
    let service = SupplyService::new(db.clone(), sender, audit.clone(), permissions);

    TestContext { db, service, audit }
}

/// Insert a staff profile with the given roles and capability flags
pub async fn seed_staff(
    ctx: &TestContext,
    roles: &[&str],
    can_checkout: bool,
    can_manage: bool,
    can_controlled: bool,
) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now();
    staff_profile::ActiveModel {
        id: Set(id),
        display_name: Set(format!("Test {}", roles.join("/"))),
        email: Set(None),
        roles: Set(json!(roles)),
        can_checkout_supplies: Set(can_checkout),
        can_manage_inventory: Set(can_manage),
        can_access_controlled_substances: Set(can_controlled),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*ctx.db)
    .await
    .expect("seed staff profile");
    id
}

pub async fn seed_nurse(ctx: &TestContext) -> Uuid {
    seed_staff(ctx, &["nurse"], false, false, false).await
}

pub async fn seed_admin(ctx: &TestContext) -> Uuid {
    seed_staff(ctx, &["admin"], false, false, false).await
}

pub async fn seed_viewer(ctx: &TestContext) -> Uuid {
    seed_staff(ctx, &["viewer"], false, false, false).await
}

pub struct SupplySpec {
    pub quantity: i32,
    pub minimum: i32,
    pub critical: i32,
    pub location: SupplyLocation,
    pub is_controlled: bool,
    pub expiration: Option<DateTime<Utc>>,
}

impl Default for SupplySpec {
    fn default() -> Self {
        Self {
            quantity: 50,
            minimum: 20,
            critical: 5,
            location: SupplyLocation::EmergencyDept,
            is_controlled: false,
            expiration: None,
        }
    }
}

/// Insert a supply directly (bypassing the service) so tests control the
/// starting state without producing ledger entries
pub async fn seed_supply(ctx: &TestContext, spec: SupplySpec) -> supply::Model {
    let now = Utc::now();
    supply::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Saline 0.9% 1L".to_string()),
        description: Set("IV fluid bag".to_string()),
        category: Set(SupplyCategory::Fluid),
        manufacturer: Set(None),
        model_number: Set(None),
        lot_number: Set(None),
        status: Set(SupplyStatus::derive(spec.quantity, spec.minimum, spec.critical)),
        current_quantity: Set(spec.quantity),
        minimum_quantity: Set(spec.minimum),
        critical_quantity: Set(spec.critical),
        unit: Set(SupplyUnit::Bag),
        unit_price: Set(None),
        location: Set(spec.location),
        expiration_date: Set(spec.expiration),
        last_restock_date: Set(None),
        last_updated: Set(now),
        is_controlled: Set(spec.is_controlled),
        requires_signature: Set(spec.is_controlled),
        notes: Set(None),
    }
    .insert(&*ctx.db)
    .await
    .expect("seed supply")
}

pub async fn reload_supply(ctx: &TestContext, id: Uuid) -> supply::Model {
    Supply::find_by_id(id)
        .one(&*ctx.db)
        .await
        .expect("query supply")
        .expect("supply exists")
}

pub async fn ledger_for(ctx: &TestContext, supply_id: Uuid) -> Vec<supply_transaction::Model> {
    SupplyTransaction::find()
        .filter(supply_transaction::Column::SupplyId.eq(supply_id))
        .all(&*ctx.db)
        .await
        .expect("query ledger")
}

pub async fn audit_entries_for(ctx: &TestContext, operation: &str) -> Vec<audit_log::Model> {
    AuditLog::find()
        .filter(audit_log::Column::Operation.eq(operation))
        .all(&*ctx.db)
        .await
        .expect("query audit log")
}

/// Poll until the condition holds. Audit writes and status healing run on
/// detached tasks, so assertions against them need a bounded wait.
pub async fn wait_for<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - ChronoDuration::days(days)
}

pub fn days_from_now(days: i64) -> DateTime<Utc> {
    Utc::now() + ChronoDuration::days(days)
}

/// One day in the future, for supplies that must not expire during a test
pub fn not_expired() -> Option<DateTime<Utc>> {
    Some(days_from_now(30))
}
