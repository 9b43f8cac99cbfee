mod common;

use assert_matches::assert_matches;
use medsupply_api::entities::supply::{SupplyLocation, SupplyStatus};
use medsupply_api::entities::supply_transaction::TransactionType;
use medsupply_api::errors::ServiceError;
use medsupply_api::services::supplies::{
    AdjustRequest, CheckInKind, CheckInRequest, CheckOutRequest, TransferRequest, WasteRequest,
};
use uuid::Uuid;

use common::*;

fn check_out_req(quantity: i32) -> CheckOutRequest {
    CheckOutRequest {
        quantity,
        patient_id: None,
        patient_name: None,
        destination: None,
        notes: None,
    }
}

fn check_in_req(quantity: i32) -> CheckInRequest {
    CheckInRequest {
        quantity,
        kind: None,
        lot_number: None,
        expiration_date: None,
        source: None,
        notes: None,
    }
}

#[tokio::test]
async fn check_out_then_check_in_round_trips_quantity_and_status() {
    let ctx = setup().await;
    let nurse = seed_nurse(&ctx).await;
    let supply = seed_supply(&ctx, SupplySpec::default()).await;

    let before = reload_supply(&ctx, supply.id).await;

    let out = ctx
        .service
        .check_out(supply.id, nurse, check_out_req(7))
        .await
        .expect("check out");
    assert_eq!(out.previous_quantity, 50);
    assert_eq!(out.new_quantity, 43);

    let back = ctx
        .service
        .check_in(supply.id, nurse, check_in_req(7))
        .await
        .expect("check in");
    assert_eq!(back.new_quantity, 50);

    let after = reload_supply(&ctx, supply.id).await;
    assert_eq!(after.current_quantity, before.current_quantity);
    assert_eq!(after.status, before.status);

    let ledger = ledger_for(&ctx, supply.id).await;
    assert_eq!(ledger.len(), 2);
}

#[tokio::test]
async fn over_checkout_is_rejected_idempotently() {
    let ctx = setup().await;
    let nurse = seed_nurse(&ctx).await;
    let supply = seed_supply(
        &ctx,
        SupplySpec {
            quantity: 3,
            ..Default::default()
        },
    )
    .await;

    for _ in 0..2 {
        let err = ctx
            .service
            .check_out(supply.id, nurse, check_out_req(10))
            .await
            .expect_err("should reject");
        assert_eq!(err.kind(), "failed_precondition");
        assert_matches!(err, ServiceError::InsufficientStock(_));
    }

    let after = reload_supply(&ctx, supply.id).await;
    assert_eq!(after.current_quantity, 3);
    assert!(ledger_for(&ctx, supply.id).await.is_empty());
}

#[tokio::test]
async fn ledger_deltas_reconcile_with_current_quantity() {
    let ctx = setup().await;
    let nurse = seed_nurse(&ctx).await;
    let admin = seed_admin(&ctx).await;
    let supply = seed_supply(&ctx, SupplySpec::default()).await;
    let initial = 50;

    ctx.service
        .check_in(supply.id, nurse, check_in_req(5))
        .await
        .expect("check in");
    ctx.service
        .check_out(supply.id, nurse, check_out_req(12))
        .await
        .expect("check out");
    ctx.service
        .waste(
            supply.id,
            nurse,
            WasteRequest {
                quantity: 2,
                reason: "dropped on floor".into(),
            },
        )
        .await
        .expect("waste");
    ctx.service
        .adjust(
            supply.id,
            admin,
            AdjustRequest {
                new_quantity: 60,
                reason: "cycle count".into(),
            },
        )
        .await
        .expect("adjust");

    let after = reload_supply(&ctx, supply.id).await;
    let ledger = ledger_for(&ctx, supply.id).await;
    assert_eq!(ledger.len(), 4);

    // The signed per-entry deltas sum to the net quantity change, and each
    // entry's previous/new pair is internally consistent
    let net: i32 = ledger
        .iter()
        .map(|e| e.new_quantity - e.previous_quantity)
        .sum();
    assert_eq!(after.current_quantity, initial + net);
    assert_eq!(after.current_quantity, 60);
    for entry in &ledger {
        let delta = (entry.new_quantity - entry.previous_quantity).abs();
        assert_eq!(entry.quantity, delta);
    }
}

#[tokio::test]
async fn viewer_checkout_is_denied_and_audited() {
    let ctx = setup().await;
    let viewer = seed_viewer(&ctx).await;
    let supply = seed_supply(&ctx, SupplySpec::default()).await;

    let err = ctx
        .service
        .check_out(supply.id, viewer, check_out_req(1))
        .await
        .expect_err("viewer must not check out");
    assert_eq!(err.kind(), "permission_denied");

    let after = reload_supply(&ctx, supply.id).await;
    assert_eq!(after.current_quantity, 50);

    // The rejection itself must land in the audit trail
    let audited = wait_for(|| async {
        audit_entries_for(&ctx, "checkout_supply")
            .await
            .iter()
            .any(|e| !e.success && e.actor_id == Some(viewer))
    })
    .await;
    assert!(audited, "expected a failed audit entry for the denial");
}

#[tokio::test]
async fn controlled_substance_requires_the_explicit_flag() {
    let ctx = setup().await;
    let supply = seed_supply(
        &ctx,
        SupplySpec {
            is_controlled: true,
            ..Default::default()
        },
    )
    .await;

    // Plenty of stock, correct role, but no controlled-substance access
    let nurse = seed_nurse(&ctx).await;
    let err = ctx
        .service
        .check_out(supply.id, nurse, check_out_req(1))
        .await
        .expect_err("nurse without flag must be denied");
    assert_eq!(err.kind(), "permission_denied");

    // Same role with the flag passes
    let trusted_nurse = seed_staff(&ctx, &["nurse"], false, false, true).await;
    ctx.service
        .check_out(supply.id, trusted_nurse, check_out_req(1))
        .await
        .expect("nurse with controlled access");

    // Physicians pass without any flag
    let physician = seed_staff(&ctx, &["physician"], false, false, false).await;
    ctx.service
        .check_out(supply.id, physician, check_out_req(1))
        .await
        .expect("physician");
}

#[tokio::test]
async fn waste_of_controlled_substance_requires_manage_level() {
    let ctx = setup().await;
    let supply = seed_supply(
        &ctx,
        SupplySpec {
            is_controlled: true,
            ..Default::default()
        },
    )
    .await;

    // Physician passes the controlled gate but lacks manage permission
    let physician = seed_staff(&ctx, &["physician"], false, false, false).await;
    let err = ctx
        .service
        .waste(
            supply.id,
            physician,
            WasteRequest {
                quantity: 1,
                reason: "expired vial".into(),
            },
        )
        .await
        .expect_err("physician alone cannot waste controlled stock");
    assert_eq!(err.kind(), "permission_denied");

    let admin = seed_admin(&ctx).await;
    let out = ctx
        .service
        .waste(
            supply.id,
            admin,
            WasteRequest {
                quantity: 1,
                reason: "expired vial".into(),
            },
        )
        .await
        .expect("admin wastes controlled stock");
    assert_eq!(out.new_quantity, 49);

    let ledger = ledger_for(&ctx, supply.id).await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].transaction_type, TransactionType::Waste);
    assert_eq!(
        ledger[0].notes.as_deref(),
        Some("Reason for waste: expired vial")
    );
}

#[tokio::test]
async fn partial_transfer_keeps_location_full_transfer_moves_it() {
    let ctx = setup().await;
    let nurse = seed_nurse(&ctx).await;
    let supply = seed_supply(
        &ctx,
        SupplySpec {
            quantity: 10,
            location: SupplyLocation::EmergencyDept,
            ..Default::default()
        },
    )
    .await;

    let partial = ctx
        .service
        .transfer(
            supply.id,
            nurse,
            TransferRequest {
                quantity: 4,
                source: SupplyLocation::EmergencyDept,
                destination: SupplyLocation::TraumaRoom,
                notes: None,
            },
        )
        .await
        .expect("partial transfer");
    assert_eq!(partial.new_location, SupplyLocation::EmergencyDept);

    let after = reload_supply(&ctx, supply.id).await;
    assert_eq!(after.location, SupplyLocation::EmergencyDept);
    assert_eq!(after.current_quantity, 10);

    let ledger = ledger_for(&ctx, supply.id).await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].transaction_type, TransactionType::Transfer);
    assert_eq!(ledger[0].quantity, 4);
    assert_eq!(
        ledger[0].source_location,
        Some(SupplyLocation::EmergencyDept)
    );
    assert_eq!(
        ledger[0].destination_location,
        Some(SupplyLocation::TraumaRoom)
    );
    // Transfers move stock, not quantity
    assert_eq!(ledger[0].previous_quantity, ledger[0].new_quantity);

    let full = ctx
        .service
        .transfer(
            supply.id,
            nurse,
            TransferRequest {
                quantity: 10,
                source: SupplyLocation::EmergencyDept,
                destination: SupplyLocation::TraumaRoom,
                notes: None,
            },
        )
        .await
        .expect("full transfer");
    assert_eq!(full.new_location, SupplyLocation::TraumaRoom);

    let after = reload_supply(&ctx, supply.id).await;
    assert_eq!(after.location, SupplyLocation::TraumaRoom);
}

#[tokio::test]
async fn transfer_from_the_wrong_location_fails_the_precondition() {
    let ctx = setup().await;
    let nurse = seed_nurse(&ctx).await;
    let supply = seed_supply(
        &ctx,
        SupplySpec {
            location: SupplyLocation::Icu,
            ..Default::default()
        },
    )
    .await;

    let err = ctx
        .service
        .transfer(
            supply.id,
            nurse,
            TransferRequest {
                quantity: 1,
                source: SupplyLocation::EmergencyDept,
                destination: SupplyLocation::TraumaRoom,
                notes: None,
            },
        )
        .await
        .expect_err("wrong source location");
    assert_eq!(err.kind(), "failed_precondition");
    assert_matches!(err, ServiceError::FailedPrecondition(_));
}

#[tokio::test]
async fn transfer_to_the_same_location_is_invalid() {
    let ctx = setup().await;
    let nurse = seed_nurse(&ctx).await;
    let supply = seed_supply(&ctx, SupplySpec::default()).await;

    let err = ctx
        .service
        .transfer(
            supply.id,
            nurse,
            TransferRequest {
                quantity: 1,
                source: SupplyLocation::EmergencyDept,
                destination: SupplyLocation::EmergencyDept,
                notes: None,
            },
        )
        .await
        .expect_err("same source and destination");
    assert_eq!(err.kind(), "invalid_argument");
}

#[tokio::test]
async fn adjust_sets_an_absolute_quantity_and_rederives_status() {
    let ctx = setup().await;
    let admin = seed_admin(&ctx).await;
    let supply = seed_supply(&ctx, SupplySpec::default()).await;
    assert_eq!(supply.status, SupplyStatus::InStock);

    let out = ctx
        .service
        .adjust(
            supply.id,
            admin,
            AdjustRequest {
                new_quantity: 4,
                reason: "cycle count".into(),
            },
        )
        .await
        .expect("adjust");
    assert_eq!(out.new_quantity, 4);
    assert_eq!(out.status, SupplyStatus::CriticalStock);

    let ledger = ledger_for(&ctx, supply.id).await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].transaction_type, TransactionType::Adjust);
    // Ledger quantity records the absolute delta of the correction
    assert_eq!(ledger[0].quantity, 46);
    assert_eq!(ledger[0].notes.as_deref(), Some("cycle count"));
}

#[tokio::test]
async fn adjust_requires_manage_permission() {
    let ctx = setup().await;
    let nurse = seed_nurse(&ctx).await;
    let supply = seed_supply(&ctx, SupplySpec::default()).await;

    let err = ctx
        .service
        .adjust(
            supply.id,
            nurse,
            AdjustRequest {
                new_quantity: 10,
                reason: "cycle count".into(),
            },
        )
        .await
        .expect_err("nurse cannot adjust");
    assert_eq!(err.kind(), "permission_denied");
}

#[tokio::test]
async fn unknown_supply_is_not_found() {
    let ctx = setup().await;
    let nurse = seed_nurse(&ctx).await;

    let err = ctx
        .service
        .check_out(Uuid::new_v4(), nurse, check_out_req(1))
        .await
        .expect_err("missing supply");
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn unknown_actor_fails_closed() {
    let ctx = setup().await;
    let supply = seed_supply(&ctx, SupplySpec::default()).await;

    let err = ctx
        .service
        .check_out(supply.id, Uuid::new_v4(), check_out_req(1))
        .await
        .expect_err("unknown actor");
    assert_eq!(err.kind(), "permission_denied");
}

#[tokio::test]
async fn restock_check_in_records_restock_ledger_type_with_default_source() {
    let ctx = setup().await;
    let nurse = seed_nurse(&ctx).await;
    let supply = seed_supply(&ctx, SupplySpec::default()).await;

    ctx.service
        .check_in(
            supply.id,
            nurse,
            CheckInRequest {
                quantity: 20,
                kind: Some(CheckInKind::Restock),
                lot_number: Some("LOT-2209".into()),
                expiration_date: Some("2027-06-01T00:00:00Z".into()),
                source: None,
                notes: None,
            },
        )
        .await
        .expect("restock");

    let ledger = ledger_for(&ctx, supply.id).await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].transaction_type, TransactionType::Restock);
    assert_eq!(
        ledger[0].source_location,
        Some(SupplyLocation::CentralSupply)
    );
    assert_eq!(ledger[0].lot_number.as_deref(), Some("LOT-2209"));

    let after = reload_supply(&ctx, supply.id).await;
    assert_eq!(after.lot_number.as_deref(), Some("LOT-2209"));
    assert!(after.expiration_date.is_some());
    assert!(after.last_restock_date.is_some());
}

#[tokio::test]
async fn invalid_expiration_date_is_tolerated_on_check_in() {
    let ctx = setup().await;
    let nurse = seed_nurse(&ctx).await;
    let supply = seed_supply(&ctx, SupplySpec::default()).await;

    let out = ctx
        .service
        .check_in(
            supply.id,
            nurse,
            CheckInRequest {
                quantity: 5,
                kind: None,
                lot_number: None,
                expiration_date: Some("not-a-date".into()),
                source: None,
                notes: None,
            },
        )
        .await
        .expect("check in succeeds despite the bad date");
    assert_eq!(out.new_quantity, 55);

    let after = reload_supply(&ctx, supply.id).await;
    assert!(after.expiration_date.is_none());
}

#[tokio::test]
async fn sensitive_failures_escalate_audit_severity() {
    use medsupply_api::entities::audit_log::AuditSeverity;

    let ctx = setup().await;
    let viewer = seed_viewer(&ctx).await;
    let supply = seed_supply(&ctx, SupplySpec::default()).await;

    let _ = ctx
        .service
        .adjust(
            supply.id,
            viewer,
            AdjustRequest {
                new_quantity: 0,
                reason: "attempted tamper".into(),
            },
        )
        .await
        .expect_err("viewer cannot adjust");

    let escalated = wait_for(|| async {
        audit_entries_for(&ctx, "adjust_inventory")
            .await
            .iter()
            .any(|e| !e.success && e.severity == AuditSeverity::Critical)
    })
    .await;
    assert!(escalated, "failed adjust must audit as critical");
}
