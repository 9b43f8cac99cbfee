mod common;

use medsupply_api::services::supplies::CheckOutRequest;

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

// Two simultaneous checkouts for the full remaining quantity: the
// in-transaction recheck must let exactly one through.
#[tokio::test]
async fn racing_checkouts_for_the_last_stock_yield_one_winner() {
    let ctx = setup().await;
    let nurse = seed_nurse(&ctx).await;
    let supply = seed_supply(
        &ctx,
        SupplySpec {
            quantity: 8,
            ..Default::default()
        },
    )
    .await;

    let a = {
        let service = ctx.service.clone();
        let id = supply.id;
        tokio::spawn(async move { service.check_out(id, nurse, check_out_req(8)).await })
    };
    let b = {
        let service = ctx.service.clone();
        let id = supply.id;
        tokio::spawn(async move { service.check_out(id, nurse, check_out_req(8)).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let rejections = results
        .iter()
        .filter(|r| {
            matches!(r, Err(e) if e.kind() == "failed_precondition")
        })
        .count();

    assert_eq!(successes, 1, "exactly one checkout may win");
    assert_eq!(rejections, 1, "the loser must see failed_precondition");

    let after = reload_supply(&ctx, supply.id).await;
    assert_eq!(after.current_quantity, 0);
    assert_eq!(ledger_for(&ctx, supply.id).await.len(), 1);
}

// Many small concurrent checkouts must never overdraw the stock.
#[tokio::test]
async fn concurrent_unit_checkouts_never_overdraw() {
    let ctx = setup().await;
    let nurse = seed_nurse(&ctx).await;
    let supply = seed_supply(
        &ctx,
        SupplySpec {
            quantity: 10,
            ..Default::default()
        },
    )
    .await;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let service = ctx.service.clone();
        let id = supply.id;
        tasks.push(tokio::spawn(async move {
            service.check_out(id, nurse, check_out_req(1)).await.is_ok()
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap_or(false) {
            successes += 1;
        }
    }

    assert_eq!(
        successes, 10,
        "exactly 10 unit checkouts should succeed; got {}",
        successes
    );

    let after = reload_supply(&ctx, supply.id).await;
    assert_eq!(after.current_quantity, 0);
    assert_eq!(ledger_for(&ctx, supply.id).await.len(), 10);
}
