use serde_json::json;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::services::audit::AuditRecorder;
use crate::services::supplies::{SupplyService, OP_PROCESS_EXPIRED};

/// Actor name recorded on ledger entries written by the scheduled sweep
const SWEEP_ACTOR_NAME: &str = "Scheduled Expiration Sweep";

/// Start the background expiration sweep.
///
/// Reuses the same per-supply transaction path as the manage-gated endpoint,
/// attributed to a system actor instead of a staff profile. Every run is
/// audited, success or failure.
pub fn start_sweeper(
    service: SupplyService,
    audit: AuditRecorder,
    interval_secs: u64,
) -> JoinHandle<()> {
    info!(
        interval_secs = interval_secs,
        "Starting scheduled expiration sweep"
    );

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so the sweep starts
        // one full interval after boot
        interval.tick().await;

        loop {
            interval.tick().await;

            match service.run_expiration_sweep(None, SWEEP_ACTOR_NAME).await {
                Ok(outcome) => {
                    info!(
                        expired_count = outcome.expired_count,
                        "Scheduled expiration sweep completed"
                    );
                    audit.record(
                        OP_PROCESS_EXPIRED,
                        None,
                        json!({
                            "scheduled": true,
                            "expired_count": outcome.expired_count,
                            "processed_supplies": outcome.processed_supplies,
                        }),
                        true,
                        None,
                    );
                }
                Err(e) => {
                    error!(error = %e, "Scheduled expiration sweep failed");
                    audit.record(
                        OP_PROCESS_EXPIRED,
                        None,
                        json!({ "scheduled": true }),
                        false,
                        Some(e.to_string()),
                    );
                }
            }
        }
    })
}
