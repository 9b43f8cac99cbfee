use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::supply::{self, Entity as Supply, SupplyLocation, SupplyStatus};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Events emitted by the supply write paths.
///
/// Every variant names a supply that was just written; the processing loop
/// uses that to re-verify the derived status after each write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    SupplyCreated {
        supply_id: Uuid,
        initial_quantity: i32,
    },
    SupplyCheckedOut {
        supply_id: Uuid,
        quantity: i32,
        new_quantity: i32,
    },
    SupplyCheckedIn {
        supply_id: Uuid,
        quantity: i32,
        new_quantity: i32,
    },
    SupplyWasted {
        supply_id: Uuid,
        quantity: i32,
        new_quantity: i32,
    },
    InventoryAdjusted {
        supply_id: Uuid,
        previous_quantity: i32,
        new_quantity: i32,
    },
    SupplyTransferred {
        supply_id: Uuid,
        quantity: i32,
        source: SupplyLocation,
        destination: SupplyLocation,
    },
    SupplyExpired {
        supply_id: Uuid,
        quantity_discarded: i32,
    },
    /// Administrative edit through the direct update path; quantity may have
    /// changed without going through the mutation engine
    SupplyUpdated {
        supply_id: Uuid,
    },
    SupplyStatusOverridden {
        supply_id: Uuid,
        status: SupplyStatus,
    },
    SupplyDeleted {
        supply_id: Uuid,
    },
}

impl Event {
    /// The supply this event concerns
    pub fn supply_id(&self) -> Uuid {
        match self {
            Event::SupplyCreated { supply_id, .. }
            | Event::SupplyCheckedOut { supply_id, .. }
            | Event::SupplyCheckedIn { supply_id, .. }
            | Event::SupplyWasted { supply_id, .. }
            | Event::InventoryAdjusted { supply_id, .. }
            | Event::SupplyTransferred { supply_id, .. }
            | Event::SupplyExpired { supply_id, .. }
            | Event::SupplyUpdated { supply_id }
            | Event::SupplyStatusOverridden { supply_id, .. }
            | Event::SupplyDeleted { supply_id } => *supply_id,
        }
    }

    /// Whether the status consistency check should run for this event
    fn needs_status_check(&self) -> bool {
        !matches!(
            self,
            Event::SupplyDeleted { .. } | Event::SupplyStatusOverridden { .. }
        )
    }
}

/// Process incoming events and re-verify derived state after each write.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, db: Arc<DatabaseConnection>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!("Received event: {:?}", event);

        if event.needs_status_check() {
            let supply_id = event.supply_id();
            if let Err(e) = heal_supply_status(&db, supply_id).await {
                error!(
                    "Failed status consistency check: supply_id={}, error={}",
                    supply_id, e
                );
            }
        }
    }

    info!("Event processing loop stopped");
}

/// Re-derive a supply's status from its quantity and correct it if the stored
/// value disagrees. Self-heals after out-of-band quantity edits.
///
/// Administrative statuses (`on_order`, `discontinued`) are left untouched;
/// only an explicit override may move a supply out of them.
pub async fn heal_supply_status(
    db: &DatabaseConnection,
    supply_id: Uuid,
) -> Result<bool, sea_orm::DbErr> {
    let Some(current) = Supply::find_by_id(supply_id).one(db).await? else {
        warn!(supply_id = %supply_id, "Status check skipped: supply no longer exists");
        return Ok(false);
    };

    if current.status.is_administrative() {
        return Ok(false);
    }

    let correct = SupplyStatus::derive(
        current.current_quantity,
        current.minimum_quantity,
        current.critical_quantity,
    );

    if current.status == correct {
        return Ok(false);
    }

    let previous = current.status;
    let mut active: supply::ActiveModel = current.into();
    active.status = Set(correct);
    active.last_updated = Set(Utc::now());
    active.update(db).await?;

    info!(
        supply_id = %supply_id,
        "Corrected supply status from {:?} to {:?}",
        previous, correct
    );

    Ok(true)
}
