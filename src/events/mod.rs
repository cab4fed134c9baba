use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::movement::{ConflictItem, MovementKind};
use crate::models::stock_lot::LotKey;

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

    /// Sends without failing the caller; used after a change is already committed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

// Events emitted by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    LotReceived(LotKey),
    MovementDraftOpened(Uuid),
    MovementValidated {
        movement_id: Uuid,
        valid: bool,
        invalid_items: usize,
    },
    MatrixInvoiceGenerated {
        movement_id: Uuid,
        document: String,
    },
    MovementConfirmed {
        movement_id: Uuid,
        kind: MovementKind,
        items: usize,
        total_quantity: i64,
        document: String,
    },
    MovementConflict {
        movement_id: Uuid,
        offending: Vec<ConflictItem>,
    },
    MovementAbandoned(Uuid),
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::LotReceived(key) => {
                info!(lot = %key, "Lot received");
            }
            Event::MovementDraftOpened(id) => {
                info!(movement_id = %id, "Movement draft opened");
            }
            Event::MovementValidated {
                movement_id,
                valid,
                invalid_items,
            } => {
                info!(%movement_id, valid, invalid_items, "Movement validated");
            }
            Event::MatrixInvoiceGenerated {
                movement_id,
                document,
            } => {
                info!(%movement_id, %document, "Matrix invoice generated");
            }
            Event::MovementConfirmed {
                movement_id,
                kind,
                items,
                total_quantity,
                document,
            } => {
                info!(
                    %movement_id,
                    %kind,
                    items,
                    total_quantity,
                    %document,
                    "Movement confirmed"
                );
            }
            Event::MovementConflict {
                movement_id,
                offending,
            } => {
                warn!(
                    %movement_id,
                    offending = offending.len(),
                    "Movement confirmation hit a quantity conflict"
                );
            }
            Event::MovementAbandoned(id) => {
                info!(movement_id = %id, "Movement draft abandoned");
            }
        }
    }

    info!("Event processing loop stopped");
}
