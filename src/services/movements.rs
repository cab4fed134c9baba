//! Movement requests: drafting, validation, the confirmation gate and confirmation.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::models::history::MovementHistoryRecord;
use crate::models::movement::{
    DraftPatch, GateBlock, ItemPatch, MovementRequest, NewItem, ValidationReport,
};
use crate::models::stock_lot::LotKey;
use crate::services::ledger::TransferPlan;
use crate::services::lot_store::LotStore;
use crate::services::matrix_invoice::MatrixInvoiceGenerator;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Confirmation {
    pub movement: MovementRequest,
    pub records: Vec<MovementHistoryRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Confirmability {
    pub movement_id: Uuid,
    pub confirmable: bool,
    pub blocked_by: Option<GateBlock>,
}

type Slot = Arc<Mutex<MovementRequest>>;

/// Owns every movement request. Each request sits behind its own mutex so two
/// confirmations of one request run one after the other.
#[derive(Clone)]
pub struct MovementService {
    store: Arc<dyn LotStore>,
    drafts: Arc<DashMap<Uuid, Slot>>,
    invoices: Arc<dyn MatrixInvoiceGenerator>,
    event_sender: EventSender,
}

impl MovementService {
    pub fn new(
        store: Arc<dyn LotStore>,
        invoices: Arc<dyn MatrixInvoiceGenerator>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            store,
            drafts: Arc::new(DashMap::new()),
            invoices,
            event_sender,
        }
    }

    fn slot(&self, id: Uuid) -> Result<Slot, ServiceError> {
        self.drafts
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("movement {}", id)))
    }

    #[instrument(skip(self))]
    pub async fn open_draft(&self) -> MovementRequest {
        let request = MovementRequest::new_draft(Utc::now().date_naive());
        self.drafts
            .insert(request.id, Arc::new(Mutex::new(request.clone())));
        metrics::DRAFTS_OPENED.inc();
        self.event_sender
            .send_or_log(Event::MovementDraftOpened(request.id))
            .await;
        info!(movement_id = %request.id, "Movement draft opened");
        request
    }

    pub async fn get(&self, id: Uuid) -> Result<MovementRequest, ServiceError> {
        let slot = self.slot(id)?;
        let request = slot.lock().await;
        Ok(request.clone())
    }

    /// All requests, oldest first.
    pub async fn list(&self) -> Vec<MovementRequest> {
        let slots: Vec<Slot> = self.drafts.iter().map(|e| e.value().clone()).collect();
        let mut requests = Vec::with_capacity(slots.len());
        for slot in slots {
            requests.push(slot.lock().await.clone());
        }
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        requests
    }

    #[instrument(skip(self, patch))]
    pub async fn edit_draft(
        &self,
        id: Uuid,
        patch: DraftPatch,
    ) -> Result<MovementRequest, ServiceError> {
        let slot = self.slot(id)?;
        let mut request = slot.lock().await;
        request.ensure_editable()?;

        // Items follow the origin; every one must exist at the new location.
        let moved = match request.origin_after(&patch) {
            Some((entity, warehouse)) if !request.items.is_empty() => {
                Some(self.live_availability(&request, &entity, &warehouse, true).await?)
            }
            _ => None,
        };

        request.apply_patch(patch)?;
        if let Some(available) = moved {
            request.retake_snapshots(&available)?;
        }
        Ok(request.clone())
    }

    /// Live availability of every item's lot at `entity`/`warehouse`, in item
    /// order. A missing lot is `NotFound` when `required`, zero otherwise.
    async fn live_availability(
        &self,
        request: &MovementRequest,
        entity: &str,
        warehouse: &str,
        required: bool,
    ) -> Result<Vec<i64>, ServiceError> {
        let mut available = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let key = LotKey::new(
                item.product_code.clone(),
                entity,
                warehouse,
                item.lot_code.clone(),
                item.expiry_date,
            );
            match self.store.get(&key).await? {
                Some(lot) => available.push(lot.available_quantity),
                None if required => return Err(ServiceError::NotFound(format!("lot {}", key))),
                None => available.push(0),
            }
        }
        Ok(available)
    }

    /// Drops a request that was never confirmed. The ledger is not touched.
    #[instrument(skip(self))]
    pub async fn abandon_draft(&self, id: Uuid) -> Result<(), ServiceError> {
        let slot = self.slot(id)?;
        let request = slot.lock().await;
        request.ensure_editable()?;
        self.drafts.remove(&id);
        drop(request);

        metrics::DRAFTS_ABANDONED.inc();
        self.event_sender
            .send_or_log(Event::MovementAbandoned(id))
            .await;
        Ok(())
    }

    /// Resolves the origin lot and snapshots its availability into a new item.
    #[instrument(skip(self, item), fields(product = %item.product_code, lot = %item.lot_code))]
    pub async fn add_item(&self, id: Uuid, item: NewItem) -> Result<MovementRequest, ServiceError> {
        let slot = self.slot(id)?;
        let mut request = slot.lock().await;
        request.ensure_editable()?;

        if request.origin_entity.is_empty() || request.origin_warehouse.is_empty() {
            return Err(ServiceError::ValidationError(
                "origin entity and warehouse must be set before adding items".to_string(),
            ));
        }

        let key = request.origin_key(&item.product_code, &item.lot_code, item.expiry_date);
        let lot = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("lot {}", key)))?;
        request.push_item(&lot, item)?;
        Ok(request.clone())
    }

    pub async fn edit_item(
        &self,
        id: Uuid,
        index: usize,
        patch: ItemPatch,
    ) -> Result<MovementRequest, ServiceError> {
        let slot = self.slot(id)?;
        let mut request = slot.lock().await;
        request.edit_item(index, patch)?;
        Ok(request.clone())
    }

    pub async fn remove_item(&self, id: Uuid, index: usize) -> Result<MovementRequest, ServiceError> {
        let slot = self.slot(id)?;
        let mut request = slot.lock().await;
        request.remove_item(index)?;
        Ok(request.clone())
    }

    /// Re-reads live availability for every item. Lots that disappeared under
    /// the current origin snapshot as zero.
    #[instrument(skip(self))]
    pub async fn refresh_snapshots(&self, id: Uuid) -> Result<MovementRequest, ServiceError> {
        let slot = self.slot(id)?;
        let mut request = slot.lock().await;
        request.ensure_editable()?;

        let (entity, warehouse) = (request.origin_entity.clone(), request.origin_warehouse.clone());
        let available = self.live_availability(&request, &entity, &warehouse, false).await?;
        request.retake_snapshots(&available)?;
        Ok(request.clone())
    }

    #[instrument(skip(self))]
    pub async fn validate(&self, id: Uuid) -> Result<ValidationReport, ServiceError> {
        let slot = self.slot(id)?;
        let mut request = slot.lock().await;
        request.ensure_editable()?;

        let report = request.validate_quantities();
        request.record_validation(&report);
        drop(request);

        metrics::record_validation(report.valid);
        self.event_sender
            .send_or_log(Event::MovementValidated {
                movement_id: id,
                valid: report.valid,
                invalid_items: report.item_errors.len(),
            })
            .await;
        Ok(report)
    }

    pub async fn is_confirmable(&self, id: Uuid) -> Result<Confirmability, ServiceError> {
        let request = self.get(id).await?;
        let blocked_by = request.gate_block();
        Ok(Confirmability {
            movement_id: id,
            confirmable: blocked_by.is_none(),
            blocked_by,
        })
    }

    /// Idempotent: a request that already has a matrix invoice keeps it.
    #[instrument(skip(self))]
    pub async fn generate_matrix_invoice(&self, id: Uuid) -> Result<MovementRequest, ServiceError> {
        let slot = self.slot(id)?;
        let mut request = slot.lock().await;
        request.ensure_editable()?;
        if request.matrix_invoice_generated {
            return Ok(request.clone());
        }

        let document = self.invoices.generate(&request).await?;
        request.mark_matrix_invoice(document.clone())?;
        let snapshot = request.clone();
        drop(request);

        self.event_sender
            .send_or_log(Event::MatrixInvoiceGenerated {
                movement_id: id,
                document,
            })
            .await;
        Ok(snapshot)
    }

    /// Gate, re-validation, then an all-or-nothing transfer against live stock.
    #[instrument(skip(self))]
    pub async fn confirm(&self, id: Uuid) -> Result<Confirmation, ServiceError> {
        let slot = self.slot(id)?;
        let mut request = slot.lock().await;
        request.ensure_editable()?;

        if let Some(block) = request.gate_block() {
            metrics::GATE_BLOCKS.inc();
            warn!(movement_id = %id, reason = %block, "Confirmation blocked by gate");
            return Err(ServiceError::GateBlocked(block));
        }

        let report = request.validate_quantities();
        request.record_validation(&report);
        if !report.valid {
            metrics::record_validation(false);
            return Err(ServiceError::InvalidQuantities(report));
        }

        let plan = TransferPlan::from_request(&request);
        let records = match self.store.apply_transfer(&plan).await {
            Ok(records) => records,
            Err(ServiceError::QuantityConflict(offending)) => {
                // The snapshots are stale; the caller has to validate again.
                request.apply_patch(DraftPatch::default())?;
                drop(request);
                metrics::CONFLICTS.inc();
                warn!(movement_id = %id, offending = offending.len(), "Quantity conflict on confirmation");
                self.event_sender
                    .send_or_log(Event::MovementConflict {
                        movement_id: id,
                        offending: offending.clone(),
                    })
                    .await;
                return Err(ServiceError::QuantityConflict(offending));
            }
            Err(e) => return Err(e),
        };

        request.freeze();
        let movement = request.clone();
        drop(request);

        metrics::CONFIRMATIONS.inc();
        metrics::HISTORY_RECORDS.inc_by(records.len() as u64);
        self.event_sender
            .send_or_log(Event::MovementConfirmed {
                movement_id: id,
                kind: plan.kind,
                items: plan.lines.len(),
                total_quantity: plan.total_quantity(),
                document: plan.document.clone(),
            })
            .await;
        info!(
            movement_id = %id,
            kind = %plan.kind,
            items = plan.lines.len(),
            "Movement confirmed"
        );

        Ok(Confirmation { movement, records })
    }
}
