pub mod history;
pub mod lots;
pub mod movements;
pub mod positions;

use crate::services::{
    history::HistoryService, lots::LotService, movements::MovementService,
    positions::PositionService,
};

/// Access to the ledger services from handler state.
pub trait LedgerHandlerState: Clone + Send + Sync + 'static {
    fn position_service(&self) -> &PositionService;
    fn movement_service(&self) -> &MovementService;
    fn history_service(&self) -> &HistoryService;
    fn lot_service(&self) -> &LotService;
}

use std::sync::Arc;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::lot_store::SharedLotStore;
use crate::services::matrix_invoice::SequentialMatrixInvoiceGenerator;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub positions: PositionService,
    pub movements: MovementService,
    pub history: HistoryService,
    pub lots: LotService,
}

impl AppServices {
    pub fn new(store: SharedLotStore, config: &AppConfig, event_sender: EventSender) -> Self {
        let invoices = Arc::new(SequentialMatrixInvoiceGenerator::new(
            config.matrix_invoice_prefix.clone(),
        ));
        Self {
            positions: PositionService::new(
                store.clone(),
                config.expiry_policy(),
                config.low_stock_threshold,
            ),
            movements: MovementService::new(store.clone(), invoices, event_sender.clone()),
            history: HistoryService::new(store.clone()),
            lots: LotService::new(store, event_sender),
        }
    }
}
