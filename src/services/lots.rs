//! Receiving: creating lots outside of movements. An existing lot is never
//! overwritten; after creation only confirmed movements change its quantities.

use std::sync::Arc;
use tracing::{info, instrument};

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::models::stock_lot::{LotKey, StockLot};
use crate::services::lot_store::LotStore;

#[derive(Clone)]
pub struct LotService {
    store: Arc<dyn LotStore>,
    event_sender: EventSender,
}

impl LotService {
    pub fn new(store: Arc<dyn LotStore>, event_sender: EventSender) -> Self {
        Self {
            store,
            event_sender,
        }
    }

    #[instrument(skip(self, lot), fields(lot = %lot.key()))]
    pub async fn receive(&self, lot: StockLot) -> Result<StockLot, ServiceError> {
        let stored = self.store.insert(lot).await?;
        metrics::LOTS_RECEIVED.inc();
        self.event_sender
            .send_or_log(Event::LotReceived(stored.key()))
            .await;
        info!(available = stored.available_quantity, "Lot received");
        Ok(stored)
    }

    pub async fn get(&self, key: &LotKey) -> Result<StockLot, ServiceError> {
        self.store
            .get(key)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("lot {}", key)))
    }
}
