use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{already_received, LotStore};
use crate::errors::ServiceError;
use crate::models::history::{sort_newest_first, HistoryFilter, MovementHistoryRecord};
use crate::models::stock_lot::{LotKey, StockLot};
use crate::services::ledger::{apply_to_lots, TransferPlan};

#[derive(Debug, Default)]
struct Book {
    lots: BTreeMap<LotKey, StockLot>,
    history: Vec<MovementHistoryRecord>,
    next_history_id: i64,
}

/// Lots and history behind one lock; a confirmation holds the write guard
/// from the availability check through the last history append.
#[derive(Debug, Default)]
pub struct InMemoryLotStore {
    book: RwLock<Book>,
}

impl InMemoryLotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_lots(lots: Vec<StockLot>) -> Result<Self, ServiceError> {
        let store = Self::new();
        for lot in lots {
            store.upsert(lot).await?;
        }
        Ok(store)
    }
}

#[async_trait]
impl LotStore for InMemoryLotStore {
    async fn get(&self, key: &LotKey) -> Result<Option<StockLot>, ServiceError> {
        Ok(self.book.read().await.lots.get(key).cloned())
    }

    async fn upsert(&self, lot: StockLot) -> Result<StockLot, ServiceError> {
        lot.check()?;
        let mut book = self.book.write().await;
        book.lots.insert(lot.key(), lot.clone());
        Ok(lot)
    }

    async fn insert(&self, lot: StockLot) -> Result<StockLot, ServiceError> {
        lot.check()?;
        let key = lot.key();
        let mut book = self.book.write().await;
        if book.lots.contains_key(&key) {
            return Err(already_received(&key));
        }
        book.lots.insert(key, lot.clone());
        Ok(lot)
    }

    async fn all(&self) -> Result<Vec<StockLot>, ServiceError> {
        Ok(self.book.read().await.lots.values().cloned().collect())
    }

    async fn apply_transfer(
        &self,
        plan: &TransferPlan,
    ) -> Result<Vec<MovementHistoryRecord>, ServiceError> {
        let mut book = self.book.write().await;
        apply_to_lots(&mut book.lots, plan)?;

        let first_id = book.next_history_id + 1;
        let records = plan.history_records(first_id, Utc::now());
        book.next_history_id += records.len() as i64;
        book.history.extend(records.iter().cloned());

        debug!(
            movement_id = %plan.movement_id,
            lines = plan.lines.len(),
            "transfer applied to in-memory book"
        );
        Ok(records)
    }

    async fn history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<MovementHistoryRecord>, ServiceError> {
        let book = self.book.read().await;
        let mut records: Vec<MovementHistoryRecord> = book
            .history
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }
}
