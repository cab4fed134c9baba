//! Authoritative storage for stock lots and the movement history.
//!
//! Two backends implement [`LotStore`]: an in-memory book guarded by a single
//! `RwLock`, and a sea-orm backed store for SQLite/Postgres. The backend is
//! picked by `ledger_backend` in the application config.

use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::ServiceError;
use crate::models::history::{HistoryFilter, MovementHistoryRecord};
use crate::models::stock_lot::{LotKey, StockLot};
use crate::services::ledger::TransferPlan;

mod database;
mod memory;

pub use database::DatabaseLotStore;
pub use memory::InMemoryLotStore;

#[async_trait]
pub trait LotStore: Send + Sync {
    async fn get(&self, key: &LotKey) -> Result<Option<StockLot>, ServiceError>;

    /// Inserts or replaces the lot at its key. Rejects lots that break the quantity triple.
    async fn upsert(&self, lot: StockLot) -> Result<StockLot, ServiceError>;

    /// Creates a lot that does not exist yet. An existing key is an
    /// [`ServiceError::InvalidOperation`] and leaves the stored lot untouched.
    async fn insert(&self, lot: StockLot) -> Result<StockLot, ServiceError>;

    /// Every lot, ordered by key.
    async fn all(&self) -> Result<Vec<StockLot>, ServiceError>;

    /// Applies a confirmed movement and appends its history, all-or-nothing.
    async fn apply_transfer(
        &self,
        plan: &TransferPlan,
    ) -> Result<Vec<MovementHistoryRecord>, ServiceError>;

    /// Matching history records, newest first.
    async fn history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<MovementHistoryRecord>, ServiceError>;
}

pub type SharedLotStore = Arc<dyn LotStore>;

fn already_received(key: &LotKey) -> ServiceError {
    ServiceError::InvalidOperation(format!(
        "lot {} already exists; its quantities change only through movements",
        key
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum LedgerBackend {
    InMemory,
    Database,
}
