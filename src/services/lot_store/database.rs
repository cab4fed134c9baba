use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionError, TransactionTrait,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::{already_received, LotStore};
use crate::entities::{movement_history, stock_lot};
use crate::errors::ServiceError;
use crate::models::history::{HistoryFilter, MovementHistoryRecord};
use crate::models::stock_lot::{LotKey, StockLot};
use crate::services::ledger::{apply_to_lots, find_conflicts, TransferPlan};

/// sea-orm backed store. Each lot row carries a `version`; confirmations
/// update rows only at the version they read. A concurrent writer rolls the
/// transaction back and the transfer is re-checked against the fresh rows, so
/// only a real shortfall surfaces as a conflict.
#[derive(Clone)]
pub struct DatabaseLotStore {
    db: Arc<DatabaseConnection>,
}

impl DatabaseLotStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn find_row<C>(conn: &C, key: &LotKey) -> Result<Option<stock_lot::Model>, DbErr>
    where
        C: sea_orm::ConnectionTrait,
    {
        stock_lot::Entity::find()
            .filter(stock_lot::Column::LotKey.eq(key.canonical()))
            .one(conn)
            .await
    }
}

/// Why a transfer transaction rolled back.
#[derive(Debug, thiserror::Error)]
enum TransferFailure {
    /// Another writer changed a touched lot after it was read; the whole
    /// transaction is retried against fresh rows.
    #[error("lot {0} changed during the transfer")]
    Stale(LotKey),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<DbErr> for TransferFailure {
    fn from(err: DbErr) -> Self {
        TransferFailure::Service(err.into())
    }
}

const MAX_TRANSFER_ATTEMPTS: u32 = 5;

async fn apply_in_transaction(
    txn: &DatabaseTransaction,
    plan: TransferPlan,
) -> Result<Vec<MovementHistoryRecord>, TransferFailure> {
    let mut keys: Vec<LotKey> = Vec::with_capacity(plan.lines.len() * 2);
    for line in &plan.lines {
        keys.push(line.origin.clone());
        keys.push(line.destination.clone());
    }
    keys.sort();
    keys.dedup();

    let canonical: Vec<String> = keys.iter().map(LotKey::canonical).collect();
    let rows: HashMap<LotKey, stock_lot::Model> = stock_lot::Entity::find()
        .filter(stock_lot::Column::LotKey.is_in(canonical))
        .all(txn)
        .await?
        .into_iter()
        .map(|m| {
            let lot: StockLot = m.clone().into();
            (lot.key(), m)
        })
        .collect();

    let conflicts = find_conflicts(&plan, |key| rows.get(key).map(|r| r.available_quantity));
    if !conflicts.is_empty() {
        return Err(ServiceError::QuantityConflict(conflicts).into());
    }

    let mut lots: BTreeMap<LotKey, StockLot> = rows
        .iter()
        .map(|(key, row)| (key.clone(), StockLot::from(row.clone())))
        .collect();
    apply_to_lots(&mut lots, &plan)?;

    let now = Utc::now();
    for (key, lot) in &lots {
        match rows.get(key) {
            Some(row) => {
                let result = stock_lot::Entity::update_many()
                    .set(stock_lot::ActiveModel {
                        total_quantity: Set(lot.total_quantity),
                        available_quantity: Set(lot.available_quantity),
                        version: Set(row.version + 1),
                        updated_at: Set(now),
                        ..Default::default()
                    })
                    .filter(stock_lot::Column::Id.eq(row.id))
                    .filter(stock_lot::Column::Version.eq(row.version))
                    .exec(txn)
                    .await?;
                if result.rows_affected != 1 {
                    return Err(TransferFailure::Stale(key.clone()));
                }
            }
            None => {
                let inserted = stock_lot::ActiveModel::from_lot(Uuid::new_v4(), lot, 0)
                    .insert(txn)
                    .await;
                if let Err(err) = inserted {
                    if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
                        return Err(TransferFailure::Stale(key.clone()));
                    }
                    return Err(err.into());
                }
            }
        }
    }

    let mut records = Vec::with_capacity(plan.lines.len());
    for template in plan.history_records(0, now) {
        let row = movement_history::ActiveModel::from(&template)
            .insert(txn)
            .await?;
        records.push(MovementHistoryRecord::from(row));
    }
    Ok(records)
}

#[async_trait]
impl LotStore for DatabaseLotStore {
    async fn get(&self, key: &LotKey) -> Result<Option<StockLot>, ServiceError> {
        Ok(Self::find_row(&*self.db, key).await?.map(StockLot::from))
    }

    #[instrument(skip(self, lot), fields(lot = %lot.key()))]
    async fn upsert(&self, lot: StockLot) -> Result<StockLot, ServiceError> {
        lot.check()?;
        let key = lot.key();
        let candidate = lot.clone();

        self.db
            .transaction::<_, (), ServiceError>(|txn| {
                Box::pin(async move {
                    match DatabaseLotStore::find_row(txn, &key).await? {
                        Some(existing) => {
                            stock_lot::ActiveModel::from_lot(
                                existing.id,
                                &candidate,
                                existing.version + 1,
                            )
                            .update(txn)
                            .await?;
                        }
                        None => {
                            stock_lot::ActiveModel::from_lot(Uuid::new_v4(), &candidate, 0)
                                .insert(txn)
                                .await?;
                        }
                    }
                    Ok(())
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => {
                    error!("Database connection error during lot upsert: {}", db_err);
                    ServiceError::DatabaseError(db_err)
                }
                TransactionError::Transaction(service_err) => service_err,
            })?;

        Ok(lot)
    }

    #[instrument(skip(self, lot), fields(lot = %lot.key()))]
    async fn insert(&self, lot: StockLot) -> Result<StockLot, ServiceError> {
        lot.check()?;
        let inserted = stock_lot::ActiveModel::from_lot(Uuid::new_v4(), &lot, 0)
            .insert(&*self.db)
            .await;
        match inserted {
            Ok(_) => Ok(lot),
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Err(already_received(&lot.key())),
                _ => Err(err.into()),
            },
        }
    }

    async fn all(&self) -> Result<Vec<StockLot>, ServiceError> {
        let mut lots: Vec<StockLot> = stock_lot::Entity::find()
            .all(&*self.db)
            .await?
            .into_iter()
            .map(StockLot::from)
            .collect();
        lots.sort_by_key(StockLot::key);
        Ok(lots)
    }

    #[instrument(skip(self, plan), fields(movement_id = %plan.movement_id, lines = plan.lines.len()))]
    async fn apply_transfer(
        &self,
        plan: &TransferPlan,
    ) -> Result<Vec<MovementHistoryRecord>, ServiceError> {
        for attempt in 1..=MAX_TRANSFER_ATTEMPTS {
            let attempt_plan = plan.clone();
            let outcome = self
                .db
                .transaction::<_, Vec<MovementHistoryRecord>, TransferFailure>(|txn| {
                    Box::pin(async move { apply_in_transaction(txn, attempt_plan).await })
                })
                .await;

            match outcome {
                Ok(records) => {
                    debug!(records = records.len(), attempt, "transfer committed");
                    return Ok(records);
                }
                Err(TransactionError::Transaction(TransferFailure::Stale(key))) => {
                    warn!(lot = %key, attempt, "lot changed underneath confirmation; re-reading");
                }
                Err(TransactionError::Transaction(TransferFailure::Service(err))) => return Err(err),
                Err(TransactionError::Connection(db_err)) => {
                    error!("Database connection error during transfer: {}", db_err);
                    return Err(ServiceError::DatabaseError(db_err));
                }
            }
        }

        Err(ServiceError::InternalError(format!(
            "movement {} kept colliding with concurrent writers after {} attempts",
            plan.movement_id, MAX_TRANSFER_ATTEMPTS
        )))
    }

    async fn history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<MovementHistoryRecord>, ServiceError> {
        let mut query = movement_history::Entity::find();
        if let Some(from) = filter.from {
            query = query.filter(movement_history::Column::Date.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(movement_history::Column::Date.lte(to));
        }
        if let Some(product) = &filter.product_code {
            query = query.filter(movement_history::Column::ProductCode.eq(product.clone()));
        }
        if let Some(kind) = filter.movement_kind {
            query = query.filter(movement_history::Column::MovementKind.eq(kind));
        }
        if let Some(entity) = &filter.entity {
            query = query.filter(
                Condition::any()
                    .add(movement_history::Column::OriginEntity.eq(entity.clone()))
                    .add(movement_history::Column::DestinationEntity.eq(entity.clone())),
            );
        }

        Ok(query
            .order_by_desc(movement_history::Column::Date)
            .order_by_desc(movement_history::Column::Id)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(MovementHistoryRecord::from)
            .collect())
    }
}
