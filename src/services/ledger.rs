//! Quantity mutation for confirmed movements.
//!
//! A [`TransferPlan`] is the frozen, store-agnostic description of what a
//! confirmation moves. Both store backends check it with [`find_conflicts`]
//! against live availability before touching anything; the in-memory backend
//! then applies it with [`apply_to_lots`].

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::history::MovementHistoryRecord;
use crate::models::movement::{ConflictItem, MovementKind, MovementRequest};
use crate::models::stock_lot::{LotKey, StockLot};

#[derive(Debug, Clone, PartialEq)]
pub struct TransferLine {
    /// Position of the item in the movement request.
    pub index: usize,
    pub origin: LotKey,
    pub destination: LotKey,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferPlan {
    pub movement_id: Uuid,
    pub date: NaiveDate,
    pub kind: MovementKind,
    pub document: String,
    pub user: String,
    pub reason: Option<String>,
    pub origin_entity: String,
    pub origin_warehouse: String,
    pub destination_entity: String,
    pub destination_warehouse: String,
    pub lines: Vec<TransferLine>,
}

impl TransferPlan {
    pub fn from_request(request: &MovementRequest) -> Self {
        let lines = request
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| TransferLine {
                index,
                origin: request.origin_key(&item.product_code, &item.lot_code, item.expiry_date),
                destination: request.destination_key(item),
                quantity: item.quantity_to_move,
            })
            .collect();

        TransferPlan {
            movement_id: request.id,
            date: request.date,
            kind: request.movement_kind,
            document: request.document(),
            user: request.responsible.clone(),
            reason: request.reason.clone(),
            origin_entity: request.origin_entity.clone(),
            origin_warehouse: request.origin_warehouse.clone(),
            destination_entity: request.destination_entity.clone(),
            destination_warehouse: request.destination_warehouse.clone(),
            lines,
        }
    }

    /// Total quantity drawn from each origin lot across all lines.
    pub fn required_by_origin(&self) -> BTreeMap<LotKey, i64> {
        let mut required = BTreeMap::new();
        for line in &self.lines {
            let total = required.entry(line.origin.clone()).or_insert(0i64);
            *total = total.saturating_add(line.quantity);
        }
        required
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines
            .iter()
            .fold(0i64, |acc, l| acc.saturating_add(l.quantity))
    }

    /// History entries for every line; `first_id` numbers them in line order.
    pub fn history_records(&self, first_id: i64, recorded_at: DateTime<Utc>) -> Vec<MovementHistoryRecord> {
        self.lines
            .iter()
            .enumerate()
            .map(|(offset, line)| MovementHistoryRecord {
                id: first_id + offset as i64,
                movement_id: self.movement_id,
                date: self.date,
                movement_kind: self.kind,
                product_code: line.origin.product_code.clone(),
                lot_code: line.origin.lot_code.clone(),
                quantity: line.quantity,
                document: self.document.clone(),
                origin_entity: Some(self.origin_entity.clone()),
                origin_warehouse: Some(self.origin_warehouse.clone()),
                destination_entity: Some(self.destination_entity.clone()),
                destination_warehouse: Some(self.destination_warehouse.clone()),
                user: self.user.clone(),
                reason: self.reason.clone(),
                recorded_at,
            })
            .collect()
    }
}

/// Lines whose origin lot cannot cover the cumulative requested quantity.
///
/// `live_available` returns `None` for a lot that does not exist, which counts
/// as zero availability.
pub fn find_conflicts<F>(plan: &TransferPlan, live_available: F) -> Vec<ConflictItem>
where
    F: Fn(&LotKey) -> Option<i64>,
{
    let required = plan.required_by_origin();
    let mut short: HashMap<&LotKey, i64> = HashMap::new();
    for (key, needed) in &required {
        let available = live_available(key).unwrap_or(0);
        let missing = live_available(key).is_none();
        if missing || *needed > available {
            short.insert(key, available);
        }
    }

    plan.lines
        .iter()
        .filter_map(|line| {
            short.get(&line.origin).map(|available| ConflictItem {
                index: line.index,
                product_code: line.origin.product_code.clone(),
                lot_code: line.origin.lot_code.clone(),
                requested: line.quantity,
                live_available: *available,
            })
        })
        .collect()
}

fn vanished(key: &LotKey) -> ServiceError {
    ServiceError::InternalError(format!("origin lot {} vanished mid-transfer", key))
}

fn add_quantity(current: i64, quantity: i64, key: &LotKey) -> Result<i64, ServiceError> {
    current.checked_add(quantity).ok_or_else(|| {
        ServiceError::ValidationError(format!("lot {} cannot hold more than {} units", key, i64::MAX))
    })
}

/// Applies `plan` to `lots` all-or-nothing.
///
/// Fails with [`ServiceError::QuantityConflict`] before any lot changes when
/// live availability does not cover the plan. Every line is worked out on
/// copies of the touched lots, which replace the originals only once all
/// lines succeed.
pub fn apply_to_lots(
    lots: &mut BTreeMap<LotKey, StockLot>,
    plan: &TransferPlan,
) -> Result<(), ServiceError> {
    let conflicts = find_conflicts(plan, |key| lots.get(key).map(|l| l.available_quantity));
    if !conflicts.is_empty() {
        return Err(ServiceError::QuantityConflict(conflicts));
    }

    let mut staged: BTreeMap<LotKey, StockLot> = BTreeMap::new();
    for line in &plan.lines {
        if !staged.contains_key(&line.origin) {
            let current = lots.get(&line.origin).cloned().ok_or_else(|| vanished(&line.origin))?;
            staged.insert(line.origin.clone(), current);
        }
        let origin = staged.get_mut(&line.origin).ok_or_else(|| vanished(&line.origin))?;
        origin.available_quantity -= line.quantity;
        origin.total_quantity -= line.quantity;
        let template = origin.empty_copy_at(&line.destination.legal_entity, &line.destination.warehouse);

        let destination = staged
            .entry(line.destination.clone())
            .or_insert_with(|| lots.get(&line.destination).cloned().unwrap_or(template));
        destination.available_quantity =
            add_quantity(destination.available_quantity, line.quantity, &line.destination)?;
        destination.total_quantity =
            add_quantity(destination.total_quantity, line.quantity, &line.destination)?;
    }

    lots.extend(staged);
    Ok(())
}
