use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{NotSet, Set};
use serde::{Deserialize, Serialize};

use crate::models::history::MovementHistoryRecord;
use crate::models::movement::MovementKind;

/// Append-only; rows are never updated.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "movement_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub movement_id: Uuid,
    pub date: NaiveDate,
    pub movement_kind: MovementKind,
    pub product_code: String,
    pub lot_code: String,
    pub quantity: i64,
    pub document: String,
    pub origin_entity: Option<String>,
    pub origin_warehouse: Option<String>,
    pub destination_entity: Option<String>,
    pub destination_warehouse: Option<String>,
    pub user: String,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for MovementHistoryRecord {
    fn from(m: Model) -> Self {
        MovementHistoryRecord {
            id: m.id,
            movement_id: m.movement_id,
            date: m.date,
            movement_kind: m.movement_kind,
            product_code: m.product_code,
            lot_code: m.lot_code,
            quantity: m.quantity,
            document: m.document,
            origin_entity: m.origin_entity,
            origin_warehouse: m.origin_warehouse,
            destination_entity: m.destination_entity,
            destination_warehouse: m.destination_warehouse,
            user: m.user,
            reason: m.reason,
            recorded_at: m.recorded_at,
        }
    }
}

impl From<&MovementHistoryRecord> for ActiveModel {
    /// The sequence is assigned by the database.
    fn from(r: &MovementHistoryRecord) -> Self {
        ActiveModel {
            id: NotSet,
            movement_id: Set(r.movement_id),
            date: Set(r.date),
            movement_kind: Set(r.movement_kind),
            product_code: Set(r.product_code.clone()),
            lot_code: Set(r.lot_code.clone()),
            quantity: Set(r.quantity),
            document: Set(r.document.clone()),
            origin_entity: Set(r.origin_entity.clone()),
            origin_warehouse: Set(r.origin_warehouse.clone()),
            destination_entity: Set(r.destination_entity.clone()),
            destination_warehouse: Set(r.destination_warehouse.clone()),
            user: Set(r.user.clone()),
            reason: Set(r.reason.clone()),
            recorded_at: Set(r.recorded_at),
        }
    }
}
