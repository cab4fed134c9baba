use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use crate::models::stock_lot::{StockClass, StockLot};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_lots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Canonical form of the lot identity tuple.
    #[sea_orm(unique)]
    pub lot_key: String,
    pub product_code: String,
    pub product_description: String,
    pub legal_entity: String,
    pub warehouse: String,
    pub lot_code: String,
    pub expiry_date: Option<NaiveDate>,
    pub total_quantity: i64,
    pub available_quantity: i64,
    pub reserved_quantity: i64,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub unit_cost: Decimal,
    pub supplier: String,
    pub stock_class: StockClass,
    pub source_origin: String,
    /// Optimistic concurrency token, bumped on every write.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for StockLot {
    fn from(m: Model) -> Self {
        StockLot {
            product_code: m.product_code,
            product_description: m.product_description,
            legal_entity: m.legal_entity,
            warehouse: m.warehouse,
            lot_code: m.lot_code,
            expiry_date: m.expiry_date,
            total_quantity: m.total_quantity,
            available_quantity: m.available_quantity,
            reserved_quantity: m.reserved_quantity,
            unit_cost: m.unit_cost,
            supplier: m.supplier,
            stock_class: m.stock_class,
            source_origin: m.source_origin,
        }
    }
}

impl ActiveModel {
    /// Full row for `lot` under the given id and version.
    pub fn from_lot(id: Uuid, lot: &StockLot, version: i64) -> Self {
        ActiveModel {
            id: Set(id),
            lot_key: Set(lot.key().canonical()),
            product_code: Set(lot.product_code.clone()),
            product_description: Set(lot.product_description.clone()),
            legal_entity: Set(lot.legal_entity.clone()),
            warehouse: Set(lot.warehouse.clone()),
            lot_code: Set(lot.lot_code.clone()),
            expiry_date: Set(lot.expiry_date),
            total_quantity: Set(lot.total_quantity),
            available_quantity: Set(lot.available_quantity),
            reserved_quantity: Set(lot.reserved_quantity),
            unit_cost: Set(lot.unit_cost),
            supplier: Set(lot.supplier.clone()),
            stock_class: Set(lot.stock_class),
            source_origin: Set(lot.source_origin.clone()),
            version: Set(version),
            updated_at: Set(Utc::now()),
        }
    }
}
