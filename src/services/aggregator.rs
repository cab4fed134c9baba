//! Derived classification of lots: expiry risk, multi-lot and multi-entity
//! exposure, reservations, plus store-wide aggregates.
//!
//! Everything here is a pure function of (lots, today); running it twice on the
//! same input yields identical output.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use utoipa::ToSchema;

use crate::models::stock_lot::StockLot;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ExpiryBucket {
    Expired,
    Critical,
    Warning,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub critical_days: i64,
    pub warning_days: i64,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            critical_days: 30,
            warning_days: 60,
        }
    }
}

impl ExpiryPolicy {
    pub fn bucket(&self, expiry: Option<NaiveDate>, today: NaiveDate) -> ExpiryBucket {
        let Some(expiry) = expiry else {
            return ExpiryBucket::None;
        };
        let days = (expiry - today).num_days();
        if days < 0 {
            ExpiryBucket::Expired
        } else if days <= self.critical_days {
            ExpiryBucket::Critical
        } else if days <= self.warning_days {
            ExpiryBucket::Warning
        } else {
            ExpiryBucket::None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LotFlags {
    pub expiry_bucket: ExpiryBucket,
    /// Days until expiry; negative once expired.
    pub days_to_expiry: Option<i64>,
    pub is_multi_lot: bool,
    pub is_multi_entity: bool,
    pub has_reservation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LotPosition {
    #[serde(flatten)]
    pub lot: StockLot,
    pub total_cost: Decimal,
    #[serde(flatten)]
    pub flags: LotFlags,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PositionSummary {
    pub lot_count: usize,
    pub expired_count: usize,
    /// Not yet expired but inside the warning window.
    pub expiring_soon_count: usize,
    pub reserved_count: usize,
    pub total_quantity: i64,
    pub total_value: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub positions: Vec<LotPosition>,
    pub summary: PositionSummary,
}

#[derive(Default)]
struct ProductIndex<'a> {
    lots: usize,
    entities: HashSet<&'a str>,
}

pub fn aggregate(lots: &[StockLot], today: NaiveDate, policy: &ExpiryPolicy) -> Aggregation {
    let mut index: HashMap<&str, ProductIndex<'_>> = HashMap::new();
    for lot in lots {
        let entry = index.entry(lot.product_code.as_str()).or_default();
        entry.lots += 1;
        entry.entities.insert(lot.legal_entity.as_str());
    }

    let mut summary = PositionSummary {
        lot_count: lots.len(),
        ..Default::default()
    };

    let positions = lots
        .iter()
        .map(|lot| {
            let product = &index[lot.product_code.as_str()];
            let bucket = policy.bucket(lot.expiry_date, today);
            let flags = LotFlags {
                expiry_bucket: bucket,
                days_to_expiry: lot.expiry_date.map(|d| (d - today).num_days()),
                is_multi_lot: product.lots >= 2,
                is_multi_entity: product.entities.len() >= 2,
                has_reservation: lot.reserved_quantity > 0,
            };

            match bucket {
                ExpiryBucket::Expired => summary.expired_count += 1,
                ExpiryBucket::Critical | ExpiryBucket::Warning => summary.expiring_soon_count += 1,
                ExpiryBucket::None => {}
            }
            if flags.has_reservation {
                summary.reserved_count += 1;
            }
            let total_cost = lot.total_cost();
            summary.total_quantity = summary.total_quantity.saturating_add(lot.total_quantity);
            summary.total_value = summary.total_value.saturating_add(total_cost);

            LotPosition {
                lot: lot.clone(),
                total_cost,
                flags,
            }
        })
        .collect();

    Aggregation { positions, summary }
}
