use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::movement::MovementKind;

/// Immutable audit entry, one per confirmed movement item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MovementHistoryRecord {
    /// Monotonic sequence assigned on append.
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

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct HistoryFilter {
    /// Inclusive lower bound on the movement date
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the movement date
    pub to: Option<NaiveDate>,
    pub product_code: Option<String>,
    pub movement_kind: Option<MovementKind>,
    /// Matches either the origin or the destination entity
    pub entity: Option<String>,
}

impl HistoryFilter {
    pub fn check(&self) -> Result<(), ServiceError> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ServiceError::ValidationError(format!(
                    "history range starts after it ends ({} > {})",
                    from, to
                )));
            }
        }
        Ok(())
    }

    pub fn matches(&self, record: &MovementHistoryRecord) -> bool {
        if self.from.map_or(false, |from| record.date < from) {
            return false;
        }
        if self.to.map_or(false, |to| record.date > to) {
            return false;
        }
        if let Some(product) = self.product_code.as_deref() {
            if record.product_code != product {
                return false;
            }
        }
        if let Some(kind) = self.movement_kind {
            if record.movement_kind != kind {
                return false;
            }
        }
        if let Some(entity) = self.entity.as_deref() {
            let origin = record.origin_entity.as_deref() == Some(entity);
            let destination = record.destination_entity.as_deref() == Some(entity);
            if !origin && !destination {
                return false;
            }
        }
        true
    }
}

/// Newest first: date descending, then append order descending.
pub fn sort_newest_first(records: &mut [MovementHistoryRecord]) {
    records.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn record(id: i64, day: u32, product: &str, origin: &str, destination: &str) -> MovementHistoryRecord {
        MovementHistoryRecord {
            id,
            movement_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            movement_kind: crate::models::movement::movement_kind(origin, destination),
            product_code: product.into(),
            lot_code: "L1".into(),
            quantity: 5,
            document: "NF1".into(),
            origin_entity: Some(origin.into()),
            origin_warehouse: Some("WH1".into()),
            destination_entity: Some(destination.into()),
            destination_warehouse: Some("WH2".into()),
            user: "ana".into(),
            reason: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn date_range_is_inclusive() {
        let filter = HistoryFilter {
            from: NaiveDate::from_ymd_opt(2024, 3, 2),
            to: NaiveDate::from_ymd_opt(2024, 3, 4),
            ..Default::default()
        };
        assert!(!filter.matches(&record(1, 1, "P1", "A", "B")));
        assert!(filter.matches(&record(2, 2, "P1", "A", "B")));
        assert!(filter.matches(&record(3, 4, "P1", "A", "B")));
        assert!(!filter.matches(&record(4, 5, "P1", "A", "B")));
    }

    #[test]
    fn entity_matches_either_side() {
        let filter = HistoryFilter {
            entity: Some("B".into()),
            ..Default::default()
        };
        assert!(filter.matches(&record(1, 1, "P1", "A", "B")));
        assert!(filter.matches(&record(2, 1, "P1", "B", "C")));
        assert!(!filter.matches(&record(3, 1, "P1", "A", "C")));
    }

    #[test]
    fn kind_and_product_filters_combine() {
        let filter = HistoryFilter {
            product_code: Some("P2".into()),
            movement_kind: Some(MovementKind::InterWarehouse),
            ..Default::default()
        };
        assert!(filter.matches(&record(1, 1, "P2", "A", "A")));
        assert!(!filter.matches(&record(2, 1, "P2", "A", "B")));
        assert!(!filter.matches(&record(3, 1, "P1", "A", "A")));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let filter = HistoryFilter {
            from: NaiveDate::from_ymd_opt(2024, 3, 9),
            to: NaiveDate::from_ymd_opt(2024, 3, 1),
            ..Default::default()
        };
        assert_matches!(filter.check(), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn newest_first_breaks_ties_by_sequence() {
        let mut records = vec![
            record(1, 2, "P1", "A", "B"),
            record(2, 3, "P1", "A", "B"),
            record(3, 2, "P1", "A", "B"),
        ];
        sort_newest_first(&mut records);
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
