//! Filter/sort over aggregated lot positions and the service serving them.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

use crate::errors::ServiceError;
use crate::models::stock_lot::{LotKey, StockClass, StockLot};
use crate::services::aggregator::{aggregate, ExpiryBucket, ExpiryPolicy, LotPosition, PositionSummary};
use crate::services::lot_store::LotStore;

pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 200;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum QuickFilter {
    #[default]
    None,
    Expired,
    /// Inside the critical window and not yet expired.
    ExpiringSoon,
    LowStock,
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortField {
    ProductCode,
    ProductDescription,
    LegalEntity,
    Warehouse,
    LotCode,
    ExpiryDate,
    TotalQuantity,
    AvailableQuantity,
    ReservedQuantity,
    UnitCost,
    TotalCost,
    Supplier,
    StockClass,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SortState {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortState {
    pub fn new(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    /// Same field flips the direction; a different field starts ascending.
    pub fn toggle(current: Option<SortState>, field: SortField) -> SortState {
        match current {
            Some(state) if state.field == field => SortState {
                field,
                direction: state.direction.flipped(),
            },
            _ => SortState::new(field),
        }
    }
}

/// Query string accepted by the positions endpoint.
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PositionQuery {
    /// Case-insensitive substring over description, code, lot, supplier and entity
    pub search: Option<String>,
    /// Exact stock class; absent means all classes
    pub stock_class: Option<StockClass>,
    #[serde(default)]
    pub quick_filter: QuickFilter,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortDirection>,
    /// Column header clicked on top of the current sort: the same field
    /// flips `sort_order`, another field starts ascending.
    pub toggle: Option<SortField>,
}

impl PositionQuery {
    pub fn sort(&self) -> Option<SortState> {
        let current = self.sort_by.map(|field| SortState {
            field,
            direction: self.sort_order.unwrap_or_default(),
        });
        match self.toggle {
            Some(field) => Some(SortState::toggle(current, field)),
            None => current,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PositionPage {
    pub positions: Vec<LotPosition>,
    /// Number of lots passing the filters.
    pub matched: usize,
    /// Store-wide figures, independent of the filters.
    pub summary: PositionSummary,
    /// Sort applied to `positions`, to be sent back as `sort_by`/`sort_order`.
    pub sort: Option<SortState>,
}

fn matches_search(lot: &StockLot, needle: &str) -> bool {
    [
        &lot.product_description,
        &lot.product_code,
        &lot.lot_code,
        &lot.supplier,
        &lot.legal_entity,
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(needle))
}

fn matches_quick(position: &LotPosition, quick: QuickFilter, low_stock_threshold: i64) -> bool {
    match quick {
        QuickFilter::None => true,
        QuickFilter::Expired => position.flags.expiry_bucket == ExpiryBucket::Expired,
        QuickFilter::ExpiringSoon => position.flags.expiry_bucket == ExpiryBucket::Critical,
        QuickFilter::LowStock => position.lot.available_quantity < low_stock_threshold,
        QuickFilter::Reserved => position.flags.has_reservation,
    }
}

/// Keeps positions passing every predicate (AND).
pub fn filter_positions(
    positions: Vec<LotPosition>,
    query: &PositionQuery,
    low_stock_threshold: i64,
) -> Vec<LotPosition> {
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    positions
        .into_iter()
        .filter(|p| needle.as_deref().map_or(true, |n| matches_search(&p.lot, n)))
        .filter(|p| query.stock_class.map_or(true, |class| p.lot.stock_class == class))
        .filter(|p| matches_quick(p, query.quick_filter, low_stock_threshold))
        .collect()
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Absent dates sort earliest.
fn cmp_date(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    a.cmp(&b)
}

fn compare(a: &LotPosition, b: &LotPosition, field: SortField) -> Ordering {
    let (x, y) = (&a.lot, &b.lot);
    match field {
        SortField::ProductCode => cmp_text(&x.product_code, &y.product_code),
        SortField::ProductDescription => cmp_text(&x.product_description, &y.product_description),
        SortField::LegalEntity => cmp_text(&x.legal_entity, &y.legal_entity),
        SortField::Warehouse => cmp_text(&x.warehouse, &y.warehouse),
        SortField::LotCode => cmp_text(&x.lot_code, &y.lot_code),
        SortField::ExpiryDate => cmp_date(x.expiry_date, y.expiry_date),
        SortField::TotalQuantity => x.total_quantity.cmp(&y.total_quantity),
        SortField::AvailableQuantity => x.available_quantity.cmp(&y.available_quantity),
        SortField::ReservedQuantity => x.reserved_quantity.cmp(&y.reserved_quantity),
        SortField::UnitCost => x.unit_cost.cmp(&y.unit_cost),
        SortField::TotalCost => a.total_cost.cmp(&b.total_cost),
        SortField::Supplier => cmp_text(&x.supplier, &y.supplier),
        SortField::StockClass => cmp_text(&x.stock_class.to_string(), &y.stock_class.to_string()),
    }
}

/// Stable sort: equal keys keep their incoming order in both directions.
pub fn sort_positions(positions: &mut [LotPosition], sort: SortState) {
    positions.sort_by(|a, b| {
        let ord = compare(a, b, sort.field);
        match sort.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
}

#[derive(Clone)]
pub struct PositionService {
    store: Arc<dyn LotStore>,
    policy: ExpiryPolicy,
    low_stock_threshold: i64,
}

impl PositionService {
    pub fn new(store: Arc<dyn LotStore>, policy: ExpiryPolicy, low_stock_threshold: i64) -> Self {
        Self {
            store,
            policy,
            low_stock_threshold,
        }
    }

    #[instrument(skip(self))]
    pub async fn query(&self, query: &PositionQuery) -> Result<PositionPage, ServiceError> {
        self.query_on(query, Utc::now().date_naive()).await
    }

    /// Same as [`query`](Self::query) with an explicit reference date.
    pub async fn query_on(
        &self,
        query: &PositionQuery,
        today: NaiveDate,
    ) -> Result<PositionPage, ServiceError> {
        let lots = self.store.all().await?;
        let aggregation = aggregate(&lots, today, &self.policy);
        let mut positions =
            filter_positions(aggregation.positions, query, self.low_stock_threshold);
        let sort = query.sort();
        if let Some(sort) = sort {
            sort_positions(&mut positions, sort);
        }

        Ok(PositionPage {
            matched: positions.len(),
            positions,
            summary: aggregation.summary,
            sort,
        })
    }

    #[instrument(skip(self))]
    pub async fn summary(&self) -> Result<PositionSummary, ServiceError> {
        let lots = self.store.all().await?;
        Ok(aggregate(&lots, Utc::now().date_naive(), &self.policy).summary)
    }

    pub async fn lot(&self, key: &LotKey) -> Result<StockLot, ServiceError> {
        self.store
            .get(key)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("lot {}", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stock_lot::fixtures::lot;
    use crate::services::lot_store::InMemoryLotStore;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn positions(lots: &[StockLot]) -> Vec<LotPosition> {
        aggregate(lots, today(), &ExpiryPolicy::default()).positions
    }

    fn codes(positions: &[LotPosition]) -> Vec<String> {
        positions
            .iter()
            .map(|p| format!("{}/{}", p.lot.product_code, p.lot.lot_code))
            .collect()
    }

    #[test]
    fn toggle_flips_same_field_and_resets_new_field() {
        let first = SortState::toggle(None, SortField::ExpiryDate);
        assert_eq!(first.direction, SortDirection::Asc);
        let second = SortState::toggle(Some(first), SortField::ExpiryDate);
        assert_eq!(second.direction, SortDirection::Desc);
        let third = SortState::toggle(Some(second), SortField::ExpiryDate);
        assert_eq!(third.direction, SortDirection::Asc);
        let other = SortState::toggle(Some(second), SortField::Supplier);
        assert_eq!(other, SortState::new(SortField::Supplier));
    }

    #[test]
    fn query_toggle_builds_on_the_current_sort() {
        let unsorted = PositionQuery {
            toggle: Some(SortField::ExpiryDate),
            ..Default::default()
        };
        assert_eq!(unsorted.sort(), Some(SortState::new(SortField::ExpiryDate)));

        let same = PositionQuery {
            sort_by: Some(SortField::ExpiryDate),
            sort_order: Some(SortDirection::Asc),
            toggle: Some(SortField::ExpiryDate),
            ..Default::default()
        };
        assert_eq!(
            same.sort(),
            Some(SortState { field: SortField::ExpiryDate, direction: SortDirection::Desc })
        );

        let other = PositionQuery {
            sort_by: Some(SortField::ExpiryDate),
            sort_order: Some(SortDirection::Desc),
            toggle: Some(SortField::Supplier),
            ..Default::default()
        };
        assert_eq!(other.sort(), Some(SortState::new(SortField::Supplier)));
    }

    #[tokio::test]
    async fn toggled_query_sorts_descending_and_reports_the_applied_sort() {
        let store = InMemoryLotStore::with_lots(vec![
            lot("P1", "00.1", "WH1", "L1", 10),
            lot("P2", "00.1", "WH1", "L1", 30),
            lot("P3", "00.1", "WH1", "L1", 20),
        ])
        .await
        .unwrap();
        let service = PositionService::new(Arc::new(store), ExpiryPolicy::default(), 200);
        let page = service
            .query_on(
                &PositionQuery {
                    sort_by: Some(SortField::AvailableQuantity),
                    toggle: Some(SortField::AvailableQuantity),
                    ..Default::default()
                },
                today(),
            )
            .await
            .unwrap();
        assert_eq!(codes(&page.positions), vec!["P2/L1", "P3/L1", "P1/L1"]);
        assert_eq!(
            page.sort,
            Some(SortState {
                field: SortField::AvailableQuantity,
                direction: SortDirection::Desc,
            })
        );
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let mut a = lot("P1", "00.1", "WH1", "L1", 10);
        a.supplier = "Northwind".into();
        let b = lot("P2", "00.2", "WH1", "LX", 10);
        let all = positions(&[a, b]);

        let by_supplier = PositionQuery {
            search: Some("NORTH".into()),
            ..Default::default()
        };
        assert_eq!(codes(&filter_positions(all.clone(), &by_supplier, 200)), vec!["P1/L1"]);

        let by_entity = PositionQuery {
            search: Some("00.2".into()),
            ..Default::default()
        };
        assert_eq!(codes(&filter_positions(all, &by_entity, 200)), vec!["P2/LX"]);
    }

    #[test]
    fn predicates_combine_with_and() {
        let mut a = lot("P1", "00.1", "WH1", "L1", 150);
        a.stock_class = StockClass::Consigned;
        let mut b = lot("P1", "00.1", "WH1", "L2", 150);
        b.stock_class = StockClass::Domestic;
        let c = lot("P1", "00.1", "WH1", "L3", 500);
        let query = PositionQuery {
            search: Some("p1".into()),
            stock_class: Some(StockClass::Domestic),
            quick_filter: QuickFilter::LowStock,
            ..Default::default()
        };
        assert_eq!(codes(&filter_positions(positions(&[a, b, c]), &query, 200)), vec!["P1/L2"]);
    }

    #[test]
    fn low_stock_excludes_a_lot_at_the_threshold() {
        let below = lot("P1", "00.1", "WH1", "L1", 199);
        let at = lot("P1", "00.1", "WH1", "L2", 200);
        let query = PositionQuery {
            quick_filter: QuickFilter::LowStock,
            ..Default::default()
        };
        assert_eq!(codes(&filter_positions(positions(&[below, at]), &query, 200)), vec!["P1/L1"]);
    }

    #[test]
    fn expiring_soon_excludes_expired_and_warning() {
        let mut expired = lot("P1", "00.1", "WH1", "L1", 1);
        expired.expiry_date = NaiveDate::from_ymd_opt(2024, 5, 31);
        let mut critical = lot("P1", "00.1", "WH1", "L2", 1);
        critical.expiry_date = NaiveDate::from_ymd_opt(2024, 6, 20);
        let mut warning = lot("P1", "00.1", "WH1", "L3", 1);
        warning.expiry_date = NaiveDate::from_ymd_opt(2024, 7, 20);
        let all = positions(&[expired, critical, warning]);

        let soon = PositionQuery {
            quick_filter: QuickFilter::ExpiringSoon,
            ..Default::default()
        };
        assert_eq!(codes(&filter_positions(all.clone(), &soon, 200)), vec!["P1/L2"]);

        let expired_only = PositionQuery {
            quick_filter: QuickFilter::Expired,
            ..Default::default()
        };
        assert_eq!(codes(&filter_positions(all, &expired_only, 200)), vec!["P1/L1"]);
    }

    #[test]
    fn missing_dates_sort_first_and_ties_stay_stable() {
        let mut a = lot("P1", "00.1", "WH1", "A", 1);
        a.expiry_date = NaiveDate::from_ymd_opt(2025, 1, 1);
        let mut b = lot("P1", "00.1", "WH1", "B", 1);
        b.expiry_date = None;
        let mut c = lot("P1", "00.1", "WH1", "C", 1);
        c.expiry_date = NaiveDate::from_ymd_opt(2025, 1, 1);
        let mut rows = positions(&[a, b, c]);

        sort_positions(&mut rows, SortState::new(SortField::ExpiryDate));
        assert_eq!(codes(&rows), vec!["P1/B", "P1/A", "P1/C"]);

        sort_positions(
            &mut rows,
            SortState {
                field: SortField::ExpiryDate,
                direction: SortDirection::Desc,
            },
        );
        assert_eq!(codes(&rows), vec!["P1/A", "P1/C", "P1/B"]);
    }

    #[test]
    fn text_sort_ignores_case_and_numbers_sort_numerically() {
        let mut a = lot("b", "00.1", "WH1", "L1", 9);
        a.unit_cost = dec!(10);
        let mut b = lot("A", "00.1", "WH1", "L1", 100);
        b.unit_cost = dec!(2);
        let mut rows = positions(&[a, b]);

        sort_positions(&mut rows, SortState::new(SortField::ProductCode));
        assert_eq!(codes(&rows), vec!["A/L1", "b/L1"]);

        sort_positions(&mut rows, SortState::new(SortField::AvailableQuantity));
        assert_eq!(codes(&rows), vec!["b/L1", "A/L1"]);

        sort_positions(&mut rows, SortState::new(SortField::TotalCost));
        assert_eq!(codes(&rows), vec!["b/L1", "A/L1"]);
    }

    #[tokio::test]
    async fn summary_ignores_filters() {
        let store = InMemoryLotStore::with_lots(vec![
            lot("P1", "00.1", "WH1", "L1", 10),
            lot("P2", "00.1", "WH1", "L1", 10),
        ])
        .await
        .unwrap();
        let service = PositionService::new(Arc::new(store), ExpiryPolicy::default(), 200);
        let page = service
            .query_on(
                &PositionQuery {
                    search: Some("P2".into()),
                    ..Default::default()
                },
                today(),
            )
            .await
            .unwrap();
        assert_eq!(page.matched, 1);
        assert_eq!(page.summary.lot_count, 2);
    }
}
