use std::sync::Arc;
use tracing::instrument;

use crate::errors::ServiceError;
use crate::models::history::{HistoryFilter, MovementHistoryRecord};
use crate::services::lot_store::LotStore;

/// Read side of the append-only movement history.
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn LotStore>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn LotStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn query(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<MovementHistoryRecord>, ServiceError> {
        filter.check()?;
        self.store.history(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::lot_store::InMemoryLotStore;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let service = HistoryService::new(Arc::new(InMemoryLotStore::new()));
        let filter = HistoryFilter {
            from: NaiveDate::from_ymd_opt(2024, 2, 1),
            to: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        };
        assert_matches!(
            service.query(&filter).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn empty_store_has_empty_history() {
        let service = HistoryService::new(Arc::new(InMemoryLotStore::new()));
        assert!(service.query(&HistoryFilter::default()).await.unwrap().is_empty());
    }
}
