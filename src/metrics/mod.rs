/*!
 * # Metrics Module
 *
 * Prometheus counters for the movement lifecycle, exported in text format at
 * `/metrics`.
 */

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

fn counter(name: &str, help: &str) -> IntCounter {
    let c = IntCounter::new(name, help).expect("metric can be created");
    REGISTRY
        .register(Box::new(c.clone()))
        .expect("metric can be registered");
    c
}

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new_custom(Some("stock_ledger".into()), None)
        .expect("registry can be created");
    pub static ref DRAFTS_OPENED: IntCounter =
        counter("movement_drafts_opened_total", "Movement drafts opened");
    pub static ref DRAFTS_ABANDONED: IntCounter =
        counter("movement_drafts_abandoned_total", "Movement drafts abandoned");
    pub static ref VALIDATIONS: IntCounterVec = {
        let c = IntCounterVec::new(
            Opts::new("movement_validations_total", "Movement validations by outcome"),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY
            .register(Box::new(c.clone()))
            .expect("metric can be registered");
        c
    };
    pub static ref CONFIRMATIONS: IntCounter =
        counter("movements_confirmed_total", "Movements confirmed");
    pub static ref CONFLICTS: IntCounter = counter(
        "movement_conflicts_total",
        "Confirmations refused because live availability changed"
    );
    pub static ref GATE_BLOCKS: IntCounter = counter(
        "movement_gate_blocks_total",
        "Confirmations refused by the documentation gate"
    );
    pub static ref HISTORY_RECORDS: IntCounter =
        counter("movement_history_records_total", "History records appended");
    pub static ref LOTS_RECEIVED: IntCounter =
        counter("lots_received_total", "Lots created or replaced by receiving");
}

pub fn record_validation(valid: bool) {
    VALIDATIONS
        .with_label_values(&[if valid { "valid" } else { "invalid" }])
        .inc();
}

/// Prometheus text exposition of every ledger metric.
pub async fn metrics_handler() -> Result<String, MetricsError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| {
            error!("Failed to encode metrics: {}", e);
            MetricsError::ExportError(e.to_string())
        })?;
    String::from_utf8(buffer).map_err(|e| MetricsError::ExportError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn export_contains_incremented_counters() {
        CONFIRMATIONS.inc();
        record_validation(false);
        let body = metrics_handler().await.unwrap();
        assert!(body.contains("stock_ledger_movements_confirmed_total"));
        assert!(body.contains("outcome=\"invalid\""));
    }
}
