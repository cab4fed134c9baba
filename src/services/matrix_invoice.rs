use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::ServiceError;
use crate::models::movement::MovementRequest;

/// Produces the fiscal document backing a movement that has no linked invoice.
/// Only the returned document number is kept.
#[async_trait]
pub trait MatrixInvoiceGenerator: Send + Sync {
    async fn generate(&self, request: &MovementRequest) -> Result<String, ServiceError>;
}

/// Issues `PREFIX-000001`, `PREFIX-000002`, ... for the life of the process.
#[derive(Debug)]
pub struct SequentialMatrixInvoiceGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialMatrixInvoiceGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl MatrixInvoiceGenerator for SequentialMatrixInvoiceGenerator {
    async fn generate(&self, _request: &MovementRequest) -> Result<String, ServiceError> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}-{:06}", self.prefix, n))
    }
}
