pub mod aggregator;
pub mod history;
pub mod ledger;
pub mod lot_store;
pub mod lots;
pub mod matrix_invoice;
pub mod movements;
pub mod positions;
