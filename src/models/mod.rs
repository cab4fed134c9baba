// Domain models
pub mod history;
pub mod movement;
pub mod stock_lot;

pub use history::{HistoryFilter, MovementHistoryRecord};
pub use movement::{
    movement_kind, ConflictItem, DraftPatch, GateBlock, ItemPatch, ItemValidationError,
    MovementItem, MovementKind, MovementRequest, MovementStatus, NewItem, ValidationReport,
};
pub use stock_lot::{LotKey, StockClass, StockLot};
