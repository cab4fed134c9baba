pub mod movement_history;
pub mod stock_lot;
