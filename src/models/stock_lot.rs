use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;

/// Fiscal classification of a lot.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StockClass {
    #[sea_orm(string_value = "domestic")]
    Domestic,
    #[sea_orm(string_value = "direct-import")]
    DirectImport,
    #[sea_orm(string_value = "consigned")]
    Consigned,
}

/// Identity of a lot inside the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct LotKey {
    pub product_code: String,
    pub legal_entity: String,
    pub warehouse: String,
    pub lot_code: String,
    pub expiry_date: Option<NaiveDate>,
}

impl LotKey {
    pub fn new(
        product_code: impl Into<String>,
        legal_entity: impl Into<String>,
        warehouse: impl Into<String>,
        lot_code: impl Into<String>,
        expiry_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            product_code: product_code.into(),
            legal_entity: legal_entity.into(),
            warehouse: warehouse.into(),
            lot_code: lot_code.into(),
            expiry_date,
        }
    }

    /// Canonical single-string form, used as the unique column in the database.
    pub fn canonical(&self) -> String {
        let expiry = self
            .expiry_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{}|{}|{}|{}|{}",
            self.product_code, self.legal_entity, self.warehouse, self.lot_code, expiry
        )
    }
}

impl fmt::Display for LotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// A quantity of one product, in one lot, held by one legal entity in one warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct StockLot {
    #[validate(length(min = 1, message = "Product code cannot be empty"))]
    pub product_code: String,
    pub product_description: String,
    #[validate(length(min = 1, message = "Legal entity cannot be empty"))]
    pub legal_entity: String,
    #[validate(length(min = 1, message = "Warehouse cannot be empty"))]
    pub warehouse: String,
    #[validate(length(min = 1, message = "Lot code cannot be empty"))]
    pub lot_code: String,
    pub expiry_date: Option<NaiveDate>,
    #[validate(range(min = 0, message = "Total quantity cannot be negative"))]
    pub total_quantity: i64,
    #[validate(range(min = 0, message = "Available quantity cannot be negative"))]
    pub available_quantity: i64,
    #[validate(range(min = 0, message = "Reserved quantity cannot be negative"))]
    pub reserved_quantity: i64,
    pub unit_cost: Decimal,
    pub supplier: String,
    pub stock_class: StockClass,
    pub source_origin: String,
}

impl StockLot {
    pub fn key(&self) -> LotKey {
        LotKey::new(
            self.product_code.clone(),
            self.legal_entity.clone(),
            self.warehouse.clone(),
            self.lot_code.clone(),
            self.expiry_date,
        )
    }

    /// Always derived from the current quantity; never stored.
    pub fn total_cost(&self) -> Decimal {
        Decimal::from(self.total_quantity).saturating_mul(self.unit_cost)
    }

    /// Checks field rules and the quantity triple.
    pub fn check(&self) -> Result<(), ServiceError> {
        self.validate()?;
        if self.unit_cost.is_sign_negative() {
            return Err(ServiceError::ValidationError(format!(
                "lot {}: unit cost cannot be negative",
                self.key()
            )));
        }
        let expected = self
            .available_quantity
            .checked_add(self.reserved_quantity)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "lot {}: available plus reserved quantity is out of range",
                    self.key()
                ))
            })?;
        if self.total_quantity != expected {
            return Err(ServiceError::ValidationError(format!(
                "lot {}: total quantity {} must equal available {} plus reserved {}",
                self.key(),
                self.total_quantity,
                self.available_quantity,
                self.reserved_quantity
            )));
        }
        Ok(())
    }

    /// Empty lot at `destination`, inheriting the descriptive attributes of `self`.
    pub fn empty_copy_at(&self, legal_entity: &str, warehouse: &str) -> StockLot {
        StockLot {
            legal_entity: legal_entity.to_string(),
            warehouse: warehouse.to_string(),
            total_quantity: 0,
            available_quantity: 0,
            reserved_quantity: 0,
            ..self.clone()
        }
    }
}
