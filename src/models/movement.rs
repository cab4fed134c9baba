use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::stock_lot::{LotKey, StockLot};

/// Classification of a movement derived from its origin and destination entities.
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
pub enum MovementKind {
    #[sea_orm(string_value = "inter-company")]
    InterCompany,
    #[sea_orm(string_value = "inter-warehouse")]
    InterWarehouse,
}

/// Different legal entities make an inter-company transfer; otherwise it is inter-warehouse.
pub fn movement_kind(origin_entity: &str, destination_entity: &str) -> MovementKind {
    if origin_entity != destination_entity {
        MovementKind::InterCompany
    } else {
        MovementKind::InterWarehouse
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MovementStatus {
    Draft,
    Valid,
    Invalid,
    Confirmed,
}

/// Why the confirmation gate refused a request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum GateBlock {
    NoItems,
    MissingDocumentation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MovementItem {
    pub product_code: String,
    pub product_description: String,
    pub lot_code: String,
    pub expiry_date: Option<NaiveDate>,
    /// Availability observed when the lot was selected.
    pub available_quantity_snapshot: i64,
    pub snapshot_taken_at: DateTime<Utc>,
    pub quantity_to_move: i64,
    pub item_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MovementRequest {
    pub id: Uuid,
    pub status: MovementStatus,
    pub date: NaiveDate,
    pub movement_kind: MovementKind,
    pub origin_entity: String,
    pub origin_warehouse: String,
    pub destination_entity: String,
    pub destination_warehouse: String,
    pub responsible: String,
    pub linked_invoice_number: Option<String>,
    pub linked_order_number: Option<String>,
    pub reason: Option<String>,
    pub matrix_invoice_generated: bool,
    pub matrix_invoice_number: Option<String>,
    pub items: Vec<MovementItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Header fields a draft edit may change. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct DraftPatch {
    pub date: Option<NaiveDate>,
    #[validate(length(max = 64))]
    pub origin_entity: Option<String>,
    #[validate(length(max = 64))]
    pub origin_warehouse: Option<String>,
    #[validate(length(max = 64))]
    pub destination_entity: Option<String>,
    #[validate(length(max = 64))]
    pub destination_warehouse: Option<String>,
    #[validate(length(max = 128))]
    pub responsible: Option<String>,
    #[validate(length(max = 64))]
    pub linked_invoice_number: Option<String>,
    #[validate(length(max = 64))]
    pub linked_order_number: Option<String>,
    #[validate(length(max = 512))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewItem {
    #[validate(length(min = 1, message = "Product code cannot be empty"))]
    pub product_code: String,
    #[validate(length(min = 1, message = "Lot code cannot be empty"))]
    pub lot_code: String,
    pub expiry_date: Option<NaiveDate>,
    #[validate(range(min = 0, message = "Quantity to move cannot be negative"))]
    pub quantity_to_move: i64,
    #[validate(length(max = 512))]
    pub item_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct ItemPatch {
    #[validate(range(min = 0, message = "Quantity to move cannot be negative"))]
    pub quantity_to_move: Option<i64>,
    #[validate(length(max = 512))]
    pub item_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ItemValidationError {
    pub index: usize,
    pub product_code: String,
    pub lot_code: String,
    pub quantity_to_move: i64,
    pub available_quantity: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ValidationReport {
    pub valid: bool,
    pub item_errors: Vec<ItemValidationError>,
    pub header_errors: Vec<String>,
}

/// An item whose live availability no longer covers the requested quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConflictItem {
    pub index: usize,
    pub product_code: String,
    pub lot_code: String,
    pub requested: i64,
    pub live_available: i64,
}

fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

fn clean(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl MovementRequest {
    pub fn new_draft(today: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: MovementStatus::Draft,
            date: today,
            movement_kind: movement_kind("", ""),
            origin_entity: String::new(),
            origin_warehouse: String::new(),
            destination_entity: String::new(),
            destination_warehouse: String::new(),
            responsible: String::new(),
            linked_invoice_number: None,
            linked_order_number: None,
            reason: None,
            matrix_invoice_generated: false,
            matrix_invoice_number: None,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
            confirmed_at: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == MovementStatus::Confirmed
    }

    pub fn ensure_editable(&self) -> Result<(), ServiceError> {
        if self.is_confirmed() {
            return Err(ServiceError::InvalidOperation(format!(
                "movement {} is confirmed and can no longer change",
                self.id
            )));
        }
        Ok(())
    }

    /// Any change makes an earlier validation result stale.
    fn touch(&mut self) {
        self.status = MovementStatus::Draft;
        self.updated_at = Utc::now();
    }

    pub fn apply_patch(&mut self, patch: DraftPatch) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        patch.validate()?;

        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(v) = patch.origin_entity {
            self.origin_entity = v.trim().to_string();
        }
        if let Some(v) = patch.origin_warehouse {
            self.origin_warehouse = v.trim().to_string();
        }
        if let Some(v) = patch.destination_entity {
            self.destination_entity = v.trim().to_string();
        }
        if let Some(v) = patch.destination_warehouse {
            self.destination_warehouse = v.trim().to_string();
        }
        if let Some(v) = patch.responsible {
            self.responsible = v.trim().to_string();
        }
        if let Some(v) = patch.linked_invoice_number {
            self.linked_invoice_number = clean(v);
        }
        if let Some(v) = patch.linked_order_number {
            self.linked_order_number = clean(v);
        }
        if let Some(v) = patch.reason {
            self.reason = clean(v);
        }

        self.movement_kind = movement_kind(&self.origin_entity, &self.destination_entity);
        self.touch();
        Ok(())
    }

    /// The origin `patch` would move this request to, when it differs from
    /// the current one.
    pub fn origin_after(&self, patch: &DraftPatch) -> Option<(String, String)> {
        let entity = patch
            .origin_entity
            .as_deref()
            .map(str::trim)
            .unwrap_or(&self.origin_entity);
        let warehouse = patch
            .origin_warehouse
            .as_deref()
            .map(str::trim)
            .unwrap_or(&self.origin_warehouse);
        (entity != self.origin_entity || warehouse != self.origin_warehouse)
            .then(|| (entity.to_string(), warehouse.to_string()))
    }

    /// Replaces every item's availability snapshot, in item order.
    pub fn retake_snapshots(&mut self, available: &[i64]) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        if available.len() != self.items.len() {
            return Err(ServiceError::InternalError(format!(
                "movement {} has {} item(s) but {} snapshot(s) were taken",
                self.id,
                self.items.len(),
                available.len()
            )));
        }
        let now = Utc::now();
        for (item, qty) in self.items.iter_mut().zip(available) {
            item.available_quantity_snapshot = *qty;
            item.snapshot_taken_at = now;
        }
        self.touch();
        Ok(())
    }

    /// Key of the origin lot an item draws from under the current header.
    pub fn origin_key(&self, product_code: &str, lot_code: &str, expiry: Option<NaiveDate>) -> LotKey {
        LotKey::new(
            product_code,
            self.origin_entity.clone(),
            self.origin_warehouse.clone(),
            lot_code,
            expiry,
        )
    }

    pub fn destination_key(&self, item: &MovementItem) -> LotKey {
        LotKey::new(
            item.product_code.clone(),
            self.destination_entity.clone(),
            self.destination_warehouse.clone(),
            item.lot_code.clone(),
            item.expiry_date,
        )
    }

    pub fn push_item(&mut self, lot: &StockLot, input: NewItem) -> Result<usize, ServiceError> {
        self.ensure_editable()?;
        input.validate()?;
        self.items.push(MovementItem {
            product_code: lot.product_code.clone(),
            product_description: lot.product_description.clone(),
            lot_code: lot.lot_code.clone(),
            expiry_date: lot.expiry_date,
            available_quantity_snapshot: lot.available_quantity,
            snapshot_taken_at: Utc::now(),
            quantity_to_move: input.quantity_to_move,
            item_reason: input.item_reason.and_then(clean),
        });
        self.touch();
        Ok(self.items.len() - 1)
    }

    pub fn edit_item(&mut self, index: usize, patch: ItemPatch) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        patch.validate()?;
        let item = self.items.get_mut(index).ok_or_else(|| {
            ServiceError::NotFound(format!("item {} in movement {}", index, self.id))
        })?;
        if let Some(q) = patch.quantity_to_move {
            item.quantity_to_move = q;
        }
        if let Some(reason) = patch.item_reason {
            item.item_reason = clean(reason);
        }
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, index: usize) -> Result<MovementItem, ServiceError> {
        self.ensure_editable()?;
        if index >= self.items.len() {
            return Err(ServiceError::NotFound(format!(
                "item {} in movement {}",
                index, self.id
            )));
        }
        let removed = self.items.remove(index);
        self.touch();
        Ok(removed)
    }

    /// Checks each item against its snapshot plus the header requirements. Touches nothing.
    pub fn validate_quantities(&self) -> ValidationReport {
        let item_errors: Vec<ItemValidationError> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.quantity_to_move > item.available_quantity_snapshot)
            .map(|(index, item)| ItemValidationError {
                index,
                product_code: item.product_code.clone(),
                lot_code: item.lot_code.clone(),
                quantity_to_move: item.quantity_to_move,
                available_quantity: item.available_quantity_snapshot,
                message: format!(
                    "quantity to move {} exceeds available {}",
                    item.quantity_to_move, item.available_quantity_snapshot
                ),
            })
            .collect();

        let mut header_errors = Vec::new();
        for (value, label) in [
            (&self.origin_entity, "origin entity"),
            (&self.origin_warehouse, "origin warehouse"),
            (&self.destination_entity, "destination entity"),
            (&self.destination_warehouse, "destination warehouse"),
            (&self.responsible, "responsible"),
        ] {
            if value.trim().is_empty() {
                header_errors.push(format!("{} is required", label));
            }
        }
        if !self.origin_entity.is_empty()
            && self.origin_entity == self.destination_entity
            && self.origin_warehouse == self.destination_warehouse
        {
            header_errors.push("origin and destination are the same location".to_string());
        }

        ValidationReport {
            valid: item_errors.is_empty() && header_errors.is_empty(),
            item_errors,
            header_errors,
        }
    }

    /// Records the outcome of a validation run on the request status.
    pub fn record_validation(&mut self, report: &ValidationReport) {
        if self.is_confirmed() {
            return;
        }
        self.status = if report.valid {
            MovementStatus::Valid
        } else {
            MovementStatus::Invalid
        };
    }

    pub fn has_documentation(&self) -> bool {
        non_blank(&self.linked_invoice_number) || self.matrix_invoice_generated
    }

    pub fn gate_block(&self) -> Option<GateBlock> {
        if self.items.is_empty() {
            Some(GateBlock::NoItems)
        } else if !self.has_documentation() {
            Some(GateBlock::MissingDocumentation)
        } else {
            None
        }
    }

    pub fn is_confirmable(&self) -> bool {
        self.gate_block().is_none()
    }

    /// One-way: nothing clears the flag once set.
    pub fn mark_matrix_invoice(&mut self, number: String) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        self.matrix_invoice_generated = true;
        self.matrix_invoice_number = Some(number);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Document recorded in history: the linked invoice, else the matrix invoice.
    pub fn document(&self) -> String {
        if non_blank(&self.linked_invoice_number) {
            self.linked_invoice_number.clone().unwrap_or_default()
        } else {
            self.matrix_invoice_number.clone().unwrap_or_default()
        }
    }

    pub fn freeze(&mut self) {
        let now = Utc::now();
        self.status = MovementStatus::Confirmed;
        self.confirmed_at = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stock_lot::fixtures::lot;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn header(req: &mut MovementRequest, origin: &str, destination: &str) {
        req.apply_patch(DraftPatch {
            origin_entity: Some(origin.into()),
            origin_warehouse: Some("WH1".into()),
            destination_entity: Some(destination.into()),
            destination_warehouse: Some("WH2".into()),
            responsible: Some("ana".into()),
            ..Default::default()
        })
        .unwrap();
    }

    fn item(quantity: i64) -> NewItem {
        NewItem {
            product_code: "P1".into(),
            lot_code: "L1".into(),
            expiry_date: None,
            quantity_to_move: quantity,
            item_reason: None,
        }
    }

    #[rstest]
    #[case("00.1", "00.2", MovementKind::InterCompany)]
    #[case("00.1", "00.1", MovementKind::InterWarehouse)]
    #[case("", "", MovementKind::InterWarehouse)]
    fn kind_follows_entities(
        #[case] origin: &str,
        #[case] destination: &str,
        #[case] expected: MovementKind,
    ) {
        assert_eq!(movement_kind(origin, destination), expected);
    }

    #[test]
    fn kind_is_recomputed_on_every_entity_edit() {
        let mut req = MovementRequest::new_draft(today());
        header(&mut req, "00.1", "00.2");
        assert_eq!(req.movement_kind, MovementKind::InterCompany);
        req.apply_patch(DraftPatch {
            destination_entity: Some("00.1".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(req.movement_kind, MovementKind::InterWarehouse);
    }

    #[test]
    fn push_item_takes_snapshot_from_lot() {
        let mut req = MovementRequest::new_draft(today());
        let l = lot("P1", "00.1", "WH1", "L1", 100);
        req.push_item(&l, item(40)).unwrap();
        let it = &req.items[0];
        assert_eq!(it.available_quantity_snapshot, 100);
        assert_eq!(it.product_description, "P1 description");
        assert_eq!(it.expiry_date, l.expiry_date);
    }

    #[test]
    fn negative_quantity_is_rejected_at_edit_time() {
        let mut req = MovementRequest::new_draft(today());
        let l = lot("P1", "00.1", "WH1", "L1", 100);
        assert_matches!(
            req.push_item(&l, item(-1)),
            Err(ServiceError::ValidationError(_))
        );
        req.push_item(&l, item(1)).unwrap();
        assert_matches!(
            req.edit_item(
                0,
                ItemPatch {
                    quantity_to_move: Some(-5),
                    ..Default::default()
                }
            ),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn excess_quantity_makes_request_invalid() {
        let mut req = MovementRequest::new_draft(today());
        header(&mut req, "00.1", "00.2");
        req.push_item(&lot("P1", "00.1", "WH1", "L1", 100), item(150))
            .unwrap();
        let report = req.validate_quantities();
        assert!(!report.valid);
        assert_eq!(report.item_errors.len(), 1);
        assert_eq!(report.item_errors[0].available_quantity, 100);
        assert!(report.header_errors.is_empty());

        req.record_validation(&report);
        assert_eq!(req.status, MovementStatus::Invalid);
    }

    #[test]
    fn quantity_equal_to_snapshot_is_valid() {
        let mut req = MovementRequest::new_draft(today());
        header(&mut req, "00.1", "00.2");
        req.push_item(&lot("P1", "00.1", "WH1", "L1", 100), item(100))
            .unwrap();
        assert!(req.validate_quantities().valid);
    }

    #[test]
    fn header_errors_cover_missing_fields_and_same_location() {
        let mut req = MovementRequest::new_draft(today());
        let report = req.validate_quantities();
        assert_eq!(report.header_errors.len(), 5);

        req.apply_patch(DraftPatch {
            origin_entity: Some("00.1".into()),
            origin_warehouse: Some("WH1".into()),
            destination_entity: Some("00.1".into()),
            destination_warehouse: Some("WH1".into()),
            responsible: Some("ana".into()),
            ..Default::default()
        })
        .unwrap();
        let report = req.validate_quantities();
        assert_eq!(
            report.header_errors,
            vec!["origin and destination are the same location".to_string()]
        );
    }

    #[test]
    fn edits_reset_validation_status() {
        let mut req = MovementRequest::new_draft(today());
        header(&mut req, "00.1", "00.2");
        req.push_item(&lot("P1", "00.1", "WH1", "L1", 100), item(10))
            .unwrap();
        let report = req.validate_quantities();
        req.record_validation(&report);
        assert_eq!(req.status, MovementStatus::Valid);
        req.edit_item(
            0,
            ItemPatch {
                quantity_to_move: Some(20),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(req.status, MovementStatus::Draft);
    }

    #[test]
    fn gate_requires_items_and_documentation() {
        let mut req = MovementRequest::new_draft(today());
        assert_eq!(req.gate_block(), Some(GateBlock::NoItems));

        req.push_item(&lot("P1", "00.1", "WH1", "L1", 100), item(10))
            .unwrap();
        assert_eq!(req.gate_block(), Some(GateBlock::MissingDocumentation));

        req.apply_patch(DraftPatch {
            linked_invoice_number: Some("   ".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(!req.is_confirmable());

        req.apply_patch(DraftPatch {
            linked_invoice_number: Some("NF123".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(req.is_confirmable());
    }

    #[test]
    fn gate_ignores_quantity_validity() {
        let mut req = MovementRequest::new_draft(today());
        req.push_item(&lot("P1", "00.1", "WH1", "L1", 100), item(500))
            .unwrap();
        req.mark_matrix_invoice("MTX-000001".into()).unwrap();
        assert!(req.is_confirmable());
        assert!(!req.validate_quantities().valid);
    }

    #[test]
    fn matrix_invoice_survives_invoice_edits() {
        let mut req = MovementRequest::new_draft(today());
        req.push_item(&lot("P1", "00.1", "WH1", "L1", 100), item(5))
            .unwrap();
        req.mark_matrix_invoice("MTX-000007".into()).unwrap();
        req.apply_patch(DraftPatch {
            linked_invoice_number: Some(String::new()),
            ..Default::default()
        })
        .unwrap();
        assert!(req.matrix_invoice_generated);
        assert!(req.is_confirmable());
        assert_eq!(req.document(), "MTX-000007");
    }

    #[test]
    fn linked_invoice_wins_as_document() {
        let mut req = MovementRequest::new_draft(today());
        req.mark_matrix_invoice("MTX-000001".into()).unwrap();
        req.apply_patch(DraftPatch {
            linked_invoice_number: Some(" NF123 ".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(req.document(), "NF123");
    }

    #[test]
    fn confirmed_request_is_frozen() {
        let mut req = MovementRequest::new_draft(today());
        req.freeze();
        assert_matches!(
            req.apply_patch(DraftPatch::default()),
            Err(ServiceError::InvalidOperation(_))
        );
        assert_matches!(req.remove_item(0), Err(ServiceError::InvalidOperation(_)));
        assert_matches!(
            req.mark_matrix_invoice("X".into()),
            Err(ServiceError::InvalidOperation(_))
        );
    }

    #[test]
    fn removing_unknown_index_is_not_found() {
        let mut req = MovementRequest::new_draft(today());
        assert_matches!(req.remove_item(3), Err(ServiceError::NotFound(_)));
    }
}
