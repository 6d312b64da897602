//! # Domain Types
//!
//! Entities and request types shared by the core and the database layer.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Item       │   │     Invoice     │   │ ProductionOrder │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  order_number   │       │
//! │  │  sku (business) │   │  invoice_number │   │  finished item  │       │
//! │  │  qty_on_hand  ◄─┼── cached, never authoritative               │       │
//! │  │  avg_cost     ◄─┼── cached, never authoritative               │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │     Receipt     │   │  SaleDocument   │                             │
//! │  │  one new layer  │   │  priced lines   │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4, immutable, used for relations
//! - Business ID: (sku, invoice_number, order_number), human-readable

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::audit::CachedItemState;
use crate::costing::StageSpec;
use crate::error::CoreResult;
use crate::journal::AccountMap;
use crate::line::{LineAmounts, LineInput};
use crate::money::Money;
use crate::quantity::Quantity;
use crate::validation::{
    validate_account_code, validate_batch_number, validate_name, validate_non_negative_money,
    validate_positive_quantity,
};

// =============================================================================
// Item
// =============================================================================

/// A stocked item with its denormalized cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Item {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name.
    pub name: String,

    /// Stock account for this item. `None` uses the default inventory account.
    pub inventory_account: Option<String>,

    /// Cached sum of open layer quantities.
    pub qty_on_hand: Quantity,

    /// Cached value-weighted average cost of open layers.
    pub avg_cost: Money,

    /// Whether item is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// The account this item's stock value lives in.
    pub fn inventory_account<'a>(&'a self, accounts: &'a AccountMap) -> &'a str {
        self.inventory_account
            .as_deref()
            .unwrap_or(accounts.inventory.as_str())
    }

    /// The cached figures, for drift detection.
    pub fn cached_state(&self) -> CachedItemState {
        CachedItemState {
            item_id: self.id.clone(),
            sku: self.sku.clone(),
            cached_qty: self.qty_on_hand,
            cached_avg_cost: self.avg_cost,
        }
    }
}

/// Input for registering an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub inventory_account: Option<String>,
}

impl NewItem {
    pub fn new(sku: impl Into<String>, name: impl Into<String>) -> Self {
        NewItem {
            sku: sku.into(),
            name: name.into(),
            inventory_account: None,
        }
    }

    pub fn with_inventory_account(mut self, account: impl Into<String>) -> Self {
        self.inventory_account = Some(account.into());
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        crate::validation::validate_sku(&self.sku)?;
        validate_name("name", &self.name)?;
        if let Some(account) = &self.inventory_account {
            validate_account_code(account)?;
        }
        Ok(())
    }
}

// =============================================================================
// Receipt
// =============================================================================

/// A goods receipt: one new inventory layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub item_id: String,
    pub quantity: Quantity,
    pub unit_cost: Money,
    pub batch_number: String,
    pub receive_date: NaiveDate,
    /// PO / GRN number. Becomes the journal reference.
    #[serde(default)]
    pub reference: Option<String>,
    /// Account credited for the stock value. `None` uses accounts payable.
    #[serde(default)]
    pub offset_account: Option<String>,
}

impl Receipt {
    pub fn new(
        item_id: impl Into<String>,
        quantity: Quantity,
        unit_cost: Money,
        batch_number: impl Into<String>,
        receive_date: NaiveDate,
    ) -> Self {
        Receipt {
            item_id: item_id.into(),
            quantity,
            unit_cost,
            batch_number: batch_number.into(),
            receive_date,
            reference: None,
            offset_account: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_offset_account(mut self, account: impl Into<String>) -> Self {
        self.offset_account = Some(account.into());
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        validate_positive_quantity("quantity", self.quantity)?;
        validate_non_negative_money("unit_cost", self.unit_cost)?;
        validate_batch_number(&self.batch_number)?;
        if let Some(account) = &self.offset_account {
            validate_account_code(account)?;
        }
        Ok(())
    }

    /// `quantity × unit_cost`, rounded once.
    pub fn value(&self) -> Money {
        self.unit_cost.times_quantity(self.quantity)
    }
}

// =============================================================================
// Invoice
// =============================================================================

/// Where an invoice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceKind {
    /// Ad-hoc sale with stock depletion.
    Sale,
    /// Generated by the refill scheduler.
    Refill,
}

/// A posted invoice header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub kind: InvoiceKind,
    pub contract_id: Option<String>,
    pub customer_id: String,
    #[ts(as = "String")]
    pub invoice_date: NaiveDate,
    /// Billing cycle this invoice covers (refills only).
    #[ts(as = "Option<String>")]
    pub billing_period_start: Option<NaiveDate>,
    pub gross: Money,
    pub discount: Money,
    pub net: Money,
    pub tax: Money,
    pub total: Money,
    pub journal_entry_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// One persisted invoice line with its computed figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub item_id: Option<String>,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub gross: Money,
    pub discount: Money,
    pub net: Money,
    pub tax: Money,
    pub total: Money,
    pub tax_account: Option<String>,
}

impl InvoiceLine {
    pub fn from_calculated(
        line_no: u32,
        item_id: Option<String>,
        input: &LineInput,
        amounts: &LineAmounts,
    ) -> Self {
        InvoiceLine {
            line_no,
            item_id,
            quantity: input.quantity,
            unit_price: input.unit_price,
            gross: amounts.gross,
            discount: amounts.discount,
            net: amounts.net,
            tax: amounts.tax,
            total: amounts.total,
            tax_account: input.tax_account.clone(),
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// One sold line. `item_id` set means stock is depleted for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    #[serde(default)]
    pub item_id: Option<String>,
    pub line: LineInput,
}

/// A sale to post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDocument {
    pub sale_number: String,
    pub customer_id: String,
    pub sale_date: NaiveDate,
    pub lines: Vec<SaleLine>,
}

impl SaleDocument {
    pub fn validate(&self) -> CoreResult<()> {
        validate_name("sale_number", &self.sale_number)?;
        validate_name("customer_id", &self.customer_id)?;
        if self.lines.is_empty() {
            return Err(crate::error::ValidationError::required("lines").into());
        }
        Ok(())
    }
}

// =============================================================================
// Production Order
// =============================================================================

/// A production run to cost and post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub order_number: String,
    pub production_date: NaiveDate,
    /// Item that receives the output layer.
    pub finished_item_id: String,
    pub batch_number: String,
    /// WIP carried in from an earlier run, usually zero.
    #[serde(default)]
    pub opening_wip: Money,
    pub stages: Vec<StageSpec>,
}

impl ProductionOrder {
    pub fn validate(&self) -> CoreResult<()> {
        validate_name("order_number", &self.order_number)?;
        validate_batch_number(&self.batch_number)?;
        validate_non_negative_money("opening_wip", self.opening_wip)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(account: Option<&str>) -> Item {
        Item {
            id: "i-1".to_string(),
            sku: "RESIN-01".to_string(),
            name: "PET Resin".to_string(),
            inventory_account: account.map(str::to_string),
            qty_on_hand: Quantity::from_units(10),
            avg_cost: Money::from_minor(1200),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_item_inventory_account_fallback() {
        let accounts = AccountMap::default();
        assert_eq!(item(None).inventory_account(&accounts), "1300");
        assert_eq!(item(Some("1310")).inventory_account(&accounts), "1310");
    }

    #[test]
    fn test_receipt_validation_and_value() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let receipt = Receipt::new("i-1", Quantity::from_milli(2_500), Money::from_minor(401), "LOT-A", date);
        assert!(receipt.validate().is_ok());
        // 2.5 × 401 = 1002.5 → 1003
        assert_eq!(receipt.value().minor(), 1003);

        let bad = Receipt::new("i-1", Quantity::zero(), Money::from_minor(1), "LOT-A", date);
        assert!(bad.validate().is_err());

        let bad = Receipt::new("i-1", Quantity::from_units(1), Money::from_minor(1), "", date);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_new_item_validation() {
        assert!(NewItem::new("RESIN-01", "PET Resin").validate().is_ok());
        assert!(NewItem::new("", "PET Resin").validate().is_err());
        assert!(NewItem::new("RESIN-01", "PET Resin")
            .with_inventory_account("bad code")
            .validate()
            .is_err());
    }
}
