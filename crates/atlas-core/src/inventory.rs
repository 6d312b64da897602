//! # Inventory Layers
//!
//! Cost layers and the FIFO depletion planner.
//!
//! ## Layer Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Item RESIN-01                                                          │
//! │                                                                         │
//! │  layer #1  2026-03-01  LOT-A  initial 100  remaining 100  @ 12.00      │
//! │  layer #2  2026-03-09  LOT-B  initial  40  remaining  40  @ 13.50      │
//! │                                                                         │
//! │  Deplete(120)                                                           │
//! │    #1 takes 100 @ 12.00 = 1200.00   → remaining 0 (depleted)           │
//! │    #2 takes  20 @ 13.50 =  270.00   → remaining 20                     │
//! │    weighted unit cost = 1470.00 / 120 = 12.25                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Layers are consumed oldest receive date first, ties broken by layer id.
//! A layer's unit cost is fixed when it is received. Remaining quantity only
//! ever goes down.
//!
//! Planning is pure: [`plan_depletion`] decides what to take, the database
//! layer applies the plan inside one transaction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::quantity::Quantity;
use crate::validation::validate_positive_quantity;

// =============================================================================
// Layer
// =============================================================================

/// One receipt lot with a fixed unit cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryLayer {
    /// Monotonic layer id. Breaks ties between layers received the same day.
    pub id: i64,
    pub item_id: String,
    pub batch_number: String,
    pub initial_qty: Quantity,
    pub remaining_qty: Quantity,
    pub unit_cost: Money,
    #[ts(as = "String")]
    pub receive_date: NaiveDate,
    /// PO number, production order or other originating document.
    pub source_reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl InventoryLayer {
    /// A layer with nothing left.
    #[inline]
    pub fn is_depleted(&self) -> bool {
        !self.remaining_qty.is_positive()
    }

    /// `remaining_qty × unit_cost`, rounded once.
    pub fn remaining_value(&self) -> Money {
        self.unit_cost.times_quantity(self.remaining_qty)
    }

    fn fifo_key(&self) -> (NaiveDate, i64) {
        (self.receive_date, self.id)
    }
}

// =============================================================================
// Depletion Plan
// =============================================================================

/// What one layer gave up to a depletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LayerConsumption {
    pub layer_id: i64,
    pub batch_number: String,
    pub quantity: Quantity,
    pub unit_cost: Money,
    /// `quantity × unit_cost`, rounded once.
    pub cost: Money,
    /// Layer quantity left after this consumption.
    pub remaining_after: Quantity,
}

/// The full outcome of a depletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DepletionPlan {
    pub item_id: String,
    pub requested: Quantity,
    /// In consumption order.
    pub consumptions: Vec<LayerConsumption>,
    /// Sum of the per-layer costs. This is the COGS figure.
    pub total_cost: Money,
    /// `total_cost / requested`, rounded half-up.
    pub weighted_unit_cost: Money,
}

/// Plans a FIFO depletion of `qty` from `layers`.
///
/// Only layers of `item_id` with remaining quantity are considered. The
/// input order does not matter: layers are sorted by `(receive_date, id)`.
///
/// ## Errors
/// - `InsufficientStock` when the layers hold less than `qty`
/// - `Validation` when `qty` is not positive
///
/// ## Example
/// ```rust
/// use atlas_core::inventory::{plan_depletion, InventoryLayer};
/// use atlas_core::money::Money;
/// use atlas_core::quantity::Quantity;
/// use chrono::{NaiveDate, Utc};
///
/// let layer = |id, day, qty, cost| InventoryLayer {
///     id,
///     item_id: "RESIN-01".into(),
///     batch_number: format!("LOT-{id}"),
///     initial_qty: Quantity::from_units(qty),
///     remaining_qty: Quantity::from_units(qty),
///     unit_cost: Money::from_minor(cost),
///     receive_date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
///     source_reference: None,
///     created_at: Utc::now(),
/// };
///
/// let layers = vec![layer(2, 9, 40, 1350), layer(1, 1, 100, 1200)];
/// let plan = plan_depletion("RESIN-01", &layers, Quantity::from_units(120)).unwrap();
///
/// assert_eq!(plan.consumptions[0].layer_id, 1);
/// assert_eq!(plan.total_cost.minor(), 147_000);
/// assert_eq!(plan.weighted_unit_cost.minor(), 1225);
/// ```
pub fn plan_depletion(
    item_id: &str,
    layers: &[InventoryLayer],
    qty: Quantity,
) -> CoreResult<DepletionPlan> {
    validate_positive_quantity("quantity", qty)?;

    let mut open: Vec<&InventoryLayer> = layers
        .iter()
        .filter(|l| l.item_id == item_id && !l.is_depleted())
        .collect();
    open.sort_by_key(|l| l.fifo_key());

    let available: Quantity = open.iter().map(|l| l.remaining_qty).sum();
    if available < qty {
        return Err(CoreError::InsufficientStock {
            item_id: item_id.to_string(),
            available,
            requested: qty,
        });
    }

    let mut outstanding = qty;
    let mut consumptions = Vec::new();

    for layer in open {
        if outstanding.is_zero() {
            break;
        }

        let take = layer.remaining_qty.min(outstanding);
        outstanding -= take;

        consumptions.push(LayerConsumption {
            layer_id: layer.id,
            batch_number: layer.batch_number.clone(),
            quantity: take,
            unit_cost: layer.unit_cost,
            cost: layer.unit_cost.times_quantity(take),
            remaining_after: layer.remaining_qty - take,
        });
    }

    let total_cost: Money = consumptions.iter().map(|c| c.cost).sum();

    Ok(DepletionPlan {
        item_id: item_id.to_string(),
        requested: qty,
        consumptions,
        total_cost,
        weighted_unit_cost: total_cost.per_unit(qty),
    })
}

// =============================================================================
// Valuation
// =============================================================================

/// Layer-derived position of one item. This is the authoritative valuation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemValuation {
    pub item_id: String,
    pub qty_on_hand: Quantity,
    pub value_on_hand: Money,
    /// Value-weighted average of the remaining layers.
    pub avg_cost: Money,
    pub open_layers: usize,
}

impl ItemValuation {
    /// Derives the position of `item_id` from its layers.
    pub fn from_layers(item_id: &str, layers: &[InventoryLayer]) -> Self {
        let open: Vec<&InventoryLayer> = layers
            .iter()
            .filter(|l| l.item_id == item_id && !l.is_depleted())
            .collect();

        let qty_on_hand: Quantity = open.iter().map(|l| l.remaining_qty).sum();
        let value_on_hand: Money = open.iter().map(|l| l.remaining_value()).sum();

        ItemValuation {
            item_id: item_id.to_string(),
            qty_on_hand,
            value_on_hand,
            avg_cost: value_on_hand.per_unit(qty_on_hand),
            open_layers: open.len(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
