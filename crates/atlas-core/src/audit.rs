//! # Cache Drift Detection
//!
//! Items cache `qty_on_hand` and `avg_cost` for fast reads. The layers are
//! the truth. This module compares the two and describes any disagreement.
//!
//! Drift is not an error. It is reported, and corrected only when a resync
//! is explicitly requested.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::inventory::ItemValuation;
use crate::money::Money;
use crate::quantity::Quantity;

/// The cached figures stored on an item row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedItemState {
    pub item_id: String,
    pub sku: String,
    pub cached_qty: Quantity,
    pub cached_avg_cost: Money,
}

/// One item whose cache disagrees with its layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncDrift {
    pub item_id: String,
    pub sku: String,
    pub cached_qty: Quantity,
    pub layer_qty: Quantity,
    /// `cached - layer`.
    pub qty_discrepancy: Quantity,
    pub cached_avg_cost: Money,
    pub layer_avg_cost: Money,
    /// `cached - layer`.
    pub avg_cost_discrepancy: Money,
}

/// Result of auditing every item.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuditReport {
    pub checked: usize,
    pub drifts: Vec<SyncDrift>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty()
    }
}

/// Compares a cache against layer truth. `None` when they agree.
///
/// ## Example
/// ```rust
/// use atlas_core::audit::{detect_drift, CachedItemState};
/// use atlas_core::inventory::ItemValuation;
/// use atlas_core::money::Money;
/// use atlas_core::quantity::Quantity;
///
/// let cached = CachedItemState {
///     item_id: "i-1".into(),
///     sku: "RESIN-01".into(),
///     cached_qty: Quantity::from_units(150),
///     cached_avg_cost: Money::from_minor(1200),
/// };
/// let truth = ItemValuation {
///     item_id: "i-1".into(),
///     qty_on_hand: Quantity::from_units(140),
///     value_on_hand: Money::from_minor(168_000),
///     avg_cost: Money::from_minor(1200),
///     open_layers: 2,
/// };
///
/// let drift = detect_drift(&cached, &truth).unwrap();
/// assert_eq!(drift.qty_discrepancy, Quantity::from_units(10));
/// assert!(drift.avg_cost_discrepancy.is_zero());
/// ```
pub fn detect_drift(cached: &CachedItemState, truth: &ItemValuation) -> Option<SyncDrift> {
    if cached.cached_qty == truth.qty_on_hand && cached.cached_avg_cost == truth.avg_cost {
        return None;
    }

    Some(SyncDrift {
        item_id: cached.item_id.clone(),
        sku: cached.sku.clone(),
        cached_qty: cached.cached_qty,
        layer_qty: truth.qty_on_hand,
        qty_discrepancy: cached.cached_qty - truth.qty_on_hand,
        cached_avg_cost: cached.cached_avg_cost,
        layer_avg_cost: truth.avg_cost,
        avg_cost_discrepancy: cached.cached_avg_cost - truth.avg_cost,
    })
}
