//! # Cost Propagation Engine
//!
//! Rolls a work-in-process (WIP) cost forward across production stages.
//!
//! ## Roll-Forward
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  opening WIP                                                            │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  ┌───────────────┐  waste = (input - output) / input                   │
//! │  │   stage 1     │  WIP = round(WIP × (1 - waste) + stage_cost)        │
//! │  └──────┬────────┘                                                      │
//! │         ▼                                                               │
//! │  ┌───────────────┐  inherited cost shrinks with the material lost,     │
//! │  │   stage 2     │  the stage's own labour/energy is always added      │
//! │  └──────┬────────┘                                                      │
//! │         ▼                                                               │
//! │        ...                                                              │
//! │         ▼                                                               │
//! │  unit cost = final WIP / final output qty                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stage formulas are data, not code: [`CostFormula`] is a closed set of
//! tagged variants that round-trips through serde, so stage configuration can
//! live in a database row or a TOML file.
//!
//! A stage whose yield falls outside its [`YieldBand`] produces a
//! [`YieldWarning`]. Warnings never stop the roll-forward.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{div_round_half_up, Money};
use crate::quantity::Quantity;
use crate::rate::Rate;
use crate::BASIS_POINTS_SCALE;

/// Minutes per hour, for time-driven stage costs.
const MINUTES_PER_HOUR: i128 = 60;

// =============================================================================
// Stage Configuration
// =============================================================================

/// One material consumed by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MaterialUsage {
    /// Inventory item drawn from the layer store. `None` for materials
    /// costed directly (consumables not tracked in stock).
    #[serde(default)]
    pub item_id: Option<String>,
    pub quantity: Quantity,
    /// Per-unit cost. For stocked materials this is overwritten with the
    /// FIFO weighted cost at consumption time, for display only.
    #[serde(default)]
    pub unit_cost: Money,
    /// Exact cost of the layers drawn, set once the material is consumed.
    #[serde(default)]
    pub consumed_cost: Option<Money>,
}

impl MaterialUsage {
    /// The consumed layer cost when known, else `quantity × unit_cost`
    /// rounded once.
    ///
    /// A rounded weighted unit cost times the quantity can miss the layer
    /// total by up to half a minor unit per unit consumed.
    pub fn cost(&self) -> Money {
        self.consumed_cost
            .unwrap_or_else(|| self.unit_cost.times_quantity(self.quantity))
    }
}

/// How a stage's own cost is computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export)]
pub enum CostFormula {
    /// Labour or electricity: `round(hourly_rate / 60 × minutes)`.
    TimeDriven {
        hourly_rate: Money,
        duration_minutes: u32,
    },
    /// Sum of `quantity × unit_cost` over the materials.
    MaterialDriven { materials: Vec<MaterialUsage> },
    /// Flat overhead charge per run.
    Fixed { amount: Money },
}

impl CostFormula {
    /// Computes the stage cost.
    ///
    /// ## Example
    /// ```rust
    /// use atlas_core::costing::CostFormula;
    /// use atlas_core::money::Money;
    ///
    /// // 15.00/h for 50 minutes = 12.50
    /// let labour = CostFormula::TimeDriven {
    ///     hourly_rate: Money::from_minor(1500),
    ///     duration_minutes: 50,
    /// };
    /// assert_eq!(labour.stage_cost().minor(), 1250);
    /// ```
    pub fn stage_cost(&self) -> Money {
        match self {
            CostFormula::TimeDriven {
                hourly_rate,
                duration_minutes,
            } => {
                // One rounding over the exact product, not rate/60 rounded first
                let cost = div_round_half_up(
                    hourly_rate.minor() as i128 * *duration_minutes as i128,
                    MINUTES_PER_HOUR,
                );
                Money::from_minor(cost as i64)
            }
            CostFormula::MaterialDriven { materials } => {
                materials.iter().map(MaterialUsage::cost).sum()
            }
            CostFormula::Fixed { amount } => *amount,
        }
    }

    /// True for formulas whose cost is drawn from material stock.
    pub fn is_material(&self) -> bool {
        matches!(self, CostFormula::MaterialDriven { .. })
    }
}

/// Expected yield and the tolerance around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct YieldBand {
    pub expected: Rate,
    pub tolerance: Rate,
}

impl YieldBand {
    /// True when `actual` is within `expected ± tolerance` (inclusive).
    pub fn contains(&self, actual: Rate) -> bool {
        actual.distance(self.expected) <= self.tolerance.bps()
    }
}

/// One configured stage of a production run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StageSpec {
    /// Free label: "mixing", "molding", "filling", ...
    pub stage_type: String,
    pub input_qty: Quantity,
    pub output_qty: Quantity,
    pub formula: CostFormula,
    #[serde(default)]
    pub yield_band: Option<YieldBand>,
}

// =============================================================================
// Results
// =============================================================================

/// The costed outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductionStageResult {
    pub index: usize,
    pub stage_type: String,
    pub input_qty: Quantity,
    pub output_qty: Quantity,
    /// `(input - output) / input`, floored at zero.
    pub waste: Rate,
    /// `output / input`.
    pub yield_rate: Rate,
    pub stage_cost: Money,
    pub wip_before: Money,
    pub wip_after: Money,
    /// Inherited WIP written off because of waste.
    pub waste_loss: Money,
}

/// Non-fatal: a stage yielded outside its band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct YieldWarning {
    pub stage_index: usize,
    pub stage_type: String,
    pub expected: Rate,
    pub tolerance: Rate,
    pub actual: Rate,
}

/// A full production cost rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostRollup {
    pub opening_wip: Money,
    pub stages: Vec<ProductionStageResult>,
    pub final_wip: Money,
    pub output_qty: Quantity,
    /// `final_wip / output_qty`, rounded half-up.
    pub unit_cost: Money,
    /// Sum of material-driven stage costs.
    pub material_cost: Money,
    /// Sum of time-driven and fixed stage costs.
    pub conversion_cost: Money,
    /// Sum of per-stage waste losses.
    pub waste_loss: Money,
    pub warnings: Vec<YieldWarning>,
}

impl CostRollup {
    /// Everything that went into the run: opening WIP plus every stage cost.
    pub fn total_incurred(&self) -> Money {
        self.opening_wip + self.material_cost + self.conversion_cost
    }
}

// =============================================================================
// Roll-Forward
// =============================================================================

/// Computes the waste share of a stage in basis points.
///
/// ## Example
/// ```rust
/// use atlas_core::costing::waste_rate;
/// use atlas_core::quantity::Quantity;
///
/// let w = waste_rate(Quantity::from_units(200), Quantity::from_units(190));
/// assert_eq!(w.bps(), 500); // 5%
/// ```
pub fn waste_rate(input: Quantity, output: Quantity) -> Rate {
    if !input.is_positive() || output >= input {
        return Rate::zero();
    }
    let bps = div_round_half_up(
        (input - output).milli() as i128 * BASIS_POINTS_SCALE as i128,
        input.milli() as i128,
    );
    Rate::from_bps(bps as u32)
}

/// Applies one stage to a WIP figure.
///
/// `round(wip × (1 - waste) + stage_cost)`. Adding a whole number of minor
/// units does not change where the rounding lands, so the inherited share is
/// rounded and the stage cost added afterwards.
///
/// `waste` is already rounded to whole basis points by [`waste_rate`], so a
/// yield that is not a whole number of bps is rounded twice: 3 in, 2 out
/// keeps 66.67% and carries 1,000,000 forward as 666,700, not 666,667. The
/// stage result records the exact `waste` applied.
pub fn carry_forward(wip_before: Money, waste: Rate, stage_cost: Money) -> Money {
    wip_before.apply_rate(waste.complement()) + stage_cost
}

/// Rolls `opening_wip` through `stages`.
///
/// ## Errors
/// `InvalidStage` for an empty run, a non-positive input quantity, a
/// negative output or material figure, or a final stage with no output.
///
/// ## Example
/// ```rust
/// use atlas_core::costing::{roll_forward, CostFormula, StageSpec};
/// use atlas_core::money::Money;
/// use atlas_core::quantity::Quantity;
///
/// let stages = vec![StageSpec {
///     stage_type: "filling".into(),
///     input_qty: Quantity::from_units(100),
///     output_qty: Quantity::from_units(95),
///     formula: CostFormula::Fixed { amount: Money::from_minor(500) },
///     yield_band: None,
/// }];
///
/// let rollup = roll_forward(Money::from_minor(10_000), &stages).unwrap();
/// // 10000 × 95% + 500
/// assert_eq!(rollup.final_wip.minor(), 10_000);
/// assert_eq!(rollup.unit_cost.minor(), 105);
/// ```
pub fn roll_forward(opening_wip: Money, stages: &[StageSpec]) -> CoreResult<CostRollup> {
    if stages.is_empty() {
        return Err(CoreError::invalid_stage(0, "a production run needs at least one stage"));
    }

    let mut wip = opening_wip;
    let mut results = Vec::with_capacity(stages.len());
    let mut warnings = Vec::new();
    let mut material_cost = Money::zero();
    let mut conversion_cost = Money::zero();
    let mut waste_loss = Money::zero();

    for (index, stage) in stages.iter().enumerate() {
        validate_stage(index, stage)?;

        let waste = waste_rate(stage.input_qty, stage.output_qty);
        let yield_rate = Rate::ratio(stage.output_qty, stage.input_qty);
        let stage_cost = stage.formula.stage_cost();

        if stage.formula.is_material() {
            material_cost += stage_cost;
        } else {
            conversion_cost += stage_cost;
        }

        let wip_before = wip;
        let inherited = wip_before.apply_rate(waste.complement());
        let wip_after = carry_forward(wip_before, waste, stage_cost);
        let loss = wip_before - inherited;
        waste_loss += loss;

        if let Some(band) = stage.yield_band {
            if !band.contains(yield_rate) {
                warnings.push(YieldWarning {
                    stage_index: index,
                    stage_type: stage.stage_type.clone(),
                    expected: band.expected,
                    tolerance: band.tolerance,
                    actual: yield_rate,
                });
            }
        }

        results.push(ProductionStageResult {
            index,
            stage_type: stage.stage_type.clone(),
            input_qty: stage.input_qty,
            output_qty: stage.output_qty,
            waste,
            yield_rate,
            stage_cost,
            wip_before,
            wip_after,
            waste_loss: loss,
        });

        wip = wip_after;
    }

    let output_qty = stages
        .last()
        .map(|s| s.output_qty)
        .unwrap_or_else(Quantity::zero);
    if !output_qty.is_positive() {
        return Err(CoreError::invalid_stage(
            stages.len() - 1,
            "final stage must produce output",
        ));
    }

    Ok(CostRollup {
        opening_wip,
        stages: results,
        final_wip: wip,
        output_qty,
        unit_cost: wip.per_unit(output_qty),
        material_cost,
        conversion_cost,
        waste_loss,
        warnings,
    })
}

fn validate_stage(index: usize, stage: &StageSpec) -> CoreResult<()> {
    if !stage.input_qty.is_positive() {
        return Err(CoreError::invalid_stage(index, "input quantity must be positive"));
    }
    if stage.output_qty.is_negative() {
        return Err(CoreError::invalid_stage(index, "output quantity must not be negative"));
    }

    match &stage.formula {
        CostFormula::TimeDriven { hourly_rate, .. } if hourly_rate.is_negative() => {
            Err(CoreError::invalid_stage(index, "hourly rate must not be negative"))
        }
        CostFormula::Fixed { amount } if amount.is_negative() => {
            Err(CoreError::invalid_stage(index, "fixed cost must not be negative"))
        }
        CostFormula::MaterialDriven { materials } => {
            for m in materials {
                if m.quantity.is_negative()
                    || m.unit_cost.is_negative()
                    || m.consumed_cost.is_some_and(|c| c.is_negative())
                {
                    return Err(CoreError::invalid_stage(
                        index,
                        "material quantity and cost must not be negative",
                    ));
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
