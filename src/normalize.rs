//! Unit cost normalization
//!
//! Turns an ingredient's raw purchase record into a real cost per base unit,
//! in both the large (kg, l) and small (g, ml) scales.

use serde::Serialize;

use crate::models::{DeclaredUnit, Ingredient, UnitScale};

/// Division that yields zero whenever the denominator is not positive
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Derived per-unit costs of one ingredient
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedCost {
    pub cost_per_purchase_unit: f64,
    pub cost_per_declared_unit: f64,
    pub real_cost_large: f64,
    pub real_cost_small: f64,
}

impl NormalizedCost {
    /// Real cost of one unit of the given declared unit
    pub fn for_unit(&self, unit: DeclaredUnit) -> f64 {
        if unit.is_small() {
            self.real_cost_small
        } else {
            self.real_cost_large
        }
    }
}

/// Normalize an ingredient's purchase data into real unit costs
///
/// Always computed from the ingredient as given; never cache the result
/// against an ingredient that may since have changed.
pub fn normalize(ingredient: &Ingredient) -> NormalizedCost {
    let cost_per_purchase_unit = safe_div(
        ingredient.purchase_cost,
        ingredient.effective_purchase_quantity(),
    );
    let cost_per_declared_unit = safe_div(cost_per_purchase_unit, ingredient.package_weight);
    let real_cost = cost_per_declared_unit * ingredient.effective_correction_factor();

    let (real_cost_large, real_cost_small) = match ingredient.unit_scale() {
        UnitScale::Large => (real_cost, real_cost / 1000.0),
        UnitScale::Small => (real_cost * 1000.0, real_cost),
        UnitScale::Count => (real_cost, real_cost),
    };

    NormalizedCost {
        cost_per_purchase_unit,
        cost_per_declared_unit,
        real_cost_large,
        real_cost_small,
    }
}

/// Real cost of one declared unit of an ingredient
pub fn real_unit_cost(ingredient: &Ingredient, unit: DeclaredUnit) -> f64 {
    normalize(ingredient).for_unit(unit)
}

impl std::fmt::Display for NormalizedCost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  Cost per purchase unit: {:.4}", self.cost_per_purchase_unit)?;
        writeln!(f, "  Cost per declared unit: {:.4}", self.cost_per_declared_unit)?;
        writeln!(f, "  Real cost (kg/l/un):    {:.4}", self.real_cost_large)?;
        write!(f, "  Real cost (g/ml):       {:.6}", self.real_cost_small)
    }
}
