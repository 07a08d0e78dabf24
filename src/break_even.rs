//! Break-even revenue and its reconciliation table

use serde::Serialize;

use crate::models::{PricingConfig, Specialty};
use crate::normalize::safe_div;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BreakEven {
    pub fixed_expenses: f64,
    pub variable_expense_rate: f64,
    pub representative_margin: f64,
    pub required_revenue: f64,
    pub variable_expense_value: f64,
    /// Back-calculated so the table reconciles to zero
    pub cmv_value: f64,
    pub contribution_margin_value: f64,
    /// Self-check; zero up to floating-point error
    pub reconciliation_residual: f64,
}

/// Revenue needed to cover fixed expenses at a representative margin
pub fn compute_break_even(
    fixed_expenses: f64,
    variable_expense_rate: f64,
    representative_margin: f64,
) -> BreakEven {
    let required_revenue = safe_div(fixed_expenses, representative_margin / 100.0);
    let variable_expense_value = required_revenue * (variable_expense_rate / 100.0);
    let cmv_value = required_revenue - variable_expense_value - fixed_expenses;
    let contribution_margin_value = required_revenue - variable_expense_value - cmv_value;
    let reconciliation_residual =
        required_revenue - variable_expense_value - cmv_value - fixed_expenses;

    BreakEven {
        fixed_expenses,
        variable_expense_rate,
        representative_margin,
        required_revenue,
        variable_expense_value,
        cmv_value,
        contribution_margin_value,
        reconciliation_residual,
    }
}

/// Margin used to stand in for the whole product range
///
/// In per-specialty mode this is the mean over every specialty on the roster,
/// counting specialties without an override as 0, so uncovered specialties
/// pull the figure down.
pub fn representative_margin(config: &PricingConfig, roster: &[Specialty]) -> f64 {
    if !config.use_specialty_margins {
        return config.default_margin;
    }
    let sum: f64 = roster
        .iter()
        .map(|s| config.specialty_margin(s.id).unwrap_or(0.0))
        .sum();
    safe_div(sum, roster.len() as f64)
}

/// Break-even for the configured fixed and variable expenses
pub fn break_even_for(config: &PricingConfig, roster: &[Specialty]) -> BreakEven {
    compute_break_even(
        config.fixed_expenses,
        config.variable_expense_rate(),
        representative_margin(config, roster),
    )
}

impl std::fmt::Display for BreakEven {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pct = |value: f64| safe_div(value, self.required_revenue) * 100.0;

        writeln!(f, "=== Break-even ===")?;
        writeln!(f, "Representative margin: {:.1}%", self.representative_margin)?;
        writeln!(f)?;
        writeln!(f, "{:<24} {:>14} {:>8}", "", "Value", "%")?;
        writeln!(f, "{}", "-".repeat(48))?;
        let rows = [
            ("Revenue", self.required_revenue),
            ("(-) Variable expenses", self.variable_expense_value),
            ("(-) CMV", self.cmv_value),
            ("(=) Contribution margin", self.contribution_margin_value),
            ("(-) Fixed expenses", self.fixed_expenses),
        ];
        for (label, value) in rows {
            writeln!(f, "{:<24} {:>14.2} {:>7.1}%", label, value, pct(value))?;
        }
        writeln!(f, "{}", "-".repeat(48))?;
        write!(f, "{:<24} {:>14.2}", "(=) Result", self.reconciliation_residual)
    }
}
