//! Recipe costing and price recommendation

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::{Catalog, standardize_name};
use crate::models::{
    DeclaredUnit, Ingredient, IngredientId, PricingConfig, ProductKind, Recipe, RecipeId,
    RecipeLineItem,
};
use crate::normalize::{real_unit_cost, safe_div};

/// Rounding slack when comparing the current price with the suggested one
pub const PRICE_EPSILON: f64 = 0.01;

/// Smallest price divisor for which a suggested price is still computed
pub const MIN_PRICE_DIVISOR: f64 = 0.01;

/// Source of ingredient records for costing
pub trait IngredientLookup {
    fn ingredient(&self, id: IngredientId) -> Option<&Ingredient>;
}

impl IngredientLookup for Catalog {
    fn ingredient(&self, id: IngredientId) -> Option<&Ingredient> {
        Catalog::ingredient(self, id)
    }
}

impl IngredientLookup for HashMap<IngredientId, Ingredient> {
    fn ingredient(&self, id: IngredientId) -> Option<&Ingredient> {
        self.get(&id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarginSource {
    Global,
    Specialty,
}

impl MarginSource {
    pub fn label(&self) -> &'static str {
        match self {
            MarginSource::Global => "global margin",
            MarginSource::Specialty => "specialty margin",
        }
    }
}

/// Margin a recipe should reach, and where it came from
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetMargin {
    pub percent: f64,
    pub source: MarginSource,
}

/// Resolve the target margin for a recipe
pub fn target_margin(recipe: &Recipe, config: &PricingConfig) -> TargetMargin {
    if config.use_specialty_margins {
        if let Some(percent) = recipe.specialty_id.and_then(|id| config.specialty_margin(id)) {
            return TargetMargin {
                percent,
                source: MarginSource::Specialty,
            };
        }
    }
    TargetMargin {
        percent: config.default_margin,
        source: MarginSource::Global,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineCost {
    pub ingredient_id: IngredientId,
    pub ingredient_name: String,
    pub quantity: f64,
    pub unit: DeclaredUnit,
    pub real_unit_cost: f64,
    pub cost: f64,
    pub note: Option<String>,
}

/// Cost of a recipe batch, line by line
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecipeCost {
    pub total_cost: f64,
    pub lines: Vec<LineCost>,
    /// Lines whose ingredient could not be found
    pub skipped: Vec<IngredientId>,
}

/// Sum the real cost of every line of a recipe batch
pub fn recipe_cost<L: IngredientLookup + ?Sized>(
    lines: &[RecipeLineItem],
    ingredients: &L,
) -> RecipeCost {
    let mut cost = RecipeCost::default();
    for line in lines {
        let Some(ingredient) = ingredients.ingredient(line.ingredient_id) else {
            warn!(ingredient_id = line.ingredient_id, "ingredient not found, line not costed");
            cost.skipped.push(line.ingredient_id);
            continue;
        };
        let unit_cost = real_unit_cost(ingredient, line.unit);
        let line_cost = unit_cost * line.quantity;
        cost.total_cost += line_cost;
        cost.lines.push(LineCost {
            ingredient_id: ingredient.id,
            ingredient_name: ingredient.name.clone(),
            quantity: line.quantity,
            unit: line.unit,
            real_unit_cost: unit_cost,
            cost: line_cost,
            note: line.note.clone(),
        });
    }
    cost
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Verdict {
    Adequate,
    BelowTarget { suggested_price: f64 },
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Adequate => write!(f, "price adequate"),
            Verdict::BelowTarget { suggested_price } => {
                write!(f, "price below target, suggested {:.2}", suggested_price)
            }
        }
    }
}

/// Full pricing breakdown of one recipe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingResult {
    pub recipe_id: RecipeId,
    pub recipe_name: String,
    pub cost: RecipeCost,
    pub yield_kg: f64,
    pub cmv_per_kg: f64,
    pub cmv_per_gram: f64,
    pub sale_price: f64,
    /// Ingredient cost as a percent of the sale price
    pub cmv_percent: f64,
    pub target_margin: TargetMargin,
    pub variable_expense_rate: f64,
    pub variable_expense_value: f64,
    pub current_margin_value: f64,
    pub current_margin_percent: f64,
    pub suggested_price: f64,
    /// False when expenses plus target margin leave no room for a price
    pub price_viable: bool,
    /// Suggested price minus the current price
    pub price_gap: f64,
    pub verdict: Verdict,
}

/// Evaluate a recipe's cost and price against the business configuration
pub fn evaluate<L: IngredientLookup + ?Sized>(
    recipe: &Recipe,
    lines: &[RecipeLineItem],
    ingredients: &L,
    config: &PricingConfig,
) -> PricingResult {
    let cost = recipe_cost(lines, ingredients);
    let total_cost = cost.total_cost;

    let cmv_per_kg = safe_div(total_cost, recipe.yield_kg);
    let sale_price = recipe.sale_price.unwrap_or(0.0);

    let target_margin = target_margin(recipe, config);
    debug!(
        recipe = %recipe.name,
        margin = target_margin.percent,
        source = target_margin.source.label(),
        "target margin"
    );

    let variable_expense_rate = config.variable_expense_rate();
    let variable_expense_value = sale_price * (variable_expense_rate / 100.0);
    let current_margin_value = sale_price - total_cost - variable_expense_value;
    let current_margin_percent = safe_div(current_margin_value, sale_price) * 100.0;

    let divisor = 1.0 - (variable_expense_rate + target_margin.percent) / 100.0;
    let price_viable = divisor > MIN_PRICE_DIVISOR;
    let suggested_price = if price_viable { total_cost / divisor } else { 0.0 };

    let verdict = if sale_price >= suggested_price - PRICE_EPSILON {
        Verdict::Adequate
    } else {
        Verdict::BelowTarget { suggested_price }
    };

    PricingResult {
        recipe_id: recipe.id,
        recipe_name: recipe.name.clone(),
        cost,
        yield_kg: recipe.yield_kg,
        cmv_per_kg,
        cmv_per_gram: cmv_per_kg / 1000.0,
        sale_price,
        cmv_percent: safe_div(total_cost, sale_price) * 100.0,
        target_margin,
        variable_expense_rate,
        variable_expense_value,
        current_margin_value,
        current_margin_percent,
        suggested_price,
        price_viable,
        price_gap: suggested_price - sale_price,
        verdict,
    }
}

/// Price every Final recipe in the catalog
pub fn evaluate_all(catalog: &Catalog, config: &PricingConfig) -> Vec<PricingResult> {
    catalog
        .recipes()
        .into_iter()
        .filter(|r| r.kind == ProductKind::Final)
        .map(|r| evaluate(r, &r.items, catalog, config))
        .collect()
}

/// The ingredient record that represents a Base recipe's output
///
/// One purchase unit is one batch: the batch cost spread over the yield in
/// kilograms. `id` is the record to refresh, or the id storage assigned.
pub fn materialize_base_ingredient(
    id: IngredientId,
    recipe: &Recipe,
    total_cost: f64,
) -> Ingredient {
    Ingredient {
        id,
        name: recipe.name.clone(),
        standardized_name: standardize_name(&recipe.name),
        purchase_cost: total_cost,
        purchase_quantity: Some(1.0),
        package_weight: recipe.yield_kg,
        weight_unit: "kg".to_string(),
        correction_factor: Some(1.0),
        supplier: None,
        is_base_product: true,
        source_recipe: Some(recipe.id),
    }
}

impl std::fmt::Display for PricingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Pricing: {} ===", self.recipe_name)?;
        for line in &self.cost.lines {
            writeln!(
                f,
                "  {:<28} {:>10.2} {:<3} x {:>10.6} = {:>9.2}",
                line.ingredient_name, line.quantity, line.unit, line.real_unit_cost, line.cost
            )?;
        }
        for id in &self.cost.skipped {
            writeln!(f, "  warning: ingredient {} not found", id)?;
        }
        writeln!(f)?;
        writeln!(f, "Total cost:        {:>10.2}", self.cost.total_cost)?;
        writeln!(f, "Yield:             {:>10.3} kg", self.yield_kg)?;
        writeln!(f, "CMV per kg:        {:>10.2}", self.cmv_per_kg)?;
        writeln!(f, "CMV per g:         {:>10.4}", self.cmv_per_gram)?;
        writeln!(f)?;
        writeln!(f, "Sale price:        {:>10.2}", self.sale_price)?;
        writeln!(f, "CMV:               {:>9.1}%", self.cmv_percent)?;
        writeln!(
            f,
            "Variable expenses: {:>10.2} ({:.1}%)",
            self.variable_expense_value, self.variable_expense_rate
        )?;
        writeln!(
            f,
            "Current margin:    {:>10.2} ({:.1}%)",
            self.current_margin_value, self.current_margin_percent
        )?;
        writeln!(
            f,
            "Target margin:     {:>9.1}% ({})",
            self.target_margin.percent,
            self.target_margin.source.label()
        )?;
        if self.price_viable {
            writeln!(f, "Suggested price:   {:>10.2}", self.suggested_price)?;
        } else {
            writeln!(f, "Suggested price:          - (expenses and margin reach 100%)")?;
        }
        write!(f, "Verdict:           {}", self.verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SpecialtyMargin, VariableExpense};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn kilo(id: IngredientId, name: &str, price_per_kg: f64) -> Ingredient {
        Ingredient {
            id,
            name: name.to_string(),
            standardized_name: standardize_name(name),
            purchase_cost: price_per_kg,
            purchase_quantity: None,
            package_weight: 1.0,
            weight_unit: "kg".to_string(),
            correction_factor: None,
            supplier: None,
            is_base_product: false,
            source_recipe: None,
        }
    }

    fn line(ingredient_id: IngredientId, quantity: f64) -> RecipeLineItem {
        RecipeLineItem {
            ingredient_id,
            quantity,
            unit: DeclaredUnit::Gram,
            note: None,
        }
    }

    fn brownie(yield_kg: f64, sale_price: Option<f64>) -> Recipe {
        Recipe {
            id: 1,
            name: "Brownie".to_string(),
            kind: ProductKind::Final,
            yield_kg,
            sale_price,
            specialty_id: Some(3),
            // 10.0 in total
            items: vec![line(1, 250.0), line(2, 300.0)],
        }
    }

    fn pantry() -> HashMap<IngredientId, Ingredient> {
        [kilo(1, "Chocolate", 28.0), kilo(2, "Butter", 10.0)]
            .into_iter()
            .map(|i| (i.id, i))
            .collect()
    }

    fn config(default_margin: f64, expense_rate: f64) -> PricingConfig {
        PricingConfig {
            default_margin,
            use_specialty_margins: false,
            specialty_margins: vec![SpecialtyMargin {
                specialty_id: 3,
                margin_percent: 35.0,
            }],
            variable_expenses: vec![VariableExpense {
                name: "Card fees".to_string(),
                rate_percent: expense_rate,
            }],
            fixed_expenses: 0.0,
        }
    }

    #[test]
    fn cmv_per_kg_and_gram() {
        let recipe = brownie(0.5, Some(40.0));
        let result = evaluate(&recipe, &recipe.items, &pantry(), &config(30.0, 10.0));

        assert!(close(result.cost.total_cost, 10.0));
        assert!(close(result.cmv_per_kg, 20.0));
        assert!(close(result.cmv_per_gram, 0.02));
        assert!(close(result.cmv_percent, 25.0));
        assert_eq!(result.cost.lines.len(), 2);
    }

    #[test]
    fn current_margin_and_suggested_price() {
        let recipe = brownie(0.5, Some(40.0));
        let result = evaluate(&recipe, &recipe.items, &pantry(), &config(30.0, 10.0));

        assert!(close(result.variable_expense_value, 4.0));
        assert!(close(result.current_margin_value, 26.0));
        assert!(close(result.current_margin_percent, 65.0));
        // 10 / (1 - 0.4)
        assert!(close(result.suggested_price, 10.0 / 0.6));
        assert!(result.price_viable);
        assert_eq!(result.verdict, Verdict::Adequate);
        assert!(result.price_gap < 0.0);
    }

    #[test]
    fn specialty_margin_applies_only_in_specialty_mode() {
        let recipe = brownie(0.5, Some(40.0));
        let mut cfg = config(30.0, 10.0);

        let global = target_margin(&recipe, &cfg);
        assert_eq!(global.source, MarginSource::Global);
        assert_eq!(global.percent, 30.0);

        cfg.use_specialty_margins = true;
        let specialty = target_margin(&recipe, &cfg);
        assert_eq!(specialty.source, MarginSource::Specialty);
        assert_eq!(specialty.percent, 35.0);

        let plain = Recipe {
            specialty_id: Some(9),
            ..recipe.clone()
        };
        assert_eq!(target_margin(&plain, &cfg).source, MarginSource::Global);
    }

    #[test]
    fn zero_sale_price_is_below_target() {
        let recipe = brownie(0.5, None);
        let result = evaluate(&recipe, &recipe.items, &pantry(), &config(30.0, 10.0));

        assert_eq!(result.current_margin_percent, 0.0);
        assert_eq!(result.cmv_percent, 0.0);
        assert!(close(result.suggested_price, 10.0 / 0.6));
        assert_eq!(
            result.verdict,
            Verdict::BelowTarget {
                suggested_price: result.suggested_price
            }
        );
    }

    #[test]
    fn price_within_epsilon_is_adequate() {
        let suggested = 10.0 / 0.6;
        let recipe = brownie(0.5, Some(suggested - 0.005));
        let result = evaluate(&recipe, &recipe.items, &pantry(), &config(30.0, 10.0));
        assert_eq!(result.verdict, Verdict::Adequate);
    }

    #[test]
    fn expenses_at_hundred_percent_give_no_price() {
        let recipe = brownie(0.5, Some(40.0));
        let result = evaluate(&recipe, &recipe.items, &pantry(), &config(60.0, 40.0));

        assert!(!result.price_viable);
        assert_eq!(result.suggested_price, 0.0);
        assert!(result.suggested_price.is_finite());
    }

    #[test]
    fn zero_yield_costs_per_kg_as_zero() {
        let recipe = brownie(0.0, Some(40.0));
        let result = evaluate(&recipe, &recipe.items, &pantry(), &config(30.0, 10.0));

        assert_eq!(result.cmv_per_kg, 0.0);
        assert_eq!(result.cmv_per_gram, 0.0);
        assert!(close(result.cost.total_cost, 10.0));
    }

    #[test]
    fn missing_ingredient_is_skipped() {
        let recipe = Recipe {
            items: vec![line(1, 250.0), line(77, 100.0)],
            ..brownie(0.5, Some(40.0))
        };
        let result = evaluate(&recipe, &recipe.items, &pantry(), &config(30.0, 10.0));

        assert!(close(result.cost.total_cost, 7.0));
        assert_eq!(result.cost.skipped, vec![77]);
    }

    #[test]
    fn evaluates_only_final_recipes() {
        let base = Recipe {
            id: 2,
            name: "Ganache".to_string(),
            kind: ProductKind::Base,
            ..brownie(1.0, None)
        };
        let catalog = Catalog::new(
            pantry().into_values().collect(),
            vec![brownie(0.5, Some(40.0)), base],
            Vec::new(),
        );

        let results = evaluate_all(&catalog, &config(30.0, 10.0));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].recipe_name, "Brownie");
    }

    #[test]
    fn materialized_ingredient_costs_a_batch_per_yield() {
        let base = Recipe {
            id: 5,
            name: "Dark ganache".to_string(),
            kind: ProductKind::Base,
            ..brownie(0.5, None)
        };
        let ingredient = materialize_base_ingredient(40, &base, 10.0);

        assert_eq!(ingredient.standardized_name, "DARK GANACHE");
        assert_eq!(ingredient.source_recipe, Some(5));
        assert!(ingredient.is_base_product);
        // 10.0 per 0.5 kg
        assert!(close(real_unit_cost(&ingredient, DeclaredUnit::Gram), 0.02));
        assert!(close(real_unit_cost(&ingredient, DeclaredUnit::Unit), 20.0));
    }
}
