//! Bill-of-materials explosion
//!
//! Expands a selection of recipes into a flat shopping list of terminal
//! ingredients. Lines that use a Base recipe's ingredient can be exploded
//! into that recipe's own lines, scaled to the amount required.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::error::EngineError;
use crate::models::{
    Ingredient, IngredientId, Recipe, RecipeId, RecipeLineItem, ShoppingListItem,
};
use crate::normalize::{real_unit_cost, safe_div};

/// Deepest Base recipe nesting that is still expanded
pub const MAX_DEPTH: usize = 10;

/// A recipe and the output wanted from it (kg, or units for count yields)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Selection {
    pub recipe_id: RecipeId,
    pub quantity: f64,
}

impl FromStr for Selection {
    type Err = EngineError;

    /// Parses `<recipe-id>:<quantity>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidSelection(s.to_string());
        let (id, quantity) = s.split_once(':').ok_or_else(invalid)?;
        let recipe_id = id.trim().parse().map_err(|_| invalid())?;
        let quantity: f64 = quantity.trim().parse().map_err(|_| invalid())?;
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(invalid());
        }
        Ok(Selection { recipe_id, quantity })
    }
}

/// A reference that could not be resolved and was left out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkippedReference {
    Recipe(RecipeId),
    Ingredient {
        recipe_id: RecipeId,
        ingredient_id: IngredientId,
    },
}

/// Result of exploding a selection
#[derive(Debug, Clone, Default, Serialize)]
pub struct Explosion {
    /// Terminal ingredients in first-seen order
    pub items: Vec<ShoppingListItem>,
    pub total_cost: f64,
    /// Recipe paths that closed a loop; the looping line was left out
    pub cycles: Vec<Vec<RecipeId>>,
    /// Base recipes not expanded because of the depth cap
    pub truncated: Vec<RecipeId>,
    pub skipped: Vec<SkippedReference>,
}

/// Number of recipe batches needed for a target output
///
/// A selected recipe without a positive yield is taken to produce one unit
/// per batch. Nested Base recipes do not get this fallback.
pub fn batch_multiplier(target_quantity: f64, yield_kg: f64) -> f64 {
    if yield_kg > 0.0 {
        target_quantity / yield_kg
    } else {
        target_quantity
    }
}

struct Frame<'a> {
    recipe: &'a Recipe,
    multiplier: f64,
    depth: usize,
    next_line: usize,
}

#[derive(Default)]
struct ShoppingList {
    items: Vec<ShoppingListItem>,
    index: HashMap<IngredientId, usize>,
}

impl ShoppingList {
    fn merge(&mut self, item: ShoppingListItem) {
        match self.index.get(&item.ingredient_id) {
            Some(&pos) => {
                let existing = &mut self.items[pos];
                existing.quantity += item.quantity;
                existing.cost += item.cost;
            }
            None => {
                self.index.insert(item.ingredient_id, self.items.len());
                self.items.push(item);
            }
        }
    }
}

/// Explode a set of recipe selections into a flat shopping list
///
/// With `explode_base_products` off, every line of the selected recipes is
/// listed as is. With it on, lines whose ingredient is produced by a Base
/// recipe are replaced by that recipe's lines, recursively.
pub fn explode(
    catalog: &Catalog,
    selections: &[Selection],
    explode_base_products: bool,
) -> Explosion {
    let mut list = ShoppingList::default();
    let mut result = Explosion::default();

    for selection in selections {
        let Some(recipe) = catalog.recipe(selection.recipe_id) else {
            warn!(recipe_id = selection.recipe_id, "selected recipe not found, skipping");
            result.skipped.push(SkippedReference::Recipe(selection.recipe_id));
            continue;
        };

        let multiplier = batch_multiplier(selection.quantity, recipe.yield_kg);
        debug!(recipe = %recipe.name, multiplier, "exploding selection");
        explode_recipe(
            catalog,
            recipe,
            multiplier,
            explode_base_products,
            &mut list,
            &mut result,
        );
    }

    result.total_cost = list.items.iter().map(|i| i.cost).sum();
    result.items = list.items;
    result
}

/// Like [`explode`], but a recipe cycle is an error instead of a note
pub fn explode_strict(
    catalog: &Catalog,
    selections: &[Selection],
    explode_base_products: bool,
) -> Result<Explosion, EngineError> {
    let result = explode(catalog, selections, explode_base_products);
    match result.cycles.first() {
        Some(path) => Err(EngineError::CycleDetected { path: path.clone() }),
        None => Ok(result),
    }
}

/// Terminal ingredient cost of one batch of a recipe
///
/// Nested Base recipes are costed from their own lines rather than from the
/// ingredient record standing in for them, which may be stale.
pub fn batch_cost(catalog: &Catalog, recipe: &Recipe) -> f64 {
    let one_batch = if recipe.yield_kg > 0.0 { recipe.yield_kg } else { 1.0 };
    explode(catalog, &[Selection { recipe_id: recipe.id, quantity: one_batch }], true).total_cost
}

fn explode_recipe<'a>(
    catalog: &'a Catalog,
    root: &'a Recipe,
    multiplier: f64,
    explode_base_products: bool,
    list: &mut ShoppingList,
    result: &mut Explosion,
) {
    // The stack holds exactly the recipes on the current path
    let mut stack = vec![Frame {
        recipe: root,
        multiplier,
        depth: 0,
        next_line: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        let (recipe, multiplier, depth) = (frame.recipe, frame.multiplier, frame.depth);
        let Some(line) = recipe.items.get(frame.next_line) else {
            stack.pop();
            continue;
        };
        frame.next_line += 1;

        let Some(ingredient) = catalog.ingredient(line.ingredient_id) else {
            warn!(
                recipe = %recipe.name,
                ingredient_id = line.ingredient_id,
                "ingredient not found, skipping line"
            );
            result.skipped.push(SkippedReference::Ingredient {
                recipe_id: recipe.id,
                ingredient_id: line.ingredient_id,
            });
            continue;
        };

        let base = if explode_base_products {
            catalog.base_recipe_for(ingredient)
        } else {
            None
        };

        if let Some(base) = base {
            if stack.iter().any(|f| f.recipe.id == base.id) {
                let mut path: Vec<RecipeId> = stack.iter().map(|f| f.recipe.id).collect();
                path.push(base.id);
                warn!(?path, "recipe cycle detected, not expanding");
                result.cycles.push(path);
                continue;
            }
            if depth + 1 > MAX_DEPTH {
                warn!(recipe = %base.name, depth, "maximum explosion depth reached, not expanding");
                result.truncated.push(base.id);
                continue;
            }

            let required_kg = line.unit.to_kg(line.quantity);
            let sub_multiplier = safe_div(required_kg, base.yield_kg) * multiplier;
            debug!(
                recipe = %base.name,
                depth = depth + 1,
                sub_multiplier,
                "expanding base recipe"
            );
            stack.push(Frame {
                recipe: base,
                multiplier: sub_multiplier,
                depth: depth + 1,
                next_line: 0,
            });
            continue;
        }

        list.merge(terminal_item(ingredient, line, multiplier));
    }
}

fn terminal_item(
    ingredient: &Ingredient,
    line: &RecipeLineItem,
    multiplier: f64,
) -> ShoppingListItem {
    let quantity = line.quantity * multiplier;
    ShoppingListItem {
        ingredient_id: ingredient.id,
        ingredient_name: ingredient.name.clone(),
        quantity,
        unit: line.unit,
        cost: real_unit_cost(ingredient, line.unit) * quantity,
        supplier: ingredient.supplier.clone(),
        is_base_product: ingredient.is_base_product,
    }
}

impl std::fmt::Display for Explosion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Shopping List ===")?;
        writeln!(
            f,
            "{:<30} {:>12} {:<4} {:>10}  {}",
            "Ingredient", "Quantity", "", "Cost", "Supplier"
        )?;
        writeln!(f, "{}", "-".repeat(72))?;
        for item in &self.items {
            let marker = if item.is_base_product { " *" } else { "" };
            writeln!(
                f,
                "{:<30} {:>12.3} {:<4} {:>10.2}  {}{}",
                item.ingredient_name,
                item.quantity,
                item.unit,
                item.cost,
                item.supplier.as_deref().unwrap_or("-"),
                marker
            )?;
        }
        writeln!(f, "{}", "-".repeat(72))?;
        writeln!(f, "Total cost: {:.2}", self.total_cost)?;

        for path in &self.cycles {
            let ids: Vec<String> = path.iter().map(|id| id.to_string()).collect();
            writeln!(f, "warning: recipe cycle {} was not expanded", ids.join(" -> "))?;
        }
        for id in &self.truncated {
            writeln!(
                f,
                "warning: recipe {} exceeds the nesting limit and was not expanded",
                id
            )?;
        }
        for skipped in &self.skipped {
            match skipped {
                SkippedReference::Recipe(id) => writeln!(f, "warning: recipe {} not found", id)?,
                SkippedReference::Ingredient {
                    recipe_id,
                    ingredient_id,
                } => writeln!(
                    f,
                    "warning: recipe {} uses missing ingredient {}",
                    recipe_id, ingredient_id
                )?,
            }
        }
        Ok(())
    }
}
