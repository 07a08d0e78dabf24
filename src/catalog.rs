//! In-memory snapshot of ingredients, recipes and specialties
//!
//! The engine works against a catalog handed over wholesale by the storage
//! layer. Base recipes are linked to the ingredient that represents them
//! either through `Ingredient::source_recipe` or, when that is missing, by
//! matching standardized names. The name match is kept for older data only:
//! a renamed recipe or two Base recipes sharing a name silently break it.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::models::{Ingredient, IngredientId, ProductKind, Recipe, RecipeId, Specialty};

static NAME_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid regex"));

/// Canonical cross-reference key for an ingredient or recipe name
///
/// Uppercases and collapses every run of punctuation or whitespace into a
/// single space: `"  Crème-pâtissière "` becomes `"CRÈME PÂTISSIÈRE"`.
pub fn standardize_name(name: &str) -> String {
    NAME_SEPARATORS
        .replace_all(&name.to_uppercase(), " ")
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    ingredients: HashMap<IngredientId, Ingredient>,
    recipes: HashMap<RecipeId, Recipe>,
    base_by_name: HashMap<String, RecipeId>,
    specialties: Vec<Specialty>,
}

impl Catalog {
    pub fn new(
        ingredients: Vec<Ingredient>,
        recipes: Vec<Recipe>,
        specialties: Vec<Specialty>,
    ) -> Self {
        let mut base_by_name: HashMap<String, RecipeId> = HashMap::new();
        for recipe in recipes.iter().filter(|r| r.kind == ProductKind::Base) {
            let key = standardize_name(&recipe.name);
            match base_by_name.get(&key) {
                Some(&existing) if existing <= recipe.id => {
                    warn!(
                        name = %key,
                        kept = existing,
                        ignored = recipe.id,
                        "duplicate base recipe name"
                    );
                }
                Some(&existing) => {
                    warn!(
                        name = %key,
                        kept = recipe.id,
                        ignored = existing,
                        "duplicate base recipe name"
                    );
                    base_by_name.insert(key, recipe.id);
                }
                None => {
                    base_by_name.insert(key, recipe.id);
                }
            }
        }

        Self {
            ingredients: ingredients.into_iter().map(|i| (i.id, i)).collect(),
            recipes: recipes.into_iter().map(|r| (r.id, r)).collect(),
            base_by_name,
            specialties,
        }
    }

    pub fn ingredient(&self, id: IngredientId) -> Option<&Ingredient> {
        self.ingredients.get(&id)
    }

    pub fn recipe(&self, id: RecipeId) -> Option<&Recipe> {
        self.recipes.get(&id)
    }

    /// Ingredients ordered by id
    pub fn ingredients(&self) -> Vec<&Ingredient> {
        let mut list: Vec<_> = self.ingredients.values().collect();
        list.sort_by_key(|i| i.id);
        list
    }

    /// Recipes ordered by id
    pub fn recipes(&self) -> Vec<&Recipe> {
        let mut list: Vec<_> = self.recipes.values().collect();
        list.sort_by_key(|r| r.id);
        list
    }

    pub fn specialties(&self) -> &[Specialty] {
        &self.specialties
    }

    /// The Base recipe that produces this ingredient, if any
    pub fn base_recipe_for(&self, ingredient: &Ingredient) -> Option<&Recipe> {
        if let Some(recipe_id) = ingredient.source_recipe {
            return self
                .recipes
                .get(&recipe_id)
                .filter(|r| r.kind == ProductKind::Base);
        }

        let key = if ingredient.standardized_name.is_empty() {
            standardize_name(&ingredient.name)
        } else {
            standardize_name(&ingredient.standardized_name)
        };
        self.base_by_name
            .get(&key)
            .and_then(|id| self.recipes.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeclaredUnit, RecipeLineItem};

    fn recipe(id: RecipeId, name: &str, kind: ProductKind) -> Recipe {
        Recipe {
            id,
            name: name.to_string(),
            kind,
            yield_kg: 1.0,
            sale_price: None,
            specialty_id: None,
            items: vec![RecipeLineItem {
                ingredient_id: 1,
                quantity: 100.0,
                unit: DeclaredUnit::Gram,
                note: None,
            }],
        }
    }

    fn ingredient(id: IngredientId, name: &str) -> Ingredient {
        Ingredient {
            id,
            name: name.to_string(),
            standardized_name: standardize_name(name),
            purchase_cost: 1.0,
            purchase_quantity: None,
            package_weight: 1.0,
            weight_unit: "kg".to_string(),
            correction_factor: None,
            supplier: None,
            is_base_product: true,
            source_recipe: None,
        }
    }

    #[test]
    fn standardize_collapses_separators() {
        assert_eq!(standardize_name("  Pastry   cream "), "PASTRY CREAM");
        assert_eq!(standardize_name("pastry-cream"), "PASTRY CREAM");
        assert_eq!(standardize_name("Crème_brûlée!"), "CRÈME BRÛLÉE");
    }

    #[test]
    fn links_by_name_only_to_base_recipes() {
        let catalog = Catalog::new(
            vec![ingredient(10, "Pastry Cream"), ingredient(11, "Chocolate Cake")],
            vec![
                recipe(1, "pastry cream", ProductKind::Base),
                recipe(2, "Chocolate Cake", ProductKind::Final),
            ],
            Vec::new(),
        );

        let pastry = catalog.ingredient(10).unwrap();
        assert_eq!(catalog.base_recipe_for(pastry).map(|r| r.id), Some(1));

        let cake = catalog.ingredient(11).unwrap();
        assert!(catalog.base_recipe_for(cake).is_none());
    }

    #[test]
    fn explicit_link_wins_over_name() {
        let mut linked = ingredient(10, "Pastry Cream");
        linked.source_recipe = Some(3);
        let catalog = Catalog::new(
            vec![linked],
            vec![
                recipe(1, "Pastry Cream", ProductKind::Base),
                recipe(3, "Vanilla Cream v2", ProductKind::Base),
            ],
            Vec::new(),
        );

        let ingredient = catalog.ingredient(10).unwrap();
        assert_eq!(catalog.base_recipe_for(ingredient).map(|r| r.id), Some(3));
    }

    #[test]
    fn duplicate_names_keep_lowest_id() {
        let catalog = Catalog::new(
            vec![ingredient(10, "Dough")],
            vec![
                recipe(7, "Dough", ProductKind::Base),
                recipe(4, "DOUGH", ProductKind::Base),
            ],
            Vec::new(),
        );

        let dough = catalog.ingredient(10).unwrap();
        assert_eq!(catalog.base_recipe_for(dough).map(|r| r.id), Some(4));
        assert_eq!(catalog.recipes().iter().map(|r| r.id).collect::<Vec<_>>(), vec![4, 7]);
    }
}
