//! Data models for ingredients, recipes and business configuration

use serde::{Deserialize, Serialize};

pub type IngredientId = i64;
pub type RecipeId = i64;
pub type SpecialtyId = i64;

/// Scale class of an ingredient's purchase unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitScale {
    /// kilogram, litre
    Large,
    /// gram, millilitre
    Small,
    /// each, or anything unrecognized
    Count,
}

impl UnitScale {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "kg" | "l" | "lt" => UnitScale::Large,
            "g" | "ml" => UnitScale::Small,
            _ => UnitScale::Count,
        }
    }
}

/// Unit a recipe line declares its quantity in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclaredUnit {
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "ml")]
    Millilitre,
    #[serde(rename = "un")]
    Unit,
}

impl DeclaredUnit {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "g" => Some(DeclaredUnit::Gram),
            "ml" => Some(DeclaredUnit::Millilitre),
            "un" => Some(DeclaredUnit::Unit),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeclaredUnit::Gram => "g",
            DeclaredUnit::Millilitre => "ml",
            DeclaredUnit::Unit => "un",
        }
    }

    /// Gram and millilitre lines are costed with the small-scale unit cost
    pub fn is_small(&self) -> bool {
        matches!(self, DeclaredUnit::Gram | DeclaredUnit::Millilitre)
    }

    /// Converts a quantity in this unit to kilograms, treating ml as g
    pub fn to_kg(&self, quantity: f64) -> f64 {
        if self.is_small() {
            quantity / 1000.0
        } else {
            quantity
        }
    }
}

impl std::fmt::Display for DeclaredUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A purchasable item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: IngredientId,
    pub name: String,
    /// Cross-reference key shared with Base recipes
    pub standardized_name: String,
    pub purchase_cost: f64,
    /// Number of purchased units; absent means 1
    pub purchase_quantity: Option<f64>,
    /// Base-unit content of one purchased unit
    pub package_weight: f64,
    pub weight_unit: String,
    /// Yield-loss multiplier; absent means 1
    pub correction_factor: Option<f64>,
    pub supplier: Option<String>,
    pub is_base_product: bool,
    /// Base recipe this ingredient is produced by, when linked explicitly
    pub source_recipe: Option<RecipeId>,
}

impl Ingredient {
    pub fn effective_purchase_quantity(&self) -> f64 {
        self.purchase_quantity.unwrap_or(1.0)
    }

    pub fn effective_correction_factor(&self) -> f64 {
        self.correction_factor.unwrap_or(1.0)
    }

    pub fn unit_scale(&self) -> UnitScale {
        UnitScale::from_label(&self.weight_unit)
    }
}

/// One ingredient usage inside a recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeLineItem {
    pub ingredient_id: IngredientId,
    pub quantity: f64,
    pub unit: DeclaredUnit,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductKind {
    Base,
    Final,
}

impl ProductKind {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "base" => Some(ProductKind::Base),
            "final" => Some(ProductKind::Final),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProductKind::Base => "Base",
            ProductKind::Final => "Final",
        }
    }
}

/// A production formula
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    pub kind: ProductKind,
    pub yield_kg: f64,
    pub sale_price: Option<f64>,
    pub specialty_id: Option<SpecialtyId>,
    pub items: Vec<RecipeLineItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specialty {
    pub id: SpecialtyId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialtyMargin {
    pub specialty_id: SpecialtyId,
    pub margin_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableExpense {
    pub name: String,
    pub rate_percent: f64,
}

/// Business-wide pricing parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    pub default_margin: f64,
    pub use_specialty_margins: bool,
    pub specialty_margins: Vec<SpecialtyMargin>,
    pub variable_expenses: Vec<VariableExpense>,
    pub fixed_expenses: f64,
}

impl PricingConfig {
    /// Sum of all named variable-expense rates, in percent
    pub fn variable_expense_rate(&self) -> f64 {
        self.variable_expenses.iter().map(|e| e.rate_percent).sum()
    }

    pub fn specialty_margin(&self, specialty_id: SpecialtyId) -> Option<f64> {
        self.specialty_margins
            .iter()
            .find(|m| m.specialty_id == specialty_id)
            .map(|m| m.margin_percent)
    }
}

/// Aggregated terminal demand for one ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingListItem {
    pub ingredient_id: IngredientId,
    pub ingredient_name: String,
    pub quantity: f64,
    pub unit: DeclaredUnit,
    pub cost: f64,
    pub supplier: Option<String>,
    pub is_base_product: bool,
}
