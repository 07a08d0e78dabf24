//! Recipe Costing Calculator
//!
//! Costs recipes from purchase data, explodes multi-level recipes into
//! shopping lists and recommends sale prices.

mod break_even;
mod catalog;
mod db;
mod error;
mod explosion;
mod models;
mod normalize;
mod pricing;

use std::fmt::Display;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::catalog::standardize_name;
use crate::error::EngineError;
use crate::explosion::Selection;
use crate::models::{
    DeclaredUnit, Ingredient, IngredientId, PricingConfig, ProductKind, Recipe, RecipeId,
    RecipeLineItem, Specialty, SpecialtyId, SpecialtyMargin, VariableExpense,
};

#[derive(Parser)]
#[command(name = "recipe-costing")]
#[command(about = "Recipe costing and pricing calculator for small food production")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, env = "RECIPE_COSTING_DB", default_value = "recipe_costing.db")]
    database: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum MarginMode {
    Global,
    Specialty,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Load a sample bakery catalog
    LoadSample,

    /// List all ingredients with their real unit costs
    ListIngredients,

    /// List all recipes
    ListRecipes,

    /// Show normalized costs for an ingredient
    Ingredient {
        /// Ingredient ID
        id: IngredientId,
    },

    /// Show the pricing breakdown of a recipe
    Price {
        /// Recipe ID
        id: RecipeId,
    },

    /// Price every Final recipe
    PriceAll,

    /// Build a shopping list for a production plan
    Shop {
        /// Selections as <recipe-id>:<quantity-kg>
        #[arg(required = true)]
        selections: Vec<Selection>,

        /// List Base products as bought items instead of exploding them
        #[arg(long)]
        no_explode: bool,

        /// Fail on recipe cycles instead of reporting them
        #[arg(long)]
        strict: bool,
    },

    /// Compute break-even revenue from the business configuration
    BreakEven,

    /// Recompute the ingredient records of all Base recipes
    RefreshBases,

    /// Show the business configuration
    Config,

    /// Set the global default margin
    SetMargin {
        /// Margin in percent
        percent: f64,
    },

    /// Choose between the global margin and per-specialty margins
    MarginMode {
        #[arg(value_enum)]
        mode: MarginMode,
    },

    /// Set the total monthly fixed expenses
    SetFixedExpenses {
        total: f64,
    },

    /// Add or update a named variable expense
    AddExpense {
        name: String,
        /// Rate in percent of revenue
        rate: f64,
    },

    /// Set the margin override for a specialty
    SetSpecialtyMargin {
        specialty_id: SpecialtyId,
        /// Margin in percent
        percent: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let conn = Connection::open(&cli.database)?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            load_sample_data(&conn)?;
            println!("Sample data loaded successfully!");
        }

        Commands::ListIngredients => {
            let ingredients = db::list_ingredients(&conn)?;
            if ingredients.is_empty() {
                println!("No ingredients in database. Run 'load-sample' first.");
            } else {
                println!(
                    "{:>4}  {:<28} {:>10} {:>5} {:>12} {:>12}",
                    "ID", "Ingredient", "Cost", "Unit", "Real/kg", "Real/g"
                );
                println!("{}", "-".repeat(76));
                for i in ingredients {
                    let cost = normalize::normalize(&i);
                    println!(
                        "{:>4}  {:<28} {:>10.2} {:>5} {:>12.4} {:>12.6}",
                        i.id,
                        i.name,
                        i.purchase_cost,
                        i.weight_unit,
                        cost.real_cost_large,
                        cost.real_cost_small
                    );
                }
            }
        }

        Commands::ListRecipes => {
            let recipes = db::list_recipes(&conn)?;
            if recipes.is_empty() {
                println!("No recipes in database. Run 'load-sample' first.");
            } else {
                println!(
                    "{:>4}  {:<28} {:<6} {:>10} {:>10}",
                    "ID", "Recipe", "Kind", "Yield kg", "Price"
                );
                println!("{}", "-".repeat(64));
                for r in recipes {
                    let price = r.sale_price.map_or("-".to_string(), |p| format!("{:.2}", p));
                    println!(
                        "{:>4}  {:<28} {:<6} {:>10.3} {:>10}",
                        r.id,
                        r.name,
                        r.kind.label(),
                        r.yield_kg,
                        price
                    );
                }
            }
        }

        Commands::Ingredient { id } => {
            let catalog = db::load_catalog(&conn)?;
            match catalog.ingredient(id) {
                Some(ingredient) => {
                    let cost = normalize::normalize(ingredient);
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&cost)?);
                    } else {
                        println!("Ingredient: {}", ingredient.name);
                        println!("  ID: {}", ingredient.id);
                        println!("  Standardized name: {}", ingredient.standardized_name);
                        if let Some(supplier) = &ingredient.supplier {
                            println!("  Supplier: {}", supplier);
                        }
                        if let Some(recipe) = catalog.base_recipe_for(ingredient) {
                            println!("  Produced by: {} (recipe {})", recipe.name, recipe.id);
                        }
                        println!("{}", cost);
                    }
                }
                None => println!("Ingredient '{}' not found", id),
            }
        }

        Commands::Price { id } => {
            let catalog = db::load_catalog(&conn)?;
            let config = db::load_config(&conn)?;
            let recipe = catalog.recipe(id).ok_or(EngineError::UnknownRecipe(id))?;
            let result = pricing::evaluate(recipe, &recipe.items, &catalog, &config);
            emit(cli.json, &result)?;
        }

        Commands::PriceAll => {
            let catalog = db::load_catalog(&conn)?;
            let config = db::load_config(&conn)?;
            let results = pricing::evaluate_all(&catalog, &config);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!(
                    "{:<28} {:>9} {:>9} {:>9} {:>8}  {}",
                    "Recipe", "Cost", "Price", "Suggested", "Margin", "Verdict"
                );
                println!("{}", "-".repeat(90));
                for r in results {
                    println!(
                        "{:<28} {:>9.2} {:>9.2} {:>9.2} {:>7.1}%  {}",
                        r.recipe_name,
                        r.cost.total_cost,
                        r.sale_price,
                        r.suggested_price,
                        r.current_margin_percent,
                        r.verdict
                    );
                }
            }
        }

        Commands::Shop {
            selections,
            no_explode,
            strict,
        } => {
            let catalog = db::load_catalog(&conn)?;
            let result = if strict {
                explosion::explode_strict(&catalog, &selections, !no_explode)?
            } else {
                explosion::explode(&catalog, &selections, !no_explode)
            };
            emit(cli.json, &result)?;
        }

        Commands::BreakEven => {
            let catalog = db::load_catalog(&conn)?;
            let config = db::load_config(&conn)?;
            let result = break_even::break_even_for(&config, catalog.specialties());
            emit(cli.json, &result)?;
        }

        Commands::RefreshBases => {
            let refreshed = refresh_base_ingredients(&conn)?;
            println!("Refreshed {} base product ingredients", refreshed);
        }

        Commands::Config => {
            let config = db::load_config(&conn)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                let roster = db::list_specialties(&conn)?;
                print_config(&config, &roster);
            }
        }

        Commands::SetMargin { percent } => {
            db::set_default_margin(&conn, percent)?;
            println!("Default margin set to {:.1}%", percent);
        }

        Commands::MarginMode { mode } => {
            let per_specialty = matches!(mode, MarginMode::Specialty);
            db::set_margin_mode(&conn, per_specialty)?;
            println!(
                "Margin mode: {}",
                if per_specialty { "per specialty" } else { "global" }
            );
        }

        Commands::SetFixedExpenses { total } => {
            db::set_fixed_expenses(&conn, total)?;
            println!("Fixed expenses set to {:.2}", total);
        }

        Commands::AddExpense { name, rate } => {
            let expense = VariableExpense {
                name: name.clone(),
                rate_percent: rate,
            };
            db::upsert_variable_expense(&conn, &expense)?;
            println!("Variable expense '{}' set to {:.2}%", name, rate);
        }

        Commands::SetSpecialtyMargin { specialty_id, percent } => {
            db::set_specialty_margin(
                &conn,
                &SpecialtyMargin {
                    specialty_id,
                    margin_percent: percent,
                },
            )?;
            println!("Specialty {} margin set to {:.1}%", specialty_id, percent);
        }
    }

    Ok(())
}

fn emit<T: Serialize + Display>(json: bool, value: &T) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value);
    }
    Ok(())
}

fn print_config(config: &PricingConfig, roster: &[Specialty]) {
    println!("Default margin: {:.1}%", config.default_margin);
    println!(
        "Margin mode:    {}",
        if config.use_specialty_margins { "per specialty" } else { "global" }
    );
    println!("Fixed expenses: {:.2}", config.fixed_expenses);
    println!("Variable expenses ({:.2}% total):", config.variable_expense_rate());
    for expense in &config.variable_expenses {
        println!("  {:<24} {:>6.2}%", expense.name, expense.rate_percent);
    }
    println!("Specialty margins:");
    for specialty in roster {
        match config.specialty_margin(specialty.id) {
            Some(margin) => println!("  {:<24} {:>6.1}%", specialty.name, margin),
            None => println!("  {:<24} {:>7}", specialty.name, "-"),
        }
    }
}

/// Recompute and store the ingredient record of every Base recipe
fn refresh_base_ingredients(conn: &Connection) -> Result<usize> {
    let catalog = db::load_catalog(conn)?;
    let mut refreshed = 0;

    for recipe in catalog.recipes().into_iter().filter(|r| r.kind == ProductKind::Base) {
        let total_cost = explosion::batch_cost(&catalog, recipe);
        let id = match db::find_base_ingredient(conn, recipe.id, &standardize_name(&recipe.name))? {
            Some(id) => id,
            None => db::next_ingredient_id(conn)?,
        };
        let mut ingredient = pricing::materialize_base_ingredient(id, recipe, total_cost);
        if let Some(existing) = catalog.ingredient(id) {
            ingredient.supplier = existing.supplier.clone();
        }
        db::upsert_ingredient(conn, &ingredient)?;
        info!(recipe = %recipe.name, ingredient_id = id, total_cost, "refreshed base product");
        refreshed += 1;
    }

    Ok(refreshed)
}

/// Load a sample bakery catalog for trying the calculator
fn load_sample_data(conn: &Connection) -> Result<()> {
    db::clear_data(conn)?;

    for (id, name) in [(1, "Cakes"), (2, "Breads"), (3, "Pastries")] {
        db::upsert_specialty(
            conn,
            &Specialty {
                id,
                name: name.to_string(),
            },
        )?;
    }

    let bought = |id: IngredientId,
                  name: &str,
                  cost: f64,
                  qty: Option<f64>,
                  weight: f64,
                  unit: &str,
                  correction: Option<f64>,
                  supplier: &str| Ingredient {
        id,
        name: name.to_string(),
        standardized_name: standardize_name(name),
        purchase_cost: cost,
        purchase_quantity: qty,
        package_weight: weight,
        weight_unit: unit.to_string(),
        correction_factor: correction,
        supplier: Some(supplier.to_string()),
        is_base_product: false,
        source_recipe: None,
    };

    let ingredients = [
        // 5 kg sack
        bought(1, "Wheat flour", 22.5, None, 5.0, "kg", None, "Mill & Co"),
        bought(2, "Sugar", 4.8, None, 1.0, "kg", None, "Mill & Co"),
        // tray of 30
        bought(3, "Eggs", 27.0, None, 30.0, "un", None, "Green Farm"),
        // case of 12 x 1 l
        bought(4, "Whole milk", 60.0, Some(12.0), 1.0, "l", None, "Green Farm"),
        bought(5, "Butter", 9.9, None, 200.0, "g", None, "Green Farm"),
        // couverture, 5% lost when tempering
        bought(6, "Dark chocolate", 89.0, None, 1.0, "kg", Some(1.05), "Cocoa Import"),
        bought(7, "Dry yeast", 6.5, None, 125.0, "g", None, "Mill & Co"),
        bought(8, "Salt", 2.0, None, 1.0, "kg", None, "Mill & Co"),
    ];
    for ingredient in &ingredients {
        db::upsert_ingredient(conn, ingredient)?;
    }

    // Stands in for the Pastry cream recipe until refresh below
    db::upsert_ingredient(
        conn,
        &Ingredient {
            is_base_product: true,
            source_recipe: Some(10),
            supplier: None,
            ..bought(20, "Pastry cream", 0.0, None, 0.0, "kg", None, "")
        },
    )?;

    let line = |ingredient_id: i64, quantity: f64, unit: DeclaredUnit| RecipeLineItem {
        ingredient_id,
        quantity,
        unit,
        note: None,
    };

    let recipes = [
        Recipe {
            id: 10,
            name: "Pastry cream".to_string(),
            kind: ProductKind::Base,
            yield_kg: 1.2,
            sale_price: None,
            specialty_id: None,
            items: vec![
                line(4, 1000.0, DeclaredUnit::Millilitre),
                line(2, 200.0, DeclaredUnit::Gram),
                line(3, 6.0, DeclaredUnit::Unit),
                line(5, 50.0, DeclaredUnit::Gram),
            ],
        },
        Recipe {
            id: 11,
            name: "Chocolate cake".to_string(),
            kind: ProductKind::Final,
            yield_kg: 1.5,
            sale_price: Some(95.0),
            specialty_id: Some(1),
            items: vec![
                line(1, 300.0, DeclaredUnit::Gram),
                line(2, 250.0, DeclaredUnit::Gram),
                line(3, 4.0, DeclaredUnit::Unit),
                line(6, 200.0, DeclaredUnit::Gram),
                line(20, 400.0, DeclaredUnit::Gram),
            ],
        },
        Recipe {
            id: 12,
            name: "Country bread".to_string(),
            kind: ProductKind::Final,
            yield_kg: 0.9,
            sale_price: Some(8.0),
            specialty_id: Some(2),
            items: vec![
                line(1, 600.0, DeclaredUnit::Gram),
                line(7, 10.0, DeclaredUnit::Gram),
                line(8, 12.0, DeclaredUnit::Gram),
            ],
        },
        Recipe {
            id: 13,
            name: "Eclair".to_string(),
            kind: ProductKind::Final,
            yield_kg: 0.8,
            sale_price: Some(30.0),
            specialty_id: Some(3),
            items: vec![
                line(1, 150.0, DeclaredUnit::Gram),
                line(5, 100.0, DeclaredUnit::Gram),
                line(3, 4.0, DeclaredUnit::Unit),
                line(20, 500.0, DeclaredUnit::Gram),
                line(6, 80.0, DeclaredUnit::Gram),
            ],
        },
    ];
    for recipe in &recipes {
        db::upsert_recipe(conn, recipe)?;
    }

    db::set_default_margin(conn, 30.0)?;
    db::set_fixed_expenses(conn, 8000.0)?;
    db::set_specialty_margin(conn, &SpecialtyMargin { specialty_id: 1, margin_percent: 40.0 })?;
    db::set_specialty_margin(conn, &SpecialtyMargin { specialty_id: 2, margin_percent: 25.0 })?;
    for (name, rate) in [("Card fees", 4.0), ("Taxes", 6.0), ("Packaging", 2.5)] {
        db::upsert_variable_expense(
            conn,
            &VariableExpense {
                name: name.to_string(),
                rate_percent: rate,
            },
        )?;
    }

    let refreshed = refresh_base_ingredients(conn)?;
    let catalog = db::load_catalog(conn)?;
    println!(
        "Loaded {} ingredients, {} recipes ({} base products refreshed)",
        catalog.ingredients().len(),
        catalog.recipes().len(),
        refreshed
    );
    Ok(())
}
