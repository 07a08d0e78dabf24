//! Database schema and operations

use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

use crate::catalog::Catalog;
use crate::models::{
    DeclaredUnit, Ingredient, IngredientId, PricingConfig, ProductKind, Recipe, RecipeId,
    RecipeLineItem, Specialty, SpecialtyMargin, VariableExpense,
};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS specialties (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        -- Purchasable items; base products point at the recipe making them
        CREATE TABLE IF NOT EXISTS ingredients (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            standardized_name TEXT NOT NULL,
            purchase_cost REAL NOT NULL DEFAULT 0,
            purchase_quantity REAL,
            package_weight REAL NOT NULL DEFAULT 0,
            weight_unit TEXT NOT NULL,
            correction_factor REAL,
            supplier TEXT,
            is_base_product INTEGER NOT NULL DEFAULT 0,
            source_recipe_id INTEGER
        );

        CREATE TABLE IF NOT EXISTS recipes (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('Base', 'Final')),
            yield_kg REAL NOT NULL DEFAULT 0,
            sale_price REAL,
            specialty_id INTEGER
        );

        -- Ordered ingredient lines of each recipe
        CREATE TABLE IF NOT EXISTS recipe_items (
            recipe_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            ingredient_id INTEGER NOT NULL,
            quantity REAL NOT NULL,
            unit TEXT NOT NULL,
            note TEXT,
            PRIMARY KEY (recipe_id, position)
        );

        -- Singleton business configuration
        CREATE TABLE IF NOT EXISTS pricing_config (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            default_margin REAL NOT NULL DEFAULT 0,
            use_specialty_margins INTEGER NOT NULL DEFAULT 0,
            fixed_expenses REAL NOT NULL DEFAULT 0
        );
        INSERT OR IGNORE INTO pricing_config (id) VALUES (1);

        CREATE TABLE IF NOT EXISTS specialty_margins (
            specialty_id INTEGER PRIMARY KEY,
            margin_percent REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS variable_expenses (
            name TEXT PRIMARY KEY,
            rate_percent REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ingredients_source ON ingredients(source_recipe_id);
        "#,
    )?;
    Ok(())
}

/// Clear all catalog and configuration data
pub fn clear_data(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM recipe_items;
        DELETE FROM recipes;
        DELETE FROM ingredients;
        DELETE FROM specialties;
        DELETE FROM specialty_margins;
        DELETE FROM variable_expenses;
        UPDATE pricing_config SET default_margin = 0, use_specialty_margins = 0, fixed_expenses = 0;
        "#,
    )?;
    Ok(())
}

/// Insert or replace a specialty
pub fn upsert_specialty(conn: &Connection, specialty: &Specialty) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO specialties (id, name) VALUES (?1, ?2)",
        (specialty.id, &specialty.name),
    )?;
    Ok(())
}

/// Insert or replace an ingredient
pub fn upsert_ingredient(conn: &Connection, ingredient: &Ingredient) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO ingredients (id, name, standardized_name, purchase_cost, purchase_quantity,
             package_weight, weight_unit, correction_factor, supplier, is_base_product, source_recipe_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            ingredient.id,
            ingredient.name,
            ingredient.standardized_name,
            ingredient.purchase_cost,
            ingredient.purchase_quantity,
            ingredient.package_weight,
            ingredient.weight_unit,
            ingredient.correction_factor,
            ingredient.supplier,
            ingredient.is_base_product,
            ingredient.source_recipe,
        ],
    )?;
    Ok(())
}

/// Insert or replace a recipe together with its lines
pub fn upsert_recipe(conn: &Connection, recipe: &Recipe) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT OR REPLACE INTO recipes (id, name, kind, yield_kg, sale_price, specialty_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (
            recipe.id,
            &recipe.name,
            recipe.kind.label(),
            recipe.yield_kg,
            recipe.sale_price,
            recipe.specialty_id,
        ),
    )?;
    tx.execute("DELETE FROM recipe_items WHERE recipe_id = ?1", [recipe.id])?;
    for (position, item) in recipe.items.iter().enumerate() {
        tx.execute(
            "INSERT INTO recipe_items (recipe_id, position, ingredient_id, quantity, unit, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                recipe.id,
                position as i64,
                item.ingredient_id,
                item.quantity,
                item.unit.label(),
                &item.note,
            ),
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// List all ingredients ordered by name
pub fn list_ingredients(conn: &Connection) -> Result<Vec<Ingredient>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, standardized_name, purchase_cost, purchase_quantity, package_weight, weight_unit,
                correction_factor, supplier, is_base_product, source_recipe_id
         FROM ingredients ORDER BY name",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(Ingredient {
            id: row.get(0)?,
            name: row.get(1)?,
            standardized_name: row.get(2)?,
            purchase_cost: row.get(3)?,
            purchase_quantity: row.get(4)?,
            package_weight: row.get(5)?,
            weight_unit: row.get(6)?,
            correction_factor: row.get(7)?,
            supplier: row.get(8)?,
            is_base_product: row.get(9)?,
            source_recipe: row.get(10)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Get the lines of a recipe in order
pub fn get_recipe_items(conn: &Connection, recipe_id: RecipeId) -> Result<Vec<RecipeLineItem>> {
    let mut stmt = conn.prepare(
        "SELECT ingredient_id, quantity, unit, note
         FROM recipe_items
         WHERE recipe_id = ?1
         ORDER BY position",
    )?;

    let rows = stmt.query_map([recipe_id], |row| {
        Ok((
            row.get::<_, IngredientId>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (ingredient_id, quantity, unit, note) = row?;
        let unit = DeclaredUnit::from_label(&unit).unwrap_or_else(|| {
            warn!(recipe_id, unit = %unit, "unknown line unit, treating as 'un'");
            DeclaredUnit::Unit
        });
        results.push(RecipeLineItem {
            ingredient_id,
            quantity,
            unit,
            note,
        });
    }
    Ok(results)
}

/// List all recipes with their lines, ordered by name
pub fn list_recipes(conn: &Connection) -> Result<Vec<Recipe>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, kind, yield_kg, sale_price, specialty_id FROM recipes ORDER BY name",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, RecipeId>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, Option<f64>>(4)?,
            row.get::<_, Option<i64>>(5)?,
        ))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (id, name, kind, yield_kg, sale_price, specialty_id) = row?;
        let kind = ProductKind::from_label(&kind)
            .ok_or_else(|| anyhow!("recipe {} has unknown kind '{}'", id, kind))?;
        results.push(Recipe {
            id,
            name,
            kind,
            yield_kg,
            sale_price,
            specialty_id,
            items: get_recipe_items(conn, id)?,
        });
    }
    Ok(results)
}

/// List all specialties ordered by name
pub fn list_specialties(conn: &Connection) -> Result<Vec<Specialty>> {
    let mut stmt = conn.prepare("SELECT id, name FROM specialties ORDER BY name")?;

    let rows = stmt.query_map([], |row| {
        Ok(Specialty {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Load a full snapshot for the engine
pub fn load_catalog(conn: &Connection) -> Result<Catalog> {
    Ok(Catalog::new(
        list_ingredients(conn)?,
        list_recipes(conn)?,
        list_specialties(conn)?,
    ))
}

/// Load the business configuration
pub fn load_config(conn: &Connection) -> Result<PricingConfig> {
    let (default_margin, use_specialty_margins, fixed_expenses) = conn.query_row(
        "SELECT default_margin, use_specialty_margins, fixed_expenses FROM pricing_config WHERE id = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT specialty_id, margin_percent FROM specialty_margins ORDER BY specialty_id",
    )?;
    let specialty_margins = stmt
        .query_map([], |row| {
            Ok(SpecialtyMargin {
                specialty_id: row.get(0)?,
                margin_percent: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare("SELECT name, rate_percent FROM variable_expenses ORDER BY name")?;
    let variable_expenses = stmt
        .query_map([], |row| {
            Ok(VariableExpense {
                name: row.get(0)?,
                rate_percent: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(PricingConfig {
        default_margin,
        use_specialty_margins,
        specialty_margins,
        variable_expenses,
        fixed_expenses,
    })
}

pub fn set_default_margin(conn: &Connection, margin_percent: f64) -> Result<()> {
    conn.execute("UPDATE pricing_config SET default_margin = ?1 WHERE id = 1", [margin_percent])?;
    Ok(())
}

pub fn set_margin_mode(conn: &Connection, use_specialty_margins: bool) -> Result<()> {
    conn.execute(
        "UPDATE pricing_config SET use_specialty_margins = ?1 WHERE id = 1",
        [use_specialty_margins],
    )?;
    Ok(())
}

pub fn set_fixed_expenses(conn: &Connection, total: f64) -> Result<()> {
    conn.execute("UPDATE pricing_config SET fixed_expenses = ?1 WHERE id = 1", [total])?;
    Ok(())
}

/// Insert or replace a specialty's margin override
pub fn set_specialty_margin(conn: &Connection, margin: &SpecialtyMargin) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO specialty_margins (specialty_id, margin_percent) VALUES (?1, ?2)",
        (margin.specialty_id, margin.margin_percent),
    )?;
    Ok(())
}

/// Insert or replace a named variable expense
pub fn upsert_variable_expense(conn: &Connection, expense: &VariableExpense) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO variable_expenses (name, rate_percent) VALUES (?1, ?2)",
        (&expense.name, expense.rate_percent),
    )?;
    Ok(())
}

/// Id of the ingredient linked to a Base recipe, by explicit link or name
pub fn find_base_ingredient(
    conn: &Connection,
    recipe_id: RecipeId,
    standardized_name: &str,
) -> Result<Option<IngredientId>> {
    let linked = conn
        .query_row(
            "SELECT id FROM ingredients WHERE source_recipe_id = ?1 ORDER BY id LIMIT 1",
            [recipe_id],
            |row| row.get(0),
        )
        .optional()?;
    if linked.is_some() {
        return Ok(linked);
    }

    let by_name = conn
        .query_row(
            "SELECT id FROM ingredients WHERE standardized_name = ?1 AND source_recipe_id IS NULL
             ORDER BY id LIMIT 1",
            [standardized_name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(by_name)
}

/// Next free ingredient id
pub fn next_ingredient_id(conn: &Connection) -> Result<IngredientId> {
    let id: IngredientId = conn.query_row(
        "SELECT COALESCE(MAX(id), 0) + 1 FROM ingredients",
        [],
        |row| row.get(0),
    )?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::standardize_name;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn flour() -> Ingredient {
        Ingredient {
            id: 1,
            name: "Flour".to_string(),
            standardized_name: standardize_name("Flour"),
            purchase_cost: 25.0,
            purchase_quantity: None,
            package_weight: 5.0,
            weight_unit: "kg".to_string(),
            correction_factor: Some(1.05),
            supplier: Some("Mill & Co".to_string()),
            is_base_product: false,
            source_recipe: None,
        }
    }

    fn bread() -> Recipe {
        Recipe {
            id: 3,
            name: "Bread".to_string(),
            kind: ProductKind::Final,
            yield_kg: 0.9,
            sale_price: Some(12.0),
            specialty_id: Some(1),
            items: vec![
                RecipeLineItem {
                    ingredient_id: 1,
                    quantity: 500.0,
                    unit: DeclaredUnit::Gram,
                    note: Some("sifted".to_string()),
                },
                RecipeLineItem {
                    ingredient_id: 2,
                    quantity: 1.0,
                    unit: DeclaredUnit::Unit,
                    note: None,
                },
            ],
        }
    }

    #[test]
    fn catalog_snapshot_keeps_line_order_and_optionals() {
        let conn = open();
        upsert_ingredient(&conn, &flour()).unwrap();
        upsert_recipe(&conn, &bread()).unwrap();
        upsert_specialty(&conn, &Specialty { id: 1, name: "Breads".to_string() }).unwrap();

        let catalog = load_catalog(&conn).unwrap();
        let recipe = catalog.recipe(3).unwrap();
        assert_eq!(recipe.items.len(), 2);
        assert_eq!(recipe.items[0].note.as_deref(), Some("sifted"));
        assert_eq!(recipe.items[1].unit, DeclaredUnit::Unit);

        let ingredient = catalog.ingredient(1).unwrap();
        assert_eq!(ingredient.purchase_quantity, None);
        assert_eq!(ingredient.correction_factor, Some(1.05));
        assert_eq!(catalog.specialties().len(), 1);
    }

    #[test]
    fn upsert_recipe_replaces_lines() {
        let conn = open();
        upsert_recipe(&conn, &bread()).unwrap();

        let mut changed = bread();
        changed.items.truncate(1);
        upsert_recipe(&conn, &changed).unwrap();

        assert_eq!(get_recipe_items(&conn, 3).unwrap().len(), 1);
    }

    #[test]
    fn config_defaults_and_updates() {
        let conn = open();
        let config = load_config(&conn).unwrap();
        assert_eq!(config.default_margin, 0.0);
        assert!(!config.use_specialty_margins);

        set_default_margin(&conn, 30.0).unwrap();
        set_margin_mode(&conn, true).unwrap();
        set_fixed_expenses(&conn, 1500.0).unwrap();
        let margin = SpecialtyMargin {
            specialty_id: 1,
            margin_percent: 45.0,
        };
        set_specialty_margin(&conn, &margin).unwrap();
        for (name, rate_percent) in [("Taxes", 6.0), ("Card fees", 3.0), ("Taxes", 8.0)] {
            let expense = VariableExpense {
                name: name.to_string(),
                rate_percent,
            };
            upsert_variable_expense(&conn, &expense).unwrap();
        }

        let config = load_config(&conn).unwrap();
        assert_eq!(config.default_margin, 30.0);
        assert!(config.use_specialty_margins);
        assert_eq!(config.fixed_expenses, 1500.0);
        assert_eq!(config.specialty_margin(1), Some(45.0));
        assert_eq!(config.variable_expense_rate(), 11.0);
    }

    #[test]
    fn finds_base_ingredient_by_link_then_name() {
        let conn = open();
        let mut by_name = flour();
        by_name.id = 7;
        by_name.name = "Sourdough starter".to_string();
        by_name.standardized_name = standardize_name(&by_name.name);
        upsert_ingredient(&conn, &by_name).unwrap();

        assert_eq!(find_base_ingredient(&conn, 9, "SOURDOUGH STARTER").unwrap(), Some(7));
        assert_eq!(find_base_ingredient(&conn, 9, "LEVAIN").unwrap(), None);

        let mut linked = flour();
        linked.id = 8;
        linked.source_recipe = Some(9);
        upsert_ingredient(&conn, &linked).unwrap();
        assert_eq!(find_base_ingredient(&conn, 9, "SOURDOUGH STARTER").unwrap(), Some(8));
        assert_eq!(next_ingredient_id(&conn).unwrap(), 9);
    }
}
