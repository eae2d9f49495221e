//! # Product Repository
//!
//! Fungible stock (accessories, spare parts) and the append-only stock ledger.
//!
//! ## Stock Ledger
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Every quantity change writes a movement              │
//! │                                                                         │
//! │  create_product(qty 10) ──► +10 purchase   "Opening stock"              │
//! │  POS line (qty 2)       ──►  -2 sale       reference pos_sale #41       │
//! │  repair part (qty 1)    ──►  -1 sale       reference repair #7          │
//! │  part removed           ──►  +1 return     reference repair #7          │
//! │  adjust_stock(-1)       ──►  -1 damage     "cracked in transit"         │
//! │                                                                         │
//! │  products.quantity == Σ movements.quantity                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Conditional Decrement
//! Stock leaves through a single statement:
//! ```sql
//! UPDATE products SET quantity = quantity - ?q WHERE id = ? AND quantity >= ?q
//! ```
//! Zero rows affected means a concurrent sale got there first; the caller's
//! transaction is rolled back with `InsufficientStock`.

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use swapsync_core::identifiers::{sequential_id, PRODUCT_PREFIX};
use swapsync_core::money::Money;
use swapsync_core::validation::{
    validate_non_negative, validate_optional, validate_quantity, validate_required,
};
use swapsync_core::{Action, Actor, CoreError, MovementType, Product, StockMovement, ValidationError};

use crate::error::{DbError, DbResult};
use crate::repository::user::company_scope;
use crate::repository::{assign_unique_id, ensure_visible, now, push_scope};

/// Input for [`ProductRepository::create_product`].
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub category_id: i64,
    pub brand: Option<String>,
    pub cost_price: Money,
    pub selling_price: Money,
    /// Opening stock, booked as a purchase movement.
    pub quantity: i64,
    pub min_stock_level: i64,
}

/// Partial update. Quantity only changes through the ledger.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub category_id: Option<i64>,
    pub brand: Option<String>,
    pub cost_price: Option<Money>,
    pub selling_price: Option<Money>,
    pub min_stock_level: Option<i64>,
    pub is_active: Option<bool>,
}

/// Stock totals over the caller's active products.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct InventorySummary {
    pub total_products: i64,
    pub total_units: i64,
    pub stock_value_cost: Money,
    pub stock_value_retail: Money,
    /// In stock but at or below the reorder level.
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
}

/// Repository for products and stock movements.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates a product and books its opening stock.
    pub async fn create_product(&self, actor: &Actor, new: NewProduct) -> DbResult<Product> {
        actor.authorize(Action::ManageProducts)?;

        let name = validate_required("name", &new.name, 200)?;
        let description = validate_optional("description", new.description.as_deref(), 2000)?;
        let sku = validate_optional("sku", new.sku.as_deref(), 64)?;
        let barcode = validate_optional("barcode", new.barcode.as_deref(), 64)?;
        let brand = validate_optional("brand", new.brand.as_deref(), 100)?;
        validate_non_negative("cost_price", new.cost_price)?;
        validate_non_negative("selling_price", new.selling_price)?;
        if new.quantity < 0 {
            return Err(ValidationError::negative("quantity").into());
        }
        if new.min_stock_level < 0 {
            return Err(ValidationError::negative("min_stock_level").into());
        }

        let created_at = now();
        let mut tx = self.pool.begin().await?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (
                name, description, sku, barcode, category_id, brand,
                cost_price, selling_price, quantity, min_stock_level,
                is_active, created_by_user_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&name)
        .bind(&description)
        .bind(&sku)
        .bind(&barcode)
        .bind(new.category_id)
        .bind(&brand)
        .bind(new.cost_price)
        .bind(new.selling_price)
        .bind(new.quantity)
        .bind(new.min_stock_level)
        .bind(actor.user_id)
        .bind(created_at)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await?;

        let unique_id = sequential_id(PRODUCT_PREFIX, id);
        assign_unique_id(&mut tx, "products", id, &unique_id).await?;

        if new.quantity > 0 {
            record_movement(
                &mut tx,
                MovementRecord {
                    product_id: id,
                    movement_type: MovementType::Purchase,
                    quantity: new.quantity,
                    unit_price: Some(new.cost_price),
                    reference: None,
                    notes: Some("Opening stock"),
                    created_by: actor.user_id,
                },
            )
            .await?;
        }

        let product = fetch_product(&mut tx, id).await?;
        tx.commit().await?;

        info!(id, unique_id = %unique_id, quantity = new.quantity, "Created product");
        Ok(product)
    }

    /// Updates product details. Use [`Self::adjust_stock`] for quantity.
    pub async fn update_product(&self, actor: &Actor, id: i64, update: ProductUpdate) -> DbResult<Product> {
        actor.authorize(Action::ManageProducts)?;
        let mut tx = self.pool.begin().await?;
        let scope = company_scope(&mut tx, actor).await?;
        let current = fetch_product(&mut tx, id).await?;
        ensure_visible(&scope, current.created_by_user_id, "Product", id)?;

        let name = match update.name {
            Some(name) => validate_required("name", &name, 200)?,
            None => current.name,
        };
        let description = match update.description {
            Some(d) => validate_optional("description", Some(&d), 2000)?,
            None => current.description,
        };
        let sku = match update.sku {
            Some(s) => validate_optional("sku", Some(&s), 64)?,
            None => current.sku,
        };
        let barcode = match update.barcode {
            Some(b) => validate_optional("barcode", Some(&b), 64)?,
            None => current.barcode,
        };
        let brand = match update.brand {
            Some(b) => validate_optional("brand", Some(&b), 100)?,
            None => current.brand,
        };
        let cost_price = update.cost_price.unwrap_or(current.cost_price);
        let selling_price = update.selling_price.unwrap_or(current.selling_price);
        validate_non_negative("cost_price", cost_price)?;
        validate_non_negative("selling_price", selling_price)?;
        let min_stock_level = update.min_stock_level.unwrap_or(current.min_stock_level);
        if min_stock_level < 0 {
            return Err(ValidationError::negative("min_stock_level").into());
        }

        sqlx::query(
            r#"
            UPDATE products SET
                name = ?, description = ?, sku = ?, barcode = ?, category_id = ?,
                brand = ?, cost_price = ?, selling_price = ?, min_stock_level = ?,
                is_active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&name)
        .bind(&description)
        .bind(&sku)
        .bind(&barcode)
        .bind(update.category_id.unwrap_or(current.category_id))
        .bind(&brand)
        .bind(cost_price)
        .bind(selling_price)
        .bind(min_stock_level)
        .bind(update.is_active.unwrap_or(current.is_active))
        .bind(now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let product = fetch_product(&mut tx, id).await?;
        tx.commit().await?;
        debug!(id, "Updated product");
        Ok(product)
    }

    pub async fn get_product(&self, actor: &Actor, id: i64) -> DbResult<Product> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;
        let product = fetch_product(&mut conn, id).await?;
        ensure_visible(&scope, product.created_by_user_id, "Product", id)?;
        Ok(product)
    }

    /// Lists the caller's products, newest first.
    pub async fn list_products(&self, actor: &Actor, include_inactive: bool) -> DbResult<Vec<Product>> {
        self.scoped_list(actor, if include_inactive { "" } else { " AND is_active = 1" })
            .await
    }

    /// Active products in stock but at or below their reorder level.
    pub async fn low_stock(&self, actor: &Actor) -> DbResult<Vec<Product>> {
        self.scoped_list(
            actor,
            " AND is_active = 1 AND quantity > 0 AND quantity <= min_stock_level",
        )
        .await
    }

    /// Active products with nothing left.
    pub async fn out_of_stock(&self, actor: &Actor) -> DbResult<Vec<Product>> {
        self.scoped_list(actor, " AND is_active = 1 AND quantity = 0").await
    }

    async fn scoped_list(&self, actor: &Actor, filter: &str) -> DbResult<Vec<Product>> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM products WHERE 1 = 1");
        qb.push(filter);
        push_scope(&mut qb, "created_by_user_id", &scope);
        qb.push(" ORDER BY created_at DESC, id DESC");

        let products = qb.build_query_as::<Product>().fetch_all(&mut *conn).await?;
        Ok(products)
    }

    /// Inventory totals for the dashboard.
    pub async fn summary(&self, actor: &Actor) -> DbResult<InventorySummary> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            r#"
            SELECT
                COUNT(*) AS total_products,
                COALESCE(SUM(quantity), 0) AS total_units,
                COALESCE(SUM(quantity * cost_price), 0) AS stock_value_cost,
                COALESCE(SUM(quantity * selling_price), 0) AS stock_value_retail,
                COALESCE(SUM(CASE WHEN quantity > 0 AND quantity <= min_stock_level THEN 1 ELSE 0 END), 0)
                    AS low_stock_count,
                COALESCE(SUM(CASE WHEN quantity = 0 THEN 1 ELSE 0 END), 0) AS out_of_stock_count
            FROM products
            WHERE is_active = 1
            "#,
        );
        push_scope(&mut qb, "created_by_user_id", &scope);

        let summary = qb.build_query_as::<InventorySummary>().fetch_one(&mut *conn).await?;
        Ok(summary)
    }

    /// Books a manual stock change.
    ///
    /// ## When This Fails
    /// - `delta == 0` (validation)
    /// - the result would go below zero (`InsufficientStock`)
    pub async fn adjust_stock(
        &self,
        actor: &Actor,
        id: i64,
        delta: i64,
        notes: Option<&str>,
        movement_type: MovementType,
    ) -> DbResult<Product> {
        actor.authorize(Action::ManageProducts)?;
        if delta == 0 {
            return Err(ValidationError::MustBePositive {
                field: "delta".to_string(),
            }
            .into());
        }

        let mut tx = self.pool.begin().await?;
        let scope = company_scope(&mut tx, actor).await?;
        let product = fetch_product(&mut tx, id).await?;
        ensure_visible(&scope, product.created_by_user_id, "Product", id)?;

        let updated = sqlx::query(
            "UPDATE products SET quantity = quantity + ?1, updated_at = ?2 WHERE id = ?3 AND quantity + ?1 >= 0",
        )
        .bind(delta)
        .bind(now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(CoreError::InsufficientStock {
                product: product.name,
                available: product.quantity,
                requested: -delta,
            }
            .into());
        }

        record_movement(
            &mut tx,
            MovementRecord {
                product_id: id,
                movement_type,
                quantity: delta,
                unit_price: Some(product.cost_price),
                reference: None,
                notes,
                created_by: actor.user_id,
            },
        )
        .await?;

        let product = fetch_product(&mut tx, id).await?;
        tx.commit().await?;

        info!(id, delta, movement = %movement_type, quantity = product.quantity, "Adjusted stock");
        Ok(product)
    }

    /// Ledger of one product, oldest first.
    pub async fn movements(&self, actor: &Actor, id: i64) -> DbResult<Vec<StockMovement>> {
        self.get_product(actor, id).await?;
        let movements = sqlx::query_as("SELECT * FROM stock_movements WHERE product_id = ? ORDER BY id")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(movements)
    }

    /// Soft-deletes a product that no sale or repair references.
    pub async fn delete_product(&self, actor: &Actor, id: i64) -> DbResult<()> {
        actor.authorize(Action::ManageProducts)?;
        let mut tx = self.pool.begin().await?;
        let scope = company_scope(&mut tx, actor).await?;
        let product = fetch_product(&mut tx, id).await?;
        ensure_visible(&scope, product.created_by_user_id, "Product", id)?;

        let mut dependents = Vec::new();
        for (table, label) in [
            ("pos_sale_items", "pos sale items"),
            ("repair_item_usages", "repair parts"),
        ] {
            let sql = format!("SELECT COUNT(*) FROM {} WHERE product_id = ?", table);
            let count: i64 = sqlx::query_scalar(&sql).bind(id).fetch_one(&mut *tx).await?;
            if count > 0 {
                dependents.push(format!("{} {}", count, label));
            }
        }
        if !dependents.is_empty() {
            return Err(CoreError::HasDependents {
                entity: "Product".to_string(),
                id: product.unique_id,
                dependents,
            }
            .into());
        }

        sqlx::query("UPDATE products SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(now())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(id, by = actor.user_id, "Deactivated product");
        Ok(())
    }
}

// =============================================================================
// Stock Ledger Helpers
// =============================================================================

/// One row for `stock_movements`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MovementRecord<'a> {
    pub product_id: i64,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub unit_price: Option<Money>,
    /// `(reference_type, reference_id)`, e.g. `("pos_sale", 41)`.
    pub reference: Option<(&'a str, i64)>,
    pub notes: Option<&'a str>,
    pub created_by: i64,
}

pub(crate) async fn record_movement(conn: &mut SqliteConnection, record: MovementRecord<'_>) -> DbResult<()> {
    let total = record.unit_price.map(|p| p * record.quantity.abs());
    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            product_id, movement_type, quantity, unit_price, total_amount,
            reference_type, reference_id, notes, created_by_user_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.product_id)
    .bind(record.movement_type)
    .bind(record.quantity)
    .bind(record.unit_price)
    .bind(total)
    .bind(record.reference.map(|(kind, _)| kind))
    .bind(record.reference.map(|(_, id)| id))
    .bind(record.notes)
    .bind(record.created_by)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn fetch_product(conn: &mut SqliteConnection, id: i64) -> DbResult<Product> {
    sqlx::query_as("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Product", id))
}

/// Removes `quantity` units and writes a `sale` movement.
///
/// Fails with `InsufficientStock` if fewer units remain, leaving the caller's
/// transaction to roll back.
pub(crate) async fn take_stock(
    conn: &mut SqliteConnection,
    product: &Product,
    quantity: i64,
    unit_price: Money,
    reference: (&str, i64),
    created_by: i64,
) -> DbResult<()> {
    validate_quantity(quantity)?;
    let updated = sqlx::query(
        "UPDATE products SET quantity = quantity - ?1, updated_at = ?2 WHERE id = ?3 AND quantity >= ?1",
    )
    .bind(quantity)
    .bind(now())
    .bind(product.id)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        let available: i64 = sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?")
            .bind(product.id)
            .fetch_optional(&mut *conn)
            .await?
            .unwrap_or(0);
        return Err(CoreError::InsufficientStock {
            product: product.name.clone(),
            available,
            requested: quantity,
        }
        .into());
    }

    record_movement(
        conn,
        MovementRecord {
            product_id: product.id,
            movement_type: MovementType::Sale,
            quantity: -quantity,
            unit_price: Some(unit_price),
            reference: Some(reference),
            notes: None,
            created_by,
        },
    )
    .await
}

/// Puts `quantity` units back and writes a `return` movement.
pub(crate) async fn restore_stock(
    conn: &mut SqliteConnection,
    product_id: i64,
    quantity: i64,
    unit_price: Money,
    reference: (&str, i64),
    created_by: i64,
) -> DbResult<()> {
    sqlx::query("UPDATE products SET quantity = quantity + ?, updated_at = ? WHERE id = ?")
        .bind(quantity)
        .bind(now())
        .bind(product_id)
        .execute(&mut *conn)
        .await?;

    record_movement(
        conn,
        MovementRecord {
            product_id,
            movement_type: MovementType::Return,
            quantity,
            unit_price: Some(unit_price),
            reference: Some(reference),
            notes: None,
            created_by,
        },
    )
    .await
}

// =============================================================================
// Unit Tests
// =============================================================================
