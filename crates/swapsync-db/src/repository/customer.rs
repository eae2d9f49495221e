//! # Customer Repository
//!
//! Customer registry and the deletion-code protocol.
//!
//! ## Deletion Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  super_admin ─────────────────────────────► delete (no code)            │
//! │  manager     ── code == current? ──yes────► delete                      │
//! │                        └──no──► 401 InvalidDeletionCode                 │
//! │  staff       ── own customer? ──yes── code? ─► delete                   │
//! │                        └──no──► 403                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The shared walk-in customer is never deleted.
//!
//! ## Cascade (one transaction, rows of the caller's company only)
//! ```text
//!  1 phones.current_owner_id = NULL     6 pending_resales (swaps, sales)
//!  2 phone_ownership_history            7 phones.swapped_from_id = NULL
//!  3 pos_sale_items, pos_sales          8 repair_item_usages, repairs
//!  4 product_sales                      9 sales, swaps, customer
//!  5 invoices
//! ```

use rand::thread_rng;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use swapsync_core::identifiers::{deletion_code, sequential_id, CUSTOMER_PREFIX};
use swapsync_core::validation::{
    validate_email, validate_optional, validate_phone_number, validate_required,
};
use swapsync_core::{
    Action, Actor, CompanyScope, CoreError, Customer, CustomerCodeEvent, Role, ValidationError,
    WALK_IN_CUSTOMER_NAME, WALK_IN_CUSTOMER_PHONE,
};

use crate::error::{DbError, DbResult};
use crate::repository::user::company_scope;
use crate::repository::{assign_unique_id, ensure_visible, now, push_scope};

/// Input for [`CustomerRepository::create_customer`].
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub full_name: String,
    pub phone_number: String,
    pub email: Option<String>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct CustomerUpdate {
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

/// A customer as shown to one viewer.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerView {
    #[serde(flatten)]
    pub customer: Customer,
    /// Present only when the viewer may see it.
    pub deletion_code: Option<String>,
}

impl CustomerView {
    pub fn for_viewer(customer: Customer, viewer: &Actor) -> Self {
        let deletion_code = customer
            .visible_deletion_code(viewer.user_id, viewer.role)
            .map(str::to_string);
        CustomerView {
            customer,
            deletion_code,
        }
    }
}

/// Row counts removed by a customer deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CustomerDeletion {
    pub customer_id: i64,
    pub pos_sales: u64,
    pub sales: u64,
    pub swaps: u64,
    pub pending_resales: u64,
    pub repairs: u64,
}

/// Repository for customers.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Registers a customer with a fresh deletion code.
    pub async fn create_customer(&self, actor: &Actor, new: NewCustomer) -> DbResult<CustomerView> {
        actor.authorize(Action::CreateCustomer)?;

        let full_name = validate_required("full_name", &new.full_name, 120)?;
        let phone_number = validate_phone_number("phone_number", &new.phone_number)?;
        let email = match validate_optional("email", new.email.as_deref(), 254)? {
            Some(email) => Some(validate_email(&email)?),
            None => None,
        };
        let code = deletion_code(&mut thread_rng());
        let created_at = now();

        let mut tx = self.pool.begin().await?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO customers (
                full_name, phone_number, email, created_by_user_id,
                deletion_code, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&full_name)
        .bind(&phone_number)
        .bind(&email)
        .bind(actor.user_id)
        .bind(&code)
        .bind(created_at)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, phone_number.clone()),
            other => other,
        })?;

        let unique_id = sequential_id(CUSTOMER_PREFIX, id);
        assign_unique_id(&mut tx, "customers", id, &unique_id).await?;
        let customer = fetch_customer(&mut tx, id).await?;
        tx.commit().await?;

        info!(id, unique_id = %unique_id, created_by = actor.user_id, "Created customer");
        Ok(CustomerView::for_viewer(customer, actor))
    }

    /// Applies a partial update. Managers may not edit customers.
    pub async fn update_customer(
        &self,
        actor: &Actor,
        id: i64,
        update: CustomerUpdate,
    ) -> DbResult<CustomerView> {
        actor.authorize(Action::EditCustomer)?;
        let mut tx = self.pool.begin().await?;
        let scope = company_scope(&mut tx, actor).await?;
        let current = fetch_customer(&mut tx, id).await?;
        ensure_visible(&scope, current.created_by_user_id, "Customer", id)?;

        let full_name = match update.full_name {
            Some(name) => validate_required("full_name", &name, 120)?,
            None => current.full_name,
        };
        let phone_number = match update.phone_number {
            Some(phone) => validate_phone_number("phone_number", &phone)?,
            None => current.phone_number,
        };
        let email = match update.email {
            Some(email) => match validate_optional("email", Some(&email), 254)? {
                Some(email) => Some(validate_email(&email)?),
                None => None,
            },
            None => current.email,
        };

        sqlx::query(
            "UPDATE customers SET full_name = ?, phone_number = ?, email = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&full_name)
        .bind(&phone_number)
        .bind(&email)
        .bind(now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let customer = fetch_customer(&mut tx, id).await?;
        tx.commit().await?;

        info!(id, by = actor.user_id, "Updated customer");
        Ok(CustomerView::for_viewer(customer, actor))
    }

    /// Gets a customer visible to the caller.
    pub async fn get_customer(&self, actor: &Actor, id: i64) -> DbResult<CustomerView> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;
        let customer = fetch_customer(&mut conn, id).await?;
        ensure_visible(&scope, customer.created_by_user_id, "Customer", id)?;
        Ok(CustomerView::for_viewer(customer, actor))
    }

    /// Lists the caller's customers, optionally filtered by name, phone or id.
    pub async fn list_customers(&self, actor: &Actor, search: Option<&str>) -> DbResult<Vec<CustomerView>> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM customers WHERE 1 = 1");
        push_scope(&mut qb, "created_by_user_id", &scope);
        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = format!("%{}%", term);
            qb.push(" AND (full_name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR phone_number LIKE ")
                .push_bind(pattern.clone())
                .push(" OR unique_id LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY created_at DESC, id DESC");

        let customers = qb.build_query_as::<Customer>().fetch_all(&mut *conn).await?;
        debug!(count = customers.len(), "Listed customers");
        Ok(customers
            .into_iter()
            .map(|c| CustomerView::for_viewer(c, actor))
            .collect())
    }

    /// Finds a customer in the caller's company by phone number.
    pub async fn find_by_phone(&self, actor: &Actor, phone_number: &str) -> DbResult<Option<CustomerView>> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;
        let customer: Option<Customer> = sqlx::query_as("SELECT * FROM customers WHERE phone_number = ?")
            .bind(phone_number.trim())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(customer
            .filter(|c| scope.contains(c.created_by_user_id))
            .map(|c| CustomerView::for_viewer(c, actor)))
    }

    /// Issues a new deletion code and records who asked for it.
    ///
    /// Only the creating staff member or a super admin may regenerate.
    pub async fn regenerate_deletion_code(&self, actor: &Actor, id: i64) -> DbResult<CustomerView> {
        let mut tx = self.pool.begin().await?;
        let scope = company_scope(&mut tx, actor).await?;
        let customer = fetch_customer(&mut tx, id).await?;
        ensure_visible(&scope, customer.created_by_user_id, "Customer", id)?;

        let allowed = actor.is_super_admin()
            || (actor.role.is_staff() && customer.created_by_user_id == actor.user_id);
        if !allowed {
            return Err(CoreError::forbidden("only the creating staff member may regenerate the code").into());
        }

        let code = deletion_code(&mut thread_rng());
        let at = now();
        sqlx::query("UPDATE customers SET deletion_code = ?, updated_at = ? WHERE id = ?")
            .bind(&code)
            .bind(at)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO customer_code_events (customer_id, staff_user_id, regenerated_by_user_id, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(customer.created_by_user_id)
        .bind(actor.user_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        let customer = fetch_customer(&mut tx, id).await?;
        tx.commit().await?;

        info!(customer_id = id, regenerated_by = actor.user_id, "Regenerated deletion code");
        Ok(CustomerView::for_viewer(customer, actor))
    }

    /// Regeneration audit trail of one customer.
    pub async fn code_events(&self, actor: &Actor, id: i64) -> DbResult<Vec<CustomerCodeEvent>> {
        self.get_customer(actor, id).await?;
        let events = sqlx::query_as("SELECT * FROM customer_code_events WHERE customer_id = ? ORDER BY id")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    /// Deletes a customer and everything recorded against them.
    pub async fn delete_customer(
        &self,
        actor: &Actor,
        id: i64,
        code: Option<&str>,
    ) -> DbResult<CustomerDeletion> {
        let mut tx = self.pool.begin().await?;
        let scope = company_scope(&mut tx, actor).await?;
        let customer = fetch_customer(&mut tx, id).await?;
        ensure_visible(&scope, customer.created_by_user_id, "Customer", id)?;
        if customer.phone_number == WALK_IN_CUSTOMER_PHONE {
            return Err(CoreError::Validation(ValidationError::InvalidFormat {
                field: "customer_id".to_string(),
                reason: "the walk-in customer cannot be deleted".to_string(),
            })
            .into());
        }

        let code_matches = code.map(str::trim) == Some(customer.deletion_code.as_str());
        match actor.role {
            Role::SuperAdmin => {}
            Role::Manager => {
                if !code_matches {
                    return Err(CoreError::InvalidDeletionCode.into());
                }
            }
            Role::ShopKeeper | Role::Repairer => {
                if customer.created_by_user_id != actor.user_id {
                    return Err(CoreError::forbidden("staff may only delete their own customers").into());
                }
                if !code_matches {
                    return Err(CoreError::InvalidDeletionCode.into());
                }
            }
        }

        let report = cascade_delete(&mut tx, &scope, id).await?;
        tx.commit().await?;

        info!(
            customer_id = id,
            by = actor.user_id,
            pos_sales = report.pos_sales,
            swaps = report.swaps,
            repairs = report.repairs,
            "Deleted customer"
        );
        Ok(report)
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

pub(crate) async fn fetch_customer(conn: &mut SqliteConnection, id: i64) -> DbResult<Customer> {
    sqlx::query_as("SELECT * FROM customers WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Customer", id))
}

/// Upserts the singleton walk-in customer and returns it.
pub(crate) async fn walk_in_customer(conn: &mut SqliteConnection, created_by: i64) -> DbResult<Customer> {
    let at = now();
    let code = deletion_code(&mut thread_rng());
    let inserted = sqlx::query(
        r#"
        INSERT INTO customers (
            full_name, phone_number, email, created_by_user_id,
            deletion_code, created_at, updated_at
        ) VALUES (?, ?, NULL, ?, ?, ?, ?)
        ON CONFLICT(phone_number) DO NOTHING
        "#,
    )
    .bind(WALK_IN_CUSTOMER_NAME)
    .bind(WALK_IN_CUSTOMER_PHONE)
    .bind(created_by)
    .bind(code)
    .bind(at)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    if inserted.rows_affected() == 1 {
        let id = inserted.last_insert_rowid();
        assign_unique_id(conn, "customers", id, &sequential_id(CUSTOMER_PREFIX, id)).await?;
        debug!(id, "Created walk-in customer");
    }

    let customer = sqlx::query_as("SELECT * FROM customers WHERE phone_number = ?")
        .bind(WALK_IN_CUSTOMER_PHONE)
        .fetch_one(&mut *conn)
        .await?;
    Ok(customer)
}

/// Runs `<head> ?` plus the company filter on `created_by_user_id`, then `tail`.
async fn execute_scoped(
    conn: &mut SqliteConnection,
    scope: &CompanyScope,
    head: &str,
    id: i64,
    tail: &str,
) -> DbResult<u64> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(head);
    qb.push_bind(id);
    push_scope(&mut qb, "created_by_user_id", scope);
    qb.push(tail);
    Ok(qb.build().execute(&mut *conn).await?.rows_affected())
}

async fn cascade_delete(conn: &mut SqliteConnection, scope: &CompanyScope, id: i64) -> DbResult<CustomerDeletion> {
    let mut report = CustomerDeletion {
        customer_id: id,
        ..Default::default()
    };

    execute_scoped(conn, scope, "UPDATE phones SET current_owner_id = NULL WHERE current_owner_id = ", id, "").await?;

    let mut history: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("DELETE FROM phone_ownership_history WHERE owner_id = ");
    history.push_bind(id);
    history.push(" AND phone_id IN (SELECT id FROM phones WHERE 1 = 1");
    push_scope(&mut history, "created_by_user_id", scope);
    history.push(")");
    history.build().execute(&mut *conn).await?;

    execute_scoped(
        conn,
        scope,
        "DELETE FROM pos_sale_items WHERE pos_sale_id IN (SELECT id FROM pos_sales WHERE customer_id = ",
        id,
        ")",
    )
    .await?;
    report.pos_sales = execute_scoped(conn, scope, "DELETE FROM pos_sales WHERE customer_id = ", id, "").await?;
    execute_scoped(conn, scope, "DELETE FROM product_sales WHERE customer_id = ", id, "").await?;
    execute_scoped(conn, scope, "DELETE FROM invoices WHERE customer_id = ", id, "").await?;

    let mut resales: QueryBuilder<'_, Sqlite> = QueryBuilder::new("DELETE FROM pending_resales WHERE (customer_id = ");
    resales.push_bind(id);
    resales.push(" OR swap_id IN (SELECT id FROM swaps WHERE customer_id = ");
    resales.push_bind(id);
    resales.push(") OR sale_id IN (SELECT id FROM sales WHERE customer_id = ");
    resales.push_bind(id);
    resales.push("))");
    push_scope(&mut resales, "created_by_user_id", scope);
    report.pending_resales = resales.build().execute(&mut *conn).await?.rows_affected();

    execute_scoped(
        conn,
        scope,
        "UPDATE phones SET swapped_from_id = NULL WHERE swapped_from_id IN (SELECT id FROM swaps WHERE customer_id = ",
        id,
        ")",
    )
    .await?;

    execute_scoped(
        conn,
        scope,
        "DELETE FROM repair_item_usages WHERE repair_id IN (SELECT id FROM repairs WHERE customer_id = ",
        id,
        ")",
    )
    .await?;
    report.repairs = execute_scoped(conn, scope, "DELETE FROM repairs WHERE customer_id = ", id, "").await?;
    report.sales = execute_scoped(conn, scope, "DELETE FROM sales WHERE customer_id = ", id, "").await?;
    report.swaps = execute_scoped(conn, scope, "DELETE FROM swaps WHERE customer_id = ", id, "").await?;

    sqlx::query("DELETE FROM customer_code_events WHERE customer_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    // Fails on a foreign key if another company still references the row.
    sqlx::query("DELETE FROM customers WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(report)
}

// =============================================================================
// Unit Tests
// =============================================================================
