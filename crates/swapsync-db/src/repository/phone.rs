//! # Phone Repository
//!
//! Serialised handsets. Every phone row is one physical device, and every
//! change of hands is appended to `phone_ownership_history`.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   intake / trade-in                                                     │
//! │         │                                                               │
//! │         ▼                                                               │
//! │    ┌──────────┐   sale    ┌────────┐                                    │
//! │    │available │──────────►│  sold  │                                    │
//! │    └──────────┘           └────────┘                                    │
//! │      │  ▲    │   swap     ┌─────────┐                                   │
//! │      │  │    └───────────►│ swapped │                                   │
//! │      │  │                 └─────────┘                                   │
//! │      ▼  │ completed / cancelled                                         │
//! │  ┌────────────┐                                                         │
//! │  │under_repair│                                                         │
//! │  └────────────┘                                                         │
//! │                                                                         │
//! │  is_available == (status == available), enforced by a CHECK             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use swapsync_core::identifiers::{sequential_id, PHONE_PREFIX};
use swapsync_core::money::Money;
use swapsync_core::validation::{validate_imei, validate_non_negative, validate_optional, validate_required};
use swapsync_core::{
    Action, Actor, ChangeReason, CoreError, OwnerType, Phone, PhoneOwnershipHistory, PhoneSpecs,
    PhoneStatus,
};

use crate::error::{DbError, DbResult};
use crate::repository::catalog::find_or_create_brand;
use crate::repository::user::company_scope;
use crate::repository::{assign_unique_id, ensure_visible, now, push_scope};

/// Input for [`PhoneRepository::create_phone`].
#[derive(Debug, Clone)]
pub struct NewPhone {
    pub brand: String,
    pub model: String,
    pub imei: Option<String>,
    pub condition: String,
    /// Selling price.
    pub value: Money,
    pub cost_price: Money,
    pub specs: PhoneSpecs,
    pub category_id: Option<i64>,
}

/// Partial update of a phone's description and prices.
#[derive(Debug, Clone, Default)]
pub struct PhoneUpdate {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub imei: Option<String>,
    pub condition: Option<String>,
    pub value: Option<Money>,
    pub cost_price: Option<Money>,
    pub specs: Option<PhoneSpecs>,
    pub category_id: Option<i64>,
}

/// Filters for [`PhoneRepository::search_available`].
#[derive(Debug, Clone, Default)]
pub struct PhoneSearch {
    /// Matched against brand, model, IMEI and unique id.
    pub q: Option<String>,
    pub category_id: Option<i64>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    pub condition: Option<String>,
}

/// Outcome of [`PhoneRepository::bulk_delete`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkDeleteReport {
    pub deleted: Vec<i64>,
    pub skipped: Vec<(i64, String)>,
}

/// Repository for phones.
#[derive(Debug, Clone)]
pub struct PhoneRepository {
    pool: SqlitePool,
}

impl PhoneRepository {
    /// Creates a new PhoneRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PhoneRepository { pool }
    }

    /// Stocks a phone and records its intake.
    pub async fn create_phone(&self, actor: &Actor, new: NewPhone) -> DbResult<Phone> {
        actor.authorize(Action::ManagePhones)?;
        let mut tx = self.pool.begin().await?;
        let phone = insert_phone(&mut tx, &new, actor.user_id, ChangeReason::Intake, None).await?;
        tx.commit().await?;

        info!(id = phone.id, unique_id = %phone.unique_id, "Created phone");
        Ok(phone)
    }

    pub async fn update_phone(&self, actor: &Actor, id: i64, update: PhoneUpdate) -> DbResult<Phone> {
        actor.authorize(Action::ManagePhones)?;
        let mut tx = self.pool.begin().await?;
        let scope = company_scope(&mut tx, actor).await?;
        let current = fetch_phone(&mut tx, id).await?;
        ensure_visible(&scope, current.created_by_user_id, "Phone", id)?;

        let (brand, brand_id) = match update.brand {
            Some(brand) => {
                let brand = find_or_create_brand(&mut tx, &brand).await?;
                (brand.name, Some(brand.id))
            }
            None => (current.brand, current.brand_id),
        };
        let model = match update.model {
            Some(model) => validate_required("model", &model, 100)?,
            None => current.model,
        };
        let imei = match update.imei {
            Some(imei) if imei.trim().is_empty() => None,
            Some(imei) => Some(validate_imei(&imei)?),
            None => current.imei,
        };
        let condition = match update.condition {
            Some(condition) => validate_required("condition", &condition, 50)?,
            None => current.condition,
        };
        let value = update.value.unwrap_or(current.value);
        let cost_price = update.cost_price.unwrap_or(current.cost_price);
        validate_non_negative("value", value)?;
        validate_non_negative("cost_price", cost_price)?;
        let specs = update.specs.unwrap_or(current.specs);

        sqlx::query(
            r#"
            UPDATE phones SET
                brand = ?, brand_id = ?, model = ?, imei = ?, condition = ?,
                value = ?, cost_price = ?, specs = ?, category_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&brand)
        .bind(brand_id)
        .bind(&model)
        .bind(&imei)
        .bind(&condition)
        .bind(value)
        .bind(cost_price)
        .bind(Json(&specs))
        .bind(update.category_id.or(current.category_id))
        .bind(now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let phone = fetch_phone(&mut tx, id).await?;
        tx.commit().await?;
        debug!(id, "Updated phone");
        Ok(phone)
    }

    /// Sets the status by hand; `is_available` follows.
    ///
    /// Returning a phone to `available` also hands it back to the shop.
    pub async fn set_status(&self, actor: &Actor, id: i64, status: PhoneStatus) -> DbResult<Phone> {
        actor.authorize(Action::ManagePhones)?;
        let mut tx = self.pool.begin().await?;
        let scope = company_scope(&mut tx, actor).await?;
        let current = fetch_phone(&mut tx, id).await?;
        ensure_visible(&scope, current.created_by_user_id, "Phone", id)?;

        let (owner_type, owner_id) = match status {
            PhoneStatus::Available => (OwnerType::Shop, None),
            PhoneStatus::UnderRepair => (OwnerType::Repair, current.current_owner_id),
            PhoneStatus::Sold | PhoneStatus::Swapped => {
                (current.current_owner_type, current.current_owner_id)
            }
        };
        set_phone_state(&mut tx, id, status, owner_type, owner_id).await?;

        let phone = fetch_phone(&mut tx, id).await?;
        tx.commit().await?;
        info!(id, from = %current.status, to = %status, "Changed phone status");
        Ok(phone)
    }

    pub async fn get_phone(&self, actor: &Actor, id: i64) -> DbResult<Phone> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;
        let phone = fetch_phone(&mut conn, id).await?;
        ensure_visible(&scope, phone.created_by_user_id, "Phone", id)?;
        Ok(phone)
    }

    /// Lists the caller's phones, optionally in one status.
    pub async fn list_phones(&self, actor: &Actor, status: Option<PhoneStatus>) -> DbResult<Vec<Phone>> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM phones WHERE 1 = 1");
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status);
        }
        push_scope(&mut qb, "created_by_user_id", &scope);
        qb.push(" ORDER BY created_at DESC, id DESC");

        let phones = qb.build_query_as::<Phone>().fetch_all(&mut *conn).await?;
        Ok(phones)
    }

    /// Available phones matching the filters, cheapest first.
    pub async fn search_available(&self, actor: &Actor, search: PhoneSearch) -> DbResult<Vec<Phone>> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;

        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT * FROM phones WHERE status = 'available'");
        if let Some(q) = search.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = format!("%{}%", q);
            qb.push(" AND (brand LIKE ")
                .push_bind(pattern.clone())
                .push(" OR model LIKE ")
                .push_bind(pattern.clone())
                .push(" OR imei LIKE ")
                .push_bind(pattern.clone())
                .push(" OR unique_id LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(category_id) = search.category_id {
            qb.push(" AND category_id = ").push_bind(category_id);
        }
        if let Some(min) = search.min_price {
            qb.push(" AND value >= ").push_bind(min);
        }
        if let Some(max) = search.max_price {
            qb.push(" AND value <= ").push_bind(max);
        }
        if let Some(condition) = search.condition.filter(|c| !c.trim().is_empty()) {
            qb.push(" AND condition = ")
                .push_bind(condition.trim().to_string())
                .push(" COLLATE NOCASE");
        }
        push_scope(&mut qb, "created_by_user_id", &scope);
        qb.push(" ORDER BY value ASC, id ASC");

        let phones = qb.build_query_as::<Phone>().fetch_all(&mut *conn).await?;
        debug!(count = phones.len(), "Searched available phones");
        Ok(phones)
    }

    /// Ownership trail of one phone, oldest first.
    pub async fn ownership_history(&self, actor: &Actor, id: i64) -> DbResult<Vec<PhoneOwnershipHistory>> {
        self.get_phone(actor, id).await?;
        let history = sqlx::query_as("SELECT * FROM phone_ownership_history WHERE phone_id = ? ORDER BY id")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(history)
    }

    /// Deletes a phone that no transaction references.
    pub async fn delete_phone(&self, actor: &Actor, id: i64) -> DbResult<()> {
        actor.authorize(Action::ManagePhones)?;
        let mut tx = self.pool.begin().await?;
        let scope = company_scope(&mut tx, actor).await?;
        let phone = fetch_phone(&mut tx, id).await?;
        ensure_visible(&scope, phone.created_by_user_id, "Phone", id)?;

        delete_unreferenced(&mut tx, &phone).await?;
        tx.commit().await?;

        info!(id, unique_id = %phone.unique_id, by = actor.user_id, "Deleted phone");
        Ok(())
    }

    /// Deletes each phone independently; blocked or invisible ones are skipped.
    pub async fn bulk_delete(&self, actor: &Actor, ids: &[i64]) -> DbResult<BulkDeleteReport> {
        actor.authorize(Action::ManagePhones)?;
        let mut report = BulkDeleteReport::default();

        for &id in ids {
            match self.delete_phone(actor, id).await {
                Ok(()) => report.deleted.push(id),
                Err(err @ (DbError::Domain(_) | DbError::NotFound { .. })) => {
                    report.skipped.push((id, err.to_string()));
                }
                Err(err) => return Err(err),
            }
        }

        if !report.skipped.is_empty() {
            warn!(skipped = report.skipped.len(), "Bulk delete skipped phones");
        }
        Ok(report)
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

pub(crate) async fn fetch_phone(conn: &mut SqliteConnection, id: i64) -> DbResult<Phone> {
    sqlx::query_as("SELECT * FROM phones WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Phone", id))
}

/// Fails unless the phone can leave the shop.
pub(crate) fn ensure_available(phone: &Phone) -> DbResult<()> {
    if phone.status.is_available() {
        Ok(())
    } else {
        Err(CoreError::PhoneNotAvailable {
            phone: phone.unique_id.clone(),
            status: phone.status.to_string(),
        }
        .into())
    }
}

/// Validates and inserts a shop-owned phone, with one history row.
pub(crate) async fn insert_phone(
    conn: &mut SqliteConnection,
    new: &NewPhone,
    created_by: i64,
    reason: ChangeReason,
    transaction_id: Option<i64>,
) -> DbResult<Phone> {
    let brand = find_or_create_brand(conn, &new.brand).await?;
    let model = validate_required("model", &new.model, 100)?;
    let condition = validate_required("condition", &new.condition, 50)?;
    let imei = match validate_optional("imei", new.imei.as_deref(), 32)? {
        Some(imei) => Some(validate_imei(&imei)?),
        None => None,
    };
    validate_non_negative("value", new.value)?;
    validate_non_negative("cost_price", new.cost_price)?;

    let created_at = now();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO phones (
            brand, model, imei, condition, value, cost_price, specs,
            category_id, brand_id, status, is_available, current_owner_type,
            created_by_user_id, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'available', 1, 'shop', ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&brand.name)
    .bind(&model)
    .bind(&imei)
    .bind(&condition)
    .bind(new.value)
    .bind(new.cost_price)
    .bind(Json(&new.specs))
    .bind(new.category_id)
    .bind(brand.id)
    .bind(created_by)
    .bind(created_at)
    .bind(created_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } => {
            DbError::duplicate(field, imei.clone().unwrap_or_default())
        }
        other => other,
    })?;

    assign_unique_id(conn, "phones", id, &sequential_id(PHONE_PREFIX, id)).await?;
    record_ownership(conn, id, None, OwnerType::Shop, reason, transaction_id).await?;
    fetch_phone(conn, id).await
}

/// Moves a phone to `status`, keeping `is_available` in step.
pub(crate) async fn set_phone_state(
    conn: &mut SqliteConnection,
    id: i64,
    status: PhoneStatus,
    owner_type: OwnerType,
    owner_id: Option<i64>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE phones SET
            status = ?, is_available = ?, current_owner_type = ?,
            current_owner_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status)
    .bind(status.is_available())
    .bind(owner_type)
    .bind(owner_id)
    .bind(now())
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Appends one ownership history row.
pub(crate) async fn record_ownership(
    conn: &mut SqliteConnection,
    phone_id: i64,
    owner_id: Option<i64>,
    owner_type: OwnerType,
    reason: ChangeReason,
    transaction_id: Option<i64>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO phone_ownership_history (
            phone_id, owner_id, owner_type, change_reason, transaction_id, change_date
        ) VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(phone_id)
    .bind(owner_id)
    .bind(owner_type)
    .bind(reason)
    .bind(transaction_id)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn delete_unreferenced(conn: &mut SqliteConnection, phone: &Phone) -> DbResult<()> {
    let checks: [(&str, &str); 4] = [
        ("sales", "SELECT COUNT(*) FROM sales WHERE phone_id = ?1"),
        (
            "swaps",
            "SELECT COUNT(*) FROM swaps WHERE new_phone_id = ?1 OR given_phone_id = ?1",
        ),
        (
            "pending resales",
            "SELECT COUNT(*) FROM pending_resales WHERE sold_phone_id = ?1 OR incoming_phone_id = ?1",
        ),
        ("repairs", "SELECT COUNT(*) FROM repairs WHERE phone_id = ?1"),
    ];

    let mut dependents = Vec::new();
    for (label, sql) in checks {
        let count: i64 = sqlx::query_scalar(sql).bind(phone.id).fetch_one(&mut *conn).await?;
        if count > 0 {
            dependents.push(format!("{} {}", count, label));
        }
    }
    if !dependents.is_empty() {
        return Err(CoreError::HasDependents {
            entity: "Phone".to_string(),
            id: phone.unique_id.clone(),
            dependents,
        }
        .into());
    }

    sqlx::query("DELETE FROM phones WHERE id = ?")
        .bind(phone.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
