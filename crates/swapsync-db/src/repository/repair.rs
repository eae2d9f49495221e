//! # Repair Engine
//!
//! Repair jobs, the parts they consume, and their status machine.
//!
//! ## Status Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Pending ──► In Progress ──► Completed ──► Delivered                    │
//! │     │             │              │          (terminal)                  │
//! │     └─────────────┴──────────────┴──► Cancelled (terminal)              │
//! │                                                                         │
//! │  entering Completed (or Delivered straight from before it):             │
//! │      phone back to the shop + RepairCompleted SMS                       │
//! │  entering Cancelled:                                                    │
//! │      phone back to the shop, parts optionally restocked                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cost
//! `cost == service_cost + items_cost` is enforced by a CHECK constraint;
//! every parts change recomputes `items_cost` from the usages.

use chrono::{DateTime, Duration, Utc};
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};

use swapsync_core::identifiers::{repair_tracking_code, sequential_id, REPAIR_PREFIX};
use swapsync_core::money::Money;
use swapsync_core::repair::plan_transition;
use swapsync_core::validation::{validate_non_negative, validate_optional, validate_quantity, validate_required};
use swapsync_core::{
    Action, Actor, ChangeReason, CoreError, Notification, NotificationSink, OwnerType, PhoneStatus,
    Repair, RepairItemUsage, RepairStatus, REPAIR_DUE_WINDOW_HOURS,
};

use crate::error::{DbError, DbResult};
use crate::repository::customer::fetch_customer;
use crate::repository::phone::{fetch_phone, record_ownership, set_phone_state};
use crate::repository::product::{fetch_product, restore_stock, take_stock};
use crate::repository::user::{company_display_name, company_manager, company_scope, resolve_sms_sender};
use crate::repository::{assign_unique_id, ensure_visible, now, push_scope};

/// Tracking-code draws before giving up.
const MAX_TRACKING_ATTEMPTS: usize = 5;

/// `notification_type` of the due-soon notice.
pub const REPAIR_DUE_NOTIFICATION: &str = "repair_due";

/// A part requested at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPart {
    pub product_id: i64,
    pub quantity: i64,
}

/// Input for [`RepairRepository::create_repair`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRepair {
    pub customer_id: i64,
    /// A stocked phone taken in for repair.
    pub phone_id: Option<i64>,
    /// Required unless `phone_id` is given.
    pub phone_description: Option<String>,
    pub issue_description: String,
    #[serde(default)]
    pub service_cost: Money,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<RepairPart>,
}

/// Editable repair fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepairUpdate {
    pub phone_description: Option<String>,
    pub issue_description: Option<String>,
    pub diagnosis: Option<String>,
    pub service_cost: Option<Money>,
    pub due_date: Option<DateTime<Utc>>,
    /// Removes the due date. Ignored when `due_date` is set.
    #[serde(default)]
    pub clear_due_date: bool,
}

/// The repair engine.
#[derive(Debug, Clone)]
pub struct RepairRepository {
    pool: SqlitePool,
    notifier: Arc<dyn NotificationSink>,
}

impl RepairRepository {
    /// Creates a new RepairRepository.
    pub fn new(pool: SqlitePool, notifier: Arc<dyn NotificationSink>) -> Self {
        RepairRepository { pool, notifier }
    }

    /// Opens a repair job assigned to the caller.
    pub async fn create_repair(&self, actor: &Actor, new: NewRepair) -> DbResult<Repair> {
        actor.authorize(Action::CreateRepair)?;
        let issue_description = validate_required("issue_description", &new.issue_description, 2000)?;
        validate_non_negative("service_cost", new.service_cost)?;

        let mut tx = self.pool.begin().await?;
        let scope = company_scope(&mut tx, actor).await?;
        let customer = fetch_customer(&mut tx, new.customer_id).await?;
        ensure_visible(&scope, customer.created_by_user_id, "Customer", customer.id)?;

        let phone = match new.phone_id {
            Some(phone_id) => {
                let phone = fetch_phone(&mut tx, phone_id).await?;
                ensure_visible(&scope, phone.created_by_user_id, "Phone", phone_id)?;
                if phone.status != PhoneStatus::Available {
                    return Err(CoreError::PhoneNotAvailable {
                        phone: phone.unique_id,
                        status: phone.status.to_string(),
                    }
                    .into());
                }
                Some(phone)
            }
            None => None,
        };
        let phone_description = match validate_optional("phone_description", new.phone_description.as_deref(), 200)? {
            Some(description) => description,
            None => match &phone {
                Some(phone) => phone.description(),
                None => return Err(swapsync_core::ValidationError::required("phone_description").into()),
            },
        };

        let tracking_code = unused_tracking_code(&mut tx).await?;
        let created_at = now();
        let repair_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO repairs (
                tracking_code, customer_id, phone_id, phone_description, issue_description,
                service_cost, items_cost, cost, status, due_date, notify_sent,
                staff_id, created_by_user_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, 0, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&tracking_code)
        .bind(customer.id)
        .bind(new.phone_id)
        .bind(&phone_description)
        .bind(&issue_description)
        .bind(new.service_cost)
        .bind(new.service_cost)
        .bind(RepairStatus::Pending)
        .bind(new.due_date)
        .bind(actor.user_id)
        .bind(actor.user_id)
        .bind(created_at)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await?;

        let unique_id = sequential_id(REPAIR_PREFIX, repair_id);
        assign_unique_id(&mut tx, "repairs", repair_id, &unique_id).await?;

        if let Some(phone) = &phone {
            set_phone_state(&mut tx, phone.id, PhoneStatus::UnderRepair, OwnerType::Repair, phone.current_owner_id)
                .await?;
            record_ownership(
                &mut tx,
                phone.id,
                phone.current_owner_id,
                OwnerType::Repair,
                ChangeReason::RepairIntake,
                Some(repair_id),
            )
            .await?;
        }

        for part in &new.items {
            use_part(&mut tx, &scope, repair_id, part.product_id, part.quantity, actor.user_id).await?;
        }
        recompute_cost(&mut tx, repair_id).await?;

        let repair = fetch_repair(&mut tx, repair_id).await?;
        tx.commit().await?;

        info!(
            repair_id,
            unique_id = %unique_id,
            tracking_code = %tracking_code,
            parts = new.items.len(),
            cost = %repair.cost,
            "Opened repair"
        );
        Ok(repair)
    }

    /// Edits descriptions, diagnosis, service cost or due date.
    pub async fn update_repair(&self, actor: &Actor, id: i64, update: RepairUpdate) -> DbResult<Repair> {
        let mut tx = self.pool.begin().await?;
        let repair = self.load_for_mutation(&mut tx, actor, id).await?;

        let phone_description = match update.phone_description {
            Some(d) => validate_required("phone_description", &d, 200)?,
            None => repair.phone_description,
        };
        let issue_description = match update.issue_description {
            Some(d) => validate_required("issue_description", &d, 2000)?,
            None => repair.issue_description,
        };
        let diagnosis = match update.diagnosis {
            Some(d) => validate_optional("diagnosis", Some(d.as_str()), 2000)?,
            None => repair.diagnosis,
        };
        let service_cost = update.service_cost.unwrap_or(repair.service_cost);
        validate_non_negative("service_cost", service_cost)?;
        let due_date = match (update.due_date, update.clear_due_date) {
            (Some(due), _) => Some(due),
            (None, true) => None,
            (None, false) => repair.due_date,
        };
        // A new due date earns a new reminder.
        let notify_sent = repair.notify_sent && due_date == repair.due_date;

        sqlx::query(
            r#"
            UPDATE repairs SET
                phone_description = ?, issue_description = ?, diagnosis = ?,
                service_cost = ?, cost = ? + items_cost,
                due_date = ?, notify_sent = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&phone_description)
        .bind(&issue_description)
        .bind(&diagnosis)
        .bind(service_cost)
        .bind(service_cost)
        .bind(due_date)
        .bind(notify_sent)
        .bind(now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let repair = fetch_repair(&mut tx, id).await?;
        tx.commit().await?;
        debug!(id, cost = %repair.cost, "Updated repair");
        Ok(repair)
    }

    /// Consumes a part for an open repair.
    pub async fn add_repair_item(
        &self,
        actor: &Actor,
        repair_id: i64,
        product_id: i64,
        quantity: i64,
    ) -> DbResult<RepairItemUsage> {
        let mut tx = self.pool.begin().await?;
        let repair = self.load_for_mutation(&mut tx, actor, repair_id).await?;
        let scope = company_scope(&mut tx, actor).await?;

        let usage_id = use_part(&mut tx, &scope, repair.id, product_id, quantity, actor.user_id).await?;
        recompute_cost(&mut tx, repair.id).await?;
        let usage = fetch_usage(&mut tx, usage_id).await?;
        tx.commit().await?;

        info!(repair_id, product_id, quantity, "Added repair part");
        Ok(usage)
    }

    /// Returns a part to stock.
    pub async fn remove_repair_item(&self, actor: &Actor, usage_id: i64) -> DbResult<Repair> {
        let mut tx = self.pool.begin().await?;
        let usage = fetch_usage(&mut tx, usage_id).await?;
        let repair = self.load_for_mutation(&mut tx, actor, usage.repair_id).await?;

        restore_stock(
            &mut tx,
            usage.product_id,
            usage.quantity,
            usage.unit_cost,
            ("repair", repair.id),
            actor.user_id,
        )
        .await?;
        sqlx::query("DELETE FROM repair_item_usages WHERE id = ?")
            .bind(usage_id)
            .execute(&mut *tx)
            .await?;
        recompute_cost(&mut tx, repair.id).await?;

        let repair = fetch_repair(&mut tx, repair.id).await?;
        tx.commit().await?;
        info!(repair_id = repair.id, usage_id, "Removed repair part");
        Ok(repair)
    }

    /// Moves a repair along its status machine.
    ///
    /// `restore_parts` only matters when cancelling: the usages are deleted
    /// and their units restocked.
    pub async fn update_repair_status(
        &self,
        actor: &Actor,
        id: i64,
        new_status: RepairStatus,
        restore_parts: bool,
    ) -> DbResult<Repair> {
        let mut tx = self.pool.begin().await?;
        let repair = self.load_for_mutation(&mut tx, actor, id).await?;
        let effects = plan_transition(&repair.unique_id, repair.status, new_status)?;

        sqlx::query("UPDATE repairs SET status = ?, updated_at = ? WHERE id = ?")
            .bind(new_status)
            .bind(now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if effects.release_phone {
            if let Some(phone_id) = repair.phone_id {
                let reason = if effects.cancelled {
                    ChangeReason::RepairCancelled
                } else {
                    ChangeReason::RepairCompleted
                };
                release_phone(&mut tx, phone_id, reason, id).await?;
            }
        }

        if effects.cancelled && restore_parts {
            let usages = fetch_usages(&mut tx, id).await?;
            for usage in &usages {
                restore_stock(
                    &mut tx,
                    usage.product_id,
                    usage.quantity,
                    usage.unit_cost,
                    ("repair", id),
                    actor.user_id,
                )
                .await?;
            }
            sqlx::query("DELETE FROM repair_item_usages WHERE repair_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            recompute_cost(&mut tx, id).await?;
            debug!(id, parts = usages.len(), "Restocked parts of cancelled repair");
        }

        let notification = if effects.notify_completed {
            let customer = fetch_customer(&mut tx, repair.customer_id).await?;
            let updated = fetch_repair(&mut tx, id).await?;
            Some(Notification::RepairCompleted {
                repair_id: id,
                tracking_code: updated.tracking_code.clone(),
                phone_number: customer.phone_number,
                customer_name: customer.full_name,
                sender: resolve_sms_sender(&mut tx, repair.created_by_user_id).await?,
                company_name: company_display_name(&mut tx, repair.created_by_user_id).await?,
                phone_description: updated.phone_description.clone(),
                cost: updated.cost,
            })
        } else {
            None
        };

        let repair = fetch_repair(&mut tx, id).await?;
        tx.commit().await?;

        info!(id, status = %new_status, by = actor.user_id, "Changed repair status");
        if let Some(notification) = notification {
            self.notifier.publish(notification);
        }
        Ok(repair)
    }

    /// Queues in-app reminders for open repairs due within the window.
    ///
    /// Each repair is handled in its own transaction; a failure is logged
    /// and the scan continues. Returns the number of repairs notified.
    pub async fn notify_due_repairs(&self, now: DateTime<Utc>) -> DbResult<usize> {
        let horizon = now + Duration::hours(REPAIR_DUE_WINDOW_HOURS);
        let due: Vec<Repair> = sqlx::query_as(
            r#"
            SELECT * FROM repairs
            WHERE notify_sent = 0
              AND due_date IS NOT NULL
              AND due_date <= ?
              AND status IN ('Pending', 'In Progress')
            ORDER BY due_date
            "#,
        )
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;

        let mut notified = 0;
        for repair in &due {
            match self.notify_one(repair, now).await {
                Ok(true) => notified += 1,
                Ok(false) => {}
                Err(err) => warn!(repair_id = repair.id, error = %err, "Due-soon reminder failed"),
            }
        }

        if notified > 0 {
            info!(notified, "Sent due-soon repair reminders");
        }
        Ok(notified)
    }

    async fn notify_one(&self, repair: &Repair, now: DateTime<Utc>) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE repairs SET notify_sent = 1, notify_at = ? WHERE id = ? AND notify_sent = 0",
        )
        .bind(now)
        .bind(repair.id)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            return Ok(false);
        }

        let mut recipients = vec![repair.staff_id];
        if let Some(manager) = company_manager(&mut tx, repair.staff_id).await? {
            if manager.id != repair.staff_id {
                recipients.push(manager.id);
            }
        }

        let due = repair
            .due_date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let message = format!(
            "Repair {} ({}) is due {}.",
            repair.tracking_code, repair.phone_description, due
        );
        for user_id in recipients {
            sqlx::query(
                r#"
                INSERT INTO user_notifications (
                    user_id, title, message, notification_type, reference_id, is_read, created_at
                ) VALUES (?, ?, ?, ?, ?, 0, ?)
                "#,
            )
            .bind(user_id)
            .bind("Repair due soon")
            .bind(&message)
            .bind(REPAIR_DUE_NOTIFICATION)
            .bind(repair.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    pub async fn get_repair(&self, actor: &Actor, id: i64) -> DbResult<Repair> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;
        let repair = fetch_repair(&mut conn, id).await?;
        ensure_visible(&scope, repair.created_by_user_id, "Repair", id)?;
        Ok(repair)
    }

    /// Public lookup by the code printed on the ticket.
    pub async fn get_by_tracking_code(&self, tracking_code: &str) -> DbResult<Repair> {
        let code = tracking_code.trim().to_ascii_uppercase();
        sqlx::query_as("SELECT * FROM repairs WHERE tracking_code = ?")
            .bind(&code)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Repair", code))
    }

    /// Lists the caller's repairs, newest first. Repairers see only their own.
    pub async fn list_repairs(
        &self,
        actor: &Actor,
        status: Option<RepairStatus>,
        skip: i64,
        limit: i64,
    ) -> DbResult<Vec<Repair>> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM repairs WHERE 1 = 1");
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status);
        }
        if actor.role == swapsync_core::Role::Repairer {
            qb.push(" AND staff_id = ").push_bind(actor.user_id);
        }
        push_scope(&mut qb, "created_by_user_id", &scope);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit.clamp(1, 500))
            .push(" OFFSET ")
            .push_bind(skip.max(0));

        let repairs = qb.build_query_as::<Repair>().fetch_all(&mut *conn).await?;
        Ok(repairs)
    }

    /// Parts used by a repair.
    pub async fn repair_items(&self, actor: &Actor, repair_id: i64) -> DbResult<Vec<RepairItemUsage>> {
        self.get_repair(actor, repair_id).await?;
        let mut conn = self.pool.acquire().await?;
        fetch_usages(&mut conn, repair_id).await
    }

    /// Visible, assigned to the caller if a repairer, and not closed.
    async fn load_for_mutation(&self, conn: &mut SqliteConnection, actor: &Actor, id: i64) -> DbResult<Repair> {
        let scope = company_scope(conn, actor).await?;
        let repair = fetch_repair(conn, id).await?;
        ensure_visible(&scope, repair.created_by_user_id, "Repair", id)?;
        actor.authorize_repair(repair.staff_id)?;
        if repair.status.is_terminal() {
            return Err(CoreError::Precondition(format!(
                "repair {} is {}",
                repair.unique_id, repair.status
            ))
            .into());
        }
        Ok(repair)
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn fetch_repair(conn: &mut SqliteConnection, id: i64) -> DbResult<Repair> {
    sqlx::query_as("SELECT * FROM repairs WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Repair", id))
}

async fn fetch_usage(conn: &mut SqliteConnection, id: i64) -> DbResult<RepairItemUsage> {
    sqlx::query_as("SELECT * FROM repair_item_usages WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Repair item", id))
}

async fn fetch_usages(conn: &mut SqliteConnection, repair_id: i64) -> DbResult<Vec<RepairItemUsage>> {
    let usages = sqlx::query_as("SELECT * FROM repair_item_usages WHERE repair_id = ? ORDER BY id")
        .bind(repair_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(usages)
}

/// Draws tracking codes until one is unused.
async fn unused_tracking_code(conn: &mut SqliteConnection) -> DbResult<String> {
    let today = now().date_naive();
    for _ in 0..MAX_TRACKING_ATTEMPTS {
        let code = repair_tracking_code(today, &mut thread_rng());
        let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM repairs WHERE tracking_code = ?")
            .bind(&code)
            .fetch_optional(&mut *conn)
            .await?;
        if taken.is_none() {
            return Ok(code);
        }
        debug!(code = %code, "Tracking code taken, drawing again");
    }
    Err(DbError::Internal("could not draw an unused tracking code".to_string()))
}

/// Takes a part from stock at its selling price and records the usage.
async fn use_part(
    conn: &mut SqliteConnection,
    scope: &swapsync_core::CompanyScope,
    repair_id: i64,
    product_id: i64,
    quantity: i64,
    created_by: i64,
) -> DbResult<i64> {
    validate_quantity(quantity)?;
    let product = fetch_product(conn, product_id).await?;
    ensure_visible(scope, product.created_by_user_id, "Product", product_id)?;
    if !product.is_active {
        return Err(CoreError::ProductInactive(product.name).into());
    }

    take_stock(conn, &product, quantity, product.selling_price, ("repair", repair_id), created_by).await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO repair_item_usages (repair_id, product_id, quantity, unit_cost, total_cost, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(repair_id)
    .bind(product_id)
    .bind(quantity)
    .bind(product.selling_price)
    .bind(product.selling_price * quantity)
    .bind(now())
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

/// `items_cost = Σ usages`, `cost = service_cost + items_cost`.
async fn recompute_cost(conn: &mut SqliteConnection, repair_id: i64) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE repairs SET
            items_cost = (SELECT COALESCE(SUM(total_cost), 0) FROM repair_item_usages WHERE repair_id = ?1),
            cost = service_cost
                + (SELECT COALESCE(SUM(total_cost), 0) FROM repair_item_usages WHERE repair_id = ?1),
            updated_at = ?2
        WHERE id = ?1
        "#,
    )
    .bind(repair_id)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Hands a phone under repair back to the shop.
async fn release_phone(
    conn: &mut SqliteConnection,
    phone_id: i64,
    reason: ChangeReason,
    repair_id: i64,
) -> DbResult<()> {
    let phone = fetch_phone(conn, phone_id).await?;
    if phone.status != PhoneStatus::UnderRepair {
        // Already moved on by hand.
        return Ok(());
    }
    set_phone_state(conn, phone_id, PhoneStatus::Available, OwnerType::Shop, None).await?;
    record_ownership(conn, phone_id, None, OwnerType::Shop, reason, Some(repair_id)).await
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{company, company_with, new_customer, new_phone, new_product, Company};
    use crate::{Database, DbConfig};
    use swapsync_core::RecordingSink;

    struct Shop {
        c: Company,
        sink: Arc<RecordingSink>,
        customer_id: i64,
        part_id: i64,
    }

    async fn shop() -> Shop {
        let sink = Arc::new(RecordingSink::new());
        let db = Database::new(DbConfig::in_memory()).await.unwrap().with_notifier(sink.clone());
        let c = company_with(db).await;
        let customer_id = c
            .db
            .customers()
            .create_customer(&c.repairer, new_customer("Yaw", "0271234567"))
            .await
            .unwrap()
            .customer
            .id;
        let part_id = c
            .db
            .products()
            .create_product(&c.manager, new_product("Screen", c.category_id, 120, 5))
            .await
            .unwrap()
            .id;
        Shop {
            c,
            sink,
            customer_id,
            part_id,
        }
    }

    fn intake(customer_id: i64, parts: Vec<RepairPart>) -> NewRepair {
        NewRepair {
            customer_id,
            phone_description: Some("Samsung A14".into()),
            issue_description: "Cracked screen".into(),
            service_cost: Money::from_major(80),
            items: parts,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_with_parts() {
        let s = shop().await;
        let repair = s
            .c
            .db
            .repairs()
            .create_repair(
                &s.c.repairer,
                intake(s.customer_id, vec![RepairPart { product_id: s.part_id, quantity: 1 }]),
            )
            .await
            .unwrap();

        assert!(repair.unique_id.starts_with("RPR-"));
        assert!(repair.tracking_code.starts_with("REP-"));
        assert_eq!(repair.items_cost, Money::from_major(120));
        assert_eq!(repair.cost, Money::from_major(200));
        assert_eq!(repair.staff_id, s.c.repairer.user_id);

        let part = s.c.db.products().get_product(&s.c.manager, s.part_id).await.unwrap();
        assert_eq!(part.quantity, 4);

        let found = s.c.db.repairs().get_by_tracking_code(&repair.tracking_code.to_lowercase()).await.unwrap();
        assert_eq!(found.id, repair.id);
    }

    #[tokio::test]
    async fn test_lifecycle_with_phone_and_part() {
        let s = shop().await;
        let phone = s
            .c
            .db
            .phones()
            .create_phone(&s.c.manager, new_phone("Samsung", "A14", 1000))
            .await
            .unwrap();
        let repairs = s.c.db.repairs();
        let mut new = intake(s.customer_id, vec![RepairPart { product_id: s.part_id, quantity: 1 }]);
        new.phone_id = Some(phone.id);
        let repair = repairs.create_repair(&s.c.repairer, new).await.unwrap();

        assert_eq!(repair.service_cost, Money::from_major(80));
        assert_eq!(repair.items_cost, Money::from_major(120));
        assert_eq!(repair.cost, Money::from_major(200));
        assert_eq!(s.c.db.products().get_product(&s.c.manager, s.part_id).await.unwrap().quantity, 4);

        for status in [RepairStatus::InProgress, RepairStatus::Completed] {
            repairs
                .update_repair_status(&s.c.repairer, repair.id, status, false)
                .await
                .unwrap();
        }
        let done = repairs.get_repair(&s.c.manager, repair.id).await.unwrap();
        assert_eq!(done.status, RepairStatus::Completed);
        assert_eq!(done.cost, Money::from_major(200));
        assert_eq!(
            s.c.db.phones().get_phone(&s.c.manager, phone.id).await.unwrap().status,
            PhoneStatus::Available
        );
        assert_eq!(s.sink.len(), 1);
    }

    #[tokio::test]
    async fn test_parts_add_and_remove_recompute_cost() {
        let s = shop().await;
        let repairs = s.c.db.repairs();
        let repair = repairs.create_repair(&s.c.repairer, intake(s.customer_id, vec![])).await.unwrap();

        let usage = repairs.add_repair_item(&s.c.repairer, repair.id, s.part_id, 2).await.unwrap();
        assert_eq!(usage.total_cost, Money::from_major(240));
        let current = repairs.get_repair(&s.c.manager, repair.id).await.unwrap();
        assert_eq!(current.cost, Money::from_major(320));

        let after = repairs.remove_repair_item(&s.c.repairer, usage.id).await.unwrap();
        assert_eq!(after.items_cost, Money::ZERO);
        assert_eq!(after.cost, Money::from_major(80));
        assert_eq!(s.c.db.products().get_product(&s.c.manager, s.part_id).await.unwrap().quantity, 5);

        let err = repairs.add_repair_item(&s.c.repairer, repair.id, s.part_id, 6).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_completion_releases_phone_and_notifies() {
        let s = shop().await;
        let phone = s
            .c
            .db
            .phones()
            .create_phone(&s.c.manager, new_phone("Samsung", "A14", 1000))
            .await
            .unwrap();
        let repairs = s.c.db.repairs();
        let mut new = intake(s.customer_id, vec![]);
        new.phone_id = Some(phone.id);
        new.phone_description = None;
        let repair = repairs.create_repair(&s.c.repairer, new).await.unwrap();
        assert_eq!(repair.phone_description, "Samsung A14");

        let taken = s.c.db.phones().get_phone(&s.c.manager, phone.id).await.unwrap();
        assert_eq!(taken.status, PhoneStatus::UnderRepair);

        repairs
            .update_repair_status(&s.c.repairer, repair.id, RepairStatus::InProgress, false)
            .await
            .unwrap();
        repairs
            .update_repair_status(&s.c.repairer, repair.id, RepairStatus::Completed, false)
            .await
            .unwrap();

        let released = s.c.db.phones().get_phone(&s.c.manager, phone.id).await.unwrap();
        assert_eq!(released.status, PhoneStatus::Available);
        assert_eq!(s.sink.len(), 1);

        // Delivered after Completed does not text again.
        repairs
            .update_repair_status(&s.c.repairer, repair.id, RepairStatus::Delivered, false)
            .await
            .unwrap();
        assert_eq!(s.sink.len(), 1);

        let err = repairs
            .update_repair_status(&s.c.repairer, repair.id, RepairStatus::Cancelled, false)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_cancel_restores_parts() {
        let s = shop().await;
        let repairs = s.c.db.repairs();
        let repair = repairs
            .create_repair(
                &s.c.repairer,
                intake(s.customer_id, vec![RepairPart { product_id: s.part_id, quantity: 3 }]),
            )
            .await
            .unwrap();

        let cancelled = repairs
            .update_repair_status(&s.c.manager, repair.id, RepairStatus::Cancelled, true)
            .await
            .unwrap();
        assert_eq!(cancelled.items_cost, Money::ZERO);
        assert!(repairs.repair_items(&s.c.manager, repair.id).await.unwrap().is_empty());
        assert_eq!(s.c.db.products().get_product(&s.c.manager, s.part_id).await.unwrap().quantity, 5);
        assert!(s.sink.is_empty());
    }

    #[tokio::test]
    async fn test_backward_move_and_foreign_repairer_rejected() {
        let s = shop().await;
        let repairs = s.c.db.repairs();
        let repair = repairs.create_repair(&s.c.keeper, intake(s.customer_id, vec![])).await.unwrap();

        let err = repairs
            .update_repair_status(&s.c.repairer, repair.id, RepairStatus::InProgress, false)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        repairs
            .update_repair_status(&s.c.keeper, repair.id, RepairStatus::Completed, false)
            .await
            .unwrap();
        let err = repairs
            .update_repair_status(&s.c.keeper, repair.id, RepairStatus::InProgress, false)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_due_date_can_be_cleared() {
        let s = shop().await;
        let repairs = s.c.db.repairs();
        let mut new = intake(s.customer_id, vec![]);
        new.due_date = Some(Utc::now() + Duration::hours(2));
        let repair = repairs.create_repair(&s.c.repairer, new).await.unwrap();

        // Untouched when neither field is given
        let kept = repairs
            .update_repair(&s.c.repairer, repair.id, RepairUpdate::default())
            .await
            .unwrap();
        assert!(kept.due_date.is_some());

        let cleared = repairs
            .update_repair(
                &s.c.repairer,
                repair.id,
                RepairUpdate {
                    clear_due_date: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.due_date, None);
        assert_eq!(repairs.notify_due_repairs(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_notify_due_repairs_once() {
        let c = company().await;
        let customer_id = c
            .db
            .customers()
            .create_customer(&c.repairer, new_customer("Yaw", "0271234567"))
            .await
            .unwrap()
            .customer
            .id;
        let repairs = c.db.repairs();
        let soon = Utc::now() + Duration::hours(3);
        let later = Utc::now() + Duration::days(5);

        let mut due = intake(customer_id, vec![]);
        due.due_date = Some(soon);
        let due = repairs.create_repair(&c.repairer, due).await.unwrap();
        let mut not_due = intake(customer_id, vec![]);
        not_due.due_date = Some(later);
        repairs.create_repair(&c.repairer, not_due).await.unwrap();

        assert_eq!(repairs.notify_due_repairs(Utc::now()).await.unwrap(), 1);
        assert_eq!(repairs.notify_due_repairs(Utc::now()).await.unwrap(), 0);

        let repair = repairs.get_repair(&c.manager, due.id).await.unwrap();
        assert!(repair.notify_sent);
        assert!(repair.notify_at.is_some());

        let manager_inbox = c.db.notifications().list(&c.manager, false).await.unwrap();
        let tech_inbox = c.db.notifications().list(&c.repairer, false).await.unwrap();
        assert_eq!(manager_inbox.len(), 1);
        assert_eq!(tech_inbox.len(), 1);
        assert_eq!(tech_inbox[0].reference_id, Some(due.id));
    }
}
