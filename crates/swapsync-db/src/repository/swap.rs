//! # Swap Engine and Resale Tracker
//!
//! Phone-for-phone exchanges, the workbench of acquired trade-ins, and the
//! chain of swaps a phone came through.
//!
//! ## Swap Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  customer hands in "Tecno Spark 8" (value 400) + pays 900 for a A14     │
//! │                                                                         │
//! │  guard: 400 + (900 - discount) >= floor% of A14.value                   │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │  ├── INSERT swaps                     resale_status = pending           │
//! │  ├── trade-in has brand+model? ──► INSERT phones (available, trade_in)  │
//! │  ├── A14 ──► swapped, owner = customer, swapped_from_id = swap          │
//! │  ├── ownership history (swap)                                           │
//! │  ├── INSERT pending_resales           profit_status = pending           │
//! │  └── INSERT invoices                  INV-YYYYMMDD-NNNN                 │
//! │  COMMIT ──► SwapReceipt                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Profit Views
//! ```text
//!  PendingResale.profit_amount = resale + balance - sold_phone_value   (value at swap time)
//!  Swap.profit_or_loss         = resale + balance - new_phone.value    (value at settlement)
//! ```
//! They agree unless the phone was repriced in between.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use swapsync_core::identifiers::{invoice_number, sequential_id, RESALE_PREFIX};
use swapsync_core::money::Money;
use swapsync_core::pricing::{profit_status, resale_profit, SwapPolicy};
use swapsync_core::validation::{validate_non_negative, validate_optional, validate_required};
use swapsync_core::{
    Action, Actor, ChangeReason, CoreError, IncomingPhoneStatus, Invoice, InvoiceType,
    Notification, NotificationSink, OwnerType, PendingResale, PhoneStatus, ProfitStatus,
    ResaleOutcome, ResaleStatus, Swap, TransactionType,
};

use crate::error::{DbError, DbResult};
use crate::repository::customer::fetch_customer;
use crate::repository::phone::{
    ensure_available, fetch_phone, insert_phone, record_ownership, set_phone_state, NewPhone,
};
use crate::repository::user::{company_scope, resolve_sms_sender};
use crate::repository::{assign_unique_id, ensure_visible, now, push_scope};

/// The phone the customer hands in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GivenPhone {
    pub description: String,
    pub value: Money,
    pub imei: Option<String>,
    /// With `model`, stocks the trade-in as its own phone row.
    pub brand: Option<String>,
    pub model: Option<String>,
    pub condition: Option<String>,
}

/// Input for [`SwapRepository::create_swap`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSwap {
    pub customer_id: i64,
    pub new_phone_id: i64,
    pub given_phone: GivenPhone,
    pub balance_paid: Money,
    #[serde(default)]
    pub discount_amount: Money,
}

/// Everything a swap wrote.
#[derive(Debug, Clone, Serialize)]
pub struct SwapRecord {
    pub swap: Swap,
    pub pending_resale: PendingResale,
    pub invoice: Invoice,
    /// Earlier swap resale settled because the phone handed out was its trade-in.
    pub settled_trade_in: Option<PendingResale>,
}

/// One hop of a swap chain.
#[derive(Debug, Clone, Serialize)]
pub struct SwapLink {
    pub swap: Swap,
    /// Phone the customer left with.
    pub produced_phone_id: i64,
    /// Stocked trade-in the customer brought, if it was stocked.
    pub predecessor_phone_id: Option<i64>,
}

/// Resale outcomes over the caller's swaps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ProfitSummary {
    pub total_swaps: i64,
    pub pending_resales: i64,
    pub sold_resales: i64,
    pub lost_resales: i64,
    pub total_profit: Money,
    /// Magnitude of the losses.
    pub total_loss: Money,
    pub net: Money,
}

/// The swap engine.
#[derive(Debug, Clone)]
pub struct SwapRepository {
    pool: SqlitePool,
    notifier: Arc<dyn NotificationSink>,
    policy: SwapPolicy,
}

impl SwapRepository {
    /// Creates a new SwapRepository.
    pub fn new(pool: SqlitePool, notifier: Arc<dyn NotificationSink>, policy: SwapPolicy) -> Self {
        SwapRepository {
            pool,
            notifier,
            policy,
        }
    }

    /// Records a swap.
    ///
    /// ## Errors
    /// - new phone not available (400)
    /// - `balance_paid - discount < 0` (400)
    /// - trade-in plus cash below the policy floor (`SwapBelowFloor`, 400)
    pub async fn create_swap(&self, actor: &Actor, new: NewSwap) -> DbResult<SwapRecord> {
        actor.authorize(Action::RecordSwap)?;
        let description = validate_required("given_phone_description", &new.given_phone.description, 200)?;
        let given_imei = validate_optional("given_phone_imei", new.given_phone.imei.as_deref(), 32)?;

        let mut tx = self.pool.begin().await?;
        let scope = company_scope(&mut tx, actor).await?;
        let customer = fetch_customer(&mut tx, new.customer_id).await?;
        ensure_visible(&scope, customer.created_by_user_id, "Customer", customer.id)?;
        let new_phone = fetch_phone(&mut tx, new.new_phone_id).await?;
        ensure_visible(&scope, new_phone.created_by_user_id, "Phone", new_phone.id)?;
        ensure_available(&new_phone)?;

        let final_price = self.policy.quote(
            new_phone.value,
            new.given_phone.value,
            new.balance_paid,
            new.discount_amount,
        )?;

        let created_at = now();
        let swap_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO swaps (
                customer_id, given_phone_description, given_phone_value, given_phone_imei,
                new_phone_id, balance_paid, discount_amount, final_price,
                resale_status, resale_value, profit_or_loss, invoice_number, sms_sent,
                created_by_user_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', 0, 0, '', 0, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(customer.id)
        .bind(&description)
        .bind(new.given_phone.value)
        .bind(&given_imei)
        .bind(new_phone.id)
        .bind(new.balance_paid)
        .bind(new.discount_amount)
        .bind(final_price)
        .bind(actor.user_id)
        .bind(created_at)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await?;

        let trade_in = match trade_in_phone(&new.given_phone, given_imei.clone(), new_phone.category_id) {
            Some(phone) => {
                let phone = insert_phone(&mut tx, &phone, actor.user_id, ChangeReason::TradeIn, Some(swap_id)).await?;
                sqlx::query("UPDATE swaps SET given_phone_id = ? WHERE id = ?")
                    .bind(phone.id)
                    .bind(swap_id)
                    .execute(&mut *tx)
                    .await?;
                Some(phone)
            }
            None => None,
        };

        set_phone_state(&mut tx, new_phone.id, PhoneStatus::Swapped, OwnerType::Customer, Some(customer.id)).await?;
        sqlx::query("UPDATE phones SET swapped_from_id = ? WHERE id = ?")
            .bind(swap_id)
            .bind(new_phone.id)
            .execute(&mut *tx)
            .await?;
        record_ownership(
            &mut tx,
            new_phone.id,
            Some(customer.id),
            OwnerType::Customer,
            ChangeReason::Swap,
            Some(swap_id),
        )
        .await?;

        // A stocked trade-in going out again realises what this deal paid for it.
        let settled_trade_in =
            settle_open_trade_in(&mut tx, new_phone.id, new.given_phone.value + final_price).await?;

        let resale_id = insert_pending_resale(
            &mut tx,
            ResaleRow {
                sold_phone_id: new_phone.id,
                sold_phone_value: new_phone.value,
                incoming_phone_id: trade_in.as_ref().map(|p| p.id),
                incoming_phone_description: Some(description.clone()),
                incoming_phone_value: Some(new.given_phone.value),
                incoming_phone_imei: given_imei,
                incoming_phone_status: Some(IncomingPhoneStatus::Available),
                transaction_type: TransactionType::Swap,
                customer_id: customer.id,
                attending_staff_id: actor.user_id,
                balance_paid: new.balance_paid,
                discount_amount: new.discount_amount,
                final_price,
                profit_status: ProfitStatus::Pending,
                profit_amount: Money::ZERO,
                swap_id: Some(swap_id),
                sale_id: None,
                resale_value: None,
                created_by: actor.user_id,
                created_at,
                settled_at: None,
            },
        )
        .await?;

        let invoice = issue_invoice(
            &mut tx,
            InvoiceType::Swap,
            swap_id,
            customer.id,
            final_price,
            actor.user_id,
            created_at,
        )
        .await?;
        sqlx::query("UPDATE swaps SET invoice_number = ? WHERE id = ?")
            .bind(&invoice.invoice_number)
            .bind(swap_id)
            .execute(&mut *tx)
            .await?;

        let sender = resolve_sms_sender(&mut tx, actor.user_id).await?;
        let swap = fetch_swap(&mut tx, swap_id).await?;
        let pending_resale = fetch_resale(&mut tx, resale_id).await?;
        tx.commit().await?;

        info!(
            swap_id,
            invoice = %invoice.invoice_number,
            new_phone = %new_phone.unique_id,
            trade_in_stocked = trade_in.is_some(),
            trade_in_settled = settled_trade_in.is_some(),
            final_price = %final_price,
            "Recorded swap"
        );

        self.notifier.publish(Notification::SwapReceipt {
            swap_id,
            invoice_number: invoice.invoice_number.clone(),
            phone_number: customer.phone_number,
            customer_name: customer.full_name,
            sender,
            given_phone_description: description,
            new_phone_description: new_phone.description(),
            given_phone_value: new.given_phone.value,
            discount: new.discount_amount,
            final_price,
        });

        Ok(SwapRecord {
            swap,
            pending_resale,
            invoice,
            settled_trade_in,
        })
    }

    /// Settles a pending resale as sold or lost.
    pub async fn settle_pending_resale(
        &self,
        actor: &Actor,
        pending_resale_id: i64,
        resale_value: Money,
        outcome: ResaleOutcome,
    ) -> DbResult<PendingResale> {
        actor.authorize(Action::SettleResale)?;
        let mut tx = self.pool.begin().await?;
        let scope = company_scope(&mut tx, actor).await?;
        let resale = fetch_resale(&mut tx, pending_resale_id).await?;
        ensure_visible(&scope, resale.created_by_user_id, "Pending resale", pending_resale_id)?;

        settle_resale(&mut tx, &resale, resale_value, outcome, true).await?;
        let settled = fetch_resale(&mut tx, pending_resale_id).await?;
        tx.commit().await?;

        info!(
            resale = %settled.unique_id,
            outcome = %outcome,
            profit = %settled.profit_amount,
            by = actor.user_id,
            "Settled pending resale"
        );
        Ok(settled)
    }

    /// Settles the pending resale opened by a swap.
    pub async fn settle_swap_resale(
        &self,
        actor: &Actor,
        swap_id: i64,
        resale_value: Money,
        outcome: ResaleOutcome,
    ) -> DbResult<PendingResale> {
        let resale_id: Option<i64> = sqlx::query_scalar("SELECT id FROM pending_resales WHERE swap_id = ?")
            .bind(swap_id)
            .fetch_optional(&self.pool)
            .await?;
        let resale_id = resale_id.ok_or_else(|| DbError::not_found("Pending resale for swap", swap_id))?;
        self.settle_pending_resale(actor, resale_id, resale_value, outcome).await
    }

    /// The swaps a phone came through, newest first.
    ///
    /// Follows `phone.swapped_from_id` to the swap, then the swap's stocked
    /// trade-in, and so on until a hop has no stocked predecessor.
    pub async fn swap_chain(&self, actor: &Actor, phone_id: i64) -> DbResult<Vec<SwapLink>> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;
        let mut phone = fetch_phone(&mut conn, phone_id).await?;
        ensure_visible(&scope, phone.created_by_user_id, "Phone", phone_id)?;

        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        while let Some(swap_id) = phone.swapped_from_id {
            if !visited.insert(swap_id) {
                break;
            }
            let swap = fetch_swap(&mut conn, swap_id).await?;
            let predecessor = swap.given_phone_id;
            chain.push(SwapLink {
                swap,
                produced_phone_id: phone.id,
                predecessor_phone_id: predecessor,
            });

            let Some(previous_id) = predecessor else {
                break;
            };
            match fetch_phone(&mut conn, previous_id).await {
                Ok(previous) => phone = previous,
                Err(DbError::NotFound { .. }) => break,
                Err(err) => return Err(err),
            }
        }

        debug!(phone_id, hops = chain.len(), "Walked swap chain");
        Ok(chain)
    }

    /// Pending resales of the caller's company, newest first.
    pub async fn list_pending_resales(&self, actor: &Actor, only_pending: bool) -> DbResult<Vec<PendingResale>> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM pending_resales WHERE 1 = 1");
        if only_pending {
            qb.push(" AND settled_at IS NULL");
        }
        push_scope(&mut qb, "created_by_user_id", &scope);
        qb.push(" ORDER BY created_at DESC, id DESC");

        let resales = qb.build_query_as::<PendingResale>().fetch_all(&mut *conn).await?;
        Ok(resales)
    }

    pub async fn get_pending_resale(&self, actor: &Actor, id: i64) -> DbResult<PendingResale> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;
        let resale = fetch_resale(&mut conn, id).await?;
        ensure_visible(&scope, resale.created_by_user_id, "Pending resale", id)?;
        Ok(resale)
    }

    /// Resale outcomes computed over Swap rows.
    pub async fn profit_summary(&self, actor: &Actor) -> DbResult<ProfitSummary> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            r#"
            SELECT
                COUNT(*) AS total_swaps,
                COALESCE(SUM(CASE WHEN resale_status = 'pending' THEN 1 ELSE 0 END), 0) AS pending_resales,
                COALESCE(SUM(CASE WHEN resale_status = 'sold' THEN 1 ELSE 0 END), 0) AS sold_resales,
                COALESCE(SUM(CASE WHEN resale_status = 'lost' THEN 1 ELSE 0 END), 0) AS lost_resales,
                COALESCE(SUM(CASE WHEN profit_or_loss > 0 THEN profit_or_loss ELSE 0 END), 0) AS total_profit,
                COALESCE(SUM(CASE WHEN profit_or_loss < 0 THEN -profit_or_loss ELSE 0 END), 0) AS total_loss,
                COALESCE(SUM(profit_or_loss), 0) AS net
            FROM swaps
            WHERE 1 = 1
            "#,
        );
        push_scope(&mut qb, "created_by_user_id", &scope);

        let summary = qb.build_query_as::<ProfitSummary>().fetch_one(&mut *conn).await?;
        Ok(summary)
    }

    pub async fn list_swaps(&self, actor: &Actor) -> DbResult<Vec<Swap>> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM swaps WHERE 1 = 1");
        push_scope(&mut qb, "created_by_user_id", &scope);
        qb.push(" ORDER BY created_at DESC, id DESC");

        let swaps = qb.build_query_as::<Swap>().fetch_all(&mut *conn).await?;
        Ok(swaps)
    }

    pub async fn get_swap(&self, actor: &Actor, id: i64) -> DbResult<Swap> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;
        let swap = fetch_swap(&mut conn, id).await?;
        ensure_visible(&scope, swap.created_by_user_id, "Swap", id)?;
        Ok(swap)
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Column values of a new `pending_resales` row.
#[derive(Debug, Clone)]
pub(crate) struct ResaleRow {
    pub sold_phone_id: i64,
    pub sold_phone_value: Money,
    pub incoming_phone_id: Option<i64>,
    pub incoming_phone_description: Option<String>,
    pub incoming_phone_value: Option<Money>,
    pub incoming_phone_imei: Option<String>,
    pub incoming_phone_status: Option<IncomingPhoneStatus>,
    pub transaction_type: TransactionType,
    pub customer_id: i64,
    pub attending_staff_id: i64,
    pub balance_paid: Money,
    pub discount_amount: Money,
    pub final_price: Money,
    pub profit_status: ProfitStatus,
    pub profit_amount: Money,
    pub swap_id: Option<i64>,
    pub sale_id: Option<i64>,
    pub resale_value: Option<Money>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

pub(crate) async fn insert_pending_resale(conn: &mut SqliteConnection, row: ResaleRow) -> DbResult<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO pending_resales (
            sold_phone_id, sold_phone_value, incoming_phone_id, incoming_phone_description,
            incoming_phone_value, incoming_phone_imei, incoming_phone_status, transaction_type,
            customer_id, attending_staff_id, balance_paid, discount_amount, final_price,
            profit_status, profit_amount, swap_id, sale_id, resale_value,
            created_by_user_id, created_at, settled_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(row.sold_phone_id)
    .bind(row.sold_phone_value)
    .bind(row.incoming_phone_id)
    .bind(&row.incoming_phone_description)
    .bind(row.incoming_phone_value)
    .bind(&row.incoming_phone_imei)
    .bind(row.incoming_phone_status)
    .bind(row.transaction_type)
    .bind(row.customer_id)
    .bind(row.attending_staff_id)
    .bind(row.balance_paid)
    .bind(row.discount_amount)
    .bind(row.final_price)
    .bind(row.profit_status)
    .bind(row.profit_amount)
    .bind(row.swap_id)
    .bind(row.sale_id)
    .bind(row.resale_value)
    .bind(row.created_by)
    .bind(row.created_at)
    .bind(row.settled_at)
    .fetch_one(&mut *conn)
    .await?;

    assign_unique_id(conn, "pending_resales", id, &sequential_id(RESALE_PREFIX, id)).await?;
    Ok(id)
}

pub(crate) async fn fetch_resale(conn: &mut SqliteConnection, id: i64) -> DbResult<PendingResale> {
    sqlx::query_as("SELECT * FROM pending_resales WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Pending resale", id))
}

pub(crate) async fn fetch_swap(conn: &mut SqliteConnection, id: i64) -> DbResult<Swap> {
    sqlx::query_as("SELECT * FROM swaps WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Swap", id))
}

/// Inserts an invoice and stamps its `INV-YYYYMMDD-NNNN` number.
pub(crate) async fn issue_invoice(
    conn: &mut SqliteConnection,
    kind: InvoiceType,
    transaction_id: i64,
    customer_id: i64,
    amount: Money,
    created_by: i64,
    created_at: DateTime<Utc>,
) -> DbResult<Invoice> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO invoices (
            transaction_type, transaction_id, customer_id, amount, created_by_user_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(kind)
    .bind(transaction_id)
    .bind(customer_id)
    .bind(amount)
    .bind(created_by)
    .bind(created_at)
    .fetch_one(&mut *conn)
    .await?;

    let number = invoice_number(created_at.date_naive(), id);
    sqlx::query("UPDATE invoices SET invoice_number = ? WHERE id = ?")
        .bind(&number)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let invoice = sqlx::query_as("SELECT * FROM invoices WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(invoice)
}

/// Applies a resale outcome to the resale row, its swap and its trade-in.
///
/// `release_incoming` marks a stocked trade-in as sold to nobody, but only
/// while it still sits in stock; the sale and swap engines pass `false`
/// because they hand the phone out themselves.
pub(crate) async fn settle_resale(
    conn: &mut SqliteConnection,
    resale: &PendingResale,
    resale_value: Money,
    outcome: ResaleOutcome,
    release_incoming: bool,
) -> DbResult<()> {
    if resale.is_settled() {
        return Err(CoreError::ResaleAlreadySettled(resale.unique_id.clone()).into());
    }
    validate_non_negative("resale_value", resale_value)?;
    let settled_at = now();

    let current_phone_value: Option<Money> = match resale.swap_id {
        Some(swap_id) => {
            sqlx::query_scalar(
                "SELECT p.value FROM swaps s JOIN phones p ON p.id = s.new_phone_id WHERE s.id = ?",
            )
            .bind(swap_id)
            .fetch_optional(&mut *conn)
            .await?
        }
        None => None,
    };

    match outcome {
        ResaleOutcome::Sold => {
            let profit = resale_profit(resale_value, resale.balance_paid, resale.sold_phone_value);
            sqlx::query(
                r#"
                UPDATE pending_resales SET
                    incoming_phone_status = 'sold', resale_value = ?, profit_amount = ?,
                    profit_status = ?, settled_at = ?
                WHERE id = ?
                "#,
            )
            .bind(resale_value)
            .bind(profit)
            .bind(profit_status(profit))
            .bind(settled_at)
            .bind(resale.id)
            .execute(&mut *conn)
            .await?;

            if let (Some(swap_id), Some(value)) = (resale.swap_id, current_phone_value) {
                sqlx::query(
                    r#"
                    UPDATE swaps SET
                        resale_value = ?, resale_status = ?, profit_or_loss = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(resale_value)
                .bind(ResaleStatus::Sold)
                .bind(resale_profit(resale_value, resale.balance_paid, value))
                .bind(settled_at)
                .bind(swap_id)
                .execute(&mut *conn)
                .await?;
            }

            if let (true, Some(phone_id)) = (release_incoming, resale.incoming_phone_id) {
                let phone = fetch_phone(conn, phone_id).await?;
                if phone.status == PhoneStatus::Available {
                    set_phone_state(conn, phone_id, PhoneStatus::Sold, OwnerType::Customer, None).await?;
                    record_ownership(
                        conn,
                        phone_id,
                        None,
                        OwnerType::Customer,
                        ChangeReason::Resale,
                        Some(resale.id),
                    )
                    .await?;
                } else {
                    debug!(phone_id, status = %phone.status, "Trade-in already moved on, left as is");
                }
            }
        }
        ResaleOutcome::Lost => {
            sqlx::query(
                r#"
                UPDATE pending_resales SET
                    incoming_phone_status = 'lost', profit_amount = ?,
                    profit_status = 'loss', settled_at = ?
                WHERE id = ?
                "#,
            )
            .bind(-resale.sold_phone_value)
            .bind(settled_at)
            .bind(resale.id)
            .execute(&mut *conn)
            .await?;

            if let (Some(swap_id), Some(value)) = (resale.swap_id, current_phone_value) {
                sqlx::query(
                    "UPDATE swaps SET resale_status = ?, profit_or_loss = ?, updated_at = ? WHERE id = ?",
                )
                .bind(ResaleStatus::Lost)
                .bind(-value)
                .bind(settled_at)
                .bind(swap_id)
                .execute(&mut *conn)
                .await?;
            }
        }
    }
    Ok(())
}

/// Settles the open swap resale whose trade-in is `phone_id`, if any.
///
/// Called when the trade-in leaves the shop again, by sale or by swap. The
/// phone itself is left to the caller.
pub(crate) async fn settle_open_trade_in(
    conn: &mut SqliteConnection,
    phone_id: i64,
    resale_value: Money,
) -> DbResult<Option<PendingResale>> {
    let open: Option<PendingResale> = sqlx::query_as(
        r#"
        SELECT * FROM pending_resales
        WHERE incoming_phone_id = ?
          AND transaction_type = 'swap'
          AND settled_at IS NULL
          AND incoming_phone_status = 'available'
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(phone_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(open) = open else {
        return Ok(None);
    };
    settle_resale(conn, &open, resale_value, ResaleOutcome::Sold, false).await?;
    let settled = fetch_resale(conn, open.id).await?;
    info!(resale = %settled.unique_id, profit = %settled.profit_amount, "Trade-in resold");
    Ok(Some(settled))
}

/// The trade-in as a phone row, when it is described well enough to stock.
fn trade_in_phone(given: &GivenPhone, imei: Option<String>, category_id: Option<i64>) -> Option<NewPhone> {
    let brand = given.brand.as_deref().map(str::trim).filter(|b| !b.is_empty())?;
    let model = given.model.as_deref().map(str::trim).filter(|m| !m.is_empty())?;
    let condition = given
        .condition
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("Used");

    Some(NewPhone {
        brand: brand.to_string(),
        model: model.to_string(),
        imei,
        condition: condition.to_string(),
        value: given.value,
        cost_price: given.value,
        specs: Default::default(),
        category_id,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{company, company_with, new_customer, new_phone, Company};
    use crate::repository::repair::NewRepair;
    use crate::{Database, DbConfig};
    use swapsync_core::RecordingSink;

    async fn setup() -> (Company, i64, i64) {
        let c = company().await;
        let customer = c
            .db
            .customers()
            .create_customer(&c.keeper, new_customer("Kofi", "0201234567"))
            .await
            .unwrap()
            .customer;
        let phone = c
            .db
            .phones()
            .create_phone(&c.manager, new_phone("Samsung", "A14", 1000))
            .await
            .unwrap();
        (c, customer.id, phone.id)
    }

    fn swap(customer_id: i64, new_phone_id: i64, given: i64, balance: i64, stocked: bool) -> NewSwap {
        NewSwap {
            customer_id,
            new_phone_id,
            given_phone: GivenPhone {
                description: "Tecno Spark 8".into(),
                value: Money::from_major(given),
                imei: None,
                brand: stocked.then(|| "Tecno".to_string()),
                model: stocked.then(|| "Spark 8".to_string()),
                condition: None,
            },
            balance_paid: Money::from_major(balance),
            discount_amount: Money::ZERO,
        }
    }

    #[tokio::test]
    async fn test_swap_writes_everything() {
        let sink = Arc::new(RecordingSink::new());
        let db = Database::new(DbConfig::in_memory()).await.unwrap().with_notifier(sink.clone());
        let c = company_with(db).await;
        let customer = c
            .db
            .customers()
            .create_customer(&c.keeper, new_customer("Kofi", "0201234567"))
            .await
            .unwrap()
            .customer;
        let phone = c
            .db
            .phones()
            .create_phone(&c.manager, new_phone("Samsung", "A14", 1000))
            .await
            .unwrap();

        let record = c
            .db
            .swaps()
            .create_swap(&c.keeper, swap(customer.id, phone.id, 400, 700, true))
            .await
            .unwrap();

        assert_eq!(record.swap.final_price, Money::from_major(700));
        assert_eq!(record.swap.resale_status, ResaleStatus::Pending);
        assert!(record.swap.invoice_number.starts_with("INV-"));
        assert_eq!(record.invoice.amount, Money::from_major(700));

        let new_phone = c.db.phones().get_phone(&c.manager, phone.id).await.unwrap();
        assert_eq!(new_phone.status, PhoneStatus::Swapped);
        assert!(!new_phone.is_available);
        assert_eq!(new_phone.swapped_from_id, Some(record.swap.id));
        assert_eq!(new_phone.current_owner_id, Some(customer.id));

        let trade_in_id = record.swap.given_phone_id.unwrap();
        let trade_in = c.db.phones().get_phone(&c.manager, trade_in_id).await.unwrap();
        assert_eq!(trade_in.status, PhoneStatus::Available);
        assert_eq!(trade_in.value, Money::from_major(400));
        assert_eq!(trade_in.cost_price, Money::from_major(400));

        let resale = record.pending_resale;
        assert!(resale.unique_id.starts_with("RSL-"));
        assert_eq!(resale.sold_phone_value, Money::from_major(1000));
        assert_eq!(resale.incoming_phone_id, Some(trade_in_id));
        assert_eq!(resale.profit_status, ProfitStatus::Pending);

        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_floor_guard() {
        let (c, customer, phone) = setup().await;
        // 100 + 200 < 50% of 1000
        let err = c
            .db
            .swaps()
            .create_swap(&c.keeper, swap(customer, phone, 100, 200, false))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(c.db.phones().get_phone(&c.manager, phone).await.unwrap().is_available);
        assert!(c.db.swaps().list_swaps(&c.manager).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_phone_rejected() {
        let (c, customer, phone) = setup().await;
        let swaps = c.db.swaps();
        swaps.create_swap(&c.keeper, swap(customer, phone, 400, 700, false)).await.unwrap();
        let err = swaps
            .create_swap(&c.keeper, swap(customer, phone, 400, 700, false))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_swap_and_resale_profit() {
        let (c, customer, phone) = setup().await;
        let swaps = c.db.swaps();
        let mut new = swap(customer, phone, 600, 500, true);
        new.discount_amount = Money::from_major(50);
        let record = swaps.create_swap(&c.keeper, new).await.unwrap();

        // 600 + 450 >= 500
        assert_eq!(record.swap.final_price, Money::from_major(450));
        let pending = &record.pending_resale;
        assert_eq!(pending.incoming_phone_value, Some(Money::from_major(600)));
        assert_eq!(pending.final_price, Money::from_major(450));
        assert_eq!(pending.profit_status, ProfitStatus::Pending);
        assert_eq!(
            c.db.phones().get_phone(&c.manager, phone).await.unwrap().status,
            PhoneStatus::Swapped
        );

        let settled = swaps
            .settle_pending_resale(&c.keeper, pending.id, Money::from_major(700), ResaleOutcome::Sold)
            .await
            .unwrap();
        // 700 + 500 - 1000
        assert_eq!(settled.profit_amount, Money::from_major(200));
        assert_eq!(settled.profit_status, ProfitStatus::ProfitMade);
        assert_eq!(settled.incoming_phone_status, Some(IncomingPhoneStatus::Sold));

        let swap_row = swaps.get_swap(&c.manager, record.swap.id).await.unwrap();
        assert_eq!(swap_row.resale_status, ResaleStatus::Sold);
        assert_eq!(swap_row.resale_value, Money::from_major(700));
        assert_eq!(swap_row.profit_or_loss, Money::from_major(200));

        let trade_in = c
            .db
            .phones()
            .get_phone(&c.manager, record.swap.given_phone_id.unwrap())
            .await
            .unwrap();
        assert_eq!(trade_in.status, PhoneStatus::Sold);
        assert_eq!(trade_in.current_owner_type, OwnerType::Customer);
        assert_eq!(trade_in.current_owner_id, None);

        let err = swaps
            .settle_pending_resale(&c.keeper, pending.id, Money::from_major(700), ResaleOutcome::Sold)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_reswapping_trade_in_settles_its_resale() {
        let (c, customer, phone) = setup().await;
        let second_customer = c
            .db
            .customers()
            .create_customer(&c.keeper, new_customer("Abena", "0261234567"))
            .await
            .unwrap()
            .customer;
        let swaps = c.db.swaps();
        let first = swaps
            .create_swap(&c.keeper, swap(customer, phone, 400, 700, true))
            .await
            .unwrap();
        assert!(first.settled_trade_in.is_none());
        let trade_in = first.swap.given_phone_id.unwrap();

        let second = swaps
            .create_swap(&c.keeper, swap(second_customer.id, trade_in, 200, 150, false))
            .await
            .unwrap();

        // Realised 200 + 150 for the trade-in: 350 + 700 - 1000
        let settled = second.settled_trade_in.unwrap();
        assert_eq!(settled.id, first.pending_resale.id);
        assert!(settled.is_settled());
        assert_eq!(settled.resale_value, Some(Money::from_major(350)));
        assert_eq!(settled.profit_amount, Money::from_major(50));
        assert_eq!(
            swaps.get_swap(&c.manager, first.swap.id).await.unwrap().resale_status,
            ResaleStatus::Sold
        );

        let err = swaps
            .settle_pending_resale(&c.manager, first.pending_resale.id, Money::from_major(500), ResaleOutcome::Sold)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let phone = c.db.phones().get_phone(&c.manager, trade_in).await.unwrap();
        assert_eq!(phone.status, PhoneStatus::Swapped);
        assert_eq!(phone.current_owner_id, Some(second_customer.id));
    }

    #[tokio::test]
    async fn test_settling_leaves_trade_in_under_repair() {
        let (c, customer, phone) = setup().await;
        let swaps = c.db.swaps();
        let record = swaps
            .create_swap(&c.keeper, swap(customer, phone, 400, 700, true))
            .await
            .unwrap();
        let trade_in = record.swap.given_phone_id.unwrap();

        c.db
            .repairs()
            .create_repair(
                &c.repairer,
                NewRepair {
                    customer_id: customer,
                    phone_id: Some(trade_in),
                    issue_description: "Battery swelling".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        swaps
            .settle_pending_resale(&c.manager, record.pending_resale.id, Money::from_major(450), ResaleOutcome::Sold)
            .await
            .unwrap();
        let phone = c.db.phones().get_phone(&c.manager, trade_in).await.unwrap();
        assert_eq!(phone.status, PhoneStatus::UnderRepair);
    }

    #[tokio::test]
    async fn test_settle_lost_and_summary() {
        let (c, customer, phone) = setup().await;
        let swaps = c.db.swaps();
        let record = swaps
            .create_swap(&c.keeper, swap(customer, phone, 400, 700, false))
            .await
            .unwrap();
        let settled = swaps
            .settle_swap_resale(&c.manager, record.swap.id, Money::ZERO, ResaleOutcome::Lost)
            .await
            .unwrap();
        assert_eq!(settled.profit_status, ProfitStatus::Loss);
        assert_eq!(settled.profit_amount, Money::from_major(-1000));

        let summary = swaps.profit_summary(&c.manager).await.unwrap();
        assert_eq!(summary.total_swaps, 1);
        assert_eq!(summary.lost_resales, 1);
        assert_eq!(summary.total_loss, Money::from_major(1000));
        assert_eq!(summary.net, Money::from_major(-1000));
        assert!(swaps.list_pending_resales(&c.manager, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_swap_chain() {
        let (c, customer, first_phone) = setup().await;
        let swaps = c.db.swaps();
        let first = swaps
            .create_swap(&c.keeper, swap(customer, first_phone, 400, 700, true))
            .await
            .unwrap();
        let trade_in = first.swap.given_phone_id.unwrap();

        // The stocked trade-in is swapped out again.
        let second = swaps
            .create_swap(&c.keeper, swap(customer, trade_in, 200, 100, false))
            .await
            .unwrap();

        let chain = swaps.swap_chain(&c.manager, trade_in).await.unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].swap.id, second.swap.id);
        assert_eq!(chain[0].predecessor_phone_id, None);

        let chain = swaps.swap_chain(&c.manager, first_phone).await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].swap.id, first.swap.id);
        assert_eq!(chain[0].predecessor_phone_id, Some(trade_in));
        assert_eq!(chain[1].produced_phone_id, trade_in);
    }
}
