//! # POS Sale Engine
//!
//! Multi-line product sales, recorded as one atomic unit.
//!
//! ## Sale Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_pos_sale(actor, NewPosSale)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  pos_totals(lines)            ← validation, before any I/O              │
//! │       │                                                                 │
//! │       ▼  attempt 1..=5                                                  │
//! │  BEGIN                                                                  │
//! │  ├── customer (or upsert Walk-In Customer)                              │
//! │  ├── products: visible, active, enough stock                            │
//! │  ├── next POS-YYYYMMDD-NNNN                                             │
//! │  ├── INSERT pos_sales                                                   │
//! │  ├── per line: product_sales, pos_sale_items, stock -q, movement        │
//! │  COMMIT ── UNIQUE(transaction_id) lost the race? ── retry               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  notifier.publish(PosReceipt)                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};

use swapsync_core::identifiers::{pos_sequence, pos_transaction_id, pos_transaction_prefix};
use swapsync_core::money::Money;
use swapsync_core::pricing::{pos_totals, LineAmounts, PosTotals};
use swapsync_core::validation::validate_optional;
use swapsync_core::{
    Action, Actor, CoreError, Notification, NotificationSink, PaymentMethod, PosSale, PosSaleItem,
    PosSaleWithItems, Product, ReceiptLine, WALK_IN_CUSTOMER_PHONE,
};

use crate::error::{DbError, DbResult};
use crate::repository::customer::{fetch_customer, walk_in_customer};
use crate::repository::product::{fetch_product, take_stock};
use crate::repository::user::{company_scope, resolve_sms_sender};
use crate::repository::{ensure_visible, now, push_scope};

/// Attempts before a transaction-id collision is reported.
const MAX_ATTEMPTS: u32 = 5;

/// One requested line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPosItem {
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: Money,
    #[serde(default)]
    pub discount_amount: Money,
}

/// Input for [`PosSaleRepository::create_pos_sale`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPosSale {
    /// `None` records the sale against the Walk-In Customer.
    pub customer_id: Option<i64>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub items: Vec<NewPosItem>,
    #[serde(default)]
    pub overall_discount: Money,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

/// Sales totals for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PosSummary {
    pub total_sales: i64,
    pub total_revenue: Money,
    pub total_items_sold: i64,
    pub today_sales: i64,
    pub today_revenue: Money,
}

/// The POS engine.
#[derive(Debug, Clone)]
pub struct PosSaleRepository {
    pool: SqlitePool,
    notifier: Arc<dyn NotificationSink>,
}

impl PosSaleRepository {
    /// Creates a new PosSaleRepository.
    pub fn new(pool: SqlitePool, notifier: Arc<dyn NotificationSink>) -> Self {
        PosSaleRepository { pool, notifier }
    }

    /// Records a POS sale.
    ///
    /// ## What This Does
    /// 1. Validates line and header arithmetic
    /// 2. Checks every product (company, active, stock) before mutating
    /// 3. Writes header, lines, stock decrements and movements in one transaction
    /// 4. Publishes the receipt after commit
    ///
    /// ## Errors
    /// - `InsufficientStock` naming the product (400)
    /// - negative subtotal or total (400)
    /// - anything else is a 500 with no partial effect
    pub async fn create_pos_sale(&self, actor: &Actor, new: NewPosSale) -> DbResult<PosSaleWithItems> {
        actor.authorize(Action::RecordPosSale)?;

        let lines: Vec<LineAmounts> = new
            .items
            .iter()
            .map(|item| LineAmounts {
                quantity: item.quantity,
                unit_price: item.unit_price,
                discount_amount: item.discount_amount,
            })
            .collect();
        let totals = pos_totals(&lines, new.overall_discount)?;

        let mut attempt = 1;
        let (sale, sender) = loop {
            match self.try_create(actor, &new, &totals).await {
                Err(err)
                    if err.is_unique_violation_on("pos_sales.transaction_id")
                        && attempt < MAX_ATTEMPTS =>
                {
                    warn!(attempt, "POS transaction id collided, retrying");
                    attempt += 1;
                }
                other => break other?,
            }
        };

        info!(
            id = sale.sale.id,
            transaction_id = %sale.sale.transaction_id,
            total = %sale.sale.total_amount,
            items = sale.items.len(),
            "Recorded POS sale"
        );

        if let Some(notification) = receipt(&sale, sender) {
            self.notifier.publish(notification);
        }
        Ok(sale)
    }

    async fn try_create(
        &self,
        actor: &Actor,
        new: &NewPosSale,
        totals: &PosTotals,
    ) -> DbResult<(PosSaleWithItems, String)> {
        let mut tx = self.pool.begin().await?;
        let scope = company_scope(&mut tx, actor).await?;

        let customer = match new.customer_id {
            Some(id) => {
                let customer = fetch_customer(&mut tx, id).await?;
                ensure_visible(&scope, customer.created_by_user_id, "Customer", id)?;
                customer
            }
            None => walk_in_customer(&mut tx, actor.user_id).await?,
        };

        // All checks before the first write.
        let mut products: Vec<Product> = Vec::with_capacity(new.items.len());
        for item in &new.items {
            let product = fetch_product(&mut tx, item.product_id).await?;
            ensure_visible(&scope, product.created_by_user_id, "Product", item.product_id)?;
            if !product.is_active {
                return Err(CoreError::ProductInactive(product.name).into());
            }
            if product.quantity < item.quantity {
                return Err(CoreError::InsufficientStock {
                    product: product.name,
                    available: product.quantity,
                    requested: item.quantity,
                }
                .into());
            }
            products.push(product);
        }

        let customer_name = validate_optional("customer_name", new.customer_name.as_deref(), 120)?
            .unwrap_or_else(|| customer.full_name.clone());
        let customer_phone = validate_optional("customer_phone", new.customer_phone.as_deref(), 32)?
            .unwrap_or_else(|| customer.phone_number.clone());
        let customer_email = validate_optional("customer_email", new.customer_email.as_deref(), 254)?
            .or_else(|| customer.email.clone());
        let notes = validate_optional("notes", new.notes.as_deref(), 1000)?;

        let created_at = now();
        let transaction_id = next_transaction_id(&mut tx, created_at.date_naive()).await?;

        let sale_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO pos_sales (
                transaction_id, customer_id, customer_name, customer_phone, customer_email,
                subtotal, overall_discount, total_amount, payment_method,
                items_count, total_quantity, notes, sms_sent, created_by_user_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&transaction_id)
        .bind(customer.id)
        .bind(&customer_name)
        .bind(&customer_phone)
        .bind(&customer_email)
        .bind(totals.subtotal)
        .bind(totals.overall_discount)
        .bind(totals.total_amount)
        .bind(new.payment_method)
        .bind(totals.items_count)
        .bind(totals.total_quantity)
        .bind(&notes)
        .bind(actor.user_id)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await?;

        for ((item, product), subtotal) in new.items.iter().zip(&products).zip(&totals.line_subtotals) {
            let product_sale_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO product_sales (
                    customer_id, product_id, quantity, unit_price, discount_amount,
                    total_amount, sms_sent, created_by_user_id, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
                RETURNING id
                "#,
            )
            .bind(customer.id)
            .bind(product.id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.discount_amount)
            .bind(*subtotal)
            .bind(actor.user_id)
            .bind(created_at)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO pos_sale_items (
                    pos_sale_id, product_sale_id, product_id, product_name_snapshot,
                    product_brand_snapshot, quantity, unit_price, discount_amount, subtotal
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(sale_id)
            .bind(product_sale_id)
            .bind(product.id)
            .bind(&product.name)
            .bind(&product.brand)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.discount_amount)
            .bind(*subtotal)
            .execute(&mut *tx)
            .await?;

            take_stock(
                &mut tx,
                product,
                item.quantity,
                item.unit_price,
                ("pos_sale", sale_id),
                actor.user_id,
            )
            .await?;
        }

        let sender = resolve_sms_sender(&mut tx, actor.user_id).await?;
        let sale = fetch_sale_with_items(&mut tx, sale_id).await?;
        tx.commit().await?;
        Ok((sale, sender))
    }

    /// A sale and its lines.
    pub async fn get_pos_sale(&self, actor: &Actor, id: i64) -> DbResult<PosSaleWithItems> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;
        let sale = fetch_sale_with_items(&mut conn, id).await?;
        ensure_visible(&scope, sale.sale.created_by_user_id, "POS sale", id)?;
        Ok(sale)
    }

    /// Lists sale headers between two inclusive UTC dates, newest first.
    pub async fn list_pos_sales(
        &self,
        actor: &Actor,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> DbResult<Vec<PosSale>> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM pos_sales WHERE 1 = 1");
        if let Some(start) = start_date {
            qb.push(" AND created_at >= ").push_bind(start_of_day(start));
        }
        if let Some(end) = end_date {
            qb.push(" AND created_at < ")
                .push_bind(start_of_day(end) + Duration::days(1));
        }
        push_scope(&mut qb, "created_by_user_id", &scope);
        qb.push(" ORDER BY created_at DESC, id DESC");

        let sales = qb.build_query_as::<PosSale>().fetch_all(&mut *conn).await?;
        debug!(count = sales.len(), "Listed POS sales");
        Ok(sales)
    }

    /// Totals over all of the caller's sales and over today's.
    pub async fn pos_summary(&self, actor: &Actor) -> DbResult<PosSummary> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;
        let today = start_of_day(now().date_naive());

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            r#"
            SELECT
                COUNT(*) AS total_sales,
                COALESCE(SUM(total_amount), 0) AS total_revenue,
                COALESCE(SUM(total_quantity), 0) AS total_items_sold,
                COALESCE(SUM(CASE WHEN created_at >= "#,
        );
        qb.push_bind(today)
            .push(" THEN 1 ELSE 0 END), 0) AS today_sales, COALESCE(SUM(CASE WHEN created_at >= ")
            .push_bind(today)
            .push(" THEN total_amount ELSE 0 END), 0) AS today_revenue FROM pos_sales WHERE 1 = 1");
        push_scope(&mut qb, "created_by_user_id", &scope);

        let summary = qb.build_query_as::<PosSummary>().fetch_one(&mut *conn).await?;
        Ok(summary)
    }

    /// Publishes the receipt of an existing sale again.
    pub async fn resend_receipt(&self, actor: &Actor, id: i64) -> DbResult<()> {
        let sale = self.get_pos_sale(actor, id).await?;
        let sender = {
            let mut conn = self.pool.acquire().await?;
            resolve_sms_sender(&mut conn, sale.sale.created_by_user_id).await?
        };
        let notification = receipt(&sale, sender).ok_or_else(|| {
            DbError::from(CoreError::Precondition(format!(
                "POS sale {} has no customer phone number",
                sale.sale.transaction_id
            )))
        })?;

        info!(id, transaction_id = %sale.sale.transaction_id, "Resending POS receipt");
        self.notifier.publish(notification);
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Next `POS-YYYYMMDD-NNNN` for `date`.
///
/// NNNN is one past the larger of the day's row count and its highest
/// sequence, so deleted sales never cause a reused id.
async fn next_transaction_id(conn: &mut SqliteConnection, date: NaiveDate) -> DbResult<String> {
    let prefix = pos_transaction_prefix(date);
    let existing: Vec<String> =
        sqlx::query_scalar("SELECT transaction_id FROM pos_sales WHERE transaction_id LIKE ?")
            .bind(format!("{}%", prefix))
            .fetch_all(&mut *conn)
            .await?;

    let highest = existing.iter().filter_map(|id| pos_sequence(id)).max().unwrap_or(0);
    let next = highest.max(existing.len() as i64) + 1;
    Ok(pos_transaction_id(date, next))
}

async fn fetch_sale_with_items(conn: &mut SqliteConnection, id: i64) -> DbResult<PosSaleWithItems> {
    let sale: PosSale = sqlx::query_as("SELECT * FROM pos_sales WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("POS sale", id))?;
    let items: Vec<PosSaleItem> = sqlx::query_as("SELECT * FROM pos_sale_items WHERE pos_sale_id = ? ORDER BY id")
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(PosSaleWithItems { sale, items })
}

/// Receipt for a sale, or `None` when there is nobody to text.
fn receipt(sale: &PosSaleWithItems, sender: String) -> Option<Notification> {
    let phone_number = sale
        .sale
        .customer_phone
        .clone()
        .filter(|p| !p.trim().is_empty() && p != WALK_IN_CUSTOMER_PHONE)?;

    Some(Notification::PosReceipt {
        pos_sale_id: sale.sale.id,
        transaction_id: sale.sale.transaction_id.clone(),
        phone_number,
        customer_name: sale.sale.customer_name.clone().unwrap_or_default(),
        sender,
        lines: sale
            .items
            .iter()
            .map(|item| ReceiptLine {
                name: item.product_name_snapshot.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                subtotal: item.subtotal,
            })
            .collect(),
        subtotal: sale.sale.subtotal,
        overall_discount: sale.sale.overall_discount,
        total: sale.sale.total_amount,
        payment_method: sale.sale.payment_method,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{company, company_with, new_customer, new_product, Company};
    use crate::{Database, DbConfig};
    use swapsync_core::{MovementType, RecordingSink};

    async fn company_with_sink() -> (Company, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let db = Database::new(DbConfig::in_memory())
            .await
            .unwrap()
            .with_notifier(sink.clone());
        (company_with(db).await, sink)
    }

    fn line(product_id: i64, quantity: i64, unit_price: i64, discount: i64) -> NewPosItem {
        NewPosItem {
            product_id,
            quantity,
            unit_price: Money::from_major(unit_price),
            discount_amount: Money::from_major(discount),
        }
    }

    #[tokio::test]
    async fn test_multi_line_sale_with_discounts() {
        let (c, sink) = company_with_sink().await;
        let products = c.db.products();
        let x = products
            .create_product(&c.manager, new_product("X", c.category_id, 100, 10))
            .await
            .unwrap();
        let y = products
            .create_product(&c.manager, new_product("Y", c.category_id, 50, 5))
            .await
            .unwrap();
        let customer = c
            .db
            .customers()
            .create_customer(&c.keeper, new_customer("Ama", "0241234567"))
            .await
            .unwrap()
            .customer;

        let sale = c
            .db
            .pos_sales()
            .create_pos_sale(
                &c.keeper,
                NewPosSale {
                    customer_id: Some(customer.id),
                    items: vec![line(x.id, 2, 100, 0), line(y.id, 3, 50, 10)],
                    overall_discount: Money::from_major(5),
                    payment_method: PaymentMethod::Cash,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // 2*100 + (3*50 - 10)
        assert_eq!(sale.sale.subtotal, Money::from_major(340));
        assert_eq!(sale.sale.total_amount, Money::from_major(335));
        assert_eq!(sale.sale.items_count, 2);
        assert_eq!(sale.sale.total_quantity, 5);
        assert_eq!(sale.sale.payment_method, PaymentMethod::Cash);
        assert!(sale.sale.transaction_id.ends_with("-0001"));
        assert_eq!(sale.items[0].product_name_snapshot, "X");
        assert_eq!(sale.items[1].subtotal, Money::from_major(140));

        assert_eq!(products.get_product(&c.manager, x.id).await.unwrap().quantity, 8);
        assert_eq!(products.get_product(&c.manager, y.id).await.unwrap().quantity, 2);
        for (product_id, expected) in [(x.id, -2), (y.id, -3)] {
            let sale_moves: Vec<_> = products
                .movements(&c.manager, product_id)
                .await
                .unwrap()
                .into_iter()
                .filter(|m| m.movement_type == MovementType::Sale)
                .collect();
            assert_eq!(sale_moves.len(), 1);
            assert_eq!(sale_moves[0].quantity, expected);
            assert_eq!(sale_moves[0].reference_type.as_deref(), Some("pos_sale"));
        }

        let fetched = c.db.pos_sales().get_pos_sale(&c.manager, sale.sale.id).await.unwrap();
        assert_eq!(fetched.items.len(), 2);
        assert_eq!(fetched.sale.total_amount, sale.sale.total_amount);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phone_number(), "0241234567");
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back() {
        let c = company().await;
        let products = c.db.products();
        let a = products
            .create_product(&c.manager, new_product("A", c.category_id, 10, 5))
            .await
            .unwrap();
        let z = products
            .create_product(&c.manager, new_product("Z", c.category_id, 10, 1))
            .await
            .unwrap();

        let err = c
            .db
            .pos_sales()
            .create_pos_sale(
                &c.keeper,
                NewPosSale {
                    items: vec![line(a.id, 2, 10, 0), line(z.id, 2, 10, 0)],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains('Z'));

        assert_eq!(products.get_product(&c.manager, a.id).await.unwrap().quantity, 5);
        assert_eq!(products.get_product(&c.manager, z.id).await.unwrap().quantity, 1);
        assert!(c.db.pos_sales().list_pos_sales(&c.keeper, None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_negative_total_rejected() {
        let c = company().await;
        let p = c
            .db
            .products()
            .create_product(&c.manager, new_product("A", c.category_id, 10, 5))
            .await
            .unwrap();
        let err = c
            .db
            .pos_sales()
            .create_pos_sale(
                &c.keeper,
                NewPosSale {
                    items: vec![line(p.id, 1, 10, 0)],
                    overall_discount: Money::from_major(11),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_walk_in_and_sequence() {
        let (c, sink) = company_with_sink().await;
        let p = c
            .db
            .products()
            .create_product(&c.manager, new_product("A", c.category_id, 10, 5))
            .await
            .unwrap();
        let pos = c.db.pos_sales();
        let sale = || NewPosSale {
            items: vec![line(p.id, 1, 10, 0)],
            ..Default::default()
        };

        let first = pos.create_pos_sale(&c.keeper, sale()).await.unwrap();
        let second = pos.create_pos_sale(&c.admin, sale()).await.unwrap();
        assert_eq!(first.sale.customer_id, second.sale.customer_id);
        assert_eq!(pos_sequence(&first.sale.transaction_id), Some(1));
        assert_eq!(pos_sequence(&second.sale.transaction_id), Some(2));

        // Walk-in receipts have nobody to text.
        assert!(sink.is_empty());
        let err = pos.resend_receipt(&c.keeper, first.sale.id).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_concurrent_sales_get_distinct_ids() {
        let c = company().await;
        let p = c
            .db
            .products()
            .create_product(&c.manager, new_product("A", c.category_id, 10, 20))
            .await
            .unwrap();
        let sale = || NewPosSale {
            items: vec![line(p.id, 1, 10, 0)],
            ..Default::default()
        };

        let run = |actor: Actor| {
            let pos = c.db.pos_sales();
            let sales: Vec<NewPosSale> = (0..5).map(|_| sale()).collect();
            async move {
                let mut ids = Vec::new();
                for new in sales {
                    ids.push(pos.create_pos_sale(&actor, new).await.unwrap().sale.transaction_id);
                }
                ids
            }
        };
        let keeper = tokio::spawn(run(c.keeper));
        let admin = tokio::spawn(run(c.admin));
        let mut ids = keeper.await.unwrap();
        ids.extend(admin.await.unwrap());

        let today = pos_transaction_prefix(Utc::now().date_naive());
        assert!(ids.iter().all(|id| id.starts_with(&today)));
        let mut sequences: Vec<i64> = ids.iter().filter_map(|id| pos_sequence(id)).collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=10).collect::<Vec<_>>());
        assert_eq!(
            c.db.products().get_product(&c.manager, p.id).await.unwrap().quantity,
            10
        );
    }

    #[tokio::test]
    async fn test_manager_cannot_sell_and_rival_cannot_see() {
        let c = company().await;
        let p = c
            .db
            .products()
            .create_product(&c.manager, new_product("A", c.category_id, 10, 5))
            .await
            .unwrap();
        let new = NewPosSale {
            items: vec![line(p.id, 1, 10, 0)],
            ..Default::default()
        };
        let err = c.db.pos_sales().create_pos_sale(&c.manager, new.clone()).await.unwrap_err();
        assert_eq!(err.status_code(), 403);

        let sale = c.db.pos_sales().create_pos_sale(&c.keeper, new).await.unwrap();
        let err = c
            .db
            .pos_sales()
            .get_pos_sale(&c.other_manager, sale.sale.id)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);

        let summary = c.db.pos_sales().pos_summary(&c.manager).await.unwrap();
        assert_eq!(summary.total_sales, 1);
        assert_eq!(summary.today_sales, 1);
        assert_eq!(summary.total_revenue, Money::from_major(10));
        assert_eq!(c.db.pos_sales().pos_summary(&c.other_manager).await.unwrap().total_sales, 0);
    }
}
