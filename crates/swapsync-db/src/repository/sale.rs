//! # Direct Phone Sale Engine
//!
//! Sells one phone outright. When the phone is a stocked trade-in still on
//! the resale workbench, the sale settles that resale in the same
//! transaction.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │  ├── INSERT sales, INSERT invoices                                      │
//! │  ├── phone ──► sold, owner = customer, history (sale)                   │
//! │  ├── track_resale? ──► pending_resales (direct_sale, settled now)       │
//! │  └── phone is an open swap trade-in? ──► settle it as sold              │
//! │  COMMIT ──► SaleReceipt                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::info;

use swapsync_core::money::Money;
use swapsync_core::pricing::{direct_sale_amount, profit_status};
use swapsync_core::{
    Action, Actor, ChangeReason, Invoice, InvoiceType, Notification, NotificationSink, OwnerType,
    PendingResale, PhoneStatus, Sale, TransactionType,
};

use crate::error::{DbError, DbResult};
use crate::repository::customer::fetch_customer;
use crate::repository::phone::{ensure_available, fetch_phone, record_ownership, set_phone_state};
use crate::repository::swap::{
    fetch_resale, insert_pending_resale, issue_invoice, settle_open_trade_in, ResaleRow,
};
use crate::repository::user::{company_scope, resolve_sms_sender};
use crate::repository::{ensure_visible, now, push_scope};

/// Input for [`SaleRepository::create_sale`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSale {
    pub customer_id: i64,
    pub phone_id: i64,
    /// Defaults to the phone's value.
    pub original_price: Option<Money>,
    #[serde(default)]
    pub discount_amount: Money,
    /// Also book the sale on the resale workbench.
    #[serde(default)]
    pub track_resale: bool,
}

/// Everything a direct sale wrote.
#[derive(Debug, Clone, Serialize)]
pub struct SaleRecord {
    pub sale: Sale,
    pub invoice: Invoice,
    /// Row booked when `track_resale` was set.
    pub resale: Option<PendingResale>,
    /// Swap resale settled because the phone was its trade-in.
    pub settled_trade_in: Option<PendingResale>,
}

/// The direct sale engine.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
    notifier: Arc<dyn NotificationSink>,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool, notifier: Arc<dyn NotificationSink>) -> Self {
        SaleRepository { pool, notifier }
    }

    /// Sells a phone.
    pub async fn create_sale(&self, actor: &Actor, new: NewSale) -> DbResult<SaleRecord> {
        actor.authorize(Action::RecordPhoneSale)?;

        let mut tx = self.pool.begin().await?;
        let scope = company_scope(&mut tx, actor).await?;
        let customer = fetch_customer(&mut tx, new.customer_id).await?;
        ensure_visible(&scope, customer.created_by_user_id, "Customer", customer.id)?;
        let phone = fetch_phone(&mut tx, new.phone_id).await?;
        ensure_visible(&scope, phone.created_by_user_id, "Phone", phone.id)?;
        ensure_available(&phone)?;

        let original_price = new.original_price.unwrap_or(phone.value);
        let amount_paid = direct_sale_amount(original_price, new.discount_amount)?;
        let created_at = now();

        let sale_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sales (
                customer_id, phone_id, original_price, discount_amount, amount_paid,
                invoice_number, sms_sent, created_by_user_id, created_at
            ) VALUES (?, ?, ?, ?, ?, '', 0, ?, ?)
            RETURNING id
            "#,
        )
        .bind(customer.id)
        .bind(phone.id)
        .bind(original_price)
        .bind(new.discount_amount)
        .bind(amount_paid)
        .bind(actor.user_id)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await?;

        let invoice = issue_invoice(
            &mut tx,
            InvoiceType::Sale,
            sale_id,
            customer.id,
            amount_paid,
            actor.user_id,
            created_at,
        )
        .await?;
        sqlx::query("UPDATE sales SET invoice_number = ? WHERE id = ?")
            .bind(&invoice.invoice_number)
            .bind(sale_id)
            .execute(&mut *tx)
            .await?;

        set_phone_state(&mut tx, phone.id, PhoneStatus::Sold, OwnerType::Customer, Some(customer.id)).await?;
        record_ownership(
            &mut tx,
            phone.id,
            Some(customer.id),
            OwnerType::Customer,
            ChangeReason::Sale,
            Some(sale_id),
        )
        .await?;

        let resale = if new.track_resale {
            let profit = amount_paid - phone.cost_price;
            let id = insert_pending_resale(
                &mut tx,
                ResaleRow {
                    sold_phone_id: phone.id,
                    sold_phone_value: phone.value,
                    incoming_phone_id: None,
                    incoming_phone_description: None,
                    incoming_phone_value: None,
                    incoming_phone_imei: None,
                    incoming_phone_status: None,
                    transaction_type: TransactionType::DirectSale,
                    customer_id: customer.id,
                    attending_staff_id: actor.user_id,
                    balance_paid: amount_paid,
                    discount_amount: new.discount_amount,
                    final_price: amount_paid,
                    profit_status: profit_status(profit),
                    profit_amount: profit,
                    swap_id: None,
                    sale_id: Some(sale_id),
                    resale_value: Some(amount_paid),
                    created_by: actor.user_id,
                    created_at,
                    settled_at: Some(created_at),
                },
            )
            .await?;
            Some(fetch_resale(&mut tx, id).await?)
        } else {
            None
        };

        let settled_trade_in = settle_open_trade_in(&mut tx, phone.id, amount_paid).await?;

        let sender = resolve_sms_sender(&mut tx, actor.user_id).await?;
        let sale = fetch_sale(&mut tx, sale_id).await?;
        tx.commit().await?;

        info!(
            sale_id,
            phone = %phone.unique_id,
            invoice = %invoice.invoice_number,
            amount_paid = %amount_paid,
            trade_in_settled = settled_trade_in.is_some(),
            "Recorded phone sale"
        );

        self.notifier.publish(Notification::SaleReceipt {
            sale_id,
            invoice_number: invoice.invoice_number.clone(),
            phone_number: customer.phone_number,
            customer_name: customer.full_name,
            sender,
            phone_description: phone.description(),
            original_price,
            discount: new.discount_amount,
            amount_paid,
        });

        Ok(SaleRecord {
            sale,
            invoice,
            resale,
            settled_trade_in,
        })
    }

    pub async fn get_sale(&self, actor: &Actor, id: i64) -> DbResult<Sale> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;
        let sale = fetch_sale(&mut conn, id).await?;
        ensure_visible(&scope, sale.created_by_user_id, "Sale", id)?;
        Ok(sale)
    }

    /// The caller's phone sales, newest first.
    pub async fn list_sales(&self, actor: &Actor) -> DbResult<Vec<Sale>> {
        let mut conn = self.pool.acquire().await?;
        let scope = company_scope(&mut conn, actor).await?;

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM sales WHERE 1 = 1");
        push_scope(&mut qb, "created_by_user_id", &scope);
        qb.push(" ORDER BY created_at DESC, id DESC");

        let sales = qb.build_query_as::<Sale>().fetch_all(&mut *conn).await?;
        Ok(sales)
    }
}

async fn fetch_sale(conn: &mut SqliteConnection, id: i64) -> DbResult<Sale> {
    sqlx::query_as("SELECT * FROM sales WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Sale", id))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{company, new_customer, new_phone};
    use crate::repository::swap::{GivenPhone, NewSwap};
    use swapsync_core::{IncomingPhoneStatus, ProfitStatus};

    #[tokio::test]
    async fn test_direct_sale() {
        let c = company().await;
        let customer = c
            .db
            .customers()
            .create_customer(&c.keeper, new_customer("Esi", "0551234567"))
            .await
            .unwrap()
            .customer;
        let phone = c
            .db
            .phones()
            .create_phone(&c.manager, new_phone("Apple", "iPhone 11", 3000))
            .await
            .unwrap();

        let record = c
            .db
            .sales()
            .create_sale(
                &c.keeper,
                NewSale {
                    customer_id: customer.id,
                    phone_id: phone.id,
                    discount_amount: Money::from_major(200),
                    track_resale: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(record.sale.original_price, Money::from_major(3000));
        assert_eq!(record.sale.amount_paid, Money::from_major(2800));
        assert_eq!(record.sale.invoice_number, record.invoice.invoice_number);

        // cost price is 80% of value
        let resale = record.resale.unwrap();
        assert_eq!(resale.transaction_type, TransactionType::DirectSale);
        assert_eq!(resale.profit_amount, Money::from_major(400));
        assert_eq!(resale.profit_status, ProfitStatus::ProfitMade);
        assert!(resale.is_settled());

        let phone = c.db.phones().get_phone(&c.manager, phone.id).await.unwrap();
        assert_eq!(phone.status, PhoneStatus::Sold);
        assert_eq!(phone.current_owner_id, Some(customer.id));

        let err = c
            .db
            .sales()
            .create_sale(
                &c.keeper,
                NewSale {
                    customer_id: customer.id,
                    phone_id: phone.id,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_selling_trade_in_settles_resale() {
        let c = company().await;
        let customer = c
            .db
            .customers()
            .create_customer(&c.keeper, new_customer("Esi", "0551234567"))
            .await
            .unwrap()
            .customer;
        let phone = c
            .db
            .phones()
            .create_phone(&c.manager, new_phone("Samsung", "A14", 1000))
            .await
            .unwrap();
        let swap = c
            .db
            .swaps()
            .create_swap(
                &c.keeper,
                NewSwap {
                    customer_id: customer.id,
                    new_phone_id: phone.id,
                    given_phone: GivenPhone {
                        description: "Tecno Spark 8".into(),
                        value: Money::from_major(400),
                        brand: Some("Tecno".into()),
                        model: Some("Spark 8".into()),
                        ..Default::default()
                    },
                    balance_paid: Money::from_major(700),
                    discount_amount: Money::ZERO,
                },
            )
            .await
            .unwrap();
        let trade_in = swap.swap.given_phone_id.unwrap();

        let record = c
            .db
            .sales()
            .create_sale(
                &c.keeper,
                NewSale {
                    customer_id: customer.id,
                    phone_id: trade_in,
                    original_price: Some(Money::from_major(500)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let settled = record.settled_trade_in.unwrap();
        assert_eq!(settled.id, swap.pending_resale.id);
        assert_eq!(settled.incoming_phone_status, Some(IncomingPhoneStatus::Sold));
        // 500 + 700 - 1000
        assert_eq!(settled.profit_amount, Money::from_major(200));

        // The sale, not the settlement, decides the new owner.
        let phone = c.db.phones().get_phone(&c.manager, trade_in).await.unwrap();
        assert_eq!(phone.current_owner_id, Some(customer.id));
    }
}
