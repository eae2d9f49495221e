//! # Notification Repository
//!
//! In-app notices for staff, and the `sms_sent` flags the SMS workers
//! flip after a successful delivery.

use sqlx::SqlitePool;
use tracing::debug;

use swapsync_core::{Actor, SmsOrigin, UserNotification};

use crate::error::{DbError, DbResult};

/// Repository for notifications.
#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    /// Creates a new NotificationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        NotificationRepository { pool }
    }

    /// The caller's notices, newest first.
    pub async fn list(&self, actor: &Actor, unread_only: bool) -> DbResult<Vec<UserNotification>> {
        let sql = if unread_only {
            "SELECT * FROM user_notifications WHERE user_id = ? AND is_read = 0 ORDER BY created_at DESC, id DESC"
        } else {
            "SELECT * FROM user_notifications WHERE user_id = ? ORDER BY created_at DESC, id DESC"
        };
        let rows = sqlx::query_as(sql)
            .bind(actor.user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn unread_count(&self, actor: &Actor) -> DbResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM user_notifications WHERE user_id = ? AND is_read = 0")
            .bind(actor.user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Marks one of the caller's notices read.
    pub async fn mark_read(&self, actor: &Actor, id: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE user_notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(actor.user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Notification", id));
        }
        Ok(())
    }

    /// Returns how many notices were marked.
    pub async fn mark_all_read(&self, actor: &Actor) -> DbResult<u64> {
        let result = sqlx::query("UPDATE user_notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
            .bind(actor.user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Records a delivered SMS against the row that triggered it.
    ///
    /// A POS receipt also flags the product-sale rows behind its items.
    /// Repairs have no flag.
    pub async fn mark_sms_sent(&self, origin: SmsOrigin) -> DbResult<()> {
        match origin {
            SmsOrigin::PosSale(id) => {
                let mut tx = self.pool.begin().await?;
                sqlx::query("UPDATE pos_sales SET sms_sent = 1 WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(
                    r#"
                    UPDATE product_sales SET sms_sent = 1
                    WHERE id IN (SELECT product_sale_id FROM pos_sale_items WHERE pos_sale_id = ?)
                    "#,
                )
                .bind(id)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
            }
            SmsOrigin::Sale(id) => {
                sqlx::query("UPDATE sales SET sms_sent = 1 WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
            SmsOrigin::Swap(id) => {
                sqlx::query("UPDATE swaps SET sms_sent = 1 WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
            SmsOrigin::Repair(_) => {}
        }
        debug!(?origin, "Marked SMS sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{company, new_product};
    use crate::repository::pos_sale::{NewPosItem, NewPosSale};
    use swapsync_core::money::Money;

    #[tokio::test]
    async fn test_mark_read_is_per_user() {
        let c = company().await;
        sqlx::query(
            "INSERT INTO user_notifications (user_id, title, message, notification_type, created_at) VALUES (?, 'Hi', 'Hello', 'info', ?)",
        )
        .bind(c.keeper.user_id)
        .bind(chrono::Utc::now())
        .execute(c.db.pool())
        .await
        .unwrap();

        let repo = c.db.notifications();
        let inbox = repo.list(&c.keeper, true).await.unwrap();
        assert_eq!(inbox.len(), 1);

        let err = repo.mark_read(&c.manager, inbox[0].id).await.unwrap_err();
        assert_eq!(err.status_code(), 404);

        repo.mark_read(&c.keeper, inbox[0].id).await.unwrap();
        assert_eq!(repo.unread_count(&c.keeper).await.unwrap(), 0);
        assert_eq!(repo.list(&c.keeper, false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pos_receipt_flags_product_sales() {
        let c = company().await;
        let product = c
            .db
            .products()
            .create_product(&c.manager, new_product("Charger", c.category_id, 50, 10))
            .await
            .unwrap();
        let sale = c
            .db
            .pos_sales()
            .create_pos_sale(
                &c.keeper,
                NewPosSale {
                    customer_name: Some("Esi".into()),
                    customer_phone: Some("0244556677".into()),
                    items: vec![NewPosItem {
                        product_id: product.id,
                        quantity: 2,
                        unit_price: Money::from_major(50),
                        discount_amount: Money::ZERO,
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        c.db.notifications().mark_sms_sent(SmsOrigin::PosSale(sale.sale.id)).await.unwrap();

        let unsent: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_sales WHERE sms_sent = 0")
            .fetch_one(c.db.pool())
            .await
            .unwrap();
        assert_eq!(unsent, 0);
        let flagged: bool = sqlx::query_scalar("SELECT sms_sent FROM pos_sales WHERE id = ?")
            .bind(sale.sale.id)
            .fetch_one(c.db.pool())
            .await
            .unwrap();
        assert!(flagged);
    }
}
