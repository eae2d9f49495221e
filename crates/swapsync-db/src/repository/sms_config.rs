//! # SMS Config Repository
//!
//! The singleton `sms_config` row. Credentials arrive already encrypted;
//! `swapsync-notify` owns the key and the decrypted cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::info;

use crate::error::DbResult;
use crate::repository::now;

/// Stored SMS provider settings. Secret columns hold Fernet tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SmsConfigRow {
    pub arkesel_api_key: Option<String>,
    pub arkesel_sender_id: Option<String>,
    pub arkesel_enabled: bool,
    pub hubtel_client_id: Option<String>,
    pub hubtel_client_secret: Option<String>,
    pub hubtel_sender_id: Option<String>,
    pub hubtel_enabled: bool,
    pub sms_enabled: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Repository for the SMS settings row.
#[derive(Debug, Clone)]
pub struct SmsConfigRepository {
    pool: SqlitePool,
}

impl SmsConfigRepository {
    /// Creates a new SmsConfigRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SmsConfigRepository { pool }
    }

    /// The stored row, or `None` before the first save.
    pub async fn get(&self) -> DbResult<Option<SmsConfigRow>> {
        let row = sqlx::query_as(
            r#"
            SELECT arkesel_api_key, arkesel_sender_id, arkesel_enabled,
                   hubtel_client_id, hubtel_client_secret, hubtel_sender_id, hubtel_enabled,
                   sms_enabled, updated_at
            FROM sms_config WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Writes the row, creating it on first use.
    pub async fn upsert(&self, row: &SmsConfigRow) -> DbResult<SmsConfigRow> {
        let updated_at = now();
        sqlx::query(
            r#"
            INSERT INTO sms_config (
                id, arkesel_api_key, arkesel_sender_id, arkesel_enabled,
                hubtel_client_id, hubtel_client_secret, hubtel_sender_id, hubtel_enabled,
                sms_enabled, updated_at
            ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                arkesel_api_key = excluded.arkesel_api_key,
                arkesel_sender_id = excluded.arkesel_sender_id,
                arkesel_enabled = excluded.arkesel_enabled,
                hubtel_client_id = excluded.hubtel_client_id,
                hubtel_client_secret = excluded.hubtel_client_secret,
                hubtel_sender_id = excluded.hubtel_sender_id,
                hubtel_enabled = excluded.hubtel_enabled,
                sms_enabled = excluded.sms_enabled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.arkesel_api_key)
        .bind(&row.arkesel_sender_id)
        .bind(row.arkesel_enabled)
        .bind(&row.hubtel_client_id)
        .bind(&row.hubtel_client_secret)
        .bind(&row.hubtel_sender_id)
        .bind(row.hubtel_enabled)
        .bind(row.sms_enabled)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        info!(
            sms_enabled = row.sms_enabled,
            arkesel = row.arkesel_enabled,
            hubtel = row.hubtel_enabled,
            "Saved SMS settings"
        );
        Ok(SmsConfigRow {
            updated_at: Some(updated_at),
            ..row.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_upsert_keeps_single_row() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sms_config();
        assert!(repo.get().await.unwrap().is_none());

        let mut row = SmsConfigRow {
            arkesel_api_key: Some("token-a".into()),
            arkesel_enabled: true,
            sms_enabled: true,
            ..Default::default()
        };
        repo.upsert(&row).await.unwrap();

        row.hubtel_client_id = Some("token-b".into());
        row.hubtel_client_secret = Some("token-c".into());
        row.hubtel_enabled = true;
        repo.upsert(&row).await.unwrap();

        let stored = repo.get().await.unwrap().unwrap();
        assert!(stored.hubtel_enabled);
        assert_eq!(stored.arkesel_api_key.as_deref(), Some("token-a"));
        assert!(stored.updated_at.is_some());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sms_config")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
