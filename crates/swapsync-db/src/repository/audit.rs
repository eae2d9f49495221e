//! # Audit Codes
//!
//! A manager hands a super admin a short-lived code; redeeming it grants a
//! single read of that manager's company.
//!
//! ```text
//! manager ── generate ──► 048213 (90 s, one shot)
//!                              │
//! super admin ── validate(manager_id, "048213")
//!                              │  UPDATE ... SET used = 1 WHERE ... AND used = 0
//!                              ▼
//!                   1 row  → AuditGrant { manager_id, scope }
//!                   0 rows → InvalidAuditCode
//! ```

use chrono::{DateTime, Duration, Utc};
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

use swapsync_core::identifiers::audit_code;
use swapsync_core::{Action, Actor, AuditCode, CompanyScope, CoreError, Role, AUDIT_CODE_TTL_SECS};

use crate::error::DbResult;
use crate::repository::now;
use crate::repository::user::{company_scope, fetch_user};

/// Read access to one company, valid for the request that redeemed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditGrant {
    pub manager_id: i64,
    pub scope: CompanyScope,
}

/// Repository for audit codes.
#[derive(Debug, Clone)]
pub struct AuditCodeRepository {
    pool: SqlitePool,
}

impl AuditCodeRepository {
    /// Creates a new AuditCodeRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditCodeRepository { pool }
    }

    /// Issues a fresh code, retiring any live one.
    pub async fn generate(&self, actor: &Actor, auto_generated: bool) -> DbResult<AuditCode> {
        actor.authorize(Action::IssueAuditCode)?;
        self.generate_at(actor, auto_generated, now()).await
    }

    async fn generate_at(&self, actor: &Actor, auto_generated: bool, at: DateTime<Utc>) -> DbResult<AuditCode> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE audit_codes SET used = 1 WHERE user_id = ? AND used = 0 AND expires_at > ?")
            .bind(actor.user_id)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        let code = audit_code(&mut thread_rng());
        let expires_at = at + Duration::seconds(AUDIT_CODE_TTL_SECS);
        let issued: AuditCode = sqlx::query_as(
            r#"
            INSERT INTO audit_codes (user_id, code, expires_at, used, auto_generated, created_at)
            VALUES (?, ?, ?, 0, ?, ?)
            RETURNING *
            "#,
        )
        .bind(actor.user_id)
        .bind(&code)
        .bind(expires_at)
        .bind(auto_generated)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(manager_id = actor.user_id, auto_generated, "Issued audit code");
        Ok(issued)
    }

    /// The caller's live code, if any.
    pub async fn current(&self, actor: &Actor) -> DbResult<Option<AuditCode>> {
        actor.authorize(Action::IssueAuditCode)?;
        let code = sqlx::query_as(
            r#"
            SELECT * FROM audit_codes
            WHERE user_id = ? AND used = 0 AND expires_at > ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(actor.user_id)
        .bind(now())
        .fetch_optional(&self.pool)
        .await?;
        Ok(code)
    }

    /// Redeems a manager's code.
    ///
    /// ## Errors
    /// - `Forbidden` unless the caller is a super admin
    /// - `InvalidAuditCode` if the code is wrong, expired, or already used
    pub async fn validate(&self, actor: &Actor, manager_id: i64, code: &str) -> DbResult<AuditGrant> {
        actor.authorize(Action::RedeemAuditCode)?;
        let mut tx = self.pool.begin().await?;

        let redeemed = sqlx::query(
            r#"
            UPDATE audit_codes SET used = 1
            WHERE user_id = ? AND code = ? AND used = 0 AND expires_at > ?
            "#,
        )
        .bind(manager_id)
        .bind(code.trim())
        .bind(now())
        .execute(&mut *tx)
        .await?;

        if redeemed.rows_affected() != 1 {
            warn!(manager_id, admin = actor.user_id, "Rejected audit code");
            return Err(CoreError::InvalidAuditCode.into());
        }

        let manager = fetch_user(&mut tx, manager_id).await?;
        let manager_actor = Actor::new(manager.id, Role::Manager, None);
        let scope = company_scope(&mut tx, &manager_actor).await?;
        tx.commit().await?;

        info!(manager_id, admin = actor.user_id, "Audit code redeemed");
        Ok(AuditGrant { manager_id, scope })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
