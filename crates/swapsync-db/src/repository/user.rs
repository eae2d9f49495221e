//! # User Repository
//!
//! Staff accounts, the tenancy tree, and everything derived from it.
//!
//! ## Company Scope
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  super_admin  ──► All                                                   │
//! │  manager M    ──► {M} ∪ {u | u.parent = M}                              │
//! │  staff S (P)  ──► {S, P} ∪ {u | u.parent = P}                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## SMS Sender
//! A manager with branding on sends as their company name; staff inherit
//! their manager's choice; everyone else sends as `SwapSync`.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use swapsync_core::identifiers::user_unique_id;
use swapsync_core::notification::sms_sender_id;
use swapsync_core::validation::{
    validate_email, validate_optional, validate_password, validate_phone_number,
    validate_required, validate_username,
};
use swapsync_core::{Action, Actor, CompanyScope, CoreError, Role, User, DEFAULT_SMS_SENDER};

use crate::error::{DbError, DbResult};
use crate::repository::{assign_unique_id, ensure_visible, now, push_scope};

/// Input for [`UserRepository::create_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub role: Role,
    /// Managers only.
    pub company_name: Option<String>,
    pub use_company_sms_branding: bool,
}

/// Repository for staff accounts.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Creates a user under the caller.
    ///
    /// ## Rules
    /// - super admin creates managers (no parent)
    /// - a manager creates shop keepers and repairers (parent = manager)
    /// - staff cannot create users
    pub async fn create_user(&self, actor: &Actor, new: NewUser) -> DbResult<User> {
        actor.authorize(Action::CreateUser(new.role))?;

        let parent = match actor.role {
            Role::Manager => Some(actor.user_id),
            _ => None,
        };
        self.insert_user(new, parent).await
    }

    /// Creates the first super admin if no super admin exists yet.
    ///
    /// Returns the existing super admin otherwise. Used by the seed binary
    /// and the daemon's first start.
    pub async fn bootstrap_super_admin(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
    ) -> DbResult<User> {
        let existing: Option<User> = sqlx::query_as(
            "SELECT * FROM users WHERE role = 'super_admin' ORDER BY id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        if let Some(user) = existing {
            return Ok(user);
        }

        let user = self
            .insert_user(
                NewUser {
                    username: username.to_string(),
                    password: password.to_string(),
                    full_name: full_name.to_string(),
                    email: None,
                    phone_number: None,
                    role: Role::SuperAdmin,
                    company_name: None,
                    use_company_sms_branding: false,
                },
                None,
            )
            .await?;
        info!(id = user.id, username = %user.username, "Bootstrapped super admin");
        Ok(user)
    }

    async fn insert_user(&self, new: NewUser, parent_user_id: Option<i64>) -> DbResult<User> {
        let username = validate_username(&new.username)?;
        validate_password(&new.password)?;
        let full_name = validate_required("full_name", &new.full_name, 120)?;
        let email = match validate_optional("email", new.email.as_deref(), 254)? {
            Some(email) => Some(validate_email(&email)?),
            None => None,
        };
        let phone_number = match validate_optional("phone_number", new.phone_number.as_deref(), 32)? {
            Some(phone) => Some(validate_phone_number("phone_number", &phone)?),
            None => None,
        };
        let company_name = if new.role == Role::Manager {
            validate_optional("company_name", new.company_name.as_deref(), 120)?
        } else {
            None
        };
        let password_hash = hash_password(&new.password)?;
        let created_at = now();

        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (
                username, email, phone_number, full_name, company_name,
                role, parent_user_id, is_active, use_company_sms_branding,
                password_hash, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&username)
        .bind(&email)
        .bind(&phone_number)
        .bind(&full_name)
        .bind(&company_name)
        .bind(new.role)
        .bind(parent_user_id)
        .bind(new.use_company_sms_branding && new.role == Role::Manager)
        .bind(&password_hash)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: username.clone(),
            },
            other => other,
        })?;

        let unique_id = user_unique_id(new.role, id);
        assign_unique_id(&mut tx, "users", id, &unique_id).await?;
        let user = fetch_user(&mut tx, id).await?;
        tx.commit().await?;

        info!(id, unique_id = %unique_id, role = %new.role, "Created user");
        Ok(user)
    }

    /// Gets a user by ID.
    pub async fn get(&self, id: i64) -> DbResult<User> {
        let mut conn = self.pool.acquire().await?;
        fetch_user(&mut conn, id).await
    }

    /// Gets a user by username.
    pub async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Checks a username/password pair.
    ///
    /// Returns `None` for an unknown user, a wrong password, or an inactive
    /// account, without saying which.
    pub async fn verify_credentials(&self, username: &str, password: &str) -> DbResult<Option<User>> {
        let Some(user) = self.get_by_username(username).await? else {
            return Ok(None);
        };
        if !user.is_active || !verify_password(password, &user.password_hash) {
            debug!(username = %username, "Credential check failed");
            return Ok(None);
        }
        Ok(Some(user))
    }

    /// Builds the [`Actor`] for an authenticated user id.
    pub async fn actor(&self, user_id: i64) -> DbResult<Actor> {
        let user = self.get(user_id).await?;
        if !user.is_active {
            return Err(CoreError::forbidden("account is deactivated").into());
        }
        Ok(Actor::new(user.id, user.role, user.parent_user_id))
    }

    /// Company user-id set for the caller.
    pub async fn company_scope(&self, actor: &Actor) -> DbResult<CompanyScope> {
        let mut conn = self.pool.acquire().await?;
        company_scope(&mut conn, actor).await
    }

    /// Users visible to the caller.
    pub async fn list_users(&self, actor: &Actor) -> DbResult<Vec<User>> {
        actor.authorize(Action::ManageUsers)?;
        let scope = self.company_scope(actor).await?;

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM users WHERE 1 = 1");
        push_scope(&mut qb, "id", &scope);
        qb.push(" ORDER BY id");

        let users = qb.build_query_as::<User>().fetch_all(&self.pool).await?;
        debug!(count = users.len(), "Listed users");
        Ok(users)
    }

    /// Activates or deactivates an account in the caller's company.
    pub async fn set_active(&self, actor: &Actor, user_id: i64, active: bool) -> DbResult<User> {
        actor.authorize(Action::ManageUsers)?;
        if user_id == actor.user_id {
            return Err(CoreError::Precondition("cannot change your own active flag".into()).into());
        }
        let scope = self.company_scope(actor).await?;
        ensure_visible(&scope, user_id, "User", user_id)?;

        sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        info!(user_id, active, by = actor.user_id, "Changed user active flag");
        self.get(user_id).await
    }

    /// Turns company SMS branding on or off for a manager.
    pub async fn update_sms_branding(&self, actor: &Actor, manager_id: i64, enabled: bool) -> DbResult<User> {
        let allowed = actor.is_super_admin() || (actor.role == Role::Manager && actor.user_id == manager_id);
        if !allowed {
            return Err(CoreError::forbidden("only the manager or an admin may change branding").into());
        }
        let manager = self.get(manager_id).await?;
        if manager.role != Role::Manager {
            return Err(CoreError::Precondition("SMS branding applies to managers only".into()).into());
        }

        sqlx::query("UPDATE users SET use_company_sms_branding = ? WHERE id = ?")
            .bind(enabled)
            .bind(manager_id)
            .execute(&self.pool)
            .await?;

        info!(manager_id, enabled, "Updated SMS branding");
        self.get(manager_id).await
    }

    /// Sender id for messages sent on behalf of `user_id`.
    pub async fn resolve_sms_sender(&self, user_id: i64) -> DbResult<String> {
        let mut conn = self.pool.acquire().await?;
        resolve_sms_sender(&mut conn, user_id).await
    }

    /// Active managers with a phone number, for broadcasts.
    pub async fn active_managers_with_phone(&self) -> DbResult<Vec<User>> {
        let managers = sqlx::query_as(
            r#"
            SELECT * FROM users
            WHERE role = 'manager' AND is_active = 1
              AND phone_number IS NOT NULL AND phone_number != ''
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(managers)
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

pub(crate) async fn fetch_user(conn: &mut SqliteConnection, id: i64) -> DbResult<User> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("User", id))
}

pub(crate) async fn company_scope(conn: &mut SqliteConnection, actor: &Actor) -> DbResult<CompanyScope> {
    let root = match actor.role {
        Role::SuperAdmin => return Ok(CompanyScope::All),
        Role::Manager => actor.user_id,
        Role::ShopKeeper | Role::Repairer => match actor.parent_user_id {
            Some(parent) => parent,
            None => return Ok(CompanyScope::users(vec![actor.user_id])),
        },
    };

    let mut ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM users WHERE parent_user_id = ?")
        .bind(root)
        .fetch_all(&mut *conn)
        .await?;
    ids.push(root);
    ids.push(actor.user_id);
    Ok(CompanyScope::users(ids))
}

/// The manager a user works for (themselves for managers).
pub(crate) async fn company_manager(conn: &mut SqliteConnection, user_id: i64) -> DbResult<Option<User>> {
    let user = fetch_user(conn, user_id).await?;
    match user.role {
        Role::Manager => Ok(Some(user)),
        Role::ShopKeeper | Role::Repairer => match user.parent_user_id {
            Some(parent) => Ok(Some(fetch_user(conn, parent).await?)),
            None => Ok(None),
        },
        Role::SuperAdmin => Ok(None),
    }
}

pub(crate) async fn resolve_sms_sender(conn: &mut SqliteConnection, user_id: i64) -> DbResult<String> {
    let sender = match company_manager(conn, user_id).await? {
        Some(manager) => sms_sender_id(manager.company_name.as_deref(), manager.use_company_sms_branding),
        None => DEFAULT_SMS_SENDER.to_string(),
    };
    Ok(sender)
}

/// Company display name used in message bodies.
pub(crate) async fn company_display_name(conn: &mut SqliteConnection, user_id: i64) -> DbResult<String> {
    let name = company_manager(conn, user_id)
        .await?
        .and_then(|m| m.company_name)
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SMS_SENDER.to_string());
    Ok(name)
}

fn hash_password(password: &str) -> DbResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| DbError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

// =============================================================================
// Unit Tests
// =============================================================================
