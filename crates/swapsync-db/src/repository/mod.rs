//! # Repository Module
//!
//! Database repositories and transaction engines for SwapSync.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  caller (HTTP handler, scheduler, seed)                                 │
//! │       │  db.swaps().create_swap(&actor, new_swap)                       │
//! │       ▼                                                                 │
//! │  SwapRepository                                                         │
//! │  ├── authorise (Role::permits) + scope (CompanyScope)                   │
//! │  ├── validate (swapsync_core::pricing / validation)                     │
//! │  ├── BEGIN ... shared helpers on &mut SqliteConnection ... COMMIT       │
//! │  └── publish Notification (after commit only)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Helpers that several engines share (stock ledger, ownership history,
//! company scope) take `&mut SqliteConnection` so they run inside whichever
//! transaction the caller opened.
//!
//! ## Available Repositories
//!
//! - [`user::UserRepository`] - Staff accounts, company scope, SMS sender
//! - [`customer::CustomerRepository`] - Customers and the deletion protocol
//! - [`catalog::CatalogRepository`] - Categories and brands
//! - [`phone::PhoneRepository`] - Serialised phones
//! - [`product::ProductRepository`] - Products and the stock ledger
//! - [`pos_sale::PosSaleRepository`] - Multi-line POS engine
//! - [`sale::SaleRepository`] - Direct phone sales
//! - [`swap::SwapRepository`] - Swaps, pending resales, swap chains
//! - [`repair::RepairRepository`] - Repair lifecycle
//! - [`audit::AuditCodeRepository`] - One-shot admin audit codes
//! - [`sms_config::SmsConfigRepository`] - Encrypted SMS provider settings
//! - [`notification::NotificationRepository`] - In-app notices, SMS flags

pub mod audit;
pub mod catalog;
pub mod customer;
pub mod notification;
pub mod phone;
pub mod pos_sale;
pub mod product;
pub mod repair;
pub mod sale;
pub mod sms_config;
pub mod swap;
pub mod user;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use swapsync_core::CompanyScope;

use crate::error::{DbError, DbResult};

/// Appends ` AND <column> IN (...)` for a restricted scope.
///
/// An empty id list matches nothing.
pub(crate) fn push_scope(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, scope: &CompanyScope) {
    let Some(ids) = scope.user_ids() else {
        return;
    };
    if ids.is_empty() {
        qb.push(" AND 0");
        return;
    }
    qb.push(" AND ").push(column).push(" IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

/// Cross-tenant rows look exactly like missing rows.
pub(crate) fn ensure_visible(
    scope: &CompanyScope,
    created_by_user_id: i64,
    entity: &str,
    id: impl ToString,
) -> DbResult<()> {
    if scope.contains(created_by_user_id) {
        Ok(())
    } else {
        Err(DbError::not_found(entity, id))
    }
}

/// Writes `PREFIX-NNNN` into `<table>.unique_id` for a fresh row.
pub(crate) async fn assign_unique_id(
    conn: &mut SqliteConnection,
    table: &'static str,
    id: i64,
    unique_id: &str,
) -> DbResult<()> {
    let sql = format!("UPDATE {} SET unique_id = ? WHERE id = ?", table);
    sqlx::query(&sql)
        .bind(unique_id)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Current time, the single clock all engines stamp rows with.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

// =============================================================================
// Test Fixtures
// =============================================================================

#[cfg(test)]
pub(crate) mod fixtures {
    //! A small company used by the repository tests:
    //! super admin, one manager, a shop keeper and a repairer under them,
    //! plus a second unrelated manager.

    use swapsync_core::money::Money;
    use swapsync_core::{Actor, Role};

    use crate::repository::customer::NewCustomer;
    use crate::repository::phone::NewPhone;
    use crate::repository::product::NewProduct;
    use crate::repository::user::NewUser;
    use crate::{Database, DbConfig};

    pub struct Company {
        pub db: Database,
        pub admin: Actor,
        pub manager: Actor,
        pub keeper: Actor,
        pub repairer: Actor,
        pub other_manager: Actor,
        pub category_id: i64,
    }

    pub fn new_user(username: &str, role: Role) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "secret123".to_string(),
            full_name: format!("{} user", username),
            email: None,
            phone_number: Some("0241112222".to_string()),
            role,
            company_name: if role == Role::Manager {
                Some("TechFix Accra".to_string())
            } else {
                None
            },
            use_company_sms_branding: false,
        }
    }

    pub async fn company() -> Company {
        company_with(Database::new(DbConfig::in_memory()).await.unwrap()).await
    }

    pub async fn company_with(db: Database) -> Company {
        let users = db.users();
        let admin = users
            .bootstrap_super_admin("root", "secret123", "Root Admin")
            .await
            .unwrap();
        let admin = Actor::new(admin.id, Role::SuperAdmin, None);

        let manager = users
            .create_user(&admin, new_user("manager", Role::Manager))
            .await
            .unwrap();
        let manager = Actor::new(manager.id, Role::Manager, None);

        let keeper = users
            .create_user(&manager, new_user("keeper", Role::ShopKeeper))
            .await
            .unwrap();
        let keeper = Actor::new(keeper.id, Role::ShopKeeper, Some(manager.user_id));

        let repairer = users
            .create_user(&manager, new_user("tech", Role::Repairer))
            .await
            .unwrap();
        let repairer = Actor::new(repairer.id, Role::Repairer, Some(manager.user_id));

        let other = users
            .create_user(&admin, new_user("rival", Role::Manager))
            .await
            .unwrap();
        let other_manager = Actor::new(other.id, Role::Manager, None);

        let category_id = db
            .catalog()
            .find_or_create_category("Accessories")
            .await
            .unwrap()
            .id;

        Company {
            db,
            admin,
            manager,
            keeper,
            repairer,
            other_manager,
            category_id,
        }
    }

    pub fn new_customer(name: &str, phone: &str) -> NewCustomer {
        NewCustomer {
            full_name: name.to_string(),
            phone_number: phone.to_string(),
            email: None,
        }
    }

    pub fn new_phone(brand: &str, model: &str, value: i64) -> NewPhone {
        NewPhone {
            brand: brand.to_string(),
            model: model.to_string(),
            imei: None,
            condition: "Good".to_string(),
            value: Money::from_major(value),
            cost_price: Money::from_major(value * 8 / 10),
            specs: Default::default(),
            category_id: None,
        }
    }

    pub fn new_product(name: &str, category_id: i64, price: i64, quantity: i64) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            description: None,
            sku: None,
            barcode: None,
            category_id,
            brand: None,
            cost_price: Money::from_major(price / 2),
            selling_price: Money::from_major(price),
            quantity,
            min_stock_level: 2,
        }
    }
}
