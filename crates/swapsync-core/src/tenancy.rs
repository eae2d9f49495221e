//! # Tenancy & Authorisation
//!
//! A company is a manager plus the staff accounts created under them. Every
//! domain row records `created_by_user_id`, and listings keep only rows whose
//! creator is inside the caller's company.
//!
//! ```text
//!              ┌──────────────┐
//!              │ super_admin  │   scope = every user
//!              └──────┬───────┘
//!                     │ creates
//!              ┌──────▼───────┐
//!              │   manager    │   scope = {self} ∪ children
//!              └──┬────────┬──┘
//!        creates  │        │  creates
//!      ┌──────────▼─┐    ┌─▼──────────┐
//!      │ shop_keeper│    │  repairer  │   scope = {self, parent} ∪ siblings
//!      └────────────┘    └────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::Role;

// =============================================================================
// Actions
// =============================================================================

/// Operations gated by the role matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Create a user with the given role.
    CreateUser(Role),
    ManagePhones,
    ManageProducts,
    CreateCustomer,
    EditCustomer,
    RecordPosSale,
    RecordPhoneSale,
    RecordSwap,
    /// Settle or write off a pending resale.
    SettleResale,
    CreateRepair,
    MutateRepair,
    /// Issue an audit code for the caller's own company.
    IssueAuditCode,
    /// Redeem a manager's audit code.
    RedeemAuditCode,
    ManageSmsSettings,
    ManageUsers,
}

impl Role {
    /// True if this role may perform `action` at all.
    ///
    /// Ownership checks (a repairer mutating only their own repairs, staff
    /// deleting only their own customers) are layered on top by the engines.
    pub fn permits(&self, action: Action) -> bool {
        use Action::*;
        use Role::*;

        match (self, action) {
            (SuperAdmin, CreateUser(target)) => target == Manager,
            (Manager, CreateUser(target)) => target.is_staff(),
            (_, CreateUser(_)) => false,

            (SuperAdmin | Manager, ManagePhones | ManageProducts) => true,

            (SuperAdmin | ShopKeeper | Repairer, CreateCustomer | EditCustomer) => true,

            (SuperAdmin | ShopKeeper, RecordPosSale | RecordPhoneSale) => true,

            (SuperAdmin | Manager | ShopKeeper, RecordSwap | SettleResale) => true,

            (SuperAdmin | ShopKeeper | Repairer, CreateRepair) => true,
            (_, MutateRepair) => true,

            (Manager, IssueAuditCode) => true,
            (SuperAdmin, RedeemAuditCode | ManageSmsSettings) => true,
            (SuperAdmin | Manager, ManageUsers) => true,

            _ => false,
        }
    }
}

// =============================================================================
// Actor
// =============================================================================

/// The authenticated caller of an engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
    /// Manager of a staff account.
    pub parent_user_id: Option<i64>,
}

impl Actor {
    pub fn new(user_id: i64, role: Role, parent_user_id: Option<i64>) -> Self {
        Actor {
            user_id,
            role,
            parent_user_id,
        }
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    /// Fails with [`CoreError::Forbidden`] unless the role permits `action`.
    pub fn authorize(&self, action: Action) -> CoreResult<()> {
        if self.role.permits(action) {
            Ok(())
        } else {
            Err(CoreError::forbidden(format!(
                "{} may not perform {:?}",
                self.role, action
            )))
        }
    }

    /// Repairers may only touch repairs assigned to them.
    pub fn authorize_repair(&self, repair_staff_id: i64) -> CoreResult<()> {
        self.authorize(Action::MutateRepair)?;
        if self.role == Role::Repairer && repair_staff_id != self.user_id {
            return Err(CoreError::forbidden("repair is assigned to another technician"));
        }
        Ok(())
    }

    /// The manager at the root of this caller's company.
    pub fn company_root(&self) -> Option<i64> {
        match self.role {
            Role::SuperAdmin => None,
            Role::Manager => Some(self.user_id),
            Role::ShopKeeper | Role::Repairer => self.parent_user_id,
        }
    }
}

// =============================================================================
// Company Scope
// =============================================================================

/// Set of user ids whose rows a caller may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyScope {
    /// No filter (super admin, or an audited admin read).
    All,
    /// Only rows created by these users.
    Users(Vec<i64>),
}

impl CompanyScope {
    /// Builds a scope from a raw id list, dropping duplicates.
    pub fn users(mut ids: Vec<i64>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        CompanyScope::Users(ids)
    }

    /// True if rows created by `user_id` are visible.
    pub fn contains(&self, user_id: i64) -> bool {
        match self {
            CompanyScope::All => true,
            CompanyScope::Users(ids) => ids.binary_search(&user_id).is_ok(),
        }
    }

    /// Ids for an `IN (...)` filter, or `None` when unfiltered.
    pub fn user_ids(&self) -> Option<&[i64]> {
        match self {
            CompanyScope::All => None,
            CompanyScope::Users(ids) => Some(ids),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
