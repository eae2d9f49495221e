//! # Domain Enumerations
//!
//! Every closed set of values stored in a SwapSync table.
//!
//! ## Storage
//! All enums are TEXT columns. With the `sqlx` feature they derive
//! `sqlx::Type` so they bind and decode directly; serde uses the same
//! spelling so API payloads and rows agree.
//!
//! ```text
//! ┌──────────────────┬────────────────────────────────────────────────┐
//! │ Enum             │ Values                                         │
//! ├──────────────────┼────────────────────────────────────────────────┤
//! │ Role             │ super_admin manager shop_keeper repairer       │
//! │ PhoneStatus      │ available sold swapped under_repair            │
//! │ OwnerType        │ shop customer repair                           │
//! │ MovementType     │ purchase sale return adjustment damage         │
//! │ ResaleStatus     │ pending sold lost                              │
//! │ ProfitStatus     │ pending profit_made loss                       │
//! │ RepairStatus     │ Pending "In Progress" Completed Delivered ...  │
//! └──────────────────┴────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Implements `Display` and `FromStr` from a fixed list of spellings.
macro_rules! text_enum {
    ($ty:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Stored spelling of this value.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }

            /// All values, in declaration order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($text) {
                        return Ok($ty::$variant);
                    }
                )+
                Err(ValidationError::NotAllowed {
                    field: $field.to_string(),
                    allowed: vec![$($text.to_string()),+],
                })
            }
        }
    };
}

// =============================================================================
// Role
// =============================================================================

/// Staff role. Defines both permissions and the unique-id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform owner; sees every tenant.
    SuperAdmin,
    /// Shop owner; root of a company.
    Manager,
    /// Sales staff.
    ShopKeeper,
    /// Repair technician.
    Repairer,
}

text_enum!(Role, "role", {
    SuperAdmin => "super_admin",
    Manager => "manager",
    ShopKeeper => "shop_keeper",
    Repairer => "repairer",
});

impl Role {
    /// Prefix used in `unique_id` (e.g. `MGR-0001`).
    pub const fn id_prefix(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "ADM",
            Role::Manager => "MGR",
            Role::ShopKeeper => "SHOP",
            Role::Repairer => "TECH",
        }
    }

    /// Staff roles work under a manager.
    pub const fn is_staff(&self) -> bool {
        matches!(self, Role::ShopKeeper | Role::Repairer)
    }
}

// =============================================================================
// Phone
// =============================================================================

/// Lifecycle status of a serialised phone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PhoneStatus {
    Available,
    Sold,
    Swapped,
    UnderRepair,
}

text_enum!(PhoneStatus, "status", {
    Available => "available",
    Sold => "sold",
    Swapped => "swapped",
    UnderRepair => "under_repair",
});

impl PhoneStatus {
    /// `is_available` is derived from status and never set independently.
    pub const fn is_available(&self) -> bool {
        matches!(self, PhoneStatus::Available)
    }
}

/// Who currently holds a phone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    Shop,
    Customer,
    Repair,
}

text_enum!(OwnerType, "owner_type", {
    Shop => "shop",
    Customer => "customer",
    Repair => "repair",
});

/// Reason recorded on a phone ownership history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Phone entered stock (create or import).
    Intake,
    /// Customer handed the phone over as part of a swap.
    TradeIn,
    /// Sold outright.
    Sale,
    /// Given to a customer in a swap.
    Swap,
    /// Trade-in resold.
    Resale,
    RepairIntake,
    RepairCompleted,
    RepairCancelled,
}

text_enum!(ChangeReason, "change_reason", {
    Intake => "intake",
    TradeIn => "trade_in",
    Sale => "sale",
    Swap => "swap",
    Resale => "resale",
    RepairIntake => "repair_intake",
    RepairCompleted => "repair_completed",
    RepairCancelled => "repair_cancelled",
});

// =============================================================================
// Stock
// =============================================================================

/// Reason for a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Purchase,
    Sale,
    Return,
    Adjustment,
    Damage,
}

text_enum!(MovementType, "movement_type", {
    Purchase => "purchase",
    Sale => "sale",
    Return => "return",
    Adjustment => "adjustment",
    Damage => "damage",
});

/// How a POS sale was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    MobileMoney,
    Card,
    BankTransfer,
}

text_enum!(PaymentMethod, "payment_method", {
    Cash => "cash",
    MobileMoney => "mobile_money",
    Card => "card",
    BankTransfer => "bank_transfer",
});

// =============================================================================
// Swap & Resale
// =============================================================================

/// Resale state of a swap's trade-in, as seen from the Swap row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ResaleStatus {
    Pending,
    Sold,
    Lost,
}

text_enum!(ResaleStatus, "resale_status", {
    Pending => "pending",
    Sold => "sold",
    Lost => "lost",
});

/// State of the incoming phone on a pending resale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum IncomingPhoneStatus {
    Available,
    Sold,
    Lost,
}

text_enum!(IncomingPhoneStatus, "incoming_phone_status", {
    Available => "available",
    Sold => "sold",
    Lost => "lost",
});

/// Outcome passed when settling a pending resale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResaleOutcome {
    Sold,
    Lost,
}

text_enum!(ResaleOutcome, "status", {
    Sold => "sold",
    Lost => "lost",
});

/// Transaction that produced a pending resale row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Swap,
    DirectSale,
}

text_enum!(TransactionType, "transaction_type", {
    Swap => "swap",
    DirectSale => "direct_sale",
});

/// P&L classification of a pending resale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ProfitStatus {
    Pending,
    ProfitMade,
    Loss,
}

text_enum!(ProfitStatus, "profit_status", {
    Pending => "pending",
    ProfitMade => "profit_made",
    Loss => "loss",
});

/// Kind of transaction an invoice documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Sale,
    Swap,
}

text_enum!(InvoiceType, "transaction_type", {
    Sale => "sale",
    Swap => "swap",
});

// =============================================================================
// Repair
// =============================================================================

/// Repair job status. Stored with the display spelling used on tickets.
///
/// ```text
/// Pending ──► In Progress ──► Completed ──► Delivered
///    │             │              │
///    └─────────────┴──────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
pub enum RepairStatus {
    Pending,
    #[serde(rename = "In Progress")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "In Progress"))]
    InProgress,
    Completed,
    Delivered,
    Cancelled,
}

text_enum!(RepairStatus, "status", {
    Pending => "Pending",
    InProgress => "In Progress",
    Completed => "Completed",
    Delivered => "Delivered",
    Cancelled => "Cancelled",
});

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_prefixes() {
        assert_eq!(Role::SuperAdmin.id_prefix(), "ADM");
        assert_eq!(Role::Manager.id_prefix(), "MGR");
        assert_eq!(Role::ShopKeeper.id_prefix(), "SHOP");
        assert_eq!(Role::Repairer.id_prefix(), "TECH");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Available".parse::<PhoneStatus>().unwrap(), PhoneStatus::Available);
        assert_eq!("in progress".parse::<RepairStatus>().unwrap(), RepairStatus::InProgress);
        assert!("broken".parse::<PhoneStatus>().is_err());
    }

    #[test]
    fn test_serde_spelling_matches_storage() {
        let json = serde_json::to_string(&RepairStatus::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");
        let json = serde_json::to_string(&ProfitStatus::ProfitMade).unwrap();
        assert_eq!(json, "\"profit_made\"");
        for status in PhoneStatus::ALL {
            let json = serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }
}
