//! # Domain Entities
//!
//! Row types shared between the engines and their callers.
//!
//! ## Entity Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  User ──parent──► User          (tenancy tree)                          │
//! │   │                                                                     │
//! │   └─created_by─► Customer ◄─── Sale ───► Phone ◄─── Repair              │
//! │                     ▲  ▲                   ▲  ▲          │              │
//! │                     │  └── Swap ──new_phone┘  │          ▼              │
//! │                     │       │  ▲              │    RepairItemUsage      │
//! │                     │       │  └swapped_from──┘          │              │
//! │                     │       ▼                            ▼              │
//! │                     │  PendingResale                  Product           │
//! │                     │                                    ▲  │           │
//! │                     └── POSSale ──► POSSaleItem ─────────┘  ▼           │
//! │                                        │             StockMovement      │
//! │                                        ▼                                │
//! │                                    ProductSale                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: integer primary key, used for relations
//! - `unique_id` / `transaction_id` / `tracking_code`: human-readable,
//!   printed on receipts and tickets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::money::Money;
use crate::types::*;

/// Free-form key/value phone specs (`ram`, `storage`, `color`, ...).
pub type PhoneSpecs = BTreeMap<String, String>;

// =============================================================================
// Identity
// =============================================================================

/// A staff account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub id: i64,
    /// Role-prefixed id, e.g. `MGR-0001`.
    pub unique_id: String,
    pub username: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub full_name: String,
    /// Only meaningful for managers; drives SMS branding.
    pub company_name: Option<String>,
    pub role: Role,
    pub parent_user_id: Option<i64>,
    pub is_active: bool,
    pub use_company_sms_branding: bool,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Customers
// =============================================================================

/// Someone who buys, swaps, or brings in a repair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: i64,
    pub unique_id: String,
    pub full_name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub created_by_user_id: i64,
    /// Never serialised directly; use [`Customer::visible_deletion_code`].
    #[serde(skip_serializing, default)]
    pub deletion_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Deletion code as shown to `viewer`.
    ///
    /// - managers never see codes
    /// - staff see codes only for customers they created
    /// - super admins see every code
    pub fn visible_deletion_code(&self, viewer_id: i64, viewer_role: Role) -> Option<&str> {
        match viewer_role {
            Role::SuperAdmin => Some(&self.deletion_code),
            Role::Manager => None,
            Role::ShopKeeper | Role::Repairer if self.created_by_user_id == viewer_id => {
                Some(&self.deletion_code)
            }
            _ => None,
        }
    }
}

/// Audit trail row written when a deletion code is regenerated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CustomerCodeEvent {
    pub id: i64,
    pub customer_id: i64,
    /// Staff member who owns the code (the creator).
    pub staff_user_id: i64,
    pub regenerated_by_user_id: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Brand {
    pub id: i64,
    pub name: String,
}

// =============================================================================
// Phones
// =============================================================================

/// A serialised handset (quantity is always one).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Phone {
    pub id: i64,
    pub unique_id: String,
    pub brand: String,
    pub model: String,
    pub imei: Option<String>,
    pub condition: String,
    /// Selling price.
    pub value: Money,
    pub cost_price: Money,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub specs: PhoneSpecs,
    pub category_id: Option<i64>,
    pub brand_id: Option<i64>,
    pub status: PhoneStatus,
    /// Always equal to `status == available`.
    pub is_available: bool,
    /// Swap that handed this phone to its current owner.
    pub swapped_from_id: Option<i64>,
    pub current_owner_id: Option<i64>,
    pub current_owner_type: OwnerType,
    pub created_by_user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Phone {
    /// Short description for receipts and repair SMS ("Samsung A14").
    pub fn description(&self) -> String {
        format!("{} {}", self.brand, self.model)
    }
}

/// One ownership transition of a phone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PhoneOwnershipHistory {
    pub id: i64,
    pub phone_id: i64,
    pub owner_id: Option<i64>,
    pub owner_type: OwnerType,
    pub change_reason: ChangeReason,
    /// Id of the sale/swap/repair that caused the change.
    pub transaction_id: Option<i64>,
    pub change_date: DateTime<Utc>,
}

// =============================================================================
// Products & Ledger
// =============================================================================

/// A fungible stocked item (accessory, spare part).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    pub unique_id: String,
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub category_id: i64,
    pub brand: Option<String>,
    pub cost_price: Money,
    pub selling_price: Money,
    pub quantity: i64,
    pub min_stock_level: i64,
    pub is_active: bool,
    pub created_by_user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// In stock and sellable.
    pub fn is_available(&self) -> bool {
        self.quantity > 0 && self.is_active
    }

    /// At or below the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_stock_level
    }
}

/// One signed change of a product's quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    pub id: i64,
    pub product_id: i64,
    pub movement_type: MovementType,
    /// Negative for stock leaving the shop.
    pub quantity: i64,
    pub unit_price: Option<Money>,
    pub total_amount: Option<Money>,
    pub reference_type: Option<String>,
    pub reference_id: Option<i64>,
    pub notes: Option<String>,
    pub created_by_user_id: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// POS
// =============================================================================

/// Header of a multi-line POS sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PosSale {
    pub id: i64,
    /// `POS-YYYYMMDD-NNNN`.
    pub transaction_id: String,
    pub customer_id: i64,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub subtotal: Money,
    pub overall_discount: Money,
    pub total_amount: Money,
    pub payment_method: PaymentMethod,
    pub items_count: i64,
    pub total_quantity: i64,
    pub notes: Option<String>,
    pub sms_sent: bool,
    pub created_by_user_id: i64,
    pub created_at: DateTime<Utc>,
}

/// One line of a POS sale, with frozen product snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PosSaleItem {
    pub id: i64,
    pub pos_sale_id: i64,
    pub product_sale_id: i64,
    pub product_id: i64,
    pub product_name_snapshot: String,
    pub product_brand_snapshot: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount_amount: Money,
    pub subtotal: Money,
}

/// Per-line analytics mirror of a POS item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductSale {
    pub id: i64,
    pub customer_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub sms_sent: bool,
    pub created_by_user_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A POS sale together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosSaleWithItems {
    #[serde(flatten)]
    pub sale: PosSale,
    pub items: Vec<PosSaleItem>,
}

// =============================================================================
// Phone Sales & Swaps
// =============================================================================

/// Direct sale of a phone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: i64,
    pub customer_id: i64,
    pub phone_id: i64,
    pub original_price: Money,
    pub discount_amount: Money,
    pub amount_paid: Money,
    pub invoice_number: String,
    pub sms_sent: bool,
    pub created_by_user_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Phone-for-phone exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Swap {
    pub id: i64,
    pub customer_id: i64,
    pub given_phone_description: String,
    pub given_phone_value: Money,
    pub given_phone_imei: Option<String>,
    /// Set when the trade-in was stocked as its own phone row.
    pub given_phone_id: Option<i64>,
    pub new_phone_id: i64,
    pub balance_paid: Money,
    pub discount_amount: Money,
    pub final_price: Money,
    pub resale_status: ResaleStatus,
    pub resale_value: Money,
    pub profit_or_loss: Money,
    pub invoice_number: String,
    pub sms_sent: bool,
    pub created_by_user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Workbench row for an acquired trade-in awaiting resale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PendingResale {
    pub id: i64,
    pub unique_id: String,
    pub sold_phone_id: i64,
    /// Value of the outbound phone captured when the row was created.
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
    pub created_by_user_id: i64,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl PendingResale {
    /// True once sold or written off.
    pub fn is_settled(&self) -> bool {
        self.settled_at.is_some()
            || self.profit_status != ProfitStatus::Pending
            || matches!(
                self.incoming_phone_status,
                Some(IncomingPhoneStatus::Sold | IncomingPhoneStatus::Lost)
            )
    }
}

/// Printable record of a sale or swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    pub transaction_type: InvoiceType,
    pub transaction_id: i64,
    pub customer_id: i64,
    pub amount: Money,
    pub created_by_user_id: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Repairs
// =============================================================================

/// A repair job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Repair {
    pub id: i64,
    pub unique_id: String,
    /// `REP-YYYYMMDD-XXXX`, printed on the ticket.
    pub tracking_code: String,
    pub customer_id: i64,
    pub phone_id: Option<i64>,
    pub phone_description: String,
    pub issue_description: String,
    pub diagnosis: Option<String>,
    pub service_cost: Money,
    pub items_cost: Money,
    /// Always `service_cost + items_cost`.
    pub cost: Money,
    pub status: RepairStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub notify_sent: bool,
    pub notify_at: Option<DateTime<Utc>>,
    pub staff_id: i64,
    pub created_by_user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A part consumed by a repair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RepairItemUsage {
    pub id: i64,
    pub repair_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    /// Product selling price at the time of use.
    pub unit_cost: Money,
    pub total_cost: Money,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Audit & Notifications
// =============================================================================

/// Short-lived one-shot code authorising an admin read of a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AuditCode {
    pub id: i64,
    pub user_id: i64,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub auto_generated: bool,
    pub created_at: DateTime<Utc>,
}

impl AuditCode {
    /// Unused and not yet expired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.expires_at > now
    }
}

/// In-app notification shown to a staff member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UserNotification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub reference_id: Option<i64>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(created_by: i64) -> Customer {
        Customer {
            id: 1,
            unique_id: "CUST-0001".into(),
            full_name: "Ama Mensah".into(),
            phone_number: "0241234567".into(),
            email: None,
            created_by_user_id: created_by,
            deletion_code: "A1B2C3".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_deletion_code_visibility() {
        let c = customer(10);
        assert_eq!(c.visible_deletion_code(10, Role::ShopKeeper), Some("A1B2C3"));
        assert_eq!(c.visible_deletion_code(11, Role::Repairer), None);
        assert_eq!(c.visible_deletion_code(2, Role::Manager), None);
        assert_eq!(c.visible_deletion_code(1, Role::SuperAdmin), Some("A1B2C3"));
    }

    #[test]
    fn test_deletion_code_never_serialised() {
        let json = serde_json::to_value(customer(10)).unwrap();
        assert!(json.get("deletion_code").is_none());
    }
}
