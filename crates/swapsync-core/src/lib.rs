//! # swapsync-core: Pure Business Logic for SwapSync
//!
//! This crate holds every rule of the shop back office that can be expressed
//! without touching a database or the network.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SwapSync Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Web client (staff, repairers, shop owners)               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ HTTP (external)                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ swapsync-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐          │   │
//! │  │   │  money   │ │ pricing  │ │ tenancy  │ │  repair  │          │   │
//! │  │   │  Money   │ │ POS/Swap │ │  Role    │ │  state   │          │   │
//! │  │   │ pesewas  │ │  math    │ │  Scope   │ │ machine  │          │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────┘          │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────┐      │   │
//! │  │   │  phone   │ │ calendar │ │identifiers│ │ notification │      │   │
//! │  │   │ 233xxxx  │ │ holidays │ │ POS-/REP- │ │  events+sink │      │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────────┘      │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          swapsync-db (engines, transactions, SQLite)            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Enumerations stored in the database (roles, statuses)
//! - [`entities`] - Row types shared by the engines
//! - [`money`] - Integer money with a decimal API surface
//! - [`pricing`] - POS totals, swap guard, resale P&L, repair cost
//! - [`tenancy`] - Role matrix and company scopes
//! - [`repair`] - Repair status transitions
//! - [`identifiers`] - Human-readable id formats and random codes
//! - [`phone`] - Ghanaian phone number normalisation
//! - [`calendar`] - Public holidays for broadcast SMS
//! - [`notification`] - Events published by the engines
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod calendar;
pub mod entities;
pub mod error;
pub mod identifiers;
pub mod money;
pub mod notification;
pub mod phone;
pub mod pricing;
pub mod repair;
pub mod tenancy;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use entities::*;
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use notification::{NoOpSink, Notification, NotificationSink, ReceiptLine, RecordingSink, SmsOrigin};
pub use tenancy::{Action, Actor, CompanyScope};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Display name of the synthetic customer used for POS sales without one.
pub const WALK_IN_CUSTOMER_NAME: &str = "Walk-In Customer";

/// Phone number reserved for the walk-in customer row.
pub const WALK_IN_CUSTOMER_PHONE: &str = "0000000000";

/// SMS sender id used when a tenant has no company branding.
pub const DEFAULT_SMS_SENDER: &str = "SwapSync";

/// Validity window of an audit code.
pub const AUDIT_CODE_TTL_SECS: i64 = 90;

/// Repairs due within this many hours trigger a due-soon notification.
pub const REPAIR_DUE_WINDOW_HOURS: i64 = 24;

/// Maximum quantity on a single POS line or repair usage.
pub const MAX_ITEM_QUANTITY: i64 = 9_999;

/// Maximum number of lines on one POS sale.
pub const MAX_SALE_LINES: usize = 200;
