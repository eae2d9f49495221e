//! # swapsync-db: Database Layer and Transaction Engines for SwapSync
//!
//! Every read and write of shop data goes through this crate. Each engine
//! operation is one SQLite transaction; customer-facing notifications are
//! published only after it commits.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SwapSync Data Flow                               │
//! │                                                                         │
//! │  caller (swapsyncd handler, scheduler, seed)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  swapsync-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐    │   │
//! │  │   │   Database    │    │  Engines      │    │  Migrations  │    │   │
//! │  │   │   (pool.rs)   │    │  pos_sale     │    │  (embedded)  │    │   │
//! │  │   │               │◄───│  swap / sale  │    │              │    │   │
//! │  │   │ SqlitePool    │    │  repair       │    │ 0001_*.sql   │    │   │
//! │  │   │ Notifier      │    │  customer ... │    │              │    │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘    │   │
//! │  │                                │ after commit                   │   │
//! │  └────────────────────────────────┼────────────────────────────────┘   │
//! │       │                           ▼                                     │
//! │       ▼                    NotificationSink (swapsync-notify)           │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and repository accessors
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repositories and transaction engines
//! - [`import`] - CSV bulk import of phones and products
//!
//! ## Usage
//!
//! ```rust,ignore
//! use swapsync_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("swapsync.db")).await?;
//! let actor = db.users().actor(user_id).await?;
//! let phones = db.phones().search_available(&actor, PhoneSearch::default()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod import;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use import::{parse_sheet, ImportReport, ImportSheet, Importer, SheetKind};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::audit::{AuditCodeRepository, AuditGrant};
pub use repository::catalog::CatalogRepository;
pub use repository::customer::{CustomerDeletion, CustomerRepository, CustomerUpdate, CustomerView, NewCustomer};
pub use repository::notification::NotificationRepository;
pub use repository::phone::{BulkDeleteReport, NewPhone, PhoneRepository, PhoneSearch, PhoneUpdate};
pub use repository::pos_sale::{NewPosItem, NewPosSale, PosSaleRepository, PosSummary};
pub use repository::product::{InventorySummary, NewProduct, ProductRepository, ProductUpdate};
pub use repository::repair::{NewRepair, RepairPart, RepairRepository, RepairUpdate};
pub use repository::sale::{NewSale, SaleRecord, SaleRepository};
pub use repository::sms_config::{SmsConfigRepository, SmsConfigRow};
pub use repository::swap::{GivenPhone, NewSwap, ProfitSummary, SwapLink, SwapRecord, SwapRepository};
pub use repository::user::{NewUser, UserRepository};
