//! # Identifiers
//!
//! Human-readable identifier formats and random codes.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────┬────────────────────┐
//! │ Entity               │ Format                   │ Source             │
//! ├──────────────────────┼──────────────────────────┼────────────────────┤
//! │ User                 │ MGR-0001                 │ role prefix + id   │
//! │ Customer/Phone/Prod  │ CUST-0001 PHON-0001 ...  │ prefix + id        │
//! │ POS transaction      │ POS-20240115-0003        │ date + day counter │
//! │ Repair tracking      │ REP-20240115-K7Q2        │ date + random      │
//! │ Invoice              │ INV-20240115-0042        │ date + invoice id  │
//! │ Deletion code        │ A1B2C3                   │ random [A-Z0-9]{6} │
//! │ Audit code           │ 048213                   │ random [0-9]{6}    │
//! └──────────────────────┴──────────────────────────┴────────────────────┘
//! ```

use chrono::NaiveDate;
use rand::distributions::{Alphanumeric, Distribution, Uniform};
use rand::Rng;

use crate::types::Role;

/// Prefix for customer ids.
pub const CUSTOMER_PREFIX: &str = "CUST";
/// Prefix for phone ids.
pub const PHONE_PREFIX: &str = "PHON";
/// Prefix for product ids.
pub const PRODUCT_PREFIX: &str = "PROD";
/// Prefix for repair ids.
pub const REPAIR_PREFIX: &str = "RPR";
/// Prefix for pending resale ids.
pub const RESALE_PREFIX: &str = "RSL";

/// Length of a customer deletion code.
pub const DELETION_CODE_LEN: usize = 6;
/// Length of an audit code.
pub const AUDIT_CODE_LEN: usize = 6;
/// Length of the random tail of a repair tracking code.
pub const TRACKING_SUFFIX_LEN: usize = 4;

/// `PREFIX-NNNN` with at least four digits.
pub fn sequential_id(prefix: &str, n: i64) -> String {
    format!("{}-{:04}", prefix, n)
}

/// Role-prefixed user id, e.g. `TECH-0012`.
pub fn user_unique_id(role: Role, n: i64) -> String {
    sequential_id(role.id_prefix(), n)
}

/// `POS-` plus the date, as used for the same-day prefix search.
pub fn pos_transaction_prefix(date: NaiveDate) -> String {
    format!("POS-{}-", date.format("%Y%m%d"))
}

/// Full POS transaction id, `POS-YYYYMMDD-NNNN`.
pub fn pos_transaction_id(date: NaiveDate, sequence: i64) -> String {
    format!("{}{:04}", pos_transaction_prefix(date), sequence)
}

/// Extracts the counter from a POS transaction id.
///
/// ## Example
/// ```rust
/// use swapsync_core::identifiers::pos_sequence;
///
/// assert_eq!(pos_sequence("POS-20240115-0042"), Some(42));
/// assert_eq!(pos_sequence("INV-1"), None);
/// ```
pub fn pos_sequence(transaction_id: &str) -> Option<i64> {
    let rest = transaction_id.strip_prefix("POS-")?;
    let (date, seq) = rest.split_once('-')?;
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    seq.parse().ok()
}

/// Invoice number, `INV-YYYYMMDD-NNNN`.
pub fn invoice_number(date: NaiveDate, invoice_id: i64) -> String {
    format!("INV-{}-{:04}", date.format("%Y%m%d"), invoice_id)
}

/// Repair tracking code with a fresh random tail.
pub fn repair_tracking_code<R: Rng + ?Sized>(date: NaiveDate, rng: &mut R) -> String {
    format!(
        "REP-{}-{}",
        date.format("%Y%m%d"),
        random_upper_alnum(rng, TRACKING_SUFFIX_LEN)
    )
}

/// Six uppercase alphanumerics.
pub fn deletion_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    random_upper_alnum(rng, DELETION_CODE_LEN)
}

/// Six decimal digits, leading zeros allowed.
pub fn audit_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let digits = Uniform::from(0..10u8);
    (0..AUDIT_CODE_LEN)
        .map(|_| char::from(b'0' + digits.sample(rng)))
        .collect()
}

fn random_upper_alnum<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    Alphanumeric
        .sample_iter(rng)
        .take(len)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn test_sequential_formats() {
        assert_eq!(sequential_id(CUSTOMER_PREFIX, 1), "CUST-0001");
        assert_eq!(sequential_id(PHONE_PREFIX, 12345), "PHON-12345");
        assert_eq!(user_unique_id(Role::Manager, 7), "MGR-0007");
        assert_eq!(user_unique_id(Role::Repairer, 3), "TECH-0003");
    }

    #[test]
    fn test_pos_transaction_id() {
        let id = pos_transaction_id(date(), 3);
        assert_eq!(id, "POS-20240115-0003");
        assert_eq!(pos_sequence(&id), Some(3));
        assert!(id.starts_with(&pos_transaction_prefix(date())));
    }

    #[test]
    fn test_random_codes_shape() {
        let mut rng = StdRng::seed_from_u64(7);

        let code = deletion_code(&mut rng);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

        let audit = audit_code(&mut rng);
        assert_eq!(audit.len(), 6);
        assert!(audit.chars().all(|c| c.is_ascii_digit()));

        let tracking = repair_tracking_code(date(), &mut rng);
        assert!(tracking.starts_with("REP-20240115-"));
        assert_eq!(tracking.len(), "REP-20240115-".len() + 4);
    }

    #[test]
    fn test_invoice_number() {
        assert_eq!(invoice_number(date(), 42), "INV-20240115-0042");
    }
}
