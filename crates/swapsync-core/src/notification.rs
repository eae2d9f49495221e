//! # Notification Events
//!
//! Engines describe customer-facing side effects as owned [`Notification`]
//! values and hand them to a [`NotificationSink`] after their transaction
//! commits. Delivery happens elsewhere (the SMS dispatcher) and never feeds
//! back into the business operation.
//!
//! ```text
//! ┌──────────────┐  commit  ┌──────────────────┐ try_send ┌────────────────┐
//! │ engine (db)  │─────────►│ NotificationSink │─────────►│ SMS dispatcher │
//! └──────────────┘          └──────────────────┘          └───────┬────────┘
//!                                                                 │ success
//!                                                 sms_sent = 1 ◄──┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Mutex;

use crate::money::Money;
use crate::types::PaymentMethod;
use crate::DEFAULT_SMS_SENDER;

/// Row whose `sms_sent` flag a successful delivery should set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SmsOrigin {
    /// A POS sale and the product-sale rows behind its items.
    PosSale(i64),
    /// A direct phone sale.
    Sale(i64),
    Swap(i64),
    /// Repairs carry no delivery flag.
    Repair(i64),
}

/// One receipt line, frozen at sale time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub subtotal: Money,
}

/// Customer-facing event published by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    PosReceipt {
        pos_sale_id: i64,
        transaction_id: String,
        phone_number: String,
        customer_name: String,
        sender: String,
        lines: Vec<ReceiptLine>,
        subtotal: Money,
        overall_discount: Money,
        total: Money,
        payment_method: PaymentMethod,
    },
    SaleReceipt {
        sale_id: i64,
        invoice_number: String,
        phone_number: String,
        customer_name: String,
        sender: String,
        phone_description: String,
        original_price: Money,
        discount: Money,
        amount_paid: Money,
    },
    SwapReceipt {
        swap_id: i64,
        invoice_number: String,
        phone_number: String,
        customer_name: String,
        sender: String,
        given_phone_description: String,
        new_phone_description: String,
        given_phone_value: Money,
        discount: Money,
        final_price: Money,
    },
    RepairCompleted {
        repair_id: i64,
        tracking_code: String,
        phone_number: String,
        customer_name: String,
        sender: String,
        company_name: String,
        phone_description: String,
        cost: Money,
    },
}

impl Notification {
    /// Recipient as stored on the customer (not yet normalised).
    pub fn phone_number(&self) -> &str {
        match self {
            Notification::PosReceipt { phone_number, .. }
            | Notification::SaleReceipt { phone_number, .. }
            | Notification::SwapReceipt { phone_number, .. }
            | Notification::RepairCompleted { phone_number, .. } => phone_number,
        }
    }

    /// Sender id resolved for the tenant.
    pub fn sender(&self) -> &str {
        match self {
            Notification::PosReceipt { sender, .. }
            | Notification::SaleReceipt { sender, .. }
            | Notification::SwapReceipt { sender, .. }
            | Notification::RepairCompleted { sender, .. } => sender,
        }
    }

    pub fn origin(&self) -> SmsOrigin {
        match self {
            Notification::PosReceipt { pos_sale_id, .. } => SmsOrigin::PosSale(*pos_sale_id),
            Notification::SaleReceipt { sale_id, .. } => SmsOrigin::Sale(*sale_id),
            Notification::SwapReceipt { swap_id, .. } => SmsOrigin::Swap(*swap_id),
            Notification::RepairCompleted { repair_id, .. } => SmsOrigin::Repair(*repair_id),
        }
    }
}

// =============================================================================
// Sender Id
// =============================================================================

/// Longest alphanumeric sender id SMS networks accept.
pub const MAX_SENDER_ID_LEN: usize = 11;

/// Sender id for a company: its name when branding is on, else the default.
///
/// The name is reduced to ASCII letters, digits and spaces, then cut to
/// [`MAX_SENDER_ID_LEN`] characters.
///
/// ## Example
/// ```rust
/// use swapsync_core::notification::sms_sender_id;
///
/// assert_eq!(sms_sender_id(Some("Kofi's Phone Hub"), true), "Kofis Phone");
/// assert_eq!(sms_sender_id(Some("Kofi's Phone Hub"), false), "SwapSync");
/// ```
pub fn sms_sender_id(company_name: Option<&str>, use_branding: bool) -> String {
    let branded = company_name
        .filter(|_| use_branding)
        .map(|name| {
            name.chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
                .take(MAX_SENDER_ID_LEN)
                .collect::<String>()
                .trim()
                .to_string()
        })
        .filter(|name| !name.is_empty());
    branded.unwrap_or_else(|| DEFAULT_SMS_SENDER.to_string())
}

// =============================================================================
// Sinks
// =============================================================================

/// Receiver of engine events.
///
/// `publish` must not block: implementations queue or drop.
pub trait NotificationSink: Send + Sync + Debug {
    fn publish(&self, notification: Notification);
}

/// Discards every event. Default sink of a fresh database handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl NotificationSink for NoOpSink {
    fn publish(&self, _notification: Notification) {}
}

/// Keeps every event in memory. Used by tests to assert side effects.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of the events published so far.
    pub fn events(&self) -> Vec<Notification> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, notification: Notification) {
        match self.events.lock() {
            Ok(mut events) => events.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repair_event() -> Notification {
        Notification::RepairCompleted {
            repair_id: 4,
            tracking_code: "REP-20240115-AB12".into(),
            phone_number: "0241234567".into(),
            customer_name: "Kofi".into(),
            sender: "SwapSync".into(),
            company_name: "SwapSync".into(),
            phone_description: "Samsung A14".into(),
            cost: Money::from_major(150),
        }
    }

    #[test]
    fn test_accessors() {
        let event = repair_event();
        assert_eq!(event.origin(), SmsOrigin::Repair(4));
        assert_eq!(event.phone_number(), "0241234567");
        assert_eq!(event.sender(), "SwapSync");
    }

    #[test]
    fn test_sender_id_fallbacks() {
        assert_eq!(sms_sender_id(None, true), "SwapSync");
        assert_eq!(sms_sender_id(Some("  !!  "), true), "SwapSync");
        assert_eq!(sms_sender_id(Some("TechFix"), true), "TechFix");
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        assert!(sink.is_empty());
        sink.publish(repair_event());
        assert_eq!(sink.len(), 1);
        NoOpSink.publish(repair_event());
    }
}
