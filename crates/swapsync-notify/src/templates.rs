//! # SMS Templates
//!
//! Plain-text bodies for each customer-facing event and the manager
//! broadcasts. Amounts print as [`Money`] does (`GHS 1234.50`).

use swapsync_core::money::Money;
use swapsync_core::{Notification, PaymentMethod};

/// Body of the SMS for an engine event.
pub fn render(notification: &Notification) -> String {
    match notification {
        Notification::PosReceipt {
            transaction_id,
            customer_name,
            lines,
            subtotal,
            overall_discount,
            total,
            payment_method,
            ..
        } => {
            let mut body = format!("Hi {}, thanks for your purchase.\nReceipt {}\n", customer_name, transaction_id);
            for line in lines {
                body.push_str(&format!("{} x{} {}\n", line.name, line.quantity, line.subtotal));
            }
            if overall_discount.is_positive() {
                body.push_str(&format!("Subtotal {}\nDiscount -{}\n", subtotal, overall_discount));
            }
            body.push_str(&format!("Total {} ({})", total, payment_label(*payment_method)));
            body
        }

        Notification::SaleReceipt {
            invoice_number,
            customer_name,
            phone_description,
            original_price,
            discount,
            amount_paid,
            ..
        } => {
            let mut body = format!(
                "Hi {}, you bought a {}.\nInvoice {}\nPrice {}\n",
                customer_name, phone_description, invoice_number, original_price
            );
            push_discount(&mut body, *discount);
            body.push_str(&format!("Paid {}", amount_paid));
            body
        }

        Notification::SwapReceipt {
            invoice_number,
            customer_name,
            given_phone_description,
            new_phone_description,
            given_phone_value,
            discount,
            final_price,
            ..
        } => {
            let mut body = format!(
                "Hi {}, your swap is complete.\nInvoice {}\nIn: {} ({})\nOut: {}\n",
                customer_name, invoice_number, given_phone_description, given_phone_value, new_phone_description
            );
            push_discount(&mut body, *discount);
            body.push_str(&format!("Balance paid {}", final_price));
            body
        }

        Notification::RepairCompleted {
            tracking_code,
            customer_name,
            company_name,
            phone_description,
            cost,
            ..
        } => format!(
            "Hi {}, your {} is repaired and ready for pickup at {}.\nTracking {}\nAmount due {}",
            customer_name, phone_description, company_name, tracking_code, cost
        ),
    }
}

/// First-of-month greeting to managers.
pub fn new_month_message(manager_name: &str, month: &str) -> String {
    format!(
        "Hello {}, welcome to {}! Wishing your shop a great month of sales. - SwapSync",
        manager_name, month
    )
}

/// Public-holiday greeting to managers.
pub fn holiday_message(manager_name: &str, holiday: &str) -> String {
    format!("Hello {}, happy {} from all of us at SwapSync!", manager_name, holiday)
}

fn push_discount(body: &mut String, discount: Money) {
    if discount.is_positive() {
        body.push_str(&format!("Discount -{}\n", discount));
    }
}

fn payment_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Cash => "cash",
        PaymentMethod::MobileMoney => "mobile money",
        PaymentMethod::Card => "card",
        PaymentMethod::BankTransfer => "bank transfer",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swapsync_core::ReceiptLine;

    #[test]
    fn test_pos_receipt_lists_lines() {
        let body = render(&Notification::PosReceipt {
            pos_sale_id: 1,
            transaction_id: "POS-20240115-0001".into(),
            phone_number: "0241234567".into(),
            customer_name: "Ama".into(),
            sender: "SwapSync".into(),
            lines: vec![ReceiptLine {
                name: "Charger".into(),
                quantity: 2,
                unit_price: Money::from_major(50),
                subtotal: Money::from_major(100),
            }],
            subtotal: Money::from_major(100),
            overall_discount: Money::from_major(10),
            total: Money::from_major(90),
            payment_method: PaymentMethod::MobileMoney,
        });
        assert!(body.contains("POS-20240115-0001"));
        assert!(body.contains("Charger x2"));
        assert!(body.contains("Discount -"));
        assert!(body.ends_with("(mobile money)"));
    }

    #[test]
    fn test_repair_names_shop() {
        let body = render(&Notification::RepairCompleted {
            repair_id: 3,
            tracking_code: "REP-20240115-AB12".into(),
            phone_number: "0241234567".into(),
            customer_name: "Kofi".into(),
            sender: "TechFix".into(),
            company_name: "TechFix Accra".into(),
            phone_description: "Samsung A14".into(),
            cost: Money::from_major(150),
        });
        assert!(body.contains("TechFix Accra"));
        assert!(body.contains("REP-20240115-AB12"));
    }

    #[test]
    fn test_broadcasts() {
        assert!(holiday_message("Kofi", "Independence Day").contains("Independence Day"));
        assert!(new_month_message("Kofi", "March").contains("March"));
    }
}
