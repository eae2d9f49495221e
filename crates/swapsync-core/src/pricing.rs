//! # Pricing Rules
//!
//! Every money formula the engines apply, as pure functions.
//!
//! ## POS Totals
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  line.subtotal  = quantity × unit_price − discount_amount   (≥ 0)      │
//! │  subtotal       = Σ line.subtotal                                       │
//! │  total_amount   = subtotal − overall_discount               (≥ 0)      │
//! │  items_count    = number of lines                                       │
//! │  total_quantity = Σ line.quantity                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Swap & Resale
//! ```text
//! final_price    = balance_paid − discount                    (≥ 0)
//! economic guard = given_value + final_price ≥ floor × new_phone.value
//! resale profit  = resale_value + balance_paid − reference_value
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::ProfitStatus;
use crate::{MAX_ITEM_QUANTITY, MAX_SALE_LINES};

// =============================================================================
// POS
// =============================================================================

/// Amounts of one POS line, as submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAmounts {
    pub quantity: i64,
    pub unit_price: Money,
    #[serde(default)]
    pub discount_amount: Money,
}

impl LineAmounts {
    /// Validates the line and returns its subtotal.
    ///
    /// ## Rules
    /// - `quantity` in `1..=MAX_ITEM_QUANTITY`
    /// - `unit_price ≥ 0`, `discount_amount ≥ 0`
    /// - `quantity × unit_price − discount_amount ≥ 0`
    pub fn subtotal(&self) -> CoreResult<Money> {
        if self.quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }
        if self.quantity > MAX_ITEM_QUANTITY {
            return Err(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 1,
                max: MAX_ITEM_QUANTITY,
            }
            .into());
        }
        if self.unit_price.is_negative() {
            return Err(ValidationError::negative("unit_price").into());
        }
        if self.discount_amount.is_negative() {
            return Err(ValidationError::negative("discount_amount").into());
        }

        let subtotal = self.unit_price * self.quantity - self.discount_amount;
        if subtotal.is_negative() {
            return Err(ValidationError::negative("line subtotal").into());
        }
        Ok(subtotal)
    }
}

/// Computed header values of a POS sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PosTotals {
    /// Subtotal per line, in input order.
    pub line_subtotals: Vec<Money>,
    pub subtotal: Money,
    pub overall_discount: Money,
    pub total_amount: Money,
    pub items_count: i64,
    pub total_quantity: i64,
}

/// Validates all lines and computes the header totals in one pass.
///
/// ## Example
/// ```rust
/// use swapsync_core::money::Money;
/// use swapsync_core::pricing::{pos_totals, LineAmounts};
///
/// let lines = [
///     LineAmounts { quantity: 2, unit_price: Money::from_major(100), discount_amount: Money::ZERO },
///     LineAmounts { quantity: 3, unit_price: Money::from_major(50), discount_amount: Money::from_major(10) },
/// ];
/// let totals = pos_totals(&lines, Money::from_major(5)).unwrap();
/// assert_eq!(totals.subtotal, Money::from_major(340));
/// assert_eq!(totals.total_amount, Money::from_major(335));
/// ```
pub fn pos_totals(lines: &[LineAmounts], overall_discount: Money) -> CoreResult<PosTotals> {
    if lines.is_empty() {
        return Err(ValidationError::required("items").into());
    }
    if lines.len() > MAX_SALE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_SALE_LINES as i64,
        }
        .into());
    }
    if overall_discount.is_negative() {
        return Err(ValidationError::negative("overall_discount").into());
    }

    let line_subtotals = lines
        .iter()
        .map(LineAmounts::subtotal)
        .collect::<CoreResult<Vec<_>>>()?;
    let subtotal: Money = line_subtotals.iter().sum();
    let total_amount = subtotal - overall_discount;
    if total_amount.is_negative() {
        return Err(ValidationError::negative("total_amount").into());
    }

    Ok(PosTotals {
        line_subtotals,
        subtotal,
        overall_discount,
        total_amount,
        items_count: lines.len() as i64,
        total_quantity: lines.iter().map(|l| l.quantity).sum(),
    })
}

// =============================================================================
// Swap
// =============================================================================

/// Tunable swap rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapPolicy {
    /// Minimum share of the new phone's value that trade-in plus cash must
    /// cover, in percent.
    pub floor_percent: u32,
}

impl Default for SwapPolicy {
    fn default() -> Self {
        SwapPolicy { floor_percent: 50 }
    }
}

impl SwapPolicy {
    /// Smallest acceptable `given_value + final_price` for a phone value.
    ///
    /// Rounded up to the next pesewa so the guard never admits less than
    /// the configured share.
    pub fn required_value(&self, new_phone_value: Money) -> Money {
        let scaled = new_phone_value.minor() * i64::from(self.floor_percent);
        Money::from_minor((scaled + 99).div_euclid(100))
    }

    /// Validates a swap and returns its final price.
    ///
    /// ## Errors
    /// - any amount negative → Validation
    /// - `balance_paid − discount < 0` → Validation
    /// - below the floor → [`CoreError::SwapBelowFloor`]
    pub fn quote(
        &self,
        new_phone_value: Money,
        given_value: Money,
        balance_paid: Money,
        discount: Money,
    ) -> CoreResult<Money> {
        if given_value.is_negative() {
            return Err(ValidationError::negative("given_phone_value").into());
        }
        if balance_paid.is_negative() {
            return Err(ValidationError::negative("balance_paid").into());
        }
        if discount.is_negative() {
            return Err(ValidationError::negative("discount_amount").into());
        }

        let final_price = balance_paid - discount;
        if final_price.is_negative() {
            return Err(ValidationError::negative("final_price").into());
        }

        let offered = given_value + final_price;
        let required = self.required_value(new_phone_value);
        if offered < required {
            return Err(CoreError::SwapBelowFloor {
                offered: offered.to_string(),
                required: required.to_string(),
            });
        }
        Ok(final_price)
    }
}

// =============================================================================
// Resale & Direct Sale
// =============================================================================

/// `resale_value + balance_paid − reference_value`.
pub fn resale_profit(resale_value: Money, balance_paid: Money, reference_value: Money) -> Money {
    resale_value + balance_paid - reference_value
}

/// Classifies a profit amount.
pub fn profit_status(amount: Money) -> ProfitStatus {
    if amount.is_positive() {
        ProfitStatus::ProfitMade
    } else if amount.is_negative() {
        ProfitStatus::Loss
    } else {
        ProfitStatus::Pending
    }
}

/// `original_price − discount`, which must not be negative.
pub fn direct_sale_amount(original_price: Money, discount: Money) -> CoreResult<Money> {
    if original_price.is_negative() {
        return Err(ValidationError::negative("original_price").into());
    }
    if discount.is_negative() {
        return Err(ValidationError::negative("discount_amount").into());
    }
    let paid = original_price - discount;
    if paid.is_negative() {
        return Err(ValidationError::negative("amount_paid").into());
    }
    Ok(paid)
}

// =============================================================================
// Repair
// =============================================================================

/// `service_cost + items_cost`.
pub fn repair_cost(service_cost: Money, items_cost: Money) -> Money {
    service_cost + items_cost
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(qty: i64, price: i64, discount: i64) -> LineAmounts {
        LineAmounts {
            quantity: qty,
            unit_price: Money::from_major(price),
            discount_amount: Money::from_major(discount),
        }
    }

    #[test]
    fn test_pos_totals_with_discount() {
        let totals = pos_totals(&[line(2, 100, 0), line(3, 50, 10)], Money::from_major(5)).unwrap();
        assert_eq!(totals.line_subtotals, vec![Money::from_major(200), Money::from_major(140)]);
        assert_eq!(totals.subtotal, Money::from_major(340));
        assert_eq!(totals.total_amount, Money::from_major(335));
        assert_eq!(totals.items_count, 2);
        assert_eq!(totals.total_quantity, 5);
    }

    #[test]
    fn test_negative_line_subtotal_rejected() {
        let err = pos_totals(&[line(1, 10, 20)], Money::ZERO).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_negative_total_rejected() {
        let err = pos_totals(&[line(1, 10, 0)], Money::from_major(11)).unwrap_err();
        assert!(err.to_string().contains("total_amount"));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        assert!(pos_totals(&[line(0, 10, 0)], Money::ZERO).is_err());
        assert!(pos_totals(&[], Money::ZERO).is_err());
    }

    #[test]
    fn test_swap_below_floor() {
        let err = SwapPolicy::default()
            .quote(
                Money::from_major(1000),
                Money::from_major(100),
                Money::from_major(200),
                Money::ZERO,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::SwapBelowFloor { .. }));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_swap_happy_path() {
        let final_price = SwapPolicy::default()
            .quote(
                Money::from_major(1000),
                Money::from_major(600),
                Money::from_major(500),
                Money::from_major(50),
            )
            .unwrap();
        assert_eq!(final_price, Money::from_major(450));
    }

    #[test]
    fn test_swap_floor_boundary_is_inclusive() {
        let policy = SwapPolicy { floor_percent: 50 };
        assert!(policy
            .quote(Money::from_major(1000), Money::from_major(300), Money::from_major(200), Money::ZERO)
            .is_ok());
        assert_eq!(policy.required_value(Money::from_minor(101)), Money::from_minor(51));
    }

    #[test]
    fn test_resale_profit() {
        let profit = resale_profit(Money::from_major(700), Money::from_major(500), Money::from_major(1000));
        assert_eq!(profit, Money::from_major(200));
        assert_eq!(profit_status(profit), ProfitStatus::ProfitMade);
        assert_eq!(profit_status(-profit), ProfitStatus::Loss);
        assert_eq!(profit_status(Money::ZERO), ProfitStatus::Pending);
    }

    #[test]
    fn test_direct_sale_amount() {
        assert_eq!(
            direct_sale_amount(Money::from_major(900), Money::from_major(50)).unwrap(),
            Money::from_major(850)
        );
        assert!(direct_sale_amount(Money::from_major(10), Money::from_major(50)).is_err());
    }
}
