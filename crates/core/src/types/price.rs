//! Price arithmetic using decimal amounts.
//!
//! The marketplace trades in a single currency (cash on delivery), so prices
//! are plain `Decimal` amounts rather than amount/currency pairs.

use rust_decimal::Decimal;

/// Total for `quantity` units at `unit_price`.
#[must_use]
pub fn line_total(unit_price: Decimal, quantity: u32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Format an amount for display with two decimal places (e.g. "19.90 DH").
#[must_use]
pub fn format_price(amount: Decimal) -> String {
    format!("{:.2} DH", amount.round_dp(2))
}
