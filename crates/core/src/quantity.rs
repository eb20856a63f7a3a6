//! Stock-aware quantity rules.
//!
//! Every cart backing store goes through these functions; nothing else in the
//! workspace does stock arithmetic. All inputs are total quantities: a line's
//! `stock_available` already includes the units the cart holds.

/// Quantity a line should hold after asking for `requested_delta` more units.
///
/// Returns `min(existing + requested_delta, stock_available)`. A result that
/// is not greater than `existing` means there is no room and the add must be
/// skipped: callers never insert or update a line for a zero gain.
#[must_use]
pub const fn clamp_add(existing: u32, requested_delta: u32, stock_available: u32) -> u32 {
    let wanted = existing.saturating_add(requested_delta);
    if wanted < stock_available {
        wanted
    } else {
        stock_available
    }
}

/// Quantity a line should hold when set to `requested`.
///
/// Returns `max(1, min(requested, stock_available))`. A request of zero is a
/// removal, not a clamp; use [`plan_set`] to get that branch explicitly.
#[must_use]
pub const fn clamp_set(requested: u32, stock_available: u32) -> u32 {
    let capped = if requested < stock_available {
        requested
    } else {
        stock_available
    };
    if capped < 1 { 1 } else { capped }
}

/// Units still purchasable once `in_cart` units are reserved, floored at zero.
#[must_use]
pub const fn remaining_stock(stock_available: u32, in_cart: u32) -> u32 {
    stock_available.saturating_sub(in_cart)
}

/// A held quantity brought back under a (possibly shrunken) stock limit.
#[must_use]
pub const fn clamp_to_stock(quantity: u32, stock_available: u32) -> u32 {
    if quantity < stock_available {
        quantity
    } else {
        stock_available
    }
}

/// What an "add" resolves to for a line currently holding `existing` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPlan {
    /// Grow the line to `quantity`; `delta` units are actually added.
    Grow { quantity: u32, delta: u32 },
    /// Stock is exhausted for this line; nothing changes.
    NoRoom,
}

/// Resolve an add request against the stock limit.
#[must_use]
pub const fn plan_add(existing: u32, requested_delta: u32, stock_available: u32) -> AddPlan {
    let quantity = clamp_add(existing, requested_delta, stock_available);
    if quantity <= existing {
        AddPlan::NoRoom
    } else {
        AddPlan::Grow {
            quantity,
            delta: quantity - existing,
        }
    }
}

/// What a "set quantity" request resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetPlan {
    /// Drop the line entirely.
    Remove,
    /// Store this quantity.
    Set(u32),
}

/// Resolve a set request, routing zero to removal.
#[must_use]
pub const fn plan_set(requested: u32, stock_available: u32) -> SetPlan {
    if requested == 0 {
        SetPlan::Remove
    } else {
        SetPlan::Set(clamp_set(requested, stock_available))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_add_caps_at_stock() {
        assert_eq!(clamp_add(2, 5, 4), 4);
        assert_eq!(clamp_add(0, 3, 5), 3);
        assert_eq!(clamp_add(3, 4, 5), 5);
    }

    #[test]
    fn test_clamp_add_at_cap_is_no_gain() {
        assert_eq!(clamp_add(4, 1, 4), 4);
        assert_eq!(plan_add(4, 1, 4), AddPlan::NoRoom);
    }

    #[test]
    fn test_clamp_add_does_not_overflow() {
        assert_eq!(clamp_add(u32::MAX, u32::MAX, 10), 10);
    }

    #[test]
    fn test_plan_add_reports_actual_gain() {
        assert_eq!(
            plan_add(3, 4, 5),
            AddPlan::Grow {
                quantity: 5,
                delta: 2
            }
        );
        assert_eq!(plan_add(0, 1, 0), AddPlan::NoRoom);
    }

    #[test]
    fn test_plan_add_with_stale_stock_below_holding() {
        // Stock shrank below what the line holds: never an add.
        assert_eq!(plan_add(5, 2, 3), AddPlan::NoRoom);
    }

    #[test]
    fn test_clamp_set() {
        assert_eq!(clamp_set(10, 3), 3);
        assert_eq!(clamp_set(2, 3), 2);
        assert_eq!(clamp_set(1, 0), 1);
    }

    #[test]
    fn test_plan_set_routes_zero_to_removal() {
        assert_eq!(plan_set(0, 3), SetPlan::Remove);
        assert_eq!(plan_set(10, 3), SetPlan::Set(3));
    }

    #[test]
    fn test_clamp_to_stock() {
        assert_eq!(clamp_to_stock(9, 4), 4);
        assert_eq!(clamp_to_stock(2, 4), 2);
        assert_eq!(clamp_to_stock(2, 0), 0);
    }

    #[test]
    fn test_remaining_stock_floors_at_zero() {
        assert_eq!(remaining_stock(5, 3), 2);
        assert_eq!(remaining_stock(3, 5), 0);
    }
}
