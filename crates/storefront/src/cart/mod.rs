//! Cart reconciliation across device-local and server-side storage.
//!
//! # Architecture
//!
//! - Guests (and logged-in vendors/admins browsing the shop) keep their cart
//!   on the device through [`LocalCartStore`].
//! - Buyers keep their cart on the backend; [`CartGateway`] is the seam the
//!   engine talks to, implemented over HTTP by [`crate::api::HttpCartGateway`].
//! - [`CartEngine`] owns the in-memory cart, picks the authoritative store
//!   for the current session, and publishes a [`CartSnapshot`] after every
//!   change.
//!
//! Stock arithmetic lives in [`bazaar_core::quantity`]; nothing here
//! recomputes it.

mod engine;
mod local;

pub use engine::CartEngine;
pub use local::{GUEST_CART_KEY, LocalCartStore};

#[cfg(test)]
pub(crate) use engine::tests as fakes;

use std::future::Future;

use bazaar_core::{CartItem, ListingId, SessionState};

use crate::error::CartError;

/// Authenticated server-side cart operations.
///
/// Write operations only report success or failure; the engine re-fetches
/// after every write and trusts nothing but the fetched cart.
pub trait CartGateway: Send + Sync {
    /// Current server cart, with `stock_available` as total stock.
    fn fetch(&self) -> impl Future<Output = Result<Vec<CartItem>, CartError>> + Send;

    /// Add `quantity` units of a listing.
    fn add(
        &self,
        id: ListingId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), CartError>> + Send;

    /// Set a line to exactly `quantity` units (at least one).
    fn set_quantity(
        &self,
        id: ListingId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), CartError>> + Send;

    /// Drop a line.
    fn remove(&self, id: ListingId) -> impl Future<Output = Result<(), CartError>> + Send;

    /// Empty the cart.
    fn clear(&self) -> impl Future<Output = Result<(), CartError>> + Send;
}

/// What a quantity-changing operation did.
///
/// `Clamped` and `Unchanged` are the stock warning the UI should surface;
/// they are results, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityOutcome {
    /// The line now holds exactly what was asked for.
    Applied { quantity: u32 },
    /// Stock allowed only part of the request.
    Clamped { requested: u32, quantity: u32 },
    /// Stock is exhausted; the line keeps `quantity` units.
    Unchanged { quantity: u32 },
    /// The line was removed.
    Removed,
}

impl QuantityOutcome {
    /// Outcome for a line that ended at `quantity` after asking for `requested`.
    pub(crate) const fn settle(requested: u32, before: u32, quantity: u32) -> Self {
        if quantity >= requested {
            Self::Applied { quantity }
        } else if quantity <= before {
            Self::Unchanged { quantity }
        } else {
            Self::Clamped {
                requested,
                quantity,
            }
        }
    }

    /// Whether the UI should warn that stock limited the request.
    #[must_use]
    pub const fn is_stock_warning(&self) -> bool {
        matches!(self, Self::Clamped { .. } | Self::Unchanged { .. })
    }

    /// Units held by the line afterwards (zero once removed).
    #[must_use]
    pub const fn quantity(&self) -> u32 {
        match self {
            Self::Applied { quantity }
            | Self::Clamped { quantity, .. }
            | Self::Unchanged { quantity } => *quantity,
            Self::Removed => 0,
        }
    }
}

/// What happens to a guest cart when a buyer logs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginCartPolicy {
    /// Show the server cart as is. The guest cart stays on the device and
    /// comes back after logout.
    #[default]
    Replace,
    /// Push guest lines into the server cart (stock-clamped), then empty the
    /// guest cart.
    MergeGuestCart,
}

impl std::str::FromStr for LoginCartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "merge" => Ok(Self::MergeGuestCart),
            other => Err(format!("expected 'replace' or 'merge', got '{other}'")),
        }
    }
}

/// Published view of the cart for UI components.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    /// A server round trip is in flight; cart controls should be disabled.
    pub loading: bool,
    /// Session the items were loaded for.
    pub session: SessionState,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_settle() {
        assert_eq!(
            QuantityOutcome::settle(3, 0, 3),
            QuantityOutcome::Applied { quantity: 3 }
        );
        assert_eq!(
            QuantityOutcome::settle(7, 3, 5),
            QuantityOutcome::Clamped {
                requested: 7,
                quantity: 5
            }
        );
        assert_eq!(
            QuantityOutcome::settle(6, 5, 5),
            QuantityOutcome::Unchanged { quantity: 5 }
        );
        assert!(QuantityOutcome::settle(7, 3, 5).is_stock_warning());
        assert!(!QuantityOutcome::Removed.is_stock_warning());
        assert_eq!(QuantityOutcome::Removed.quantity(), 0);
    }

    #[test]
    fn test_login_policy_parse() {
        assert_eq!(
            "replace".parse::<LoginCartPolicy>().unwrap(),
            LoginCartPolicy::Replace
        );
        assert_eq!(
            " Merge ".parse::<LoginCartPolicy>().unwrap(),
            LoginCartPolicy::MergeGuestCart
        );
        assert!("union".parse::<LoginCartPolicy>().is_err());
    }
}
