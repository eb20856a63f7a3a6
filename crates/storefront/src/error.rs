//! Unified cart error handling with Sentry integration.
//!
//! [`CartError`] is the taxonomy every cart backing store reports in. Server
//! class failures are captured to Sentry before they reach the UI; auth and
//! business rejections are expected outcomes and only logged.

use bazaar_core::ListingId;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced by cart and order operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The backend answered 401/403, or there is no token to send.
    ///
    /// Never treated as an empty cart: the caller should force a re-login.
    #[error("Authentication expired")]
    AuthExpired,

    /// Transport failure, timeout, or 5xx from the backend.
    #[error("Backend unavailable: {0}")]
    NetworkOrServer(String),

    /// The backend refused the request (e.g. insufficient stock).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The backend answered with a body we could not read.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// The line is not in the cart.
    #[error("Listing {0} is not in the cart")]
    NotInCart(ListingId),

    /// Device storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CartError {
    /// Whether the user must log in again before retrying.
    #[must_use]
    pub const fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }

    /// Whether the failure is the backend's fault rather than the request's.
    #[must_use]
    pub const fn is_server_side(&self) -> bool {
        matches!(self, Self::NetworkOrServer(_) | Self::Decode(_))
    }

    /// Log the error, capturing server-side failures to Sentry.
    pub fn report(&self, operation: &str) {
        if self.is_server_side() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                operation,
                sentry_event_id = %event_id,
                "Cart operation failed"
            );
        } else {
            tracing::warn!(error = %self, operation, "Cart operation refused");
        }
    }
}

/// Set the Sentry user context after a login.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context on logout.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a cart action.
///
/// Breadcrumbs appear in Sentry reports to show the trail of cart actions
/// leading up to a failure.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "add", Some(&[("listing_id", "42")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
