//! Guest cart persisted on the device.

use std::collections::HashSet;
use std::sync::Arc;

use bazaar_core::CartItem;
use bazaar_core::quantity::clamp_to_stock;
use tracing::{debug, warn};

use crate::storage::Storage;

/// Storage key shared by every guest session on the device.
pub const GUEST_CART_KEY: &str = "cart";

/// Reads and writes the guest cart as a JSON array of [`CartItem`].
#[derive(Clone)]
pub struct LocalCartStore {
    storage: Arc<dyn Storage>,
}

impl LocalCartStore {
    /// Create a guest cart store on top of `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Load the guest cart.
    ///
    /// Never fails: missing, unreadable or corrupt data yields an empty cart.
    /// Lines above their recorded stock are clamped down, lines left empty
    /// are dropped, and only the first line per listing is kept.
    #[must_use]
    pub fn load(&self) -> Vec<CartItem> {
        let raw = match self.storage.get(GUEST_CART_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read guest cart, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<CartItem>>(&raw) {
            Ok(items) => sanitize(items),
            Err(e) => {
                warn!(error = %e, "Discarding corrupt guest cart");
                Vec::new()
            }
        }
    }

    /// Overwrite the guest cart with `items`.
    ///
    /// Fire and forget: a failed write is logged and the in-memory cart
    /// stays authoritative until the next successful save.
    pub fn save(&self, items: &[CartItem]) {
        let raw = match serde_json::to_string(items) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to serialize guest cart");
                return;
            }
        };
        if let Err(e) = self.storage.set(GUEST_CART_KEY, &raw) {
            warn!(error = %e, "Failed to persist guest cart");
        } else {
            debug!(lines = items.len(), "Guest cart saved");
        }
    }
}

fn sanitize(items: Vec<CartItem>) -> Vec<CartItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter_map(|mut item| {
            if !seen.insert(item.id) {
                warn!(listing_id = %item.id, "Dropping duplicate guest cart line");
                return None;
            }
            item.quantity = clamp_to_stock(item.quantity, item.stock_available);
            (item.quantity > 0).then_some(item)
        })
        .collect()
}
