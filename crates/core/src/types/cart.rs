//! Sellable listings and cart lines.
//!
//! [`CartItem`] doubles as the guest cart's persisted format, so its serde
//! field names follow the keys the storefront has always written:
//! `[{id, titre, image, vendeurNom, prixVendeur, quantity, quantiteStock}]`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::quantity;
use crate::types::id::ListingId;
use crate::types::price::line_total;

/// A vendor's listing as shown on a product page, before it enters a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub title: String,
    pub image: Option<String>,
    pub seller_name: String,
    pub unit_price: Decimal,
    /// Total stock currently on hand for this listing.
    pub stock_available: u32,
}

/// One line of a cart.
///
/// `stock_available` is the total stock observed at the last sync, including
/// the units already held by this line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: ListingId,
    #[serde(rename = "titre", default)]
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(rename = "vendeurNom", default)]
    pub seller_name: String,
    #[serde(rename = "prixVendeur", with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(rename = "quantiteStock", default)]
    pub stock_available: u32,
}

impl CartItem {
    /// Build a cart line for `quantity` units of `listing`.
    #[must_use]
    pub fn from_listing(listing: &Listing, quantity: u32) -> Self {
        Self {
            id: listing.id,
            title: listing.title.clone(),
            image: listing.image.clone(),
            seller_name: listing.seller_name.clone(),
            unit_price: listing.unit_price,
            quantity,
            stock_available: listing.stock_available,
        }
    }

    /// Price of the whole line.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        line_total(self.unit_price, self.quantity)
    }

    /// Units that could still be added to this line.
    #[must_use]
    pub const fn remaining_stock(&self) -> u32 {
        quantity::remaining_stock(self.stock_available, self.quantity)
    }

    /// Whether at least one more unit fits under the stock limit.
    #[must_use]
    pub const fn has_room(&self) -> bool {
        self.quantity < self.stock_available
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn listing() -> Listing {
        Listing {
            id: ListingId::new(3),
            title: "Huile d'argan".to_string(),
            image: Some("/uploads/argan.jpg".to_string()),
            seller_name: "Coop Tiznit".to_string(),
            unit_price: Decimal::new(12_050, 2),
            stock_available: 5,
        }
    }

    #[test]
    fn test_persisted_field_names() {
        let item = CartItem::from_listing(&listing(), 2);
        let value = serde_json::to_value(&item).unwrap();

        assert_eq!(value["id"], 3);
        assert_eq!(value["titre"], "Huile d'argan");
        assert_eq!(value["image"], "/uploads/argan.jpg");
        assert_eq!(value["vendeurNom"], "Coop Tiznit");
        assert_eq!(value["prixVendeur"], 120.5);
        assert_eq!(value["quantity"], 2);
        assert_eq!(value["quantiteStock"], 5);
    }

    #[test]
    fn test_reads_sparse_entries() {
        // Entries written without seller or stock still load; unknown keys are ignored.
        let item: CartItem = serde_json::from_str(
            r#"{"id": 9, "titre": "Tajine", "prixVendeur": 80, "quantity": 1, "categorie": "cuisine"}"#,
        )
        .unwrap();

        assert_eq!(item.id, ListingId::new(9));
        assert_eq!(item.unit_price, Decimal::new(80, 0));
        assert_eq!(item.stock_available, 0);
        assert!(item.image.is_none());
    }

    #[test]
    fn test_line_queries() {
        let item = CartItem::from_listing(&listing(), 2);
        assert_eq!(item.line_total(), Decimal::new(24_100, 2));
        assert_eq!(item.remaining_stock(), 3);
        assert!(item.has_room());

        let full = CartItem::from_listing(&listing(), 5);
        assert_eq!(full.remaining_stock(), 0);
        assert!(!full.has_room());
    }
}
