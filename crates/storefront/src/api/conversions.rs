//! Backend shape translation.

use bazaar_core::CartItem;

use super::types::{CartLine, OrderLineRequest, OrderRequest};
use crate::checkout::CheckoutOrder;

/// Convert a server cart line into the engine's line shape.
///
/// The backend reports stock net of this line's holding; the engine works
/// with total stock, so the held quantity is added back.
#[must_use]
pub fn to_cart_item(line: CartLine) -> CartItem {
    let title = line
        .produit_titre
        .filter(|t| !t.trim().is_empty())
        .or(line.produit_nom)
        .unwrap_or_default();

    CartItem {
        id: line.vendeur_produit_id,
        title,
        image: line.produit_image,
        seller_name: line.vendeur_nom.unwrap_or_default(),
        unit_price: line.prix_unitaire,
        quantity: line.quantite,
        stock_available: line
            .stock_disponible
            .unwrap_or(0)
            .saturating_add(line.quantite),
    }
}

pub(super) fn to_order_request(order: &CheckoutOrder) -> OrderRequest {
    OrderRequest {
        adresse_livraison: order.shipping_address().to_string(),
        telephone: order.phone().to_string(),
        notes: order.notes().map(String::from),
        lignes_commande: order
            .lines()
            .iter()
            .map(|line| OrderLineRequest {
                vendeur_produit_id: line.listing_id,
                quantite: line.quantity,
                prix_unitaire: line.unit_price,
            })
            .collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::ListingId;
    use rust_decimal::Decimal;

    use super::*;

    fn line() -> CartLine {
        CartLine {
            vendeur_produit_id: ListingId::new(42),
            produit_nom: Some("Huile d'argan".to_string()),
            produit_titre: Some("Huile d'argan bio 250ml".to_string()),
            produit_image: Some("/uploads/argan.jpg".to_string()),
            vendeur_nom: Some("Coop Agadir".to_string()),
            quantite: 2,
            prix_unitaire: Decimal::new(8_990, 2),
            stock_disponible: Some(3),
        }
    }

    #[test]
    fn test_stock_is_total_including_held_units() {
        let item = to_cart_item(line());
        assert_eq!(item.quantity, 2);
        assert_eq!(item.stock_available, 5);
        assert_eq!(item.remaining_stock(), 3);
    }

    #[test]
    fn test_title_prefers_listing_title() {
        assert_eq!(to_cart_item(line()).title, "Huile d'argan bio 250ml");

        let mut untitled = line();
        untitled.produit_titre = Some("  ".to_string());
        assert_eq!(to_cart_item(untitled).title, "Huile d'argan");
    }

    #[test]
    fn test_missing_stock_means_only_held_units() {
        let mut unknown = line();
        unknown.stock_disponible = None;
        unknown.vendeur_nom = None;

        let item = to_cart_item(unknown);
        assert_eq!(item.stock_available, 2);
        assert!(!item.has_room());
        assert_eq!(item.seller_name, "");
    }
}
