//! Backend request and response shapes.
//!
//! Field names follow the backend's JSON exactly; conversion to engine types
//! happens in `conversions`.

use bazaar_core::{ListingId, OrderId, OrderStatus, UserId};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Cart
// =============================================================================

/// `GET cart` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    #[serde(default)]
    pub lignes_panier: Vec<CartLine>,
    #[serde(default)]
    pub montant_total: Option<Decimal>,
    #[serde(default)]
    pub nombre_produits: Option<u32>,
}

/// One server cart line.
///
/// `stock_disponible` excludes the units this line already holds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub vendeur_produit_id: ListingId,
    #[serde(default)]
    pub produit_nom: Option<String>,
    #[serde(default)]
    pub produit_titre: Option<String>,
    #[serde(default)]
    pub produit_image: Option<String>,
    #[serde(default)]
    pub vendeur_nom: Option<String>,
    pub quantite: u32,
    pub prix_unitaire: Decimal,
    #[serde(default)]
    pub stock_disponible: Option<u32>,
}

/// Body of `POST cart/add` and `PUT cart/update`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineRequest {
    pub vendeur_produit_id: ListingId,
    pub quantite: u32,
}

/// Generic `{ success, message }` acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// Orders
// =============================================================================

/// Body of `POST orders`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub adresse_livraison: String,
    pub telephone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub lignes_commande: Vec<OrderLineRequest>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub vendeur_produit_id: ListingId,
    pub quantite: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub prix_unitaire: Decimal,
}

/// An order as the backend reports it after placement or lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub id: OrderId,
    #[serde(rename = "clientId", default)]
    pub client_id: Option<UserId>,
    #[serde(rename = "clientNom", default)]
    pub client_name: Option<String>,
    #[serde(rename = "dateCommande", default)]
    pub placed_at: Option<NaiveDateTime>,
    #[serde(rename = "statut", default)]
    pub status: OrderStatus,
    #[serde(rename = "montantTotal")]
    pub total: Decimal,
    #[serde(rename = "adresseLivraison", default)]
    pub shipping_address: Option<String>,
    #[serde(rename = "lignesCommande", default)]
    pub lines: Vec<OrderConfirmationLine>,
}

impl OrderConfirmation {
    /// Whether the buyer may still cancel this order.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        self.status.is_cancellable()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmationLine {
    #[serde(rename = "vendeurProduitId")]
    pub listing_id: ListingId,
    #[serde(rename = "quantite")]
    pub quantity: u32,
    #[serde(rename = "prixUnitaire")]
    pub unit_price: Decimal,
    #[serde(rename = "sousTotal", default)]
    pub subtotal: Option<Decimal>,
}
