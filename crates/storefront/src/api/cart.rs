//! Server-side cart over the `cart` endpoints.

use bazaar_core::{CartItem, ListingId};
use reqwest::Method;
use tracing::{debug, instrument};

use super::ApiClient;
use super::conversions::to_cart_item;
use super::types::{CartLineRequest, CartResponse};
use crate::cart::CartGateway;
use crate::error::CartError;

/// [`CartGateway`] backed by the marketplace REST API.
#[derive(Clone)]
pub struct HttpCartGateway {
    client: ApiClient,
}

impl HttpCartGateway {
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

impl CartGateway for HttpCartGateway {
    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<Vec<CartItem>, CartError> {
        let cart: CartResponse = self.client.get("cart").await?;
        let items: Vec<CartItem> = cart
            .lignes_panier
            .into_iter()
            .filter(|line| line.quantite > 0)
            .map(to_cart_item)
            .collect();
        debug!(lines = items.len(), "Fetched server cart");
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn add(&self, id: ListingId, quantity: u32) -> Result<(), CartError> {
        let body = CartLineRequest {
            vendeur_produit_id: id,
            quantite: quantity,
        };
        self.client
            .write(Method::POST, "cart/add", Some(&body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_quantity(&self, id: ListingId, quantity: u32) -> Result<(), CartError> {
        let body = CartLineRequest {
            vendeur_produit_id: id,
            quantite: quantity,
        };
        self.client
            .write(Method::PUT, "cart/update", Some(&body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, id: ListingId) -> Result<(), CartError> {
        self.client
            .write::<()>(Method::DELETE, &format!("cart/item/{id}"), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<(), CartError> {
        self.client
            .write::<()>(Method::DELETE, "cart/clear", None)
            .await?;
        Ok(())
    }
}
