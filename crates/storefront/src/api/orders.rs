//! Order placement and the buyer's order history.

use bazaar_core::OrderId;
use reqwest::Method;
use tracing::{info, instrument};

use super::conversions::to_order_request;
use super::types::{MessageResponse, OrderConfirmation};
use super::{ApiClient, ApiError};
use crate::checkout::{CheckoutOrder, OrderPlacement};
use crate::error::CartError;

/// Client for the `orders` endpoints.
#[derive(Clone)]
pub struct OrderClient {
    client: ApiClient,
}

impl OrderClient {
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Orders placed by the logged-in buyer.
    ///
    /// # Errors
    ///
    /// Returns `AuthExpired` on 401/403, or the transport/server error.
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<OrderConfirmation>, CartError> {
        Ok(self.client.get("orders").await?)
    }

    /// A single order of the logged-in buyer.
    ///
    /// # Errors
    ///
    /// Returns `AuthExpired` on 401/403, or the transport/server error.
    #[instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<OrderConfirmation, CartError> {
        Ok(self.client.get(&format!("orders/{id}")).await?)
    }

    /// Cancel a pending order and return the backend's acknowledgement.
    ///
    /// Orders past `EN_ATTENTE` are refused without a request.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` if the order is not cancellable or the backend
    /// refuses, `AuthExpired` on 401/403.
    #[instrument(skip(self, order), fields(order_id = %order.id, status = %order.status))]
    pub async fn cancel_order(&self, order: &OrderConfirmation) -> Result<String, CartError> {
        if !order.is_cancellable() {
            return Err(CartError::Rejected(format!(
                "Order {} is {} and can no longer be cancelled",
                order.id, order.status
            )));
        }

        let path = format!("orders/{}/cancel", order.id);
        let reply: MessageResponse = self
            .client
            .send_json(Method::POST, &path, &serde_json::json!({}))
            .await?;
        let message = reply.message.unwrap_or_default();
        if !reply.success {
            return Err(ApiError::Rejected {
                status: 200,
                message,
            }
            .into());
        }

        info!("Order cancelled");
        Ok(message)
    }
}

impl OrderPlacement for OrderClient {
    #[instrument(skip(self, order), fields(lines = order.lines().len()))]
    async fn place(&self, order: &CheckoutOrder) -> Result<OrderConfirmation, CartError> {
        let request = to_order_request(order);
        let confirmation: OrderConfirmation = self
            .client
            .send_json(Method::POST, "orders", &request)
            .await?;
        info!(order_id = %confirmation.id, total = %confirmation.total, "Order placed");
        Ok(confirmation)
    }
}
