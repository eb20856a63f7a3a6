//! Storefront state owned by the host application.

use std::sync::Arc;

use crate::api::{ApiClient, ApiError, HttpCartGateway, OrderClient, OrderConfirmation};
use crate::cart::{CartEngine, LocalCartStore};
use crate::checkout::{Checkout, CheckoutError, ShippingForm};
use crate::config::StorefrontConfig;
use crate::session::{IntervalTicker, SessionClassifier, SessionSubscription, StorageSessionStore};
use crate::storage::{FileStorage, Storage, StorageError};

/// Error assembling the storefront.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("storage unavailable: {0}")]
    Storage(#[from] StorageError),
    #[error("HTTP client: {0}")]
    Api(#[from] ApiError),
}

/// Everything a storefront UI talks to, wired from one configuration.
///
/// The guest cart and the credentials share one storage area, so a login in
/// another window is seen by this one's session poll.
pub struct Storefront {
    config: StorefrontConfig,
    classifier: SessionClassifier,
    engine: CartEngine<HttpCartGateway>,
    checkout: Checkout<OrderClient>,
    orders: OrderClient,
}

impl Storefront {
    /// Assemble the storefront on top of the configured storage directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be created or the
    /// HTTP client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, StateError> {
        let storage = Arc::new(FileStorage::open(config.storage_dir.clone())?);
        Self::with_storage(config, storage)
    }

    /// Assemble the storefront on top of an existing storage area.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_storage(
        config: StorefrontConfig,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, StateError> {
        let sessions = Arc::new(StorageSessionStore::new(storage.clone()));
        let classifier = SessionClassifier::new(sessions.clone());
        let client = ApiClient::new(&config.api, sessions)?;

        let engine = CartEngine::new(
            HttpCartGateway::new(client.clone()),
            LocalCartStore::new(storage),
            classifier.clone(),
        )
        .with_login_policy(config.login_cart_policy);
        let orders = OrderClient::new(client);

        Ok(Self {
            config,
            classifier,
            engine,
            checkout: Checkout::new(orders.clone()),
            orders,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &StorefrontConfig {
        &self.config
    }

    #[must_use]
    pub const fn cart(&self) -> &CartEngine<HttpCartGateway> {
        &self.engine
    }

    pub const fn cart_mut(&mut self) -> &mut CartEngine<HttpCartGateway> {
        &mut self.engine
    }

    #[must_use]
    pub const fn orders(&self) -> &OrderClient {
        &self.orders
    }

    /// Poll stored credentials at the configured period.
    ///
    /// Hosts call [`CartEngine::sync_session`] when the receiver changes.
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn watch_session(&self) -> SessionSubscription {
        self.classifier
            .subscribe(IntervalTicker::every(self.config.session_poll_interval))
    }

    /// Reconcile the session, then build an order from the cart and submit it.
    ///
    /// # Errors
    ///
    /// Returns the reconcile error, or see [`Checkout::build_order`] and
    /// [`Checkout::submit`].
    pub async fn place_order(
        &mut self,
        form: &ShippingForm,
    ) -> Result<OrderConfirmation, CheckoutError> {
        self.engine.sync_session().await?;
        let order = self.checkout.build_order(&self.engine, form)?;
        self.checkout.submit(&mut self.engine, &order).await
    }
}
