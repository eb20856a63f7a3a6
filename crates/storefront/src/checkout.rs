//! Checkout handoff.
//!
//! Turns the reconciled cart and a shipping form into an order, submits it,
//! and empties the cart only once the backend confirmed the order. Any
//! failure leaves the cart and the form as they were.

use std::future::Future;

use bazaar_core::{CartItem, ListingId, SessionState, line_total};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::api::OrderConfirmation;
use crate::cart::{CartEngine, CartGateway};
use crate::error::{CartError, add_breadcrumb};
use crate::session::UserProfile;

/// Shipping and contact details entered at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShippingForm {
    pub address: String,
    pub phone: String,
    pub notes: Option<String>,
}

impl ShippingForm {
    /// A form pre-filled from the logged-in user's profile.
    #[must_use]
    pub fn prefilled(profile: &UserProfile) -> Self {
        Self {
            address: profile.shipping_address.clone().unwrap_or_default(),
            phone: profile.phone.clone().unwrap_or_default(),
            notes: None,
        }
    }
}

/// Why an order could not be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("A shipping address is required")]
    EmptyAddress,
    #[error("The cart is empty")]
    EmptyCart,
}

/// Errors surfaced by checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Invalid order: {0}")]
    Validation(#[from] ValidationError),

    /// Only logged-in buyers can place orders.
    #[error("Checkout requires a buyer login (current session: {0})")]
    LoginRequired(SessionState),

    /// The session changed after the order was built and the reconciled
    /// cart no longer holds the ordered lines.
    #[error("The cart changed since the order was built; review it and try again")]
    CartChanged,

    #[error(transparent)]
    Cart(#[from] CartError),
}

impl CheckoutError {
    /// Whether the user must log in again before retrying.
    #[must_use]
    pub const fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Cart(CartError::AuthExpired))
    }
}

/// One order line, priced when the order was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub listing_id: ListingId,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// An order ready for submission. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOrder {
    shipping_address: String,
    phone: String,
    notes: Option<String>,
    lines: Vec<OrderLine>,
}

impl CheckoutOrder {
    /// Build an order from cart lines, one order line per cart line.
    ///
    /// # Errors
    ///
    /// Returns `EmptyAddress` for a blank address and `EmptyCart` when there
    /// is nothing to order.
    pub fn build(items: &[CartItem], form: &ShippingForm) -> Result<Self, ValidationError> {
        let address = form.address.trim();
        if address.is_empty() {
            return Err(ValidationError::EmptyAddress);
        }
        if items.is_empty() {
            return Err(ValidationError::EmptyCart);
        }

        Ok(Self {
            shipping_address: address.to_string(),
            phone: form.phone.trim().to_string(),
            notes: form
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from),
            lines: items
                .iter()
                .map(|item| OrderLine {
                    listing_id: item.id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
        })
    }

    #[must_use]
    pub fn shipping_address(&self) -> &str {
        &self.shipping_address
    }

    #[must_use]
    pub fn phone(&self) -> &str {
        &self.phone
    }

    #[must_use]
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    #[must_use]
    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Whether `items` holds exactly the ordered listings and quantities.
    #[must_use]
    pub fn matches_cart(&self, items: &[CartItem]) -> bool {
        self.lines.len() == items.len()
            && self.lines.iter().all(|line| {
                items
                    .iter()
                    .any(|item| item.id == line.listing_id && item.quantity == line.quantity)
            })
    }

    /// Order total at the frozen prices.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.lines
            .iter()
            .map(|line| line_total(line.unit_price, line.quantity))
            .sum()
    }
}

/// Backend collaborator that places orders.
pub trait OrderPlacement: Send + Sync {
    /// Submit an order. 401/403 must surface as [`CartError::AuthExpired`].
    fn place(
        &self,
        order: &CheckoutOrder,
    ) -> impl Future<Output = Result<OrderConfirmation, CartError>> + Send;
}

/// Builds and submits orders for a cart engine.
pub struct Checkout<O> {
    placement: O,
}

impl<O: OrderPlacement> Checkout<O> {
    #[must_use]
    pub const fn new(placement: O) -> Self {
        Self { placement }
    }

    /// Build an order from the engine's current cart.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a blank address or an empty cart.
    pub fn build_order<G: CartGateway>(
        &self,
        engine: &CartEngine<G>,
        form: &ShippingForm,
    ) -> Result<CheckoutOrder, ValidationError> {
        CheckoutOrder::build(engine.items(), form)
    }

    /// Place `order` and empty the cart once the backend confirmed it.
    ///
    /// The order is not sent unless the current session is a buyer and the
    /// reconciled cart still holds the ordered lines. A failure to empty the
    /// cart after a confirmed order is logged and the confirmation is still
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `LoginRequired` outside a buyer session, `CartChanged` when
    /// the reconcile replaced the ordered lines, or the placement error
    /// (`AuthExpired` included) with the cart left intact.
    #[instrument(skip_all, fields(lines = order.lines().len()))]
    pub async fn submit<G: CartGateway>(
        &self,
        engine: &mut CartEngine<G>,
        order: &CheckoutOrder,
    ) -> Result<OrderConfirmation, CheckoutError> {
        let session = engine.sync_session().await?;
        if session != SessionState::AuthenticatedBuyer {
            return Err(CheckoutError::LoginRequired(session));
        }
        if !order.matches_cart(engine.items()) {
            warn!("Cart changed under a built order");
            return Err(CheckoutError::CartChanged);
        }
        add_breadcrumb("checkout", "submit", None);

        let confirmation = self
            .placement
            .place(order)
            .await
            .inspect_err(|e| e.report("place_order"))?;
        info!(order_id = %confirmation.id, "Order confirmed");

        if let Err(e) = engine.clear().await {
            warn!(error = %e, order_id = %confirmation.id, "Order placed but the cart could not be emptied");
        }
        Ok(confirmation)
    }
}
