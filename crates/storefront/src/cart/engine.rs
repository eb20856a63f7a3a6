//! The cart reconciliation engine.
//!
//! [`CartEngine`] is the single writer of the cart. Every mutating operation
//! takes `&mut self`, so operations against one cart are serialized by the
//! borrow checker; the `loading` flag in the published snapshot covers the
//! server round trips so the UI can hold off repeated clicks.
//!
//! # Store selection
//!
//! Before each operation the engine re-classifies the session. A change of
//! classification triggers a reconciliation: the cart is reloaded from the
//! store that is authoritative for the new session (server cart for buyers,
//! device cart for everyone else). Under [`LoginCartPolicy::Replace`] this is
//! a full replace; the guest cart is left on the device untouched.
//!
//! # Failure semantics
//!
//! The held cart only changes after the backing store succeeded. A remote
//! write whose write or re-fetch fails leaves the cart as the last successful
//! fetch produced it.

use bazaar_core::quantity::{self, AddPlan, SetPlan};
use bazaar_core::{CartItem, Listing, ListingId, SessionState};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::{CartGateway, CartSnapshot, LocalCartStore, LoginCartPolicy, QuantityOutcome};
use crate::error::{CartError, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::session::{Credentials, SessionClassifier};

/// A server-side write, always followed by a re-fetch.
#[derive(Debug, Clone, Copy)]
enum RemoteWrite {
    Add(ListingId, u32),
    Set(ListingId, u32),
    Remove(ListingId),
    Clear,
}

impl RemoteWrite {
    const fn name(self) -> &'static str {
        match self {
            Self::Add(..) => "add",
            Self::Set(..) => "set_quantity",
            Self::Remove(_) => "remove",
            Self::Clear => "clear",
        }
    }
}

/// Owns the cart and routes operations to the authoritative store.
pub struct CartEngine<G> {
    gateway: G,
    local: LocalCartStore,
    classifier: SessionClassifier,
    policy: LoginCartPolicy,
    items: Vec<CartItem>,
    /// Session the items were last reconciled against; `None` before start.
    session: Option<SessionState>,
    /// Guest lines the server refused during the last login merge.
    merge_refused: Vec<ListingId>,
    loading: bool,
    published: watch::Sender<CartSnapshot>,
}

impl<G: CartGateway> CartEngine<G> {
    /// Create an engine with an empty cart. Call [`CartEngine::start`] to
    /// load the cart for the current session.
    #[must_use]
    pub fn new(gateway: G, local: LocalCartStore, classifier: SessionClassifier) -> Self {
        let (published, _) = watch::channel(CartSnapshot::default());
        Self {
            gateway,
            local,
            classifier,
            policy: LoginCartPolicy::default(),
            items: Vec::new(),
            session: None,
            merge_refused: Vec::new(),
            loading: false,
            published,
        }
    }

    /// Choose what happens to a guest cart when a buyer logs in.
    #[must_use]
    pub const fn with_login_policy(mut self, policy: LoginCartPolicy) -> Self {
        self.policy = policy;
        self
    }

    // =========================================================================
    // Published state & queries
    // =========================================================================

    /// Subscribe to cart snapshots. The receiver sees every later change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.published.subscribe()
    }

    /// Current cart contents.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// The line for a listing, if it is in the cart.
    #[must_use]
    pub fn item(&self, id: ListingId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Session the cart was last reconciled against.
    #[must_use]
    pub fn session(&self) -> SessionState {
        self.session.unwrap_or_default()
    }

    /// Guest lines the server refused when they were merged at the last
    /// login. They were dropped from the device cart.
    #[must_use]
    pub fn merge_refused(&self) -> &[ListingId] {
        &self.merge_refused
    }

    /// Whether a server round trip is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    /// Current state as published to subscribers.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            items: self.items.clone(),
            loading: self.loading,
            session: self.session(),
        }
    }

    /// Sum of line totals.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Number of units across all lines.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.items
            .iter()
            .fold(0, |count, item| count.saturating_add(item.quantity))
    }

    /// Units of a listing held by the cart.
    #[must_use]
    pub fn quantity_of(&self, id: ListingId) -> u32 {
        self.item(id).map_or(0, |item| item.quantity)
    }

    /// Units of an in-cart listing that could still be added.
    #[must_use]
    pub fn remaining_stock(&self, id: ListingId) -> Option<u32> {
        self.item(id).map(CartItem::remaining_stock)
    }

    /// Units of `listing` still purchasable given what the cart holds.
    #[must_use]
    pub fn remaining_stock_for(&self, listing: &Listing) -> u32 {
        quantity::remaining_stock(listing.stock_available, self.quantity_of(listing.id))
    }

    /// Whether another unit of a listing can be added. Listings not in the
    /// cart report `true`; their stock is checked when they are added.
    #[must_use]
    pub fn is_in_stock(&self, id: ListingId) -> bool {
        self.item(id).is_none_or(CartItem::has_room)
    }

    // =========================================================================
    // Session transitions
    // =========================================================================

    /// Load the cart for the current session.
    ///
    /// # Errors
    ///
    /// Returns the backing store's error; the cart stays empty and the next
    /// operation retries.
    pub async fn start(&mut self) -> Result<SessionState, CartError> {
        self.sync_session().await
    }

    /// Re-classify the session and reconcile if it changed.
    ///
    /// Called before every operation and by hosts when the session poll
    /// reports a transition.
    ///
    /// # Errors
    ///
    /// Returns the new store's error. The held cart is not replaced and the
    /// engine stays on its previous session, so the next call retries.
    pub async fn sync_session(&mut self) -> Result<SessionState, CartError> {
        let observed = self.classifier.classify();
        if self.session != Some(observed) {
            self.reconcile(observed).await?;
        }
        Ok(observed)
    }

    /// Store credentials after a successful login and switch stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials cannot be stored or the new cart
    /// cannot be loaded.
    #[instrument(skip(self, credentials))]
    pub async fn login(&mut self, credentials: &Credentials) -> Result<SessionState, CartError> {
        self.classifier.store().save(credentials)?;
        if let Some(profile) = &credentials.profile {
            set_sentry_user(&profile.id, Some(profile.email.as_str()));
        }
        self.sync_session().await
    }

    /// Forget credentials and fall back to the guest cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials cannot be cleared.
    #[instrument(skip(self))]
    pub async fn logout(&mut self) -> Result<SessionState, CartError> {
        self.classifier.store().clear()?;
        clear_sentry_user();
        self.sync_session().await
    }

    #[instrument(skip(self), fields(from = ?self.session, to = %next))]
    async fn reconcile(&mut self, next: SessionState) -> Result<(), CartError> {
        let previous = self.session;
        self.set_loading(true);

        let loaded = if next.uses_remote_cart() {
            self.load_remote(previous).await
        } else {
            Ok((self.local.load(), Vec::new()))
        };

        match loaded {
            Ok((items, refused)) => {
                info!(lines = items.len(), refused = refused.len(), "Cart reconciled");
                self.items = items;
                self.merge_refused = refused;
                self.session = Some(next);
                self.loading = false;
                self.publish();
                Ok(())
            }
            Err(e) => {
                self.set_loading(false);
                e.report("reconcile");
                Err(e)
            }
        }
    }

    async fn load_remote(
        &self,
        previous: Option<SessionState>,
    ) -> Result<(Vec<CartItem>, Vec<ListingId>), CartError> {
        let entering_buyer = previous != Some(SessionState::AuthenticatedBuyer);
        let refused = if self.policy == LoginCartPolicy::MergeGuestCart && entering_buyer {
            self.merge_guest_cart().await?
        } else {
            Vec::new()
        };
        Ok((self.gateway.fetch().await?, refused))
    }

    /// Push each guest line into the server cart, clamped by the best known
    /// stock. Each line leaves the guest cart as soon as the server answered
    /// for it, so a failure part way through never pushes a line twice.
    ///
    /// A line the server refuses is dropped and returned; only auth and
    /// transport failures abort the merge.
    async fn merge_guest_cart(&self) -> Result<Vec<ListingId>, CartError> {
        let mut pending = self.local.load();
        let mut refused = Vec::new();
        if pending.is_empty() {
            return Ok(refused);
        }

        let remote = self.gateway.fetch().await?;
        while let Some(line) = pending.first().cloned() {
            let held = remote.iter().find(|r| r.id == line.id);
            let existing = held.map_or(0, |r| r.quantity);
            let stock = held.map_or(line.stock_available, |r| r.stock_available);

            if let AddPlan::Grow { delta, .. } = quantity::plan_add(existing, line.quantity, stock) {
                match self.gateway.add(line.id, delta).await {
                    Ok(()) => debug!(listing_id = %line.id, delta, "Merged guest line"),
                    Err(CartError::Rejected(message)) => {
                        warn!(listing_id = %line.id, %message, "Server refused guest line");
                        add_breadcrumb(
                            "cart",
                            "merge_refused",
                            Some(&[("listing_id", &line.id.to_string())]),
                        );
                        refused.push(line.id);
                    }
                    Err(e) => return Err(e),
                }
            }
            pending.remove(0);
            self.local.save(&pending);
        }
        Ok(refused)
    }

    // =========================================================================
    // Cart operations
    // =========================================================================

    /// Add `requested` units of a listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be reconciled or the server
    /// write fails; the cart is unchanged in both cases.
    #[instrument(skip(self, listing), fields(listing_id = %listing.id))]
    pub async fn add(&mut self, listing: &Listing, requested: u32) -> Result<QuantityOutcome, CartError> {
        let session = self.sync_session().await?;
        add_breadcrumb("cart", "add", Some(&[("listing_id", &listing.id.to_string())]));

        let before = self.quantity_of(listing.id);
        let wanted = before.saturating_add(requested);
        let AddPlan::Grow { quantity, delta } =
            quantity::plan_add(before, requested, listing.stock_available)
        else {
            debug!("No stock left for this listing");
            return Ok(QuantityOutcome::Unchanged { quantity: before });
        };

        if session.uses_remote_cart() {
            self.remote_write(RemoteWrite::Add(listing.id, delta)).await?;
            return Ok(QuantityOutcome::settle(wanted, before, self.quantity_of(listing.id)));
        }

        match self.items.iter_mut().find(|item| item.id == listing.id) {
            Some(item) => {
                item.quantity = quantity;
                item.stock_available = listing.stock_available;
            }
            None => self.items.push(CartItem::from_listing(listing, quantity)),
        }
        self.persist_local();
        Ok(QuantityOutcome::settle(wanted, before, quantity))
    }

    /// Remove a listing's line. Removing a listing that is not in a guest
    /// cart is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be reconciled or the server
    /// write fails.
    #[instrument(skip(self))]
    pub async fn remove(&mut self, id: ListingId) -> Result<(), CartError> {
        let session = self.sync_session().await?;
        add_breadcrumb("cart", "remove", Some(&[("listing_id", &id.to_string())]));

        if session.uses_remote_cart() {
            return self.remote_write(RemoteWrite::Remove(id)).await;
        }

        self.items.retain(|item| item.id != id);
        self.persist_local();
        Ok(())
    }

    /// Set a line to `requested` units. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NotInCart`] for an unknown line, or the store's
    /// error; the cart is unchanged on error.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &mut self,
        id: ListingId,
        requested: u32,
    ) -> Result<QuantityOutcome, CartError> {
        let session = self.sync_session().await?;
        let Some(item) = self.item(id) else {
            return Err(CartError::NotInCart(id));
        };
        let before = item.quantity;

        let quantity = match quantity::plan_set(requested, item.stock_available) {
            SetPlan::Remove => {
                self.remove(id).await?;
                return Ok(QuantityOutcome::Removed);
            }
            SetPlan::Set(quantity) => quantity,
        };
        add_breadcrumb("cart", "set_quantity", Some(&[("listing_id", &id.to_string())]));

        if session.uses_remote_cart() {
            self.remote_write(RemoteWrite::Set(id, quantity)).await?;
            return Ok(QuantityOutcome::settle(requested, before, self.quantity_of(id)));
        }

        if let Some(item) = self.items.iter_mut().find(|item| item.id == id) {
            item.quantity = quantity;
        }
        self.persist_local();
        Ok(QuantityOutcome::settle(requested, before, quantity))
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be reconciled or the server
    /// write fails.
    #[instrument(skip(self))]
    pub async fn clear(&mut self) -> Result<(), CartError> {
        let session = self.sync_session().await?;
        add_breadcrumb("cart", "clear", None);

        if session.uses_remote_cart() {
            return self.remote_write(RemoteWrite::Clear).await;
        }

        self.items.clear();
        self.persist_local();
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn remote_write(&mut self, write: RemoteWrite) -> Result<(), CartError> {
        self.set_loading(true);
        let result = self.write_then_fetch(write).await;
        self.loading = false;

        match result {
            Ok(items) => {
                self.items = items;
                self.publish();
                Ok(())
            }
            Err(e) => {
                self.publish();
                e.report(write.name());
                Err(e)
            }
        }
    }

    async fn write_then_fetch(&self, write: RemoteWrite) -> Result<Vec<CartItem>, CartError> {
        match write {
            RemoteWrite::Add(id, quantity) => self.gateway.add(id, quantity).await?,
            RemoteWrite::Set(id, quantity) => self.gateway.set_quantity(id, quantity).await?,
            RemoteWrite::Remove(id) => self.gateway.remove(id).await?,
            RemoteWrite::Clear => self.gateway.clear().await?,
        }
        self.gateway.fetch().await
    }

    fn persist_local(&mut self) {
        self.local.save(&self.items);
        self.publish();
    }

    fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
        self.publish();
    }

    fn publish(&self) {
        self.published.send_replace(self.snapshot());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use bazaar_core::Role;

    use super::*;
    use crate::session::tests::profile;
    use crate::session::{SessionStore, StorageSessionStore};
    use crate::storage::MemoryStorage;

    // =========================================================================
    // In-memory server cart
    // =========================================================================

    #[derive(Default)]
    struct ServerState {
        lines: Vec<CartItem>,
        stock: Vec<(ListingId, u32)>,
        fail_writes: Option<CartError>,
        fail_fetches: Option<CartError>,
        fetches: u32,
    }

    fn copy_error(e: &CartError) -> CartError {
        match e {
            CartError::AuthExpired => CartError::AuthExpired,
            CartError::Rejected(m) => CartError::Rejected(m.clone()),
            other => CartError::NetworkOrServer(other.to_string()),
        }
    }

    /// Server cart that enforces stock like the backend does.
    #[derive(Clone, Default)]
    pub(crate) struct FakeGateway {
        state: Arc<Mutex<ServerState>>,
    }

    impl FakeGateway {
        pub(crate) fn stock(&self, listing: &Listing) {
            let mut state = self.state.lock().unwrap();
            state.stock.retain(|(id, _)| *id != listing.id);
            state.stock.push((listing.id, listing.stock_available));
        }

        pub(crate) fn seed(&self, listing: &Listing, quantity: u32) {
            self.stock(listing);
            self.state
                .lock()
                .unwrap()
                .lines
                .push(CartItem::from_listing(listing, quantity));
        }

        pub(crate) fn fail_writes(&self, error: Option<CartError>) {
            self.state.lock().unwrap().fail_writes = error;
        }

        pub(crate) fn fail_fetches(&self, error: Option<CartError>) {
            self.state.lock().unwrap().fail_fetches = error;
        }

        pub(crate) fn lines(&self) -> Vec<CartItem> {
            self.state.lock().unwrap().lines.clone()
        }

        pub(crate) fn fetches(&self) -> u32 {
            self.state.lock().unwrap().fetches
        }

        fn write(&self, apply: impl FnOnce(&mut ServerState) -> Result<(), CartError>) -> Result<(), CartError> {
            let mut state = self.state.lock().unwrap();
            if let Some(e) = &state.fail_writes {
                return Err(copy_error(e));
            }
            apply(&mut state)
        }
    }

    fn stock_of(state: &ServerState, id: ListingId) -> u32 {
        state
            .stock
            .iter()
            .find(|(s, _)| *s == id)
            .map_or(0, |(_, stock)| *stock)
    }

    impl CartGateway for FakeGateway {
        async fn fetch(&self) -> Result<Vec<CartItem>, CartError> {
            let mut state = self.state.lock().unwrap();
            state.fetches += 1;
            if let Some(e) = &state.fail_fetches {
                return Err(copy_error(e));
            }
            Ok(state.lines.clone())
        }

        async fn add(&self, id: ListingId, quantity: u32) -> Result<(), CartError> {
            self.write(|state| {
                let stock = stock_of(state, id);
                let held = state.lines.iter().find(|l| l.id == id).map_or(0, |l| l.quantity);
                if held + quantity > stock {
                    return Err(CartError::Rejected(format!(
                        "Stock insuffisant. Disponible: {stock}"
                    )));
                }
                match state.lines.iter_mut().find(|l| l.id == id) {
                    Some(line) => line.quantity += quantity,
                    None => state.lines.push(CartItem {
                        id,
                        title: format!("Listing {id}"),
                        image: None,
                        seller_name: "Vendeur".to_string(),
                        unit_price: Decimal::new(100, 0),
                        quantity,
                        stock_available: stock,
                    }),
                }
                Ok(())
            })
        }

        async fn set_quantity(&self, id: ListingId, quantity: u32) -> Result<(), CartError> {
            self.write(|state| {
                let line = state
                    .lines
                    .iter_mut()
                    .find(|l| l.id == id)
                    .ok_or(CartError::NotInCart(id))?;
                line.quantity = quantity;
                Ok(())
            })
        }

        async fn remove(&self, id: ListingId) -> Result<(), CartError> {
            self.write(|state| {
                state.lines.retain(|l| l.id != id);
                Ok(())
            })
        }

        async fn clear(&self) -> Result<(), CartError> {
            self.write(|state| {
                state.lines.clear();
                Ok(())
            })
        }
    }

    // =========================================================================
    // Fixtures
    // =========================================================================

    pub(crate) struct Harness {
        pub(crate) engine: CartEngine<FakeGateway>,
        pub(crate) gateway: FakeGateway,
        pub(crate) local: LocalCartStore,
        pub(crate) sessions: Arc<StorageSessionStore>,
    }

    pub(crate) fn harness() -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let local = LocalCartStore::new(storage.clone());
        let sessions = Arc::new(StorageSessionStore::new(storage));
        let gateway = FakeGateway::default();
        let engine = CartEngine::new(
            gateway.clone(),
            local.clone(),
            SessionClassifier::new(sessions.clone()),
        );
        Harness {
            engine,
            gateway,
            local,
            sessions,
        }
    }

    pub(crate) fn listing(id: i64, stock: u32) -> Listing {
        Listing {
            id: ListingId::new(id),
            title: format!("Listing {id}"),
            image: Some(format!("/uploads/{id}.jpg")),
            seller_name: "Coop Agadir".to_string(),
            unit_price: Decimal::new(2_550, 2),
            stock_available: stock,
        }
    }

    pub(crate) fn buyer() -> Credentials {
        Credentials::new("jwt-buyer", profile(Role::Client))
    }

    fn assert_within_stock(engine: &CartEngine<FakeGateway>) {
        for item in engine.items() {
            assert!(item.quantity >= 1);
            assert!(
                item.quantity <= item.stock_available,
                "{} holds {} of {}",
                item.id,
                item.quantity,
                item.stock_available
            );
        }
    }

    // =========================================================================
    // Guest cart
    // =========================================================================

    #[tokio::test]
    async fn test_guest_add_persists_and_clamps() {
        let mut h = harness();
        assert_eq!(h.engine.start().await.unwrap(), SessionState::Guest);
        let a = listing(1, 5);

        let outcome = h.engine.add(&a, 3).await.unwrap();
        assert_eq!(outcome, QuantityOutcome::Applied { quantity: 3 });
        let stored = h.local.load();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].quantity, 3);
        assert_eq!(stored[0].stock_available, 5);

        let outcome = h.engine.add(&a, 4).await.unwrap();
        assert_eq!(
            outcome,
            QuantityOutcome::Clamped {
                requested: 7,
                quantity: 5
            }
        );
        assert_eq!(h.engine.quantity_of(a.id), 5);
        assert_eq!(h.local.load()[0].quantity, 5);

        let outcome = h.engine.add(&a, 1).await.unwrap();
        assert_eq!(outcome, QuantityOutcome::Unchanged { quantity: 5 });
        assert!(!h.engine.is_in_stock(a.id));
        assert_eq!(h.engine.remaining_stock(a.id), Some(0));
        assert_within_stock(&h.engine);
        assert_eq!(h.gateway.fetches(), 0);
    }

    #[tokio::test]
    async fn test_guest_add_out_of_stock_listing_inserts_nothing() {
        let mut h = harness();
        let outcome = h.engine.add(&listing(9, 0), 2).await.unwrap();
        assert_eq!(outcome, QuantityOutcome::Unchanged { quantity: 0 });
        assert!(h.engine.items().is_empty());
        assert!(h.engine.is_in_stock(ListingId::new(9)));
    }

    #[tokio::test]
    async fn test_guest_set_quantity_clamps_and_routes_zero_to_removal() {
        let mut h = harness();
        let a = listing(1, 3);
        let b = listing(2, 8);
        h.engine.add(&a, 1).await.unwrap();
        h.engine.add(&b, 2).await.unwrap();

        let outcome = h.engine.set_quantity(a.id, 10).await.unwrap();
        assert_eq!(
            outcome,
            QuantityOutcome::Clamped {
                requested: 10,
                quantity: 3
            }
        );

        let outcome = h.engine.set_quantity(b.id, 1).await.unwrap();
        assert_eq!(outcome, QuantityOutcome::Applied { quantity: 1 });

        let outcome = h.engine.set_quantity(a.id, 0).await.unwrap();
        assert_eq!(outcome, QuantityOutcome::Removed);
        assert!(h.engine.item(a.id).is_none());
        assert_eq!(h.local.load().len(), 1);

        assert!(matches!(
            h.engine.set_quantity(a.id, 2).await,
            Err(CartError::NotInCart(_))
        ));
        assert_within_stock(&h.engine);
    }

    #[tokio::test]
    async fn test_guest_totals_and_clear() {
        let mut h = harness();
        h.engine.add(&listing(1, 5), 2).await.unwrap();
        h.engine.add(&listing(2, 5), 1).await.unwrap();

        assert_eq!(h.engine.count(), 3);
        assert_eq!(h.engine.total(), Decimal::new(7_650, 2));
        assert_eq!(h.engine.remaining_stock_for(&listing(1, 5)), 3);
        assert_eq!(h.engine.remaining_stock_for(&listing(7, 4)), 4);

        h.engine.remove(ListingId::new(2)).await.unwrap();
        h.engine.remove(ListingId::new(99)).await.unwrap();
        assert_eq!(h.engine.count(), 2);

        h.engine.clear().await.unwrap();
        assert_eq!(h.engine.count(), 0);
        assert!(h.local.load().is_empty());
    }

    #[tokio::test]
    async fn test_guest_cart_survives_restart() {
        let mut h = harness();
        h.engine.add(&listing(1, 5), 2).await.unwrap();

        let mut restarted = CartEngine::new(
            h.gateway.clone(),
            h.local.clone(),
            SessionClassifier::new(h.sessions.clone()),
        );
        restarted.start().await.unwrap();
        assert_eq!(restarted.count(), 2);
    }

    #[tokio::test]
    async fn test_non_buyer_session_uses_local_store() {
        let mut h = harness();
        h.sessions
            .save(&Credentials::new("jwt-vendor", profile(Role::Vendeur)))
            .unwrap();
        assert_eq!(
            h.engine.start().await.unwrap(),
            SessionState::AuthenticatedNonBuyer
        );
        h.engine.add(&listing(1, 5), 2).await.unwrap();
        assert_eq!(h.local.load().len(), 1);
        assert!(h.gateway.lines().is_empty());
    }

    // =========================================================================
    // Buyer cart
    // =========================================================================

    #[tokio::test]
    async fn test_login_replaces_guest_cart_with_server_cart() {
        let mut h = harness();
        let a = listing(1, 5);
        let b = listing(2, 4);
        h.engine.add(&a, 5).await.unwrap();
        h.gateway.seed(&b, 1);

        let session = h.engine.login(&buyer()).await.unwrap();
        assert_eq!(session, SessionState::AuthenticatedBuyer);
        assert_eq!(h.engine.items().len(), 1);
        assert_eq!(h.engine.quantity_of(b.id), 1);
        assert_eq!(h.engine.quantity_of(a.id), 0);

        // The guest cart is still on the device and comes back after logout.
        assert_eq!(h.local.load()[0].quantity, 5);
        assert_eq!(h.engine.logout().await.unwrap(), SessionState::Guest);
        assert_eq!(h.engine.quantity_of(a.id), 5);
    }

    #[tokio::test]
    async fn test_buyer_writes_go_to_server_and_refetch() {
        let mut h = harness();
        h.engine.login(&buyer()).await.unwrap();
        let a = listing(1, 5);
        h.gateway.stock(&a);
        let fetches = h.gateway.fetches();

        let outcome = h.engine.add(&a, 3).await.unwrap();
        assert_eq!(outcome, QuantityOutcome::Applied { quantity: 3 });
        assert_eq!(h.gateway.fetches(), fetches + 1);

        let outcome = h.engine.add(&a, 4).await.unwrap();
        assert_eq!(
            outcome,
            QuantityOutcome::Clamped {
                requested: 7,
                quantity: 5
            }
        );
        assert_eq!(h.gateway.lines()[0].quantity, 5);

        h.engine.set_quantity(a.id, 2).await.unwrap();
        assert_eq!(h.gateway.lines()[0].quantity, 2);
        assert_eq!(h.engine.quantity_of(a.id), 2);

        h.engine.clear().await.unwrap();
        assert!(h.gateway.lines().is_empty());
        assert_eq!(h.engine.count(), 0);
        assert!(h.local.load().is_empty());
        assert!(!h.engine.is_loading());
        assert_within_stock(&h.engine);
    }

    #[tokio::test]
    async fn test_failed_remote_add_leaves_cart_unchanged() {
        let mut h = harness();
        let a = listing(1, 5);
        h.gateway.seed(&a, 2);
        h.engine.login(&buyer()).await.unwrap();
        let before = h.engine.count();

        h.gateway
            .fail_writes(Some(CartError::NetworkOrServer("HTTP 500".to_string())));
        let err = h.engine.add(&a, 1).await.unwrap_err();
        assert!(matches!(err, CartError::NetworkOrServer(_)));
        assert_eq!(h.engine.count(), before);
        assert!(!h.engine.is_loading());
    }

    #[tokio::test]
    async fn test_failed_refetch_leaves_pre_write_state() {
        let mut h = harness();
        let a = listing(1, 5);
        h.gateway.seed(&a, 2);
        h.engine.login(&buyer()).await.unwrap();

        h.gateway
            .fail_fetches(Some(CartError::NetworkOrServer("timeout".to_string())));
        assert!(h.engine.set_quantity(a.id, 4).await.is_err());
        // The server applied the write, but the held cart is the last fetch.
        assert_eq!(h.engine.quantity_of(a.id), 2);
        assert_eq!(h.gateway.lines()[0].quantity, 4);
    }

    #[tokio::test]
    async fn test_auth_failure_on_login_keeps_held_cart() {
        let mut h = harness();
        h.engine.add(&listing(1, 5), 2).await.unwrap();
        h.gateway.fail_fetches(Some(CartError::AuthExpired));

        let err = h.engine.login(&buyer()).await.unwrap_err();
        assert!(err.is_auth_expired());
        assert_eq!(h.engine.count(), 2);
        assert_eq!(h.engine.session(), SessionState::Guest);

        // Once the server answers again, the next operation reconciles.
        h.gateway.fail_fetches(None);
        h.engine.remove(ListingId::new(1)).await.unwrap();
        assert_eq!(h.engine.session(), SessionState::AuthenticatedBuyer);
        assert_eq!(h.engine.count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_band_logout_is_picked_up_on_next_operation() {
        let mut h = harness();
        h.engine.add(&listing(1, 5), 1).await.unwrap();
        h.engine.login(&buyer()).await.unwrap();

        // Another window logs out.
        h.sessions.clear().unwrap();
        h.engine.add(&listing(2, 5), 1).await.unwrap();
        assert_eq!(h.engine.session(), SessionState::Guest);
        assert_eq!(h.engine.count(), 2);
        assert!(h.gateway.lines().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_write_is_surfaced() {
        let mut h = harness();
        h.engine.login(&buyer()).await.unwrap();
        let a = listing(1, 5);
        h.gateway.stock(&a);
        h.gateway
            .fail_writes(Some(CartError::Rejected("Produit indisponible".to_string())));

        let err = h.engine.add(&a, 1).await.unwrap_err();
        assert!(matches!(err, CartError::Rejected(_)));
        assert_eq!(h.engine.count(), 0);
    }

    // =========================================================================
    // Merge policy
    // =========================================================================

    #[tokio::test]
    async fn test_merge_policy_pushes_guest_lines_with_stock_clamp() {
        let mut h = harness();
        h.engine = CartEngine::new(
            h.gateway.clone(),
            h.local.clone(),
            SessionClassifier::new(h.sessions.clone()),
        )
        .with_login_policy(LoginCartPolicy::MergeGuestCart);

        let a = listing(1, 5);
        let b = listing(2, 3);
        h.engine.add(&a, 2).await.unwrap();
        h.engine.add(&b, 3).await.unwrap();
        h.gateway.seed(&a, 4);
        h.gateway.stock(&b);

        h.engine.login(&buyer()).await.unwrap();
        assert_eq!(h.engine.quantity_of(a.id), 5);
        assert_eq!(h.engine.quantity_of(b.id), 3);
        assert!(h.local.load().is_empty());
        assert_within_stock(&h.engine);
    }

    #[tokio::test]
    async fn test_failed_merge_keeps_guest_cart() {
        let mut h = harness();
        h.engine = CartEngine::new(
            h.gateway.clone(),
            h.local.clone(),
            SessionClassifier::new(h.sessions.clone()),
        )
        .with_login_policy(LoginCartPolicy::MergeGuestCart);

        let a = listing(1, 5);
        h.engine.add(&a, 2).await.unwrap();
        h.gateway.stock(&a);
        h.gateway
            .fail_writes(Some(CartError::NetworkOrServer("HTTP 503".to_string())));

        assert!(h.engine.login(&buyer()).await.is_err());
        assert_eq!(h.local.load().len(), 1);
        assert_eq!(h.engine.count(), 2);
    }

    #[tokio::test]
    async fn test_merge_skips_lines_the_server_refuses() {
        let mut h = harness();
        h.engine = CartEngine::new(
            h.gateway.clone(),
            h.local.clone(),
            SessionClassifier::new(h.sessions.clone()),
        )
        .with_login_policy(LoginCartPolicy::MergeGuestCart);

        // The device still believes 5 are in stock; the server has 2.
        let stale = listing(1, 5);
        let b = listing(2, 3);
        h.engine.add(&stale, 4).await.unwrap();
        h.engine.add(&b, 1).await.unwrap();
        h.gateway.stock(&listing(1, 2));
        h.gateway.stock(&b);

        let session = h.engine.login(&buyer()).await.unwrap();
        assert_eq!(session, SessionState::AuthenticatedBuyer);
        assert_eq!(h.engine.merge_refused(), &[stale.id]);
        assert_eq!(h.engine.quantity_of(stale.id), 0);
        assert_eq!(h.engine.quantity_of(b.id), 1);
        assert!(h.local.load().is_empty());

        // Later operations are not held up by the refused line.
        h.engine.add(&listing(1, 2), 2).await.unwrap();
        assert_eq!(h.engine.quantity_of(stale.id), 2);
        h.engine.clear().await.unwrap();
        assert_eq!(h.engine.count(), 0);
        assert_eq!(h.engine.merge_refused(), &[stale.id]);
    }

    // =========================================================================
    // Published state
    // =========================================================================

    #[tokio::test]
    async fn test_snapshots_follow_changes() {
        let mut h = harness();
        let mut snapshots = h.engine.subscribe();
        h.engine.add(&listing(1, 5), 2).await.unwrap();

        assert!(snapshots.has_changed().unwrap());
        let snapshot = snapshots.borrow_and_update().clone();
        assert_eq!(snapshot.items.len(), 1);
        assert!(!snapshot.loading);
        assert_eq!(snapshot.session, SessionState::Guest);
    }
}
