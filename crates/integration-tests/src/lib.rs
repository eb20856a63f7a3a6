//! Integration tests for the Bazaar storefront.
//!
//! The tests stand up [`FakeBackend`], an in-process marketplace backend on
//! an ephemeral port, and drive the real HTTP clients and cart engine
//! against it. No external services are needed:
//!
//! ```bash
//! cargo test -p bazaar-integration-tests
//! ```
//!
//! The fake follows the backend's behavior where it matters to the cart:
//! stock is enforced on add, `stockDisponible` excludes the units a line
//! holds, business failures are `400 { success: false, message }`, and a
//! missing or unknown bearer token is a 401.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use bazaar_core::{Listing, ListingId, Role, UserId};
use bazaar_storefront::config::{ApiConfig, StorefrontConfig};
use bazaar_storefront::session::{Credentials, UserProfile};
use bazaar_storefront::storage::MemoryStorage;
use bazaar_storefront::{Storefront, cart::LoginCartPolicy};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Bearer token the fake accepts.
pub const BUYER_TOKEN: &str = "jwt-buyer-11";

// =============================================================================
// Backend state
// =============================================================================

#[derive(Debug, Clone)]
struct StockedListing {
    listing: Listing,
    stock: u32,
}

#[derive(Debug, Clone)]
struct PlacedOrder {
    id: i64,
    status: &'static str,
    address: String,
    lines: Vec<(ListingId, u32, f64)>,
}

#[derive(Debug, Default)]
struct BackendState {
    listings: BTreeMap<ListingId, StockedListing>,
    cart: BTreeMap<ListingId, u32>,
    orders: Vec<PlacedOrder>,
    fail_next: Option<StatusCode>,
    requests: Vec<String>,
}

type Shared = Arc<Mutex<BackendState>>;

/// In-process marketplace backend serving the cart and order endpoints
/// under `/api/`.
pub struct FakeBackend {
    base_url: String,
    state: Shared,
    server: JoinHandle<()>,
}

impl FakeBackend {
    /// Start the backend on `127.0.0.1` with an ephemeral port.
    pub async fn start() -> Self {
        let state: Shared = Arc::default();
        let app = Router::new()
            .route("/api/cart", get(get_cart))
            .route("/api/cart/add", post(add_to_cart))
            .route("/api/cart/update", put(update_cart))
            .route("/api/cart/item/{id}", delete(remove_from_cart))
            .route("/api/cart/clear", delete(clear_cart))
            .route("/api/orders", post(place_order).get(list_orders))
            .route("/api/orders/{id}", get(get_order))
            .route("/api/orders/{id}/cancel", post(cancel_order))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/api"),
            state,
            server,
        }
    }

    /// Base URL to configure the storefront with.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap()
    }

    /// Put a listing on sale with `stock` units.
    pub fn stock(&self, listing: &Listing) {
        self.lock().listings.insert(
            listing.id,
            StockedListing {
                listing: listing.clone(),
                stock: listing.stock_available,
            },
        );
    }

    /// Put units straight into the buyer's server cart.
    pub fn seed_cart(&self, listing: &Listing, quantity: u32) {
        self.stock(listing);
        self.lock().cart.insert(listing.id, quantity);
    }

    /// Units held by the server cart for a listing.
    #[must_use]
    pub fn cart_quantity(&self, id: ListingId) -> u32 {
        self.lock().cart.get(&id).copied().unwrap_or(0)
    }

    /// Number of lines in the server cart.
    #[must_use]
    pub fn cart_lines(&self) -> usize {
        self.lock().cart.len()
    }

    /// Remaining stock of a listing.
    #[must_use]
    pub fn stock_of(&self, id: ListingId) -> u32 {
        self.lock().listings.get(&id).map_or(0, |l| l.stock)
    }

    /// Number of orders placed.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    /// Answer the next request with `status` instead of handling it.
    pub fn fail_next(&self, status: StatusCode) {
        self.lock().fail_next = Some(status);
    }

    /// Requests received so far, as `METHOD path`.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A listing sold by a cooperative, priced at 25.50 DH.
#[must_use]
pub fn listing(id: i64, stock: u32) -> Listing {
    Listing {
        id: ListingId::new(id),
        title: format!("Tapis berbère n°{id}"),
        image: Some(format!("/uploads/tapis-{id}.jpg")),
        seller_name: "Coop Azilal".to_string(),
        unit_price: Decimal::new(2_550, 2),
        stock_available: stock,
    }
}

/// A logged-in user with `role`.
#[must_use]
pub fn profile(role: Role) -> UserProfile {
    UserProfile {
        id: UserId::new(11),
        name: "Salma Idrissi".to_string(),
        email: "salma@example.ma".to_string(),
        phone: Some("0612345678".to_string()),
        role,
        shipping_address: Some("12 rue Atlas, Rabat".to_string()),
    }
}

/// Credentials the fake backend accepts.
#[must_use]
pub fn buyer() -> Credentials {
    Credentials::new(BUYER_TOKEN, profile(Role::Client))
}

/// A storefront pointed at `backend`, backed by in-memory storage.
#[must_use]
pub fn storefront(backend: &FakeBackend, policy: LoginCartPolicy) -> (Arc<MemoryStorage>, Storefront) {
    let storage = Arc::new(MemoryStorage::new());
    let config = StorefrontConfig {
        api: ApiConfig::new(backend.base_url()).unwrap(),
        storage_dir: std::env::temp_dir(),
        session_poll_interval: std::time::Duration::from_secs(1),
        login_cart_policy: policy,
        sentry_dsn: None,
        sentry_environment: None,
    };
    let storefront = Storefront::with_storage(config, storage.clone()).unwrap();
    (storage, storefront)
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineBody {
    vendeur_produit_id: ListingId,
    quantite: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderBody {
    adresse_livraison: String,
    lignes_commande: Vec<OrderLineBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderLineBody {
    vendeur_produit_id: ListingId,
    quantite: u32,
    prix_unitaire: f64,
}

/// Record the request, then apply auth and injected failures.
fn admit<'a>(
    state: &'a Shared,
    headers: &HeaderMap,
    request: String,
) -> Result<MutexGuard<'a, BackendState>, Response> {
    let mut guard = state.lock().unwrap();
    guard.requests.push(request);

    if let Some(status) = guard.fail_next.take() {
        return Err((status, "injected failure").into_response());
    }

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {BUYER_TOKEN}"));
    if !authorized {
        return Err(StatusCode::UNAUTHORIZED.into_response());
    }
    Ok(guard)
}

fn refuse(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "message": message })),
    )
        .into_response()
}

fn cart_json(state: &BackendState) -> Value {
    let lines: Vec<Value> = state
        .cart
        .iter()
        .filter_map(|(id, quantity)| {
            let stocked = state.listings.get(id)?;
            let price = stocked.listing.unit_price;
            Some(json!({
                "id": id.as_i64(),
                "vendeurProduitId": id.as_i64(),
                "produitNom": "Tapis",
                "produitTitre": stocked.listing.title,
                "produitImage": stocked.listing.image,
                "vendeurNom": stocked.listing.seller_name,
                "quantite": quantity,
                "prixUnitaire": price.to_string().parse::<f64>().unwrap(),
                "stockDisponible": stocked.stock.saturating_sub(*quantity),
            }))
        })
        .collect();
    let count: u32 = state.cart.values().sum();
    json!({ "id": 1, "clientId": 11, "lignesPanier": lines, "nombreProduits": count })
}

fn order_json(order: &PlacedOrder) -> Value {
    let total: f64 = order
        .lines
        .iter()
        .map(|(_, quantity, price)| f64::from(*quantity) * price)
        .sum();
    json!({
        "id": order.id,
        "clientId": 11,
        "clientNom": "Salma Idrissi",
        "dateCommande": "2026-03-02T14:05:09",
        "statut": order.status,
        "montantTotal": total,
        "adresseLivraison": order.address,
        "lignesCommande": order.lines.iter().enumerate().map(|(i, (id, quantity, price))| json!({
            "id": i + 1,
            "vendeurProduitId": id.as_i64(),
            "quantite": quantity,
            "prixUnitaire": price,
            "sousTotal": f64::from(*quantity) * price,
        })).collect::<Vec<_>>(),
    })
}

async fn get_cart(State(state): State<Shared>, headers: HeaderMap) -> Response {
    match admit(&state, &headers, "GET cart".to_string()) {
        Ok(guard) => Json(cart_json(&guard)).into_response(),
        Err(response) => response,
    }
}

async fn add_to_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<LineBody>,
) -> Response {
    let mut guard = match admit(&state, &headers, "POST cart/add".to_string()) {
        Ok(guard) => guard,
        Err(response) => return response,
    };
    let Some(stock) = guard.listings.get(&body.vendeur_produit_id).map(|l| l.stock) else {
        return refuse("Produit non trouvé");
    };
    let held = guard.cart.get(&body.vendeur_produit_id).copied().unwrap_or(0);
    if held + body.quantite > stock {
        return refuse(&format!(
            "Stock insuffisant. Disponible: {}",
            stock.saturating_sub(held)
        ));
    }
    guard.cart.insert(body.vendeur_produit_id, held + body.quantite);
    Json(cart_json(&guard)).into_response()
}

async fn update_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<LineBody>,
) -> Response {
    let mut guard = match admit(&state, &headers, "PUT cart/update".to_string()) {
        Ok(guard) => guard,
        Err(response) => return response,
    };
    let stock = guard
        .listings
        .get(&body.vendeur_produit_id)
        .map_or(0, |l| l.stock);
    if !guard.cart.contains_key(&body.vendeur_produit_id) {
        return refuse("Produit non trouvé dans le panier");
    }
    if body.quantite > stock {
        return refuse(&format!("Stock insuffisant. Disponible: {stock}"));
    }
    guard.cart.insert(body.vendeur_produit_id, body.quantite);
    Json(cart_json(&guard)).into_response()
}

async fn remove_from_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut guard = match admit(&state, &headers, format!("DELETE cart/item/{id}")) {
        Ok(guard) => guard,
        Err(response) => return response,
    };
    guard.cart.remove(&ListingId::new(id));
    Json(cart_json(&guard)).into_response()
}

async fn clear_cart(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut guard = match admit(&state, &headers, "DELETE cart/clear".to_string()) {
        Ok(guard) => guard,
        Err(response) => return response,
    };
    guard.cart.clear();
    Json(json!({ "success": true, "message": "Panier vidé" })).into_response()
}

async fn place_order(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<OrderBody>,
) -> Response {
    let mut guard = match admit(&state, &headers, "POST orders".to_string()) {
        Ok(guard) => guard,
        Err(response) => return response,
    };
    if body.adresse_livraison.trim().is_empty() {
        return refuse("Adresse de livraison requise");
    }
    for line in &body.lignes_commande {
        let stock = guard
            .listings
            .get(&line.vendeur_produit_id)
            .map_or(0, |l| l.stock);
        if line.quantite > stock {
            return refuse(&format!("Stock insuffisant. Disponible: {stock}"));
        }
    }
    for line in &body.lignes_commande {
        if let Some(stocked) = guard.listings.get_mut(&line.vendeur_produit_id) {
            stocked.stock = stocked.stock.saturating_sub(line.quantite);
        }
    }

    let order = PlacedOrder {
        id: 500 + i64::try_from(guard.orders.len()).unwrap() + 1,
        status: "EN_ATTENTE",
        address: body.adresse_livraison,
        lines: body
            .lignes_commande
            .iter()
            .map(|l| (l.vendeur_produit_id, l.quantite, l.prix_unitaire))
            .collect(),
    };
    let response = order_json(&order);
    guard.orders.push(order);
    Json(response).into_response()
}

async fn list_orders(State(state): State<Shared>, headers: HeaderMap) -> Response {
    match admit(&state, &headers, "GET orders".to_string()) {
        Ok(guard) => Json(guard.orders.iter().map(order_json).collect::<Vec<_>>()).into_response(),
        Err(response) => response,
    }
}

async fn get_order(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let guard = match admit(&state, &headers, format!("GET orders/{id}")) {
        Ok(guard) => guard,
        Err(response) => return response,
    };
    guard.orders.iter().find(|o| o.id == id).map_or_else(
        || refuse("Commande non trouvée"),
        |order| Json(order_json(order)).into_response(),
    )
}

async fn cancel_order(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut guard = match admit(&state, &headers, format!("POST orders/{id}/cancel")) {
        Ok(guard) => guard,
        Err(response) => return response,
    };
    let Some(index) = guard.orders.iter().position(|o| o.id == id) else {
        return refuse("Commande non trouvée");
    };
    if guard.orders[index].status != "EN_ATTENTE" {
        return refuse(
            "Impossible d'annuler cette commande. Seules les commandes en attente peuvent être annulées.",
        );
    }

    guard.orders[index].status = "ANNULEE";
    let restored = guard.orders[index].lines.clone();
    for (listing_id, quantity, _) in restored {
        if let Some(stocked) = guard.listings.get_mut(&listing_id) {
            stocked.stock += quantity;
        }
    }
    Json(json!({
        "success": true,
        "message": "Commande annulée avec succès. Le stock a été restauré."
    }))
    .into_response()
}
