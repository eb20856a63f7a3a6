//! Marketplace REST backend clients.
//!
//! # Architecture
//!
//! - [`ApiClient`] owns the `reqwest` client, the base URL and the credential
//!   store it reads the bearer token from on every request. Login state can
//!   change between two calls, so the token is never cached.
//! - [`HttpCartGateway`] implements [`crate::cart::CartGateway`] over the
//!   `cart` endpoints.
//! - [`OrderClient`] places, lists and cancels orders.
//!
//! Every response is classified the same way: 401/403 is an expired login,
//! 5xx a server failure, any other 4xx a business rejection carrying the
//! backend's message.
//!
//! # Example
//!
//! ```rust,ignore
//! use bazaar_storefront::api::{ApiClient, HttpCartGateway};
//!
//! let client = ApiClient::new(&config.api, sessions.clone())?;
//! let gateway = HttpCartGateway::new(client.clone());
//! let lines = gateway.fetch().await?;
//! ```

mod cart;
mod conversions;
mod orders;
pub mod types;

pub use cart::HttpCartGateway;
pub use conversions::to_cart_item;
pub use orders::OrderClient;
pub use types::{OrderConfirmation, OrderConfirmationLine};

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ApiConfig;
use crate::error::CartError;
use crate::session::SessionStore;

use types::MessageResponse;

/// Longest slice of a response body kept in errors and logs.
const BODY_EXCERPT: usize = 200;

/// Errors that can occur when talking to the marketplace backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure or timeout.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend refused the bearer token.
    #[error("Unauthorized (HTTP {0})")]
    Unauthorized(u16),

    /// No token is stored, so the authenticated call was not attempted.
    #[error("No bearer token stored")]
    MissingToken,

    /// The backend failed with a 5xx.
    #[error("Server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    /// The backend refused the request with a 4xx and a reason.
    #[error("Rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// An endpoint path could not be joined to the base URL.
    #[error("Invalid endpoint: {0}")]
    Url(#[from] url::ParseError),
}

impl From<ApiError> for CartError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Unauthorized(_) | ApiError::MissingToken => Self::AuthExpired,
            ApiError::Http(e) => Self::NetworkOrServer(e.to_string()),
            ApiError::Server { status, .. } => Self::NetworkOrServer(format!("HTTP {status}")),
            ApiError::Rejected { message, .. } => Self::Rejected(message),
            ApiError::Parse(e) => Self::Decode(e.to_string()),
            ApiError::Url(e) => Self::NetworkOrServer(e.to_string()),
        }
    }
}

// =============================================================================
// ApiClient
// =============================================================================

/// Authenticated JSON client for the marketplace backend.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    sessions: Arc<dyn SessionStore>,
}

impl ApiClient {
    /// Create a client for the backend at `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig, sessions: Arc<dyn SessionStore>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.base_url.clone(),
                sessions,
            }),
        })
    }

    /// Base URL endpoint paths are joined to.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Start an authenticated request to `path`.
    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let token = self
            .inner
            .sessions
            .credentials()
            .ok_or(ApiError::MissingToken)?
            .token;
        let url = self.inner.base_url.join(path)?;

        Ok(self
            .inner
            .client
            .request(method, url)
            .bearer_auth(token.expose_secret())
            .header("Accept", "application/json"))
    }

    /// Send a request and return the body of a successful response.
    #[instrument(skip(self, request))]
    async fn execute(&self, request: RequestBuilder, path: &str) -> Result<String, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        classify(status, &body)?;
        debug!(status = %status, bytes = body.len(), "Backend responded");
        Ok(body)
    }

    /// `GET` a JSON document.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let body = self.execute(self.request(Method::GET, path)?, path).await?;
        parse(&body)
    }

    /// Send a JSON body and decode the JSON answer.
    async fn send_json<B, T>(&self, method: Method, path: &str, payload: &B) -> Result<T, ApiError>
    where
        B: serde::Serialize + Sync,
        T: DeserializeOwned,
    {
        let request = self.request(method, path)?.json(payload);
        let body = self.execute(request, path).await?;
        parse(&body)
    }

    /// Issue a write whose answer only matters when it reports a failure.
    async fn write<B>(&self, method: Method, path: &str, payload: Option<&B>) -> Result<(), ApiError>
    where
        B: serde::Serialize + Sync,
    {
        let mut request = self.request(method, path)?;
        if let Some(payload) = payload {
            request = request.json(payload);
        }
        let body = self.execute(request, path).await?;
        refuse_unsuccessful(StatusCode::OK, &body)
    }
}

// =============================================================================
// Response classification
// =============================================================================

/// Map a non-success status to the matching [`ApiError`].
fn classify(status: StatusCode, body: &str) -> Result<(), ApiError> {
    if status.is_success() {
        return Ok(());
    }
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(ApiError::Unauthorized(status.as_u16()));
    }
    if status.is_client_error() {
        return Err(ApiError::Rejected {
            status: status.as_u16(),
            message: rejection_message(body),
        });
    }

    tracing::error!(
        status = %status,
        body = %excerpt(body),
        "Backend returned non-success status"
    );
    Err(ApiError::Server {
        status: status.as_u16(),
        body: excerpt(body),
    })
}

/// Treat a `{ "success": false }` body as a rejection even under a 2xx.
fn refuse_unsuccessful(status: StatusCode, body: &str) -> Result<(), ApiError> {
    match serde_json::from_str::<MessageResponse>(body) {
        Ok(reply) if !reply.success => Err(ApiError::Rejected {
            status: status.as_u16(),
            message: reply.message.unwrap_or_else(|| "Request refused".to_string()),
        }),
        _ => Ok(()),
    }
}

/// The backend's reason for a 4xx, or the raw body when it has none.
fn rejection_message(body: &str) -> String {
    serde_json::from_str::<MessageResponse>(body)
        .ok()
        .and_then(|reply| reply.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| excerpt(body))
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %excerpt(body),
            "Failed to parse backend response"
        );
        ApiError::Parse(e)
    })
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT).collect()
}
