//! Session classification from stored credentials.
//!
//! Login and logout can happen out of band (another window, an expired
//! token), so the storefront never caches who is logged in. It re-reads the
//! stored credentials through a [`SessionStore`] and classifies them into a
//! [`SessionState`] whenever it needs to know.
//!
//! - [`StorageSessionStore`] keeps the bearer token and the user profile under
//!   the `token` and `user` keys of a [`Storage`] area.
//! - [`SessionClassifier`] turns whatever is stored into a [`SessionState`].
//! - [`poll`] re-runs the classifier on a ticker and reports transitions.

pub mod poll;

use std::sync::Arc;

use bazaar_core::{Role, SessionState, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::{Storage, StorageError};

pub use poll::{IntervalTicker, SessionPoll, SessionSubscription, Ticker};

/// Storage key of the bearer token.
pub const TOKEN_KEY: &str = "token";

/// Storage key of the logged-in user's profile.
pub const USER_KEY: &str = "user";

/// Profile of the logged-in user, as returned by the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    #[serde(rename = "nom", default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "telephone", default)]
    pub phone: Option<String>,
    pub role: Role,
    #[serde(rename = "adresseLivraison", default)]
    pub shipping_address: Option<String>,
}

/// Stored login state.
///
/// `profile` is `None` when a token is present but the profile is missing or
/// unreadable; such a session is authenticated but never a buyer.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub token: SecretString,
    pub profile: Option<UserProfile>,
}

impl Credentials {
    /// Credentials for a freshly logged-in user.
    #[must_use]
    pub fn new(token: impl Into<String>, profile: UserProfile) -> Self {
        Self {
            token: SecretString::from(token.into()),
            profile: Some(profile),
        }
    }

    /// Role of the logged-in user, if the profile is known.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().map(|p| p.role)
    }
}

/// Where login state lives between page loads.
pub trait SessionStore: Send + Sync {
    /// Currently stored credentials, if any.
    fn credentials(&self) -> Option<Credentials>;

    /// Persist credentials after a successful login.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend cannot be written.
    fn save(&self, credentials: &Credentials) -> Result<(), StorageError>;

    /// Forget the logged-in user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend cannot be written.
    fn clear(&self) -> Result<(), StorageError>;
}

/// [`SessionStore`] over a device [`Storage`] area.
#[derive(Clone)]
pub struct StorageSessionStore {
    storage: Arc<dyn Storage>,
}

impl StorageSessionStore {
    /// Create a credential store on top of `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn read_profile(&self) -> Option<UserProfile> {
        let raw = match self.storage.get(USER_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read stored user profile");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable stored user profile");
                None
            }
        }
    }
}

impl SessionStore for StorageSessionStore {
    fn credentials(&self) -> Option<Credentials> {
        let token = match self.storage.get(TOKEN_KEY) {
            Ok(token) => token?,
            Err(e) => {
                warn!(error = %e, "Failed to read stored token");
                return None;
            }
        };
        if token.trim().is_empty() {
            return None;
        }

        Some(Credentials {
            token: SecretString::from(token),
            profile: self.read_profile(),
        })
    }

    fn save(&self, credentials: &Credentials) -> Result<(), StorageError> {
        self.storage
            .set(TOKEN_KEY, credentials.token.expose_secret())?;
        match &credentials.profile {
            Some(profile) => {
                let raw = serde_json::to_string(profile).map_err(|e| StorageError::Io {
                    key: USER_KEY.to_string(),
                    source: std::io::Error::other(e),
                })?;
                self.storage.set(USER_KEY, &raw)
            }
            None => self.storage.remove(USER_KEY),
        }
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(TOKEN_KEY)?;
        self.storage.remove(USER_KEY)
    }
}

/// Classifies the current actor from stored credentials.
#[derive(Clone)]
pub struct SessionClassifier {
    store: Arc<dyn SessionStore>,
}

impl SessionClassifier {
    /// Create a classifier reading from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// The credential store this classifier reads.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Classify the current actor.
    ///
    /// Only a stored token together with the `CLIENT` role is a buyer.
    #[must_use]
    pub fn classify(&self) -> SessionState {
        match self.store.credentials() {
            None => SessionState::Guest,
            Some(credentials) => match credentials.role() {
                Some(role) => SessionState::from_role(Some(role)),
                None => SessionState::AuthenticatedNonBuyer,
            },
        }
    }
}
