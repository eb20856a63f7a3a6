//! Status and classification enums.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Account role attached to a logged-in user.
///
/// Serialized with the backend's role names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// A buyer. The only role that owns a server-side cart.
    Client,
    /// An independent vendor managing listings.
    Vendeur,
    /// A platform administrator.
    Admin,
}

impl Role {
    /// Whether this role shops through the client-facing storefront.
    #[must_use]
    pub const fn is_buyer(self) -> bool {
        matches!(self, Self::Client)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "CLIENT"),
            Self::Vendeur => write!(f, "VENDEUR"),
            Self::Admin => write!(f, "ADMIN"),
        }
    }
}

/// Error returned when parsing an unknown role name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid role: {0}")]
pub struct UnknownRole(pub String);

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CLIENT" => Ok(Self::Client),
            "VENDEUR" => Ok(Self::Vendeur),
            "ADMIN" => Ok(Self::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Who is driving the storefront right now.
///
/// Derived from stored credentials, never persisted itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No credential present.
    #[default]
    Guest,
    /// Logged in as a vendor or admin.
    AuthenticatedNonBuyer,
    /// Logged in as a client.
    AuthenticatedBuyer,
}

impl SessionState {
    /// Derive the session from credential presence and role.
    #[must_use]
    pub const fn from_role(role: Option<Role>) -> Self {
        match role {
            None => Self::Guest,
            Some(Role::Client) => Self::AuthenticatedBuyer,
            Some(Role::Vendeur | Role::Admin) => Self::AuthenticatedNonBuyer,
        }
    }

    /// Only buyers keep their cart on the server.
    #[must_use]
    pub const fn uses_remote_cart(self) -> bool {
        matches!(self, Self::AuthenticatedBuyer)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Guest => write!(f, "guest"),
            Self::AuthenticatedNonBuyer => write!(f, "authenticated_non_buyer"),
            Self::AuthenticatedBuyer => write!(f, "authenticated_buyer"),
        }
    }
}

/// Order lifecycle status as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    EnAttente,
    Confirmee,
    EnCoursLivraison,
    Livree,
    Annulee,
}

impl OrderStatus {
    /// Clients may only cancel orders nobody has acted on yet.
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        matches!(self, Self::EnAttente)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::EnAttente => "EN_ATTENTE",
            Self::Confirmee => "CONFIRMEE",
            Self::EnCoursLivraison => "EN_COURS_LIVRAISON",
            Self::Livree => "LIVREE",
            Self::Annulee => "ANNULEE",
        })
    }
}
