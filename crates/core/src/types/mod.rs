//! Core types for the Bazaar storefront.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;
pub mod price;
pub mod status;

pub use cart::{CartItem, Listing};
pub use id::*;
pub use price::{format_price, line_total};
pub use status::*;
