//! Bazaar Core - Shared cart types library.
//!
//! This crate provides the types and pure rules used by the storefront cart
//! engine:
//! - sellable listings and cart lines
//! - session classification and account roles
//! - order status values
//! - the stock-aware quantity policy
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no storage,
//! no HTTP clients. This keeps the stock arithmetic in one place and testable
//! without any runtime.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, listings, cart lines, roles and statuses
//! - [`quantity`] - Stock clamping rules shared by every cart backing store

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod quantity;
pub mod types;

pub use types::*;
