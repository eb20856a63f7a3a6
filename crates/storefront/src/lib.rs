//! Bazaar Storefront library.
//!
//! Cart reconciliation and checkout for the marketplace storefront. The UI
//! talks to one [`cart::CartEngine`] whatever the login state; the engine
//! keeps guest carts on the device and buyer carts on the backend, and
//! switches between them when the session changes.
//!
//! # Modules
//!
//! - [`cart`] - The engine, the guest cart store and the server cart seam
//! - [`session`] - Credential storage, session classification and polling
//! - [`checkout`] - Order building and submission
//! - [`api`] - HTTP clients for the marketplace backend
//! - [`storage`] - Durable key-value storage on the device
//! - [`state`] - Wiring of all of the above from a [`config::StorefrontConfig`]
//! - [`telemetry`] - Tracing and Sentry setup for host applications

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod session;
pub mod state;
pub mod storage;
pub mod telemetry;

pub use error::CartError;
pub use state::Storefront;
