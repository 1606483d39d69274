//! Clementine Client - storefront session & cart synchronization engine.
//!
//! This crate is the client-side core of a storefront: it keeps a locally
//! persisted shopping cart consistent with a remote cart service across
//! anonymous and authenticated sessions, manages the access/refresh token
//! lifecycle with single-flight refresh, and evaluates the permission/VIP
//! model that gates cart and checkout actions.
//!
//! # Components
//!
//! - [`session::TokenStore`] - single source of truth for authentication
//!   state; publishes identity-change events.
//! - [`authz::Authorizer`] - maps UI action names to allow/deny decisions.
//! - [`cart::CartSync`] - optimistic cart mutations with per-kind
//!   compensation, namespace-scoped persistence, and guest-to-user merge.
//! - [`session::SessionTransitions`] - reacts to identity changes and drives
//!   the correct cart lifecycle transition.
//! - [`http::Gateway`] - outbound HTTP with auth headers, identity-scoped GET
//!   caching, and 401-triggered token refresh.
//!
//! # Example
//!
//! ```rust,ignore
//! use clementine_client::{ClientConfig, StorefrontClient};
//! use clementine_client::cart::storage::MemoryStore;
//!
//! let config = ClientConfig::new("https://api.example.com".parse()?);
//! let client = StorefrontClient::new(config, MemoryStore::default())?;
//!
//! client.auth().login("customer", "password").await?;
//! client.cart().add(&product, 2).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod authz;
pub mod cart;
mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::StorefrontClient;
pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, Result};
