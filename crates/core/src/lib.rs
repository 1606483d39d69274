//! Clementine Core - Shared types library.
//!
//! This crate provides the domain types shared by all Clementine components:
//! - `client` - The storefront session & cart synchronization engine
//! - `integration-tests` - End-to-end tests against a stub backend
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no storage.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, email, customer/principal, order and product
//!   summaries, and status enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
