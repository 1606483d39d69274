//! Core types for Clementine.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod customer;
pub mod email;
pub mod id;
pub mod order;
pub mod product;
pub mod status;

pub use customer::{CustomerType, Permission, Principal};
pub use email::{Email, EmailError};
pub use id::*;
pub use order::Order;
pub use product::Product;
pub use status::{OrderStatus, PaymentMethod, PaymentStatus};
