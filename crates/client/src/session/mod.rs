//! Session state: token store and identity-driven cart transitions.

pub mod tokens;
pub mod transitions;

pub use tokens::{IdentityChanged, SessionCredential, TokenStore};
pub use transitions::SessionTransitions;
