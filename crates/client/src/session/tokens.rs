//! Token store: the single source of truth for authentication state.
//!
//! The store is a cheap `Clone` handle over shared state, injected into every
//! collaborator that needs it - there is no ambient global. Identity changes
//! (login, logout, account switch) are published on a broadcast channel so
//! the [`crate::session::SessionTransitions`] handler can react without any
//! framework-level reactivity.
//!
//! All queries degrade to `false`/empty when state is absent; nothing here
//! returns an error or panics.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use clementine_core::{CustomerType, Permission, Principal};

use crate::cart::storage::{CartStore, StorageError};

/// Storage slot for the persisted credential blob.
const CREDENTIAL_SLOT: &str = "session";

/// Event published when the session's identity key changes.
///
/// The key is the principal's id-or-email when authenticated, else `None`.
/// An event fires only when the key's *value* changes, never on unrelated
/// token updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityChanged {
    pub previous: Option<String>,
    pub current: Option<String>,
}

/// The session credential: tokens, expiry, and the owning principal.
///
/// An empty access token means unauthenticated regardless of the other
/// fields; a missing expiry means the access token is treated as
/// non-expiring.
#[derive(Default)]
pub struct SessionCredential {
    access_token: String,
    refresh_token: Option<SecretString>,
    expires_at: Option<DateTime<Utc>>,
    user: Option<Principal>,
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Serialized form of the credential for the local persistence slot.
#[derive(Serialize, Deserialize)]
struct PersistedCredential {
    access_token: String,
    refresh_token: String,
    expires_at: Option<DateTime<Utc>>,
    user: Option<Principal>,
}

/// Handle to the shared authentication state.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<TokenStoreInner>,
}

struct TokenStoreInner {
    state: RwLock<SessionCredential>,
    events: broadcast::Sender<IdentityChanged>,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    /// Create an empty (unauthenticated) token store.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(TokenStoreInner {
                state: RwLock::new(SessionCredential::default()),
                events,
            }),
        }
    }

    /// Subscribe to identity-change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<IdentityChanged> {
        self.inner.events.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────

    /// Set tokens after login or refresh.
    ///
    /// The access token is set unconditionally. The refresh token is only
    /// replaced when the new one is non-empty, so a refresh response that
    /// omits it keeps the previous one. The expiry is only touched when
    /// `expires_in` (seconds) is given.
    pub fn set_tokens(&self, access: &str, refresh: &str, expires_in: Option<i64>) {
        self.mutate(|state| {
            state.access_token = access.to_owned();
            if !refresh.is_empty() {
                state.refresh_token = Some(SecretString::from(refresh));
            }
            if let Some(seconds) = expires_in {
                state.expires_at = Some(Utc::now() + Duration::seconds(seconds));
            }
        });
    }

    /// Replace the principal wholesale.
    pub fn set_user(&self, user: Option<Principal>) {
        self.mutate(|state| state.user = user);
    }

    /// Reset every field to its empty default.
    ///
    /// Dependent state (cart, cached responses) is *not* cascaded from here;
    /// callers react to the published identity change instead.
    pub fn clear(&self) {
        self.mutate(|state| *state = SessionCredential::default());
    }

    /// Validate the access token, clearing the session when it has expired.
    ///
    /// This is the only operation that self-cascades into [`Self::clear`].
    /// Returns `true` when an unexpired access token is present.
    pub fn validate_token(&self) -> bool {
        if self.read(|state| state.access_token.is_empty()) {
            return false;
        }
        if self.is_token_expired() {
            self.clear();
            return false;
        }
        true
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Whether an unexpired access token is present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read(|state| {
            !state.access_token.is_empty()
                && state.expires_at.is_none_or(|at| Utc::now() < at)
        })
    }

    /// Whether the access token has passed its expiry.
    #[must_use]
    pub fn is_token_expired(&self) -> bool {
        self.read(|state| state.expires_at.is_some_and(|at| Utc::now() >= at))
    }

    /// Time remaining before the access token expires, if an expiry is set.
    #[must_use]
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.read(|state| {
            state
                .expires_at
                .map(|at| (at - Utc::now()).max(Duration::zero()))
        })
    }

    /// Whether the token expires within the given window.
    #[must_use]
    pub fn expiring_within(&self, window: Duration) -> bool {
        self.time_until_expiry().is_some_and(|left| left < window)
    }

    /// The current access token, when non-empty.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.read(|state| {
            if state.access_token.is_empty() {
                None
            } else {
                Some(state.access_token.clone())
            }
        })
    }

    /// The current refresh token, when one is held.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.read(|state| {
            state
                .refresh_token
                .as_ref()
                .map(|secret| secret.expose_secret().to_owned())
                .filter(|token| !token.is_empty())
        })
    }

    /// Whether a refresh token is available.
    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token().is_some()
    }

    /// A clone of the current principal.
    #[must_use]
    pub fn user(&self) -> Option<Principal> {
        self.read(|state| state.user.clone())
    }

    /// The customer tier, defaulting to regular when no user is set.
    #[must_use]
    pub fn customer_type(&self) -> CustomerType {
        self.read(|state| {
            state
                .user
                .as_ref()
                .map_or(CustomerType::Regular, |user| user.customer_type)
        })
    }

    /// The explicit permission set (VIP implication not applied).
    #[must_use]
    pub fn permissions(&self) -> HashSet<Permission> {
        self.read(|state| {
            state
                .user
                .as_ref()
                .map(|user| user.permissions.clone())
                .unwrap_or_default()
        })
    }

    /// Whether VIP status is currently active.
    #[must_use]
    pub fn is_vip_active(&self) -> bool {
        self.read(|state| state.user.as_ref().is_some_and(Principal::vip_active))
    }

    /// Whether the current user holds the given permission.
    ///
    /// False with no user; unconditionally true while VIP is active.
    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.read(|state| {
            state
                .user
                .as_ref()
                .is_some_and(|user| user.has_permission(permission))
        })
    }

    /// Whether the current user holds every listed permission.
    #[must_use]
    pub fn has_all_permissions(&self, permissions: &[Permission]) -> bool {
        self.read(|state| {
            state.user.as_ref().is_some_and(|user| {
                user.vip_active()
                    || permissions
                        .iter()
                        .all(|permission| user.permissions.contains(permission))
            })
        })
    }

    /// Whether the current user holds any of the listed permissions.
    #[must_use]
    pub fn has_any_permission(&self, permissions: &[Permission]) -> bool {
        self.read(|state| {
            state.user.as_ref().is_some_and(|user| {
                user.vip_active()
                    || permissions
                        .iter()
                        .any(|permission| user.permissions.contains(permission))
            })
        })
    }

    /// The identity key scoping caches and cart namespaces.
    ///
    /// `Some(id-or-email)` when authenticated with a principal, else `None`.
    #[must_use]
    pub fn identity_key(&self) -> Option<String> {
        self.read(|state| {
            if state.access_token.is_empty() {
                return None;
            }
            state.user.as_ref().map(Principal::identity_key)
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────

    /// Persist the credential blob to the given store.
    ///
    /// # Errors
    ///
    /// Returns an error when the slot cannot be written.
    pub fn save_to<S: CartStore>(&self, store: &S) -> Result<(), StorageError> {
        let blob = self.read(|state| PersistedCredential {
            access_token: state.access_token.clone(),
            refresh_token: state
                .refresh_token
                .as_ref()
                .map(|secret| secret.expose_secret().to_owned())
                .unwrap_or_default(),
            expires_at: state.expires_at,
            user: state.user.clone(),
        });
        let json = serde_json::to_string(&blob)?;
        store.put(CREDENTIAL_SLOT, &json)
    }

    /// Hydrate the credential blob from the given store, if one was saved.
    ///
    /// # Errors
    ///
    /// Returns an error when the slot cannot be read or parsed.
    pub fn load_from<S: CartStore>(&self, store: &S) -> Result<(), StorageError> {
        let Some(json) = store.get(CREDENTIAL_SLOT)? else {
            return Ok(());
        };
        let blob: PersistedCredential = serde_json::from_str(&json)?;
        self.mutate(|state| {
            state.access_token = blob.access_token.clone();
            state.refresh_token = if blob.refresh_token.is_empty() {
                None
            } else {
                Some(SecretString::from(blob.refresh_token.clone()))
            };
            state.expires_at = blob.expires_at;
            state.user = blob.user.clone();
        });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn read<T>(&self, f: impl FnOnce(&SessionCredential) -> T) -> T {
        let state = match self.inner.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&state)
    }

    /// Apply a mutation and publish an identity event if the key changed.
    fn mutate(&self, f: impl FnOnce(&mut SessionCredential)) {
        let (previous, current) = {
            let mut state = match self.inner.state.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let previous = identity_key_of(&state);
            f(&mut state);
            (previous, identity_key_of(&state))
        };

        if previous != current {
            // No receivers is fine; events are best-effort.
            let _ = self.inner.events.send(IdentityChanged { previous, current });
        }
    }
}

fn identity_key_of(state: &SessionCredential) -> Option<String> {
    if state.access_token.is_empty() {
        return None;
    }
    state.user.as_ref().map(Principal::identity_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::principal_with;
    use clementine_core::CustomerId;

    #[test]
    fn empty_store_is_unauthenticated() {
        let store = TokenStore::new();
        assert!(!store.is_authenticated());
        assert!(store.access_token().is_none());
        assert!(store.identity_key().is_none());
        assert!(store.permissions().is_empty());
    }

    #[test]
    fn set_tokens_preserves_refresh_when_empty() {
        let store = TokenStore::new();
        store.set_tokens("access-1", "refresh-1", Some(3600));
        store.set_tokens("access-2", "", None);

        assert_eq!(store.access_token().as_deref(), Some("access-2"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh-1"));
        assert!(store.is_authenticated());
    }

    #[test]
    fn expired_token_is_unauthenticated_and_validate_clears() {
        let store = TokenStore::new();
        store.set_tokens("access", "refresh", Some(-10));

        assert!(!store.is_authenticated());
        assert!(store.is_token_expired());
        assert!(!store.validate_token());
        // validate_token cleared everything, refresh token included
        assert!(store.access_token().is_none());
        assert!(!store.has_refresh_token());
    }

    #[test]
    fn no_expiry_means_non_expiring() {
        let store = TokenStore::new();
        store.set_tokens("access", "", None);
        assert!(store.is_authenticated());
        assert!(store.time_until_expiry().is_none());
        assert!(store.validate_token());
    }

    #[test]
    fn vip_active_grants_every_permission() {
        let store = TokenStore::new();
        store.set_tokens("access", "", None);
        store.set_user(Some(principal_with(1, true, &[])));

        assert!(store.has_permission(Permission::CancelOrder));
        assert!(store.has_permission(Permission::ExclusiveProducts));
        assert!(store.has_all_permissions(&[
            Permission::ViewOrders,
            Permission::EarlyAccess,
            Permission::FreeShipping,
        ]));
    }

    #[test]
    fn explicit_permission_set_without_vip() {
        let store = TokenStore::new();
        store.set_tokens("access", "", None);
        store.set_user(Some(principal_with(1, false, &[Permission::ViewOrders])));

        assert!(store.has_permission(Permission::ViewOrders));
        assert!(!store.has_permission(Permission::CancelOrder));
        assert!(!store.has_all_permissions(&[Permission::ViewOrders, Permission::CancelOrder]));
        assert!(store.has_all_permissions(&[Permission::ViewOrders]));
        assert!(store.has_any_permission(&[Permission::ViewOrders, Permission::CancelOrder]));
    }

    #[test]
    fn queries_degrade_without_user() {
        let store = TokenStore::new();
        store.set_tokens("access", "", None);
        assert!(!store.has_permission(Permission::ViewProfile));
        assert!(!store.has_all_permissions(&[]));
        assert_eq!(store.customer_type(), CustomerType::Regular);
    }

    #[test]
    fn identity_event_fires_only_on_key_change() {
        let store = TokenStore::new();
        let mut events = store.subscribe();

        store.set_tokens("access", "", None);
        store.set_user(Some(principal_with(7, false, &[])));

        let event = events.try_recv().unwrap();
        assert_eq!(event.previous, None);
        assert_eq!(event.current, Some("7".to_owned()));

        // Token rotation with an unchanged principal publishes nothing.
        store.set_tokens("access-2", "refresh", Some(60));
        assert!(events.try_recv().is_err());

        store.clear();
        let event = events.try_recv().unwrap();
        assert_eq!(event.previous, Some("7".to_owned()));
        assert_eq!(event.current, None);
    }

    #[test]
    fn account_switch_publishes_old_and_new_keys() {
        let store = TokenStore::new();
        store.set_tokens("access", "", None);
        store.set_user(Some(principal_with(1, false, &[])));

        let mut events = store.subscribe();
        store.set_user(Some(principal_with(2, false, &[])));

        let event = events.try_recv().unwrap();
        assert_eq!(event.previous, Some("1".to_owned()));
        assert_eq!(event.current, Some("2".to_owned()));
    }

    #[test]
    fn credential_round_trips_through_store() {
        use crate::cart::storage::MemoryStore;

        let slot = MemoryStore::default();
        let store = TokenStore::new();
        store.set_tokens("access", "refresh", Some(3600));
        store.set_user(Some(principal_with(5, false, &[Permission::CreateOrder])));
        store.save_to(&slot).unwrap();

        let restored = TokenStore::new();
        restored.load_from(&slot).unwrap();
        assert_eq!(restored.access_token().as_deref(), Some("access"));
        assert_eq!(restored.refresh_token().as_deref(), Some("refresh"));
        assert_eq!(restored.user().unwrap().id, CustomerId::new(5));
        assert!(restored.has_permission(Permission::CreateOrder));
    }

    #[test]
    fn debug_redacts_tokens() {
        let credential = SessionCredential {
            access_token: "top-secret".into(),
            ..SessionCredential::default()
        };
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("top-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
