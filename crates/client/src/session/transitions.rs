//! Reacting to identity changes.
//!
//! The token store publishes [`IdentityChanged`] events; this module owns the
//! cart's response to them. Login merges the guest cart into the account
//! cart, logout falls back to a fresh guest cart, and an identity *switch*
//! (one user replaced by another without an intervening logout) reloads
//! without merging so one customer's lines never leak into another's cart.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::cart::{CartApi, CartStore, CartSync};
use crate::error::Result;
use crate::session::IdentityChanged;

/// Drives the cart through login, logout, and identity-switch transitions.
#[derive(Clone)]
pub struct SessionTransitions<A, S> {
    cart: CartSync<A, S>,
}

impl<A: CartApi, S: CartStore> SessionTransitions<A, S> {
    #[must_use]
    pub const fn new(cart: CartSync<A, S>) -> Self {
        Self { cart }
    }

    /// Apply the cart transition for one identity change.
    ///
    /// - sign-in (none to some): merge the guest cart into the account cart
    /// - switch (some to a different some): reload the new account's cart,
    ///   never merging the previous user's lines into it
    /// - sign-out (some to none): reload as a guest
    ///
    /// Returns an error only when local persistence fails; remote failures
    /// degrade inside the cart operations themselves.
    pub async fn handle(&self, previous: Option<&str>, current: Option<&str>) -> Result<()> {
        match (previous, current) {
            (None, Some(identity)) => {
                debug!(identity, "signed in, merging guest cart");
                self.cart.reset();
                self.cart.merge_guest_cart().await
            }
            (Some(from), Some(to)) => {
                debug!(from, to, "identity switched, reloading cart");
                self.cart.reset();
                self.cart.load().await
            }
            (Some(identity), None) => {
                debug!(identity, "signed out, reloading guest cart");
                self.cart.reset();
                self.cart.load().await
            }
            (None, None) => Ok(()),
        }
    }

    /// Apply the transition carried by one event.
    pub async fn observe(&self, event: &IdentityChanged) -> Result<()> {
        self.handle(event.previous.as_deref(), event.current.as_deref())
            .await
    }

    /// Consume identity events until the sender side closes.
    ///
    /// On lag the receiver skips to the newest event; the final state it
    /// converges on is the same either way since each transition is computed
    /// from the event's own endpoints.
    pub async fn run(&self, mut events: broadcast::Receiver<IdentityChanged>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(err) = self.observe(&event).await {
                        warn!(error = %err, "cart transition failed");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "identity events lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::cart::MemoryStore;
    use crate::session::TokenStore;
    use crate::test_support::{principal_with, product, FakeCartApi};

    struct Fixture {
        api: Arc<FakeCartApi>,
        store: Arc<MemoryStore>,
        tokens: TokenStore,
        cart: CartSync<Arc<FakeCartApi>, Arc<MemoryStore>>,
        transitions: SessionTransitions<Arc<FakeCartApi>, Arc<MemoryStore>>,
    }

    fn fixture() -> Fixture {
        let api = Arc::new(FakeCartApi::default());
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenStore::new();
        let cart = CartSync::new(Arc::clone(&api), Arc::clone(&store), tokens.clone());
        let transitions = SessionTransitions::new(cart.clone());
        Fixture {
            api,
            store,
            tokens,
            cart,
            transitions,
        }
    }

    fn sign_in(fx: &Fixture, id: i64) {
        fx.tokens.set_tokens("access", "refresh", Some(3600));
        fx.tokens.set_user(Some(principal_with(id, false, &[])));
    }

    #[tokio::test]
    async fn login_merges_guest_cart_into_account() {
        let fx = fixture();

        // Guest adds a line while signed out.
        fx.cart.load().await.unwrap();
        fx.cart.add(&product(1, 10), 2).await.unwrap();
        assert_eq!(fx.api.add_calls.load(Ordering::SeqCst), 0);

        sign_in(&fx, 7);
        fx.transitions.handle(None, Some("7")).await.unwrap();

        assert_eq!(fx.api.quantity_of(1), Some(2));
        assert_eq!(fx.cart.count(), 2);
        // Guest slot is consumed by the merge.
        let guest_key = fx
            .store
            .get("anonymous_session_id")
            .unwrap()
            .map(|id| format!("cart:guest:{id}"));
        if let Some(key) = guest_key {
            assert_eq!(fx.store.get(&key).unwrap(), None);
        }
    }

    #[tokio::test]
    async fn logout_reloads_as_guest_without_merging() {
        let fx = fixture();

        sign_in(&fx, 7);
        fx.cart.load().await.unwrap();
        fx.cart.add(&product(1, 10), 1).await.unwrap();
        assert_eq!(fx.api.add_calls.load(Ordering::SeqCst), 1);

        fx.tokens.clear();
        fx.transitions.handle(Some("7"), None).await.unwrap();

        // The account's lines do not follow the user out.
        assert!(fx.cart.items().is_empty());
        assert!(fx.cart.is_loaded());
    }

    #[tokio::test]
    async fn identity_switch_loads_without_merging() {
        let fx = fixture();

        sign_in(&fx, 7);
        fx.cart.load().await.unwrap();
        fx.cart.add(&product(1, 10), 5).await.unwrap();

        // A different user takes over the session.
        fx.tokens.set_user(Some(principal_with(8, false, &[])));
        let fetches_before = fx.api.fetch_calls.load(Ordering::SeqCst);
        fx.transitions.handle(Some("7"), Some("8")).await.unwrap();

        assert!(fx.api.fetch_calls.load(Ordering::SeqCst) > fetches_before);
        // Remote state is shared by the fake; the point is no local merge
        // wrote user 7's namespace into user 8's slot.
        assert!(fx.store.get("cart:7").unwrap().is_some());
        assert!(fx.cart.is_loaded());
    }

    #[tokio::test]
    async fn events_drive_transitions_end_to_end() {
        let fx = fixture();
        let events = fx.tokens.subscribe();
        let transitions = fx.transitions.clone();
        let worker = tokio::spawn(async move { transitions.run(events).await });

        fx.cart.load().await.unwrap();
        fx.cart.add(&product(3, 25), 1).await.unwrap();

        sign_in(&fx, 9);
        // Give the worker a chance to consume the event.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(fx.api.quantity_of(3), Some(1));

        // The cart keeps the token store (and its event sender) alive, so
        // stop the worker directly instead of waiting for a close.
        worker.abort();
    }

    #[tokio::test]
    async fn no_op_when_identity_unchanged() {
        let fx = fixture();
        fx.transitions.handle(None, None).await.unwrap();
        assert_eq!(fx.api.fetch_calls.load(Ordering::SeqCst), 0);
        assert!(!fx.cart.is_loaded());
    }
}
