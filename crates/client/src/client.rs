//! The assembled storefront client.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::api::{AuthService, HttpCartApi, OrderService};
use crate::authz::Authorizer;
use crate::cart::{CartStore, CartSync};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::http::Gateway;
use crate::session::{SessionTransitions, TokenStore};

/// One handle wiring the whole engine together: token store, gateway,
/// services, cart synchronizer, and session transitions, all sharing state
/// through cheap clones.
///
/// ```no_run
/// # use clementine_client::{ClientConfig, StorefrontClient};
/// # use clementine_client::cart::MemoryStore;
/// # async fn demo() -> clementine_client::Result<()> {
/// let config = ClientConfig::new("https://shop.example.com/api/".parse()?);
/// let client = StorefrontClient::new(config, MemoryStore::new())?;
/// let _worker = client.spawn_transitions();
/// client.cart().load().await?;
/// client.auth().login("an@example.com", "secret").await?;
/// # Ok(())
/// # }
/// ```
pub struct StorefrontClient<S> {
    tokens: TokenStore,
    gateway: Gateway,
    auth: AuthService,
    orders: OrderService,
    authorizer: Authorizer,
    cart: CartSync<HttpCartApi, Arc<S>>,
    transitions: SessionTransitions<HttpCartApi, Arc<S>>,
    store: Arc<S>,
}

impl<S: CartStore> StorefrontClient<S> {
    /// Assemble a client over the given configuration and storage backend.
    ///
    /// Any credential persisted in `store` from a previous run is restored
    /// (and dropped again if it has expired in the meantime).
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built or the
    /// persisted credential cannot be read.
    pub fn new(config: ClientConfig, store: S) -> Result<Self> {
        let store = Arc::new(store);

        let tokens = TokenStore::new();
        tokens.load_from(&store)?;
        tokens.validate_token();

        let gateway = Gateway::new(config, tokens.clone())?;
        let cart = CartSync::new(
            HttpCartApi::new(gateway.clone()),
            Arc::clone(&store),
            tokens.clone(),
        );

        Ok(Self {
            auth: AuthService::new(gateway.clone()),
            orders: OrderService::new(gateway.clone()),
            authorizer: Authorizer::new(tokens.clone()),
            transitions: SessionTransitions::new(cart.clone()),
            tokens,
            gateway,
            cart,
            store,
        })
    }

    /// Spawn the background task that reacts to identity changes.
    ///
    /// Without it (or manual [`SessionTransitions::handle`] calls) the cart
    /// does not follow logins and logouts.
    pub fn spawn_transitions(&self) -> JoinHandle<()> {
        let transitions = self.transitions.clone();
        let events = self.tokens.subscribe();
        tokio::spawn(async move { transitions.run(events).await })
    }

    /// Persist the current session credential to the storage backend.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage backend rejects the write.
    pub fn save_session(&self) -> Result<()> {
        self.tokens.save_to(&self.store)?;
        Ok(())
    }

    #[must_use]
    pub const fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    #[must_use]
    pub const fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    #[must_use]
    pub const fn auth(&self) -> &AuthService {
        &self.auth
    }

    #[must_use]
    pub const fn orders(&self) -> &OrderService {
        &self.orders
    }

    #[must_use]
    pub const fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    #[must_use]
    pub const fn cart(&self) -> &CartSync<HttpCartApi, Arc<S>> {
        &self.cart
    }

    #[must_use]
    pub const fn transitions(&self) -> &SessionTransitions<HttpCartApi, Arc<S>> {
        &self.transitions
    }
}
