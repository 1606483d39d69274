//! Cart synchronizer: one consistent cart view across guest and
//! authenticated contexts.
//!
//! Every mutation follows the same state machine: apply locally first (the
//! UI must reflect the action immediately), then attempt the equivalent
//! remote call when authenticated, then compensate on failure - a quantity
//! change rolls back to its pre-mutation value, while a failed add or remove
//! keeps the optimistic local state, trading consistency for availability.
//! The full line list is persisted to the namespace-keyed slot after every
//! mutation attempt regardless of remote outcome.
//!
//! Remote failures are logged and swallowed here; losing a cart line to a
//! transient backend error is worse than a temporary drift.

pub mod storage;

use std::future::Future;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use clementine_core::{CartItemId, Product, ProductId};

use crate::error::Result;
use crate::session::TokenStore;

pub use storage::{CartStore, FileStore, MemoryStore, StorageError};

/// Storage slot for the persisted anonymous session id.
const ANONYMOUS_ID_SLOT: &str = "anonymous_session_id";

/// A line in the working cart.
///
/// `item_id` is present only once the line has been acknowledged by the
/// remote cart; `None` means local-only, not yet synced. `selected` is a
/// purely local UI flag that is never sent to the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: Option<CartItemId>,
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub original_unit_price: Decimal,
    pub quantity: u32,
    pub selected: bool,
    pub image: Option<String>,
}

impl CartLine {
    /// Line subtotal at the current unit price.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A cart line as acknowledged by the remote cart service.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCartLine {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub original_unit_price: Decimal,
    pub quantity: u32,
    pub image: Option<String>,
}

impl From<RemoteCartLine> for CartLine {
    fn from(remote: RemoteCartLine) -> Self {
        Self {
            item_id: Some(remote.item_id),
            product_id: remote.product_id,
            name: remote.name,
            unit_price: remote.unit_price,
            original_unit_price: remote.original_unit_price,
            quantity: remote.quantity,
            selected: true,
            image: remote.image,
        }
    }
}

/// The remote cart collaborator.
///
/// The HTTP implementation lives in [`crate::api::HttpCartApi`]; tests
/// substitute an in-memory fake.
pub trait CartApi: Send + Sync {
    /// Fetch the full remote cart.
    fn fetch_cart(&self) -> impl Future<Output = Result<Vec<RemoteCartLine>>> + Send;

    /// Add a product to the remote cart, returning the acknowledged line.
    fn add_line(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<RemoteCartLine>> + Send;

    /// Set the quantity of an existing remote line.
    fn update_line(
        &self,
        item_id: CartItemId,
        quantity: u32,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove a line from the remote cart.
    fn remove_line(&self, item_id: CartItemId) -> impl Future<Output = Result<()>> + Send;

    /// Clear the remote cart.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}

impl<A: CartApi> CartApi for Arc<A> {
    fn fetch_cart(&self) -> impl Future<Output = Result<Vec<RemoteCartLine>>> + Send {
        (**self).fetch_cart()
    }

    fn add_line(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<RemoteCartLine>> + Send {
        (**self).add_line(product_id, quantity)
    }

    fn update_line(
        &self,
        item_id: CartItemId,
        quantity: u32,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).update_line(item_id, quantity)
    }

    fn remove_line(&self, item_id: CartItemId) -> impl Future<Output = Result<()>> + Send {
        (**self).remove_line(item_id)
    }

    fn clear(&self) -> impl Future<Output = Result<()>> + Send {
        (**self).clear()
    }
}

#[derive(Default)]
struct CartState {
    items: Vec<CartLine>,
    loaded: bool,
    loading: bool,
    /// Fence for stale in-flight loads: every reset bumps this, and a load
    /// discards its result when the generation it started under has moved.
    generation: u64,
}

/// Handle to the session's cart.
pub struct CartSync<A, S> {
    inner: Arc<CartSyncInner<A, S>>,
}

impl<A, S> Clone for CartSync<A, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CartSyncInner<A, S> {
    api: A,
    store: S,
    tokens: TokenStore,
    state: Mutex<CartState>,
}

impl<A: CartApi, S: CartStore> CartSync<A, S> {
    /// Create a cart synchronizer over the given remote collaborator,
    /// persistence backend, and token store.
    pub fn new(api: A, store: S, tokens: TokenStore) -> Self {
        Self {
            inner: Arc::new(CartSyncInner {
                api,
                store,
                tokens,
                state: Mutex::new(CartState::default()),
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Derived views
    // ─────────────────────────────────────────────────────────────────────

    /// Snapshot of the current line list.
    #[must_use]
    pub fn items(&self) -> Vec<CartLine> {
        self.with_state(|state| state.items.clone())
    }

    /// Snapshot of the currently selected lines.
    #[must_use]
    pub fn selected_items(&self) -> Vec<CartLine> {
        self.with_state(|state| {
            state
                .items
                .iter()
                .filter(|line| line.selected)
                .cloned()
                .collect()
        })
    }

    /// Total quantity across all lines.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.with_state(|state| state.items.iter().map(|line| line.quantity).sum())
    }

    /// Total price across all lines.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.with_state(|state| state.items.iter().map(CartLine::subtotal).sum())
    }

    /// Total quantity across selected lines.
    #[must_use]
    pub fn selected_count(&self) -> u32 {
        self.with_state(|state| {
            state
                .items
                .iter()
                .filter(|line| line.selected)
                .map(|line| line.quantity)
                .sum()
        })
    }

    /// Total price across selected lines.
    #[must_use]
    pub fn selected_total(&self) -> Decimal {
        self.with_state(|state| {
            state
                .items
                .iter()
                .filter(|line| line.selected)
                .map(CartLine::subtotal)
                .sum()
        })
    }

    /// Whether a load has completed since the last reset.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.with_state(|state| state.loaded)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Namespacing
    // ─────────────────────────────────────────────────────────────────────

    /// The storage namespace for the current identity.
    ///
    /// `cart:<identity>` when authenticated, else the guest namespace.
    /// Switching identity therefore never exposes another identity's lines.
    ///
    /// # Errors
    ///
    /// Returns an error when the anonymous session id cannot be read or
    /// created.
    pub fn namespace(&self) -> std::result::Result<String, StorageError> {
        self.inner.tokens.identity_key().map_or_else(
            || self.guest_namespace(),
            |key| Ok(format!("cart:{key}")),
        )
    }

    /// The guest storage namespace, independent of authentication state.
    ///
    /// # Errors
    ///
    /// Returns an error when the anonymous session id cannot be read or
    /// created.
    pub fn guest_namespace(&self) -> std::result::Result<String, StorageError> {
        Ok(format!("cart:guest:{}", self.anonymous_session_id()?))
    }

    fn anonymous_session_id(&self) -> std::result::Result<String, StorageError> {
        if let Some(id) = self.inner.store.get(ANONYMOUS_ID_SLOT)? {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        self.inner.store.put(ANONYMOUS_ID_SLOT, &id)?;
        Ok(id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────

    /// Add `quantity` of `product` to the cart.
    ///
    /// Adding a product already in the cart increments its line; there is
    /// never more than one line per product id.
    ///
    /// # Errors
    ///
    /// Returns an error only when local persistence fails; remote failures
    /// keep the optimistic local state.
    pub async fn add(&self, product: &Product, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return Ok(());
        }

        let (existing_item_id, new_quantity) = self.with_state(|state| {
            if let Some(line) = state
                .items
                .iter_mut()
                .find(|line| line.product_id == product.id)
            {
                line.quantity += quantity;
                (line.item_id, line.quantity)
            } else {
                state.items.push(CartLine {
                    item_id: None,
                    product_id: product.id,
                    name: product.name.clone(),
                    unit_price: product.effective_price(),
                    original_unit_price: product.price,
                    quantity,
                    selected: true,
                    image: product.thumbnail.clone(),
                });
                (None, quantity)
            }
        });

        if self.inner.tokens.is_authenticated() {
            match existing_item_id {
                Some(item_id) => {
                    if let Err(e) = self.inner.api.update_line(item_id, new_quantity).await {
                        warn!(product_id = %product.id, error = %e, "remote cart add-increment failed, keeping local line");
                    }
                }
                None => match self.inner.api.add_line(product.id, quantity).await {
                    Ok(remote) => self.with_state(|state| {
                        if let Some(line) = state
                            .items
                            .iter_mut()
                            .find(|line| line.product_id == product.id)
                        {
                            line.item_id = Some(remote.item_id);
                        }
                    }),
                    Err(e) => {
                        warn!(product_id = %product.id, error = %e, "remote cart add failed, keeping local line");
                    }
                },
            }
        }

        self.persist()
    }

    /// Set the quantity of the line for `product_id`.
    ///
    /// A quantity of zero removes the line; quantities below one are never
    /// persisted. On remote failure the pre-mutation quantity is restored
    /// exactly.
    ///
    /// # Errors
    ///
    /// Returns an error only when local persistence fails.
    pub async fn set_quantity(&self, product_id: ProductId, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return self.remove(product_id).await;
        }

        let Some((previous, item_id)) = self.with_state(|state| {
            state
                .items
                .iter_mut()
                .find(|line| line.product_id == product_id)
                .map(|line| {
                    let previous = line.quantity;
                    line.quantity = quantity;
                    (previous, line.item_id)
                })
        }) else {
            return Ok(());
        };

        if self.inner.tokens.is_authenticated()
            && let Some(item_id) = item_id
            && let Err(e) = self.inner.api.update_line(item_id, quantity).await
        {
            warn!(%product_id, error = %e, "remote quantity update failed, rolling back");
            self.with_state(|state| {
                if let Some(line) = state
                    .items
                    .iter_mut()
                    .find(|line| line.product_id == product_id)
                {
                    line.quantity = previous;
                }
            });
        }

        self.persist()
    }

    /// Remove the line for `product_id`.
    ///
    /// # Errors
    ///
    /// Returns an error only when local persistence fails; a remote failure
    /// keeps the optimistic removal.
    pub async fn remove(&self, product_id: ProductId) -> Result<()> {
        let removed_item_id = self.with_state(|state| {
            let item_id = state
                .items
                .iter()
                .find(|line| line.product_id == product_id)
                .and_then(|line| line.item_id);
            state.items.retain(|line| line.product_id != product_id);
            item_id
        });

        if self.inner.tokens.is_authenticated()
            && let Some(item_id) = removed_item_id
            && let Err(e) = self.inner.api.remove_line(item_id).await
        {
            warn!(%product_id, error = %e, "remote cart removal failed, keeping local removal");
        }

        self.persist()
    }

    /// Toggle the local selection flag of one line. Never contacts the
    /// remote.
    ///
    /// # Errors
    ///
    /// Returns an error only when local persistence fails.
    pub fn toggle_selected(&self, product_id: ProductId) -> Result<()> {
        self.with_state(|state| {
            if let Some(line) = state
                .items
                .iter_mut()
                .find(|line| line.product_id == product_id)
            {
                line.selected = !line.selected;
            }
        });
        self.persist()
    }

    /// Select every line, or deselect all when everything is already
    /// selected. Never contacts the remote.
    ///
    /// # Errors
    ///
    /// Returns an error only when local persistence fails.
    pub fn toggle_select_all(&self) -> Result<()> {
        self.with_state(|state| {
            let all_selected = state.items.iter().all(|line| line.selected);
            for line in &mut state.items {
                line.selected = !all_selected;
            }
        });
        self.persist()
    }

    /// Clear the cart locally and, when authenticated, remotely
    /// (best-effort).
    ///
    /// # Errors
    ///
    /// Returns an error only when local persistence fails.
    pub async fn clear(&self) -> Result<()> {
        self.with_state(|state| state.items.clear());

        if self.inner.tokens.is_authenticated()
            && let Err(e) = self.inner.api.clear().await
        {
            warn!(error = %e, "remote cart clear failed, keeping local clear");
        }

        self.persist()
    }

    /// Drop in-memory state and fence any in-flight load.
    ///
    /// Used on identity transitions; the persisted slots are untouched.
    pub fn reset(&self) {
        self.with_state(|state| {
            state.items.clear();
            state.loaded = false;
            state.loading = false;
            state.generation += 1;
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Load & merge
    // ─────────────────────────────────────────────────────────────────────

    /// Load the cart: hydrate the local namespace slot, then let a
    /// non-empty remote cart replace it when authenticated.
    ///
    /// Concurrent calls are a no-op while a load is in progress. An empty
    /// remote response never erases a populated local cache (the remote
    /// fetch may have raced ahead of a pending sync), and a remote failure
    /// degrades silently to the local-only cart.
    ///
    /// # Errors
    ///
    /// Returns an error only when local persistence fails.
    pub async fn load(&self) -> Result<()> {
        let generation = {
            let mut state = self.lock_state();
            if state.loading {
                return Ok(());
            }
            state.loading = true;
            state.generation
        };

        let result = self.load_inner(generation).await;

        {
            let mut state = self.lock_state();
            if state.generation == generation {
                state.loading = false;
                if result.is_ok() {
                    state.loaded = true;
                }
            }
        }
        result
    }

    async fn load_inner(&self, generation: u64) -> Result<()> {
        let namespace = self.namespace()?;

        if let Some(json) = self.inner.store.get(&namespace)? {
            match serde_json::from_str::<Vec<CartLine>>(&json) {
                Ok(hydrated) => self.apply_if_current(generation, hydrated),
                Err(e) => warn!(%namespace, error = %e, "discarding unreadable cart slot"),
            }
        }

        if self.inner.tokens.is_authenticated() {
            match self.inner.api.fetch_cart().await {
                Ok(remote) if remote.is_empty() => {
                    debug!("remote cart empty, keeping hydrated local lines");
                }
                Ok(remote) => {
                    self.apply_if_current(
                        generation,
                        remote.into_iter().map(CartLine::from).collect(),
                    );
                    self.persist()?;
                }
                Err(e) => {
                    warn!(error = %e, "remote cart fetch failed, degrading to local-only cart");
                }
            }
        }

        Ok(())
    }

    /// Merge the guest cart into the authenticated user's remote cart.
    ///
    /// For each guest line: a product missing remotely is added with the
    /// guest quantity; a product already present gets a remote update with
    /// the quantities summed. The guest slot is then deleted and the cart
    /// reloaded from remote. If the remote cart cannot be fetched at all the
    /// merge is skipped (guest slot kept for a later attempt) and the cart
    /// loads local-only.
    ///
    /// # Errors
    ///
    /// Returns an error only when local persistence fails.
    pub async fn merge_guest_cart(&self) -> Result<()> {
        let guest_key = self.guest_namespace()?;
        let guest_items: Vec<CartLine> = self
            .inner
            .store
            .get(&guest_key)?
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default();

        if guest_items.is_empty() {
            self.inner.store.delete(&guest_key)?;
            return self.load().await;
        }

        let remote = match self.inner.api.fetch_cart().await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = %e, "remote cart unavailable, skipping guest merge");
                return self.load().await;
            }
        };

        for guest in &guest_items {
            let matched = remote
                .iter()
                .find(|line| line.product_id == guest.product_id);
            let outcome = match matched {
                Some(line) => {
                    self.inner
                        .api
                        .update_line(line.item_id, line.quantity + guest.quantity)
                        .await
                }
                None => self
                    .inner
                    .api
                    .add_line(guest.product_id, guest.quantity)
                    .await
                    .map(|_| ()),
            };
            if let Err(e) = outcome {
                warn!(product_id = %guest.product_id, error = %e, "guest line merge failed");
            }
        }

        self.inner.store.delete(&guest_key)?;
        // Clear first so a slow reload never shows pre-merge lines.
        self.reset();
        self.load().await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn apply_if_current(&self, generation: u64, items: Vec<CartLine>) {
        let mut state = self.lock_state();
        if state.generation == generation {
            state.items = items;
        } else {
            debug!("discarding stale cart load result");
        }
    }

    fn persist(&self) -> Result<()> {
        let namespace = self.namespace()?;
        let json = self.with_state(|state| serde_json::to_string(&state.items))?;
        self.inner.store.put(&namespace, &json)?;
        Ok(())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut CartState) -> T) -> T {
        f(&mut self.lock_state())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CartState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
