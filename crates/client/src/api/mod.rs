//! Typed services over the request gateway.
//!
//! Auth errors are rethrown to the caller (the UI decides how to present a
//! failed login); cart errors are left to the synchronizer's swallow-and-log
//! policy by way of the [`CartApi`] seam.

pub mod types;

use tracing::{instrument, warn};

use clementine_core::{CartItemId, Order, OrderId, Principal, ProductId};

use crate::cart::{CartApi, RemoteCartLine};
use crate::error::Result;
use crate::http::Gateway;
use types::{
    AddToCartRequest, CartItemDto, CartResponse, ChangePasswordRequest, CreateOrderRequest,
    CustomerDto, LoginRequest, LoginResponse, LogoutRequest, MessageResponse, OrderDto,
    RegisterRequest, UpdateQuantityRequest,
};

// ═════════════════════════════════════════════════════════════════════════
// AuthService
// ═════════════════════════════════════════════════════════════════════════

/// Authentication operations: login, registration, logout, profile fetch.
#[derive(Clone)]
pub struct AuthService {
    gateway: Gateway,
}

impl AuthService {
    #[must_use]
    pub const fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Log in with email and password.
    ///
    /// On success the token store receives the new tokens and principal;
    /// the identity-change event this publishes drives the cart merge.
    ///
    /// # Errors
    ///
    /// Rethrows transport and API errors (wrong credentials arrive as
    /// [`crate::error::ClientError::Api`] with the backend's message).
    #[instrument(skip(self, password), fields(username))]
    pub async fn login(&self, username: &str, password: &str) -> Result<Principal> {
        let response: LoginResponse = self
            .gateway
            .post_json(
                "customers/login",
                &LoginRequest {
                    username: username.to_owned(),
                    password: password.to_owned(),
                },
            )
            .await?;

        let principal = response.customer.into_principal();
        let tokens = self.gateway.tokens();
        tokens.set_tokens(
            &response.access_token,
            response.refresh_token.as_deref().unwrap_or(""),
            response.expires_in,
        );
        tokens.set_user(Some(principal.clone()));
        Ok(principal)
    }

    /// Register a new customer account.
    ///
    /// # Errors
    ///
    /// Rethrows transport and API errors.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<()> {
        let _: MessageResponse = self
            .gateway
            .post_json(
                "customers/register",
                &RegisterRequest {
                    email: email.to_owned(),
                    password: password.to_owned(),
                    first_name: first_name.map(str::to_owned),
                    last_name: last_name.map(str::to_owned),
                },
            )
            .await?;
        Ok(())
    }

    /// Log out: revoke the tokens remotely (best-effort), then clear the
    /// session locally no matter what the revocation said.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let tokens = self.gateway.tokens();
        let request = LogoutRequest {
            access_token: tokens.access_token().unwrap_or_default(),
            refresh_token: tokens.refresh_token().unwrap_or_default(),
        };

        if !request.access_token.is_empty()
            && let Err(e) = self.gateway.post_empty("customers/logout", &request).await
        {
            warn!(error = %e, "remote token revocation failed, clearing locally anyway");
        }

        tokens.clear();
        self.gateway.invalidate_cache();
    }

    /// Fetch the current profile and replace the stored principal wholesale.
    ///
    /// # Errors
    ///
    /// Rethrows transport and API errors.
    #[instrument(skip(self))]
    pub async fn fetch_user(&self) -> Result<Principal> {
        #[derive(serde::Deserialize)]
        struct UserInfoResponse {
            customer: CustomerDto,
        }

        let response: UserInfoResponse = self.gateway.get_uncached("customers/userinfo").await?;
        let principal = response.customer.into_principal();
        self.gateway.tokens().set_user(Some(principal.clone()));
        Ok(principal)
    }

    /// Change the account password.
    ///
    /// # Errors
    ///
    /// Rethrows transport and API errors.
    #[instrument(skip_all)]
    pub async fn change_password(&self, current: &str, new: &str) -> Result<()> {
        self.gateway
            .post_empty(
                "customers/change_password",
                &ChangePasswordRequest {
                    current_password: current.to_owned(),
                    new_password: new.to_owned(),
                },
            )
            .await
    }

    /// Force a token refresh through the gateway's single-flight path.
    ///
    /// # Errors
    ///
    /// See [`Gateway::refresh_tokens`].
    pub async fn refresh(&self) -> Result<()> {
        self.gateway.refresh_tokens().await
    }
}

// ═════════════════════════════════════════════════════════════════════════
// HttpCartApi
// ═════════════════════════════════════════════════════════════════════════

/// The production [`CartApi`]: REST calls through the gateway.
#[derive(Clone)]
pub struct HttpCartApi {
    gateway: Gateway,
}

impl HttpCartApi {
    #[must_use]
    pub const fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

impl CartApi for HttpCartApi {
    async fn fetch_cart(&self) -> Result<Vec<RemoteCartLine>> {
        // Never cached: the cart is the one surface where staleness shows.
        let response: CartResponse = self.gateway.get_uncached("carts").await?;
        Ok(response
            .items
            .into_iter()
            .map(RemoteCartLine::from)
            .collect())
    }

    async fn add_line(&self, product_id: ProductId, quantity: u32) -> Result<RemoteCartLine> {
        let dto: CartItemDto = self
            .gateway
            .post_json(
                "carts",
                &AddToCartRequest {
                    product_id,
                    quantity,
                },
            )
            .await?;
        Ok(dto.into())
    }

    async fn update_line(&self, item_id: CartItemId, quantity: u32) -> Result<()> {
        self.gateway
            .patch_empty(&format!("carts/{item_id}"), &UpdateQuantityRequest { quantity })
            .await
    }

    async fn remove_line(&self, item_id: CartItemId) -> Result<()> {
        self.gateway.delete(&format!("carts/{item_id}")).await
    }

    async fn clear(&self) -> Result<()> {
        self.gateway
            .post_empty("carts/clear", &serde_json::json!({}))
            .await
    }
}

// ═════════════════════════════════════════════════════════════════════════
// OrderService
// ═════════════════════════════════════════════════════════════════════════

/// Order creation and listing.
#[derive(Clone)]
pub struct OrderService {
    gateway: Gateway,
}

impl OrderService {
    #[must_use]
    pub const fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Create an order. The gateway attaches an `Idempotency-Key` so a
    /// retried submission never produces a duplicate order.
    ///
    /// # Errors
    ///
    /// Rethrows transport and API errors.
    #[instrument(skip_all)]
    pub async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order> {
        let dto: OrderDto = self
            .gateway
            .post_json_idempotent("orders", request)
            .await?;
        // Cached order listings are stale now.
        self.gateway.invalidate_cache();
        Ok(dto.into_order())
    }

    /// List the customer's orders (cached per identity).
    ///
    /// # Errors
    ///
    /// Rethrows transport and API errors.
    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        let dtos: Vec<OrderDto> = self.gateway.get_json("orders").await?;
        Ok(dtos.into_iter().map(OrderDto::into_order).collect())
    }

    /// Fetch one order (cached per identity).
    ///
    /// # Errors
    ///
    /// Rethrows transport and API errors.
    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        let dto: OrderDto = self.gateway.get_json(&format!("orders/{id}")).await?;
        Ok(dto.into_order())
    }
}
