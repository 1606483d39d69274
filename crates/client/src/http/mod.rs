//! Request gateway: the single path every outbound HTTP call takes.
//!
//! The gateway attaches session headers, caches GET responses per identity,
//! and turns a 401 into a session correction: refresh the tokens when a
//! refresh token exists, clear the session when it does not. The failing
//! call still returns an error either way; the gateway repairs state, it
//! never retries on the caller's behalf.
//!
//! Token refresh is single-flight. Concurrent callers collapse onto one
//! in-flight network call through a guard mutex plus a generation counter:
//! a caller that waited out someone else's flight reports that flight's
//! outcome instead of starting its own.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::session::TokenStore;

/// GET cache TTL. Short on purpose: the cart and profile surfaces tolerate
/// a minute of staleness, not more.
const CACHE_TTL: Duration = Duration::from_secs(60);
const CACHE_CAPACITY: u64 = 500;

/// Cache key: the request path scoped to the identity that made it, so one
/// identity never reads another's cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: String,
    scope: String,
}

/// HTTP gateway shared by every service collaborator.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    http: reqwest::Client,
    config: ClientConfig,
    tokens: TokenStore,
    cache: Cache<CacheKey, serde_json::Value>,
    refresh_guard: tokio::sync::Mutex<()>,
    refresh_generation: AtomicU64,
}

impl Gateway {
    /// Create a gateway over the given configuration and token store.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(config: ClientConfig, tokens: TokenStore) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(CACHE_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(GatewayInner {
                http,
                config,
                tokens,
                cache,
                refresh_guard: tokio::sync::Mutex::new(()),
                refresh_generation: AtomicU64::new(0),
            }),
        })
    }

    /// The token store this gateway corrects on 401.
    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    // ─────────────────────────────────────────────────────────────────────
    // Request methods
    // ─────────────────────────────────────────────────────────────────────

    /// GET with the identity-scoped response cache.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or an
    /// undecodable body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let key = CacheKey {
            path: path.to_owned(),
            scope: self
                .inner
                .tokens
                .identity_key()
                .unwrap_or_else(|| "guest".to_owned()),
        };

        if let Some(value) = self.inner.cache.get(&key).await {
            debug!(path, "gateway cache hit");
            return serde_json::from_value(value).map_err(ClientError::from);
        }

        let value: serde_json::Value = self.request_json(Method::GET, path, None::<&()>).await?;
        self.inner.cache.insert(key, value.clone()).await;
        serde_json::from_value(value).map_err(ClientError::from)
    }

    /// GET bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or an
    /// undecodable body.
    pub async fn get_uncached<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request_json(Method::GET, path, None::<&()>).await
    }

    /// POST expecting a JSON response body.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or an
    /// undecodable body.
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.request_json(Method::POST, path, Some(body)).await
    }

    /// POST with an `Idempotency-Key` header, for order creation.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or an
    /// undecodable body.
    pub async fn post_json_idempotent<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self
            .build_request(Method::POST, path)?
            .header("Idempotency-Key", Uuid::new_v4().to_string())
            .json(body);
        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// POST discarding the response body.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn post_empty<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        self.request_empty(Method::POST, path, Some(body)).await
    }

    /// PATCH discarding the response body.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn patch_empty<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        self.request_empty(Method::PATCH, path, Some(body)).await
    }

    /// DELETE discarding the response body.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.request_empty(Method::DELETE, path, None::<&()>).await
    }

    /// Drop every cached GET response.
    pub fn invalidate_cache(&self) {
        self.inner.cache.invalidate_all();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Token refresh (single-flight)
    // ─────────────────────────────────────────────────────────────────────

    /// Refresh the session tokens.
    ///
    /// Exactly one network call happens no matter how many callers arrive
    /// concurrently; late callers wait for the in-flight refresh and report
    /// its outcome. Without a refresh token the session is cleared and the
    /// call fails fast without entering the flight at all. A failed refresh
    /// clears the session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::RefreshUnavailable`] when no refresh token is
    /// held, or the underlying transport/API error of the refresh call.
    pub async fn refresh_tokens(&self) -> Result<()> {
        if !self.inner.tokens.has_refresh_token() {
            self.inner.tokens.clear();
            self.invalidate_cache();
            return Err(ClientError::RefreshUnavailable);
        }

        let observed = self.inner.refresh_generation.load(Ordering::Acquire);
        let _flight = self.inner.refresh_guard.lock().await;

        if self.inner.refresh_generation.load(Ordering::Acquire) != observed {
            // A flight completed while this caller waited for the guard;
            // its outcome is whatever the session now says.
            return if self.inner.tokens.is_authenticated() {
                Ok(())
            } else {
                Err(ClientError::RefreshUnavailable)
            };
        }

        let result = self.refresh_inner().await;
        self.inner.refresh_generation.fetch_add(1, Ordering::Release);
        result
    }

    async fn refresh_inner(&self) -> Result<()> {
        let Some(refresh_token) = self.inner.tokens.refresh_token() else {
            return Err(ClientError::RefreshUnavailable);
        };

        #[derive(Serialize)]
        struct RefreshRequest {
            refresh_token: String,
        }

        #[derive(serde::Deserialize)]
        struct RefreshResponse {
            access_token: String,
            #[serde(default)]
            refresh_token: Option<String>,
            #[serde(default)]
            expires_in: Option<i64>,
        }

        // Sent directly, not through request_json: a 401 here must not
        // recurse into another refresh.
        let url = self.url("customers/refresh")?;
        let response = self
            .inner
            .http
            .post(url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "token refresh failed, clearing session");
            self.inner.tokens.clear();
            self.invalidate_cache();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: extract_message(&body, status),
            });
        }

        let refreshed: RefreshResponse = response.json().await?;
        self.inner.tokens.set_tokens(
            &refreshed.access_token,
            refreshed.refresh_token.as_deref().unwrap_or(""),
            refreshed.expires_in,
        );
        debug!("token refresh succeeded");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url> {
        let base = self.inner.config.api_base.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}")).map_err(ClientError::from)
    }

    fn build_request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.url(path)?;
        let mut request = self.inner.http.request(method, url);

        // Login authenticates by credentials in the body; a stale bearer
        // token on it can only cause spurious 401s.
        if !path.trim_end_matches('/').ends_with("login")
            && let Some(token) = self.inner.tokens.access_token()
        {
            request = request.bearer_auth(token);
        }

        if let Some(locale) = &self.inner.config.locale {
            request = request.header("Accept-Language", locale);
        }

        Ok(request)
    }

    async fn request_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let mut request = self.build_request(method, path)?;
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        self.handle_response(response).await
    }

    async fn request_empty<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<()> {
        let mut request = self.build_request(method, path)?;
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.handle_unauthorized().await;
            return Err(ClientError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: extract_message(&body, status),
            });
        }
        Ok(())
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.handle_unauthorized().await;
            return Err(ClientError::Unauthorized);
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: extract_message(&text, status),
            });
        }

        serde_json::from_str(&text).map_err(ClientError::from)
    }

    /// Correct session state after a 401. The triggering call still fails;
    /// only the *next* call benefits.
    async fn handle_unauthorized(&self) {
        if self.inner.tokens.has_refresh_token() {
            if let Err(err) = self.refresh_tokens().await {
                debug!(error = %err, "refresh after 401 failed");
            }
        } else {
            debug!("401 with no refresh token, clearing session");
            self.inner.tokens.clear();
        }
        self.invalidate_cache();
    }
}

/// Pull a human-readable message out of an error body.
///
/// The backend reports errors as `{"error": "..."}` (and some legacy routes
/// as `{"message": "..."}`); anything else falls back to the status reason.
fn extract_message(body: &str, status: StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["error", "message", "detail"] {
            if let Some(message) = value.get(field).and_then(serde_json::Value::as_str) {
                return message.to_owned();
            }
        }
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_error_field_from_body() {
        let message = extract_message(
            r#"{"error": "Invalid email or password."}"#,
            StatusCode::BAD_REQUEST,
        );
        assert_eq!(message, "Invalid email or password.");
    }

    #[test]
    fn falls_back_to_canonical_reason() {
        let message = extract_message("<html>nope</html>", StatusCode::BAD_GATEWAY);
        assert_eq!(message, "Bad Gateway");
    }

    #[test]
    fn cache_key_separates_identities() {
        let guest = CacheKey {
            path: "carts".into(),
            scope: "guest".into(),
        };
        let user = CacheKey {
            path: "carts".into(),
            scope: "7".into(),
        };
        assert_ne!(guest, user);
    }
}
