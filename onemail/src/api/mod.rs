//! Authenticated API client
//!
//! Every dashboard call goes through `ApiClient::dispatch`, which attaches
//! the stored bearer token and recovers from one expired access token:
//! on a `401` the request is marked retried, the session is refreshed with
//! the stored refresh token and the request is re-sent exactly once.
//! If the refresh fails the local session is wiped and a
//! `SessionEvent::LoginRequired` is emitted.
//!
//! Concurrent requests that hit a `401` each refresh on their own.

mod transport;

pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::credentials::TokenStorage;
use crate::services::events::EventEmitter;
use crate::types::auth::{RefreshRequest, RefreshResponse, Tokens};
use crate::types::error::{OneMailError, Result};

const REFRESH_PATH: &str = "/user/refresh";

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    tokens: TokenStorage,
    events: EventEmitter,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, tokens: TokenStorage, events: EventEmitter) -> Self {
        Self {
            transport,
            tokens,
            events,
        }
    }

    /// Client over reqwest for the given base URL
    pub fn http(base_url: &str, tokens: TokenStorage, events: EventEmitter) -> Self {
        Self::new(Arc::new(HttpTransport::new(base_url)), tokens, events)
    }

    pub fn tokens(&self) -> &TokenStorage {
        &self.tokens
    }

    /// Set the bearer header from the stored access token, if any
    pub fn attach_token(&self, request: &mut ApiRequest) {
        if let Some(token) = self.tokens.access_token() {
            request.set_bearer(&token);
        }
    }

    /// Send a request, refreshing and retrying once on `401`
    pub async fn dispatch(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        self.attach_token(&mut request);

        let response = self.transport.send(&request).await?;
        if response.is_success() {
            return Ok(response);
        }

        if response.status == 401 && !request.is_retried() {
            request.mark_retried();
            debug!(
                "{} {} returned 401, refreshing session",
                request.method.as_str(),
                request.path
            );

            if let Err(e) = self.refresh_session().await {
                warn!("Session refresh failed, signing out: {}", e);
                if let Err(clear_err) = self.tokens.clear_session() {
                    warn!("Failed to clear session after refresh failure: {}", clear_err);
                }
                self.events.login_required();
                return Err(e);
            }

            if let Some(token) = self.tokens.access_token() {
                request.set_bearer(&token);
                let retried = self.transport.send(&request).await?;
                return if retried.is_success() {
                    Ok(retried)
                } else {
                    Err(retried.into_error())
                };
            }
        }

        Err(response.into_error())
    }

    /// Dispatch and decode a JSON body
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.dispatch(request).await?.json()
    }

    /// Exchange the stored refresh token for a new token pair
    ///
    /// Fails fast without a network call when no refresh token is stored.
    /// Any failure clears the stored tokens and user.
    pub async fn refresh_session(&self) -> Result<Tokens> {
        match self.try_refresh().await {
            Ok(tokens) => Ok(tokens),
            Err(e) => {
                if let Err(clear_err) = self.tokens.clear_session() {
                    warn!("Failed to clear session: {}", clear_err);
                }
                Err(e)
            }
        }
    }

    async fn try_refresh(&self) -> Result<Tokens> {
        let refresh_token = self
            .tokens
            .refresh_token()
            .ok_or_else(|| OneMailError::RefreshFailed("No refresh token available".to_string()))?;

        // Sent straight to the transport: a 401 here is a refresh failure,
        // not another round of refresh.
        let request = ApiRequest::post(REFRESH_PATH).json(&RefreshRequest { refresh_token })?;
        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| OneMailError::RefreshFailed(e.to_string()))?;

        if !response.is_success() {
            return Err(OneMailError::RefreshFailed(response.into_error().to_string()));
        }

        let body: RefreshResponse = response
            .json()
            .map_err(|e| OneMailError::RefreshFailed(e.to_string()))?;
        if !body.success {
            return Err(OneMailError::RefreshFailed(if body.message.is_empty() {
                "Refresh rejected".to_string()
            } else {
                body.message
            }));
        }

        self.tokens.set_tokens(&body.data.tokens)?;
        info!("Session tokens refreshed");
        Ok(body.data.tokens)
    }
}
