//! HTTP client with a single-flight token refresh coordinator.
//!
//! Any number of requests may hit a 401 at the same moment when the cached
//! access token expires. Exactly one of them performs the refresh call; the
//! rest subscribe to the outcome over a watch channel and retry with the
//! same new token. The refresh itself runs on a spawned task, so a caller
//! abandoning its request cannot strand the waiters.
//!
//! The coordinator never looks inside the refresh credential. The transport
//! is a trait; the production impl is a reqwest client whose cookie store
//! carries the refresh secret.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

/// Terminal outcome of a refresh attempt, shared verbatim with every waiter.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    /// The server rejected the refresh credential. Session is over.
    #[error("refresh rejected, re-login required")]
    Unauthorized,
    /// The refresh call itself failed (network, decode, task loss).
    #[error("refresh transport error: {0}")]
    Transport(String),
}

/// Errors surfaced by [`ApiClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unexpected status {0}")]
    UnexpectedStatus(StatusCode),
}

/// The channel through which a new access token is obtained.
#[async_trait]
pub trait RefreshTransport: Send + Sync {
    async fn refresh(&self) -> Result<String, RefreshError>;
}

type RefreshOutcome = Option<Result<String, RefreshError>>;

/// Mutable session state guarded by one async mutex.
struct SessionState {
    access_token: Option<String>,
    /// Occupied while a refresh is in flight; waiters clone the receiver.
    in_flight: Option<watch::Receiver<RefreshOutcome>>,
}

/// Single-flight coordinator for the cached access token.
#[derive(Clone)]
pub struct TokenCoordinator {
    state: Arc<Mutex<SessionState>>,
    transport: Arc<dyn RefreshTransport>,
}

impl TokenCoordinator {
    pub fn new(transport: Arc<dyn RefreshTransport>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                access_token: None,
                in_flight: None,
            })),
            transport,
        }
    }

    /// Current cached access token, if any.
    pub async fn access_token(&self) -> Option<String> {
        self.state.lock().await.access_token.clone()
    }

    /// Replace the cached token (login) or clear it (logout).
    pub async fn set_access_token(&self, token: Option<String>) {
        self.state.lock().await.access_token = token;
    }

    /// Obtain a fresh access token, coalescing concurrent callers.
    ///
    /// The first caller to find the in-flight slot empty becomes the leader
    /// and spawns the refresh; everyone else subscribes. All observers get
    /// the same token or the same error. A terminal failure clears the
    /// cached token, so the next request fails fast to a re-login.
    pub async fn refresh_access_token(&self) -> Result<String, RefreshError> {
        let mut rx = {
            let mut state = self.state.lock().await;

            if let Some(rx) = &state.in_flight {
                debug!("Refresh already in flight, subscribing");
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                state.in_flight = Some(rx.clone());

                let state_handle = self.state.clone();
                let transport = self.transport.clone();
                // Spawned so the refresh survives cancellation of the
                // request that initiated it.
                tokio::spawn(async move {
                    let outcome = transport.refresh().await;

                    let mut state = state_handle.lock().await;
                    match &outcome {
                        Ok(token) => state.access_token = Some(token.clone()),
                        Err(e) => {
                            warn!("Token refresh failed: {}", e);
                            state.access_token = None;
                        }
                    }
                    state.in_flight = None;
                    drop(state);

                    let _ = tx.send(Some(outcome));
                });

                rx
            }
        };

        loop {
            if let Some(outcome) = rx.borrow_and_update().as_ref() {
                return outcome.clone();
            }
            if rx.changed().await.is_err() {
                return Err(RefreshError::Transport("refresh task vanished".to_string()));
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessTokenBody {
    access_token: String,
}

/// Production refresh transport: POST the refresh endpoint with the cookie
/// jar attached and decode the new access token.
pub struct HttpRefreshTransport {
    http: reqwest::Client,
    refresh_url: String,
}

#[async_trait]
impl RefreshTransport for HttpRefreshTransport {
    async fn refresh(&self) -> Result<String, RefreshError> {
        let response = self
            .http
            .post(&self.refresh_url)
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let body: AccessTokenBody = response
                    .json()
                    .await
                    .map_err(|e| RefreshError::Transport(e.to_string()))?;
                Ok(body.access_token)
            }
            StatusCode::UNAUTHORIZED => Err(RefreshError::Unauthorized),
            other => Err(RefreshError::Transport(format!(
                "unexpected refresh status {}",
                other
            ))),
        }
    }
}

/// API client with cookie-backed refresh and automatic 401 retry.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    coordinator: TokenCoordinator,
}

impl ApiClient {
    /// Build a client against the given base URL (e.g. `http://localhost:8080`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let base_url = base_url.into();
        // One shared cookie jar: the refresh secret set at login is replayed
        // automatically on refresh and logout.
        let http = reqwest::Client::builder().cookie_store(true).build()?;

        let transport = Arc::new(HttpRefreshTransport {
            http: http.clone(),
            refresh_url: format!("{}/api/v1/auth/refresh", base_url),
        });

        Ok(Self {
            http,
            base_url,
            coordinator: TokenCoordinator::new(transport),
        })
    }

    /// Log in and cache the resulting access token. The refresh cookie lands
    /// in the jar as a side effect.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(format!("{}/api/v1/auth/login", self.base_url))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: AccessTokenBody = response.json().await?;
                self.coordinator
                    .set_access_token(Some(body.access_token))
                    .await;
                Ok(())
            }
            StatusCode::UNAUTHORIZED => Err(ClientError::InvalidCredentials),
            other => Err(ClientError::UnexpectedStatus(other)),
        }
    }

    /// Log out, revoking the refresh token server-side and dropping local state.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let response = self
            .http
            .post(format!("{}/api/v1/auth/logout", self.base_url))
            .send()
            .await?;

        self.coordinator.set_access_token(None).await;

        if response.status() == StatusCode::NO_CONTENT {
            Ok(())
        } else {
            Err(ClientError::UnexpectedStatus(response.status()))
        }
    }

    /// Start building a request against an API path (e.g. `/api/v1/todos`).
    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
    }

    /// Send a request with the cached bearer token, refreshing and retrying
    /// once on the first 401. A second 401 is returned as-is.
    pub async fn execute(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        let retry = builder.try_clone();

        let mut authed = builder;
        if let Some(token) = self.coordinator.access_token().await {
            authed = authed.bearer_auth(token);
        }

        let response = authed.send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // Streaming bodies cannot be cloned; surface the 401 unchanged.
        let Some(retry) = retry else {
            return Ok(response);
        };

        let token = self.coordinator.refresh_access_token().await?;
        let response = retry.bearer_auth(token).send().await?;
        Ok(response)
    }
}
