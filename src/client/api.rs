use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::credentials::{CredentialStore, Credentials};
use super::error::{ClientError, ErrorBody};
use super::refresh::{wait_for, RefreshFailed, RefreshGate, Turn};
use crate::models::{AccessTokenResponse, TokenPair, UserProfile};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server root; API paths are joined under `{base_url}/api/`.
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reads `EVENTO_API_URL`, falling back to the local development server.
    pub fn from_env() -> Self {
        Self::new(std::env::var("EVENTO_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()))
    }
}

/// One outbound call. Rebuilt for every attempt so the current access
/// token is read at send time.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<Value>,
    query: Vec<(String, String)>,
    anonymous: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            query: Vec::new(),
            anonymous: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sent without a bearer token and never intercepted.
    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn error(&self) -> ClientError {
        ClientError::from_response(self.status, &self.body)
    }

    fn detail(&self) -> String {
        ErrorBody::parse(&self.body).detail_or(self.status)
    }
}

/// Notifications for the application shell.
pub trait SessionEvents: Send + Sync {
    /// The refresh token was rejected and stored credentials were cleared.
    fn session_expired(&self) {}

    /// The account must verify its email before continuing.
    fn email_not_verified(&self, _detail: &str) {}
}

enum Verdict {
    Pass,
    Unauthorized,
    EmailNotVerified(String),
}

fn classify(response: &ApiResponse) -> Verdict {
    match response.status {
        StatusCode::UNAUTHORIZED => Verdict::Unauthorized,
        StatusCode::FORBIDDEN => {
            let body = ErrorBody::parse(&response.body);
            if body.is_email_not_verified() {
                Verdict::EmailNotVerified(body.detail_or(response.status))
            } else {
                Verdict::Pass
            }
        }
        _ => Verdict::Pass,
    }
}

/// API client with transparent access token refresh.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
    gate: Arc<RefreshGate>,
    events: Option<Arc<dyn SessionEvents>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("refresh_phase", &self.gate.phase())
            .finish()
    }
}

impl ApiClient {
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(config.timeout).build()?;

        info!(
            "[ApiClient] Creating new API client with base URL: {}",
            config.base_url
        );

        Ok(Self {
            http,
            base_url: config.base_url,
            store,
            gate: Arc::new(RefreshGate::new()),
            events: None,
        })
    }

    pub fn with_events(mut self, events: Arc<dyn SessionEvents>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn credentials(&self) -> Result<Option<Credentials>, ClientError> {
        self.store.load().await
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(self.store.load().await, Ok(Some(_)))
    }

    /// Exchanges username and password for a token pair and stores it.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let request = ApiRequest::post("token/")
            .anonymous()
            .json(&serde_json::json!({ "username": username, "password": password }))?;
        let pair: TokenPair = self.send_json(request).await?;

        self.store
            .save(&Credentials {
                access: pair.access,
                refresh: pair.refresh,
            })
            .await?;
        info!("[ApiClient] Logged in as {}", username);
        Ok(())
    }

    /// Drops the stored credentials. Tokens are not revoked server side.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.store.clear().await
    }

    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        self.send_json(ApiRequest::get("users/me/")).await
    }

    /// Sends the request and decodes a success body, mapping any other status to an error.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, ClientError> {
        let response = self.execute(request).await?;
        if !response.is_success() {
            return Err(response.error());
        }
        response.json()
    }

    /// Sends the request through the refresh interceptor.
    ///
    /// A 401 triggers at most one refresh-and-retry. Statuses the interceptor
    /// does not handle are returned as the response for the caller to interpret.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        if request.anonymous {
            return self.dispatch(&request, None).await;
        }

        let credentials = self.store.load().await?;
        let response = self
            .dispatch(&request, credentials.as_ref().map(|c| c.access.as_str()))
            .await?;

        match classify(&response) {
            Verdict::Pass => return Ok(response),
            Verdict::EmailNotVerified(detail) => return Err(self.email_not_verified(detail)),
            Verdict::Unauthorized => {}
        }

        let Some(credentials) = credentials else {
            return Err(ClientError::Unauthorized {
                detail: response.detail(),
            });
        };

        let access = self.fresh_access(&credentials.access).await?;
        debug!("[ApiClient] Retrying {} with refreshed token", request.path);

        let retried = self.dispatch(&request, Some(&access)).await?;
        match classify(&retried) {
            Verdict::Pass => Ok(retried),
            Verdict::EmailNotVerified(detail) => Err(self.email_not_verified(detail)),
            Verdict::Unauthorized => Err(ClientError::Unauthorized {
                detail: retried.detail(),
            }),
        }
    }

    /// Returns an access token newer than `rejected`, refreshing at most once per burst.
    async fn fresh_access(&self, rejected: &str) -> Result<String, ClientError> {
        let lease = match self.gate.enter() {
            Turn::Follower(receiver) => {
                debug!("[ApiClient] Refresh already in flight, waiting");
                return wait_for(receiver)
                    .await
                    .map_err(|_| ClientError::SessionExpired);
            }
            Turn::Leader(lease) => lease,
        };

        let current = match self.store.load().await? {
            Some(current) => current,
            None => {
                lease.complete(Err(RefreshFailed));
                return Err(ClientError::SessionExpired);
            }
        };

        // The rejected token was already replaced by a refresh that finished meanwhile
        if current.access != rejected {
            debug!("[ApiClient] Token already refreshed, reusing it");
            lease.complete(Ok(current.access.clone()));
            return Ok(current.access);
        }

        info!("[ApiClient] Token expired, attempting refresh");
        match self.request_refresh(&current.refresh).await {
            Ok(access) => {
                let updated = Credentials {
                    access: access.clone(),
                    refresh: current.refresh,
                };
                if let Err(e) = self.store.save(&updated).await {
                    warn!("[ApiClient] Failed to persist refreshed token: {}", e);
                }
                info!("[ApiClient] Token refreshed successfully");
                lease.complete(Ok(access.clone()));
                Ok(access)
            }
            Err(e) => {
                warn!("[ApiClient] Token refresh failed: {}", e);
                if let Err(e) = self.store.clear().await {
                    warn!("[ApiClient] Failed to clear credentials: {}", e);
                }
                lease.complete(Err(RefreshFailed));
                if let Some(events) = &self.events {
                    events.session_expired();
                }
                Err(ClientError::SessionExpired)
            }
        }
    }

    async fn request_refresh(&self, refresh: &str) -> Result<String, ClientError> {
        let request = ApiRequest::post("token/refresh/")
            .anonymous()
            .json(&serde_json::json!({ "refresh": refresh }))?;
        let response = self.dispatch(&request, None).await?;
        if !response.is_success() {
            return Err(response.error());
        }
        let body: AccessTokenResponse = response.json()?;
        Ok(body.access)
    }

    fn email_not_verified(&self, detail: String) -> ClientError {
        debug!("[ApiClient] Email not verified, not retrying");
        if let Some(events) = &self.events {
            events.email_not_verified(&detail);
        }
        ClientError::EmailNotVerified { detail }
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        access: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.build_url(&request.path));

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = access {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse { status, body })
    }
}
