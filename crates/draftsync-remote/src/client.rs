//! HTTP client for the remote system of record
//!
//! Provides a thin wrapper over `reqwest` that knows the base URL, attaches
//! the bearer token and turns transport and status failures into
//! [`RemoteFault`]s so the orchestrator can classify them without parsing
//! message text.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use draftsync_remote::client::RemoteClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = RemoteClient::new("https://play.example.org", Some("token".into()))?;
//! let response = client.get("api/system/ping", &[]).await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use tracing::debug;
use url::Url;

use draftsync_core::config::RemoteConfig;
use draftsync_core::ports::RemoteFault;

/// Longest response body excerpt carried in an HTTP fault
const MAX_FAULT_BODY: usize = 200;

// ============================================================================
// Fault mapping
// ============================================================================

/// Maps a transport-level reqwest error to a typed fault
pub fn fault_from_reqwest(err: &reqwest::Error) -> RemoteFault {
    let detail = err.to_string();
    if err.is_timeout() {
        return RemoteFault::Timeout(detail);
    }

    let io_kind = io_kind_of(err);
    match io_kind {
        Some(io::ErrorKind::TimedOut) => RemoteFault::Timeout(detail),
        Some(
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof,
        ) => RemoteFault::Connection(detail),
        _ if err.is_connect() => RemoteFault::Unreachable(detail),
        _ => RemoteFault::Connection(detail),
    }
}

fn io_kind_of(err: &reqwest::Error) -> Option<io::ErrorKind> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = cause.source();
    }
    None
}

/// Turns a non-success response into an HTTP fault carrying a body excerpt
pub async fn fault_from_response(response: Response) -> RemoteFault {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.trim().chars().take(MAX_FAULT_BODY).collect();
    let message = if excerpt.is_empty() {
        status.canonical_reason().unwrap_or("unknown status").to_string()
    } else {
        excerpt
    };
    RemoteFault::Http {
        status: status.as_u16(),
        message,
    }
}

// ============================================================================
// RemoteClient
// ============================================================================

/// Authenticated HTTP client bound to one remote base URL
#[derive(Clone)]
pub struct RemoteClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl RemoteClient {
    /// Creates a client with reqwest's default settings
    ///
    /// # Errors
    /// Fails if `base_url` is not an absolute URL.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        Self::with_client(Client::new(), base_url, token)
    }

    /// Creates a client from the remote configuration
    ///
    /// The bearer token is read from the environment variable named by
    /// `token_env`; a missing variable leaves the client unauthenticated.
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        if token.is_none() {
            debug!(var = %config.token_env, "No bearer token in environment");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Self::with_client(client, &config.base_url, token)
    }

    fn with_client(client: Client, base_url: &str, token: Option<String>) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid remote URL: {base_url}"))?;
        // Relative joins replace the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Returns the base URL requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns true if a bearer token is configured
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Creates a request for `path` relative to the base URL
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("Invalid request path: {path}"))?;
        let builder = self.client.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    /// Sends a request, mapping transport failures to [`RemoteFault`]
    ///
    /// The response is returned whatever its status; callers decide which
    /// statuses are faults.
    pub async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        builder
            .send()
            .await
            .map_err(|e| anyhow::Error::new(fault_from_reqwest(&e)))
            .with_context(|| format!("{what} failed"))
    }

    /// Sends a request and fails with an HTTP fault on non-success status
    pub async fn send_ok(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let response = self.send(builder, what).await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let fault = fault_from_response(response).await;
        Err(anyhow::Error::new(fault)).with_context(|| format!("{what} failed"))
    }

    /// GET with query parameters, requiring a success status
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        let builder = self.request(Method::GET, path)?.query(query);
        self.send_ok(builder, &format!("GET /{}", path.trim_start_matches('/')))
            .await
    }

    /// POST a JSON body; the response is returned whatever its status
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response> {
        let builder = self.request(Method::POST, path)?.json(body);
        self.send(builder, &format!("POST /{}", path.trim_start_matches('/')))
            .await
    }
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
