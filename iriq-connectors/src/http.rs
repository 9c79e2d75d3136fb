//! HTTPS Transport over `ureq`
//!
//! ## Overview
//!
//! [`UreqTransport`] implements the engine's blocking
//! [`Transport`](iriq_core::Transport) with a single `ureq` agent. The agent
//! keeps connections alive between calls, which matters on a device that
//! talks to the same host every few seconds and pays for each TLS handshake.
//!
//! ## Status Handling
//!
//! `ureq` reports 4xx/5xx as `Error::Status`. The engine wants every status
//! as data, so those are turned back into `Ok(Response)`. Only
//! `Error::Transport` (DNS, connect, TLS, timeout) becomes a
//! [`TransportError`].
//!
//! ## Timeouts
//!
//! One overall timeout covers connect, send and receive. It is the only thing
//! bounding how long a control-loop tick can block on the network.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use iriq_connectors::http::{HttpConfig, UreqTransport};
//! use iriq_core::traits::{Method, Request};
//! use iriq_core::Transport;
//!
//! let transport = UreqTransport::new(
//!     HttpConfig::new("https://example.invalid")
//!         .timeout_secs(10)
//!         .header("X-Client-Info", "iriq"),
//! )?;
//! let response = transport.execute(&Request::new(Method::Get, "/rest/v1/device_status"));
//! # Ok::<(), iriq_connectors::ConnectorError>(())
//! ```

use std::time::Duration;

use iriq_core::constants::network::DEFAULT_HTTP_TIMEOUT_SECS;
use iriq_core::traits::{Request, Response, Transport};
use iriq_core::TransportError;

use crate::ConnectorError;

/// HTTP configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Scheme and host, without a trailing slash
    pub base_url: String,
    /// Overall request timeout
    pub timeout: Duration,
    /// Headers added to every request, ahead of the request's own
    pub headers: Vec<(String, String)>,
    /// User agent string
    pub user_agent: String,
}

impl HttpConfig {
    /// Create new configuration with base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            headers: Vec::new(),
            user_agent: format!("IriQ/{}", iriq_core::VERSION),
        }
    }

    /// Set request timeout in seconds
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add custom header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Blocking transport over a shared `ureq` agent
pub struct UreqTransport {
    config: HttpConfig,
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Create new transport
    pub fn new(config: HttpConfig) -> Result<Self, ConnectorError> {
        // Validate base URL
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(ConnectorError::Config(
                "Base URL must start with http:// or https://".into(),
            ));
        }
        if config.timeout.is_zero() {
            return Err(ConnectorError::Config("Timeout must be non-zero".into()));
        }
        if config.base_url.starts_with("http://") {
            log::warn!("backend reached over plain HTTP; credentials travel unencrypted");
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build();

        Ok(Self { config, agent })
    }

    /// Configuration in use
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        if !request.path.starts_with('/') {
            return Err(TransportError::InvalidRequest(format!(
                "path must start with '/': {}",
                request.path
            )));
        }

        let mut call = self.agent.request(request.method.as_str(), &self.url(&request.path));
        for (name, value) in self.config.headers.iter().chain(request.headers.iter()) {
            call = call.set(name, value);
        }

        let result = match &request.body {
            Some(body) => call.send_string(body),
            None => call.call(),
        };

        let response = match result {
            Ok(resp) => resp,
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(ureq::Error::Transport(e)) => {
                log::debug!("{} {} failed: {}", request.method.as_str(), request.path, e);
                return Err(TransportError::Io(e.to_string()));
            }
        };

        let status = response.status();
        let body = response
            .into_string()
            .map_err(|e| TransportError::Io(format!("reading response body: {}", e)))?;
        log::trace!("{} {} -> {}", request.method.as_str(), request.path, status);

        Ok(Response { status, body })
    }
}
