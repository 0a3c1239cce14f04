//! HTTP client construction.
//!
//! One `reqwest::Client` is built per adapter instance, with the global proxy
//! and TLS-validation policy applied. Connect timeout is fixed; read timeouts
//! are set per request (normal vs. long-running calls).

use std::time::Duration;

use quizarch_core::{Settings, WorkerError};

/// Connect timeout for all host requests.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Total timeout for normal web-service calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Total timeout for long-running calls (uploads, file downloads).
pub const REQUEST_TIMEOUT_EXTENDED: Duration = Duration::from_secs(1800);

/// Build an HTTP client honouring the worker's proxy and TLS policy.
pub fn build_http_client(settings: &Settings) -> Result<reqwest::Client, WorkerError> {
    let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);

    if settings.skip_https_cert_validation {
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let Some(proxy) = &settings.proxy {
        let mut p = reqwest::Proxy::all(&proxy.server_url)
            .map_err(|e| WorkerError::connectivity(format!("Invalid proxy server URL: {e}")))?;
        if let (Some(username), Some(password)) = (&proxy.username, &proxy.password) {
            p = p.basic_auth(username, password);
        }
        if let Some(bypass) = &proxy.bypass_domains {
            p = p.no_proxy(reqwest::NoProxy::from_string(bypass));
        }
        builder = builder.proxy(p);
    }

    builder
        .build()
        .map_err(|e| WorkerError::connectivity(format!("Failed to build HTTP client: {e}")))
}
