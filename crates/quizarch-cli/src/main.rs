//! Quiz archive worker service entry point.
//!
//! Configuration is environment-only (`QUIZ_ARCHIVER_*` variables); there are
//! no command line flags. The log filter comes from
//! `QUIZ_ARCHIVER_LOG_LEVEL`, falling back to `RUST_LOG` and then `info`.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use quizarch_axum::{APP_NAME, VERSION};
use quizarch_core::Settings;

fn log_filter() -> EnvFilter {
    if let Ok(level) = std::env::var("QUIZ_ARCHIVER_LOG_LEVEL") {
        EnvFilter::new(level.to_lowercase())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .init();

    let settings = Settings::from_env()?;
    tracing::info!("Running {APP_NAME} version {VERSION}");
    tracing::debug!(?settings, "Effective settings");

    if settings.demo_mode {
        tracing::warn!(
            "---> ATTENTION: Running in demo mode! This will add a watermark to all generated PDFs, only a limited number of attempts will be exported per archive job, and only placeholder Moodle backups are included. <---"
        );
        tracing::info!(
            "---> To disable demo mode, set the environment variable QUIZ_ARCHIVER_DEMO_MODE to \"False\". <---"
        );
    }

    if settings.skip_https_cert_validation {
        tracing::warn!(
            "TLS / SSL certificate validation is TURNED OFF! This server will accept any given certificate for HTTPS connections without trying to validate it."
        );
        tracing::info!(
            "To enable certificate validation set QUIZ_ARCHIVER_SKIP_HTTPS_CERT_VALIDATION to \"False\" or unset the variable."
        );
    }

    if settings.proxy.is_none() {
        tracing::debug!("No proxy server detected");
    }

    quizarch_axum::serve(settings).await
}
