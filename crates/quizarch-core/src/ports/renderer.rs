//! Report renderer port (headless browser driver).
//!
//! One render session corresponds to one browser plus browser context, created
//! once per job and reused for every attempt of that job. Attempts render
//! strictly sequentially; a new report may only be rendered after the previous
//! page was closed, which the adapter guarantees internally.

use async_trait::async_trait;

use crate::error::WorkerError;
use crate::types::paper_format::PaperFormat;

/// Factory for per-job render sessions.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Open a browser session for a job.
    ///
    /// `base_url` is the host base URL; the adapter serves the report HTML
    /// from `{base_url}/mock/attempt` so that host-origin relative resources
    /// resolve normally and CORS stays out of the way.
    async fn open_session(&self, base_url: &str) -> Result<Box<dyn RenderSession>, WorkerError>;
}

/// A live browser session bound to one job.
#[async_trait]
pub trait RenderSession: Send + Sync {
    /// Render one attempt report to PDF and return the PDF bytes.
    async fn render_report(
        &self,
        html: &str,
        paper_format: PaperFormat,
    ) -> Result<Vec<u8>, WorkerError>;

    /// Close the session and release the browser.
    async fn close(self: Box<Self>) -> Result<(), WorkerError>;
}
