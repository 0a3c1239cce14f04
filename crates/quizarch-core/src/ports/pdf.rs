//! Image-aware PDF post-processor port.

use std::path::Path;

use async_trait::async_trait;

use crate::error::WorkerError;
use crate::job::descriptor::ImageOptimize;

/// Post-processes a rendered PDF in place: downscales embedded raster images
/// without alpha data to fit the given bounds, re-encodes them at the given
/// quality and compresses page content streams.
#[async_trait]
pub trait PdfOptimizer: Send + Sync {
    /// Optimize `file` in place.
    async fn optimize(&self, file: &Path, options: ImageOptimize) -> Result<(), WorkerError>;
}
