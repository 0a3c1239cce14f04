//! PDF post-processing: image downscaling and stream compression.
//!
//! Embedded raster images without alpha data are decoded, downscaled with a
//! Lanczos filter to fit the configured bounds and re-encoded as JPEG at the
//! configured quality. Images carrying an `SMask` (alpha) are left untouched,
//! as are encodings the decoder cannot handle. Afterwards all content streams
//! are compressed and the file is replaced in place.

use std::path::Path;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use lopdf::{Document, Object, ObjectId, Stream};

use quizarch_core::ports::PdfOptimizer;
use quizarch_core::{ImageOptimize, WorkerError, WorkerResult};

/// lopdf/image based implementation of the [`PdfOptimizer`] port.
pub struct LopdfOptimizer;

impl LopdfOptimizer {
    /// Create the optimizer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for LopdfOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PdfOptimizer for LopdfOptimizer {
    async fn optimize(&self, file: &Path, options: ImageOptimize) -> WorkerResult<()> {
        let path = file.to_path_buf();
        tokio::task::spawn_blocking(move || optimize_sync(&path, options))
            .await
            .map_err(|e| WorkerError::render(format!("PDF optimization task failed: {e}")))?
    }
}

fn optimize_sync(path: &Path, options: ImageOptimize) -> WorkerResult<()> {
    let old_size = std::fs::metadata(path)?.len();
    tracing::debug!(file = %path.display(), bytes = old_size, "Compressing PDF file");

    let mut doc = Document::load(path)
        .map_err(|e| WorkerError::render(format!("Failed to load PDF: {e}")))?;

    let image_ids: Vec<ObjectId> = doc
        .objects
        .iter()
        .filter_map(|(id, object)| match object {
            Object::Stream(stream) if is_opaque_jpeg_image(stream) => Some(*id),
            _ => None,
        })
        .collect();

    for id in image_ids {
        if let Ok(Object::Stream(stream)) = doc.get_object_mut(id) {
            if let Err(e) = recompress_image(stream, options) {
                tracing::debug!(object = ?id, "Skipping image: {e}");
            }
        }
    }

    doc.compress();
    doc.save(path)
        .map_err(|e| WorkerError::render(format!("Failed to save PDF: {e}")))?;

    let new_size = std::fs::metadata(path)?.len();
    tracing::debug!(
        file = %path.display(),
        bytes = new_size,
        percent_of_original = (new_size as f64 / old_size.max(1) as f64) * 100.0,
        "Saved compressed PDF"
    );
    Ok(())
}

/// An image XObject that is a baseline JPEG without alpha data.
///
/// Images with an `SMask` contain transparency and must not be re-encoded;
/// non-JPEG encodings pass through untouched.
fn is_opaque_jpeg_image(stream: &Stream) -> bool {
    let is_image = matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Image");
    let has_alpha = stream.dict.has(b"SMask");
    let is_jpeg =
        matches!(stream.dict.get(b"Filter"), Ok(Object::Name(name)) if name == b"DCTDecode");
    is_image && !has_alpha && is_jpeg
}

fn recompress_image(stream: &mut Stream, options: ImageOptimize) -> Result<(), String> {
    let decoded = image::load_from_memory(&stream.content).map_err(|e| e.to_string())?;

    let resized = if decoded.width() > options.width || decoded.height() > options.height {
        tracing::debug!(
            from_width = decoded.width(),
            from_height = decoded.height(),
            max_width = options.width,
            max_height = options.height,
            "Resizing embedded image"
        );
        decoded.resize(options.width, options.height, FilterType::Lanczos3)
    } else {
        decoded
    };

    let rgb = resized.to_rgb8();
    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, options.quality);
    encoder
        .encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| e.to_string())?;

    stream.dict.set("Width", i64::from(rgb.width()));
    stream.dict.set("Height", i64::from(rgb.height()));
    stream.dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    stream.dict.set("BitsPerComponent", 8);
    stream.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    stream.dict.remove(b"DecodeParms");
    stream.set_content(encoded);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Dictionary;

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 100, 50]));
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, 90);
        encoder
            .encode(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    fn image_stream(width: u32, height: u32, smask: bool) -> Stream {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        dict.set("Width", i64::from(width));
        dict.set("Height", i64::from(height));
        dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
        if smask {
            dict.set("SMask", Object::Reference((99, 0)));
        }
        Stream::new(dict, jpeg_bytes(width, height))
    }

    #[test]
    fn alpha_images_are_skipped() {
        assert!(is_opaque_jpeg_image(&image_stream(10, 10, false)));
        assert!(!is_opaque_jpeg_image(&image_stream(10, 10, true)));
    }

    #[test]
    fn oversized_images_are_downscaled_to_fit() {
        let mut stream = image_stream(64, 32, false);
        recompress_image(
            &mut stream,
            ImageOptimize {
                width: 16,
                height: 16,
                quality: 80,
            },
        )
        .unwrap();

        // Aspect ratio preserved, bounded by the limits
        assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 16);
        assert_eq!(stream.dict.get(b"Height").unwrap().as_i64().unwrap(), 8);

        let reloaded = image::load_from_memory(&stream.content).unwrap();
        assert_eq!(reloaded.width(), 16);
    }

    #[test]
    fn small_images_keep_their_dimensions() {
        let mut stream = image_stream(8, 8, false);
        recompress_image(
            &mut stream,
            ImageOptimize {
                width: 100,
                height: 100,
                quality: 80,
            },
        )
        .unwrap();
        assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 8);
        assert_eq!(stream.dict.get(b"Height").unwrap().as_i64().unwrap(), 8);
    }
}
