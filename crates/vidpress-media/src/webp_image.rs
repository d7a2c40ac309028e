//! WebP thumbnail encoding.

use std::path::Path;

use image::imageops::FilterType;
use tokio::fs;
use tracing::info;

use vidpress_models::DEFAULT_THUMBNAIL_QUALITY;

use crate::error::{MediaError, MediaResult};

/// Thumbnail encode options.
#[derive(Debug, Clone, Copy)]
pub struct WebpOptions {
    /// Lossy quality [0..100]
    pub quality: u8,
    /// Bounding box for the inside-fit resize
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for WebpOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_THUMBNAIL_QUALITY,
            max_width: 1280,
            max_height: 720,
        }
    }
}

impl WebpOptions {
    /// Alpha plane quality: `max(quality - 10, 10)`.
    pub fn alpha_quality(&self) -> u8 {
        self.quality.saturating_sub(10).max(10)
    }
}

/// Outcome of a thumbnail encode.
#[derive(Debug, Clone, Copy)]
pub struct WebpOutcome {
    pub orig_bytes: u64,
    pub out_bytes: u64,
    pub width: u32,
    pub height: u32,
}

/// Inside-fit dimensions without enlargement.
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width <= max_w && height <= max_h {
        return (width, height);
    }
    let scale = f64::min(
        f64::from(max_w) / f64::from(width),
        f64::from(max_h) / f64::from(height),
    );
    let w = ((f64::from(width) * scale).round() as u32).max(1);
    let h = ((f64::from(height) * scale).round() as u32).max(1);
    (w, h)
}

/// Resize an image inside the bounding box (never enlarging) and encode it
/// as lossy WebP with high effort and sharp chroma subsampling.
pub async fn resize_to_webp(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: WebpOptions,
) -> MediaResult<WebpOutcome> {
    let input = input.as_ref().to_path_buf();
    let output = output.as_ref().to_path_buf();

    if !input.exists() {
        return Err(MediaError::FileNotFound(input));
    }
    let orig_bytes = fs::metadata(&input).await?.len();

    // Decode + encode are CPU-bound; keep them off the async executor.
    let encoded = tokio::task::spawn_blocking(move || encode(&input, options))
        .await
        .map_err(|e| MediaError::ImageFailed(format!("encode task failed: {e}")))??;

    fs::write(&output, &encoded.bytes).await?;

    let outcome = WebpOutcome {
        orig_bytes,
        out_bytes: encoded.bytes.len() as u64,
        width: encoded.width,
        height: encoded.height,
    };

    info!(
        width = outcome.width,
        height = outcome.height,
        orig_bytes = outcome.orig_bytes,
        out_bytes = outcome.out_bytes,
        "Encoded thumbnail"
    );

    Ok(outcome)
}

struct Encoded {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

fn encode(input: &Path, options: WebpOptions) -> MediaResult<Encoded> {
    let img = image::ImageReader::open(input)
        .map_err(|e| MediaError::ImageFailed(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| MediaError::ImageFailed(e.to_string()))?
        .decode()
        .map_err(|e| MediaError::ImageFailed(e.to_string()))?;

    let (w, h) = fit_within(img.width(), img.height(), options.max_width, options.max_height);
    let img = if (w, h) == (img.width(), img.height()) {
        img
    } else {
        img.resize_exact(w, h, FilterType::Lanczos3)
    };

    let rgba = img.into_rgba8();
    let (width, height) = rgba.dimensions();

    let mut config = webp::WebPConfig::new()
        .map_err(|_| MediaError::ImageFailed("webp config init failed".to_string()))?;
    config.quality = f32::from(options.quality);
    config.alpha_quality = i32::from(options.alpha_quality());
    config.method = 6;
    config.use_sharp_yuv = 1;

    let encoder = webp::Encoder::from_rgba(&rgba, width, height);
    let memory = encoder
        .encode_advanced(&config)
        .map_err(|e| MediaError::ImageFailed(format!("webp encode failed: {e:?}")))?;

    Ok(Encoded {
        bytes: memory.to_vec(),
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fit_never_enlarges() {
        assert_eq!(fit_within(640, 360, 1280, 720), (640, 360));
    }

    #[test]
    fn fit_preserves_aspect() {
        assert_eq!(fit_within(2560, 1440, 1280, 720), (1280, 720));
        assert_eq!(fit_within(4000, 1000, 1280, 720), (1280, 320));
        assert_eq!(fit_within(1000, 4000, 1280, 720), (180, 720));
    }

    #[test]
    fn alpha_quality_floors_at_ten() {
        assert_eq!(WebpOptions { quality: 60, max_width: 1, max_height: 1 }.alpha_quality(), 50);
        assert_eq!(WebpOptions { quality: 15, max_width: 1, max_height: 1 }.alpha_quality(), 10);
        assert_eq!(WebpOptions { quality: 5, max_width: 1, max_height: 1 }.alpha_quality(), 10);
    }

    #[tokio::test]
    async fn encodes_a_png_to_webp() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.webp");

        let img = image::RgbaImage::from_pixel(64, 32, image::Rgba([200, 40, 40, 255]));
        img.save(&input).unwrap();

        let outcome = resize_to_webp(&input, &output, WebpOptions::default())
            .await
            .unwrap();

        assert_eq!((outcome.width, outcome.height), (64, 32));
        assert!(output.exists());
        assert!(outcome.out_bytes > 0);
        // RIFF container magic
        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[tokio::test]
    async fn shrinks_oversized_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("big.png");
        let output = dir.path().join("out.webp");

        let img = image::RgbaImage::from_pixel(2000, 1000, image::Rgba([10, 10, 10, 255]));
        img.save(&input).unwrap();

        let options = WebpOptions {
            quality: 60,
            max_width: 500,
            max_height: 500,
        };
        let outcome = resize_to_webp(&input, &output, options).await.unwrap();
        assert_eq!((outcome.width, outcome.height), (500, 250));
    }

    #[tokio::test]
    async fn missing_input_is_file_not_found() {
        let dir = TempDir::new().unwrap();
        let err = resize_to_webp(
            dir.path().join("absent.png"),
            dir.path().join("out.webp"),
            WebpOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
