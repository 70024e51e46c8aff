use crate::model::{parse_hex_color, QrStyle};
use image::Rgb;
use qrcode::{EcLevel, QrCode};
use std::path::{Path, PathBuf};
use thiserror::Error;

const WHITE: [u8; 3] = [0xFF, 0xFF, 0xFF];
const BLACK: [u8; 3] = [0x00, 0x00, 0x00];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Encoding QR code failed: {0}")]
    Encode(#[from] qrcode::types::QrError),
    #[error("Writing QR image failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("Creating QR image directory failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Rendering task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub struct QrImageStore {
    directory: PathBuf,
    base_url: String,
}

impl QrImageStore {
    pub fn new(directory: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            directory: directory.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn redirect_url(&self, code: &str) -> String {
        format!("{}/r/{}", self.base_url, code)
    }

    pub fn image_path(&self, code: &str) -> PathBuf {
        self.directory.join(format!("{code}.png"))
    }

    pub async fn render(&self, code: &str, style: &QrStyle) -> Result<PathBuf, RenderError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let url = self.redirect_url(code);
        let path = self.image_path(code);
        let style = style.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_png(&url, &style, &target)).await??;
        Ok(path)
    }

    pub async fn remove(&self, code: &str) {
        let path = self.image_path(code);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!("Removed QR image {}", path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!("Removing QR image {} failed: {}", path.display(), err),
        }
    }
}

fn write_png(url: &str, style: &QrStyle, path: &Path) -> Result<(), RenderError> {
    let code = QrCode::with_error_correction_level(url.as_bytes(), EcLevel::M)?;
    let dark = parse_hex_color(&style.foreground_color).unwrap_or(BLACK);
    let light = parse_hex_color(&style.background_color).unwrap_or(WHITE);
    code.render::<Rgb<u8>>()
        .dark_color(Rgb(dark))
        .light_color(Rgb(light))
        .min_dimensions(style.size, style.size)
        .build()
        .save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn style() -> QrStyle {
        QrStyle {
            background_color: "#FFFFFF".into(),
            foreground_color: "#1A2B3C".into(),
            size: 256,
        }
    }

    #[test]
    fn redirect_url_uses_base_without_trailing_slash() {
        let store = QrImageStore::new("/tmp/images", "https://qr.example.com/");
        assert_eq!(store.redirect_url("deadbeef"), "https://qr.example.com/r/deadbeef");
        assert_eq!(store.image_path("deadbeef"), PathBuf::from("/tmp/images/deadbeef.png"));
    }

    #[tokio::test]
    async fn renders_png_of_at_least_requested_size() {
        let directory = TempDir::new().unwrap();
        let store = QrImageStore::new(directory.path().join("qr_images"), "http://localhost:8080");

        let path = store.render("0a1b2c3d", &style()).await.unwrap();

        let image = image::open(&path).unwrap();
        assert!(image.width() >= 256);
        assert_eq!(image.width(), image.height());
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn remove_deletes_file_and_ignores_missing() {
        let directory = TempDir::new().unwrap();
        let store = QrImageStore::new(directory.path(), "http://localhost:8080");
        let path = store.render("feedface", &style()).await.unwrap();

        store.remove("feedface").await;
        assert!(!path.exists());
        store.remove("feedface").await;
    }
}
