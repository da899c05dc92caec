//! On-disk image store.
//!
//! Layout under the configured root:
//! `{gallery_id}/original/{filename}`, `{gallery_id}/web/{filename}` and
//! `{gallery_id}/zips/gallery_{tier}.zip`.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::config::StorageConfig;
use crate::db::ImageTier;
use crate::error::{AppError, AppResult};

const WEB_JPEG_QUALITY: u8 = 90;
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Formats accepted on upload, detected from the file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Jpeg,
    Png,
}

impl UploadFormat {
    pub fn mime(self) -> &'static str {
        match self {
            UploadFormat::Jpeg => "image/jpeg",
            UploadFormat::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            UploadFormat::Jpeg => "jpg",
            UploadFormat::Png => "png",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            UploadFormat::Jpeg => ImageFormat::Jpeg,
            UploadFormat::Png => ImageFormat::Png,
        }
    }
}

/// Sniff the upload format; anything other than JPEG or PNG is rejected.
pub fn detect_format(bytes: &[u8]) -> AppResult<UploadFormat> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => Ok(UploadFormat::Jpeg),
        Ok(ImageFormat::Png) => Ok(UploadFormat::Png),
        _ => Err(AppError::Validation(
            "Invalid file type; File must be of type: jpeg, jpg or png".to_string(),
        )),
    }
}

/// Whether `name` carries one of the served image extensions.
pub fn is_image_filename(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Content type served for a stored file, by extension.
pub fn content_type_for(name: &str) -> &'static str {
    match Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Height keeping the aspect ratio when scaling `width x height` to `target_width`.
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return height;
    }
    let h = (height as u64 * target_width as u64 + width as u64 / 2) / width as u64;
    h.max(1) as u32
}

/// Random alphanumeric stem plus extension.
pub fn generate_filename(length: usize, format: UploadFormat) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let stem: String = (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect();
    format!("{}.{}", stem, format.extension())
}

/// Width requested from the sized image endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeRequest {
    Tier(ImageTier),
    Width(u32),
}

impl SizeRequest {
    pub fn parse(s: &str) -> Option<Self> {
        if let Some(tier) = ImageTier::from_str(s) {
            return Some(SizeRequest::Tier(tier));
        }
        s.parse::<u32>().ok().filter(|w| *w > 0).map(SizeRequest::Width)
    }
}

/// Result of storing an upload.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub filename: String,
    pub format: UploadFormat,
    pub width: u32,
    pub height: u32,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    web_width: u32,
    filename_length: usize,
}

impl ImageStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.images_dir.clone(),
            web_width: config.web_size_width,
            filename_length: config.filename_length,
        }
    }

    pub fn web_width(&self) -> u32 {
        self.web_width
    }

    pub fn gallery_dir(&self, gallery_id: i64) -> PathBuf {
        self.root.join(gallery_id.to_string())
    }

    pub fn tier_dir(&self, gallery_id: i64, tier: ImageTier) -> PathBuf {
        self.gallery_dir(gallery_id).join(tier.as_str())
    }

    pub fn image_path(&self, gallery_id: i64, tier: ImageTier, filename: &str) -> PathBuf {
        self.tier_dir(gallery_id, tier).join(filename)
    }

    pub fn zip_dir(&self, gallery_id: i64) -> PathBuf {
        self.gallery_dir(gallery_id).join("zips")
    }

    pub fn zip_path(&self, gallery_id: i64, tier: ImageTier) -> PathBuf {
        self.zip_dir(gallery_id)
            .join(format!("gallery_{}.zip", tier.as_str()))
    }

    /// Validate, store the original and derive the web tier.
    pub async fn save_upload(&self, gallery_id: i64, bytes: Vec<u8>) -> AppResult<StoredImage> {
        let format = detect_format(&bytes)?;
        let filename = generate_filename(self.filename_length, format);
        let original_path = self.image_path(gallery_id, ImageTier::Original, &filename);
        let web_path = self.image_path(gallery_id, ImageTier::Web, &filename);
        let web_width = self.web_width;

        let stored = tokio::task::spawn_blocking(move || -> AppResult<StoredImage> {
            let decoded = image::load_from_memory_with_format(&bytes, format.image_format())
                .map_err(|e| AppError::Validation(format!("Unable to decode image: {}", e)))?;
            let (width, height) = decoded.dimensions();

            write_file(&original_path, &bytes)?;

            let web_bytes = if width > web_width {
                let resized = decoded.resize_exact(
                    web_width,
                    scaled_height(width, height, web_width),
                    FilterType::Lanczos3,
                );
                encode(&resized, format)?
            } else {
                bytes.clone()
            };
            if let Err(e) = write_file(&web_path, &web_bytes) {
                let _ = std::fs::remove_file(&original_path);
                return Err(e);
            }

            Ok(StoredImage {
                filename,
                format,
                width,
                height,
                size: bytes.len() as u64,
            })
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Image upload task failed: {}", e)))??;

        tracing::debug!(
            "Stored image {} ({}x{}, {}) for gallery {}",
            stored.filename,
            stored.width,
            stored.height,
            stored.format.mime(),
            gallery_id
        );
        Ok(stored)
    }

    pub async fn read(&self, gallery_id: i64, tier: ImageTier, filename: &str) -> AppResult<Vec<u8>> {
        let path = self.image_path(gallery_id, tier, filename);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("Image file {} not found", filename))
            } else {
                AppError::Storage(format!("Failed to read {}: {}", path.display(), e))
            }
        })
    }

    /// Serve an image at a requested width. Tier requests return the stored
    /// file; pixel widths are rendered from the smallest tier that covers
    /// them and re-encoded as JPEG at `quality`.
    pub async fn render_sized(
        &self,
        gallery_id: i64,
        filename: &str,
        size: SizeRequest,
        quality: u8,
    ) -> AppResult<(Vec<u8>, &'static str)> {
        let target = match size {
            SizeRequest::Tier(tier) => {
                let bytes = self.read(gallery_id, tier, filename).await?;
                return Ok((bytes, content_type_for(filename)));
            }
            SizeRequest::Width(w) => w,
        };

        let tier = if target <= self.web_width {
            ImageTier::Web
        } else {
            ImageTier::Original
        };
        let bytes = self.read(gallery_id, tier, filename).await?;
        let quality = quality.clamp(1, 100);

        let rendered = tokio::task::spawn_blocking(move || -> AppResult<Vec<u8>> {
            let decoded = image::load_from_memory(&bytes)
                .map_err(|e| AppError::Storage(format!("Unable to decode image: {}", e)))?;
            let (width, height) = decoded.dimensions();
            let resized = if target < width {
                decoded.resize_exact(target, scaled_height(width, height, target), FilterType::Lanczos3)
            } else {
                decoded
            };
            encode_jpeg(&resized, quality)
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Image render task failed: {}", e)))??;

        Ok((rendered, "image/jpeg"))
    }

    /// Remove both tiers of an image. Missing files are not an error.
    pub async fn remove_image(&self, gallery_id: i64, filename: &str) -> AppResult<()> {
        for tier in ImageTier::ALL {
            let path = self.image_path(gallery_id, tier, filename);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!("Image file already missing: {}", path.display());
                }
                Err(e) => {
                    return Err(AppError::Storage(format!(
                        "Failed to remove {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        Ok(())
    }

    /// Remove the whole directory tree of a gallery.
    pub async fn remove_gallery(&self, gallery_id: i64) -> AppResult<()> {
        let dir = self.gallery_dir(gallery_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to remove {}: {}",
                dir.display(),
                e
            ))),
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::Storage(format!("Failed to create {}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, bytes)
        .map_err(|e| AppError::Storage(format!("Failed to write {}: {}", path.display(), e)))
}

fn encode(img: &DynamicImage, format: UploadFormat) -> AppResult<Vec<u8>> {
    match format {
        UploadFormat::Jpeg => encode_jpeg(img, WEB_JPEG_QUALITY),
        UploadFormat::Png => {
            let mut buf = Cursor::new(Vec::new());
            img.write_to(&mut buf, ImageFormat::Png)
                .map_err(|e| AppError::Storage(format!("Failed to encode PNG: {}", e)))?;
            Ok(buf.into_inner())
        }
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> AppResult<Vec<u8>> {
    let mut buf = Vec::new();
    let rgb = img.to_rgb8();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&rgb)
        .map_err(|e| AppError::Storage(format!("Failed to encode JPEG: {}", e)))?;
    Ok(buf)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    pub(crate) fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("gallery-server-test-{}", uuid::Uuid::new_v4()))
    }

    pub(crate) fn test_store(root: &Path) -> ImageStore {
        ImageStore {
            root: root.to_path_buf(),
            web_width: 64,
            filename_length: 12,
        }
    }

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 255) as u8, (y % 255) as u8, 128]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn image_extension_check() {
        assert!(is_image_filename("a.jpg"));
        assert!(is_image_filename("a.JPEG"));
        assert!(is_image_filename("a.png"));
        assert!(!is_image_filename("a.gif"));
        assert!(!is_image_filename("README"));
        assert!(!is_image_filename("../etc/passwd"));
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for("x.jpg"), "image/jpeg");
        assert_eq!(content_type_for("x.png"), "image/png");
        assert_eq!(content_type_for("x.zip"), "application/zip");
        assert_eq!(content_type_for("x"), "application/octet-stream");
    }

    #[test]
    fn scaling_keeps_aspect_ratio() {
        assert_eq!(scaled_height(4000, 3000, 1080), 810);
        assert_eq!(scaled_height(3000, 4000, 1080), 1440);
        assert_eq!(scaled_height(1000, 1, 10), 1);
    }

    #[test]
    fn generated_filenames_have_stem_and_extension() {
        let name = generate_filename(12, UploadFormat::Png);
        assert_eq!(name.len(), 16);
        assert!(name.ends_with(".png"));
        assert!(name[..12].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn size_request_parsing() {
        assert_eq!(SizeRequest::parse("web"), Some(SizeRequest::Tier(ImageTier::Web)));
        assert_eq!(SizeRequest::parse("640"), Some(SizeRequest::Width(640)));
        assert_eq!(SizeRequest::parse("0"), None);
        assert_eq!(SizeRequest::parse("big"), None);
    }

    #[test]
    fn rejects_non_image_uploads() {
        assert!(matches!(detect_format(b"GIF89a...."), Err(AppError::Validation(_))));
        assert!(matches!(detect_format(b"plain text"), Err(AppError::Validation(_))));
        assert_eq!(detect_format(&png_bytes(2, 2)).unwrap(), UploadFormat::Png);
    }

    #[tokio::test]
    async fn upload_writes_both_tiers_and_removal_cleans_up() {
        let root = temp_root();
        let store = test_store(&root);

        let stored = store.save_upload(7, png_bytes(128, 32)).await.unwrap();
        assert_eq!((stored.width, stored.height), (128, 32));
        assert!(stored.filename.ends_with(".png"));

        let web = store.read(7, ImageTier::Web, &stored.filename).await.unwrap();
        let web_img = image::load_from_memory(&web).unwrap();
        assert_eq!(web_img.dimensions(), (64, 16));
        assert!(store.image_path(7, ImageTier::Original, &stored.filename).exists());

        store.remove_image(7, &stored.filename).await.unwrap();
        assert!(!store.image_path(7, ImageTier::Web, &stored.filename).exists());
        // second removal tolerates missing files
        store.remove_image(7, &stored.filename).await.unwrap();

        store.remove_gallery(7).await.unwrap();
        assert!(!store.gallery_dir(7).exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn sized_render_picks_tier_and_reencodes() {
        let root = temp_root();
        let store = test_store(&root);
        let stored = store.save_upload(1, png_bytes(200, 100)).await.unwrap();

        let (bytes, content_type) = store
            .render_sized(1, &stored.filename, SizeRequest::Width(32), 80)
            .await
            .unwrap();
        assert_eq!(content_type, "image/jpeg");
        assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (32, 16));

        let (bytes, _) = store
            .render_sized(1, &stored.filename, SizeRequest::Width(150), 80)
            .await
            .unwrap();
        assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (150, 75));

        let (_, content_type) = store
            .render_sized(1, &stored.filename, SizeRequest::Tier(ImageTier::Original), 80)
            .await
            .unwrap();
        assert_eq!(content_type, "image/png");
        let _ = std::fs::remove_dir_all(&root);
    }
}
