//! Gallery zip archives.
//!
//! Eager builds write one archive per tier next to the gallery's images and
//! flip `zips_ready`. On-demand builds assemble an archive in memory from an
//! explicit filename list and never touch the zip directory.

use std::ffi::OsStr;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::db::{GalleryRepository, ImageTier};
use crate::error::{AppError, AppResult};
use crate::services::lifecycle;
use crate::services::storage::{is_image_filename, ImageStore};

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Sorted file names of one tier directory.
fn tier_entries(dir: &Path) -> AppResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)
        .map_err(|e| AppError::Storage(format!("Failed to read {}: {}", dir.display(), e)))?
    {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Write every file of `src_dir` into a zip at `dest`. The archive is
/// written to a temporary sibling and renamed into place, so a failed build
/// never leaves a partial archive at `dest`.
pub fn write_tier_zip(src_dir: &Path, dest: &Path) -> AppResult<usize> {
    let parent = dest
        .parent()
        .ok_or_else(|| AppError::Storage(format!("Invalid zip path {}", dest.display())))?;
    std::fs::create_dir_all(parent)
        .map_err(|e| AppError::Storage(format!("Failed to create {}: {}", parent.display(), e)))?;

    let tmp = dest.with_extension(format!("zip.{}.tmp", uuid::Uuid::new_v4()));
    let result = (|| -> AppResult<usize> {
        let names = if src_dir.exists() {
            tier_entries(src_dir)?
        } else {
            Vec::new()
        };
        let file = std::fs::File::create(&tmp)?;
        let mut writer = ZipWriter::new(file);
        for name in &names {
            let path = src_dir.join(name);
            let mut source = std::fs::File::open(&path)
                .map_err(|e| AppError::Storage(format!("Failed to open {}: {}", path.display(), e)))?;
            writer.start_file(name.as_str(), entry_options())?;
            std::io::copy(&mut source, &mut writer)?;
        }
        writer.finish()?;
        Ok(names.len())
    })();

    match result {
        Ok(count) => {
            std::fs::rename(&tmp, dest)?;
            Ok(count)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Zip the listed files of `dir` into memory. Names without an image
/// extension and names with no file behind them are skipped.
pub fn build_in_memory(dir: &Path, filenames: &[String]) -> AppResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for name in filenames {
        if !is_image_filename(name) || Path::new(name).file_name() != Some(OsStr::new(name)) {
            tracing::debug!("Skipping non-image entry {} in on-demand zip", name);
            continue;
        }
        let path = dir.join(name);
        let mut file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Skipping missing file {} in on-demand zip", path.display());
                continue;
            }
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "Failed to open {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        writer.start_file(name.as_str(), entry_options())?;
        writer.write_all(&bytes)?;
    }

    Ok(writer.finish()?.into_inner())
}

pub struct ArchiveService;

impl ArchiveService {
    /// Build both tier archives for a gallery and mark its zips ready.
    /// The flag is cleared first and set again only once both tiers are
    /// written, so a failed build leaves it false.
    pub async fn build_gallery_zips(
        pool: &SqlitePool,
        store: &ImageStore,
        gallery_id: i64,
    ) -> AppResult<()> {
        GalleryRepository::set_zips_ready(pool, gallery_id, false).await?;

        for tier in ImageTier::ALL {
            let src = store.tier_dir(gallery_id, tier);
            let dest = store.zip_path(gallery_id, tier);
            let count = tokio::task::spawn_blocking(move || write_tier_zip(&src, &dest))
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Zip task failed: {}", e)))??;
            tracing::info!(
                "Built {} zip for gallery {} with {} images",
                tier,
                gallery_id,
                count
            );
        }

        GalleryRepository::set_zips_ready(pool, gallery_id, true).await?;
        Ok(())
    }

    /// In-memory archive of `filenames` at `tier`.
    pub async fn build_on_demand(
        store: &ImageStore,
        gallery_id: i64,
        tier: ImageTier,
        filenames: Vec<String>,
    ) -> AppResult<Vec<u8>> {
        let dir = store.tier_dir(gallery_id, tier);
        tokio::task::spawn_blocking(move || build_in_memory(&dir, &filenames))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Zip task failed: {}", e)))?
    }

    /// Path of the pre-built archive if it can be served: the flag is set
    /// and the file is still on disk.
    pub async fn usable_zip(
        store: &ImageStore,
        gallery_id: i64,
        zips_ready: bool,
        tier: ImageTier,
    ) -> Option<PathBuf> {
        let path = store.zip_path(gallery_id, tier);
        let present = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if zips_ready && !present {
            tracing::warn!(
                "Gallery {} marked zips ready but {} is missing; building on demand",
                gallery_id,
                path.display()
            );
        }
        lifecycle::zip_usable(zips_ready, present).then_some(path)
    }
}
