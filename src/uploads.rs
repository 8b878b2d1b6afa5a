//! Image uploads for post covers and profile pictures.

use axum::body::Bytes;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::CONFIG;
use crate::error::AppError;

pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// A file part of a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Subdirectory of the media root an image is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFolder {
    Blog,
    ProfilePics,
}

impl MediaFolder {
    pub fn dir_name(&self) -> &'static str {
        match self {
            MediaFolder::Blog => "blog",
            MediaFolder::ProfilePics => "profile_pics",
        }
    }
}

/// An upload that passed validation; `extension` follows the detected content.
#[derive(Debug, Clone)]
pub struct ValidImage {
    pub extension: &'static str,
    pub bytes: Bytes,
}

fn detect_image_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: RIFF....WEBP
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Check name, size and content of an uploaded image. The error is the
/// message shown next to the form field.
pub fn validate_image(file: &UploadedFile) -> Result<ValidImage, String> {
    let extension = file
        .file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(format!(
            "File extension “{}” is not allowed. Allowed extensions are: {}.",
            extension,
            ALLOWED_EXTENSIONS.join(", ")
        ));
    }
    if file.bytes.is_empty() {
        return Err("The submitted file is empty.".to_string());
    }
    if file.bytes.len() > MAX_IMAGE_SIZE {
        return Err("File too large. Maximum size is 5MB.".to_string());
    }

    match detect_image_mime(&file.bytes) {
        Some(mime) => Ok(ValidImage {
            extension: extension_for_mime(mime),
            bytes: file.bytes.clone(),
        }),
        None => Err(
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image."
                .to_string(),
        ),
    }
}

fn media_root() -> PathBuf {
    PathBuf::from(&CONFIG.media_root)
}

/// Write `image` under the media root and return its path relative to it,
/// e.g. `blog/<uuid>.png`.
pub async fn store_image(folder: MediaFolder, image: &ValidImage) -> Result<String, AppError> {
    store_image_in(&media_root(), folder, image).await
}

async fn store_image_in(
    root: &Path,
    folder: MediaFolder,
    image: &ValidImage,
) -> Result<String, AppError> {
    let dir = root.join(folder.dir_name());
    tokio::fs::create_dir_all(&dir).await?;

    let filename = format!("{}.{}", Uuid::new_v4(), image.extension);
    tokio::fs::write(dir.join(&filename), &image.bytes).await?;

    let relative = format!("{}/{}", folder.dir_name(), filename);
    tracing::info!("Image stored: {} ({} bytes)", relative, image.bytes.len());
    Ok(relative)
}

fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains("..")
        && !path.contains('\\')
        && !path.contains('\0')
}

/// Remove a previously stored image. Failures are logged, not returned.
pub async fn remove_image(relative: &str) {
    if !is_safe_relative(relative) {
        tracing::warn!("Refusing to remove media path {:?}", relative);
        return;
    }
    if let Err(e) = tokio::fs::remove_file(media_root().join(relative)).await {
        tracing::warn!("Failed to remove media file {}: {}", relative, e);
    }
}

/// Public URL of a stored media path.
pub fn media_url(relative: &str) -> String {
    format!("/media/{}", relative)
}
