use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Загруженная картинка события, ещё не записанная на диск.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn extension(&self) -> AppResult<String> {
        let ext = Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Ok(ext)
        } else {
            Err(AppError::validation(format!(
                "Unsupported image type '{}'; allowed: {}",
                self.file_name,
                IMAGE_EXTENSIONS.join(", ")
            )))
        }
    }
}

/// Сохраняет картинку в `{dir}/events/{uuid}.{ext}` и возвращает путь для записи в БД.
pub async fn save_event_image(dir: &str, max_bytes: usize, upload: &ImageUpload) -> AppResult<String> {
    if upload.bytes.is_empty() {
        return Err(AppError::validation("Uploaded image is empty"));
    }
    if upload.bytes.len() > max_bytes {
        return Err(AppError::validation(format!("Image exceeds {} bytes", max_bytes)));
    }
    let ext = upload.extension()?;

    let folder: PathBuf = Path::new(dir).join("events");
    tokio::fs::create_dir_all(&folder)
        .await
        .map_err(|e| AppError::Internal(format!("create upload dir {}: {}", folder.display(), e)))?;

    let file_name = format!("{}.{}", Uuid::new_v4(), ext);
    let path = folder.join(&file_name);
    tokio::fs::write(&path, &upload.bytes)
        .await
        .map_err(|e| AppError::Internal(format!("write upload {}: {}", path.display(), e)))?;

    info!("Stored event image {} ({} bytes)", path.display(), upload.bytes.len());
    Ok(format!("{}/events/{}", dir.trim_end_matches('/'), file_name))
}

/// Удаляет картинку, которую так и не привязали к событию.
pub async fn discard_event_image(path: &str) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("Removed orphaned event image {}", path),
        Err(e) => warn!("Failed to remove orphaned event image {}: {}", path, e),
    }
}
