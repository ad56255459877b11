//! Photo evidence attachment.
//!
//! A photo is attached to an already-recorded punch event and stored as
//! `<photo_dir>/<event_uuid>.<ext>`. Re-uploading for the same event
//! replaces the stored file and row.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use timeclock_core::wire::PhotoUploadResponse;
use timeclock_core::{ErrorCode, PunchAction};
use tracing::{error, info, warn};

use super::error::ApiError;
use super::extract::{ClientMeta, DeviceHeaders};
use super::guard::authorize_device;
use super::image::ImageKind;
use crate::config::KioskRegistry;
use crate::settings::SettingsCache;
use crate::storage::{PhotoEvidenceParams, ServerDatabase};

/// Fields collected from a `/photo_upload` multipart body.
#[derive(Debug, Clone, Default)]
pub struct PhotoUpload {
    pub event_uuid: Option<String>,
    pub action: Option<String>,
    pub photo: Option<PhotoFile>,
}

#[derive(Debug, Clone)]
pub struct PhotoFile {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

pub struct PhotoService {
    db: ServerDatabase,
    kiosks: Arc<KioskRegistry>,
    settings: SettingsCache,
    photo_dir: PathBuf,
}

/// The event UUID when it is filename-safe, otherwise its SHA-256 hex.
fn file_stem(event_uuid: &str) -> String {
    let safe = !event_uuid.is_empty()
        && event_uuid.len() <= 64
        && event_uuid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if safe {
        event_uuid.to_string()
    } else {
        timeclock_crypto::hash_token(event_uuid)
    }
}

fn storage_error(e: &std::io::Error, path: &Path) -> ApiError {
    error!(error = %e, path = %path.display(), "Failed to store photo");
    ApiError::new(ErrorCode::ServerError)
}

impl PhotoService {
    pub const fn new(
        db: ServerDatabase,
        kiosks: Arc<KioskRegistry>,
        settings: SettingsCache,
        photo_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            kiosks,
            settings,
            photo_dir,
        }
    }

    pub fn photo_dir(&self) -> &Path {
        &self.photo_dir
    }

    pub async fn upload(
        &self,
        headers: &DeviceHeaders,
        meta: &ClientMeta,
        upload: PhotoUpload,
    ) -> Result<PhotoUploadResponse, ApiError> {
        let tunables = self.settings.snapshot().await;
        let device = authorize_device(&self.db, &self.kiosks, headers, meta).await?;

        let (Some(event_uuid), Some(action)) = (upload.event_uuid, upload.action) else {
            return Err(ErrorCode::MissingFields.into());
        };
        let event_uuid = event_uuid.trim().to_string();
        let action: PunchAction = action.parse()?;

        let photo = upload
            .photo
            .filter(|p| !p.bytes.is_empty())
            .ok_or(ErrorCode::MissingFile)?;
        if photo.bytes.len() as u64 > tunables.photo_max_bytes {
            return Err(ErrorCode::FileTooLarge.into());
        }
        let kind = ImageKind::sniff(&photo.bytes).ok_or(ErrorCode::InvalidFileType)?;
        if let Some(declared) = photo.content_type.as_deref() {
            if declared != "application/octet-stream" && ImageKind::from_mime(declared) != Some(kind) {
                return Err(ErrorCode::InvalidFileType.into());
            }
        }

        let Some(event) = self.db.get_punch_event(&event_uuid).await? else {
            return Err(ErrorCode::NoMatchingPunch.into());
        };
        if event.action != action.as_str() {
            warn!(%event_uuid, punch = %event.action, photo = %action, "Photo action differs from punch");
        }

        let path = self
            .photo_dir
            .join(format!("{}.{}", file_stem(&event_uuid), kind.extension()));
        let path_str = path.to_string_lossy();
        let referenced = self
            .db
            .get_photo_evidence(&event_uuid)
            .await?
            .is_some_and(|e| e.photo_path == path_str);
        self.write_file(&path, &photo.bytes).await?;

        let stored = self
            .db
            .upsert_photo_evidence(&PhotoEvidenceParams {
                event_uuid: &event_uuid,
                action: action.as_str(),
                device_id: &device.kiosk_code,
                device_name: &device.kiosk_name,
                photo_path: &path_str,
                content_type: kind.mime(),
                size_bytes: i64::try_from(photo.bytes.len()).unwrap_or(i64::MAX),
            })
            .await;

        let replaced = match stored {
            Ok(replaced) => replaced,
            Err(e) => {
                // The existing row still points at `path` if it was overwritten.
                if !referenced {
                    if let Err(rm) = tokio::fs::remove_file(&path).await {
                        warn!(error = %rm, "Failed to remove orphaned photo");
                    }
                }
                return Err(e.into());
            }
        };
        if let Some(old) = replaced {
            if let Err(e) = tokio::fs::remove_file(&old).await {
                warn!(error = %e, path = %old, "Failed to remove replaced photo");
            }
        }

        info!(%event_uuid, bytes = photo.bytes.len(), kind = kind.mime(), "Photo evidence stored");
        Ok(PhotoUploadResponse {
            status: "ok".to_string(),
            event_uuid,
        })
    }

    /// Write to a sibling temp file, then rename into place.
    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), ApiError> {
        tokio::fs::create_dir_all(&self.photo_dir)
            .await
            .map_err(|e| storage_error(&e, &self.photo_dir))?;
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| storage_error(&e, &tmp))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| storage_error(&e, path))
    }
}
