//! HTTP routes.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use timeclock_core::ErrorCode;
use timeclock_core::db::{DatabaseError, unix_timestamp};
use timeclock_core::wire::{
    PairRequest, PairResponse, PhotoUploadResponse, PunchRequest, PunchResponse, RevokeRequest,
    RevokeResponse, StatusResponse,
};
use tower_http::trace::TraceLayer;

use super::error::ApiError;
use super::extract::{ClientMeta, DeviceHeaders};
use super::pairing_svc::PairingService;
use super::photo_svc::{PhotoFile, PhotoService, PhotoUpload};
use super::punch_svc::PunchService;
use crate::config::{KioskRegistry, ServerConfig};
use crate::settings::SettingsCache;
use crate::storage::ServerDatabase;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: ServerDatabase,
    pub kiosks: Arc<KioskRegistry>,
    pub settings: SettingsCache,
    pub pairing: Arc<PairingService>,
    pub punches: Arc<PunchService>,
    pub photos: Arc<PhotoService>,
}

impl AppState {
    /// Wire up services and make sure every configured kiosk has an
    /// authorization row.
    pub async fn new(
        db: ServerDatabase,
        config: &ServerConfig,
        photo_dir: PathBuf,
    ) -> Result<Self, DatabaseError> {
        let kiosks = Arc::new(KioskRegistry::new(config.kiosks.clone()));
        for code in kiosks.codes() {
            db.ensure_kiosk(code).await?;
        }
        let settings = SettingsCache::load(db.clone()).await?;

        Ok(Self {
            pairing: Arc::new(PairingService::new(
                db.clone(),
                Arc::clone(&kiosks),
                settings.clone(),
                config.manager_pin.clone(),
            )),
            punches: Arc::new(PunchService::new(
                db.clone(),
                Arc::clone(&kiosks),
                settings.clone(),
            )),
            photos: Arc::new(PhotoService::new(
                db.clone(),
                Arc::clone(&kiosks),
                settings.clone(),
                photo_dir,
            )),
            db,
            kiosks,
            settings,
        })
    }
}

/// Build the router. `max_upload_bytes` caps the raw `/photo_upload` body;
/// the `photo_max_bytes` setting is checked separately per request.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/status", get(status))
        .route("/pair", post(pair))
        .route("/revoke", post(revoke))
        .route("/punch", post(punch))
        .route(
            "/photo_upload",
            post(photo_upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /ping`
async fn ping() -> Json<Value> {
    Json(json!({ "status": "ok", "time": unix_timestamp() }))
}

/// `GET /status`: tunables, plus pairing state when `X-Kiosk-Code` names a
/// configured kiosk.
async fn status(
    State(state): State<AppState>,
    headers: DeviceHeaders,
) -> Result<Json<StatusResponse>, ApiError> {
    let settings = (*state.settings.snapshot().await).clone();
    let entry = headers
        .kiosk_code
        .as_deref()
        .and_then(|code| state.kiosks.find(code));

    let auth = match entry {
        Some(entry) => state.db.get_device_authorization(&entry.kiosk_code).await?,
        None => None,
    };

    Ok(Json(StatusResponse {
        paired: auth.as_ref().is_some_and(|a| a.paired),
        pairing_version: auth.map(|a| a.pairing_version),
        settings,
    }))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| ApiError::with_message(ErrorCode::MissingFields, e.body_text()))
}

/// `POST /pair`
async fn pair(
    State(state): State<AppState>,
    headers: DeviceHeaders,
    meta: ClientMeta,
    body: Result<Json<PairRequest>, JsonRejection>,
) -> Result<Json<PairResponse>, ApiError> {
    let req = json_body(body)?;
    let resp = state
        .pairing
        .pair(headers.kiosk_code.as_deref(), &req, &meta)
        .await?;
    Ok(Json(resp))
}

/// `POST /revoke`
async fn revoke(
    State(state): State<AppState>,
    headers: DeviceHeaders,
    meta: ClientMeta,
    body: Result<Json<RevokeRequest>, JsonRejection>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let req = json_body(body)?;
    let resp = state
        .pairing
        .revoke(headers.kiosk_code.as_deref(), &req, &meta)
        .await?;
    Ok(Json(resp))
}

/// `POST /punch`
async fn punch(
    State(state): State<AppState>,
    headers: DeviceHeaders,
    meta: ClientMeta,
    body: Result<Json<PunchRequest>, JsonRejection>,
) -> Result<Json<PunchResponse>, ApiError> {
    let req = json_body(body)?;
    let resp = state.punches.punch(&headers, &meta, req).await?;
    Ok(Json(resp))
}

/// `POST /photo_upload`: multipart with `event_uuid`, `action` and `photo`.
async fn photo_upload(
    State(state): State<AppState>,
    headers: DeviceHeaders,
    meta: ClientMeta,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PhotoUploadResponse>, ApiError> {
    let multipart = multipart
        .map_err(|e| ApiError::with_message(ErrorCode::MissingFields, e.body_text()))?;
    let upload = read_photo_upload(multipart).await?;
    let resp = state.photos.upload(&headers, &meta, upload).await?;
    Ok(Json(resp))
}

fn multipart_error(e: &MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(ErrorCode::FileTooLarge)
    } else {
        ApiError::with_message(ErrorCode::MissingFields, e.body_text())
    }
}

async fn read_photo_upload(mut multipart: Multipart) -> Result<PhotoUpload, ApiError> {
    let mut upload = PhotoUpload::default();
    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(&e))? {
        let name = field.name().map(ToString::to_string);
        match name.as_deref() {
            Some("event_uuid") => {
                upload.event_uuid = Some(field.text().await.map_err(|e| multipart_error(&e))?);
            }
            Some("action") => {
                upload.action = Some(field.text().await.map_err(|e| multipart_error(&e))?);
            }
            Some("photo") => {
                let content_type = field.content_type().map(ToString::to_string);
                let bytes = field.bytes().await.map_err(|e| multipart_error(&e))?;
                upload.photo = Some(PhotoFile {
                    content_type,
                    bytes,
                });
            }
            _ => {}
        }
    }
    Ok(upload)
}
