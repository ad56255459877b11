//! reqwest implementation of [`KioskApi`].

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use timeclock_core::wire::{
    ErrorBody, HEADER_DEVICE_TOKEN, HEADER_KIOSK_CODE, HEADER_PAIRING_VERSION, PairRequest,
    PairResponse, PhotoUploadResponse, PunchRequest, PunchResponse, RevokeRequest, RevokeResponse,
    StatusResponse,
};
use tracing::debug;

use super::{ClientError, DeviceAuth, KioskApi, PhotoSubmission};

const USER_AGENT: &str = concat!("timeclock-kiosk/", env!("CARGO_PKG_VERSION"));

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Unexpected {
                status: e.status().map_or(0, |s| s.as_u16()),
                body: e.to_string(),
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// HTTP client for the timeclock server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        if base_url.is_empty() {
            return Err(ClientError::Config("server URL is empty".into()));
        }

        // reqwest is built with rustls-no-provider. `Err` means a provider is
        // already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn with_device(builder: reqwest::RequestBuilder, auth: &DeviceAuth<'_>) -> reqwest::RequestBuilder {
        let mut builder = builder.header(HEADER_KIOSK_CODE, auth.kiosk_code);
        if let Some(token) = auth.device_token {
            builder = builder.header(HEADER_DEVICE_TOKEN, token);
        }
        if let Some(version) = auth.pairing_version {
            builder = builder.header(HEADER_PAIRING_VERSION, version.to_string());
        }
        builder
    }

    /// Decode a success body, or turn an error body into [`ClientError::Api`].
    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
        let status = resp.status();
        let body = resp.bytes().await?;
        if status.is_success() {
            serde_json::from_slice(&body).map_err(|e| ClientError::Unexpected {
                status: status.as_u16(),
                body: e.to_string(),
            })
        } else {
            Err(error_from_body(status.as_u16(), &body))
        }
    }
}

pub(crate) fn error_from_body(status: u16, body: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(err) => ClientError::Api {
            status,
            code: err.error,
            message: err.message,
        },
        Err(_) => ClientError::Unexpected {
            status,
            body: String::from_utf8_lossy(body).chars().take(200).collect(),
        },
    }
}

impl KioskApi for ApiClient {
    async fn ping(&self) -> Result<(), ClientError> {
        let resp = self.http.get(self.url("/ping")).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ClientError::Unexpected {
                status: resp.status().as_u16(),
                body: String::new(),
            })
        }
    }

    async fn status(&self, kiosk_code: &str) -> Result<StatusResponse, ClientError> {
        let resp = self
            .http
            .get(self.url("/status"))
            .header(HEADER_KIOSK_CODE, kiosk_code)
            .send()
            .await?;
        Self::read(resp).await
    }

    async fn pair(&self, kiosk_code: &str, pairing_code: &str) -> Result<PairResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/pair"))
            .header(HEADER_KIOSK_CODE, kiosk_code)
            .json(&PairRequest {
                pairing_code: pairing_code.to_string(),
            })
            .send()
            .await?;
        Self::read(resp).await
    }

    async fn revoke(&self, kiosk_code: &str, manager_pin: &str) -> Result<RevokeResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/revoke"))
            .header(HEADER_KIOSK_CODE, kiosk_code)
            .json(&RevokeRequest {
                pin: manager_pin.to_string(),
            })
            .send()
            .await?;
        Self::read(resp).await
    }

    async fn punch(
        &self,
        auth: &DeviceAuth<'_>,
        request: &PunchRequest,
    ) -> Result<PunchResponse, ClientError> {
        debug!(event_uuid = ?request.event_uuid, "Submitting punch");
        let builder = self.http.post(self.url("/punch")).json(request);
        let resp = Self::with_device(builder, auth).send().await?;
        Self::read(resp).await
    }

    async fn upload_photo(
        &self,
        auth: &DeviceAuth<'_>,
        photo: &PhotoSubmission<'_>,
    ) -> Result<PhotoUploadResponse, ClientError> {
        let part = Part::bytes(photo.bytes.to_vec())
            .file_name("photo")
            .mime_str(photo.content_type)
            .map_err(|e| ClientError::Config(e.to_string()))?;
        let form = Form::new()
            .text("event_uuid", photo.event_uuid.to_string())
            .text("action", photo.action.as_str())
            .text("device_time", photo.device_time.to_string())
            .part("photo", part);

        debug!(event_uuid = photo.event_uuid, bytes = photo.bytes.len(), "Uploading photo");
        let builder = self.http.post(self.url("/photo_upload")).multipart(form);
        let resp = Self::with_device(builder, auth).send().await?;
        Self::read(resp).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use timeclock_core::ErrorCode;

    use super::*;

    #[test]
    fn error_body_becomes_api_error() {
        let err = error_from_body(
            401,
            br#"{"status":"error","error":"device_revoked","message":"revoked"}"#,
        );
        assert_eq!(err.code(), Some(ErrorCode::DeviceRevoked));
        assert!(!err.is_offline());
    }

    #[test]
    fn non_json_body_is_unexpected() {
        let err = error_from_body(502, b"<html>Bad Gateway</html>");
        assert!(matches!(err, ClientError::Unexpected { status: 502, .. }));
        assert_eq!(err.code(), None);
    }

    #[test]
    fn base_url_is_normalised() {
        let client = ApiClient::new("http://127.0.0.1:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8080");
        assert_eq!(client.url("/ping"), "http://127.0.0.1:8080/ping");
        assert!(ApiClient::new("", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn unreachable_server_is_offline() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let err = client.ping().await.unwrap_err();
        assert!(err.is_offline(), "{err:?}");
    }
}
