//! Request extractors for device headers and client metadata.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use timeclock_core::wire::{HEADER_DEVICE_TOKEN, HEADER_KIOSK_CODE, HEADER_PAIRING_VERSION};

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Raw device identity headers. Validation happens in the guard.
#[derive(Clone, Default)]
pub struct DeviceHeaders {
    pub kiosk_code: Option<String>,
    pub device_token: Option<String>,
    pub pairing_version: Option<String>,
}

impl std::fmt::Debug for DeviceHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHeaders")
            .field("kiosk_code", &self.kiosk_code)
            .field("device_token", &self.device_token.as_ref().map(|_| "[REDACTED]"))
            .field("pairing_version", &self.pairing_version)
            .finish()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for DeviceHeaders {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            kiosk_code: header(&parts.headers, HEADER_KIOSK_CODE),
            device_token: header(&parts.headers, HEADER_DEVICE_TOKEN),
            pairing_version: header(&parts.headers, HEADER_PAIRING_VERSION),
        })
    }
}

/// Caller IP and user agent, recorded on audit and punch rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = header(&parts.headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()));
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(Self {
            ip: forwarded.or(peer),
            user_agent: header(&parts.headers, "user-agent"),
        })
    }
}
