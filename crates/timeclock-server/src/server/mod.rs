//! HTTP API for kiosks.

pub mod error;
pub mod extract;
pub mod guard;
pub mod image;
pub mod pairing_svc;
pub mod photo_svc;
pub mod punch_svc;
pub mod routes;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test_helpers;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod pairing_svc_tests;


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod punch_svc_tests;

pub use error::ApiError;
pub use routes::{AppState, build_router};
