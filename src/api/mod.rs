//! HTTP surface of the extraction service.
//!
//! A thin axum layer over the medication service: request validation and
//! JSON shaping happen here, everything else is delegated to the pipeline
//! layer. Versioned endpoints are nested under the configured prefix
//! (`/api/v1` by default); `/health` stays at the root.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod types;

pub use error::ApiError;
pub use router::api_router;
pub use types::ApiContext;
