//! Endpoint handlers, one module per resource.

pub mod health;
pub mod medications;
