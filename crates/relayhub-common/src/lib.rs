//! Shared types for relayhub.
//!
//! This crate intentionally does **not** depend on axum, tokio or any HTTP
//! client. It holds the interface-type tagging, the endpoint records the
//! router works on, the on-disk config document, and log-masking helpers.

pub mod config;
pub mod endpoint;
pub mod headers;
pub mod interface;

pub use config::{AppConfig, ConfigDocument, ConfigError, VendorConfig};
pub use endpoint::{Endpoint, EndpointKey, ModelMapping};
pub use headers::{mask_secret, sanitize_headers};
pub use interface::{InterfaceType, detect_interface_type};
