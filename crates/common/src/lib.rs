//! Common types and utilities shared across the Posada market services

pub mod config;
pub mod crypto;
pub mod error;
pub mod rounding;
pub mod types;

pub use config::AppConfig;
pub use error::*;
pub use types::*;
