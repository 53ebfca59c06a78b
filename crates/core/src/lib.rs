//! Core types and shared functionality for bloom.
//!
//! This crate provides:
//! - The Cache Store with SQLite backend
//! - Request and response snapshot types
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod model;

pub use cache::{CacheDb, CacheHandle, EntrySummary};
pub use config::{AppConfig, CacheNames, ConfigError};
pub use error::Error;
pub use model::{Destination, Request, RequestKey, RequestMode, ResponseSnapshot};
