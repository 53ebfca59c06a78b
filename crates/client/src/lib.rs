//! Offline cache manager for bloom.
//!
//! This crate provides request classification, the network-first and
//! cache-first strategies, the worker lifecycle, and the HTTP network used by
//! the server.

pub mod classify;
pub mod dispatch;
pub mod fetch;
pub mod intercept;
pub mod lifecycle;

#[cfg(test)]
mod testing;

pub use classify::{RequestClass, classify};
pub use dispatch::{ControlMessage, Event, EventOutcome};
pub use fetch::{FetchConfig, FetchMode, HttpNetwork, Network};
pub use intercept::{BackgroundWrites, FetchOutcome, Interceptor, offline_response};
pub use lifecycle::{
    ActivateReport, Client, InstallReport, Registration, RegistrationStatus, ServiceWorker, WorkerInfo, WorkerState,
};
