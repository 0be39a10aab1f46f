#![deny(missing_docs)]

//! Core library for the studyvault ingestion and search backend.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Identity webhook mapping and signature verification.
pub mod identity;
/// Structured logging and tracing setup.
pub mod logging;
/// Service activity counters.
pub mod metrics;
/// Upload, process, and search orchestration.
pub mod orchestrator;
/// Object store and metadata store clients.
pub mod store;
/// External tool invocation.
pub mod tools;
