#![deny(missing_docs)]

//! Core library for the document question answering service.

/// HTTP routing and REST handlers.
pub mod api;
/// Chat-completion client abstraction and adapters.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// PDF and JSON upload parsing.
pub mod loader;
/// Structured logging and tracing setup.
pub mod logging;
/// Question answering counters.
pub mod metrics;
/// Retrieval-augmented question answering pipeline.
pub mod qa;
/// Vector index backends.
pub mod store;
