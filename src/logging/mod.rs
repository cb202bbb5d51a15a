// file: src/logging/mod.rs
// version: 1.0.0
// guid: 9a3e5c17-6b42-4d8f-b1a9-7e05f4c82d36

//! Logging system for the offline Kubernetes installer

pub mod logger;

pub use logger::init_logger;
