//! Common utilities for docstore
//!
//! This crate provides the error type shared by the facade and the CLI.

pub mod error;

pub use error::{DocStoreError, Result};
