//! Utility functions and helpers for repo-gallery.
//!
//! This module provides cross-cutting concerns like structured logging
//! and retry logic with backoff.
//!
//! # Submodules
//!
//! - `http`: Shared upstream HTTP client construction.
//! - `logging`: Tracing and logging initialization.
//! - `retry`: Retry mechanisms that respect upstream reset hints.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod http;
pub mod logging;
pub mod retry;
