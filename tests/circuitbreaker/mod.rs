//! Circuit breaker tests.
//!
//! - state_machine.rs: thresholds, window, administrative states
//! - half_open.rs: trial calls after the open wait
//! - concurrency.rs: recording and admission from many threads
//! - layer.rs: guarding tower services

mod concurrency;
mod layer;

use std::fmt;

/// A failing remote dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDown;

impl fmt::Display for RemoteDown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("remote down")
    }
}

impl std::error::Error for RemoteDown {}

/// A business error that says nothing about the dependency's health.
#[derive(Debug, Clone, PartialEq)]
pub struct BusinessError;

impl fmt::Display for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("business rule violated")
    }
}

impl std::error::Error for BusinessError {}
