//! Fallback tests.
//!
//! - handlers.rs: handler matching and strategies
//! - primitives.rs: fallbacks over real rejections and the tower layer

mod handlers;
mod primitives;

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogError(pub &'static str);

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "catalog error: {}", self.0)
    }
}

impl std::error::Error for CatalogError {}
