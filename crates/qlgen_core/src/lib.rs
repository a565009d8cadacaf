//! Core utilities for qlgen.
//!
//! This crate provides foundational types used throughout qlgen:
//! - `position`: Source positions and the combined-document source map
//! - `error`: The error taxonomy

pub mod error;
pub mod position;

pub use error::{Error, LocatedMessage, Result};
pub use position::{Position, SourceFile, SourceMap};
