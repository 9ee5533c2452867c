//! Core domain model for fumen.
//!
//! This crate defines the chart index data model (Song, Pattern), the
//! SQLite schema, and the transactional store used by the indexer.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod schema;

pub use error::{Error, Result};
