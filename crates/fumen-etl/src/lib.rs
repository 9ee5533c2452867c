//! Scan, parse, and index stages for fumen.
//!
//! A run walks the configured source directories, normalizes and hashes each
//! chart file, extracts its header metadata, and upserts the results into the
//! store in batched transactions. See [`Indexer`] for the entry point.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod encoding;
pub mod error;
pub mod identity;
pub mod metadata;
pub mod parse;
pub mod persist;
pub mod pipeline;
pub mod registry;
pub mod scan;

pub use config::{Config, IndexerOptions};
pub use encoding::{normalize, CharsetDetector, Detection, HeuristicDetector};
pub use error::{
    ConfigError, EncodingError, FailureKind, IndexError, IndexResult, ParseError, ScanFailure,
};
pub use parse::{parse_chart, ParsedChart};
pub use persist::{BatchPersister, FlushStats};
pub use pipeline::{Indexer, ScanReport};
pub use registry::SongRegistry;
pub use scan::{ScanDispatcher, ScanEvent, SourceSet};
