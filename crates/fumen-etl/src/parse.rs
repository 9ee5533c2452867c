//! The per-file parse task: read, normalize, hash, extract.

use fumen_core::model::ChartMetadata;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::encoding::{self, CharsetDetector};
use crate::error::ParseError;
use crate::identity::content_hash;
use crate::metadata;

/// Everything the indexer needs to know about one chart file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedChart {
    pub path: PathBuf,
    pub hash: String,
    pub metadata: ChartMetadata,
}

impl ParsedChart {
    /// The directory that identifies this chart's song.
    pub fn song_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Parse a chart file with the default detector.
pub fn parse_chart(path: &Path) -> Result<ParsedChart, ParseError> {
    parse_chart_with(&encoding::HeuristicDetector, path)
}

pub fn parse_chart_with(
    detector: &dyn CharsetDetector,
    path: &Path,
) -> Result<ParsedChart, ParseError> {
    let raw = std::fs::read(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let canonical =
        encoding::normalize_with(detector, &raw).map_err(|source| ParseError::Encoding {
            path: path.to_path_buf(),
            source,
        })?;

    let hash = content_hash(&canonical);
    let metadata = metadata::extract(&String::from_utf8_lossy(&canonical));

    Ok(ParsedChart {
        path: path.to_path_buf(),
        hash,
        metadata,
    })
}
