//! Header extraction from normalized chart text.

use fumen_core::model::ChartMetadata;
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy)]
enum Header {
    Title,
    Subtitle,
    Artist,
    Subartist,
}

impl Header {
    fn slot(self, meta: &mut ChartMetadata) -> &mut String {
        match self {
            Self::Title => &mut meta.title,
            Self::Subtitle => &mut meta.subtitle,
            Self::Artist => &mut meta.artist,
            Self::Subartist => &mut meta.subartist,
        }
    }
}

#[allow(clippy::expect_used)]
fn header_pattern(name: &str) -> Regex {
    Regex::new(&format!(r"(?i)^#{name}[\s\t]*(.*?)(?:\r\n|\r|\n|$)"))
        .expect("header pattern is a valid regex")
}

static HEADERS: LazyLock<[(Header, Regex); 4]> = LazyLock::new(|| {
    [
        (Header::Title, header_pattern("title")),
        (Header::Subtitle, header_pattern("subtitle")),
        (Header::Artist, header_pattern("artist")),
        (Header::Subartist, header_pattern("subartist")),
    ]
});

/// Extract `#TITLE`, `#SUBTITLE`, `#ARTIST` and `#SUBARTIST` from chart text.
///
/// Single pass over the lines. Header names match case-insensitively at the
/// start of a line; the first non-empty value for each header wins. Scanning
/// stops as soon as all four are filled.
pub fn extract(text: &str) -> ChartMetadata {
    let mut meta = ChartMetadata::default();

    for line in text.lines() {
        if meta.is_complete() {
            break;
        }
        for (header, pattern) in HEADERS.iter() {
            let Some(value) = pattern.captures(line).and_then(|caps| caps.get(1)) else {
                continue;
            };
            let slot = header.slot(&mut meta);
            if slot.is_empty() {
                *slot = value.as_str().to_string();
            }
            break;
        }
    }

    meta
}
