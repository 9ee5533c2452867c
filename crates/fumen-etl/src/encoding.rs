//! Charset detection and normalization of chart bytes to UTF-8.
//!
//! Detection is only trusted when it is certain: anything short of
//! [`FULL_CONFIDENCE`] is decoded as Shift_JIS, the dominant legacy
//! encoding in chart collections. Decoding is best-effort; undecodable
//! sequences become U+FFFD instead of failing the file.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, EUC_KR, SHIFT_JIS};
use std::borrow::Cow;
use std::fmt;

use crate::error::EncodingError;

/// Confidence reported for a certain detection.
pub const FULL_CONFIDENCE: u8 = 100;

/// Confidence reported when the statistical detector could not rule out
/// other candidates.
const LOW_CONFIDENCE: u8 = 10;

const UTF32_BE_BOM: [u8; 4] = [0x00, 0x00, 0xFE, 0xFF];
const UTF32_LE_BOM: [u8; 4] = [0xFF, 0xFE, 0x00, 0x00];

/// The result of running a detector over some bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Charset label, e.g. `"UTF-8"`, `"EUC-KR"`, `"Shift_JIS"`.
    pub charset: String,
    /// 0..=100.
    pub confidence: u8,
}

impl Detection {
    pub fn new(charset: impl Into<String>, confidence: u8) -> Self {
        Self {
            charset: charset.into(),
            confidence,
        }
    }

    pub fn is_certain(&self) -> bool {
        self.confidence == FULL_CONFIDENCE
    }
}

/// A charset-detection heuristic.
pub trait CharsetDetector: fmt::Debug + Send + Sync {
    fn detect(&self, input: &[u8]) -> Result<Detection, EncodingError>;
}

/// The charsets the normalizer knows how to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Utf32Be,
    Utf32Le,
    EucKr,
    ShiftJis,
    /// A label with no dedicated decoder.
    Other(String),
}

impl Charset {
    pub fn from_label(label: &str) -> Self {
        const KNOWN: [(&str, Charset); 5] = [
            ("UTF-8", Charset::Utf8),
            ("UTF-32BE", Charset::Utf32Be),
            ("UTF-32LE", Charset::Utf32Le),
            ("EUC-KR", Charset::EucKr),
            ("Shift_JIS", Charset::ShiftJis),
        ];
        KNOWN
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(label))
            .map(|(_, charset)| charset)
            .unwrap_or_else(|| Self::Other(label.to_string()))
    }
}

/// BOM sniffing for UTF-32, a strict UTF-8 check, then `chardetng` for
/// legacy encodings.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicDetector;

impl CharsetDetector for HeuristicDetector {
    fn detect(&self, input: &[u8]) -> Result<Detection, EncodingError> {
        if input.is_empty() {
            return Err(EncodingError::Detection("no bytes to inspect".to_string()));
        }
        // UTF-32 BOMs must be checked before UTF-8: their NUL bytes are valid UTF-8.
        if input.starts_with(&UTF32_BE_BOM) {
            return Ok(Detection::new("UTF-32BE", FULL_CONFIDENCE));
        }
        if input.starts_with(&UTF32_LE_BOM) {
            return Ok(Detection::new("UTF-32LE", FULL_CONFIDENCE));
        }
        if std::str::from_utf8(input).is_ok() {
            return Ok(Detection::new("UTF-8", FULL_CONFIDENCE));
        }

        let mut detector = EncodingDetector::new();
        detector.feed(input, true);
        let (encoding, certain) = detector.guess_assess(None, false);
        let confidence = if certain { FULL_CONFIDENCE } else { LOW_CONFIDENCE };
        Ok(Detection::new(encoding.name(), confidence))
    }
}

/// Normalize raw chart bytes to UTF-8 using [`HeuristicDetector`].
pub fn normalize(input: &[u8]) -> Result<Cow<'_, [u8]>, EncodingError> {
    normalize_with(&HeuristicDetector, input)
}

/// Normalize raw chart bytes to UTF-8 using the given detector.
///
/// Bytes detected as UTF-8 are returned unchanged (borrowed).
pub fn normalize_with<'a>(
    detector: &dyn CharsetDetector,
    input: &'a [u8],
) -> Result<Cow<'a, [u8]>, EncodingError> {
    let detection = detector.detect(input)?;

    if !detection.is_certain() {
        log::debug!(
            "Low-confidence detection ({} at {}), decoding as Shift_JIS",
            detection.charset,
            detection.confidence
        );
        return Ok(Cow::Owned(decode_legacy(SHIFT_JIS, input)));
    }

    let decoded = match Charset::from_label(&detection.charset) {
        Charset::Utf8 => return Ok(Cow::Borrowed(input)),
        Charset::Utf32Be => decode_utf32(input, true)?,
        Charset::Utf32Le => decode_utf32(input, false)?,
        Charset::EucKr => decode_legacy(EUC_KR, input),
        Charset::ShiftJis => decode_legacy(SHIFT_JIS, input),
        Charset::Other(label) => {
            log::warn!("Unknown encoding: {}, decoding as Shift_JIS", label);
            decode_legacy(SHIFT_JIS, input)
        }
    };
    Ok(Cow::Owned(decoded))
}

fn decode_legacy(encoding: &'static Encoding, input: &[u8]) -> Vec<u8> {
    let (text, had_errors) = encoding.decode_without_bom_handling(input);
    if had_errors {
        log::debug!(
            "Replaced undecodable sequences while decoding {}",
            encoding.name()
        );
    }
    text.into_owned().into_bytes()
}

fn decode_utf32(input: &[u8], big_endian: bool) -> Result<Vec<u8>, EncodingError> {
    let (bom, charset) = if big_endian {
        (UTF32_BE_BOM, "UTF-32BE")
    } else {
        (UTF32_LE_BOM, "UTF-32LE")
    };
    let body = input.strip_prefix(&bom[..]).unwrap_or(input);

    let trailing = body.len() % 4;
    if trailing != 0 {
        return Err(EncodingError::Decoding {
            charset: charset.to_string(),
            message: format!("input ends with a truncated {trailing}-byte code unit"),
        });
    }

    let text: String = body
        .chunks_exact(4)
        .map(|unit| {
            let bytes = [unit[0], unit[1], unit[2], unit[3]];
            let scalar = if big_endian {
                u32::from_be_bytes(bytes)
            } else {
                u32::from_le_bytes(bytes)
            };
            char::from_u32(scalar).unwrap_or(char::REPLACEMENT_CHARACTER)
        })
        .collect();
    Ok(text.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reports a fixed detection regardless of input.
    #[derive(Debug)]
    struct FixedDetector(Detection);

    impl CharsetDetector for FixedDetector {
        fn detect(&self, _input: &[u8]) -> Result<Detection, EncodingError> {
            Ok(self.0.clone())
        }
    }

    fn certain(label: &str) -> FixedDetector {
        FixedDetector(Detection::new(label, FULL_CONFIDENCE))
    }

    // "タイトル" in Shift_JIS.
    const SJIS_TITLE: &[u8] = &[0x83, 0x5E, 0x83, 0x43, 0x83, 0x67, 0x83, 0x8B];
    // "제목" in EUC-KR.
    const EUCKR_TITLE: &[u8] = &[0xC1, 0xA6, 0xB8, 0xF1];

    #[test]
    fn test_confident_utf8_is_returned_unchanged() {
        let input = "#TITLE caf\u{e9}\n".as_bytes();
        let output = normalize_with(&certain("UTF-8"), input).unwrap();
        assert!(matches!(output, Cow::Borrowed(_)));
        assert_eq!(&*output, input);
    }

    #[test]
    fn test_confident_euc_kr_uses_euc_kr_decoder() {
        let output = normalize_with(&certain("EUC-KR"), EUCKR_TITLE).unwrap();
        assert_eq!(std::str::from_utf8(&output).unwrap(), "제목");
    }

    #[test]
    fn test_confident_shift_jis_uses_shift_jis_decoder() {
        let output = normalize_with(&certain("Shift_JIS"), SJIS_TITLE).unwrap();
        assert_eq!(std::str::from_utf8(&output).unwrap(), "タイトル");
    }

    #[test]
    fn test_unknown_confident_label_falls_back_to_shift_jis() {
        let output = normalize_with(&certain("windows-1252"), SJIS_TITLE).unwrap();
        assert_eq!(std::str::from_utf8(&output).unwrap(), "タイトル");
    }

    #[test]
    fn test_low_confidence_ignores_label() {
        // Labelled EUC-KR, but not certain: must be decoded as Shift_JIS.
        let detector = FixedDetector(Detection::new("EUC-KR", 99));
        let output = normalize_with(&detector, SJIS_TITLE).unwrap();
        assert_eq!(std::str::from_utf8(&output).unwrap(), "タイトル");
    }

    #[test]
    fn test_out_of_range_confidence_is_not_trusted() {
        assert!(!Detection::new("EUC-KR", 101).is_certain());
        let detector = FixedDetector(Detection::new("EUC-KR", 101));
        let output = normalize_with(&detector, SJIS_TITLE).unwrap();
        assert_eq!(std::str::from_utf8(&output).unwrap(), "タイトル");
    }

    #[test]
    fn test_low_confidence_utf8_label_is_not_trusted() {
        let detector = FixedDetector(Detection::new("UTF-8", 50));
        let output = normalize_with(&detector, SJIS_TITLE).unwrap();
        assert!(matches!(output, Cow::Owned(_)));
        assert_eq!(std::str::from_utf8(&output).unwrap(), "タイトル");
    }

    #[test]
    fn test_utf32_decoders_strip_bom() {
        let mut be = UTF32_BE_BOM.to_vec();
        let mut le = UTF32_LE_BOM.to_vec();
        for c in "#TITLE 曲".chars() {
            be.extend_from_slice(&u32::from(c).to_be_bytes());
            le.extend_from_slice(&u32::from(c).to_le_bytes());
        }
        let be_out = normalize_with(&certain("UTF-32BE"), &be).unwrap();
        let le_out = normalize_with(&certain("UTF-32LE"), &le).unwrap();
        assert_eq!(std::str::from_utf8(&be_out).unwrap(), "#TITLE 曲");
        assert_eq!(std::str::from_utf8(&le_out).unwrap(), "#TITLE 曲");
    }

    #[test]
    fn test_utf32_invalid_scalar_is_replaced() {
        let input = [0x00, 0x00, 0x11, 0x00, 0x41, 0x00, 0x00, 0x00];
        let output = normalize_with(&certain("UTF-32LE"), &input).unwrap();
        assert_eq!(std::str::from_utf8(&output).unwrap(), "\u{FFFD}A");
    }

    #[test]
    fn test_utf32_truncated_input_is_a_decoding_error() {
        let input = [0x41, 0x00, 0x00, 0x00, 0x42];
        let err = normalize_with(&certain("UTF-32LE"), &input).unwrap_err();
        assert!(matches!(err, EncodingError::Decoding { .. }));
    }

    #[test]
    fn test_invalid_shift_jis_is_best_effort() {
        let output = normalize_with(&certain("Shift_JIS"), &[0x41, 0x81]).unwrap();
        let text = std::str::from_utf8(&output).unwrap();
        assert!(text.starts_with('A'));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_heuristic_detects_utf8() {
        let detection = HeuristicDetector.detect("#ARTIST 작곡가".as_bytes()).unwrap();
        assert_eq!(detection, Detection::new("UTF-8", FULL_CONFIDENCE));
    }

    #[test]
    fn test_heuristic_detects_utf32_boms() {
        let be = [0x00, 0x00, 0xFE, 0xFF, 0x00, 0x00, 0x00, 0x41];
        let le = [0xFF, 0xFE, 0x00, 0x00, 0x41, 0x00, 0x00, 0x00];
        assert_eq!(HeuristicDetector.detect(&be).unwrap().charset, "UTF-32BE");
        assert_eq!(HeuristicDetector.detect(&le).unwrap().charset, "UTF-32LE");
    }

    #[test]
    fn test_heuristic_rejects_empty_input() {
        let err = HeuristicDetector.detect(&[]).unwrap_err();
        assert!(matches!(err, EncodingError::Detection(_)));
    }

    #[test]
    fn test_normalize_legacy_bytes_produces_utf8() {
        let mut input = b"#TITLE ".to_vec();
        input.extend_from_slice(SJIS_TITLE);
        let output = normalize(&input).unwrap();
        assert!(std::str::from_utf8(&output).is_ok());
    }

    #[test]
    fn test_charset_from_label() {
        assert_eq!(Charset::from_label("shift_jis"), Charset::ShiftJis);
        assert_eq!(Charset::from_label("EUC-KR"), Charset::EucKr);
        assert_eq!(
            Charset::from_label("GBK"),
            Charset::Other("GBK".to_string())
        );
    }
}
