//! Text encodings: strict decoding, report encoding, and pluggable detection.

use std::fmt;

use encoding_rs::{DecoderResult, Encoding, REPLACEMENT, UTF_16BE, UTF_16LE, UTF_8};

use crate::error::{Result, WcError};

/// Default number of leading bytes inspected when detecting an encoding.
pub const DEFAULT_SAMPLE_SIZE: usize = 64 * 1024;

/// Encoding used to decode source lines and to encode the written report.
///
/// Only encodings in which the line feed byte `0x0A` never occurs inside a multi-byte character
/// are accepted, which is what allows byte ranges to be realigned on line boundaries.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TextEncoding {
    inner: &'static Encoding,
}

impl TextEncoding {
    /// UTF-8.
    #[must_use]
    pub fn utf8() -> Self {
        Self { inner: UTF_8 }
    }

    /// Resolves a WHATWG encoding label such as `utf-8`, `gbk`, or `shift_jis`.
    pub fn for_label(label: &str) -> Result<Self> {
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| WcError::UnknownEncoding(label.to_string()))?;
        Self::from_encoding(encoding)
    }

    /// Wraps an `encoding_rs` encoding, rejecting encodings that are not line-feed safe.
    pub fn from_encoding(encoding: &'static Encoding) -> Result<Self> {
        if encoding == UTF_16LE || encoding == UTF_16BE || encoding == REPLACEMENT {
            return Err(WcError::InvalidConfig(format!(
                "encoding {} cannot be split on line boundaries",
                encoding.name()
            )));
        }
        Ok(Self { inner: encoding })
    }

    /// Canonical name of the encoding.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    /// Decodes `bytes` into `out`, replacing its previous contents.
    ///
    /// Malformed input is an error; `base_offset` is the absolute position of `bytes[0]` in the
    /// source and is used to report where decoding failed.  No BOM sniffing takes place.
    pub fn decode_into(&self, bytes: &[u8], base_offset: u64, out: &mut String) -> Result<()> {
        out.clear();
        let mut decoder = self.inner.new_decoder_without_bom_handling();
        let capacity = decoder
            .max_utf8_buffer_length_without_replacement(bytes.len())
            .ok_or_else(|| WcError::InvalidConfig("input too large to decode".into()))?;
        out.reserve(capacity);
        let (result, read) = decoder.decode_to_string_without_replacement(bytes, out, true);
        match result {
            DecoderResult::InputEmpty => Ok(()),
            DecoderResult::Malformed(bad, consumed_after) => {
                let start = read.saturating_sub(usize::from(bad) + usize::from(consumed_after));
                Err(WcError::Decode {
                    encoding: self.name().to_string(),
                    offset: base_offset + start as u64,
                })
            }
            DecoderResult::OutputFull => Err(WcError::Decode {
                encoding: self.name().to_string(),
                offset: base_offset + read as u64,
            }),
        }
    }

    /// Decodes `bytes` into a new string.
    pub fn decode(&self, bytes: &[u8], base_offset: u64) -> Result<String> {
        let mut text = String::new();
        self.decode_into(bytes, base_offset, &mut text)?;
        Ok(text)
    }

    /// Encodes `text` for writing, failing when any character is unmappable.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        let (bytes, _, had_errors) = self.inner.encode(text);
        if had_errors {
            return Err(WcError::Encode {
                encoding: self.name().to_string(),
            });
        }
        Ok(bytes.into_owned())
    }
}

impl Default for TextEncoding {
    fn default() -> Self {
        Self::utf8()
    }
}

impl fmt::Debug for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextEncoding").field(&self.name()).finish()
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Strategy that picks an encoding from a leading sample of the source.
pub trait EncodingDetector: Send + Sync {
    /// Guesses the encoding of `sample`; `complete` is `true` when the sample is the whole file.
    fn detect(&self, sample: &[u8], complete: bool) -> TextEncoding;
}

/// Default detector: UTF-8 when the sample is valid UTF-8, otherwise the `chardetng` guess.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleDetector;

impl EncodingDetector for SampleDetector {
    fn detect(&self, sample: &[u8], complete: bool) -> TextEncoding {
        if is_utf8_sample(sample, complete) {
            return TextEncoding::utf8();
        }
        let mut detector = chardetng::EncodingDetector::new();
        detector.feed(sample, complete);
        let guess = detector.guess(None, true);
        TextEncoding::from_encoding(guess).unwrap_or_default()
    }
}

/// Detector that ignores the sample and always answers with one encoding.
#[derive(Debug, Clone, Copy)]
pub struct FixedDetector(pub TextEncoding);

impl EncodingDetector for FixedDetector {
    fn detect(&self, _sample: &[u8], _complete: bool) -> TextEncoding {
        self.0
    }
}

fn is_utf8_sample(sample: &[u8], complete: bool) -> bool {
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        // A truncated sample may end in the middle of a character.
        Err(err) => !complete && err.error_len().is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_labels_case_insensitively() {
        assert_eq!(TextEncoding::for_label("UTF8").unwrap().name(), "UTF-8");
        assert_eq!(TextEncoding::for_label(" gbk ").unwrap().name(), "GBK");
        assert_eq!(TextEncoding::for_label("shift_jis").unwrap().name(), "Shift_JIS");
    }

    #[test]
    fn rejects_unknown_and_line_unsafe_labels() {
        assert!(matches!(
            TextEncoding::for_label("klingon"),
            Err(WcError::UnknownEncoding(label)) if label == "klingon"
        ));
        assert!(matches!(
            TextEncoding::for_label("utf-16le"),
            Err(WcError::InvalidConfig(_))
        ));
    }

    #[test]
    fn decode_reports_absolute_offset_of_malformed_byte() {
        let bytes = b"ab\xffcd";
        let err = TextEncoding::utf8()
            .decode(bytes, 100)
            .expect_err("0xFF is not valid UTF-8");
        match err {
            WcError::Decode { encoding, offset } => {
                assert_eq!(encoding, "UTF-8");
                assert_eq!(offset, 102);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn gbk_round_trip() {
        let gbk = TextEncoding::for_label("gbk").unwrap();
        let bytes = gbk.encode("你好\n").unwrap();
        assert_eq!(bytes, vec![0xC4, 0xE3, 0xBA, 0xC3, b'\n']);
        assert_eq!(gbk.decode(&bytes, 0).unwrap(), "你好\n");
    }

    #[test]
    fn encode_rejects_unmappable_text() {
        let latin = TextEncoding::for_label("windows-1252").unwrap();
        assert!(matches!(latin.encode("你"), Err(WcError::Encode { .. })));
    }

    #[test]
    fn sample_detector_prefers_utf8() {
        let detector = SampleDetector;
        assert_eq!(detector.detect("她他".as_bytes(), true), TextEncoding::utf8());
        // Sample cut in the middle of a three byte character.
        let truncated = &"她他".as_bytes()[..4];
        assert_eq!(detector.detect(truncated, false), TextEncoding::utf8());
    }

    #[test]
    fn sample_detector_falls_back_to_chardetng() {
        let gbk = TextEncoding::for_label("gbk").unwrap();
        let text = "我们在这里统计每一个汉字出现的次数，然后按照频率从高到低输出结果。\n".repeat(20);
        let bytes = gbk.encode(&text).unwrap();
        let detected = SampleDetector.detect(&bytes, true);
        assert_ne!(detected, TextEncoding::utf8());
        assert_eq!(detected.decode(&bytes, 0).unwrap(), text);
    }

    #[test]
    fn fixed_detector_ignores_sample() {
        let gbk = TextEncoding::for_label("gbk").unwrap();
        assert_eq!(FixedDetector(gbk).detect(b"plain ascii", true), gbk);
    }
}
