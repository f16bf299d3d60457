use chardetng::EncodingDetector;
use encoding_rs::Encoding;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("snapshot bytes are not valid {encoding}")]
pub struct DecodeError {
    pub encoding: String,
}

/// Decode raw snapshot bytes into UTF-8 using: BOM -> Content-Type charset -> chardetng fallback.
pub fn decode_text(bytes: &[u8], content_type: Option<&str>) -> Result<DecodedText, DecodeError> {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(label) = content_type.and_then(extract_charset) {
        if let Some(enc) = Encoding::for_label(label.as_bytes()) {
            return decode_with(bytes, enc);
        }
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(None, true);
    decode_with(bytes, enc)
}

/// Like [`decode_text`] but substitutes U+FFFD for undecodable input instead of failing.
pub fn decode_text_lossy(bytes: &[u8], content_type: Option<&str>) -> String {
    match decode_text(bytes, content_type) {
        Ok(decoded) => decoded.text,
        Err(err) => {
            watch_logging::watch_debug!(
                "snapshot text is not valid {}; decoding lossily",
                err.encoding
            );
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .filter_map(|part| {
            let part = part.trim();
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim_matches([' ', '"', '\''].as_ref()))
        })
        .next()
        .map(|s| s.to_string())
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> Result<DecodedText, DecodeError> {
    let (text, _, had_errors) = enc.decode(bytes);
    if had_errors {
        return Err(DecodeError {
            encoding: enc.name().to_string(),
        });
    }
    Ok(DecodedText {
        text: text.into_owned(),
        encoding_label: enc.name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_from_content_type_wins_over_detection() {
        // "café" in windows-1252
        let bytes = b"caf\xe9";
        let decoded = decode_text(bytes, Some("text/plain; Charset=\"windows-1252\"")).unwrap();
        assert_eq!(decoded.text, "café");
        assert_eq!(decoded.encoding_label, "windows-1252");
    }

    #[test]
    fn bom_is_honoured() {
        let bytes = b"\xef\xbb\xbflead-1";
        let decoded = decode_text(bytes, Some("text/plain; charset=latin1")).unwrap();
        assert_eq!(decoded.text, "lead-1");
        assert_eq!(decoded.encoding_label, "UTF-8");
    }

    #[test]
    fn invalid_utf8_falls_back_to_lossy() {
        let text = decode_text_lossy(b"lead-1 \xff\xfe tail", Some("text/plain; charset=utf-8"));
        assert!(text.starts_with("lead-1 "));
        assert!(text.ends_with(" tail"));
    }

    #[test]
    fn invalid_bytes_report_the_encoding() {
        let err = decode_text(b"lead-1 \xff", Some("text/plain; charset=utf-8")).unwrap_err();
        assert_eq!(err.encoding, "UTF-8");
        assert_eq!(err.to_string(), "snapshot bytes are not valid UTF-8");
    }
}
