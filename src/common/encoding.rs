//! Lenient base64 for tracker payloads.
//!
//! Trackers emit both the standard and URL-safe alphabets, often without
//! padding, and form encoding turns `+` into a space on the way in.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Decodes base64 in either alphabet, with or without padding, ignoring
/// embedded whitespace.
pub fn decode_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\t'))
        .map(|c| if c == ' ' { '+' } else { c })
        .collect();

    if cleaned.contains(['-', '_']) {
        URL_SAFE_LENIENT.decode(cleaned.as_bytes())
    } else {
        STANDARD_LENIENT.decode(cleaned.as_bytes())
    }
}

/// Decodes base64 and requires the result to be UTF-8 text.
pub fn decode_base64_text(input: &str) -> Option<String> {
    decode_base64(input).ok().and_then(|bytes| String::from_utf8(bytes).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_and_url_safe_alphabets() {
        // {"a":"??>"} encodes with '+'/'/' in standard and '-'/'_' in URL-safe
        let standard = "eyJhIjoiPz8+In0=";
        let url_safe = "eyJhIjoiPz8-In0";
        assert_eq!(decode_base64_text(standard).as_deref(), Some(r#"{"a":"??>"}"#));
        assert_eq!(decode_base64_text(url_safe).as_deref(), Some(r#"{"a":"??>"}"#));
    }

    #[test]
    fn test_padding_and_whitespace_are_ignored() {
        assert_eq!(decode_base64("aGVsbG8").unwrap(), b"hello");
        assert_eq!(decode_base64("aGVs\nbG8=\r\n").unwrap(), b"hello");
    }

    #[test]
    fn test_space_is_read_as_plus() {
        assert_eq!(decode_base64("eyJhIjoiPz8 In0=").unwrap(), br#"{"a":"??>"}"#);
    }

    #[test]
    fn test_invalid_input() {
        assert!(decode_base64("not*base64!").is_err());
    }
}
