//! Decoding of raw tool output lines.
//!
//! Build tools on Chinese-locale Windows hosts write GBK rather than UTF-8.
//! Decoding never fails: undecodable bytes become U+FFFD.

use std::borrow::Cow;

use encoding_rs::GBK;

/// Decode one raw output line, stripping trailing whitespace and line endings.
pub fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    let decoded = match std::str::from_utf8(raw) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => GBK.decode_without_bom_handling(raw).0,
    };

    match decoded {
        Cow::Borrowed(text) => Cow::Borrowed(text.trim_end()),
        Cow::Owned(text) => {
            let trimmed = text.trim_end();
            if trimmed.len() == text.len() {
                Cow::Owned(text)
            } else {
                Cow::Owned(trimmed.to_string())
            }
        }
    }
}
