//! Logging helpers: single-line escaping of user text, short hex previews of
//! rejected frames, and the `security` log target used for moderation.

use std::fmt::Write;

/// Log a moderation or authentication event on the `security` target.
macro_rules! sec_log {
    ($($arg:tt)*) => { log::warn!(target: "security", $($arg)*) };
}
pub(crate) use sec_log;

const MAX_PREVIEW: usize = 200;
const MAX_HEX_PREVIEW: usize = 32;

/// Escape user-supplied text so a log record stays on one line.
/// Long strings are cut at `MAX_PREVIEW` chars with an ellipsis.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Leading bytes of a frame as hex, for malformed-packet warnings.
pub fn hex_preview(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(MAX_HEX_PREVIEW * 2 + 16);
    for b in bytes.iter().take(MAX_HEX_PREVIEW) {
        let _ = write!(&mut out, "{b:02x}");
    }
    if bytes.len() > MAX_HEX_PREVIEW {
        let _ = write!(&mut out, "… ({} bytes)", bytes.len());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_newlines_and_controls() {
        assert_eq!(escape_log("a\nb\r\tc\u{1}"), "a\\nb\\r\\tc\\x01");
    }

    #[test]
    fn truncates_long_text() {
        let long = "x".repeat(500);
        let esc = escape_log(&long);
        assert!(esc.ends_with('…'));
        assert_eq!(esc.chars().count(), MAX_PREVIEW + 1);
    }

    #[test]
    fn hex_preview_caps_length() {
        assert_eq!(hex_preview(&[0x01, 0xAB]), "01ab");
        assert!(hex_preview(&[0u8; 100]).ends_with("(100 bytes)"));
    }
}
