//! Small helpers shared across modules.

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Safely handles multi-byte UTF-8 (emoji, CJK, accented characters) by using
/// character boundaries instead of byte indices — used to bound long
/// prompts and vendor payloads before they go into a log line.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            // Trim trailing whitespace for cleaner output
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_ascii_no_truncation() {
        // ASCII string shorter than limit - no change
        assert_eq!(truncate_with_ellipsis("hello", 10), "hello");
        assert_eq!(truncate_with_ellipsis("hello world", 50), "hello world");
    }

    #[test]
    fn test_truncate_ascii_with_truncation() {
        // ASCII string longer than limit - truncates
        assert_eq!(truncate_with_ellipsis("hello world", 5), "hello...");
        assert_eq!(
            truncate_with_ellipsis("This is a long message", 10),
            "This is a..."
        );
    }

    #[test]
    fn test_truncate_empty_string() {
        assert_eq!(truncate_with_ellipsis("", 10), "");
    }

    #[test]
    fn test_truncate_at_exact_boundary() {
        // String exactly at boundary - no truncation
        assert_eq!(truncate_with_ellipsis("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_emoji_single() {
        // Single emoji (4 bytes) - should not panic
        let s = "🦀";
        assert_eq!(truncate_with_ellipsis(s, 10), s);
        assert_eq!(truncate_with_ellipsis(s, 1), s);
    }

    #[test]
    fn test_truncate_emoji_multiple() {
        // Multiple emoji - safe truncation at character boundary
        let s = "😀😀😀😀"; // 4 emoji, each 4 bytes = 16 bytes total
        assert_eq!(truncate_with_ellipsis(s, 2), "😀😀...");
        assert_eq!(truncate_with_ellipsis(s, 3), "😀😀😀...");
    }

    #[test]
    fn test_truncate_mixed_ascii_emoji() {
        // Mixed ASCII and emoji
        assert_eq!(truncate_with_ellipsis("Hello 🦀 World", 8), "Hello 🦀...");
        assert_eq!(truncate_with_ellipsis("Hi 😊", 10), "Hi 😊");
    }

    #[test]
    fn test_truncate_cjk_characters() {
        // CJK characters (Chinese - each is 3 bytes)
        let s = "这是一个测试消息用来触发崩溃的中文"; // 21 characters
        let result = truncate_with_ellipsis(s, 16);
        assert!(result.ends_with("..."));
        assert!(result.is_char_boundary(result.len() - 1));
    }

    #[test]
    fn test_truncate_accented_characters() {
        // Accented characters (2 bytes each in UTF-8)
        let s = "café résumé naïve";
        assert_eq!(truncate_with_ellipsis(s, 10), "café résum...");
    }

    #[test]
    fn test_truncate_unicode_edge_case() {
        // Mix of 1-byte, 2-byte, 3-byte, and 4-byte characters
        let s = "aé你好🦀"; // 1 + 1 + 2 + 2 + 4 bytes = 10 bytes, 5 chars
        assert_eq!(truncate_with_ellipsis(s, 3), "aé你...");
    }

    #[test]
    fn test_truncate_long_string() {
        // Long ASCII string
        let s = "a".repeat(200);
        let result = truncate_with_ellipsis(&s, 50);
        assert_eq!(result.len(), 53); // 50 + "..."
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_truncate_zero_max_chars() {
        // Edge case: max_chars = 0
        assert_eq!(truncate_with_ellipsis("hello", 0), "...");
    }
}

// ── Serial path allowlist ─────────────────────────────────────────────────────

/// Allowed serial device path prefixes — used as a fallback on platforms
/// that are not explicitly handled below, and referenced in error messages.
///
/// Shared between `hardware::serial` and `peripherals::serial` to keep the
/// allowlist consistent across transport implementations.
pub const ALLOWED_SERIAL_PATH_PREFIXES: &[&str] = &[
    "/dev/ttyACM",        // Linux USB CDC (Pico, Nucleo, etc.)
    "/dev/ttyUSB",        // Linux USB-serial (CH340, FTDI)
    "/dev/tty.usbmodem",  // macOS USB CDC
    "/dev/cu.usbmodem",   // macOS USB CDC (call-up)
    "/dev/tty.usbserial", // macOS FTDI
    "/dev/cu.usbserial",  // macOS FTDI (call-up)
    "COM",                // Windows
];

/// Check whether a serial device path is in the allowed set.
///
/// On Linux and macOS an absolute path is required and a per-platform regex
/// is applied so that only well-known USB-serial subordinate nodes are
/// accepted.  On Windows the `COM\d{1,3}` form is matched.  All other
/// platforms fall back to the prefix allowlist above.
pub fn is_serial_path_allowed(path: &str) -> bool {
    // ── Linux ─────────────────────────────────────────────────────────────
    #[cfg(target_os = "linux")]
    {
        use std::sync::OnceLock;
        if !std::path::Path::new(path).is_absolute() {
            return false;
        }
        static PAT: OnceLock<regex::Regex> = OnceLock::new();
        let re = PAT.get_or_init(|| {
            regex::Regex::new(r"^/dev/tty(ACM|USB|S|AMA|MFD)\d+$").expect("valid regex")
        });
        return re.is_match(path);
    }

    // ── macOS ─────────────────────────────────────────────────────────────
    #[cfg(target_os = "macos")]
    {
        use std::sync::OnceLock;
        if !std::path::Path::new(path).is_absolute() {
            return false;
        }
        static PAT: OnceLock<regex::Regex> = OnceLock::new();
        let re = PAT.get_or_init(|| {
            // Matches /dev/tty.usbmodem*, /dev/cu.usbmodem*,
            //         /dev/tty.usbserial*, /dev/cu.usbserial*
            regex::Regex::new(r"^/dev/(tty|cu)\.(usbmodem|usbserial)[^\x00/]*$")
                .expect("valid regex")
        });
        return re.is_match(path);
    }

    // ── Windows ───────────────────────────────────────────────────────────
    #[cfg(target_os = "windows")]
    {
        use std::sync::OnceLock;
        static PAT: OnceLock<regex::Regex> = OnceLock::new();
        let re = PAT.get_or_init(|| {
            regex::Regex::new(r"^COM\d{1,3}$").expect("valid regex")
        });
        return re.is_match(path);
    }

    // ── Fallback (other platforms) ────────────────────────────────────────
    // Reject unknown platforms rather than applying a too-permissive prefix
    // match.  If support is needed for a new platform, add a targeted branch
    // above.
    #[allow(unreachable_code)]
    false
}
