//! BPE token counting, used to populate usage stats on non-streaming
//! responses since no vendor exposes its own token count.
//!
//! Grounded on the original's embedded `tiktoken` table
//! (`tiktoken/tiktoken.go`) serving the same purpose; this crate uses the
//! published `tiktoken-rs` implementation of the same `cl100k_base` BPE
//! instead of vendoring the rank tables.

use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

fn encoder() -> &'static CoreBPE {
    static ENCODER: OnceLock<CoreBPE> = OnceLock::new();
    ENCODER.get_or_init(|| tiktoken_rs::cl100k_base().expect("cl100k_base ranks are bundled"))
}

pub fn count_tokens(text: &str) -> usize {
    encoder().encode_with_special_tokens(text).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_nonzero_for_nonempty_text() {
        assert!(count_tokens("Hello, world!") > 0);
    }

    #[test]
    fn empty_string_counts_to_zero() {
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn longer_text_counts_more_tokens() {
        let short = count_tokens("hi");
        let long = count_tokens("hi ".repeat(50).as_str());
        assert!(long > short);
    }
}
