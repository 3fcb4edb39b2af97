//! Rough token estimate for display next to messages.

use std::sync::OnceLock;

use regex::Regex;

static CODE_BLOCK: OnceLock<Regex> = OnceLock::new();

fn count_code_blocks(text: &str) -> usize {
    CODE_BLOCK
        .get_or_init(|| Regex::new(r"(?s)```.*?```").expect("code fence pattern is valid"))
        .find_iter(text)
        .count()
}

/// Approximate token count.
///
/// words + half the punctuation + 3 per fenced code block + half the
/// newlines, each fractional part rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.trim().is_empty() {
        return 0;
    }

    let words = text.split_whitespace().count();
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    let code_blocks = count_code_blocks(text);
    let newlines = text.matches('\n').count();

    words + punctuation.div_ceil(2) + code_blocks * 3 + newlines.div_ceil(2)
}

/// `N` below a thousand, `N.Nk` above
pub fn format_token_count(count: usize) -> String {
    if count < 1000 {
        count.to_string()
    } else {
        format!("{:.1}k", count as f64 / 1000.0)
    }
}
