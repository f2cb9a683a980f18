//! Text processing utilities.

use regex::Regex;
use std::sync::OnceLock;

/// Check if content has meaningful text (not just whitespace).
pub fn has_meaningful_content(content: &str) -> bool {
    content.chars().any(|c| !c.is_whitespace())
}

/// Estimate the number of tokens in a text.
/// Uses a simple heuristic: ~4 characters per token on average.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
}

fn whitespace_pattern() -> &'static Regex {
    static WS: OnceLock<Regex> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"[ \t]+").expect("valid regex"))
}

/// Strip HTML/XML markup and collapse runs of horizontal whitespace.
///
/// Corpus rows exported from wiki pages often carry residual storage-format
/// markup and entity escapes; embeddings are better without them.
pub fn strip_markup(text: &str) -> String {
    let without_tags = tag_pattern().replace_all(text, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let collapsed = whitespace_pattern().replace_all(&decoded, " ");

    collapsed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
