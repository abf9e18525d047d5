use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

pub const MAX_NAME_CHARS: usize = 200;
pub const FALLBACK_NAME: &str = "unknown";

static ILLEGAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\p{Cc}]"#).expect("illegal-char pattern compiles"));

/// Maps an arbitrary display name to a file name that is safe on every
/// platform we write to. Total: never fails, never returns an empty string.
pub fn sanitize(raw: &str) -> String {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    let replaced = ILLEGAL.replace_all(&decoded, "_");
    let trimmed = trim_edges(&replaced);
    let truncated: String = trimmed.chars().take(MAX_NAME_CHARS).collect();
    let name = trim_edges(&truncated);
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name.to_string()
    }
}

fn trim_edges(value: &str) -> &str {
    value.trim_matches(|ch| ch == '.' || ch == ' ')
}
