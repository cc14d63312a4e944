//! `@mention` extraction from raw message text

use regex::Regex;
use std::sync::LazyLock;

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    // \w is Unicode-aware: letters, digits and underscore
    Regex::new(r"@(\w+)").expect("mention pattern is valid")
});

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+$").expect("name pattern is valid"));

/// Whether `name` can be written as a whole `@mention` token
pub fn is_mentionable(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// Extract lowercase mention tokens in order of appearance.
///
/// Duplicates are kept; the selector only cares whether a name appears.
pub fn parse_mentions(text: &str) -> Vec<String> {
    MENTION_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_lowercase())
        .collect()
}
