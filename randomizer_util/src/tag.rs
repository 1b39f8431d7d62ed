//! Tag canonicalization.
//!
//! Two spellings are in use: the comparison form produced by [`normalize_tag`],
//! used for exclusion matching, and the query form sent to the booru search API
//! produced by [`format_include_tag`] / [`format_exclude_tag`].

/// Canonical comparison form: trimmed, lowercase, spaces replaced with underscores.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase().replace(' ', "_")
}

/// Query form of an include tag. Inner whitespace runs collapse to one underscore.
pub fn format_include_tag(tag: &str) -> String {
    tag.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Query form of an exclude tag, prefixed with the negation marker.
/// Returns `None` when nothing is left after stripping.
pub fn format_exclude_tag(tag: &str) -> Option<String> {
    let tag = format_include_tag(tag.trim().trim_start_matches('-'));
    (!tag.is_empty()).then(|| format!("-{}", tag))
}
