use lazy_static::lazy_static;
use rand::seq::IndexedRandom;
use rand::Rng;
use regex::{Captures, Regex};

lazy_static! {
    /// A brace group with no nested braces and at least one `|`.
    static ref ALTERNATION: Regex = Regex::new(r"\{([^{}]*\|[^{}]*)\}").unwrap();
}

/// Replace every `{a|b|c}` group with one of its options, picked uniformly at random.
/// Options are trimmed and empty ones dropped; a group without options becomes empty.
/// Groups nested inside other braces are resolved one level only.
pub fn expand_alternatives(s: &str) -> String {
    expand_alternatives_with(s, &mut rand::rng())
}

pub fn expand_alternatives_with<R: Rng + ?Sized>(s: &str, rng: &mut R) -> String {
    if !s.contains('{') {
        return s.to_string();
    }
    ALTERNATION
        .replace_all(s, |caps: &Captures| {
            let options = caps[1]
                .split('|')
                .map(str::trim)
                .filter(|option| !option.is_empty())
                .collect::<Vec<_>>();
            options.choose(&mut *rng).map(|option| option.to_string()).unwrap_or_default()
        })
        .into_owned()
}
