use itertools::Itertools;

use crate::options::RandomizerOptions;

/// Human readable tag string for the prompt: `a, b, c`, with underscores turned into
/// spaces unless disabled or the tag is listed in `underscore_exclusions`.
pub fn display_tags(tags: &[String], options: &RandomizerOptions) -> String {
    tags.iter()
        .map(|tag| {
            if options.replace_underscores && !options.underscore_exclusions.contains(tag) {
                tag.replace('_', " ")
            } else {
                tag.clone()
            }
        })
        .join(", ")
}
