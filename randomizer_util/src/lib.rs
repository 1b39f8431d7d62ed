pub mod datetime;
mod macros;
pub mod parsing;
pub mod pattern;
pub mod tag;

pub use parsing::{parse_filename, ParsingError};
pub use pattern::expand_alternatives;
pub use tag::{format_exclude_tag, format_include_tag, normalize_tag};
