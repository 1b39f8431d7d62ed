pub mod controller;
pub mod error;
pub mod exclusion;
pub mod options;
pub mod post;
pub mod request;
pub mod resolution;
pub mod selection;
pub mod session;
pub mod source;
pub mod tags;
mod util;

#[cfg(test)]
mod test;

pub use controller::{AutoCycleController, CycleInput, CycleOutcome, CycleState, Preview};
pub use error::*;
pub use exclusion::{ExclusionSet, ExclusionStore};
pub use options::RandomizerOptions;
pub use post::{Post, SearchConstraints, SearchPage};
pub use request::{append_prompt, GenerationRequest, ProcessingMode};
pub use resolution::{fit, FitOptions};
pub use selection::{select, Selection};
pub use session::SessionState;
pub use source::{ImageFetcher, PostSource};
