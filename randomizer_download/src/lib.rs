mod decode;
mod error;
mod fetch;

pub use decode::*;
pub use error::{Error, Result};
pub use fetch::*;

/// Raw bytes of a downloaded image, with the content type the server reported.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub url: String,
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}
