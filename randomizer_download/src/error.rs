use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Network Error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Unexpected status {0}")]
    Status(u16),
    #[error("Timeout after {0} ms")]
    Timeout(u64),
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),
    #[error("Incomplete download: {0}")]
    IncompleteDownload(String),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::NetworkError(e) => e.is_timeout(),
            _ => false,
        }
    }
}
