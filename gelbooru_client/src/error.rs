use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Gelbooru returned 401 status code, you need to log in to your account")]
    Unauthorized,
    #[error("Gelbooru returned no post container")]
    NotFound,
    #[error("Gelbooru returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("Gelbooru returned a non-success status code {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Network Error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Cannot parse URL: {0}")]
    UrlError(#[from] url::ParseError),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::NetworkError(e) if e.is_timeout())
    }
}
