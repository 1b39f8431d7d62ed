use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

pub const LOGIN_MESSAGE: &str = "You need to log in to your gelbooru account";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not logged in: {0}")]
    NotLoggedIn(String),
    #[error("Couldn't find a post with the specified tags")]
    NoCandidate,
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Upstream returned status {status}")]
    Upstream { status: u16 },
    #[error("Network Error: {0}")]
    Network(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Cannot decode image: {0}")]
    ImageDecode(String),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether the retry ladder may try again after this error.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Error::NoCandidate
                | Error::MalformedResponse(_)
                | Error::Upstream { .. }
                | Error::Network(_)
                | Error::Timeout(_)
                | Error::ImageDecode(_)
        )
    }
}

impl From<gelbooru_client::Error> for Error {
    fn from(err: gelbooru_client::Error) -> Self {
        use gelbooru_client::Error as ClientError;
        if err.is_timeout() {
            return Error::Timeout(err.to_string());
        }
        match err {
            ClientError::Unauthorized => Error::NotLoggedIn(err.to_string()),
            ClientError::NotFound => Error::NoCandidate,
            ClientError::MalformedResponse(s) => Error::MalformedResponse(s),
            ClientError::Upstream { status, .. } => Error::Upstream { status },
            ClientError::NetworkError(e) => Error::Network(e.to_string()),
            ClientError::IOError(e) => Error::IOError(e),
            ClientError::UrlError(e) => Error::Other(e.into()),
        }
    }
}

impl From<randomizer_download::Error> for Error {
    fn from(err: randomizer_download::Error) -> Self {
        use randomizer_download::Error as DownloadError;
        if err.is_timeout() {
            return Error::Timeout(err.to_string());
        }
        match err {
            DownloadError::ImageError(e) => Error::ImageDecode(e.to_string()),
            DownloadError::IOError(e) => Error::ImageDecode(e.to_string()),
            DownloadError::Status(status) => Error::Upstream { status },
            DownloadError::IncompleteDownload(_) | DownloadError::NetworkError(_) | DownloadError::Timeout(_) => {
                Error::Network(err.to_string())
            }
            DownloadError::InvalidUrl(_) => Error::Network(err.to_string()),
        }
    }
}
