use thiserror::Error;

use url::Url;

#[derive(Debug, Clone, Error)]
pub enum ParsingError {
    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

type Result<T> = std::result::Result<T, ParsingError>;

/// Parse the filename from a URL.
pub fn parse_filename(url: &str) -> Result<String> {
    let url = Url::parse(url)?;
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or(ParsingError::InvalidUrl(url.to_string()))
}
