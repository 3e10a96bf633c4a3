use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("catalog API error: {0}")]
    Api(String),
    #[error("directory selection failed: {0}")]
    Dialog(String),
    #[error("{0}")]
    Patch(String),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
