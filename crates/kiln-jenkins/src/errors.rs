use thiserror::Error;

use kiln_core::CiError;

#[derive(Error, Debug)]
pub enum JenkinsError {
    #[error("invalid Jenkins url: {0}")]
    InvalidUrl(String),

    #[error("http request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("invalid xml: {0}")]
    Xml(String),
}

impl From<JenkinsError> for CiError {
    fn from(e: JenkinsError) -> Self {
        match e {
            JenkinsError::NotFound(what) => CiError::NotFound(what),
            JenkinsError::Xml(msg) => CiError::InvalidResponse(msg),
            JenkinsError::HttpRequest(e) if e.is_decode() => CiError::InvalidResponse(e.to_string()),
            other => CiError::Transport(other.to_string()),
        }
    }
}
