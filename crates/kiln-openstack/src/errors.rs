use thiserror::Error;

use kiln_core::ProviderError;

#[derive(Error, Debug)]
pub enum OpenStackError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("http request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("no {0} endpoint in service catalog")]
    MissingEndpoint(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    ConfigMismatch(String),
}

impl OpenStackError {
    pub fn status(&self) -> Option<u16> {
        match self {
            OpenStackError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<OpenStackError> for ProviderError {
    fn from(e: OpenStackError) -> Self {
        let rejected = matches!(e.status(), Some(status) if (400..500).contains(&status));
        match e {
            OpenStackError::NotFound(name) => ProviderError::NodeNotFound(name),
            OpenStackError::ConfigMismatch(msg) => ProviderError::ConfigMismatch(msg),
            other if rejected => ProviderError::Rejected(other.to_string()),
            other => ProviderError::Transport(other.to_string()),
        }
    }
}
