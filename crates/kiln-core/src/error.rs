use thiserror::Error;

/// Failure talking to the CI system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CiError {
    #[error("not found in CI system: {0}")]
    NotFound(String),
    #[error("CI request failed: {0}")]
    Transport(String),
    #[error("unexpected CI response: {0}")]
    InvalidResponse(String),
}

/// Failure reported by a cloud provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The node does not exist at the provider (already destroyed or never created).
    #[error("node not found at provider: {0}")]
    NodeNotFound(String),
    /// The requested image/size is not offered by the provider.
    #[error("provider configuration mismatch: {0}")]
    ConfigMismatch(String),
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("provider rejected request: {0}")]
    Rejected(String),
}

/// Failure reported by the node registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("node not tracked by registry: {0}")]
    NodeNotFound(String),
    #[error("no provider configured with name: {0}")]
    UnknownProvider(String),
    #[error("registry unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Failure parsing a label expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("empty label expression")]
    Empty,
    #[error("unexpected token: {0}")]
    Unexpected(String),
    #[error("unexpected end of label expression")]
    UnexpectedEnd,
    #[error("single '{0}' is not an operator")]
    SingleOperator(char),
    #[error("unterminated quoted label")]
    UnterminatedQuote,
    #[error("label expression nested deeper than {0} levels")]
    TooDeep(usize),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("supervisor error: {0}")]
    Supervisor(String),
}
