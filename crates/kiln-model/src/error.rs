use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("node type name must not be empty")]
    EmptyName,
    #[error("node type declared more than once: {0}")]
    DuplicateNodeType(String),
    #[error("node type {0} does not name a provider")]
    EmptyProvider(String),
    #[error("boot script of node type {node} has no {placeholder} placeholder")]
    MissingScriptPlaceholder {
        node: String,
        placeholder: &'static str,
    },
}
