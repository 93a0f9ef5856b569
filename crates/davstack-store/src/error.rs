use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("`use_store` called outside of a `{context}` provider")]
    MissingProvider { context: String },
    #[error("unrecognized accessor operation `{op}` at `{path}`")]
    UnrecognizedOperation { op: String, path: String },
    #[error("no member named `{name}` at `{path}`")]
    UnknownMember { name: String, path: String },
    #[error("member `{name}` at `{path}` is not an action")]
    NotCallable { name: String, path: String },
    #[error("computed property `{name}` has no write function")]
    ReadOnlyComputed { name: String },
    #[error("invalid arguments for `{op}`: {reason}")]
    InvalidArguments { op: String, reason: String },
    #[error("state conversion failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Custom(String),
}

impl StoreError {
    /// Error raised from inside a user action.
    pub fn custom(message: impl Into<String>) -> Self {
        StoreError::Custom(message.into())
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
