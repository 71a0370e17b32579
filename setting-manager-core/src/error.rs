use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown setting '{0}'")]
    UnknownKey(String),

    #[error("setting '{name}' cannot be changed with role '{role}'")]
    AccessDenied { name: String, role: String },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("change subscriber for '{key}' failed: {reason}")]
    Subscriber { key: String, reason: String },
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    /// HTTP-equivalent status for boundary layers.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AccessDenied { .. } => 403,
            Self::UnknownKey(_) => 404,
            Self::Validation(_) => 422,
            Self::StorageUnavailable(_) => 503,
            Self::Lifecycle(_) | Self::Schema(_) | Self::Config(_) | Self::Subscriber { .. } => {
                500
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownKey(_) => "unknown_key",
            Self::AccessDenied { .. } => "access_denied",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::Lifecycle(_) => "lifecycle",
            Self::Schema(_) => "schema",
            Self::Validation(_) => "validation",
            Self::Config(_) => "config",
            Self::Subscriber { .. } => "subscriber",
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}
