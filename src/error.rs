use index_client::DriverError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Adapter error: {message}")]
    Adapter { message: String, permanent: bool },

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Specs parse error: {0}")]
    SpecsError(#[from] toml::de::Error),
}

pub type DxResult<T> = Result<T, DxError>;

impl DxError {
    pub fn transient(message: impl Into<String>) -> Self {
        DxError::Adapter {
            message: message.into(),
            permanent: false,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        DxError::Adapter {
            message: message.into(),
            permanent: true,
        }
    }

    /// Transient adapter failures drop one position; everything else ends the run.
    pub fn is_transient(&self) -> bool {
        matches!(self, DxError::Adapter { permanent: false, .. })
    }

    /// Process exit status for this error kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            DxError::Config(_) | DxError::SpecsError(_) => 2,
            DxError::Schema(_) => 3,
            DxError::Artifact(_) | DxError::IoError(_) | DxError::JsonError(_) => 4,
            DxError::Adapter { .. } => 5,
            DxError::Cancelled => 130,
        }
    }
}

impl From<DriverError> for DxError {
    fn from(err: DriverError) -> Self {
        DxError::Adapter {
            permanent: !err.is_transient(),
            message: err.to_string(),
        }
    }
}
