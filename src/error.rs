use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("database not found: {path}")]
    DatabaseNotFound { path: PathBuf },

    #[error("assets root not found: {path}")]
    AssetsRootNotFound { path: PathBuf },

    #[error("assets root is not a directory: {path}")]
    AssetsRootNotDirectory { path: PathBuf },

    #[error("missing required option: {name}")]
    MissingOption { name: &'static str },

    #[error("invalid option {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("config file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("config parse error in {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("key store error in {path}: {reason}")]
    KeyStore { path: PathBuf, reason: String },

    #[error("audit sink error at {path}: {reason}")]
    Sink { path: PathBuf, reason: String },

    #[error("preview error at {path}: {reason}")]
    Preview { path: PathBuf, reason: String },

    #[error("worker error: {reason}")]
    Worker { reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl AuditError {
    /// Errors that abort the run before any file is processed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AuditError::DatabaseNotFound { .. }
                | AuditError::AssetsRootNotFound { .. }
                | AuditError::AssetsRootNotDirectory { .. }
                | AuditError::MissingOption { .. }
                | AuditError::InvalidOption { .. }
                | AuditError::ConfigNotFound { .. }
                | AuditError::ConfigParse { .. }
                | AuditError::KeyStore { .. }
        )
    }

    /// Process exit code for a fatal error.
    pub fn exit_code(&self) -> u8 {
        if self.is_configuration() {
            2
        } else {
            1
        }
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
