//! Error types for fetch operations

use std::path::PathBuf;
use thiserror::Error;

pub type FetchResult<T> = Result<T, FetchError>;

/// How a failed run is reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    CredentialsMissing,
    CredentialsIncomplete,
    Other,
}

#[derive(Error, Debug)]
pub enum FetchError {
    /// No credentials could be resolved at all
    #[error("AWS credentials not found")]
    CredentialsNotFound,

    /// Credentials were found but are only partially configured
    #[error("incomplete AWS credentials: {0}")]
    CredentialsIncomplete(String),

    /// A listing page came back without any objects
    #[error("no objects found under prefix '{0}'")]
    NoObjects(String),

    /// The object key would land outside of the local folder
    #[error("object key '{0}' does not map to a path inside the local folder")]
    UnsafeKey(String),

    #[error("io error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any error returned by the storage service or the credential provider
    #[error("S3 error: {0}")]
    S3(String),
}

impl FetchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FetchError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::CredentialsNotFound => FailureKind::CredentialsMissing,
            FetchError::CredentialsIncomplete(_) => FailureKind::CredentialsIncomplete,
            _ => FailureKind::Other,
        }
    }

    /// The line printed to the user when a run ends with this error.
    pub fn report_line(&self) -> String {
        match self {
            FetchError::CredentialsNotFound => "Error: AWS credentials not found.".to_string(),
            FetchError::CredentialsIncomplete(_) => {
                "Error: Incomplete AWS credentials.".to_string()
            }
            FetchError::NoObjects(_) => "No files found with the given prefix.".to_string(),
            other => format!("An unexpected error occurred: {}", other),
        }
    }
}
