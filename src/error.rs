use serde::Serialize;
use thiserror::Error;

/// Authentication / session failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("authentication service unreachable: {0}")]
    NetworkUnavailable(String),
    #[error("not logged in")]
    Unauthenticated,
}

/// Version metadata fetch failures.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("version service unreachable: {0}")]
    Unreachable(String),
    #[error("malformed version response: {0}")]
    MalformedResponse(String),
}

/// Download transfer failures. `Cancelled` is a distinct terminal outcome,
/// not a fault: the state machine maps it back to `Idle`, never `Failed`.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download interrupted: {0}")]
    NetworkInterrupted(String),
    #[error("download I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("download cancelled")]
    Cancelled,
}

/// Content verification failures. A mismatch means the payload is corrupt
/// or tampered; it must never be installed.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Game process start failures.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to start game process: {0}")]
    ProcessSpawnFailed(#[source] std::io::Error),
}

/// Umbrella error for every launcher action. Component failures are caught
/// at the state-machine boundary and converted into `Failed(ErrorInfo)`;
/// the original error is still returned to the caller for diagnostics.
#[derive(Debug, Error)]
pub enum LauncherError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("launcher state could not be persisted: {0}")]
    Persistence(String),
}

impl LauncherError {
    /// Stable machine-readable kind label, used in `ErrorInfo` and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LauncherError::Auth(AuthError::InvalidCredentials) => "auth/invalid-credentials",
            LauncherError::Auth(AuthError::NetworkUnavailable(_)) => "auth/network-unavailable",
            LauncherError::Auth(AuthError::Unauthenticated) => "auth/unauthenticated",
            LauncherError::Version(VersionError::Unreachable(_)) => "version/unreachable",
            LauncherError::Version(VersionError::MalformedResponse(_)) => {
                "version/malformed-response"
            }
            LauncherError::Download(DownloadError::NetworkInterrupted(_)) => {
                "download/network-interrupted"
            }
            LauncherError::Download(DownloadError::Io(_)) => "download/io",
            LauncherError::Download(DownloadError::Cancelled) => "download/cancelled",
            LauncherError::Integrity(IntegrityError::ChecksumMismatch { .. }) => {
                "integrity/checksum-mismatch"
            }
            LauncherError::Launch(LaunchError::ProcessSpawnFailed(_)) => "launch/spawn-failed",
            LauncherError::Persistence(_) => "persistence",
        }
    }

    /// Whether a plain user retry (`Failed -> Idle -> retry`) is sensible.
    /// Checksum mismatches and rejected credentials need a changed input,
    /// not a repeat.
    pub fn user_retryable(&self) -> bool {
        !matches!(
            self,
            LauncherError::Auth(AuthError::InvalidCredentials)
                | LauncherError::Integrity(IntegrityError::ChecksumMismatch { .. })
        )
    }
}

/// Human-readable failure carried by `LauncherState::Failed`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&LauncherError> for ErrorInfo {
    fn from(err: &LauncherError) -> Self {
        ErrorInfo {
            kind: err.kind().to_string(),
            message: err.to_string(),
            retryable: err.user_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_info_carries_kind_and_retryability() {
        let err = LauncherError::from(AuthError::InvalidCredentials);
        let info = ErrorInfo::from(&err);
        assert_eq!(info.kind, "auth/invalid-credentials");
        assert!(!info.retryable);

        let err = LauncherError::from(DownloadError::NetworkInterrupted("reset".into()));
        let info = ErrorInfo::from(&err);
        assert_eq!(info.kind, "download/network-interrupted");
        assert!(info.retryable);
    }

    #[test]
    fn checksum_mismatch_is_not_retryable() {
        let err = LauncherError::from(IntegrityError::ChecksumMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        });
        assert!(!err.user_retryable());
    }
}
