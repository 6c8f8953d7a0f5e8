use thiserror::Error;

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Failure taxonomy for a sync or export run.
///
/// | Variant | Effect on the run |
/// |---------|-------------------|
/// | [`Transport`](SyncError::Transport) | fatal, the run halts, no retry |
/// | [`BatchWrite`](SyncError::BatchWrite) | fatal, the batch is rolled back |
/// | [`RecordWrite`](SyncError::RecordWrite) | counted, the batch continues |
/// | [`Authorization`](SyncError::Authorization) | the account's run never starts |
#[derive(Debug, Error)]
pub enum SyncError {
    /// Non-success response from the source.
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    /// Connection failure, timeout, or an undecodable response body.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("batch write to {table} failed: {message}")]
    BatchWrite { table: String, message: String },
    #[error("write of record {id} failed: {message}")]
    RecordWrite { id: String, message: String },
    #[error("authorization failed for {identifier}: {message}")]
    Authorization { identifier: String, message: String },
    #[error("store error: {0}")]
    Store(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl SyncError {
    /// Whether this error ends the current run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncError::RecordWrite { .. } | SyncError::InvalidRecord(_))
    }

    /// Whether this error came from the source side (status or network).
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Status { .. } | SyncError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_level_errors_are_not_fatal() {
        let err = SyncError::RecordWrite {
            id: "A1".into(),
            message: "disk full".into(),
        };
        assert!(!err.is_fatal());
        assert!(SyncError::Transport("reset".into()).is_fatal());
        assert!(SyncError::Status {
            status: 503,
            body: String::new()
        }
        .is_transport());
    }

    #[test]
    fn status_error_message_includes_body() {
        let err = SyncError::Status {
            status: 401,
            body: "token expired".into(),
        };
        assert_eq!(
            err.to_string(),
            "request failed with status 401: token expired"
        );
    }
}
