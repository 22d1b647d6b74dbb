use std::fmt;

/// The single flat error taxonomy shared by every component in this crate.
///
/// Every variant carries a short human-readable message. There is no
/// string-keyed "domain" the way GLib's `GError` works: callers match on the
/// variant, not on the message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("internal error: {0}")]
    Internal(String),
    #[error("operation not supported: {0}")]
    NoSupport(String),
    #[error("no data: {0}")]
    NoData(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already locked")]
    AlreadyLocked,
    #[error("not locked")]
    NotLocked,
    #[error("busy")]
    Busy,
    #[error("instrument must be placed in calibration position")]
    RequiredPositionCalibrate,
    #[error("instrument must be placed in surface position")]
    RequiredPositionSurface,
    #[error("invalid input: {0}")]
    InputInvalid(String),
    #[error("invalid file: {0}")]
    FileInvalid(String),
    #[error("failed to open: {0}")]
    FailedToOpen(String),
    #[error("failed to read: {0}")]
    FailedToRead(String),
    #[error("failed to write: {0}")]
    FailedToWrite(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("singular matrix")]
    Singular,
    #[error("interpolation x values are not strictly increasing")]
    NotMonotone,
    #[error("value out of range: {0}")]
    OutOfRange(String),
    #[error("cancelled")]
    Cancelled,
    #[error("invalid locale string: {0}")]
    InvalidLocale(String),
    #[error("profiling inhibited: {0}")]
    ProfilingInhibit(String),
}

/// `Result` specialized to [`ErrorKind`], the crate-wide convention.
pub type Result<T> = std::result::Result<T, ErrorKind>;

impl From<std::io::Error> for ErrorKind {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind as IoKind;
        match e.kind() {
            IoKind::NotFound => ErrorKind::FailedToOpen(e.to_string()),
            _ => ErrorKind::FailedToRead(e.to_string()),
        }
    }
}

impl From<csv::Error> for ErrorKind {
    fn from(e: csv::Error) -> Self {
        ErrorKind::InputInvalid(e.to_string())
    }
}

/// Wrapper that pairs an error with the verb a CLI shim would print it with,
/// e.g. `"Failed to calibrate: singular matrix"`.
pub struct ErrorKindVerbose<'a>(pub &'a str, pub &'a ErrorKind);

impl fmt::Display for ErrorKindVerbose<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to {}: {}", self.0, self.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_message_has_no_stack_trace() {
        let e = ErrorKind::Singular;
        let msg = ErrorKindVerbose("calibrate", &e).to_string();
        assert_eq!(msg, "Failed to calibrate: singular matrix");
        assert!(!msg.contains('\n'));
    }
}
