//! Error types for the public surface of the crate.
//!
//! Internally everything is `anyhow` (`Res<T>`). At the boundary of a public operation the error is
//! tagged with an `ErrorType` so that callers can decide what to do about it (retry an upstream
//! fetch, report a validation problem to a user, etc.) without parsing messages.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// The internal result type.
pub(crate) type Res<T> = anyhow::Result<T>;

/// The public result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies where a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// The transaction provider was unreachable or rejected the request.
    UpstreamFetch,
    /// A read or write against the ledger store failed, including conditional-check failures.
    Store,
    /// The request was missing something it needs, like an access token or a family id.
    Validation,
    /// The configuration directory or file is missing or invalid.
    Config,
    /// Anything else.
    Internal,
}

serde_plain::derive_display_from_serialize!(ErrorType);
serde_plain::derive_fromstr_from_deserialize!(ErrorType);

/// An error returned by a public operation.
pub struct Error {
    error_type: ErrorType,
    inner: anyhow::Error,
}

impl Error {
    pub(crate) fn new(error_type: ErrorType, inner: anyhow::Error) -> Self {
        Self { error_type, inner }
    }

    /// Creates a `Validation` error with `message`.
    pub(crate) fn validation(message: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self::new(ErrorType::Validation, anyhow::anyhow!(message))
    }

    /// What kind of failure this is.
    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    /// True when a conditional update lost a race against another writer.
    pub fn is_conflict(&self) -> bool {
        self.inner.chain().any(|e| e.is::<StoreConflict>())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {:?}", self.error_type, self.inner)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.inner)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

/// Converts an internal `Res<T>` into a public `Result<T>` by tagging it with an `ErrorType`.
pub(crate) trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T> IntoResult<T> for Res<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|inner| Error::new(error_type, inner))
    }
}

/// Raised by the store when a conditional update finds that the record changed underneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConflict {
    pub(crate) table: &'static str,
    pub(crate) key: String,
}

impl Display for StoreConflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Conditional update of {} record '{}' failed because it was modified concurrently",
            self.table, self.key
        )
    }
}

impl std::error::Error for StoreConflict {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_conflict_survives_context() {
        let res: Res<()> = Err(anyhow::Error::new(StoreConflict {
            table: "budget",
            key: "fam/2024-03".into(),
        }))
        .context("Unable to fold month");
        let err = res.pub_result(ErrorType::Store).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.error_type(), ErrorType::Store);
        assert!(err.to_string().contains("modified concurrently"));
    }

    #[test]
    fn test_source_starts_at_outermost_context() {
        use std::error::Error as _;
        let res: Res<()> = Err(anyhow::anyhow!("disk full")).context("Unable to write budget");
        let err = res.pub_result(ErrorType::Store).unwrap_err();
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "Unable to write budget");
        assert_eq!(source.source().unwrap().to_string(), "disk full");
    }

    #[test]
    fn test_error_type_display() {
        assert_eq!(ErrorType::UpstreamFetch.to_string(), "upstream_fetch");
        let e = Error::validation("No access token");
        assert_eq!(e.error_type(), ErrorType::Validation);
        assert!(!e.is_conflict());
    }
}
