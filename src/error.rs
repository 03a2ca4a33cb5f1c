use thiserror::Error;

/// Errors returned by this crate.
///
/// A [`GuardViolation`](Error::GuardViolation) means that the calling code forgot to
/// acquire a lock. It is a bug in the caller, not a transient condition, and should be
/// fixed rather than retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required argument was absent.
    #[error("missing required argument `{name}`")]
    MissingArgument { name: &'static str },

    /// An argument was present but not acceptable.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// A guarded value was accessed without holding one of its guardians.
    #[error("resource accessed without holding its guardian lock `{lock}`")]
    GuardViolation { lock: String },

    /// A guarded value was accessed mutably from inside another access to it.
    #[error("guarded value is already being accessed by the current thread")]
    ReentrantAccess,
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
