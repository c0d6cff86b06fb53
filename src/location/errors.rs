//! Location parsing errors

use thiserror::Error;

/// Result type for location parsing
pub type LocationResult<T> = Result<T, LocationError>;

/// Errors raised while parsing a `<location>` argument
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location is required.")]
    Empty,

    #[error("Bucket name is required.")]
    BucketRequired,

    #[error("Bucket key is required (filename).")]
    KeyRequired,

    #[error("Invalid bucket name \"{0}\": Bucket name must match the regex \"^[a-zA-Z0-9.\\-_]{{1,255}}$\"")]
    InvalidBucketName(String),

    #[error("{0} is not a supported scheme.")]
    UnsupportedScheme(String),
}
