use thiserror::Error;

/// Errors that can occur while handling backend credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required environment variable is missing.
    #[error("missing environment variable: {0}")]
    MissingEnvVar(String),

    /// Supplied material is not PEM-encoded.
    #[error("{0} is not PEM content")]
    InvalidPem(&'static str),

    /// TLS material is incomplete (cert without key, or vice versa).
    #[error("incomplete TLS material: {0}")]
    IncompleteTls(&'static str),
}
