//! Credential handling for the container backend.
//!
//! This crate keeps the two kinds of sensitive material a backend
//! carries out of accidental logs:
//!
//! - **Registry credentials** for pulling private workload images,
//!   encoded into the engine's registry-auth header on demand.
//! - **Mutual-TLS material** for remote daemons, held as PEM content
//!   (not file paths) so a config document is portable across hosts.
//!
//! Secrets are wrapped in `SecretString`, which redacts Debug output and
//! zeroes memory on drop.

mod error;
mod registry;
mod tls;

pub use error::AuthError;
pub use registry::RegistryCredentials;
pub use tls::TlsMaterial;
