//! Private-registry credentials.
//!
//! The engine's image-pull endpoint authenticates through an
//! `X-Registry-Auth` header: base64 (URL alphabet) over a small JSON
//! document. The password is wrapped in `SecretString` so it cannot leak
//! through Debug or tracing output; only [`header_value`] exposes it,
//! already encoded.
//!
//! [`header_value`]: RegistryCredentials::header_value

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AuthError;

/// Credentials for a private image registry.
#[derive(Clone)]
pub struct RegistryCredentials {
    username: String,
    password: SecretString,
    /// Registry server address, e.g. `registry.example.com`. `None`
    /// targets the default registry.
    server: Option<String>,
}

impl RegistryCredentials {
    /// Create credentials from explicit values.
    pub fn new(username: String, password: String, server: Option<String>) -> Self {
        Self {
            username,
            password: SecretString::from(password),
            server,
        }
    }

    /// Load credentials from environment variables.
    ///
    /// Looks for:
    /// - `REGISTRY_USERNAME`
    /// - `REGISTRY_PASSWORD`
    /// - `REGISTRY_SERVER` (optional)
    ///
    /// # Errors
    /// Returns `AuthError::MissingEnvVar` if username or password is not
    /// set.
    pub fn from_env() -> Result<Self, AuthError> {
        // Load .env if present; absence is fine.
        dotenvy::dotenv().ok();

        let username = std::env::var("REGISTRY_USERNAME")
            .map_err(|_| AuthError::MissingEnvVar("REGISTRY_USERNAME".into()))?;
        let password = std::env::var("REGISTRY_PASSWORD")
            .map_err(|_| AuthError::MissingEnvVar("REGISTRY_PASSWORD".into()))?;
        let server = std::env::var("REGISTRY_SERVER").ok();

        Ok(Self::new(username, password, server))
    }

    /// Get the username (public, safe to log).
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get the registry server address, if one was configured.
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// Encode the `X-Registry-Auth` header value.
    pub fn header_value(&self) -> String {
        let doc = serde_json::json!({
            "username": self.username,
            "password": self.password.expose_secret(),
            "serveraddress": self.server.as_deref().unwrap_or(""),
        });

        // json! output of a plain object cannot fail to serialize.
        URL_SAFE.encode(doc.to_string())
    }
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("server", &self.server)
            .finish()
    }
}

impl PartialEq for RegistryCredentials {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username
            && self.server == other.server
            && self.password.expose_secret() == other.password.expose_secret()
    }
}

impl Eq for RegistryCredentials {}

// Config documents round-trip through JSON maps, so serialization has
// to expose the password; Debug stays redacted.
impl Serialize for RegistryCredentials {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RegistryCredentials", 3)?;
        state.serialize_field("username", &self.username)?;
        state.serialize_field("password", self.password.expose_secret())?;
        state.serialize_field("server", &self.server)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for RegistryCredentials {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            username: String,
            password: String,
            #[serde(default)]
            server: Option<String>,
        }

        let raw = Raw::deserialize(deserializer)?;
        if raw.username.is_empty() {
            return Err(D::Error::custom("registry username must not be empty"));
        }
        Ok(Self::new(raw.username, raw.password, raw.server))
    }
}
