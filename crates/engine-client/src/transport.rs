//! HTTP transport to a container engine daemon.

use std::time::Duration;

use auth::TlsMaterial;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::EngineError;

/// Default timeout for ordinary engine calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for image pulls, which stream progress for minutes.
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// TCP connect timeout to the daemon.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A parsed daemon address.
///
/// `tcp://` and `http://` dial plain HTTP (upgraded to HTTPS when TLS
/// material is configured), `https://` forces TLS, `unix://` names a
/// local socket. Socket addresses parse and resolve for URL purposes,
/// but the transport itself only dials TCP daemons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonAddr {
    Tcp {
        host: String,
        port: Option<u16>,
        https: bool,
    },
    Unix {
        path: String,
    },
}

impl DaemonAddr {
    /// Parse a daemon address string.
    pub fn parse(address: &str) -> Result<Self, EngineError> {
        let trimmed = address.trim().trim_end_matches('/');

        if let Some(path) = trimmed.strip_prefix("unix://") {
            if !path.starts_with('/') {
                return Err(EngineError::UnsupportedAddress(format!(
                    "unix socket path must be absolute: {}",
                    address
                )));
            }
            return Ok(Self::Unix {
                path: path.to_string(),
            });
        }

        let (rest, https) = if let Some(rest) = trimmed.strip_prefix("tcp://") {
            (rest, false)
        } else if let Some(rest) = trimmed.strip_prefix("http://") {
            (rest, false)
        } else if let Some(rest) = trimmed.strip_prefix("https://") {
            (rest, true)
        } else {
            return Err(EngineError::UnsupportedAddress(format!(
                "expected tcp://, http(s):// or unix:// address, got {:?}",
                address
            )));
        };

        if rest.is_empty() || rest.contains('/') {
            return Err(EngineError::UnsupportedAddress(format!(
                "daemon address must be host[:port] with no path: {:?}",
                address
            )));
        }

        let (host, port) = match rest.rfind(':') {
            Some(idx) if !rest[idx + 1..].contains(']') => {
                match rest[idx + 1..].parse::<u16>() {
                    Ok(port) => (rest[..idx].to_string(), Some(port)),
                    Err(_) => (rest.to_string(), None),
                }
            }
            _ => (rest.to_string(), None),
        };

        if host.is_empty() {
            return Err(EngineError::UnsupportedAddress(format!(
                "daemon address has no host: {:?}",
                address
            )));
        }

        Ok(Self::Tcp { host, port, https })
    }

    /// Host to use when building URLs that reach through the daemon's
    /// machine (host-mapped ports). Socket daemons are local, so they
    /// resolve to loopback.
    pub fn api_host(&self) -> String {
        match self {
            Self::Tcp { host, .. } => host.clone(),
            Self::Unix { .. } => "127.0.0.1".to_string(),
        }
    }
}

impl std::fmt::Display for DaemonAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp { host, port, https } => {
                let scheme = if *https { "https" } else { "tcp" };
                match port {
                    Some(port) => write!(f, "{}://{}:{}", scheme, host, port),
                    None => write!(f, "{}://{}", scheme, host),
                }
            }
            Self::Unix { path } => write!(f, "unix://{}", path),
        }
    }
}

/// Versioned HTTP transport with uniform error mapping.
#[derive(Debug, Clone)]
pub struct EngineTransport {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
}

impl EngineTransport {
    /// Build a transport for the daemon address.
    ///
    /// TLS material upgrades `tcp://` to HTTPS and installs the CA and
    /// client identity. Ports default to the engine's conventions:
    /// 2375 plain, 2376 TLS.
    pub fn new(
        addr: &DaemonAddr,
        tls: Option<&TlsMaterial>,
        api_version: &str,
    ) -> Result<Self, EngineError> {
        let (host, port, https) = match addr {
            DaemonAddr::Tcp { host, port, https } => (host, *port, *https),
            DaemonAddr::Unix { path } => {
                return Err(EngineError::UnsupportedAddress(format!(
                    "unix socket daemons are not dialable by this transport \
                     (got unix://{}); expose the engine on tcp://",
                    path
                )));
            }
        };

        let secure = https || tls.is_some();
        let scheme = if secure { "https" } else { "http" };
        let port = port.unwrap_or(if secure { 2376 } else { 2375 });

        let mut builder = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(tls) = tls {
            if !tls.ca_pem().is_empty() {
                let ca = reqwest::Certificate::from_pem(tls.ca_pem().as_bytes())
                    .map_err(|e| EngineError::TransportBuild(format!("invalid CA PEM: {}", e)))?;
                builder = builder.add_root_certificate(ca);
            }
            if let Some(identity_pem) = tls.identity_pem() {
                let identity = reqwest::Identity::from_pem(&identity_pem).map_err(|e| {
                    EngineError::TransportBuild(format!("invalid client identity PEM: {}", e))
                })?;
                builder = builder.identity(identity);
            }
        }

        let client = builder
            .build()
            .map_err(|e| EngineError::TransportBuild(e.to_string()))?;

        let api_version = api_version.trim_start_matches('v');
        Ok(Self {
            client,
            base_url: format!("{}://{}:{}", scheme, host, port),
            api_version: format!("v{}", api_version),
        })
    }

    /// The versioned URL for an API path.
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}{}", self.base_url, self.api_version, path)
    }

    /// Like [`url`](Self::url), with percent-encoded query parameters.
    pub(crate) fn url_with(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<String, EngineError> {
        let mut url = reqwest::Url::parse(&self.url(path))
            .map_err(|e| EngineError::Parse(format!("bad engine URL: {}", e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url.to_string())
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, EngineError> {
        tracing::trace!(url = %url, "engine GET");
        let response = self.client.get(url).send().await?;
        Self::handle_json(response).await
    }

    pub(crate) async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        tracing::trace!(url = %url, "engine GET (raw)");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::from_response(status.as_u16(), &body));
        }
        Ok(response.bytes().await?.to_vec())
    }

    pub(crate) async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, EngineError> {
        tracing::trace!(url = %url, "engine POST");
        let response = self.client.post(url).json(body).send().await?;
        Self::handle_json(response).await
    }

    /// POST without a body, for lifecycle endpoints that answer with an
    /// empty 204. The engine's 304 means "already in that state" and
    /// counts as success.
    pub(crate) async fn post_empty(&self, url: &str) -> Result<(), EngineError> {
        tracing::trace!(url = %url, "engine POST (empty)");
        let response = self.client.post(url).send().await?;
        let status = response.status();
        if status.is_success() || status.as_u16() == 304 {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(EngineError::from_response(status.as_u16(), &body))
    }

    pub(crate) async fn delete_empty(&self, url: &str) -> Result<(), EngineError> {
        tracing::trace!(url = %url, "engine DELETE");
        let response = self.client.delete(url).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(EngineError::from_response(status.as_u16(), &body))
    }

    /// POST and drain a line-delimited progress stream, feeding each
    /// complete line to `on_line`. Used by image pulls, where the body
    /// keeps streaming until the operation finishes daemon-side.
    pub(crate) async fn post_drain_lines<F>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        mut on_line: F,
    ) -> Result<(), EngineError>
    where
        F: FnMut(&str),
    {
        use futures_util::StreamExt;

        tracing::trace!(url = %url, "engine POST (streaming)");
        let mut request = self.client.post(url).timeout(PULL_TIMEOUT);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::from_response(status.as_u16(), &body));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);
                if !line.is_empty() {
                    on_line(&line);
                }
            }
        }
        let tail = buffer.trim();
        if !tail.is_empty() {
            on_line(tail);
        }
        Ok(())
    }

    async fn handle_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, EngineError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::from_response(status.as_u16(), &body));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(error = %e, "failed to parse engine response");
            EngineError::Parse(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_address() {
        let addr = DaemonAddr::parse("tcp://10.0.0.5:2375").unwrap();
        assert_eq!(
            addr,
            DaemonAddr::Tcp {
                host: "10.0.0.5".to_string(),
                port: Some(2375),
                https: false,
            }
        );
        assert_eq!(addr.api_host(), "10.0.0.5");
    }

    #[test]
    fn test_parse_https_address_without_port() {
        let addr = DaemonAddr::parse("https://docker.example.com").unwrap();
        assert_eq!(
            addr,
            DaemonAddr::Tcp {
                host: "docker.example.com".to_string(),
                port: None,
                https: true,
            }
        );
    }

    #[test]
    fn test_parse_unix_address_resolves_loopback() {
        let addr = DaemonAddr::parse("unix:///var/run/docker.sock").unwrap();
        assert_eq!(
            addr,
            DaemonAddr::Unix {
                path: "/var/run/docker.sock".to_string(),
            }
        );
        assert_eq!(addr.api_host(), "127.0.0.1");
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        assert!(DaemonAddr::parse("ssh://host").is_err());
        assert!(DaemonAddr::parse("tcp://").is_err());
        assert!(DaemonAddr::parse("tcp://host:2375/api").is_err());
        assert!(DaemonAddr::parse("unix://relative/path").is_err());
    }

    #[test]
    fn test_unix_transport_is_unsupported() {
        let addr = DaemonAddr::parse("unix:///var/run/docker.sock").unwrap();
        let err = EngineTransport::new(&addr, None, "v1.43").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedAddress(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_url_is_version_prefixed() {
        let addr = DaemonAddr::parse("tcp://localhost:2375").unwrap();
        let transport = EngineTransport::new(&addr, None, "v1.43").unwrap();
        assert_eq!(
            transport.url("/containers/json"),
            "http://localhost:2375/v1.43/containers/json"
        );
    }

    #[test]
    fn test_version_without_v_prefix_is_normalized() {
        let addr = DaemonAddr::parse("tcp://localhost:2375").unwrap();
        let transport = EngineTransport::new(&addr, None, "1.41").unwrap();
        assert_eq!(transport.url("/_ping"), "http://localhost:2375/v1.41/_ping");
    }

    #[test]
    fn test_default_port_depends_on_scheme() {
        let plain = DaemonAddr::parse("tcp://dockerhost").unwrap();
        let transport = EngineTransport::new(&plain, None, "v1.43").unwrap();
        assert!(transport.url("/_ping").starts_with("http://dockerhost:2375/"));

        let secure = DaemonAddr::parse("https://dockerhost").unwrap();
        let transport = EngineTransport::new(&secure, None, "v1.43").unwrap();
        assert!(transport.url("/_ping").starts_with("https://dockerhost:2376/"));
    }

    #[test]
    fn test_url_with_encodes_query_params() {
        let addr = DaemonAddr::parse("tcp://localhost:2375").unwrap();
        let transport = EngineTransport::new(&addr, None, "v1.43").unwrap();
        let url = transport
            .url_with(
                "/containers/json",
                &[("all", "true"), ("filters", r#"{"label":["managed=true"]}"#)],
            )
            .unwrap();
        assert!(url.contains("all=true"));
        assert!(url.contains("filters=%7B%22label%22"));
        assert!(!url.contains('['));
    }
}
