/*
 * config.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Corriere, an asynchronous HTTP client transport.
 *
 * Corriere is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Corriere is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Corriere.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Client configuration: protocol flags, timeouts, pool limits, trust anchors, proxy and
//! tracer. Built in code, or loaded from a JSON settings document whose durations are given
//! in (fractional) seconds.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::net::tls_client_config;
use crate::protocol::http::{find_header, validate_header, Connector, ProxyKind, ProxyRoute};
use crate::transport::error::ConfigError;
use crate::transport::negotiate::ProtocolPolicy;
use crate::transport::timeout::TimeoutConfig;
use crate::transport::trace::Tracer;
use crate::uri::parse_proxy_url;

/// Pool limits. `None` means unlimited (or, for expiry, idle connections never expire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_connections: Option<usize>,
    pub max_keepalive_connections: Option<usize>,
    pub keepalive_expiry: Option<Duration>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_connections: Some(100),
            max_keepalive_connections: Some(20),
            keepalive_expiry: Some(Duration::from_secs(5)),
        }
    }
}

/// Forward proxy: `http://`, `https://`, `socks5://` or `socks5h://`.
///
/// Through an HTTP(S) proxy, requests to `https://` destinations are tunnelled with CONNECT
/// and plain requests are forwarded in absolute form. A SOCKS5 proxy tunnels everything;
/// `socks5h` leaves name resolution to the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub url: String,
    /// Overrides credentials embedded in the URL.
    pub basic_auth: Option<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl ProxyConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            basic_auth: None,
            headers: Vec::new(),
        }
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidProxy {
            url: self.url.clone(),
            reason: reason.into(),
        }
    }

    /// Resolve to the address to dial and the headers to send it.
    pub fn route(&self) -> Result<ProxyRoute, ConfigError> {
        let parsed = parse_proxy_url(&self.url).map_err(|reason| self.invalid(reason))?;
        let kind = match parsed.scheme.as_str() {
            "http" => ProxyKind::Http,
            "https" => ProxyKind::Https,
            "socks5" => ProxyKind::Socks5 { remote_dns: false },
            _ => ProxyKind::Socks5 { remote_dns: true },
        };
        let credentials = self.basic_auth.clone().or(parsed.credentials);
        if let ProxyKind::Socks5 { .. } = kind {
            if !self.headers.is_empty() {
                return Err(self.invalid("SOCKS proxies do not take headers"));
            }
            return Ok(ProxyRoute {
                kind,
                host: parsed.host,
                port: parsed.port,
                headers: Vec::new(),
                credentials,
            });
        }
        let mut headers = self.headers.clone();
        for (name, value) in &headers {
            validate_header(name, value).map_err(|reason| self.invalid(reason))?;
        }
        if let Some((user, password)) = credentials {
            if find_header(&headers, "proxy-authorization").is_none() {
                let token = STANDARD.encode(format!("{}:{}", user, password));
                headers.push(("Proxy-Authorization".to_string(), format!("Basic {}", token)));
            }
        }
        Ok(ProxyRoute {
            kind,
            host: parsed.host,
            port: parsed.port,
            headers,
            credentials: None,
        })
    }
}

#[derive(Clone)]
pub struct ClientConfig {
    pub http1: bool,
    pub http2: bool,
    /// Use HTTP/2 when both versions are enabled and ALPN did not decide.
    pub prefer_http2: bool,
    pub timeout: TimeoutConfig,
    pub limits: Limits,
    /// Extra DER-encoded trust anchors, added to the platform roots.
    pub root_certificates: Vec<Vec<u8>>,
    pub proxy: Option<ProxyConfig>,
    pub tracer: Option<Arc<dyn Tracer>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http1: true,
            http2: false,
            prefer_http2: false,
            timeout: TimeoutConfig::none(),
            limits: Limits::default(),
            root_certificates: Vec::new(),
            proxy: None,
            tracer: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("http1", &self.http1)
            .field("http2", &self.http2)
            .field("prefer_http2", &self.prefer_http2)
            .field("timeout", &self.timeout)
            .field("limits", &self.limits)
            .field("root_certificates", &self.root_certificates.len())
            .field("proxy", &self.proxy)
            .field("tracer", &self.tracer.is_some())
            .finish()
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_http2(mut self, enabled: bool) -> Self {
        self.http2 = enabled;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn with_root_certificate(mut self, der: Vec<u8>) -> Self {
        self.root_certificates.push(der);
        self
    }

    /// Check everything that can be checked without the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build_connector().map(|_| ())
    }

    pub(crate) fn build_connector(&self) -> Result<Connector, ConfigError> {
        let policy = ProtocolPolicy::new(self.http1, self.http2, self.prefer_http2)?;
        if self.limits.max_connections == Some(0) {
            return Err(ConfigError::ZeroConnections);
        }
        let proxy = self.proxy.as_ref().map(ProxyConfig::route).transpose()?;
        let tls = tls_client_config(&self.root_certificates, policy.alpn_protocols())?;
        Ok(Connector::new(tls, policy, proxy))
    }
}

fn seconds<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid duration {} seconds", secs))),
    }
}

/// `"timeout": 5.0` or `"timeout": {"connect": 1.0, "read": 10.0, ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TimeoutSettings {
    All(f64),
    Phases(PhaseSettings),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PhaseSettings {
    #[serde(deserialize_with = "seconds")]
    default: Option<Duration>,
    #[serde(deserialize_with = "seconds")]
    connect: Option<Duration>,
    #[serde(deserialize_with = "seconds")]
    read: Option<Duration>,
    #[serde(deserialize_with = "seconds")]
    write: Option<Duration>,
    #[serde(deserialize_with = "seconds")]
    pool: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LimitSettings {
    max_connections: Option<usize>,
    max_keepalive_connections: Option<usize>,
    #[serde(deserialize_with = "seconds")]
    keepalive_expiry: Option<Duration>,
}

impl Default for LimitSettings {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            max_connections: limits.max_connections,
            max_keepalive_connections: limits.max_keepalive_connections,
            keepalive_expiry: limits.keepalive_expiry,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProxySettings {
    url: String,
    #[serde(default)]
    auth: Option<(String, String)>,
    #[serde(default)]
    headers: Vec<(String, String)>,
}

/// Settings document, e.g.
///
/// ```json
/// {
///   "http2": true,
///   "timeout": {"connect": 5.0, "read": 30.0},
///   "limits": {"max_connections": 10, "keepalive_expiry": 2.5},
///   "proxy": {"url": "http://proxy.local:3128", "auth": ["user", "secret"]},
///   "root_certificates": ["/etc/corriere/ca.der"]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSettings {
    http1: bool,
    http2: bool,
    prefer_http2: bool,
    timeout: Option<TimeoutSettings>,
    limits: LimitSettings,
    proxy: Option<ProxySettings>,
    root_certificates: Vec<PathBuf>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            http1: true,
            http2: false,
            prefer_http2: false,
            timeout: None,
            limits: LimitSettings::default(),
            proxy: None,
            root_certificates: Vec::new(),
        }
    }
}

impl TransportSettings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Turn the settings into a [`ClientConfig`], reading certificate files. The result is
    /// validated when the transport is built.
    pub fn into_config(self) -> Result<ClientConfig, ConfigError> {
        let timeout = match self.timeout {
            None => TimeoutConfig::none(),
            Some(TimeoutSettings::All(secs)) => {
                let d = Duration::try_from_secs_f64(secs).map_err(|_| {
                    ConfigError::Settings(serde::de::Error::custom(format!(
                        "invalid duration {} seconds",
                        secs
                    )))
                })?;
                TimeoutConfig::all(d)
            }
            Some(TimeoutSettings::Phases(p)) => TimeoutConfig {
                default: p.default,
                connect: p.connect,
                read: p.read,
                write: p.write,
                pool: p.pool,
            },
        };
        let mut root_certificates = Vec::with_capacity(self.root_certificates.len());
        for path in &self.root_certificates {
            let der = fs::read(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            root_certificates.push(der);
        }
        let proxy = self.proxy.map(|p| ProxyConfig {
            url: p.url,
            basic_auth: p.auth,
            headers: p.headers,
        });
        Ok(ClientConfig {
            http1: self.http1,
            http2: self.http2,
            prefer_http2: self.prefer_http2,
            timeout,
            limits: Limits {
                max_connections: self.limits.max_connections,
                max_keepalive_connections: self.limits.max_keepalive_connections,
                keepalive_expiry: self.limits.keepalive_expiry,
            },
            root_certificates,
            proxy,
            tracer: None,
        })
    }
}
