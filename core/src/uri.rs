/*
 * uri.rs
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

//! Request targets and proxy URLs: scheme, authority and origin-form path.
//! Paths and queries are percent-encoded where they contain bytes that may not appear on a
//! request line; existing escapes are left alone.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Bytes that must be escaped in a path on the request line.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'#');

/// Query component: as for paths, but `{` `}` are common in practice and passed through.
const QUERY: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'#');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Https)
    }
}

/// Pool partition key: scheme, host and port. Hosts are lowercased; IPv6 literals are
/// stored without brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Destination {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Host as it appears in an authority (bracketed when IPv6).
    pub fn host_for_authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    /// Value for `Host` / `:authority`: the port is omitted when it is the scheme default.
    pub fn authority(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host_for_authority()
        } else {
            format!("{}:{}", self.host_for_authority(), self.port)
        }
    }

    /// `host:port` with the port always present, as used in a CONNECT request.
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host_for_authority(), self.port)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.host_port())
    }
}

/// A parsed request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub destination: Destination,
    /// Origin-form request target, always starting with `/`.
    pub path_and_query: String,
}

impl Target {
    /// Absolute-form request target, used when forwarding plain HTTP through a proxy.
    pub fn absolute_form(&self) -> String {
        format!(
            "{}://{}{}",
            self.destination.scheme.as_str(),
            self.destination.authority(),
            self.path_and_query
        )
    }
}

struct Authority {
    userinfo: Option<String>,
    host: String,
    port: Option<u16>,
}

/// Split `scheme://authority/rest`. Returns the lowercased scheme, authority and remainder.
fn split_url(url: &str) -> Result<(String, &str, &str), &'static str> {
    let url = url.trim();
    let (scheme, rest) = url.split_once("://").ok_or("missing scheme")?;
    if scheme.is_empty() {
        return Err("missing scheme");
    }
    if !scheme
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
    {
        return Err("invalid scheme");
    }
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    Ok((scheme.to_ascii_lowercase(), &rest[..end], &rest[end..]))
}

fn parse_authority(authority: &str) -> Result<Authority, &'static str> {
    let (userinfo, hostport) = match authority.rsplit_once('@') {
        Some((u, h)) => (Some(u.to_string()), h),
        None => (None, authority),
    };
    let (host, port) = if let Some(rest) = hostport.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or("unterminated IPv6 literal")?;
        let port = match after {
            "" => None,
            p => Some(p.strip_prefix(':').ok_or("invalid authority")?),
        };
        (host, port)
    } else {
        match hostport.rsplit_once(':') {
            Some((h, p)) => (h, Some(p)),
            None => (hostport, None),
        }
    };
    if host.is_empty() {
        return Err("missing host");
    }
    if host
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || "/?#@[]\\".contains(c))
    {
        return Err("invalid host");
    }
    let port = match port {
        None | Some("") => None,
        Some(p) => Some(p.parse::<u16>().map_err(|_| "invalid port")?),
    };
    Ok(Authority {
        userinfo,
        host: host.to_string(),
        port,
    })
}

/// Parse an absolute `http://` or `https://` URL into a [`Target`].
pub fn parse_target(url: &str) -> Result<Target, &'static str> {
    let (scheme, authority, rest) = split_url(url)?;
    let scheme = match scheme.as_str() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        _ => return Err("unsupported scheme"),
    };
    let authority = parse_authority(authority)?;
    let port = authority.port.unwrap_or(scheme.default_port());
    let destination = Destination::new(scheme, authority.host, port);

    let rest = rest.split('#').next().unwrap_or("");
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    let mut path_and_query = if path.is_empty() {
        "/".to_string()
    } else {
        utf8_percent_encode(path, PATH).to_string()
    };
    if let Some(query) = query {
        path_and_query.push('?');
        path_and_query.push_str(&utf8_percent_encode(query, QUERY).to_string());
    }
    Ok(Target {
        destination,
        path_and_query,
    })
}

/// Proxy endpoint parsed from a proxy URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyUrl {
    /// One of `http`, `https`, `socks5`, `socks5h`.
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Username and password from the URL userinfo, percent-decoded.
    pub credentials: Option<(String, String)>,
}

pub fn parse_proxy_url(url: &str) -> Result<ProxyUrl, &'static str> {
    let (scheme, authority, _) = split_url(url)?;
    let default_port = match scheme.as_str() {
        "http" => 80,
        "https" => 443,
        "socks5" | "socks5h" => 1080,
        _ => return Err("proxy scheme must be http, https, socks5 or socks5h"),
    };
    let authority = parse_authority(authority)?;
    let credentials = authority.userinfo.map(|userinfo| {
        let (user, pass) = userinfo.split_once(':').unwrap_or((&userinfo, ""));
        (decode_component(user), decode_component(pass))
    });
    Ok(ProxyUrl {
        scheme,
        host: authority.host.to_ascii_lowercase(),
        port: authority.port.unwrap_or(default_port),
        credentials,
    })
}

/// Decode a percent-encoded URL component.
pub fn decode_component(encoded: &str) -> String {
    percent_decode_str(encoded).decode_utf8_lossy().into_owned()
}
