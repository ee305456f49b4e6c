/*
 * client.rs
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

//! Connection establishment: TCP, optional proxy (HTTP CONNECT tunnel or forwarding, TLS to
//! an `https://` proxy, SOCKS5), TLS with ALPN, and the HTTP/2 preface when that protocol is
//! selected.

use bytes::{Bytes, BytesMut};
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;

use crate::protocol::http::connection::{HttpConnection, HttpStream, HttpVersion};
use crate::protocol::http::h1::{BodyMode, H1ResponseHandler, ParseState, ResponseParser};
use crate::protocol::http::h2::H2Session;
use crate::protocol::http::socks::{socks5_connect, SocksTarget};
use crate::transport::negotiate::ProtocolPolicy;
use crate::uri::Destination;

/// How the proxy is spoken to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    /// Plain HTTP: CONNECT for secure destinations, absolute-form forwarding otherwise.
    Http,
    /// As `Http`, over TLS to the proxy itself.
    Https,
    /// SOCKS5 CONNECT. With `remote_dns` (`socks5h`) the proxy resolves host names.
    Socks5 { remote_dns: bool },
}

/// Where to send traffic when a proxy is configured, and what to tell it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
    /// Sent on CONNECT and on every forwarded request (includes Proxy-Authorization).
    pub headers: Vec<(String, String)>,
    /// SOCKS5 username and password.
    pub credentials: Option<(String, String)>,
}

/// Opens new connections for the pool.
#[derive(Clone)]
pub struct Connector {
    tls: TlsConnector,
    proxy_tls: TlsConnector,
    policy: ProtocolPolicy,
    proxy: Option<ProxyRoute>,
}

/// Records the status of the proxy's reply to CONNECT.
#[derive(Default)]
struct TunnelReply {
    status: Option<u16>,
}

impl H1ResponseHandler for TunnelReply {
    fn status(&mut self, _version: HttpVersion, code: u16, _reason: Option<&str>) {
        self.status = Some(code);
    }
    fn header(&mut self, _name: &str, _value: &str) {}
    fn body_chunk(&mut self, _data: Bytes) {}
    fn trailer(&mut self, _name: &str, _value: &str) {}
    fn complete(&mut self) {}
}

fn server_name(host: &str) -> io::Result<ServerName<'static>> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(host.to_string())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid host name"))
}

async fn dial(host: &str, port: u16) -> io::Result<TcpStream> {
    let tcp = TcpStream::connect((host.trim_start_matches('[').trim_end_matches(']'), port)).await?;
    tcp.set_nodelay(true)?;
    Ok(tcp)
}

impl Connector {
    pub fn new(tls: Arc<ClientConfig>, policy: ProtocolPolicy, proxy: Option<ProxyRoute>) -> Self {
        // The proxy hop only ever carries HTTP/1.1.
        let mut proxy_config = (*tls).clone();
        proxy_config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Self {
            tls: TlsConnector::from(tls),
            proxy_tls: TlsConnector::from(Arc::new(proxy_config)),
            policy,
            proxy,
        }
    }

    /// Establish a connection to `destination`. Callers bound this with the connect deadline.
    pub async fn connect(&self, destination: &Destination) -> io::Result<HttpConnection> {
        let secure = destination.scheme().is_secure();
        let mut forward = false;
        let (mut stream, version) = match &self.proxy {
            None => {
                let tcp = dial(destination.host(), destination.port()).await?;
                self.open(tcp, destination).await?
            }
            Some(proxy) => match proxy.kind {
                ProxyKind::Http => {
                    let mut tcp = dial(&proxy.host, proxy.port).await?;
                    if secure {
                        Self::tunnel(&mut tcp, destination, proxy).await?;
                        self.open(tcp, destination).await?
                    } else {
                        forward = true;
                        (HttpStream::Plain(tcp), self.policy.select(None))
                    }
                }
                ProxyKind::Https => {
                    let tcp = dial(&proxy.host, proxy.port).await?;
                    let mut outer = self.proxy_tls.connect(server_name(&proxy.host)?, tcp).await?;
                    tracing::debug!(proxy = %proxy.host, "TLS to proxy established");
                    if secure {
                        Self::tunnel(&mut outer, destination, proxy).await?;
                        let inner = self.tls.connect(server_name(destination.host())?, outer).await?;
                        let version = self.policy.select(inner.get_ref().1.alpn_protocol());
                        (HttpStream::ProxiedTls(Box::new(inner)), version)
                    } else {
                        forward = true;
                        (HttpStream::Tls(Box::new(outer)), self.policy.select(None))
                    }
                }
                ProxyKind::Socks5 { remote_dns } => {
                    let mut tcp = dial(&proxy.host, proxy.port).await?;
                    let target =
                        SocksTarget::resolve(destination.host(), destination.port(), remote_dns)
                            .await?;
                    socks5_connect(&mut tcp, &target, proxy.credentials.as_ref()).await?;
                    self.open(tcp, destination).await?
                }
            },
        };
        tracing::debug!(%destination, version = version.as_str(), "connection established");

        let session = if version == HttpVersion::Http2 {
            let mut session = H2Session::new();
            stream.write_all(&session.preface()).await?;
            stream.flush().await?;
            Some(session)
        } else {
            None
        };
        let mut conn = HttpConnection::new(stream, destination.clone(), version, session);
        if let (Some(proxy), true) = (&self.proxy, forward) {
            conn.forward_through_proxy(proxy.headers.clone());
        }
        Ok(conn)
    }

    /// Speak to `destination` over `tcp`: TLS with ALPN for secure schemes, plaintext otherwise.
    async fn open(
        &self,
        tcp: TcpStream,
        destination: &Destination,
    ) -> io::Result<(HttpStream, HttpVersion)> {
        if destination.scheme().is_secure() {
            let tls = self.tls.connect(server_name(destination.host())?, tcp).await?;
            let version = self.policy.select(tls.get_ref().1.alpn_protocol());
            Ok((HttpStream::Tls(Box::new(tls)), version))
        } else {
            Ok((HttpStream::Plain(tcp), self.policy.select(None)))
        }
    }

    /// Ask the proxy for a tunnel to `destination`. Anything but a 2xx reply fails.
    async fn tunnel<S>(stream: &mut S, destination: &Destination, proxy: &ProxyRoute) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let authority = destination.host_port();
        let mut request = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n", authority);
        for (name, value) in &proxy.headers {
            request.push_str(name);
            request.push_str(": ");
            request.push_str(value);
            request.push_str("\r\n");
        }
        request.push_str("\r\n");
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await?;

        let mut parser = ResponseParser::new();
        let mut reply = TunnelReply::default();
        let mut buf = BytesMut::with_capacity(1024);
        loop {
            parser.receive(&mut buf, &mut reply)?;
            if parser.state() == ParseState::HeadersComplete {
                break;
            }
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "proxy closed the connection during CONNECT",
                ));
            }
        }
        parser.set_body_mode(BodyMode::Empty, &mut reply);
        match reply.status {
            Some(status) if (200..300).contains(&status) => {
                tracing::debug!(%destination, "proxy tunnel established");
                Ok(())
            }
            status => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("proxy refused CONNECT to {}: status {:?}", authority, status),
            )),
        }
    }
}
