/*
 * socks.rs
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

//! SOCKS5 CONNECT handshake (RFC 1928) with optional username/password authentication
//! (RFC 1929).

use std::io;
use std::net::IpAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const VERSION: u8 = 0x05;
const NO_AUTH: u8 = 0x00;
const USER_PASS: u8 = 0x02;
const NO_ACCEPTABLE: u8 = 0xff;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

fn socks_error(kind: io::ErrorKind, message: impl Into<String>) -> io::Error {
    io::Error::new(kind, message.into())
}

fn reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown error",
    }
}

/// Target of a CONNECT request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocksTarget {
    Ip(IpAddr, u16),
    /// Resolved by the proxy.
    Domain(String, u16),
}

impl SocksTarget {
    /// `remote_dns` hands name resolution to the proxy (`socks5h`); otherwise the name is
    /// resolved here and the proxy only ever sees an address.
    pub async fn resolve(host: &str, port: u16, remote_dns: bool) -> io::Result<Self> {
        let literal = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = literal.parse::<IpAddr>() {
            return Ok(SocksTarget::Ip(ip, port));
        }
        if remote_dns {
            return Ok(SocksTarget::Domain(host.to_string(), port));
        }
        let addr = tokio::net::lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| socks_error(io::ErrorKind::NotFound, format!("no address for {}", host)))?;
        Ok(SocksTarget::Ip(addr.ip(), port))
    }

    fn encode(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let port = match self {
            SocksTarget::Ip(IpAddr::V4(ip), port) => {
                out.push(ATYP_IPV4);
                out.extend_from_slice(&ip.octets());
                port
            }
            SocksTarget::Ip(IpAddr::V6(ip), port) => {
                out.push(ATYP_IPV6);
                out.extend_from_slice(&ip.octets());
                port
            }
            SocksTarget::Domain(name, port) => {
                let len = u8::try_from(name.len()).map_err(|_| {
                    socks_error(io::ErrorKind::InvalidInput, "host name too long for SOCKS5")
                })?;
                out.push(ATYP_DOMAIN);
                out.push(len);
                out.extend_from_slice(name.as_bytes());
                port
            }
        };
        out.extend_from_slice(&port.to_be_bytes());
        Ok(())
    }
}

/// Run the client side of the handshake. On success the stream carries bytes to `target`.
pub async fn socks5_connect<S>(
    stream: &mut S,
    target: &SocksTarget,
    credentials: Option<&(String, String)>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let method = if credentials.is_some() { USER_PASS } else { NO_AUTH };
    stream.write_all(&[VERSION, 1, method]).await?;
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != VERSION {
        return Err(socks_error(io::ErrorKind::InvalidData, "not a SOCKS5 proxy"));
    }
    match (choice[1], credentials) {
        (NO_AUTH, _) => {}
        (USER_PASS, Some((user, password))) => authenticate(stream, user, password).await?,
        (NO_ACCEPTABLE, _) => {
            return Err(socks_error(
                io::ErrorKind::PermissionDenied,
                "SOCKS5 proxy accepted no authentication method",
            ))
        }
        (other, _) => {
            return Err(socks_error(
                io::ErrorKind::InvalidData,
                format!("SOCKS5 proxy chose unexpected method {:#04x}", other),
            ))
        }
    }

    let mut request = vec![VERSION, CMD_CONNECT, 0x00];
    target.encode(&mut request)?;
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await?;
    if reply[0] != VERSION {
        return Err(socks_error(io::ErrorKind::InvalidData, "malformed SOCKS5 reply"));
    }
    if reply[1] != 0x00 {
        return Err(socks_error(
            io::ErrorKind::ConnectionRefused,
            format!("SOCKS5 proxy refused CONNECT: {}", reply_message(reply[1])),
        ));
    }
    // Bound address and port; unused.
    let skip = match reply[3] {
        ATYP_IPV4 => 4 + 2,
        ATYP_IPV6 => 16 + 2,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize + 2
        }
        _ => return Err(socks_error(io::ErrorKind::InvalidData, "bad SOCKS5 address type")),
    };
    let mut bound = vec![0u8; skip];
    stream.read_exact(&mut bound).await?;
    tracing::debug!(?target, "SOCKS5 tunnel established");
    Ok(())
}

async fn authenticate<S>(stream: &mut S, user: &str, password: &str) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (Ok(ulen), Ok(plen)) = (u8::try_from(user.len()), u8::try_from(password.len())) else {
        return Err(socks_error(
            io::ErrorKind::InvalidInput,
            "SOCKS5 credentials longer than 255 bytes",
        ));
    };
    let mut request = Vec::with_capacity(3 + user.len() + password.len());
    request.push(0x01);
    request.push(ulen);
    request.extend_from_slice(user.as_bytes());
    request.push(plen);
    request.extend_from_slice(password.as_bytes());
    stream.write_all(&request).await?;
    let mut status = [0u8; 2];
    stream.read_exact(&mut status).await?;
    if status[1] != 0x00 {
        return Err(socks_error(
            io::ErrorKind::PermissionDenied,
            "SOCKS5 proxy rejected the credentials",
        ));
    }
    Ok(())
}
