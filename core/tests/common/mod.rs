/*
 * mod.rs
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

//! In-process HTTP/1.1 test server.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// A request as the server saw it.
#[derive(Debug, Clone, Default)]
pub struct Received {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Received {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Read one request (head and Content-Length or chunked body). `None` at end of stream.
pub async fn read_request(reader: &mut BufReader<TcpStream>) -> Option<Received> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let mut received = Received {
        request_line: line.trim_end().to_string(),
        ..Received::default()
    };
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.ok()?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':')?;
        received
            .headers
            .push((name.trim().to_string(), value.trim().to_string()));
    }
    if received
        .header("transfer-encoding")
        .map_or(false, |te| te.contains("chunked"))
    {
        loop {
            let mut size = String::new();
            reader.read_line(&mut size).await.ok()?;
            let size = usize::from_str_radix(size.trim(), 16).ok()?;
            let mut chunk = vec![0u8; size + 2];
            reader.read_exact(&mut chunk).await.ok()?;
            if size == 0 {
                break;
            }
            received.body.extend_from_slice(&chunk[..size]);
        }
    } else if let Some(len) = received.header("content-length") {
        let mut body = vec![0u8; len.parse().ok()?];
        reader.read_exact(&mut body).await.ok()?;
        received.body = body;
    }
    Some(received)
}

pub fn response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {}\r\n", status);
    for (name, value) in headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}

pub struct TestServer {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Received>>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

/// Keep-alive server: every request is answered with `respond(request)`.
pub async fn serve<F>(respond: F) -> TestServer
where
    F: Fn(&Received) -> Vec<u8> + Send + Sync + 'static,
{
    let respond = Arc::new(respond);
    serve_with(move |mut reader, received| {
        let respond = Arc::clone(&respond);
        async move {
            while let Some(request) = read_request(&mut reader).await {
                let reply = respond(&request);
                received.lock().unwrap().push(request);
                if reader.get_mut().write_all(&reply).await.is_err() {
                    break;
                }
            }
        }
    })
    .await
}

/// Server whose connections are handled entirely by `handle`.
pub async fn serve_with<F, Fut>(handle: F) -> TestServer
where
    F: Fn(BufReader<TcpStream>, Arc<Mutex<Vec<Received>>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));
    {
        let accepted = Arc::clone(&accepted);
        let received = Arc::clone(&received);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(handle(BufReader::new(socket), Arc::clone(&received)));
            }
        });
    }
    TestServer {
        addr,
        accepted,
        received,
    }
}

/// Echo the request body back.
pub fn echo(request: &Received) -> Vec<u8> {
    response("200 OK", &[("Content-Type", "application/octet-stream")], &request.body)
}

/// CONNECT request as a SOCKS5 proxy saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksRequest {
    pub address_type: u8,
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
}

async fn read_socks_string(socket: &mut TcpStream) -> std::io::Result<String> {
    let len = socket.read_u8().await?;
    let mut buf = vec![0u8; len as usize];
    socket.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn socks_handshake(socket: &mut TcpStream) -> std::io::Result<SocksRequest> {
    let mut greeting = [0u8; 2];
    socket.read_exact(&mut greeting).await?;
    let mut methods = vec![0u8; greeting[1] as usize];
    socket.read_exact(&mut methods).await?;
    let credentials = if methods.contains(&2) {
        socket.write_all(&[5, 2]).await?;
        let _version = socket.read_u8().await?;
        let user = read_socks_string(socket).await?;
        let password = read_socks_string(socket).await?;
        socket.write_all(&[1, 0]).await?;
        Some((user, password))
    } else {
        socket.write_all(&[5, 0]).await?;
        None
    };
    let mut head = [0u8; 4];
    socket.read_exact(&mut head).await?;
    let host = match head[3] {
        1 => {
            let mut ip = [0u8; 4];
            socket.read_exact(&mut ip).await?;
            std::net::Ipv4Addr::from(ip).to_string()
        }
        4 => {
            let mut ip = [0u8; 16];
            socket.read_exact(&mut ip).await?;
            std::net::Ipv6Addr::from(ip).to_string()
        }
        _ => read_socks_string(socket).await?,
    };
    let port = socket.read_u16().await?;
    Ok(SocksRequest {
        address_type: head[3],
        host,
        port,
        credentials,
    })
}

/// SOCKS5 proxy that records each CONNECT and pipes every tunnel to `upstream`, whatever
/// address was asked for.
pub async fn socks5_proxy(upstream: SocketAddr) -> (SocketAddr, Arc<Mutex<Vec<SocksRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                let Ok(request) = socks_handshake(&mut socket).await else {
                    return;
                };
                seen.lock().unwrap().push(request);
                let Ok(mut target) = TcpStream::connect(upstream).await else {
                    let _ = socket.write_all(&[5, 5, 0, 1, 0, 0, 0, 0, 0, 0]).await;
                    return;
                };
                let _ = socket.write_all(&[5, 0, 0, 1, 127, 0, 0, 1, 0, 0]).await;
                let _ = tokio::io::copy_bidirectional(&mut socket, &mut target).await;
            });
        }
    });
    (addr, requests)
}
