/*
 * transport_http1.rs
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

//! End-to-end HTTP/1.1 behaviour against an in-process server.

mod common;

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};

use common::{echo, response, serve, serve_with, socks5_proxy};
use corriere_core::transport::PoolStats;
use corriere_core::{
    AsyncTransport, Body, BodyStream, ClientConfig, ErrorKind, HttpVersion, Limits, Method,
    ProxyConfig, Request, TimeoutConfig,
};

fn transport(config: ClientConfig) -> AsyncTransport {
    AsyncTransport::new(config).unwrap()
}

fn cleanup_counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    (count, move || {
        c.fetch_add(1, Ordering::SeqCst);
    })
}

#[tokio::test]
async fn eager_body_is_sent_exactly() {
    let server = serve(echo).await;
    let client = transport(ClientConfig::default());

    let response = client
        .send(
            Request::post(server.url("/upload"))
                .header("X-Test", "1")
                .body("hello world"),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.reason(), "OK");
    assert_eq!(response.version(), HttpVersion::Http1_1);
    assert_eq!(
        response.extensions()["http_version"].as_bytes(),
        Some(&b"HTTP/1.1"[..])
    );
    assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"hello world"));

    let received = server.received();
    assert_eq!(received[0].request_line, "POST /upload HTTP/1.1");
    assert_eq!(received[0].header("content-length"), Some("11"));
    assert_eq!(received[0].header("host"), Some(server.addr.to_string().as_str()));
    assert_eq!(received[0].header("x-test"), Some("1"));
}

#[tokio::test]
async fn streaming_body_is_chunked_and_cleaned_up() {
    let server = serve(echo).await;
    let client = transport(ClientConfig::default());
    let (cleanups, cleanup) = cleanup_counter();
    let source = stream::iter(vec![
        Ok(Bytes::from_static(b"ab")),
        Ok(Bytes::new()),
        Ok(Bytes::from_static(b"cde")),
    ]);

    let response = client
        .send(
            Request::post(server.url("/stream"))
                .body(BodyStream::new(source).with_cleanup(cleanup)),
        )
        .await
        .unwrap();
    assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"abcde"));
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(server.received()[0].header("transfer-encoding"), Some("chunked"));
}

#[tokio::test]
async fn streaming_body_source_error_is_a_write_error() {
    let server = serve(echo).await;
    let client = transport(ClientConfig::default());
    let (cleanups, cleanup) = cleanup_counter();
    let source = stream::iter(vec![
        Ok(Bytes::from_static(b"ab")),
        Err(io::Error::new(io::ErrorKind::Other, "source broke")),
    ]);

    let err = client
        .send(Request::post(server.url("/")).body(BodyStream::new(source).with_cleanup(cleanup)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Write);
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(client.pool_stats().connections, 0);
}

#[tokio::test]
async fn drained_connection_is_reused() {
    let server = serve(|_| response("200 OK", &[], b"pong")).await;
    let client = transport(ClientConfig::default());

    for _ in 0..3 {
        let response = client.send(Request::get(server.url("/ping"))).await.unwrap();
        assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"pong"));
    }
    assert_eq!(
        client.pool_stats(),
        PoolStats {
            connections: 1,
            idle: 1,
            established: 1,
            reused: 2,
        }
    );
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn connection_close_is_not_reused() {
    let server = serve(|_| response("200 OK", &[("Connection", "close")], b"bye")).await;
    let client = transport(ClientConfig::default());

    for _ in 0..2 {
        let response = client.send(Request::get(server.url("/"))).await.unwrap();
        assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"bye"));
    }
    let stats = client.pool_stats();
    assert_eq!((stats.established, stats.idle, stats.connections), (2, 0, 0));
}

#[tokio::test]
async fn pool_timeout_when_the_only_connection_is_busy() {
    let server = serve(|_| response("200 OK", &[], b"held")).await;
    let client = transport(
        ClientConfig::default()
            .with_limits(Limits {
                max_connections: Some(1),
                ..Limits::default()
            })
            .with_timeout(TimeoutConfig::none().with_pool(Duration::from_millis(100))),
    );

    // Head read, body not: the connection stays leased.
    let first = client.send(Request::get(server.url("/a"))).await.unwrap();
    let err = client.send(Request::get(server.url("/b"))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PoolTimeout);
    assert!(err.is_timeout());

    assert_eq!(first.bytes().await.unwrap(), Bytes::from_static(b"held"));
    let response = client.send(Request::get(server.url("/c"))).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(client.pool_stats().established, 1);
}

#[tokio::test]
async fn slow_response_is_a_read_timeout() {
    let server = serve_with(|mut reader, _| async move {
        if common::read_request(&mut reader).await.is_some() {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = reader
                .get_mut()
                .write_all(&response("200 OK", &[], b"late"))
                .await;
        }
    })
    .await;
    let client = transport(
        ClientConfig::default()
            .with_timeout(TimeoutConfig::none().with_read(Duration::from_millis(50))),
    );

    let err = client.send(Request::get(server.url("/slow"))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadTimeout);
    assert_eq!(client.pool_stats().connections, 0);
}

#[tokio::test]
async fn per_request_timeout_overrides_client() {
    let server = serve_with(|mut reader, _| async move {
        if common::read_request(&mut reader).await.is_some() {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    })
    .await;
    let client = transport(ClientConfig::default());

    let err = client
        .send(
            Request::get(server.url("/"))
                .timeout(TimeoutConfig::none().with_read(Duration::from_millis(50))),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadTimeout);
}

#[tokio::test]
async fn stalled_reader_is_a_write_timeout() {
    // Accepts, never reads.
    let server = serve_with(|reader, _| async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(reader);
    })
    .await;
    let client = transport(
        ClientConfig::default()
            .with_timeout(TimeoutConfig::none().with_write(Duration::from_millis(100))),
    );

    let big = vec![b'x'; 64 * 1024 * 1024];
    let err = client
        .send(Request::post(server.url("/sink")).body(big))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteTimeout);
    assert_eq!(client.pool_stats().connections, 0);
}

#[tokio::test]
async fn cancelled_send_runs_cleanup_and_discards_the_connection() {
    let server = serve_with(|mut reader, _| async move {
        let _ = common::read_request(&mut reader).await;
    })
    .await;
    let client = transport(ClientConfig::default());
    let (cleanups, cleanup) = cleanup_counter();
    let source = stream::iter(vec![Ok(Bytes::from_static(b"first"))]).chain(stream::pending());

    let result = tokio::time::timeout(
        Duration::from_millis(100),
        client.send(Request::post(server.url("/")).body(BodyStream::new(source).with_cleanup(cleanup))),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    let stats = client.pool_stats();
    assert_eq!((stats.connections, stats.idle), (0, 0));
}

#[tokio::test]
async fn closing_a_partly_read_body_discards_the_connection() {
    let server = serve(|_| {
        let mut body = b"5\r\nfirst\r\n".to_vec();
        body.extend_from_slice(b"6\r\nsecond\r\n0\r\n\r\n");
        let mut out = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
        out.extend_from_slice(&body);
        out
    })
    .await;
    let client = transport(ClientConfig::default());

    let mut response = client.send(Request::get(server.url("/"))).await.unwrap();
    assert_eq!(response.chunk().await.unwrap(), Some(Bytes::from_static(b"first")));
    response.close();
    response.close();
    assert_eq!(response.chunk().await.unwrap(), None);
    drop(response);

    let stats = client.pool_stats();
    assert_eq!((stats.connections, stats.idle), (0, 0));

    let response = client.send(Request::get(server.url("/"))).await.unwrap();
    assert_eq!(
        response.bytes().await.unwrap(),
        Bytes::from_static(b"firstsecond")
    );
    assert_eq!(client.pool_stats().established, 2);
}

#[tokio::test]
async fn dropping_an_unread_response_discards_the_connection() {
    let server = serve(|_| response("200 OK", &[], b"unread")).await;
    let client = transport(ClientConfig::default());

    let response = client.send(Request::get(server.url("/"))).await.unwrap();
    drop(response);
    assert_eq!(client.pool_stats().connections, 0);
}

#[tokio::test]
async fn head_response_has_no_body() {
    let server = serve(|request| {
        if request.request_line.starts_with("HEAD") {
            b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n".to_vec()
        } else {
            response("200 OK", &[], b"full")
        }
    })
    .await;
    let client = transport(ClientConfig::default());

    let response = client
        .send(Request::new(Method::Head, server.url("/")))
        .await
        .unwrap();
    assert_eq!(response.header("content-length"), Some("100"));
    assert!(response.bytes().await.unwrap().is_empty());

    let response = client.send(Request::get(server.url("/"))).await.unwrap();
    assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"full"));
    assert_eq!(client.pool_stats().established, 1);
}

#[tokio::test]
async fn interim_responses_are_skipped() {
    let server = serve(|request| {
        let mut out = b"HTTP/1.1 100 Continue\r\n\r\n".to_vec();
        out.extend_from_slice(&echo(request));
        out
    })
    .await;
    let client = transport(ClientConfig::default());

    let response = client
        .send(
            Request::post(server.url("/"))
                .header("Expect", "100-continue")
                .body("payload"),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"payload"));
}

#[tokio::test]
async fn body_streams_lazily() {
    let server = serve(|_| {
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n"
            .to_vec()
    })
    .await;
    let client = transport(ClientConfig::default());

    let response = client.send(Request::get(server.url("/"))).await.unwrap();
    let chunks: Vec<Bytes> = response
        .into_body()
        .into_stream()
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;
    assert_eq!(chunks.concat(), b"Wikipedia");
    assert_eq!(client.pool_stats().idle, 1);
}

#[tokio::test]
async fn unsupported_targets_are_rejected() {
    let client = transport(ClientConfig::default());
    for url in ["invalid://example.org", "://example.org", "http://", "example.org/path"] {
        let err = client.send(Request::get(url)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedTarget, "{}", url);
    }
    assert_eq!(client.pool_stats().established, 0);
}

#[tokio::test]
async fn invalid_headers_are_usage_errors() {
    let client = transport(ClientConfig::default());
    let err = client
        .send(Request::get("http://127.0.0.1:9/").header("Bad Name", "x"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    let err = client
        .send(Request::get("http://127.0.0.1:9/").header("X-Split", "a\r\nb: c"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = transport(ClientConfig::default());

    let err = client
        .send(Request::get(format!("http://{}/", addr)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connect);
    assert_eq!(client.pool_stats().connections, 0);
}

#[tokio::test]
async fn closed_transport_refuses_requests() {
    let server = serve(echo).await;
    let client = transport(ClientConfig::default());
    client
        .send(Request::get(server.url("/")))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    client.close();
    assert!(client.is_closed());
    assert_eq!(client.pool_stats().idle, 0);
    let err = client.send(Request::get(server.url("/"))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[test]
fn sending_outside_a_runtime_is_a_usage_error() {
    let client = {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async { transport(ClientConfig::default()) })
    };
    let err = futures_util::FutureExt::now_or_never(client.send(Request::get("http://example.org/")))
        .expect("rejected without suspending")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[tokio::test]
async fn eager_bytes_body_from_vec() {
    let server = serve(echo).await;
    let client = transport(ClientConfig::default());
    let response = client
        .send(Request::post(server.url("/")).body(Body::from(vec![1u8, 2, 3])))
        .await
        .unwrap();
    assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(&[1, 2, 3]));
}

#[tokio::test]
async fn steady_reader_outlasts_the_write_timeout() {
    // Reads 64 KiB every 10 ms: each write makes progress, the whole upload does not fit
    // in one write timeout. The read budget keeps the overall ceiling out of the way.
    let server = serve_with(|mut reader, _| async move {
        let mut length = 0usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return;
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    length = value.trim().parse().unwrap_or(0);
                }
            }
        }
        let mut buf = vec![0u8; 64 * 1024];
        let mut remaining = length;
        while remaining > 0 {
            let n = remaining.min(buf.len());
            if reader.read_exact(&mut buf[..n]).await.is_err() {
                return;
            }
            remaining -= n;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let reply = response("200 OK", &[], length.to_string().as_bytes());
        let _ = reader.get_mut().write_all(&reply).await;
    })
    .await;
    let client = transport(
        ClientConfig::default()
            .with_timeout(
                TimeoutConfig::none()
                    .with_write(Duration::from_millis(300))
                    .with_read(Duration::from_secs(30)),
            ),
    );

    let big = vec![b'x'; 8 * 1024 * 1024];
    let started = std::time::Instant::now();
    let response = client
        .send(Request::post(server.url("/upload")).body(big))
        .await
        .unwrap();
    assert!(started.elapsed() > Duration::from_millis(300));
    assert_eq!(
        response.bytes().await.unwrap(),
        Bytes::from((8 * 1024 * 1024).to_string())
    );

    // Write alone sets the overall ceiling too, and that still ends the upload.
    let capped = transport(
        ClientConfig::default()
            .with_timeout(TimeoutConfig::none().with_write(Duration::from_millis(300))),
    );
    let err = capped
        .send(Request::post(server.url("/upload")).body(vec![b'x'; 8 * 1024 * 1024]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteTimeout);
}

#[tokio::test]
async fn zero_read_timeout_is_unbounded() {
    let server = serve_with(|mut reader, _| async move {
        if common::read_request(&mut reader).await.is_some() {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = reader
                .get_mut()
                .write_all(&response("200 OK", &[], b"eventually"))
                .await;
        }
    })
    .await;
    let client = transport(ClientConfig::default().with_timeout(
        TimeoutConfig::all(Duration::from_secs(5)).with_read(Duration::ZERO),
    ));

    let response = client.send(Request::get(server.url("/"))).await.unwrap();
    assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"eventually"));
}

#[tokio::test]
async fn plain_requests_are_forwarded_to_the_proxy() {
    let proxy = serve(|_| response("200 OK", &[], b"from proxy")).await;
    let client = transport(
        ClientConfig::default()
            .with_proxy(ProxyConfig::new(format!("http://us%40er:secret@{}", proxy.addr))),
    );

    let response = client
        .send(Request::get("http://origin.test:8080/path?q=1"))
        .await
        .unwrap();
    assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"from proxy"));
    let response = client
        .send(Request::get("http://origin.test:8080/again"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    response.bytes().await.unwrap();

    let received = proxy.received();
    assert_eq!(received[0].request_line, "GET http://origin.test:8080/path?q=1 HTTP/1.1");
    assert_eq!(received[0].header("host"), Some("origin.test:8080"));
    let expected = format!("Basic {}", STANDARD.encode("us@er:secret"));
    assert_eq!(received[0].header("proxy-authorization"), Some(expected.as_str()));
    assert_eq!(received[1].request_line, "GET http://origin.test:8080/again HTTP/1.1");
    assert_eq!(proxy.accepted(), 1);
}

#[tokio::test]
async fn proxy_basic_auth_and_headers_are_sent() {
    let proxy = serve(|_| response("204 No Content", &[], b"")).await;
    let client = transport(
        ClientConfig::default().with_proxy(
            ProxyConfig::new(format!("http://ignored:ignored@{}", proxy.addr))
                .with_basic_auth("user", "pass")
                .with_header("X-Proxy-Tag", "corriere"),
        ),
    );

    let response = client.send(Request::get("http://origin.test/")).await.unwrap();
    assert_eq!(response.status(), 204);

    let received = proxy.received();
    assert_eq!(received[0].request_line, "GET http://origin.test/ HTTP/1.1");
    let expected = format!("Basic {}", STANDARD.encode("user:pass"));
    assert_eq!(received[0].header("proxy-authorization"), Some(expected.as_str()));
    assert_eq!(received[0].header("x-proxy-tag"), Some("corriere"));
}

#[tokio::test]
async fn refused_tunnel_is_a_connect_error() {
    let proxy = serve(|_| {
        b"HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 0\r\n\r\n".to_vec()
    })
    .await;
    let client = transport(
        ClientConfig::default().with_proxy(ProxyConfig::new(format!("http://{}", proxy.addr))),
    );

    let err = client
        .send(Request::get("https://origin.test/secret"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connect);
    assert_eq!(client.pool_stats().connections, 0);

    let received = proxy.received();
    assert_eq!(received[0].request_line, "CONNECT origin.test:443 HTTP/1.1");
    assert_eq!(received[0].header("host"), Some("origin.test:443"));
    assert_eq!(received[0].header("proxy-authorization"), None);
}

#[tokio::test]
async fn socks5_proxy_tunnels_requests() {
    let server = serve(echo).await;
    let (proxy, requests) = socks5_proxy(server.addr).await;
    let client = transport(
        ClientConfig::default().with_proxy(ProxyConfig::new(format!("socks5://{}", proxy))),
    );

    let response = client
        .send(Request::post(server.url("/through")).body("tunnelled"))
        .await
        .unwrap();
    assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"tunnelled"));

    let requests = requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].address_type, 1);
    assert_eq!(requests[0].host, "127.0.0.1");
    assert_eq!(requests[0].port, server.addr.port());
    assert_eq!(requests[0].credentials, None);
    // Tunnelled, so the origin sees an origin-form request.
    assert_eq!(server.received()[0].request_line, "POST /through HTTP/1.1");
}

#[tokio::test]
async fn socks5h_leaves_name_resolution_to_the_proxy() {
    let server = serve(|_| response("200 OK", &[], b"resolved remotely")).await;
    let (proxy, requests) = socks5_proxy(server.addr).await;
    let client = transport(ClientConfig::default().with_proxy(ProxyConfig::new(format!(
        "socks5h://user:pass@{}",
        proxy
    ))));

    let response = client
        .send(Request::get("http://unresolvable.invalid:8080/"))
        .await
        .unwrap();
    assert_eq!(
        response.bytes().await.unwrap(),
        Bytes::from_static(b"resolved remotely")
    );

    let requests = requests.lock().unwrap().clone();
    assert_eq!(requests[0].address_type, 3);
    assert_eq!(requests[0].host, "unresolvable.invalid");
    assert_eq!(requests[0].port, 8080);
    assert_eq!(
        requests[0].credentials,
        Some(("user".to_string(), "pass".to_string()))
    );
    assert_eq!(
        server.received()[0].header("host"),
        Some("unresolvable.invalid:8080")
    );
}

#[tokio::test]
async fn idle_connections_are_capped_per_destination() {
    let server = serve(|_| response("200 OK", &[], b"capped")).await;
    let client = transport(ClientConfig::default().with_limits(Limits {
        max_keepalive_connections: Some(1),
        ..Limits::default()
    }));

    // Both heads read before either body: two connections in use at once.
    let first = client.send(Request::get(server.url("/1"))).await.unwrap();
    let second = client.send(Request::get(server.url("/2"))).await.unwrap();
    assert_eq!(client.pool_stats().connections, 2);
    assert_eq!(first.bytes().await.unwrap(), Bytes::from_static(b"capped"));
    assert_eq!(second.bytes().await.unwrap(), Bytes::from_static(b"capped"));

    let stats = client.pool_stats();
    assert_eq!((stats.established, stats.idle, stats.connections), (2, 1, 1));
    assert_eq!(server.accepted(), 2);
}

#[tokio::test]
async fn cancelled_chunk_read_discards_the_connection() {
    // Half the body, a pause, then the rest.
    let server = serve_with(|mut reader, _| async move {
        while common::read_request(&mut reader).await.is_some() {
            let socket = reader.get_mut();
            let head = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nfirst";
            if socket.write_all(head).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
            if socket.write_all(b"rest!").await.is_err() {
                return;
            }
        }
    })
    .await;
    let client = transport(ClientConfig::default());

    let mut response = client.send(Request::get(server.url("/"))).await.unwrap();
    let mut seen = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_millis(100), response.chunk()).await {
            Ok(chunk) => seen.extend_from_slice(&chunk.unwrap().expect("body continues")),
            Err(_) => break,
        }
    }
    assert_eq!(seen, b"first");
    assert_eq!(client.pool_stats().connections, 1);

    // The body can still be finished, but the connection is not trusted afterwards.
    assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"rest!"));
    let stats = client.pool_stats();
    assert_eq!((stats.connections, stats.idle), (0, 0));

    let response = client.send(Request::get(server.url("/"))).await.unwrap();
    assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"firstrest!"));
    let stats = client.pool_stats();
    assert_eq!((stats.established, stats.idle), (2, 1));
}
