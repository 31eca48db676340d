//! Server protocol behaviour over loopback TCP.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use h1_engine::config::ServerConfig;
use h1_engine::server::NotFoundHandler;

mod common;

fn config() -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        ..ServerConfig::default()
    }
}

#[tokio::test]
async fn pipelined_requests_with_single_handler_keep_order() {
    let handler = Arc::new(common::EchoHandler::default());
    let server = common::start_server(
        ServerConfig {
            max_concurrent_handlers: 1,
            ..config()
        },
        handler.clone(),
    )
    .await;

    let out = common::exchange(
        server.addr,
        b"GET /slow HTTP/1.1\r\nHost: x\r\n\r\nGET /second HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    )
    .await;

    let first = out.find("/slow:").unwrap();
    let second = out.find("/second:").unwrap();
    assert!(first < second);
    assert_eq!(out.matches("HTTP/1.1 200 OK").count(), 2);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn negative_content_length_is_rejected_without_dispatch() {
    let handler = Arc::new(common::EchoHandler::default());
    let server = common::start_server(config(), handler.clone()).await;

    let out = common::exchange(
        server.addr,
        b"POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: -5\r\n\r\n",
    )
    .await;

    assert!(out.starts_with("HTTP/1.1 400 "));
    assert!(out.contains("connection: close"));
    assert!(out.contains("text/html; charset=utf-8"));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn default_handler_answers_404_and_closes() {
    let server = common::start_server(config(), Arc::new(NotFoundHandler)).await;

    let out = common::exchange(server.addr, b"GET /missing HTTP/1.1\r\nHost: x\r\n\r\n").await;

    assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(out.contains("connection: close"));
    assert!(out.ends_with("Page Not Found!"));
}

#[tokio::test]
async fn unread_body_lingers_then_closes() {
    let handler = Arc::new(common::EchoHandler::default());
    let server = common::start_server(
        ServerConfig {
            lingering_time_secs: 0.5,
            lingering_timeout_secs: 0.2,
            ..config()
        },
        handler,
    )
    .await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"POST /ignore-body HTTP/1.1\r\nHost: x\r\nContent-Length: 100000\r\n\r\npartial")
        .await
        .unwrap();

    // The response arrives and the write side is half-closed.
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .unwrap()
        .unwrap();
    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("connection: close"));
    assert!(out.ends_with("/ignore-body:"));

    // Bytes are still accepted while lingering; after the bound the socket
    // is gone and writes start failing.
    let started = Instant::now();
    let mut failed = false;
    while started.elapsed() < Duration::from_secs(3) {
        if stream.write_all(&[b'x'; 512]).await.is_err() {
            failed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(failed, "connection still open after lingering bound");
}

#[tokio::test]
async fn shutdown_drains_in_flight_requests() {
    let handler = Arc::new(common::EchoHandler::default());
    let server = common::start_server(config(), handler).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /slow HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    server.shutdown.trigger();

    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .unwrap()
        .unwrap();
    assert!(String::from_utf8(out).unwrap().ends_with("/slow:"));

    tokio::time::timeout(Duration::from_secs(5), server.task)
        .await
        .unwrap()
        .unwrap();
    assert!(TcpStream::connect(server.addr).await.is_err());
}
