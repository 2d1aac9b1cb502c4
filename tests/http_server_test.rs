//! Record against a live local server, then replay with the server gone

mod common;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use reel::mode::FixedOverride;
use reel::repository::HarFileRepository;
use reel::{Mode, Recorder, RecorderError};

async fn respond(request: hyper::Request<Incoming>) -> Result<hyper::Response<Full<Bytes>>, Infallible> {
    let query = request.uri().query().unwrap_or_default().to_string();
    let method = request.method().to_string();
    let body = request.into_body().collect().await.map(|b| b.to_bytes()).unwrap_or_default();

    let content = serde_json::json!({
        "method": method,
        "query": query,
        "length": body.len(),
    });
    Ok(hyper::Response::builder()
        .header("Content-Type", "application/json")
        .header("X-Server", "local")
        .body(Full::new(Bytes::from(content.to_string())))
        .unwrap())
}

async fn spawn_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service_fn(respond))
                    .await;
            });
        }
    });

    (addr, handle)
}

fn recorder(dir: &TempDir, mode: Mode) -> Recorder {
    Recorder::builder("live/server")
        .mode(mode)
        .mode_override(Box::new(FixedOverride(None)))
        .repository(Arc::new(HarFileRepository::new(dir.path())))
        .build()
        .unwrap()
}

fn request(addr: SocketAddr, method: &str, path: &str, body: &'static str) -> hyper::Request<Bytes> {
    hyper::Request::builder()
        .method(method)
        .uri(format!("http://{addr}{path}"))
        .body(Bytes::from_static(body.as_bytes()))
        .unwrap()
}

#[tokio::test]
async fn test_record_live_server_then_replay_offline() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let (addr, server) = spawn_server().await;

    let recorder_live = recorder(&dir, Mode::Record);
    let first = recorder_live
        .handle(request(addr, "GET", "/items?page=1", ""))
        .await
        .unwrap();
    let second = recorder_live
        .handle(request(addr, "POST", "/items", "{\"name\":\"x\"}"))
        .await
        .unwrap();
    assert_eq!(first.headers().get("x-server").unwrap(), "local");
    assert_eq!(common::json(&second)["length"], 12);

    server.abort();
    let _ = server.await;

    let replay = recorder(&dir, Mode::Replay);
    let replayed = replay
        .handle(request(addr, "GET", "/items?page=1", ""))
        .await
        .unwrap();
    assert_eq!(replayed.body(), first.body());
    assert_eq!(replayed.headers().get("x-server").unwrap(), "local");

    let replayed = replay
        .handle(request(addr, "POST", "/items", "{\"name\":\"x\"}"))
        .await
        .unwrap();
    assert_eq!(replayed.body(), second.body());

    let err = replay
        .handle(request(addr, "DELETE", "/items", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::NoMatchFound { .. }));
}
