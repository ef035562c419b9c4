//! Serves a real app on a loopback socket and talks raw HTTP/1.1 to it.

use std::net::SocketAddr;
use std::time::Duration;

use kite::middleware::recovery;
use kite::{App, AppConfig, Context, Error, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start(app: App) -> (SocketAddr, kite::ShutdownHandle, tokio::task::JoinHandle<Result<(), Error>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = app.shutdown_handle();
    let server = tokio::spawn(app.serve(listener));
    (addr, handle, server)
}

async fn send(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

fn demo_app() -> App {
    let mut app = App::with_config(AppConfig {
        server_header: "kite".to_owned(),
        disable_startup_message: true,
        ..AppConfig::default()
    });
    app.use_middleware(recovery::new(recovery::Config { stack_trace: false, ..recovery::Config::default() }));
    app.get("/hello/:name", |c: &mut Context| {
        let reply = format!("Hi, {}", c.param("name").unwrap_or_default());
        c.text(StatusCode::OK, &reply);
    })
    .unwrap();
    app.post("/echo", |c: &mut Context| {
        let body = c.body().clone();
        c.data(StatusCode::OK, "application/octet-stream", &body);
    })
    .unwrap();
    app.get("/boom", |_: &mut Context| panic!("boom")).unwrap();
    app
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serves_requests_and_shuts_down() {
    let (addr, handle, server) = start(demo_app()).await;

    let response = send(addr, "GET /hello/world HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.to_ascii_lowercase().contains("server: kite\r\n"));
    assert!(response.ends_with("\r\n\r\nHi, world"));

    let response =
        send(addr, "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello").await;
    assert!(response.ends_with("\r\n\r\nhello"), "{response}");

    let response = send(addr, "GET /boom HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 500"), "{response}");

    let response = send(addr, "GET /missing HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
    assert!(response.ends_with("404 page not found\n"));

    assert!(handle.is_running());
    handle.shutdown_with_timeout(Duration::from_secs(5)).await.unwrap();
    server.await.unwrap().unwrap();
    assert!(!handle.is_running());
    assert!(matches!(handle.shutdown(), Err(Error::NotRunning)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_waits_for_in_flight_requests() {
    let mut app = App::with_config(AppConfig { disable_startup_message: true, ..AppConfig::default() });
    app.get("/slow", |c: &mut Context| {
        std::thread::sleep(Duration::from_millis(300));
        c.text(StatusCode::OK, "done");
    })
    .unwrap();
    let (addr, handle, server) = start(app).await;

    let in_flight =
        tokio::spawn(send(addr, "GET /slow HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    handle.shutdown_with_timeout(Duration::from_secs(5)).await.unwrap();
    let response = in_flight.await.unwrap();
    assert!(response.ends_with("\r\n\r\ndone"), "{response}");
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_before_serving_is_an_error() {
    let app = App::new();
    assert!(matches!(app.shutdown(), Err(Error::NotRunning)));
    assert!(matches!(app.shutdown_with_timeout(Duration::from_millis(10)).await, Err(Error::NotRunning)));
}

#[tokio::test]
async fn listen_rejects_invalid_addresses() {
    let err = App::new().listen("definitely not an address").await.unwrap_err();
    assert!(matches!(err, Error::InvalidAddress(_)));
}
