//! TLS termination, TLS upstreams and the redirect listener.

mod common;

use common::{client, localhost, proxy_route, start_echo, start_echo_with_tls, start_proxy_with, TestCert};
use gateway_rs::route::{Protocol, ProxyRoute, Upstream};
use gateway_rs::{HttpServer, ProxyOptions, RedirectServer, ShutdownCoordinator};
use serde_json::Value;
use tokio::net::TcpStream;

fn https_upstream(port: u16) -> gateway_rs::Route {
    let upstream = Upstream {
        protocol: Protocol::Https,
        ..Upstream::new("localhost", port, "/")
    };
    ProxyRoute::new("/", upstream).into()
}

#[tokio::test]
async fn test_tls_termination() {
    let cert = TestCert::generate();
    let echo = start_echo().await;
    let proxy = start_proxy_with(
        vec![proxy_route("/", echo.port(), "/")],
        ProxyOptions::default(),
        Some(cert.acceptor()),
    )
    .await;

    let client = reqwest::Client::builder()
        .add_root_certificate(reqwest::Certificate::from_pem(cert.pem.as_bytes()).unwrap())
        .resolve("localhost", proxy.local_addr())
        .no_proxy()
        .build()
        .unwrap();

    let response = client
        .get(format!("https://localhost:{}/secure?a=1", proxy.local_addr().port()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["url"], "/secure?a=1");

    proxy.close().await;
    echo.server.close().await;
}

#[tokio::test]
async fn test_plain_http_to_tls_listener_fails() {
    let cert = TestCert::generate();
    let proxy = start_proxy_with(Vec::new(), ProxyOptions::default(), Some(cert.acceptor())).await;

    let result = client()
        .get(format!("http://{}/", proxy.local_addr()))
        .send()
        .await;
    assert!(result.is_err());

    proxy.close().await;
}

#[tokio::test]
async fn test_https_upstream_verified_with_ca() {
    let cert = TestCert::generate();
    let echo = start_echo_with_tls(Some(cert.acceptor())).await;
    let options = ProxyOptions {
        upstream_ca: Some(cert.cert_path()),
        ..ProxyOptions::default()
    };
    let proxy = start_proxy_with(vec![https_upstream(echo.port())], options, None).await;

    let response = client()
        .get(format!("http://{}/over/tls", proxy.local_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["url"], "/over/tls");

    proxy.close().await;
    echo.server.close().await;
}

#[tokio::test]
async fn test_https_upstream_without_ca_returns_502() {
    let cert = TestCert::generate();
    let echo = start_echo_with_tls(Some(cert.acceptor())).await;
    let proxy = start_proxy_with(
        vec![https_upstream(echo.port())],
        ProxyOptions::default(),
        None,
    )
    .await;

    let response = client()
        .get(format!("http://{}/", proxy.local_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);

    proxy.close().await;
    echo.server.close().await;
}

#[tokio::test]
async fn test_redirect_listener() {
    let redirect = HttpServer::listen(localhost(), RedirectServer::new(8443), None)
        .await
        .unwrap();

    let response = client()
        .get(format!("http://{}/api/v1/?x=y", redirect.local_addr()))
        .header("host", "gateway.example.org:80")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 301);
    assert_eq!(
        response.headers()["location"],
        "https://gateway.example.org:8443/api/v1/?x=y"
    );

    redirect.close().await;
}

#[tokio::test]
async fn test_coordinator_closes_proxy_and_redirect() {
    let cert = TestCert::generate();
    let proxy = start_proxy_with(Vec::new(), ProxyOptions::default(), Some(cert.acceptor())).await;
    let redirect = HttpServer::listen(localhost(), RedirectServer::new(443), None)
        .await
        .unwrap();
    let addrs = [proxy.local_addr(), redirect.local_addr()];

    let mut coordinator = ShutdownCoordinator::new();
    coordinator.register(proxy);
    coordinator.register(redirect);
    coordinator.close_all().await;

    for addr in addrs {
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
