//! Shared utilities for integration tests.

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use gateway_rs::config::SecurityHeaders;
use gateway_rs::route::{ProxyRoute, Upstream};
use gateway_rs::tls::TlsManager;
use gateway_rs::{HttpServer, Proxy, ProxyOptions, RequestContext, RequestHandler, Route, RouteTable};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio_rustls::TlsAcceptor;

pub fn localhost() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

/// Upstream that answers with a JSON description of the request it received
pub struct Echo {
    status: Arc<AtomicU16>,
}

impl RequestHandler for Echo {
    async fn handle_request(&self, req: Request<Body>, _ctx: RequestContext) -> Response<Body> {
        let status = StatusCode::from_u16(self.status.load(Ordering::SeqCst))
            .unwrap_or(StatusCode::OK);
        let (parts, body) = req.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();

        let description = serde_json::json!({
            "url": parts.uri.to_string(),
            "host": parts.headers.get(header::HOST).and_then(|h| h.to_str().ok()),
            "method": parts.method.as_str(),
            "body": String::from_utf8_lossy(&body),
        });

        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json");
        if status.is_redirection() {
            builder = builder.header(header::LOCATION, "/elsewhere");
        }
        builder
            .body(Body::from(description.to_string()))
            .unwrap()
    }
}

/// Running echo upstream
pub struct EchoServer {
    pub server: HttpServer,
    status: Arc<AtomicU16>,
}

#[allow(dead_code)]
impl EchoServer {
    pub fn port(&self) -> u16 {
        self.server.local_addr().port()
    }

    /// Status code for all following responses
    pub fn respond_with(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }
}

pub async fn start_echo() -> EchoServer {
    start_echo_with_tls(None).await
}

pub async fn start_echo_with_tls(tls: Option<TlsAcceptor>) -> EchoServer {
    let status = Arc::new(AtomicU16::new(200));
    let echo = Echo {
        status: status.clone(),
    };
    let server = HttpServer::listen(localhost(), echo, tls).await.unwrap();
    EchoServer { server, status }
}

/// Proxy route to an upstream on 127.0.0.1
pub fn proxy_route(path: &str, port: u16, upstream_path: &str) -> Route {
    ProxyRoute::new(path, Upstream::new("127.0.0.1", port, upstream_path)).into()
}

pub async fn start_proxy(routes: Vec<Route>, headers: SecurityHeaders) -> HttpServer {
    let options = ProxyOptions {
        headers,
        ..ProxyOptions::default()
    };
    start_proxy_with(routes, options, None).await
}

pub async fn start_proxy_with(
    routes: Vec<Route>,
    options: ProxyOptions,
    tls: Option<TlsAcceptor>,
) -> HttpServer {
    let proxy = Proxy::new(RouteTable::new(routes).unwrap(), options).unwrap();
    HttpServer::listen(localhost(), proxy, tls).await.unwrap()
}

/// Client that neither follows redirects nor honours proxy variables
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

pub fn url(server: &HttpServer, path: &str) -> String {
    format!("http://{}{}", server.local_addr(), path)
}

/// Self-signed certificate for `localhost`
#[allow(dead_code)]
pub struct TestCert {
    pub pem: String,
    cert_file: NamedTempFile,
    key_file: NamedTempFile,
}

#[allow(dead_code)]
impl TestCert {
    pub fn generate() -> Self {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let pem = cert.cert.pem();

        let mut cert_file = NamedTempFile::new().unwrap();
        cert_file.write_all(pem.as_bytes()).unwrap();
        let mut key_file = NamedTempFile::new().unwrap();
        key_file
            .write_all(cert.key_pair.serialize_pem().as_bytes())
            .unwrap();

        Self {
            pem,
            cert_file,
            key_file,
        }
    }

    pub fn cert_path(&self) -> PathBuf {
        self.cert_file.path().to_path_buf()
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        TlsManager::new(self.cert_file.path(), self.key_file.path())
            .build_acceptor()
            .unwrap()
    }
}
