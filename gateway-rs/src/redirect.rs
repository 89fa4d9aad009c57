//! HTTP to HTTPS redirect handler

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::response::IntoResponse;
use tracing::debug;

use crate::server::{RequestContext, RequestHandler};

/// Answers every request with a permanent redirect to the https origin
#[derive(Debug, Clone, Copy)]
pub struct RedirectServer {
    https_port: u16,
}

impl RedirectServer {
    pub fn new(https_port: u16) -> Self {
        Self { https_port }
    }

    /// Redirect target for a request with the given Host header and target
    pub fn location(&self, host: Option<&str>, path_and_query: &str) -> String {
        let host = host
            .map(strip_port)
            .filter(|host| !host.is_empty())
            .unwrap_or("localhost");

        if self.https_port == 443 {
            format!("https://{}{}", host, path_and_query)
        } else {
            format!("https://{}:{}{}", host, self.https_port, path_and_query)
        }
    }
}

impl RequestHandler for RedirectServer {
    async fn handle_request(&self, req: Request<Body>, _ctx: RequestContext) -> Response<Body> {
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok());
        let path = req
            .uri()
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");

        let location = self.location(host, path);
        debug!(location = %location, "Redirecting to https");
        (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
    }
}

/// `example.org:80` -> `example.org`, `[::1]:80` -> `[::1]`
fn strip_port(host: &str) -> &str {
    match host.rfind(':') {
        Some(idx) if !host[idx..].contains(']') => &host[..idx],
        _ => host,
    }
}
