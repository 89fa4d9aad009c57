//! Reverse proxy request handling
//!
//! Resolves each request against the route table, then either answers it
//! from a predefined response or forwards it to the matched upstream and
//! streams the upstream response back.

use axum::body::Body;
use axum::http::header::{HeaderMap, HeaderName, HeaderValue, HOST};
use axum::http::{Method, Request, Response, StatusCode, Uri, Version};
use axum::response::IntoResponse;
use hyper::body::{Frame, SizeHint};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SecurityHeaders;
use crate::error::{GatewayError, Result};
use crate::route::{ProxyRoute, ResponseRoute};
use crate::router::{MatchedRoute, RouteTable};
use crate::server::{RequestContext, RequestHandler};
use crate::tls::upstream_client_config;

/// HTTP client type for forwarding requests
type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Connection-level headers never forwarded in either direction
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Proxy settings besides the route table
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    /// Emit one access log line per proxied request
    pub logging_enabled: bool,
    pub headers: SecurityHeaders,
    /// CA bundle for https upstreams
    pub upstream_ca: Option<PathBuf>,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            logging_enabled: true,
            headers: SecurityHeaders::default(),
            upstream_ca: None,
        }
    }
}

/// Reverse proxy handler
pub struct Proxy {
    table: RouteTable,
    client: HttpClient,
    security_headers: Vec<(HeaderName, HeaderValue)>,
    logging_enabled: bool,
}

impl Proxy {
    /// Create a proxy over `table`
    pub fn new(table: RouteTable, options: ProxyOptions) -> Result<Self> {
        let tls_config = upstream_client_config(options.upstream_ca.as_deref())?;
        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .build();
        let client: HttpClient = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            table,
            client,
            security_headers: security_headers(&options.headers)?,
            logging_enabled: options.logging_enabled,
        })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.table
    }

    async fn forward(
        &self,
        req: Request<Body>,
        route: &ProxyRoute,
        forward_path: &str,
        ctx: RequestContext,
    ) -> Response<Body> {
        let upstream = route.upstream();
        let access = self.logging_enabled.then(|| AccessLog {
            status: 0,
            method: req.method().clone(),
            url: request_url(req.uri()),
            service: upstream.service_name.clone(),
            received_at: ctx.received_at,
        });

        let uri = match upstream_uri(route, forward_path, req.uri().query()) {
            Ok(uri) => uri,
            Err(e) => {
                warn!(path = %req.uri().path(), error = %e, "Cannot build upstream URI");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };
        debug!(service = %upstream.service_name, uri = %uri, "Forwarding request");

        let (mut parts, body) = req.into_parts();
        parts.uri = uri;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        parts.headers.remove(HOST);

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                for (name, value) in &self.security_headers {
                    parts.headers.insert(name.clone(), value.clone());
                }

                let access = access.map(|log| AccessLog {
                    status: parts.status.as_u16(),
                    ..log
                });
                Response::from_parts(
                    parts,
                    Body::new(LoggedBody {
                        inner: body,
                        access,
                    }),
                )
            }
            Err(e) => {
                if let Some(log) = access {
                    log.failed(StatusCode::BAD_GATEWAY, &error_chain(&e));
                }
                StatusCode::BAD_GATEWAY.into_response()
            }
        }
    }
}

impl RequestHandler for Proxy {
    async fn handle_request(&self, req: Request<Body>, ctx: RequestContext) -> Response<Body> {
        let path = req.uri().path();

        if path.starts_with("//") {
            warn!(path = %path, "Rejecting request path with empty leading segment");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }

        match self.table.match_route(path) {
            Some(MatchedRoute::Proxy {
                route,
                forward_path,
            }) => self.forward(req, route, &forward_path, ctx).await,
            Some(MatchedRoute::Response(route)) => {
                debug!(path = %path, "Serving predefined response");
                predefined_response(route, req.method())
            }
            None => {
                debug!(path = %path, "No route found");
                StatusCode::NOT_FOUND.into_response()
            }
        }
    }
}

fn security_headers(headers: &SecurityHeaders) -> Result<Vec<(HeaderName, HeaderValue)>> {
    [
        ("x-frame-options", &headers.x_frame_options),
        ("content-security-policy", &headers.content_security_policy),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(name, value)| {
        HeaderValue::try_from(value.as_str())
            .map(|value| (HeaderName::from_static(name), value))
            .map_err(|e| GatewayError::Config(format!("Invalid {} header value: {}", name, e)))
    })
    .collect()
}

fn predefined_response(route: &ResponseRoute, method: &Method) -> Response<Body> {
    let (status, body) = if method == Method::OPTIONS {
        (StatusCode::NO_CONTENT, Body::empty())
    } else {
        let status = StatusCode::from_u16(route.status_code()).unwrap_or(StatusCode::OK);
        let body = route
            .response
            .body
            .clone()
            .map(Body::from)
            .unwrap_or_else(Body::empty);
        (status, body)
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    // Validated when the route table was built
    for (name, value) in &route.response.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

fn upstream_uri(route: &ProxyRoute, forward_path: &str, query: Option<&str>) -> Result<Uri> {
    let upstream = route.upstream();
    let mut uri = format!(
        "{}://{}:{}{}",
        upstream.protocol.scheme(),
        upstream.host,
        upstream.port,
        forward_path
    );
    if let Some(query) = query {
        uri.push('?');
        uri.push_str(query);
    }
    uri.parse()
        .map_err(|e| GatewayError::Http(format!("invalid upstream URI {}: {}", uri, e)))
}

fn request_url(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all("connection")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Outcome of one proxied request
struct AccessLog {
    status: u16,
    method: Method,
    url: String,
    service: String,
    received_at: Instant,
}

impl AccessLog {
    fn elapsed_ms(&self) -> u128 {
        self.received_at.elapsed().as_millis()
    }

    fn completed(self) {
        info!(
            target: "gateway_rs::access",
            status = self.status,
            method = %self.method,
            url = %self.url,
            service = %self.service,
            elapsed_ms = self.elapsed_ms() as u64,
            "{} {} {}",
            self.status,
            self.method,
            self.url
        );
    }

    fn failed(self, status: StatusCode, error: &str) {
        warn!(
            target: "gateway_rs::access",
            status = status.as_u16(),
            method = %self.method,
            url = %self.url,
            service = %self.service,
            elapsed_ms = self.elapsed_ms() as u64,
            error = %error,
            "{} {} {}",
            status.as_u16(),
            self.method,
            self.url
        );
    }
}

/// Response body that logs the request once the body is done or dropped
struct LoggedBody<B> {
    inner: B,
    access: Option<AccessLog>,
}

impl<B> hyper::body::Body for LoggedBody<B>
where
    B: hyper::body::Body + Unpin,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let frame = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(None) = frame {
            if let Some(log) = this.access.take() {
                log.completed();
            }
        }
        frame
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for LoggedBody<B> {
    fn drop(&mut self) {
        if let Some(log) = self.access.take() {
            log.completed();
        }
    }
}
