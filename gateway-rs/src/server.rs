//! HTTP server base
//!
//! Accepts TCP (optionally TLS) connections, serves HTTP/1.1 and h2 on each
//! one with hyper-util's auto builder and hands every request to a
//! [`RequestHandler`]. [`HttpServer::close`] stops accepting and drains open
//! connections gracefully.

use axum::body::Body;
use axum::http::{Request, Response};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// Per-request data created by the server
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    /// When the request head was received
    pub received_at: Instant,
    pub remote_addr: SocketAddr,
    /// Request arrived over TLS
    pub secure: bool,
}

/// Application logic plugged into an [`HttpServer`]
pub trait RequestHandler: Send + Sync + 'static {
    /// Produce the response for one request. Failures are answered inline.
    fn handle_request(
        &self,
        req: Request<Body>,
        ctx: RequestContext,
    ) -> impl Future<Output = Response<Body>> + Send;
}

/// Running listener with its connection tasks
pub struct HttpServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    accept_task: JoinHandle<()>,
    connections: TaskTracker,
}

impl HttpServer {
    /// Bind `addr` and start accepting connections in the background.
    ///
    /// Returns once the socket is bound; port 0 picks an ephemeral port.
    pub async fn listen<H: RequestHandler>(
        addr: SocketAddr,
        handler: H,
        tls: Option<TlsAcceptor>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, tls = tls.is_some(), "HTTP server listening");

        let shutdown = CancellationToken::new();
        let connections = TaskTracker::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::new(handler),
            tls,
            shutdown.clone(),
            connections.clone(),
        ));

        Ok(Self {
            local_addr,
            shutdown,
            accept_task,
            connections,
        })
    }

    /// Address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, shut open connections down gracefully and wait for them.
    pub async fn close(self) {
        self.shutdown.cancel();
        if let Err(e) = self.accept_task.await {
            error!(address = %self.local_addr, error = %e, "Accept task failed");
        }

        self.connections.close();
        self.connections.wait().await;
        info!(address = %self.local_addr, "HTTP server stopped");
    }
}

async fn accept_loop<H: RequestHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    tls: Option<TlsAcceptor>,
    shutdown: CancellationToken,
    connections: TaskTracker,
) {
    loop {
        let (stream, remote_addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    // EMFILE and friends would otherwise spin
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            },
        };

        connections.spawn(serve_connection(
            stream,
            remote_addr,
            handler.clone(),
            tls.clone(),
            shutdown.clone(),
        ));
    }
}

async fn serve_connection<H: RequestHandler>(
    stream: TcpStream,
    remote_addr: SocketAddr,
    handler: Arc<H>,
    tls: Option<TlsAcceptor>,
    shutdown: CancellationToken,
) {
    let Some(acceptor) = tls else {
        serve_io(stream, remote_addr, handler, false, shutdown).await;
        return;
    };

    let tls_stream = tokio::select! {
        _ = shutdown.cancelled() => return,
        accepted = acceptor.accept(stream) => match accepted {
            Ok(tls_stream) => tls_stream,
            Err(e) => {
                warn!(remote = %remote_addr, error = %e, "TLS handshake failed");
                return;
            }
        },
    };
    serve_io(tls_stream, remote_addr, handler, true, shutdown).await;
}

async fn serve_io<I, H>(
    io: I,
    remote_addr: SocketAddr,
    handler: Arc<H>,
    secure: bool,
    shutdown: CancellationToken,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: RequestHandler,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let handler = handler.clone();
        let ctx = RequestContext {
            received_at: Instant::now(),
            remote_addr,
            secure,
        };
        async move { Ok::<_, Infallible>(handler.handle_request(req.map(Body::new), ctx).await) }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        debug!(remote = %remote_addr, error = %e, "Connection closed with error");
    }
}
