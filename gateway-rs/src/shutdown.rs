//! Shutdown coordination
//!
//! Owns every running listener and closes all of them exactly once, either
//! on request or when the process receives SIGINT/SIGTERM.

use futures_util::future::join_all;
use tracing::info;

use crate::error::Result;
use crate::server::HttpServer;

/// Coordinator for graceful shutdown of all listeners
#[derive(Default)]
pub struct ShutdownCoordinator {
    servers: Vec<HttpServer>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand a running server over to the coordinator
    pub fn register(&mut self, server: HttpServer) {
        self.servers.push(server);
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Close every registered server and wait for all of them
    pub async fn close_all(self) {
        info!(servers = self.servers.len(), "Shutting down");
        join_all(self.servers.into_iter().map(HttpServer::close)).await;
    }

    /// Wait for SIGINT or SIGTERM, then close every registered server
    pub async fn run_until_signal(self) -> Result<()> {
        wait_for_signal().await?;
        self.close_all().await;
        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received SIGINT");
        }
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redirect::RedirectServer;
    use std::net::SocketAddr;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_close_all() {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let mut coordinator = ShutdownCoordinator::new();
        let mut addrs = Vec::new();
        for _ in 0..2 {
            let server = HttpServer::listen(addr, RedirectServer::new(443), None)
                .await
                .unwrap();
            addrs.push(server.local_addr());
            coordinator.register(server);
        }
        assert_eq!(coordinator.len(), 2);

        coordinator.close_all().await;
        for addr in addrs {
            assert!(TcpStream::connect(addr).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_close_all_empty() {
        let coordinator = ShutdownCoordinator::new();
        assert!(coordinator.is_empty());
        coordinator.close_all().await;
    }
}
