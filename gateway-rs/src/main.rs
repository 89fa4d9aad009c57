//! gateway-rs: API gateway reverse proxy
//!
//! Configured entirely from the environment, see [`GatewayConfig`].

use gateway_rs::catalog::build_route_table;
use gateway_rs::config::LogFormat;
use gateway_rs::route::{Route, RoutePath};
use gateway_rs::tls::TlsManager;
use gateway_rs::{GatewayConfig, HttpServer, Proxy, ProxyOptions, RedirectServer, ShutdownCoordinator};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;
    init_tracing(config.log_format);

    info!("Starting gateway-rs v{}", env!("CARGO_PKG_VERSION"));
    info!(
        internal = %config.internal.protocol,
        external = %config.external.protocol,
        development = config.is_development,
        "Loaded configuration"
    );

    let table = build_route_table(&config)?;
    info!("Configured routes:");
    for route in table.routes() {
        match route {
            Route::Proxy(proxy) => {
                let upstream = proxy.upstream();
                info!(
                    "  {} -> {}://{}:{}{}",
                    proxy.path(),
                    upstream.protocol,
                    upstream.host,
                    upstream.port,
                    upstream.path
                );
            }
            Route::Response(response) => {
                info!("  {} -> {}", response.path(), response.status_code())
            }
        }
    }

    let options = ProxyOptions {
        logging_enabled: true,
        headers: config.headers.clone(),
        upstream_ca: config
            .is_internal_ssl_enabled()
            .then(|| config.internal.ca_path.clone()),
    };
    let proxy = Proxy::new(table, options)?;

    let tls = if config.external.is_tls_enabled() {
        let manager = TlsManager::new(&config.external.cert_path, &config.external.key_path);
        Some(manager.build_acceptor()?)
    } else {
        None
    };

    let mut coordinator = ShutdownCoordinator::new();
    let proxy_addr = SocketAddr::from(([0, 0, 0, 0], config.external.port));
    coordinator.register(HttpServer::listen(proxy_addr, proxy, tls).await?);

    if config.external.is_tls_enabled() {
        let redirect_addr = SocketAddr::from(([0, 0, 0, 0], config.external.redirect_port));
        let redirect = RedirectServer::new(config.external.port);
        coordinator.register(HttpServer::listen(redirect_addr, redirect, None).await?);
    }

    info!(host = %config.external.host_name, "Gateway ready");
    coordinator.run_until_signal().await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gateway_rs=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
