//! gateway-rs: API gateway reverse proxy
//!
//! Routes external HTTP(S) traffic to internal backend services based on a
//! declarative route catalog.
//!
//! # Features
//!
//! - Prefix routing with named segments (`/public/:id`), most specific first
//! - Predefined responses served by the gateway itself
//! - TLS termination, TLS to upstreams verified against an internal CA
//! - HTTP to HTTPS redirect listener
//! - Graceful shutdown of all listeners on SIGINT/SIGTERM
//!
//! # Example Routes File
//!
//! ```toml
//! [[routes]]
//! path = "/questionnaire/"
//! service_name = "questionnaireservice"
//! additional_paths = ["/api/v1", "/admin/api/v1"]
//! skip_base_path = true
//!
//! [[routes]]
//! path = "/"
//! service_name = "webappserver"
//! port = 8000
//!
//! [[responses]]
//! path = "/robots.txt"
//! response = { body = "User-agent: *", headers = { content-type = "text/plain" } }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod proxy;
pub mod redirect;
pub mod route;
pub mod route_mapper;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod tls;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use proxy::{Proxy, ProxyOptions};
pub use redirect::RedirectServer;
pub use route::{ProxyRoute, ResponseRoute, Route};
pub use router::RouteTable;
pub use server::{HttpServer, RequestContext, RequestHandler};
pub use shutdown::ShutdownCoordinator;
