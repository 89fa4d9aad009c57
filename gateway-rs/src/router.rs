//! Route table for gateway-rs
//!
//! Holds the validated, sorted routes and resolves incoming request paths
//! against them. The table is built once at startup and never mutated.

use axum::http::{HeaderName, HeaderValue, StatusCode};

use crate::error::{GatewayError, Result};
use crate::route::{ProxyRoute, ResponseRoute, Route, RoutePath};
use crate::route_mapper::{check_routes, sort_routes};

/// Immutable route table, most specific route first
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

/// Matched route with resolved forwarding path
#[derive(Debug, Clone)]
pub enum MatchedRoute<'a> {
    /// Forward to an upstream
    Proxy {
        route: &'a ProxyRoute,
        /// Path to request from the upstream, without query string
        forward_path: String,
    },
    /// Answer locally
    Response(&'a ResponseRoute),
}

impl RouteTable {
    /// Validate, de-duplicate and sort the given routes.
    pub fn new(routes: Vec<Route>) -> Result<Self> {
        for route in &routes {
            validate(route)?;
        }
        let routes = sort_routes(check_routes(routes)?);
        Ok(Self { routes })
    }

    /// Find the first route matching `path`.
    pub fn match_route(&self, path: &str) -> Option<MatchedRoute<'_>> {
        self.routes.iter().find_map(|route| match route {
            Route::Proxy(proxy) => proxy.rewrite(path).map(|forward_path| MatchedRoute::Proxy {
                route: proxy,
                forward_path,
            }),
            Route::Response(response) if response.matches(path) => {
                Some(MatchedRoute::Response(response))
            }
            Route::Response(_) => None,
        })
    }

    /// Get all routes in lookup order
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn validate(route: &Route) -> Result<()> {
    let invalid = |reason: String| GatewayError::InvalidRoute {
        path: route.path().to_string(),
        reason,
    };

    if route.path().is_empty() {
        return Err(invalid("path must not be empty".to_string()));
    }

    match route {
        Route::Proxy(proxy) => {
            let upstream = proxy.upstream();
            if upstream.port == 0 {
                return Err(invalid(format!(
                    "upstream {} has port 0",
                    upstream.service_name
                )));
            }
            if upstream.host.is_empty() {
                return Err(invalid("upstream host must not be empty".to_string()));
            }
            let unbound = proxy.unbound_params();
            if !unbound.is_empty() {
                return Err(invalid(format!(
                    "upstream path {} uses segments not captured by the route: {}",
                    upstream.path,
                    unbound.join(", ")
                )));
            }
        }
        Route::Response(response) => {
            StatusCode::from_u16(response.status_code())
                .map_err(|e| invalid(format!("invalid status code: {}", e)))?;
            for (name, value) in &response.response.headers {
                HeaderName::try_from(name.as_str())
                    .map_err(|e| invalid(format!("invalid header name {}: {}", name, e)))?;
                HeaderValue::try_from(value.as_str())
                    .map_err(|e| invalid(format!("invalid value for header {}: {}", name, e)))?;
            }
        }
    }

    Ok(())
}
