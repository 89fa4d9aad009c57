//! Expansion of declarative route configuration into proxy routes
//!
//! One [`ConfigRoute`] becomes a base route plus one route per additional
//! path prefix (`/admin`, `/api/v1`, ...), all sharing the same upstream.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;

use crate::error::{GatewayError, Result};
use crate::route::{Protocol, ProxyRoute, RoutePath, Upstream};

/// Declarative route as written in the catalog or a routes file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConfigRoute {
    pub path: String,
    pub service_name: String,
    #[serde(default)]
    pub is_http_only: bool,
    #[serde(default)]
    pub is_only_on_development_systems: bool,
    /// Only emit the additional-path variants
    #[serde(default)]
    pub skip_base_path: bool,
    #[serde(default)]
    pub additional_paths: Vec<String>,
    /// Overrides `service_name` as the DNS target
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl ConfigRoute {
    pub fn new(path: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            service_name: service_name.into(),
            is_http_only: false,
            is_only_on_development_systems: false,
            skip_base_path: false,
            additional_paths: Vec::new(),
            host: None,
            port: None,
        }
    }
}

/// Environment-dependent inputs of the mapping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapOptions {
    pub is_development_system: bool,
    pub is_ssl_enabled: bool,
    pub default_port: Option<u16>,
}

/// Expand config routes into proxy routes.
pub fn map_config_routes(config_routes: &[ConfigRoute], options: &MapOptions) -> Vec<ProxyRoute> {
    let mut routes = Vec::new();

    for route in config_routes {
        if route.is_only_on_development_systems && !options.is_development_system {
            continue;
        }

        let protocol = if options.is_ssl_enabled && !route.is_http_only {
            Protocol::Https
        } else {
            Protocol::Http
        };
        let upstream = Upstream {
            host: route.host.clone().unwrap_or_else(|| route.service_name.clone()),
            service_name: route.service_name.clone(),
            port: route
                .port
                .or(options.default_port)
                .unwrap_or_else(|| protocol.default_port()),
            path: route.path.clone(),
            protocol,
        };

        if !route.skip_base_path {
            routes.push(ProxyRoute::new(route.path.clone(), upstream.clone()));
        }
        for additional in &route.additional_paths {
            routes.push(ProxyRoute::new(
                format!("{}{}", additional, route.path),
                upstream.clone(),
            ));
        }
    }

    routes
}

/// Sort routes by path length, longest first.
///
/// The sort is stable, so routes of equal length keep their relative order.
/// Length stands in for specificity: `/api/v1/test/` is tried before `/test/`.
pub fn sort_routes<R: RoutePath>(mut routes: Vec<R>) -> Vec<R> {
    routes.sort_by_key(|route| Reverse(route.path().len()));
    routes
}

/// Fail if any path occurs more than once.
pub fn check_routes<R: RoutePath>(routes: Vec<R>) -> Result<Vec<R>> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for route in &routes {
        *counts.entry(route.path()).or_default() += 1;
    }

    if let Some(route) = routes.iter().find(|route| counts[route.path()] != 1) {
        return Err(GatewayError::DuplicateRoute {
            path: route.path().to_string(),
        });
    }

    Ok(routes)
}
