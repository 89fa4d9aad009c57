//! Built-in route catalog
//!
//! Declares which path prefixes belong to which backend service, plus the
//! responses the gateway answers by itself.

use std::collections::BTreeMap;
use tracing::info;

use crate::config::{GatewayConfig, RoutesFile};
use crate::error::Result;
use crate::route::{PredefinedResponse, ResponseRoute, Route};
use crate::route_mapper::{map_config_routes, ConfigRoute, MapOptions};
use crate::router::RouteTable;

pub const ADMIN_PATH: &str = "/admin";
pub const API_PATH: &str = "/api/v1";
pub const ADMIN_API_PATH: &str = "/admin/api/v1";

/// Identity-provider administration paths hidden outside development
const BLOCKED_PATHS: &[&str] = &[
    "/api/v1/auth/admin/",
    "/api/v1/auth/realms/master/",
    "/admin/api/v1/auth/admin/",
];

fn api_paths() -> Vec<String> {
    vec![API_PATH.to_string(), ADMIN_API_PATH.to_string()]
}

/// Base path only, kept for older clients
fn legacy(path: &str, service_name: &str, port: Option<u16>) -> ConfigRoute {
    ConfigRoute {
        port,
        ..ConfigRoute::new(path, service_name)
    }
}

/// Exposed under the api prefixes only
fn api(path: &str, service_name: &str, port: Option<u16>) -> ConfigRoute {
    ConfigRoute {
        port,
        skip_base_path: true,
        additional_paths: api_paths(),
        ..ConfigRoute::new(path, service_name)
    }
}

fn webapp(path: &str, port: Option<u16>) -> ConfigRoute {
    ConfigRoute {
        port,
        additional_paths: vec![ADMIN_PATH.to_string()],
        ..ConfigRoute::new(path, "webappserver")
    }
}

/// Route declarations for all backend services
pub fn config_routes(config: &GatewayConfig) -> Vec<ConfigRoute> {
    let ports = &config.ports;

    vec![
        legacy("/user/probands", "userservice", ports.userservice),
        legacy("/user/connectSormas", "authservice", ports.authservice),
        legacy("/user/requestToken", "authservice", ports.authservice),
        api("/user/changePassword", "authservice", ports.authservice),
        api("/user/login", "authservice", ports.authservice),
        api("/user/loginWithKey", "authservice", ports.authservice),
        api("/user/logout", "authservice", ports.authservice),
        api("/user/newPassword", "authservice", ports.authservice),
        api("/auth/", "authservice", ports.authservice),
        api(
            "/questionnaire/",
            "questionnaireservice",
            ports.questionnaireservice,
        ),
        api("/user/", "userservice", ports.userservice),
        api(
            "/notification/",
            "notificationservice",
            ports.notificationservice,
        ),
        api("/sample/", "sampletrackingservice", ports.sampletrackingservice),
        api("/personal/", "personaldataservice", ports.personaldataservice),
        api("/compliance/", "complianceservice", ports.complianceservice),
        api("/log/", "loggingservice", ports.loggingservice),
        api(
            "/feedbackstatistic/",
            "feedbackstatisticservice",
            ports.feedbackstatisticservice,
        ),
        webapp("/web/", config.webapp_port()),
        ConfigRoute {
            is_http_only: true,
            is_only_on_development_systems: true,
            additional_paths: vec![API_PATH.to_string()],
            port: ports.deploymentservice,
            ..ConfigRoute::new("/deployment/", "deploymentservice")
        },
        // catch all
        webapp("/", config.webapp_port()),
    ]
}

/// Responses answered by the gateway itself
pub fn predefined_responses(config: &GatewayConfig) -> Vec<ResponseRoute> {
    let metadata = serde_json::json!({ "minimalAppVersion": config.minimal_app_version });
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());

    let mut responses = vec![ResponseRoute::new(
        format!("{}/", API_PATH),
        PredefinedResponse {
            headers,
            body: Some(metadata.to_string()),
            status_code: Some(200),
        },
    )];

    if !config.is_development {
        responses.extend(BLOCKED_PATHS.iter().map(|path| {
            ResponseRoute::new(
                *path,
                PredefinedResponse {
                    status_code: Some(404),
                    ..PredefinedResponse::default()
                },
            )
        }));
    }

    responses
}

/// Build the route table for `config`.
///
/// A configured routes file replaces the built-in declarations; its
/// responses are added to the built-in ones.
pub fn build_route_table(config: &GatewayConfig) -> Result<RouteTable> {
    let (declarations, mut responses) = match &config.routes_file {
        Some(path) => {
            info!("Loading routes from {}", path.display());
            let file = RoutesFile::from_file(path)?;
            (file.routes, file.responses)
        }
        None => (config_routes(config), Vec::new()),
    };

    let options = MapOptions {
        is_development_system: config.is_development,
        is_ssl_enabled: config.is_internal_ssl_enabled(),
        default_port: None,
    };

    let mut routes: Vec<Route> = map_config_routes(&declarations, &options)
        .into_iter()
        .map(Route::from)
        .collect();
    let mut builtin = predefined_responses(config);
    builtin.append(&mut responses);
    routes.extend(builtin.into_iter().map(Route::from));

    RouteTable::new(routes)
}
