//! Configuration for gateway-rs
//!
//! Settings come from the process environment (`PROTOCOL`, `EXTERNAL_PORT`,
//! `USERSERVICE_PORT`, ...). An optional TOML routes file can replace the
//! built-in route catalog.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{GatewayError, Result};
use crate::route::{Protocol, ResponseRoute};
use crate::route_mapper::ConfigRoute;

/// Main gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Connections to backend services
    pub internal: InternalConfig,
    /// Client-facing listener
    pub external: ExternalConfig,
    /// Security headers added to proxied responses
    pub headers: SecurityHeaders,
    /// Enables development-only routes
    pub is_development: bool,
    /// Served as public metadata on the API root
    pub minimal_app_version: String,
    /// Replaces the built-in route catalog when set
    pub routes_file: Option<PathBuf>,
    pub log_format: LogFormat,
    /// Per-backend port overrides
    pub ports: ServicePorts,
}

/// Upstream side configuration
#[derive(Debug, Clone)]
pub struct InternalConfig {
    pub protocol: Protocol,
    /// CA bundle used to verify https upstreams
    pub ca_path: PathBuf,
}

/// Listener side configuration
#[derive(Debug, Clone)]
pub struct ExternalConfig {
    pub protocol: Protocol,
    pub port: u16,
    pub host_name: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Plain HTTP listener that redirects to https
    pub redirect_port: u16,
}

impl ExternalConfig {
    pub fn is_tls_enabled(&self) -> bool {
        self.protocol == Protocol::Https
    }
}

/// Values for `X-Frame-Options` and `Content-Security-Policy`; empty means omit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityHeaders {
    pub x_frame_options: String,
    pub content_security_policy: String,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Port overrides for the backend services
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicePorts {
    pub userservice: Option<u16>,
    pub authservice: Option<u16>,
    pub questionnaireservice: Option<u16>,
    pub notificationservice: Option<u16>,
    pub sampletrackingservice: Option<u16>,
    pub personaldataservice: Option<u16>,
    pub complianceservice: Option<u16>,
    pub loggingservice: Option<u16>,
    pub feedbackstatisticservice: Option<u16>,
    pub webappserver_http: Option<u16>,
    pub webappserver_https: Option<u16>,
    pub deploymentservice: Option<u16>,
}

/// Flat view of the environment; keys are the lowercased variable names
#[derive(Debug, Deserialize)]
struct EnvSettings {
    #[serde(default = "default_protocol")]
    protocol: String,
    #[serde(default = "default_ca_path")]
    ssl_ca: String,
    #[serde(default = "default_protocol")]
    external_protocol: String,
    #[serde(default = "default_external_port")]
    external_port: u16,
    #[serde(default = "default_host_name")]
    external_host_name: String,
    #[serde(default = "default_cert_path")]
    ssl_certificate: String,
    #[serde(default = "default_key_path")]
    ssl_certificate_key: String,
    #[serde(default = "default_redirect_port")]
    http_redirect_port: u16,
    #[serde(default)]
    x_frame_options: String,
    #[serde(default)]
    content_security_policy: String,
    #[serde(default = "default_false")]
    is_development_system: String,
    #[serde(default = "default_app_version")]
    minimal_app_version: String,
    routes_file: Option<String>,
    #[serde(default)]
    log_format: String,

    userservice_port: Option<String>,
    authservice_port: Option<String>,
    questionnaireservice_port: Option<String>,
    notificationservice_port: Option<String>,
    sampletrackingservice_port: Option<String>,
    personaldataservice_port: Option<String>,
    complianceservice_port: Option<String>,
    loggingservice_port: Option<String>,
    feedbackstatisticservice_port: Option<String>,
    webappserver_http_port: Option<String>,
    webappserver_https_port: Option<String>,
    deploymentservice_port: Option<String>,
}

fn default_protocol() -> String {
    "https".to_string()
}

fn default_ca_path() -> String {
    "/etc/ssl/ca.cert".to_string()
}

fn default_external_port() -> u16 {
    443
}

fn default_host_name() -> String {
    "_".to_string()
}

fn default_cert_path() -> String {
    "/etc/ssl/api.cert".to_string()
}

fn default_key_path() -> String {
    "/etc/ssl/api.key".to_string()
}

fn default_redirect_port() -> u16 {
    80
}

fn default_false() -> String {
    "false".to_string()
}

fn default_app_version() -> String {
    "1.27.0".to_string()
}

/// Unset or unparsable port variables count as absent.
fn lenient_port(value: Option<String>) -> Option<u16> {
    value.and_then(|v| v.trim().parse().ok())
}

impl GatewayConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_builder(Config::builder())
    }

    /// Load configuration from the environment layered under `builder`'s sources
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings: EnvSettings = builder
            .add_source(Environment::default())
            .build()?
            .try_deserialize()?;
        Self::from_settings(settings)
    }

    fn from_settings(env: EnvSettings) -> Result<Self> {
        let log_format = match env.log_format.to_ascii_lowercase().as_str() {
            "" | "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => {
                return Err(GatewayError::Config(format!(
                    "Unknown log format '{}', expected pretty or json",
                    other
                )))
            }
        };

        let config = Self {
            internal: InternalConfig {
                protocol: env.protocol.parse()?,
                ca_path: PathBuf::from(env.ssl_ca),
            },
            external: ExternalConfig {
                protocol: env.external_protocol.parse()?,
                port: env.external_port,
                host_name: env.external_host_name,
                cert_path: PathBuf::from(env.ssl_certificate),
                key_path: PathBuf::from(env.ssl_certificate_key),
                redirect_port: env.http_redirect_port,
            },
            headers: SecurityHeaders {
                x_frame_options: env.x_frame_options,
                content_security_policy: env.content_security_policy,
            },
            is_development: env.is_development_system.eq_ignore_ascii_case("true"),
            minimal_app_version: env.minimal_app_version,
            routes_file: env.routes_file.filter(|p| !p.is_empty()).map(PathBuf::from),
            log_format,
            ports: ServicePorts {
                userservice: lenient_port(env.userservice_port),
                authservice: lenient_port(env.authservice_port),
                questionnaireservice: lenient_port(env.questionnaireservice_port),
                notificationservice: lenient_port(env.notificationservice_port),
                sampletrackingservice: lenient_port(env.sampletrackingservice_port),
                personaldataservice: lenient_port(env.personaldataservice_port),
                complianceservice: lenient_port(env.complianceservice_port),
                loggingservice: lenient_port(env.loggingservice_port),
                feedbackstatisticservice: lenient_port(env.feedbackstatisticservice_port),
                webappserver_http: lenient_port(env.webappserver_http_port),
                webappserver_https: lenient_port(env.webappserver_https_port),
                deploymentservice: lenient_port(env.deploymentservice_port),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.external.port == 0 {
            return Err(GatewayError::Config(
                "EXTERNAL_PORT must be between 1 and 65535".to_string(),
            ));
        }
        if self.external.is_tls_enabled() && self.external.redirect_port == self.external.port {
            return Err(GatewayError::Config(format!(
                "HTTP_REDIRECT_PORT and EXTERNAL_PORT are both {}",
                self.external.port
            )));
        }
        Ok(())
    }

    /// Upstream TLS is used for every route that is not http-only
    pub fn is_internal_ssl_enabled(&self) -> bool {
        self.internal.protocol == Protocol::Https
    }

    /// Port of the web app server for the configured internal protocol
    pub fn webapp_port(&self) -> Option<u16> {
        match self.internal.protocol {
            Protocol::Http => self.ports.webappserver_http,
            Protocol::Https => self.ports.webappserver_https,
        }
    }
}

/// Route declarations loaded from a TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutesFile {
    #[serde(default)]
    pub routes: Vec<ConfigRoute>,
    /// Appended to the built-in predefined responses
    #[serde(default)]
    pub responses: Vec<ResponseRoute>,
}

impl RoutesFile {
    /// Load route declarations from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!(
                "Failed to read routes file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(overrides: &[(&str, &str)]) -> Result<GatewayConfig> {
        let mut builder = Config::builder();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        GatewayConfig::from_builder(builder)
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.internal.protocol, Protocol::Https);
        assert_eq!(config.internal.ca_path, PathBuf::from("/etc/ssl/ca.cert"));
        assert_eq!(config.external.protocol, Protocol::Https);
        assert_eq!(config.external.port, 443);
        assert_eq!(config.external.redirect_port, 80);
        assert_eq!(config.external.cert_path, PathBuf::from("/etc/ssl/api.cert"));
        assert_eq!(config.headers, SecurityHeaders::default());
        assert_eq!(config.minimal_app_version, "1.27.0");
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("protocol", "http"),
            ("external_protocol", "http"),
            ("external_port", "8080"),
            ("x_frame_options", "DENY"),
            ("is_development_system", "TRUE"),
            ("userservice_port", "4000"),
            ("authservice_port", "not-a-port"),
            ("webappserver_http_port", "8000"),
            ("log_format", "json"),
        ])
        .unwrap();

        assert!(!config.is_internal_ssl_enabled());
        assert!(!config.external.is_tls_enabled());
        assert_eq!(config.external.port, 8080);
        assert_eq!(config.headers.x_frame_options, "DENY");
        assert!(config.is_development);
        assert_eq!(config.ports.userservice, Some(4000));
        assert_eq!(config.ports.authservice, None);
        assert_eq!(config.webapp_port(), Some(8000));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_protocol() {
        assert!(matches!(
            load(&[("protocol", "ftp")]),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn test_redirect_port_collision() {
        assert!(load(&[("external_port", "80")]).is_err());
        assert!(load(&[("external_port", "80"), ("external_protocol", "http")]).is_ok());
    }

    #[test]
    fn test_parse_routes_file() {
        let toml = r#"
[[routes]]
path = "/questionnaire/"
service_name = "questionnaireservice"
additional_paths = ["/api/v1"]
skip_base_path = true

[[routes]]
path = "/"
service_name = "webappserver"
host = "web.internal"
port = 8000

[[responses]]
path = "/robots.txt"

[responses.response]
body = "User-agent: *"
status_code = 200

[responses.response.headers]
content-type = "text/plain"
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml.as_bytes()).unwrap();

        let routes = RoutesFile::from_file(file.path()).unwrap();
        assert_eq!(routes.routes.len(), 2);
        assert_eq!(routes.routes[1].host.as_deref(), Some("web.internal"));
        assert_eq!(routes.responses.len(), 1);
        assert_eq!(
            routes.responses[0].response.headers.get("content-type").map(String::as_str),
            Some("text/plain")
        );
    }

    #[test]
    fn test_missing_routes_file() {
        assert!(RoutesFile::from_file(Path::new("/nonexistent/routes.toml")).is_err());
    }
}
