//! Route model
//!
//! A route is either a proxy route (path prefix forwarded to an upstream) or
//! a response route (exact path answered with a canned response). Proxy
//! route paths may contain named segments such as `/public/:id`, which match
//! exactly one non-empty path segment and can be referenced from the
//! upstream path.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::GatewayError;

/// Anything that occupies a path in the route table
pub trait RoutePath {
    /// The path this route is registered under
    fn path(&self) -> &str;
}

/// Upstream protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    /// URI scheme for this protocol
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// Port used when nothing else is configured
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https => 443,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

impl FromStr for Protocol {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(GatewayError::Config(format!(
                "Unknown protocol '{}', expected http or https",
                other
            ))),
        }
    }
}

/// Backend a proxy route forwards to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    /// DNS name or address to connect to
    pub host: String,
    /// Label used in log lines only
    pub service_name: String,
    pub port: u16,
    /// Replaces the matched route path when forwarding
    pub path: String,
    pub protocol: Protocol,
}

impl Upstream {
    /// Plain http upstream labelled with its host name
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            service_name: host.clone(),
            host,
            port,
            path: path.into(),
            protocol: Protocol::Http,
        }
    }
}

/// Route that forwards every request under `path` to an upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    path: String,
    upstream: Upstream,
    pattern: PathPattern,
    template: PathPattern,
}

impl ProxyRoute {
    pub fn new(path: impl Into<String>, upstream: Upstream) -> Self {
        let path = path.into();
        let pattern = PathPattern::parse(&path);
        let template = PathPattern::parse(&upstream.path);
        Self {
            path,
            upstream,
            pattern,
            template,
        }
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// Prefix match of `candidate` against the route path.
    pub fn matches(&self, candidate: &str) -> bool {
        self.pattern.match_prefix(candidate).is_some()
    }

    /// Rewrites `candidate` for the upstream, or `None` if the route does not match.
    ///
    /// The matched prefix is replaced by the upstream path with captured
    /// segments substituted; everything after the prefix is kept as is.
    pub fn rewrite(&self, candidate: &str) -> Option<String> {
        let matched = self.pattern.match_prefix(candidate)?;
        let base = self.template.render(&matched.params);
        Some(join_paths(&base, &candidate[matched.consumed..]))
    }

    /// Named segments used by the upstream path but never captured by the route path
    pub(crate) fn unbound_params(&self) -> Vec<&str> {
        self.template
            .param_names()
            .filter(|name| !self.pattern.param_names().any(|own| own == *name))
            .collect()
    }
}

impl RoutePath for ProxyRoute {
    fn path(&self) -> &str {
        &self.path
    }
}

/// Canned response served by a response route
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PredefinedResponse {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    /// Defaults to 200
    pub status_code: Option<u16>,
}

/// Route answered locally without contacting any upstream
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResponseRoute {
    pub path: String,
    #[serde(default)]
    pub response: PredefinedResponse,
}

impl ResponseRoute {
    pub fn new(path: impl Into<String>, response: PredefinedResponse) -> Self {
        Self {
            path: path.into(),
            response,
        }
    }

    /// Exact match, unlike proxy routes.
    pub fn matches(&self, candidate: &str) -> bool {
        self.path == candidate
    }

    pub fn status_code(&self) -> u16 {
        self.response.status_code.unwrap_or(200)
    }
}

impl RoutePath for ResponseRoute {
    fn path(&self) -> &str {
        &self.path
    }
}

/// Entry of the route table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Proxy(ProxyRoute),
    Response(ResponseRoute),
}

impl Route {
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Route::Proxy(route) => route.matches(candidate),
            Route::Response(route) => route.matches(candidate),
        }
    }
}

impl RoutePath for Route {
    fn path(&self) -> &str {
        match self {
            Route::Proxy(route) => route.path(),
            Route::Response(route) => route.path(),
        }
    }
}

impl From<ProxyRoute> for Route {
    fn from(route: ProxyRoute) -> Self {
        Route::Proxy(route)
    }
}

impl From<ResponseRoute> for Route {
    fn from(route: ResponseRoute) -> Self {
        Route::Response(route)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Compiled route path with optional `:name` segments
#[derive(Debug, Clone, PartialEq, Eq)]
struct PathPattern {
    segments: Vec<Segment>,
}

#[derive(Debug)]
struct PrefixMatch<'a> {
    params: Vec<(&'a str, &'a str)>,
    /// Bytes of the candidate covered by the pattern
    consumed: usize,
}

impl PathPattern {
    fn parse(path: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = path.char_indices().peekable();

        while let Some((idx, c)) = chars.next() {
            if c == ':' {
                let start = idx + 1;
                let mut end = start;
                while let Some(&(i, n)) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        end = i + n.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                if end > start {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Param(path[start..end].to_string()));
                    continue;
                }
            }
            literal.push(c);
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    fn match_prefix<'a>(&'a self, candidate: &'a str) -> Option<PrefixMatch<'a>> {
        let mut pos = 0;
        let mut params = Vec::new();

        for segment in &self.segments {
            let rest = &candidate[pos..];
            match segment {
                Segment::Literal(literal) => {
                    if !rest.starts_with(literal.as_str()) {
                        return None;
                    }
                    pos += literal.len();
                }
                Segment::Param(name) => {
                    let len = rest.find('/').unwrap_or(rest.len());
                    if len == 0 {
                        return None;
                    }
                    params.push((name.as_str(), &rest[..len]));
                    pos += len;
                }
            }
        }

        Some(PrefixMatch {
            params,
            consumed: pos,
        })
    }

    fn render(&self, params: &[(&str, &str)]) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => out.push_str(literal),
                Segment::Param(name) => match params.iter().find(|(key, _)| key == name) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push(':');
                        out.push_str(name);
                    }
                },
            }
        }
        out
    }

    fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

/// Concatenates two path pieces, collapsing a doubled `/` at the seam.
fn join_paths(base: &str, rest: &str) -> String {
    if base.ends_with('/') && rest.starts_with('/') {
        format!("{}{}", base, &rest[1..])
    } else {
        format!("{}{}", base, rest)
    }
}
