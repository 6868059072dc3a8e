use crate::config::ResourceConfig;
use crate::error::{ConfigError, ProxyError, Result};
use url::Url;

/// One configured backend, owning its own resolved target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Path prefix this route serves
    pub endpoint: String,
    /// Backend host
    pub host: String,
    /// Backend port
    pub port: u16,
    /// `http://host:port`, without trailing slash
    base_url: String,
}

impl Route {
    fn from_resource(
        index: usize,
        resource: &ResourceConfig,
    ) -> std::result::Result<Self, ConfigError> {
        let port = u16::try_from(resource.port).map_err(|_| {
            ConfigError::new(
                format!("Resources[{}].Port", index),
                "port must be between 1 and 65535",
            )
        })?;

        let url = Url::parse(&format!("http://{}:{}", resource.domain_name, port)).map_err(|e| {
            ConfigError::new(
                format!("Resources[{}].DomainName", index),
                format!("invalid backend host '{}': {}", resource.domain_name, e),
            )
        })?;

        let host = url.host_str().unwrap_or(&resource.domain_name).to_string();

        Ok(Self {
            endpoint: resource.endpoint.clone(),
            host,
            port,
            base_url: url.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Backend authority, used as the outbound `Host`
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether `path` falls under this route's endpoint.
    ///
    /// Matching is segment-aware: `/api` serves `/api` and `/api/users` but
    /// not `/apiary`. An endpoint ending in `/` serves its whole subtree.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.endpoint.as_str()) {
            Some("") => true,
            Some(rest) => self.endpoint.ends_with('/') || rest.starts_with('/'),
            None => false,
        }
    }

    /// Backend URL for a request. The path and query pass through unchanged.
    pub fn backend_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) => format!("{}{}?{}", self.base_url, path, q),
            None => format!("{}{}", self.base_url, path),
        }
    }
}

/// Immutable prefix-to-backend table, safe to share between tasks
#[derive(Debug, Clone)]
pub struct RouteTable {
    /// Sorted by endpoint length, longest first
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build the table from already validated resources
    pub fn new(resources: &[ResourceConfig]) -> Result<Self> {
        let mut routes = resources
            .iter()
            .enumerate()
            .map(|(index, resource)| Route::from_resource(index, resource))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        routes.sort_by(|a, b| {
            b.endpoint
                .len()
                .cmp(&a.endpoint.len())
                .then_with(|| a.endpoint.cmp(&b.endpoint))
        });

        for pair in routes.windows(2) {
            if pair[0].endpoint == pair[1].endpoint {
                return Err(ProxyError::Config(ConfigError::new(
                    "Resources",
                    format!("duplicate endpoint '{}'", pair[0].endpoint),
                )));
            }
        }

        Ok(Self { routes })
    }

    /// Longest endpoint matching `path`
    pub fn resolve(&self, path: &str) -> Result<&Route> {
        self.routes
            .iter()
            .find(|route| route.matches(path))
            .ok_or_else(|| ProxyError::RouteNotFound(path.to_string()))
    }

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
