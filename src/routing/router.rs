//! Route lookup.
//!
//! # Responsibilities
//! - Map a service name and remainder path to an upstream path
//! - Decide whether the request needs a credential
//! - Return an explicit no-match for unknown services
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) service lookup via HashMap

use std::collections::HashMap;

use crate::registry::ServiceDescriptor;
use crate::routing::matcher::PathPrefixMatcher;

/// Whether a route needs a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// A valid credential is mandatory.
    Required,
    /// A credential is validated when presented; anonymous callers are allowed.
    Optional,
}

#[derive(Debug, Clone)]
struct Route {
    upstream_prefix: String,
    require_auth: bool,
    public_paths: PathPrefixMatcher,
    rate_limit: Option<u64>,
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub service: String,
    /// Path to request on the backend, always starting with `/`.
    pub upstream_path: String,
    pub auth: AuthPolicy,
    /// The service's own rate ceiling, if it has one.
    pub rate_limit: Option<u64>,
}

#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<String, Route>,
}

impl RouteTable {
    pub fn from_descriptors<'a, I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = &'a ServiceDescriptor>,
    {
        let routes = descriptors
            .into_iter()
            .map(|d| {
                (
                    d.name.clone(),
                    Route {
                        upstream_prefix: d.upstream_prefix.clone(),
                        require_auth: d.require_auth,
                        public_paths: PathPrefixMatcher::new(&d.public_paths),
                        rate_limit: d.rate_limit,
                    },
                )
            })
            .collect();

        Self { routes }
    }

    /// Resolve `/{prefix}/{service}/{rest}`; `None` for unknown services.
    pub fn resolve(&self, service: &str, rest: &str) -> Option<RouteMatch> {
        let route = self.routes.get(service)?;
        let rest = rest.trim_start_matches('/');

        let upstream_path = match (route.upstream_prefix.is_empty(), rest.is_empty()) {
            (true, true) => "/".to_string(),
            (true, false) => format!("/{rest}"),
            (false, true) => route.upstream_prefix.clone(),
            (false, false) => format!("{}/{rest}", route.upstream_prefix),
        };

        let auth = if !route.require_auth || route.public_paths.matches(rest) {
            AuthPolicy::Optional
        } else {
            AuthPolicy::Required
        };

        Some(RouteMatch {
            service: service.to_string(),
            upstream_path,
            auth,
            rate_limit: route.rate_limit,
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    fn table() -> RouteTable {
        let mut auth = ServiceConfig::new("auth", "http://auth-service:8001", 10);
        auth.public_paths = vec!["/login".into(), "/register".into()];
        let jobs = ServiceConfig::new("jobs", "http://job-service:8002", 30);
        let mut root = ServiceConfig::new("files", "http://files:9000", 30);
        root.upstream_prefix = Some(String::new());
        root.require_auth = false;

        let descriptors: Vec<_> = [auth, jobs, root]
            .iter()
            .map(|c| ServiceDescriptor::from_config(c).unwrap())
            .collect();
        RouteTable::from_descriptors(&descriptors)
    }

    #[test]
    fn test_upstream_path_keeps_service_prefix() {
        let table = table();
        let m = table.resolve("jobs", "42/logs").unwrap();
        assert_eq!(m.upstream_path, "/jobs/42/logs");
        assert_eq!(m.auth, AuthPolicy::Required);

        assert_eq!(table.resolve("jobs", "").unwrap().upstream_path, "/jobs");
    }

    #[test]
    fn test_empty_prefix_maps_to_root() {
        let table = table();
        assert_eq!(table.resolve("files", "a/b").unwrap().upstream_path, "/a/b");
        assert_eq!(table.resolve("files", "").unwrap().upstream_path, "/");
        assert_eq!(table.resolve("files", "a").unwrap().auth, AuthPolicy::Optional);
    }

    #[test]
    fn test_public_paths_are_optional() {
        let table = table();
        assert_eq!(table.resolve("auth", "login").unwrap().auth, AuthPolicy::Optional);
        assert_eq!(table.resolve("auth", "register/confirm").unwrap().auth, AuthPolicy::Optional);
        assert_eq!(table.resolve("auth", "me").unwrap().auth, AuthPolicy::Required);
    }

    #[test]
    fn test_service_rate_limit_carried() {
        let mut jobs = ServiceConfig::new("jobs", "http://job-service:8002", 30);
        jobs.rate_limit_requests = Some(30);
        let descriptors = [ServiceDescriptor::from_config(&jobs).unwrap()];
        let jobs_only = RouteTable::from_descriptors(&descriptors);

        assert_eq!(jobs_only.resolve("jobs", "1").unwrap().rate_limit, Some(30));
        assert_eq!(table().resolve("auth", "me").unwrap().rate_limit, None);
    }

    #[test]
    fn test_unknown_service() {
        assert!(table().resolve("billing", "x").is_none());
    }
}
