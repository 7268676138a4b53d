//! Route table: matches `(method, path, endpoint-name)` to a handler with
//! path-parameter extraction, per the spec's router component.
//!
//! Match order: exact method + exact pattern beats exact method + wildcard
//! pattern beats `method = *`. Path segments are compared left to right;
//! `:name` binds the segment verbatim (URL-decoded), a lone `*` matches
//! exactly one segment, and `**` matches the remainder of the path — the
//! resolution of the spec's open question about wildcard semantics.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PodeError, Result};
use crate::middleware::{Handler, Middleware};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
    Trace,
    Connect,
    /// `*` as a route method: matches any incoming method, but loses to a
    /// route with an exact method match.
    Any,
}

impl Method {
    pub fn parse(s: &str) -> Option<Method> {
        Some(match s.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            "OPTIONS" => Method::Options,
            "HEAD" => Method::Head,
            "TRACE" => Method::Trace,
            "CONNECT" => Method::Connect,
            "*" => Method::Any,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
    /// `**` — matches the remainder of the path, must be the last segment.
    Remainder,
}

impl Segment {
    /// Lower is more specific; used to rank otherwise-tied matches.
    fn specificity(&self) -> u8 {
        match self {
            Segment::Literal(_) => 0,
            Segment::Param(_) => 1,
            Segment::Wildcard => 2,
            Segment::Remainder => 3,
        }
    }
}

/// A parsed route path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let normalized = normalize_path(pattern);
        let mut segments = Vec::new();
        let parts: Vec<&str> = normalized.split('/').filter(|p| !p.is_empty()).collect();
        for (i, part) in parts.iter().enumerate() {
            let seg = if let Some(name) = part.strip_prefix(':') {
                Segment::Param(name.to_string())
            } else if *part == "**" {
                if i != parts.len() - 1 {
                    return Err(PodeError::Configuration(
                        "'**' must be the last segment of a route pattern".into(),
                    ));
                }
                Segment::Remainder
            } else if *part == "*" {
                Segment::Wildcard
            } else {
                Segment::Literal(part.to_string())
            };
            segments.push(seg);
        }
        Ok(Self {
            raw: normalized,
            segments,
        })
    }

    /// Attempts to match `path` against this pattern, returning extracted
    /// named parameters on success along with a specificity score (lower is
    /// more specific).
    fn matches(&self, path_segments: &[&str]) -> Option<(HashMap<String, String>, u32)> {
        let mut params = HashMap::new();
        let mut score = 0u32;
        let mut si = 0usize;

        for seg in &self.segments {
            match seg {
                Segment::Remainder => {
                    score += Segment::Remainder.specificity() as u32;
                    si = path_segments.len();
                    break;
                }
                _ => {
                    let part = path_segments.get(si)?;
                    match seg {
                        Segment::Literal(lit) => {
                            if lit != part {
                                return None;
                            }
                        }
                        Segment::Param(name) => {
                            let decoded = urlencoding::decode(part).ok()?.into_owned();
                            params.insert(name.clone(), decoded);
                        }
                        Segment::Wildcard => {}
                        Segment::Remainder => unreachable!(),
                    }
                    score += seg.specificity() as u32;
                    si += 1;
                }
            }
        }

        if si != path_segments.len() {
            return None;
        }
        Some((params, score))
    }
}

fn normalize_path(path: &str) -> String {
    if path == "/" || path.is_empty() {
        return "/".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Static-content descriptor attached to a route that serves a directory
/// tree rather than invoking a handler.
#[derive(Debug, Clone)]
pub struct StaticContent {
    pub root: String,
    pub cache_max_age: Option<u64>,
}

/// A registered route.
pub struct Route {
    pub method: Method,
    pub pattern: PathPattern,
    pub endpoint_name: Option<String>,
    pub handler: Arc<dyn Handler>,
    pub middleware: Vec<Arc<dyn Middleware>>,
    pub auth_name: Option<String>,
    pub login: bool,
    pub logout: bool,
    pub static_content: Option<StaticContent>,
}

impl Route {
    pub fn new(method: Method, pattern: &str, handler: Arc<dyn Handler>) -> Result<Self> {
        Ok(Self {
            method,
            pattern: PathPattern::parse(pattern)?,
            endpoint_name: None,
            handler,
            middleware: Vec::new(),
            auth_name: None,
            login: false,
            logout: false,
            static_content: None,
        })
    }

    fn triple_key(&self) -> (Method, String, Option<String>) {
        (self.method, self.pattern.raw.clone(), self.endpoint_name.clone())
    }
}

/// The result of a successful route match.
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: HashMap<String, String>,
}

/// The route table, enforcing the uniqueness invariant from the spec's data
/// model: no two routes share the same `(method, pattern, endpoint-name)`.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, route: Route) -> Result<()> {
        let key = route.triple_key();
        if self.routes.iter().any(|r| r.triple_key() == key) {
            return Err(PodeError::Configuration(format!(
                "duplicate route: {:?} {} (endpoint {:?})",
                key.0, key.1, key.2
            )));
        }
        self.routes.push(route);
        Ok(())
    }

    /// Matches an incoming request. Per the spec: exact method beats
    /// `method = *`; among equally-method-eligible routes, the most
    /// specific pattern wins (ties are a configuration error caught at
    /// registration, not at match time).
    pub fn matches(&self, method: Method, path: &str, endpoint_name: Option<&str>) -> Option<RouteMatch<'_>> {
        let normalized = normalize_path(path);
        let path_segments: Vec<&str> = normalized.split('/').filter(|p| !p.is_empty()).collect();

        let mut best: Option<(RouteMatch<'_>, bool, u32)> = None;

        for route in &self.routes {
            if route.method != method && route.method != Method::Any {
                continue;
            }
            if let Some(filter) = &route.endpoint_name {
                if Some(filter.as_str()) != endpoint_name {
                    continue;
                }
            }
            let Some((params, score)) = route.pattern.matches(&path_segments) else {
                continue;
            };
            let exact_method = route.method == method;

            let candidate = (RouteMatch { route, params }, exact_method, score);
            best = match best {
                None => Some(candidate),
                Some((_, best_exact, best_score)) => {
                    // Exact method wins over `*`; among equals, lower
                    // specificity score (more literal segments) wins.
                    if candidate.1 && !best_exact {
                        Some(candidate)
                    } else if candidate.1 == best_exact && candidate.2 < best_score {
                        Some(candidate)
                    } else {
                        best
                    }
                }
            };
        }

        best.map(|(m, _, _)| m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{HandlerResult, RequestEvent};

    struct Noop;
    impl Handler for Noop {
        fn call(&self, _event: &mut RequestEvent) -> HandlerResult {
            Ok(true)
        }
    }

    fn route(method: Method, pattern: &str) -> Route {
        Route::new(method, pattern, Arc::new(Noop)).unwrap()
    }

    #[test]
    fn literal_beats_param_beats_wildcard() {
        let mut router = Router::new();
        router.add(route(Method::Get, "/users/:id")).unwrap();
        router.add(route(Method::Get, "/users/active")).unwrap();
        router.add(route(Method::Get, "/users/*")).unwrap();

        let m = router.matches(Method::Get, "/users/active", None).unwrap();
        assert_eq!(m.route.pattern.raw, "/users/active");

        let m = router.matches(Method::Get, "/users/42", None).unwrap();
        assert_eq!(m.route.pattern.raw, "/users/:id");
        assert_eq!(m.params.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn exact_method_beats_wildcard_method() {
        let mut router = Router::new();
        router.add(route(Method::Any, "/ping")).unwrap();
        router.add(route(Method::Get, "/ping")).unwrap();

        let m = router.matches(Method::Get, "/ping", None).unwrap();
        assert_eq!(m.route.method, Method::Get);

        let m = router.matches(Method::Post, "/ping", None).unwrap();
        assert_eq!(m.route.method, Method::Any);
    }

    #[test]
    fn remainder_wildcard_matches_rest_of_path() {
        let mut router = Router::new();
        router.add(route(Method::Get, "/files/**")).unwrap();
        let m = router.matches(Method::Get, "/files/a/b/c.txt", None).unwrap();
        assert_eq!(m.route.pattern.raw, "/files/**");

        // A lone '*' only ever matches a single segment.
        let mut router = Router::new();
        router.add(route(Method::Get, "/files/*")).unwrap();
        assert!(router.matches(Method::Get, "/files/a/b", None).is_none());
        assert!(router.matches(Method::Get, "/files/a", None).is_some());
    }

    #[test]
    fn endpoint_name_filter_must_match_or_be_unset() {
        let mut router = Router::new();
        let mut r = route(Method::Get, "/admin");
        r.endpoint_name = Some("internal".into());
        router.add(r).unwrap();

        assert!(router.matches(Method::Get, "/admin", Some("public")).is_none());
        assert!(router.matches(Method::Get, "/admin", Some("internal")).is_some());
    }

    #[test]
    fn rejects_duplicate_route_triples() {
        let mut router = Router::new();
        router.add(route(Method::Get, "/x")).unwrap();
        assert!(router.add(route(Method::Get, "/x")).is_err());
    }

    #[test]
    fn no_match_is_none() {
        let router = Router::new();
        assert!(router.matches(Method::Get, "/nothing", None).is_none());
    }
}
