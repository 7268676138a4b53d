//! The handler/middleware contract and the pipeline runner that drives a
//! single request through it.
//!
//! Handler code is treated as blocking (per the concurrency model — only
//! the socket I/O, TLS handshake, and file/DNS calls around it suspend), so
//! both traits here are plain synchronous `Fn`-shaped calls rather than
//! async traits. Grounded on the teacher's `Dispatcher`, whose registered
//! stages are a `Vec<Arc<dyn Trait>>` walked in registration order; the
//! short-circuit-on-`false`/error return here is this crate's own addition
//! for the pipeline semantics the spec describes.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PodeError, Result as PodeResult};
use crate::http::{HttpRequest, HttpResponse};
use crate::session::Session;
use crate::state::SharedState;

/// `Ok(true)` continues the pipeline, `Ok(false)` short-circuits it (the
/// handler has already written a complete response), `Err` aborts the
/// request and is turned into an error response at the request boundary.
pub type HandlerResult = PodeResult<bool>;

/// Per-request mutable state passed to every handler/middleware/endware
/// call in turn.
pub struct RequestEvent {
    pub request: HttpRequest,
    pub response: HttpResponse,
    /// Path parameters bound by the matched route (`:id` etc).
    pub params: HashMap<String, String>,
    /// Name of the endpoint the connection was accepted on, if named.
    pub endpoint_name: Option<String>,
    /// Authenticated identity, set by the auth-as-middleware stage once a
    /// scheme/validator/post-validator chain succeeds.
    pub auth: Option<AuthContext>,
    /// The session attached to this request, if session middleware ran and
    /// found or created one.
    pub session: Option<Session>,
    /// Process-wide key/value store, shared across all connections.
    pub shared: Arc<SharedState>,
    /// Free-form per-request data bag for passing values between pipeline
    /// stages (the `$WebEvent.Data`-equivalent scratch space).
    pub locals: HashMap<String, serde_json::Value>,
    /// Handlers queued by route/middleware code to run as endware for this
    /// request specifically, in addition to any globally registered ones.
    pub on_end: Vec<Arc<dyn Handler>>,
}

impl RequestEvent {
    pub fn new(request: HttpRequest, shared: Arc<SharedState>) -> Self {
        Self {
            request,
            response: HttpResponse::default(),
            params: HashMap::new(),
            endpoint_name: None,
            auth: None,
            session: None,
            shared,
            locals: HashMap::new(),
            on_end: Vec::new(),
        }
    }

    pub fn queue_on_end(&mut self, handler: Arc<dyn Handler>) {
        self.on_end.push(handler);
    }
}

/// Identity attached to a request by a successful authentication chain.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub scheme: String,
    pub user: serde_json::Value,
    pub scopes: Vec<String>,
}

/// A terminal or route-bound unit of work: the thing that actually
/// produces a response.
pub trait Handler: Send + Sync {
    fn call(&self, event: &mut RequestEvent) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&mut RequestEvent) -> HandlerResult + Send + Sync,
{
    fn call(&self, event: &mut RequestEvent) -> HandlerResult {
        self(event)
    }
}

/// A pipeline stage that runs before the route handler: global middleware,
/// route-local middleware, and auth-as-middleware all implement this.
pub trait Middleware: Send + Sync {
    fn call(&self, event: &mut RequestEvent) -> HandlerResult;
}

impl<F> Middleware for F
where
    F: Fn(&mut RequestEvent) -> HandlerResult + Send + Sync,
{
    fn call(&self, event: &mut RequestEvent) -> HandlerResult {
        self(event)
    }
}

/// Runs the fixed pipeline order the spec lays out: built-ins, then global
/// middleware in registration order, then (if attached) auth as
/// middleware, then route-local middleware, then the route handler, then
/// endware — global registrations first, then anything queued for this
/// request specifically.
pub struct Pipeline {
    pub builtins: Vec<Arc<dyn Middleware>>,
    pub global: Vec<Arc<dyn Middleware>>,
    pub endware: Vec<Arc<dyn Handler>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            builtins: Vec::new(),
            global: Vec::new(),
            endware: Vec::new(),
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_builtin(&mut self, stage: Arc<dyn Middleware>) {
        self.builtins.push(stage);
    }

    pub fn add_global(&mut self, stage: Arc<dyn Middleware>) {
        self.global.push(stage);
    }

    pub fn add_endware(&mut self, handler: Arc<dyn Handler>) {
        self.endware.push(handler);
    }

    /// Drives `event` through the full pipeline for a matched route. Auth
    /// middleware (if any) and route middleware are threaded in between
    /// the global stages and the handler by the caller building
    /// `route_middleware` and `auth_middleware`; this keeps `Pipeline`
    /// itself ignorant of any one route's specific auth/middleware list.
    pub fn run(
        &self,
        event: &mut RequestEvent,
        auth_middleware: Option<&Arc<dyn Middleware>>,
        route_middleware: &[Arc<dyn Middleware>],
        handler: &Arc<dyn Handler>,
    ) -> HandlerResult {
        for stage in &self.builtins {
            if !run_stage(stage.as_ref(), event)? {
                return Ok(false);
            }
        }
        for stage in &self.global {
            if !run_stage(stage.as_ref(), event)? {
                return Ok(false);
            }
        }
        if let Some(auth) = auth_middleware {
            if !run_stage(auth.as_ref(), event)? {
                return self.run_endware(event).and(Ok(false));
            }
        }
        for stage in route_middleware {
            if !run_stage(stage.as_ref(), event)? {
                return self.run_endware(event).and(Ok(false));
            }
        }

        let handler_result = handler.call(event);
        let end_result = self.run_endware(event);

        match (handler_result, end_result) {
            (Err(e), _) => Err(e),
            (Ok(cont), Err(e)) => {
                if cont {
                    Err(e)
                } else {
                    Ok(false)
                }
            }
            (Ok(cont), Ok(_)) => Ok(cont),
        }
    }

    fn run_endware(&self, event: &mut RequestEvent) -> HandlerResult {
        for handler in &self.endware {
            handler.call(event)?;
        }
        let queued = std::mem::take(&mut event.on_end);
        for handler in &queued {
            handler.call(event)?;
        }
        Ok(true)
    }
}

fn run_stage(stage: &dyn Middleware, event: &mut RequestEvent) -> HandlerResult {
    stage.call(event).map_err(|e| match e {
        PodeError::HandlerException(_) => e,
        other => PodeError::HandlerException(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use crate::router::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_request() -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            raw_method: "GET".into(),
            path: "/".into(),
            query: HashMap::new(),
            version_minor: 1,
            headers: Vec::new(),
            cookies: HashMap::new(),
            body: Vec::new(),
            decoded_body: crate::http::Body::Raw,
            keep_alive: true,
            is_upgrade: false,
        }
    }

    #[test]
    fn runs_stages_in_order_and_calls_handler() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();

        let o1 = order.clone();
        pipeline.add_global(Arc::new(move |_: &mut RequestEvent| {
            o1.lock().unwrap().push("global");
            Ok(true)
        }));

        let o2 = order.clone();
        let handler: Arc<dyn Handler> = Arc::new(move |_: &mut RequestEvent| {
            o2.lock().unwrap().push("handler");
            Ok(true)
        });

        let o3 = order.clone();
        pipeline.add_endware(Arc::new(move |_: &mut RequestEvent| {
            o3.lock().unwrap().push("endware");
            Ok(true)
        }));

        let shared = Arc::new(SharedState::new());
        let mut event = RequestEvent::new(sample_request(), shared);
        let result = pipeline.run(&mut event, None, &[], &handler).unwrap();

        assert!(result);
        assert_eq!(*order.lock().unwrap(), vec!["global", "handler", "endware"]);
    }

    #[test]
    fn middleware_returning_false_short_circuits_before_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pipeline = Pipeline::new();

        pipeline.add_global(Arc::new(|_: &mut RequestEvent| Ok(false)));

        let c = calls.clone();
        let handler: Arc<dyn Handler> = Arc::new(move |_: &mut RequestEvent| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });

        let shared = Arc::new(SharedState::new());
        let mut event = RequestEvent::new(sample_request(), shared);
        let result = pipeline.run(&mut event, None, &[], &handler).unwrap();

        assert!(!result);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn queued_on_end_handlers_run_after_registered_endware() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();

        let o1 = order.clone();
        pipeline.add_endware(Arc::new(move |_: &mut RequestEvent| {
            o1.lock().unwrap().push("registered");
            Ok(true)
        }));

        let o2 = order.clone();
        let handler: Arc<dyn Handler> = Arc::new(move |event: &mut RequestEvent| {
            let o3 = o2.clone();
            event.queue_on_end(Arc::new(move |_: &mut RequestEvent| {
                o3.lock().unwrap().push("queued");
                Ok(true)
            }));
            Ok(true)
        });

        let shared = Arc::new(SharedState::new());
        let mut event = RequestEvent::new(sample_request(), shared);
        pipeline.run(&mut event, None, &[], &handler).unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["registered", "queued"]);
    }
}
