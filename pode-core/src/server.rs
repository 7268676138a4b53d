//! `ServerContext`: the process-wide state every connection and scheduled
//! job reaches through — endpoint registry, router, auth registry,
//! sessions, shared key/value store, and the scheduler runtime, each
//! behind the lock the concurrency model calls for (`RwLock` for
//! configure-once/read-many tables, `Mutex` for the scheduler registries
//! that are mutated at startup and occasionally thereafter).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};

use tracing::warn;

use crate::auth::AuthMethod;
use crate::endpoint::{Endpoint, EndpointRegistry};
use crate::error::Result;
use crate::middleware::{Handler, Middleware, Pipeline};
use crate::router::Router;
use crate::scheduler::{ScheduleRegistry, TimerRegistry, WorkerPool};
use crate::session::SessionStore;
use crate::smtp::Envelope;
use crate::state::SharedState;

pub type RawTcpHandler = dyn Fn(SocketAddr, &[u8]) -> Result<Vec<u8>> + Send + Sync;
pub type MailHandler = dyn Fn(&Envelope) + Send + Sync;

pub struct ServerContext {
    pub hostname: String,
    pub endpoints: RwLock<EndpointRegistry>,
    pub router: RwLock<Router>,
    pub auth: RwLock<HashMap<String, Arc<AuthMethod>>>,
    pub sessions: Arc<SessionStore>,
    pub shared: Arc<SharedState>,
    pub pipeline: Arc<Pipeline>,
    pub timers: Mutex<TimerRegistry>,
    pub schedules: Mutex<ScheduleRegistry>,
    pub pool: Arc<WorkerPool>,
    pub raw_tcp_handler: Option<Box<RawTcpHandler>>,
    mail_handler: Option<Box<MailHandler>>,
}

impl ServerContext {
    pub(crate) fn auth_middleware(&self, name: &str) -> Option<Arc<dyn Middleware>> {
        self.auth.read().unwrap().get(name).cloned().map(|a| a as Arc<dyn Middleware>)
    }

    pub(crate) async fn deliver_mail(&self, envelope: Envelope) {
        match &self.mail_handler {
            Some(handler) => handler(&envelope),
            None => warn!(from = %envelope.mail_from, "no mail handler registered, dropping message"),
        }
    }
}

/// Builds a [`ServerContext`] up from defaults, mirroring the teacher's own
/// pattern of an explicit builder feeding `tokio_main`.
pub struct ServerBuilder {
    hostname: String,
    endpoints: EndpointRegistry,
    router: Router,
    auth: HashMap<String, Arc<AuthMethod>>,
    sessions: Arc<SessionStore>,
    shared: Arc<SharedState>,
    pipeline: Pipeline,
    worker_count: usize,
    raw_tcp_handler: Option<Box<RawTcpHandler>>,
    mail_handler: Option<Box<MailHandler>>,
}

impl ServerBuilder {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            endpoints: EndpointRegistry::new(),
            router: Router::new(),
            auth: HashMap::new(),
            sessions: SessionStore::new(crate::session::SessionOptions::default()),
            shared: Arc::new(SharedState::new()),
            pipeline: Pipeline::new(),
            worker_count: 4,
            raw_tcp_handler: None,
            mail_handler: None,
        }
    }

    pub fn add_endpoint(mut self, endpoint: Endpoint) -> Result<Self> {
        self.endpoints.add(endpoint)?;
        Ok(self)
    }

    pub fn add_route(mut self, route: crate::router::Route) -> Result<Self> {
        self.router.add(route)?;
        Ok(self)
    }

    pub fn add_auth_method(mut self, method: AuthMethod) -> Self {
        self.auth.insert(method.name.clone(), Arc::new(method));
        self
    }

    pub fn add_global_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.pipeline.add_global(middleware);
        self
    }

    pub fn add_endware(mut self, handler: Arc<dyn Handler>) -> Self {
        self.pipeline.add_endware(handler);
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    pub fn with_raw_tcp_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(SocketAddr, &[u8]) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.raw_tcp_handler = Some(Box::new(handler));
        self
    }

    pub fn with_mail_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.mail_handler = Some(Box::new(handler));
        self
    }

    pub async fn build(self) -> Result<Arc<ServerContext>> {
        let schedules = ScheduleRegistry::new().await?;
        Ok(Arc::new(ServerContext {
            hostname: self.hostname,
            endpoints: RwLock::new(self.endpoints),
            router: RwLock::new(self.router),
            auth: RwLock::new(self.auth),
            sessions: self.sessions,
            shared: self.shared,
            pipeline: Arc::new(self.pipeline),
            timers: Mutex::new(TimerRegistry::new()),
            schedules: Mutex::new(schedules),
            pool: WorkerPool::new(self.worker_count, 256),
            raw_tcp_handler: self.raw_tcp_handler,
            mail_handler: self.mail_handler,
        }))
    }
}

/// Starts every registered endpoint's accept loop and the cron scheduler,
/// running until one of them errors or the caller's shutdown signal fires.
pub async fn run(server: Arc<ServerContext>) -> Result<()> {
    server.schedules.lock().unwrap().start().await?;

    let endpoints = server.endpoints.read().unwrap().endpoints().to_vec();
    let mut tasks = Vec::new();
    for endpoint in endpoints {
        let server = server.clone();
        tasks.push(tokio::spawn(async move { crate::listener::serve_endpoint(endpoint, server).await }));
    }

    for task in tasks {
        if let Ok(Err(e)) = task.await {
            return Err(e);
        }
    }
    Ok(())
}
