//! Core library for the Pode multi-protocol application server: listener,
//! protocol parsers, router, middleware pipeline, authentication core,
//! session store, shared state, and scheduler runtime. The `pode` binary
//! crate is a thin wrapper that wires these together from a config file
//! and command-line flags.

pub mod auth;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod listener;
pub mod logging;
pub mod middleware;
pub mod process_info;
pub mod request;
pub mod router;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod smtp;
pub mod state;
pub mod tls;
pub mod watcher;
pub mod ws;

pub use error::{PodeError, Result};
pub use server::{run, ServerBuilder, ServerContext};
