//! Binary entry point: loads configuration and environment, starts
//! logging, assembles a [`pode_core::ServerContext`], and runs it to
//! graceful shutdown. Mirrors the teacher's own `main` in shape — load
//! env, build a runtime config, call into the library's `tokio_main`
//! equivalent — generalized to the multi-endpoint server this crate
//! builds rather than one fixed connection.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use pode_core::config::ServerConfig;
use pode_core::endpoint::{Endpoint, Protocol};
use pode_core::logging::{init_logging, LoggingConfig};
use pode_core::middleware::{Handler, HandlerResult, RequestEvent};
use pode_core::process_info::get_process_info;
use pode_core::router::{Method, Route};
use pode_core::scheduler::restart;
use pode_core::ServerBuilder;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pode", about = "Multi-protocol application server")]
struct Args {
    /// Path to the JSON configuration document.
    #[arg(long, env = "PODE_CONFIG", default_value = "pode.config.json")]
    config: PathBuf,

    /// Address to bind the default HTTP endpoint to, if none is
    /// otherwise configured.
    #[arg(long, env = "PODE_LISTEN", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Directory to watch for changes that trigger a restart.
    #[arg(long, env = "PODE_WATCH")]
    watch: Option<PathBuf>,

    #[arg(long, env = "PODE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, env = "PODE_LOG_DIR")]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let process = get_process_info()?;
    let _logging_guard = init_logging(
        &LoggingConfig { level: args.log_level.clone(), log_dir: args.log_dir.clone() },
        &process,
    )?;

    let config = if args.config.exists() {
        ServerConfig::load_from_path(&args.config)?
    } else {
        info!(path = %args.config.display(), "no config file found, using defaults");
        ServerConfig::default()
    };

    let (address, port) = pode_core::endpoint::parse_address(&args.listen)?;
    let port = port.ok_or_else(|| anyhow::anyhow!("--listen must include a port"))?;

    let server = ServerBuilder::new(process.hostname.clone())
        .add_endpoint(Endpoint::new(Protocol::Http, address, port).with_name("default"))?
        .add_route(Route::new(Method::Get, "/health", health_handler())?)?
        .build()
        .await?;

    {
        let mut timers = server.timers.lock().unwrap();
        let mut schedules = server.schedules.lock().unwrap();
        let pool = server.pool.clone();
        restart::install(&config.server.restart, &mut timers, &mut schedules, pool, || {
            Box::new(|| {
                info!("restart condition met, shutting down for a managed restart");
                Ok(())
            })
        })
        .await?;
    }

    let _watcher = match &args.watch {
        Some(dir) => {
            let (tx, mut rx) = tokio::sync::mpsc::channel(1);
            let watcher = pode_core::watcher::FileWatcher::start(&pode_core::watcher::default_watch_roots(dir), tx)?;
            tokio::spawn(async move {
                if rx.recv().await.is_some() {
                    info!("file change detected, a restart would be triggered here");
                }
            });
            Some(watcher)
        }
        None => None,
    };

    let shutdown = tokio_graceful::Shutdown::default();
    let server_for_run = server.clone();
    shutdown.spawn_task_fn(move |guard| async move {
        tokio::select! {
            result = pode_core::run(server_for_run) => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "server loop exited with an error");
                }
            }
            _ = guard.cancelled() => {
                info!("shutdown signal received, stopping accept loops");
            }
        }
    });

    shutdown.shutdown_with_limit(std::time::Duration::from_secs(10)).await.ok();
    info!("shutdown complete");
    Ok(())
}

fn health_handler() -> Arc<dyn Handler> {
    Arc::new(|event: &mut RequestEvent| -> HandlerResult {
        event.response.set_header("Content-Type", "application/json");
        event.response.body = br#"{"status":"ok"}"#.to_vec();
        Ok(true)
    })
}
