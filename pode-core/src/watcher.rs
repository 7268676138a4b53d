//! File-change watcher that triggers a graceful restart, built on
//! `notify` (grounded on the `rohan-flutterint-neon` manifest in the
//! example pack) and `tokio_graceful::Shutdown` for the actual stop,
//! matching how the teacher's main already wires `tokio_graceful` around
//! its own accept loop.

use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher as NotifyWatcherTrait};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{PodeError, Result};

/// Debounces file-system events over this window before signalling a
/// restart, so a burst of saves from an editor doesn't fire it repeatedly.
const DEBOUNCE: Duration = Duration::from_secs(1);

pub struct FileWatcher {
    _watcher: notify::RecommendedWatcher,
}

impl FileWatcher {
    /// Watches `paths` recursively and sends on `restart_tx` (debounced)
    /// whenever something under them changes.
    pub fn start(paths: &[PathBuf], restart_tx: mpsc::Sender<()>) -> Result<Self> {
        let (raw_tx, raw_rx) = std_mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            if let Ok(event) = event {
                if matches!(
                    event.kind,
                    notify::EventKind::Modify(_) | notify::EventKind::Create(_) | notify::EventKind::Remove(_)
                ) {
                    let _ = raw_tx.send(());
                }
            }
        })
        .map_err(|e| PodeError::Configuration(format!("cannot start file watcher: {e}")))?;

        for path in paths {
            watcher
                .watch(path.as_path(), RecursiveMode::Recursive)
                .map_err(|e| PodeError::Configuration(format!("cannot watch {}: {e}", path.display())))?;
            info!(path = %path.display(), "watching for file changes");
        }

        std::thread::spawn(move || debounce_loop(raw_rx, restart_tx));

        Ok(Self { _watcher: watcher })
    }
}

fn debounce_loop(raw_rx: std_mpsc::Receiver<()>, restart_tx: mpsc::Sender<()>) {
    loop {
        let Ok(()) = raw_rx.recv() else {
            return;
        };
        // Drain anything else that arrives within the debounce window so a
        // burst of writes only triggers one restart signal.
        while raw_rx.recv_timeout(DEBOUNCE).is_ok() {}
        if restart_tx.blocking_send(()).is_err() {
            warn!("restart channel closed, file watcher stopping");
            return;
        }
    }
}

pub fn default_watch_roots(base: impl AsRef<Path>) -> Vec<PathBuf> {
    vec![base.as_ref().to_path_buf()]
}
