//! A bounded worker pool for scheduled jobs and ad-hoc background tasks,
//! generalized from the teacher's `server_speak.rs` accept loop: that loop
//! spawns one task per accepted connection onto the Tokio runtime and lets
//! the runtime's own scheduler bound concurrency; here the same shape
//! feeds a fixed number of long-lived workers pulling off an `mpsc`
//! channel instead, since scheduled jobs are not one-per-connection.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

pub type Job = Box<dyn FnOnce() -> crate::error::Result<()> + Send + 'static>;

pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    _handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize, queue_capacity: usize) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let receiver = receiver.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut receiver = receiver.lock().await;
                        receiver.recv().await
                    };
                    let Some(job) = job else {
                        break;
                    };
                    if let Err(e) = job() {
                        error!(worker = id, error = %e, "scheduled job failed");
                    }
                }
            }));
        }

        Arc::new(Self { sender, _handles: handles })
    }

    pub async fn submit(&self, job: Job) {
        if self.sender.send(job).await.is_err() {
            warn!("worker pool channel closed, dropping job");
        }
    }
}
