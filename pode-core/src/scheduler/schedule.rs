//! Cron and wall-clock schedules. Cron expressions run through
//! `tokio-cron-scheduler`'s `JobScheduler`, generalizing the commented-out
//! `Job::new_async` block the teacher's manifest already depended on the
//! crate for; `HH:MM` wall-clock times are this crate's own minute-
//! resolution ticker, since that form isn't cron syntax.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::warn;

use crate::error::{PodeError, Result};

use super::worker::{Job as PoolJob, WorkerPool};

/// Wall-clock `HH:MM` schedule, checked once a minute.
struct WallClockSchedule {
    handle: JoinHandle<()>,
}

impl Drop for WallClockSchedule {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct ScheduleRegistry {
    cron_scheduler: Option<JobScheduler>,
    wall_clock: HashMap<String, WallClockSchedule>,
}

impl ScheduleRegistry {
    pub async fn new() -> Result<Self> {
        let cron_scheduler = JobScheduler::new()
            .await
            .map_err(|e| PodeError::Configuration(format!("cannot start cron scheduler: {e}")))?;
        Ok(Self {
            cron_scheduler: Some(cron_scheduler),
            wall_clock: HashMap::new(),
        })
    }

    pub async fn start(&self) -> Result<()> {
        if let Some(scheduler) = &self.cron_scheduler {
            scheduler
                .start()
                .await
                .map_err(|e| PodeError::Configuration(format!("cannot start cron scheduler: {e}")))?;
        }
        Ok(())
    }

    /// Registers one cron expression under `name`, running `make_job()` on
    /// each firing via the shared worker pool.
    pub async fn register_cron<F>(&mut self, name: &str, expression: &str, pool: Arc<WorkerPool>, make_job: F) -> Result<()>
    where
        F: Fn() -> PoolJob + Send + Sync + 'static,
    {
        let Some(scheduler) = &self.cron_scheduler else {
            return Err(PodeError::Configuration("cron scheduler not initialized".into()));
        };
        let job = Job::new_async(expression, move |_uuid, _locked| {
            let pool = pool.clone();
            let job = make_job();
            Box::pin(async move {
                pool.submit(job).await;
            })
        })
        .map_err(|e| PodeError::Configuration(format!("invalid cron expression '{expression}' for '{name}': {e}")))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| PodeError::Configuration(format!("cannot register cron job '{name}': {e}")))?;
        Ok(())
    }

    /// Registers a wall-clock `HH:MM` firing time under `name`.
    pub fn register_wall_clock<F>(&mut self, name: impl Into<String>, time: &str, pool: Arc<WorkerPool>, make_job: F) -> Result<()>
    where
        F: Fn() -> PoolJob + Send + Sync + 'static,
    {
        let (hour, minute) = parse_hh_mm(time)?;
        let name = name.into();

        let handle = tokio::spawn(async move {
            let mut last_fired_minute: Option<(u32, u32, i64)> = None;
            loop {
                tokio::time::sleep(Duration::from_secs(20)).await;
                let now = chrono::Local::now();
                let today = now.date_naive().and_hms_opt(0, 0, 0).map(|d| d.and_utc().timestamp() / 86400).unwrap_or(0);
                if now.hour() == hour && now.minute() == minute {
                    if last_fired_minute != Some((hour, minute, today)) {
                        last_fired_minute = Some((hour, minute, today));
                        let job = make_job();
                        pool.submit(job).await;
                    }
                }
            }
        });

        if self.wall_clock.insert(name, WallClockSchedule { handle }).is_some() {
            warn!("wall-clock schedule registration replaced an existing schedule");
        }
        Ok(())
    }

    pub fn remove_wall_clock(&mut self, name: &str) {
        self.wall_clock.remove(name);
    }
}

fn parse_hh_mm(time: &str) -> Result<(u32, u32)> {
    let (h, m) = time
        .split_once(':')
        .ok_or_else(|| PodeError::Configuration(format!("invalid wall-clock time '{time}', expected HH:MM")))?;
    let hour: u32 = h.parse().map_err(|_| PodeError::Configuration(format!("invalid hour in '{time}'")))?;
    let minute: u32 = m.parse().map_err(|_| PodeError::Configuration(format!("invalid minute in '{time}'")))?;
    if hour > 23 || minute > 59 {
        return Err(PodeError::Configuration(format!("time out of range: '{time}'")));
    }
    Ok((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_and_rejects_invalid_wall_clock_times() {
        assert_eq!(parse_hh_mm("09:30").unwrap(), (9, 30));
        assert!(parse_hh_mm("25:00").is_err());
        assert!(parse_hh_mm("not-a-time").is_err());
    }

    #[tokio::test]
    async fn cron_registration_rejects_a_malformed_expression() {
        let mut registry = ScheduleRegistry::new().await.unwrap();
        let pool = WorkerPool::new(1, 4);
        let result = registry
            .register_cron("bad", "not a cron expression", pool, || Box::new(|| Ok(())))
            .await;
        assert!(matches!(result, Err(PodeError::Configuration(_))));
    }
}

