//! Wires `server.restart` config into the scheduler runtime: a period
//! installs a timer, wall-clock times and cron expressions each install a
//! schedule, all under the fixed names the spec assigns so operators can
//! recognize them in logs or a future admin surface.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::RestartConfig;
use crate::error::Result;

use super::schedule::ScheduleRegistry;
use super::timer::TimerRegistry;
use super::worker::WorkerPool;

pub const PERIOD_TIMER_NAME: &str = "__pode_restart_period__";
pub const TIMES_SCHEDULE_NAME: &str = "__pode_restart_times__";
pub const CRONS_SCHEDULE_NAME: &str = "__pode_restart_crons__";

/// Installs whichever of `period`/`times`/`crons` are present into the
/// given registries. `on_restart` builds the job that actually triggers a
/// restart (left to the caller, since that's a server-level concern).
pub async fn install<F>(
    config: &RestartConfig,
    timers: &mut TimerRegistry,
    schedules: &mut ScheduleRegistry,
    pool: Arc<WorkerPool>,
    on_restart: F,
) -> Result<()>
where
    F: Fn() -> super::worker::Job + Send + Sync + Clone + 'static,
{
    if let Some(minutes) = config.period {
        info!(minutes, "installing restart period timer");
        let job_factory = on_restart.clone();
        timers.register(PERIOD_TIMER_NAME, Duration::from_secs(minutes * 60), pool.clone(), move || job_factory());
    }

    for time in &config.times {
        info!(time, "installing restart wall-clock schedule");
        let job_factory = on_restart.clone();
        schedules.register_wall_clock(TIMES_SCHEDULE_NAME, time, pool.clone(), move || job_factory())?;
    }

    for cron in &config.crons {
        info!(cron, "installing restart cron schedule");
        let job_factory = on_restart.clone();
        schedules.register_cron(CRONS_SCHEDULE_NAME, cron, pool.clone(), move || job_factory()).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_config_installs_nothing() {
        let mut timers = TimerRegistry::new();
        let mut schedules = ScheduleRegistry::new().await.unwrap();
        let pool = WorkerPool::new(1, 4);
        let config = RestartConfig::default();

        install(&config, &mut timers, &mut schedules, pool, || Box::new(|| Ok(())))
            .await
            .unwrap();

        assert!(timers.names().is_empty());
    }

    #[tokio::test]
    async fn period_installs_exactly_one_named_timer() {
        let mut timers = TimerRegistry::new();
        let mut schedules = ScheduleRegistry::new().await.unwrap();
        let pool = WorkerPool::new(1, 4);
        let config = RestartConfig { period: Some(60), times: Vec::new(), crons: Vec::new() };

        install(&config, &mut timers, &mut schedules, pool, || Box::new(|| Ok(())))
            .await
            .unwrap();

        assert_eq!(timers.names(), vec![PERIOD_TIMER_NAME]);
    }
}
