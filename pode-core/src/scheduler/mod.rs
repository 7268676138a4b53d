//! Scheduler runtime: a fixed worker pool plus the timer/schedule
//! registries that feed it, and the restart-config wiring built on top of
//! both.

pub mod restart;
pub mod schedule;
pub mod timer;
pub mod worker;

pub use restart::{CRONS_SCHEDULE_NAME, PERIOD_TIMER_NAME, TIMES_SCHEDULE_NAME};
pub use schedule::ScheduleRegistry;
pub use timer::TimerRegistry;
pub use worker::{Job, WorkerPool};
