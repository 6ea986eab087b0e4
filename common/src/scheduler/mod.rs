// Scheduler module: periodic due-reminder processing

mod engine;

pub use engine::{Scheduler, SchedulerConfig, SchedulerEngine, TickReport};
