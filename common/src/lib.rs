// Shared library for the MediTrack reminder engine: data model, recurrence
// calculation, store access, notification sinks, and the scheduler engine.

pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod notify;
pub mod recurrence;
pub mod scheduler;
pub mod telemetry;
