pub mod alarm;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod notify;
pub mod overdue;
pub mod recurrence;
pub mod reset;
pub mod scheduler;
pub mod storage;
pub mod task_api;
