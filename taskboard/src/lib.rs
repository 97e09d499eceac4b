//! `Taskboard`: role-scoped realtime task board library.

pub mod clock;
pub mod config;
pub mod export;
pub mod reminders;
pub mod stats;
pub mod store;
pub mod sync;
