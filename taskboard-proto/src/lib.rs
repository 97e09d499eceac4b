//! Shared document model for `Taskboard`.
//!
//! Everything here is plain data: the normalized [`task::Task`] that the rest
//! of the system works with, the store-native [`document::TaskDocument`] it is
//! converted from, session and role types, and the role-keyed query specs.

pub mod codec;
pub mod document;
pub mod query;
pub mod session;
pub mod task;
