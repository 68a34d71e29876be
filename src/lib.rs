//! Area Shell Core
//!
//! The input and scheduling core of the Area shell: a stack of nested modal
//! grabs that restores key focus correctly whatever order they are released
//! in, and a visibility-aware deferred work queue that coalesces refreshes
//! into at most one run per frame.

pub mod config;
pub mod controller;
pub mod deferred;
pub mod error;
pub mod host;
pub mod modal;

pub use controller::ShellController;
pub use error::ShellError;
