//! Modal Module
//!
//! Exclusive input grabs and the ambient action mode they install.

pub mod action_mode;
pub mod stack;

pub use action_mode::{ActionMode, ModalOptions};
pub use stack::{ModalEntry, ModalStack, PushParams};
