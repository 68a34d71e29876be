//! Action Mode
//!
//! Bitflags classifying which global keybindings may fire, and the flags
//! describing what the caller already holds when it asks for a modal grab.

use bitflags::bitflags;

use crate::error::{Result, ShellError};

bitflags! {
    /// Ambient input-filter classification
    ///
    /// The empty set (`NONE`) filters out every global keybinding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ActionMode: u32 {
        const NONE           = 0;
        const NORMAL         = 1 << 0;
        const OVERVIEW       = 1 << 1;
        const LOCK_SCREEN    = 1 << 2;
        const UNLOCK_SCREEN  = 1 << 3;
        const LOGIN_SCREEN   = 1 << 4;
        const SYSTEM_MODAL   = 1 << 5;
        const LOOKING_GLASS  = 1 << 6;
        const POPUP          = 1 << 7;
        const PANEL          = 1 << 8;
    }
}

impl Default for ActionMode {
    fn default() -> Self {
        Self::NONE
    }
}

impl ActionMode {
    /// Parse the bitflags text form, e.g. `"NORMAL | OVERVIEW"`.
    ///
    /// `"NONE"` and the empty string both mean no mode; `"ALL"` is every mode.
    pub fn parse(text: &str) -> Result<Self> {
        match text.trim() {
            "" | "NONE" => Ok(Self::NONE),
            "ALL" => Ok(Self::all()),
            other => bitflags::parser::from_str::<Self>(other)
                .map_err(|_| ShellError::InvalidActionMode(text.to_string())),
        }
    }
}

bitflags! {
    /// Grabs the caller already holds when pushing a modal
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModalOptions: u32 {
        const POINTER_ALREADY_GRABBED  = 1 << 0;
        const KEYBOARD_ALREADY_GRABBED = 1 << 1;
    }
}

impl Default for ModalOptions {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action_modes() {
        assert_eq!(ActionMode::parse("NONE").unwrap(), ActionMode::NONE);
        assert_eq!(ActionMode::parse("").unwrap(), ActionMode::NONE);
        assert_eq!(
            ActionMode::parse("NORMAL | OVERVIEW").unwrap(),
            ActionMode::NORMAL | ActionMode::OVERVIEW
        );
        assert_eq!(ActionMode::parse("ALL").unwrap(), ActionMode::all());
        assert_eq!(
            ActionMode::parse("NORMAL | BOGUS"),
            Err(ShellError::InvalidActionMode("NORMAL | BOGUS".to_string()))
        );
    }

    #[test]
    fn test_default_filters_everything() {
        assert!(ActionMode::default().is_empty());
    }
}
