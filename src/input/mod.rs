//! Input module - key remapping and activity tracking
//!
//! This module provides:
//! - Remapping of physical row keys between function and special semantics
//! - The activity monitor feeding the display state machine's idle clock
//! - Discovery of the paired keyboard/touch sources (Linux)

mod events;
mod monitor;
pub mod remap;

#[cfg(target_os = "linux")]
mod linux;

// Re-export common types
pub use events::*;
pub use monitor::ActivityMonitor;
pub use remap::{remap, LogicalAction};

#[cfg(target_os = "linux")]
pub use linux::{discover_sources, spawn_sources};
