//! Display module - the state machine deciding what the row currently shows
//!
//! Owns the Off/Active/Dimmed mode, the activity clock and the dim/idle
//! timeouts. All transitions happen under one lock and produce a list of
//! commands; callers dispatch those to the device after the lock is
//! released, so transport I/O never blocks the input path.

mod frame;
mod state;

pub use frame::*;
pub use state::*;
