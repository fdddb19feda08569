//! Wiring between a terminal widget, the shell socket and the parent window.
//!
//! The emulator, the socket and the window are host-provided; this crate only
//! decides which frame goes where.

pub mod bridge;
pub mod error;
pub mod location;

pub use bridge::{
    BridgeOutcome, DropReason, FrameSink, OriginPolicy, ParentWindow, TerminalBridge,
    TerminalSurface,
};
pub use error::BridgeError;
pub use location::PageLocation;
