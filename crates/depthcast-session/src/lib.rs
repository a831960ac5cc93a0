//! Viewer session management for Depthcast.
//!
//! A session is one viewer's negotiated connection to one device. This
//! crate owns the per-session record and the registry of live sessions:
//!
//! 1. **Session record** ([`Session`]): stream types, tracks, data channel,
//!    negotiation phase and activity timestamps
//! 2. **Registry** ([`SessionRegistry`]): lookup by id and stale-session
//!    detection for the reaper
//!
//! # How it fits in the stack
//!
//! ```text
//! Stream manager (above)  ← owns the registry behind its state lock
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Device / protocol layers (below)  ← DeviceTrack, SessionId, StreamType
//! ```

mod error;
mod registry;
mod session;

#[cfg(test)]
mod testing;

pub use error::SessionError;
pub use registry::SessionRegistry;
pub use session::{EvictReason, Session, SessionConfig, SessionPhase};
