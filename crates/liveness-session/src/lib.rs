//! Liveness Session Driver
//!
//! Pulls frame samples from a source at a fixed cadence, feeds them to the
//! liveness engine and streams snapshots to the presentation layer. Ending a
//! session (source exhausted or stop requested) resets the engine.

mod session;
mod source;

pub use session::{Session, SessionConfig, SessionError, SessionHandle, SessionStats};
pub use source::FrameSource;
