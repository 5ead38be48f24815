//! Live chord detection over a small JSON message protocol.

pub mod manager;
pub mod protocol;
pub mod session;

pub use manager::SessionManager;
pub use protocol::{ClientMessage, ServerMessage};
pub use session::{SessionState, StreamSession};
