#![deny(unsafe_code)]
//! Pattern-side runtime SDK: the library a producer or consumer pattern binary
//! embeds to dial the proxy, run the registration handshake, and serve control-plane
//! commands against a [`handler::PatternHandler`] implementation (§4.2, §3 Pattern
//! Instance).

pub mod handler;
pub mod runtime;
pub mod state;

pub mod prelude {
    pub use crate::handler::PatternHandler;
    pub use crate::runtime::{PatternRuntime, DEFAULT_CANCELLATION_GRACE};
    pub use crate::state::{CommandKind, PatternState};
}
