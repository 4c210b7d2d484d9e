#![deny(unsafe_code)]
//! The producer and consumer composite patterns (§4.5, §4.6): slot binding,
//! claim-check offload/resolution, retry, and DLQ routing, built on the data-path
//! interface contracts in `prism_core::interfaces` and the lifecycle skeleton in
//! `prism_runtime::handler::PatternHandler`.

pub mod claim_check;
pub mod consumer;
pub mod producer;
pub mod slot;

pub mod prelude {
    pub use crate::claim_check::{
        maybe_offload, maybe_resolve, ClaimCheckHeader, ClaimCheckSettings, CompressionAlgorithm,
    };
    pub use crate::consumer::{ConsumerPattern, ConsumerState, MessageProcessor};
    pub use crate::producer::{ProducerPattern, PublishHandle};
    pub use crate::slot::{bind, start_all, stop_all, BoundSlots, SlotSpec};
}
