#![deny(unsafe_code)]
//! Shared contracts for the Prism data-access gateway: driver interfaces, the
//! health/error model, control-plane envelopes, configuration documents and
//! process-local metrics.
//!
//! This crate defines the types that cross the proxy/pattern boundary and the
//! process-local driver boundary; it has no opinion on transport framing
//! (`prism-transport`), pattern runtime lifecycle (`prism-runtime`), or fleet
//! supervision (`prism-proxy`).

pub mod capability;
pub mod config;
pub mod control;
pub mod driver;
pub mod error;
pub mod health;
pub mod ids;
pub mod interface;
pub mod interfaces;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod version;

pub mod prelude {
    pub use crate::capability::DriverCapabilities;
    pub use crate::config::ConfigDocument;
    pub use crate::control::{
        PatternResponse, ProxyCommand, ProxyCommandKind, RegisterAck, RegisterFrame,
        ResponseDetails,
    };
    pub use crate::driver::{Driver, DriverFactory, Lifecycle};
    pub use crate::error::{CoreError, ErrorKind, Result};
    pub use crate::health::{HealthReport, HealthState};
    pub use crate::ids::{ClaimId, CorrelationId, CorrelationIdSequence, InstanceId, ProcessKey};
    pub use crate::interface::{well_known, InterfaceId, InterfaceSet};
    pub use crate::interfaces::{
        KeyValueBasic, KeyValueTtl, Message, MessageStream, ObjectStoreBasic, PubSubBasic,
        QueueBasic, CLAIM_CHECK_METADATA_KEY,
    };
    pub use crate::metrics::{MetricsRegistry, MetricsSnapshot};
    pub use crate::registry::DriverRegistry;
    pub use crate::retry::{BackoffPolicy, RetryState};
    pub use crate::version::Version;
}
