//! Newtype identifiers shared across the control plane.
//!
//! Keeping these as distinct types (rather than bare `u64`/`String`) follows the
//! teacher's `ids.rs` convention of giving every identity its own type so that a
//! correlation id can never be accidentally compared against an instance id.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Proxy-assigned identifier for a registered pattern instance (§3 Pattern Instance).
/// Valid for the lifetime of its control-plane stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance-{}", self.0)
    }
}

/// Monotonically increasing request id assigned by the proxy to correlate a command
/// with its response (§3 Control-Plane Command / Response, §6.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "corr-{}", self.0)
    }
}

/// Monotonic generator of [`CorrelationId`]s, one per control-plane stream, as
/// required by the ordering invariant in §5 ("strict FIFO command/response
/// ordering").
#[derive(Debug, Default)]
pub struct CorrelationIdSequence(AtomicU64);

impl CorrelationIdSequence {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn next(&self) -> CorrelationId {
        CorrelationId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Process-manager instance key: pattern name + ordinal (§3 Process Record).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProcessKey {
    pub pattern_name: String,
    pub ordinal: u32,
}

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.pattern_name, self.ordinal)
    }
}

/// An opaque identifier for a claim-check payload stored in an object-store slot
/// (§3 Claim).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClaimId(pub String);

impl ClaimId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
