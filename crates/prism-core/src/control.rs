//! The control-plane command/response envelope shapes (§3, §6.1).
//!
//! These are the logical payloads; `prism-transport` owns the wire framing
//! (length-prefixed JSON) that carries them between proxy and pattern.

use serde::{Deserialize, Serialize};

use crate::config::ConfigDocument;
use crate::health::HealthState;
use crate::ids::{CorrelationId, InstanceId};

/// Sent by a pattern immediately after dialing the proxy (§4.2).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterFrame {
    pub pattern_name: String,
    pub version: String,
    pub declared_interfaces: Vec<String>,
}

/// The proxy's reply to a `RegisterFrame`, assigning the instance id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterAck {
    pub instance_id: InstanceId,
}

/// A command sent from proxy to pattern, tagged by `kind` (§6.1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyCommand {
    pub correlation_id: CorrelationId,
    pub kind: ProxyCommandKind,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProxyCommandKind {
    Initialize {
        pattern_name: String,
        version: String,
        config: serde_json::Value,
    },
    Start,
    Stop {
        timeout_seconds: u64,
    },
    HealthCheck,
    Configure {
        config: serde_json::Value,
    },
}

impl ProxyCommandKind {
    pub fn config_document(&self) -> Option<ConfigDocument> {
        match self {
            ProxyCommandKind::Initialize { config, .. } => {
                Some(ConfigDocument::from_value(config.clone()))
            }
            ProxyCommandKind::Configure { config } => {
                Some(ConfigDocument::from_value(config.clone()))
            }
            _ => None,
        }
    }
}

/// The pattern's reply to a `ProxyCommand`, echoing the same `correlation_id`
/// (§3, §6.1). Ordering invariant: on a given stream, responses must be emitted in
/// the same order as their commands (§4.2, §5, §8 property 2).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatternResponse {
    pub correlation_id: CorrelationId,
    pub success: bool,
    pub error: Option<String>,
    pub details: ResponseDetails,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseDetails {
    None,
    Health {
        status: HealthStateWire,
        message: String,
        details: std::collections::BTreeMap<String, String>,
    },
}

/// A wire-serializable mirror of [`HealthState`]; kept distinct from the runtime
/// type so that `prism-core::health` stays free of a `serde` dependency on the enum
/// itself and callers opt in explicitly at the control-plane boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStateWire {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl From<HealthState> for HealthStateWire {
    fn from(state: HealthState) -> Self {
        match state {
            HealthState::Healthy => HealthStateWire::Healthy,
            HealthState::Degraded => HealthStateWire::Degraded,
            HealthState::Unhealthy => HealthStateWire::Unhealthy,
            HealthState::Unknown => HealthStateWire::Unknown,
        }
    }
}

impl PatternResponse {
    pub fn ok(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            success: true,
            error: None,
            details: ResponseDetails::None,
        }
    }

    pub fn err(correlation_id: CorrelationId, message: impl Into<String>) -> Self {
        Self {
            correlation_id,
            success: false,
            error: Some(message.into()),
            details: ResponseDetails::None,
        }
    }

    pub fn health(correlation_id: CorrelationId, report: crate::health::HealthReport) -> Self {
        Self {
            correlation_id,
            success: true,
            error: None,
            details: ResponseDetails::Health {
                status: report.status.into(),
                message: report.message,
                details: report.details,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let cmd = ProxyCommand {
            correlation_id: CorrelationId::from_raw(7),
            kind: ProxyCommandKind::Stop { timeout_seconds: 5 },
        };
        let raw = serde_json::to_string(&cmd).unwrap();
        let back: ProxyCommand = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.correlation_id.as_raw(), 7);
        matches!(back.kind, ProxyCommandKind::Stop { timeout_seconds: 5 });
    }
}
