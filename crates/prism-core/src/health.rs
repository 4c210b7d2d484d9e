//! Health states and the aggregation rule of §4.7.

use std::collections::BTreeMap;
use std::fmt;

/// The four health states every pattern and driver exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
            HealthState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A single health report, as returned by a driver's `Health()` or a pattern's
/// `Health` operation.
#[derive(Clone, Debug)]
pub struct HealthReport {
    pub status: HealthState,
    pub message: String,
    pub details: BTreeMap<String, String>,
}

impl HealthReport {
    pub fn healthy() -> Self {
        Self {
            status: HealthState::Healthy,
            message: String::new(),
            details: BTreeMap::new(),
        }
    }

    pub fn unknown() -> Self {
        Self {
            status: HealthState::Unknown,
            message: String::new(),
            details: BTreeMap::new(),
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: HealthState::Degraded,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthState::Unhealthy,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Aggregate a set of bound-driver health reports into one pattern-level report,
/// applying the rule of §4.7:
///
/// - any `Unhealthy` -> `Unhealthy`
/// - else any `Degraded` -> `Degraded`
/// - else all `Healthy` -> `Healthy`
/// - an empty set (no slots bound yet, or all optional slots left empty) is `Unknown`
pub fn aggregate<'a>(reports: impl IntoIterator<Item = (&'a str, &'a HealthReport)>) -> HealthReport {
    let mut worst: Option<HealthState> = None;
    let mut details = BTreeMap::new();
    let mut any = false;

    for (slot, report) in reports {
        any = true;
        details.insert(slot.to_string(), report.status.to_string());
        worst = Some(match worst {
            None => report.status,
            Some(current) => std::cmp::max(rank(current), rank(report.status)).into(),
        });
    }

    if !any {
        return HealthReport::unknown();
    }

    let status = worst.unwrap_or(HealthState::Unknown);
    HealthReport {
        status,
        message: match status {
            HealthState::Unhealthy => "one or more bound drivers are unhealthy".to_string(),
            HealthState::Degraded => "one or more bound drivers are degraded".to_string(),
            HealthState::Healthy => "all bound drivers are healthy".to_string(),
            HealthState::Unknown => String::new(),
        },
        details,
    }
}

/// Severity rank used purely to pick the "worst" status; `Unknown` is treated as
/// less severe than `Degraded` so that a single unknown driver among otherwise
/// healthy ones doesn't mask a real `Degraded`/`Unhealthy` elsewhere.
fn rank(state: HealthState) -> Rank {
    match state {
        HealthState::Healthy => Rank(0),
        HealthState::Unknown => Rank(1),
        HealthState::Degraded => Rank(2),
        HealthState::Unhealthy => Rank(3),
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Rank(u8);

impl From<Rank> for HealthState {
    fn from(rank: Rank) -> Self {
        match rank.0 {
            0 => HealthState::Healthy,
            1 => HealthState::Unknown,
            2 => HealthState::Degraded,
            _ => HealthState::Unhealthy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_healthy_aggregates_healthy() {
        let a = HealthReport::healthy();
        let b = HealthReport::healthy();
        let out = aggregate([("message_source", &a), ("state_store", &b)]);
        assert_eq!(out.status, HealthState::Healthy);
    }

    #[test]
    fn one_unhealthy_dominates() {
        let a = HealthReport::healthy();
        let b = HealthReport::unhealthy("connection reset");
        let out = aggregate([("message_source", &a), ("state_store", &b)]);
        assert_eq!(out.status, HealthState::Unhealthy);
    }

    #[test]
    fn degraded_without_unhealthy_is_degraded() {
        let a = HealthReport::healthy();
        let b = HealthReport::degraded("pool near capacity");
        let out = aggregate([("message_source", &a), ("state_store", &b)]);
        assert_eq!(out.status, HealthState::Degraded);
    }

    #[test]
    fn no_bound_slots_is_unknown() {
        let out = aggregate(std::iter::empty());
        assert_eq!(out.status, HealthState::Unknown);
    }
}
