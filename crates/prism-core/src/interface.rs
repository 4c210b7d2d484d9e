//! Abstract capability contracts (§3 Interface).
//!
//! Interface identity is nominal, not structural: the proxy never probes a driver to
//! discover what it can do (§4.1 "no structural reflection is used at runtime"). A
//! driver states its declared interfaces once at registration and the binder checks
//! set containment.

use std::collections::BTreeSet;
use std::fmt;

/// Identifies an interface by name, the proto/schema file that defines its wire
/// shape, and a version. Two interfaces are equal iff all three match.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceId {
    pub name: &'static str,
    pub proto_file: &'static str,
    pub version: u32,
}

impl InterfaceId {
    pub const fn new(name: &'static str, proto_file: &'static str, version: u32) -> Self {
        Self {
            name,
            proto_file,
            version,
        }
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{} ({})", self.name, self.version, self.proto_file)
    }
}

/// Well-known interfaces named in §3. Concrete drivers declare a subset of these.
pub mod well_known {
    use super::InterfaceId;

    pub const KEY_VALUE_BASIC: InterfaceId =
        InterfaceId::new("KeyValueBasic", "prism/kv_basic.proto", 1);
    pub const KEY_VALUE_TTL: InterfaceId = InterfaceId::new("KeyValueTtl", "prism/kv_ttl.proto", 1);
    pub const KEY_VALUE_SCAN: InterfaceId =
        InterfaceId::new("KeyValueScan", "prism/kv_scan.proto", 1);
    pub const KEY_VALUE_ATOMIC: InterfaceId =
        InterfaceId::new("KeyValueAtomic", "prism/kv_atomic.proto", 1);
    pub const PUBSUB_BASIC: InterfaceId = InterfaceId::new("PubSubBasic", "prism/pubsub.proto", 1);
    pub const QUEUE_BASIC: InterfaceId = InterfaceId::new("QueueBasic", "prism/queue.proto", 1);
    pub const OBJECT_STORE_BASIC: InterfaceId =
        InterfaceId::new("ObjectStoreBasic", "prism/object_store.proto", 1);
    pub const LIFECYCLE: InterfaceId = InterfaceId::new("Lifecycle", "prism/lifecycle.proto", 1);
}

/// An ordered set of interfaces, used both as "what a driver declares" and "what a
/// slot requires". `BTreeSet` gives us deterministic ordering (§3: "ordered set").
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterfaceSet(BTreeSet<InterfaceId>);

impl InterfaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_iter(interfaces: impl IntoIterator<Item = InterfaceId>) -> Self {
        Self(interfaces.into_iter().collect())
    }

    pub fn insert(&mut self, interface: InterfaceId) -> &mut Self {
        self.0.insert(interface);
        self
    }

    pub fn contains(&self, interface: &InterfaceId) -> bool {
        self.0.contains(interface)
    }

    /// True iff every interface in `required` is present in `self`.
    pub fn satisfies(&self, required: &InterfaceSet) -> bool {
        required.0.iter().all(|iface| self.0.contains(iface))
    }

    /// The required interfaces missing from `self`, in order. Empty iff `satisfies`.
    pub fn missing(&self, required: &InterfaceSet) -> Vec<InterfaceId> {
        required
            .0
            .iter()
            .filter(|iface| !self.0.contains(*iface))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterfaceId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<InterfaceId> for InterfaceSet {
    fn from_iter<T: IntoIterator<Item = InterfaceId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::well_known::*;

    #[test]
    fn satisfies_checks_containment() {
        let declared = InterfaceSet::from_iter([KEY_VALUE_BASIC, KEY_VALUE_TTL]);
        let required = InterfaceSet::from_iter([KEY_VALUE_BASIC]);
        assert!(declared.satisfies(&required));

        let required_missing = InterfaceSet::from_iter([KEY_VALUE_SCAN]);
        assert!(!declared.satisfies(&required_missing));
        assert_eq!(declared.missing(&required_missing), vec![KEY_VALUE_SCAN]);
    }
}
