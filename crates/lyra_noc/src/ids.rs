//! Opaque ID newtypes for NoC placement entities.
//!
//! [`NocRouterId`], [`NocLinkId`], [`TrafficFlowId`], and [`ClusterBlockId`]
//! are thin `u32` wrappers used as dense indices into the NoC model and the
//! cost handler's caches. They are `Copy`, `Ord`, `Hash`, and
//! `Serialize`/`Deserialize`; `Ord` matters because the engine sorts link
//! ids when diffing routes and iterates id ranges in ascending order for
//! determinism.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }

            /// Returns the raw index widened to `usize` for direct indexing.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Opaque, copyable ID for a physical NoC router.
    NocRouterId
);

define_id!(
    /// Opaque, copyable ID for a directed NoC link.
    NocLinkId
);

define_id!(
    /// Opaque, copyable ID for a traffic flow between two router clusters.
    TrafficFlowId
);

define_id!(
    /// Opaque, copyable ID for a logical cluster block in the netlist.
    ClusterBlockId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn router_id_roundtrip() {
        let id = NocRouterId::from_raw(42);
        assert_eq!(id.as_raw(), 42);
        assert_eq!(id.index(), 42);
    }

    #[test]
    fn link_id_ordering() {
        let a = NocLinkId::from_raw(3);
        let b = NocLinkId::from_raw(7);
        assert!(a < b);

        let mut v = vec![b, a];
        v.sort();
        assert_eq!(v, vec![a, b]);
    }

    #[test]
    fn flow_id_equality() {
        let a = TrafficFlowId::from_raw(3);
        let b = TrafficFlowId::from_raw(3);
        let c = TrafficFlowId::from_raw(4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn id_hash_in_set() {
        let mut set = HashSet::new();
        set.insert(NocLinkId::from_raw(1));
        set.insert(NocLinkId::from_raw(2));
        set.insert(NocLinkId::from_raw(1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn id_serde_roundtrip() {
        let id = ClusterBlockId::from_raw(55);
        let json = serde_json::to_string(&id).unwrap();
        let restored: ClusterBlockId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, restored);
    }

    #[test]
    fn id_display() {
        let id = TrafficFlowId::from_raw(9);
        assert_eq!(format!("{id}"), "9");
    }
}
