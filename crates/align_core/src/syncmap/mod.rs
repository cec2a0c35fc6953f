//! Sync map data structures: fragments, the invariant-checked
//! fragment list, and the hierarchical output tree.

mod fragment;
mod list;
mod tree;

pub use fragment::{FragmentType, SyncMapFragment};
pub use list::{FragmentListError, FragmentListResult, SyncMapFragmentList};
pub use tree::{NodeId, SyncMapTree};
