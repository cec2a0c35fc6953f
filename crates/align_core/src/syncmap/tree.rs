//! The hierarchical sync map, stored as an arena of nodes.
//!
//! Multi-level alignments append one generation of fragments per
//! level; the deepest fragments are the leaves. Nodes hold child index
//! lists, so traversals stay index-based and ownership acyclic.

use serde::{Deserialize, Serialize};

use super::fragment::SyncMapFragment;
use super::list::SyncMapFragmentList;

/// Handle to a node in a [`SyncMapTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    value: Option<SyncMapFragment>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A tree of sync map fragments; the root carries no fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMapTree {
    nodes: Vec<Node>,
}

impl SyncMapTree {
    /// Create a tree with an empty root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                value: None,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Total number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds only the empty root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Append a fragment as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, fragment: SyncMapFragment) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            value: Some(fragment),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Append every fragment of `list` as a child of `parent`, in
    /// order.
    pub fn add_list(&mut self, parent: NodeId, list: &SyncMapFragmentList) {
        for fragment in list.fragments() {
            self.add_child(parent, fragment.clone());
        }
    }

    /// The fragment at `id`, if any (the root has none).
    pub fn value(&self, id: NodeId) -> Option<&SyncMapFragment> {
        self.nodes.get(id.0).and_then(|n| n.value.as_ref())
    }

    /// Mutable access to the fragment at `id`.
    pub fn value_mut(&mut self, id: NodeId) -> Option<&mut SyncMapFragment> {
        self.nodes.get_mut(id.0).and_then(|n| n.value.as_mut())
    }

    /// The children of `id`, in insertion order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// The parent of `id`, if any.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    /// Whether `id` has no children.
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.children(id).is_empty()
    }

    /// The leaves of the tree in depth-first (time) order, excluding
    /// an empty root.
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack: Vec<NodeId> = self.children(self.root()).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let children = self.children(id);
            if children.is_empty() {
                leaves.push(id);
            } else {
                stack.extend(children.iter().rev().copied());
            }
        }
        leaves
    }

    /// Whether the leaf fragments form a sorted list without interior
    /// overlaps.
    ///
    /// HEAD and TAIL leaves are not considered: below the first level
    /// every sub-list carries its own head and tail pinned to the full
    /// wave extent, so only the content-bearing leaves are comparable
    /// across siblings.
    pub fn leaves_are_consistent(&self) -> bool {
        let leaves: Vec<NodeId> = self
            .leaves()
            .into_iter()
            .filter(|&id| self.value(id).is_some_and(|f| !f.is_head_or_tail()))
            .collect();
        for pair in leaves.windows(2) {
            let (Some(a), Some(b)) = (self.value(pair[0]), self.value(pair[1])) else {
                return false;
            };
            if a.interval > b.interval {
                return false;
            }
            let position = a.interval.relative_position_of(&b.interval);
            if !SyncMapFragmentList::ALLOWED_POSITIONS.contains(&position) {
                return false;
            }
        }
        true
    }
}

impl Default for SyncMapTree {
    fn default() -> Self {
        Self::new()
    }
}
