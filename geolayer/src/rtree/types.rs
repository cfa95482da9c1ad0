use serde::{Deserialize, Serialize};

use crate::geometry::Envelope;
use crate::store::RecordId;

/// Page ID - unique identifier of a node within one tree. Zero means "none".
pub type PageId = u64;

pub(crate) const NO_PAGE: PageId = 0;

/// An entry in a leaf node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeafEntry {
    pub envelope: Envelope,
    pub id: RecordId,
}

/// A child reference in an internal node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChildRef {
    pub envelope: Envelope,
    pub page_id: PageId,
}

/// R-Tree node. Leaves sit at level 0; an internal node at level `n` holds
/// children at level `n - 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf { entries: Vec<LeafEntry> },
    Internal { children: Vec<ChildRef>, level: u32 },
}

impl Node {
    pub fn empty_leaf() -> Self {
        Node::Leaf {
            entries: Vec::new(),
        }
    }

    pub fn level(&self) -> u32 {
        match self {
            Node::Leaf { .. } => 0,
            Node::Internal { level, .. } => *level,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn len(&self) -> usize {
        match self {
            Node::Leaf { entries } => entries.len(),
            Node::Internal { children, .. } => children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tight envelope of everything in this node.
    pub fn compute_envelope(&self) -> Envelope {
        let mut envelope = Envelope::empty();
        match self {
            Node::Leaf { entries } => entries.iter().for_each(|e| envelope.expand(&e.envelope)),
            Node::Internal { children, .. } => {
                children.iter().for_each(|c| envelope.expand(&c.envelope))
            }
        }
        envelope
    }

    /// Builds a node at `level` out of items of the matching kind.
    pub(crate) fn from_items(level: u32, items: Vec<Item>) -> Node {
        if level == 0 {
            Node::Leaf {
                entries: items
                    .into_iter()
                    .filter_map(|item| match item {
                        Item::Entry(entry) => Some(entry),
                        Item::Child(_) => None,
                    })
                    .collect(),
            }
        } else {
            Node::Internal {
                children: items
                    .into_iter()
                    .filter_map(|item| match item {
                        Item::Child(child) => Some(child),
                        Item::Entry(_) => None,
                    })
                    .collect(),
                level,
            }
        }
    }

    /// Moves the node's contents out as generic items.
    pub(crate) fn into_items(self) -> Vec<Item> {
        match self {
            Node::Leaf { entries } => entries.into_iter().map(Item::Entry).collect(),
            Node::Internal { children, .. } => children.into_iter().map(Item::Child).collect(),
        }
    }

    pub(crate) fn push(&mut self, item: Item) {
        match (self, item) {
            (Node::Leaf { entries }, Item::Entry(entry)) => entries.push(entry),
            (Node::Internal { children, .. }, Item::Child(child)) => children.push(child),
            // level mismatch is ruled out by the caller's level bookkeeping
            _ => {}
        }
    }
}

/// Either kind of slot content, used by code that works on any level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Item {
    Entry(LeafEntry),
    Child(ChildRef),
}

impl Item {
    pub fn envelope(&self) -> Envelope {
        match self {
            Item::Entry(entry) => entry.envelope,
            Item::Child(child) => child.envelope,
        }
    }
}

/// Tree header: root location, shape and change counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeHeader {
    pub root_page: PageId,
    /// Number of levels; zero for an empty tree.
    pub height: u32,
    pub entry_count: u64,
    pub next_page_id: PageId,
    /// Bumped by the store every time a changed tree is committed.
    pub version: u64,
}

impl Default for TreeHeader {
    fn default() -> Self {
        TreeHeader {
            root_page: NO_PAGE,
            height: 0,
            entry_count: 0,
            next_page_id: 1,
            version: 0,
        }
    }
}

/// Statistics about a tree's shape
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RTreeStats {
    pub total_entries: u64,
    pub node_count: u64,
    pub leaf_count: u64,
    pub tree_height: u32,
    /// Mean leaf occupancy as a fraction of `max_entries`.
    pub average_leaf_fill: f64,
}

/// Result of a structural integrity check
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityReport {
    /// Total nodes visited from the root
    pub nodes_checked: u64,
    /// Pages present in the page map but unreachable from the root
    pub orphaned_pages: Vec<PageId>,
    /// Summary of findings
    pub is_valid: bool,
    /// Detailed error messages
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self {
            nodes_checked: 0,
            orphaned_pages: Vec::new(),
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.is_valid = false;
        self.errors.push(message);
    }
}

impl Default for IntegrityReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, x: f64, y: f64) -> LeafEntry {
        LeafEntry {
            envelope: Envelope::new(x, y, x, y),
            id: RecordId::new(id),
        }
    }

    #[test]
    fn test_leaf_envelope() {
        let node = Node::Leaf {
            entries: vec![entry(1, 0.0, 0.0), entry(2, 3.0, -1.0)],
        };
        assert_eq!(node.compute_envelope(), Envelope::new(0.0, -1.0, 3.0, 0.0));
        assert_eq!(node.level(), 0);
        assert!(node.is_leaf());
    }

    #[test]
    fn test_items_round_trip_through_node() {
        let node = Node::from_items(0, vec![Item::Entry(entry(1, 1.0, 1.0))]);
        assert_eq!(node.len(), 1);
        let items = node.into_items();
        assert_eq!(items[0].envelope(), Envelope::new(1.0, 1.0, 1.0, 1.0));

        let internal = Node::from_items(
            2,
            vec![Item::Child(ChildRef {
                envelope: Envelope::new(0.0, 0.0, 1.0, 1.0),
                page_id: 9,
            })],
        );
        assert_eq!(internal.level(), 2);
        assert!(!internal.is_leaf());
    }

    #[test]
    fn test_empty_node_envelope_is_empty() {
        assert!(Node::empty_leaf().compute_envelope().is_empty());
        assert!(Node::empty_leaf().is_empty());
    }

    #[test]
    fn test_integrity_report_fail() {
        let mut report = IntegrityReport::new();
        assert!(report.is_valid);
        report.fail("bad".to_string());
        assert!(!report.is_valid);
        assert_eq!(report.errors, vec!["bad".to_string()]);
    }
}
