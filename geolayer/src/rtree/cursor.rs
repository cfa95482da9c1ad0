use std::collections::VecDeque;

use crate::errors::{ErrorKind, GeoError, GeoResult};
use crate::geometry::Envelope;

use super::types::{LeafEntry, Node, PageId, NO_PAGE};
use super::RTree;

/// Lazy depth-first walk over the entries of one tree version.
///
/// Only subtrees whose envelope passes `prune` are ever opened, and only as
/// far as the consumer pulls. The cursor owns a (structurally shared) copy of
/// the tree, so later writes to the source are never observed.
pub struct EnvelopeCursor<P>
where
    P: Fn(&Envelope) -> bool,
{
    tree: RTree,
    stack: Vec<PageId>,
    pending: VecDeque<LeafEntry>,
    prune: P,
    failed: bool,
}

impl<P> EnvelopeCursor<P>
where
    P: Fn(&Envelope) -> bool,
{
    pub(crate) fn new(tree: RTree, prune: P) -> Self {
        let root = tree.header().root_page;
        let stack = if root == NO_PAGE { Vec::new() } else { vec![root] };
        EnvelopeCursor {
            tree,
            stack,
            pending: VecDeque::new(),
            prune,
            failed: false,
        }
    }

    /// Number of nodes still queued for a visit.
    pub fn queued_nodes(&self) -> usize {
        self.stack.len()
    }
}

impl<P> Iterator for EnvelopeCursor<P>
where
    P: Fn(&Envelope) -> bool,
{
    type Item = GeoResult<LeafEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Some(Ok(entry));
            }
            let page = self.stack.pop()?;
            let node = match self.tree.node(page) {
                Ok(node) => node,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            match node {
                Node::Leaf { entries } => {
                    let prune = &self.prune;
                    self.pending
                        .extend(entries.iter().filter(|e| prune(&e.envelope)).copied());
                }
                Node::Internal { children, .. } => {
                    // reversed so the leftmost child is visited first
                    for child in children.iter().rev() {
                        if (self.prune)(&child.envelope) {
                            self.stack.push(child.page_id);
                        }
                    }
                }
            }
        }
    }
}

/// Error for a page referenced by the tree but absent from its page map.
pub(crate) fn missing_page(page: PageId) -> GeoError {
    GeoError::new(
        &format!("Index page {} is missing", page),
        ErrorKind::IndexError,
    )
}
