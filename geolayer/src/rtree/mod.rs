//! Copy-on-write R-Tree over record envelopes.
//!
//! Nodes live in a persistent page map, so cloning a tree is O(1) and a clone
//! is an isolated version: the store hands each transaction its own working
//! copy and each snapshot a frozen one.
//!
//! Insertion follows the classic scheme: descend choosing the child needing
//! least enlargement, add to the leaf, split overflowing nodes upward and
//! grow a new root when the old one splits. Removal condenses underfull
//! nodes and reinserts their orphans at their original level. Bulk loads
//! pack new entries with Sort-Tile-Recursive and graft the packed subtree.

mod bulk;
mod cursor;
mod split;
mod types;

use im::OrdMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::{ErrorKind, GeoError, GeoResult};
use crate::geometry::Envelope;
use crate::store::RecordId;

pub use cursor::EnvelopeCursor;
pub use types::{ChildRef, IntegrityReport, LeafEntry, Node, PageId, RTreeStats, TreeHeader};

use bulk::str_partition;
use cursor::missing_page;
use split::quadratic_split;
use types::{Item, NO_PAGE};

/// A persistent R-Tree mapping record ids to envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RTree {
    pages: OrdMap<PageId, Node>,
    locator: OrdMap<RecordId, Envelope>,
    header: TreeHeader,
    max_entries: usize,
    min_entries: usize,
}

impl RTree {
    /// Creates an empty tree with the given node capacity bounds.
    pub fn new(max_entries: usize, min_entries: usize) -> Self {
        RTree {
            pages: OrdMap::new(),
            locator: OrdMap::new(),
            header: TreeHeader::default(),
            max_entries,
            min_entries,
        }
    }

    pub fn header(&self) -> &TreeHeader {
        &self.header
    }

    pub fn len(&self) -> u64 {
        self.header.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.header.entry_count == 0
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn version(&self) -> u64 {
        self.header.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.header.version = version;
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn min_entries(&self) -> usize {
        self.min_entries
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.locator.contains_key(&id)
    }

    /// The envelope an entry was indexed under.
    pub fn envelope_of(&self, id: RecordId) -> Option<Envelope> {
        self.locator.get(&id).copied()
    }

    /// Ids of every indexed record, in id order.
    pub fn ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.locator.keys().copied()
    }

    /// Envelope covering the whole tree.
    pub fn bounds(&self) -> Envelope {
        self.node(self.header.root_page)
            .map(Node::compute_envelope)
            .unwrap_or_default()
    }

    /// Starts a lazy walk over entries whose envelopes pass `prune`.
    pub fn cursor<P>(&self, prune: P) -> EnvelopeCursor<P>
    where
        P: Fn(&Envelope) -> bool,
    {
        EnvelopeCursor::new(self.clone(), prune)
    }

    /// Inserts one entry.
    ///
    /// Fails with `IndexError`, leaving the tree untouched, when the id is
    /// already indexed or the envelope is empty or not finite.
    pub fn insert(&mut self, id: RecordId, envelope: Envelope) -> GeoResult<()> {
        self.check_insertable(id, &envelope)?;
        self.insert_item(Item::Entry(LeafEntry { envelope, id }), 0)?;
        self.locator.insert(id, envelope);
        self.header.entry_count += 1;
        Ok(())
    }

    /// Removes an entry, returning whether it was present.
    pub fn remove(&mut self, id: RecordId) -> GeoResult<bool> {
        let Some(envelope) = self.envelope_of(id) else {
            return Ok(false);
        };

        let mut path = Vec::new();
        let leaf = self
            .find_leaf(self.header.root_page, &envelope, id, &mut path)?
            .ok_or_else(|| {
                GeoError::new(
                    &format!("Index entry {} is registered but not reachable", id),
                    ErrorKind::IndexError,
                )
            })?;

        if let Node::Leaf { entries } = self.node_mut(leaf)? {
            entries.retain(|e| e.id != id);
        }
        self.locator.remove(&id);
        self.header.entry_count -= 1;

        self.condense(leaf, &path)?;
        Ok(true)
    }

    /// Loads many entries at once.
    ///
    /// The new entries are packed into a balanced subtree. An empty tree
    /// simply adopts it; otherwise the packed subtree is grafted at its
    /// level, and when it is at least as tall as the tree everything is
    /// repacked together. The whole batch is rejected with `IndexError`
    /// before any change if one entry is a duplicate or has an empty envelope.
    pub fn bulk_load(&mut self, entries: Vec<(RecordId, Envelope)>) -> GeoResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut seen = HashSet::with_capacity(entries.len());
        for (id, envelope) in &entries {
            self.check_insertable(*id, envelope)?;
            if !seen.insert(*id) {
                return Err(GeoError::new(
                    &format!("Record {} appears twice in one bulk load", id),
                    ErrorKind::IndexError,
                ));
            }
        }

        let count = entries.len();
        for (id, envelope) in &entries {
            self.locator.insert(*id, *envelope);
        }
        let items: Vec<Item> = entries
            .into_iter()
            .map(|(id, envelope)| Item::Entry(LeafEntry { envelope, id }))
            .collect();

        if self.header.root_page == NO_PAGE {
            let (root, level) = self.pack(items);
            self.set_root(root, level);
        } else {
            let tree_level = self.root_level()?;
            let (packed, packed_level) = self.pack(items);
            if packed_level >= tree_level {
                debug!(
                    "Packed subtree of height {} is not shorter than the tree, repacking",
                    packed_level + 1
                );
                self.free_subtree(packed)?;
                let all: Vec<Item> = self
                    .locator
                    .iter()
                    .map(|(id, envelope)| Item::Entry(LeafEntry { envelope: *envelope, id: *id }))
                    .collect();
                self.pages = OrdMap::new();
                let (root, level) = self.pack(all);
                self.set_root(root, level);
            } else {
                self.graft(packed, packed_level)?;
            }
        }

        self.header.entry_count += count as u64;
        debug!(
            "Bulk loaded {} entries, tree height {}",
            count, self.header.height
        );
        Ok(())
    }

    /// Removes everything while keeping capacity bounds and version counter.
    pub fn clear(&mut self) {
        let version = self.header.version;
        self.pages = OrdMap::new();
        self.locator = OrdMap::new();
        self.header = TreeHeader {
            version,
            ..TreeHeader::default()
        };
    }

    /// Verifies bounding, balance, occupancy and count invariants.
    pub fn check_integrity(&self) -> IntegrityReport {
        let mut report = IntegrityReport::new();
        let root = self.header.root_page;

        if root == NO_PAGE {
            if self.header.entry_count != 0 || !self.locator.is_empty() {
                report.fail(format!(
                    "Empty tree reports {} entries",
                    self.header.entry_count
                ));
            }
            report.orphaned_pages = self.pages.keys().copied().collect();
        } else {
            let mut reachable = HashSet::new();
            let mut leaf_entries = 0u64;
            match self.node(root) {
                Ok(node) => {
                    if node.level() + 1 != self.header.height {
                        report.fail(format!(
                            "Root level {} does not match height {}",
                            node.level(),
                            self.header.height
                        ));
                    }
                    if let Node::Internal { children, .. } = node {
                        if children.len() < 2 {
                            report.fail(format!(
                                "Internal root has {} children",
                                children.len()
                            ));
                        }
                    }
                    self.check_node(
                        root,
                        node.level(),
                        true,
                        &mut report,
                        &mut reachable,
                        &mut leaf_entries,
                    );
                }
                Err(e) => report.fail(e.to_string()),
            }
            if leaf_entries != self.header.entry_count {
                report.fail(format!(
                    "Header counts {} entries, leaves hold {}",
                    self.header.entry_count, leaf_entries
                ));
            }
            report.orphaned_pages = self
                .pages
                .keys()
                .filter(|page| !reachable.contains(*page))
                .copied()
                .collect();
        }

        if self.locator.len() as u64 != self.header.entry_count {
            report.fail(format!(
                "Locator holds {} ids, header counts {}",
                self.locator.len(),
                self.header.entry_count
            ));
        }
        if !report.orphaned_pages.is_empty() {
            report.fail(format!(
                "{} pages unreachable from the root",
                report.orphaned_pages.len()
            ));
        }
        report
    }

    pub fn stats(&self) -> RTreeStats {
        let mut stats = RTreeStats {
            total_entries: self.header.entry_count,
            tree_height: self.header.height,
            ..RTreeStats::default()
        };
        let mut leaf_fill = 0usize;
        for node in self.pages.values() {
            stats.node_count += 1;
            if let Node::Leaf { entries } = node {
                stats.leaf_count += 1;
                leaf_fill += entries.len();
            }
        }
        if stats.leaf_count > 0 {
            stats.average_leaf_fill =
                leaf_fill as f64 / (stats.leaf_count as f64 * self.max_entries as f64);
        }
        stats
    }

    pub(crate) fn node(&self, page: PageId) -> GeoResult<&Node> {
        self.pages.get(&page).ok_or_else(|| missing_page(page))
    }

    fn node_mut(&mut self, page: PageId) -> GeoResult<&mut Node> {
        self.pages.get_mut(&page).ok_or_else(|| missing_page(page))
    }

    fn allocate(&mut self, node: Node) -> PageId {
        let page = self.header.next_page_id;
        self.header.next_page_id += 1;
        self.pages.insert(page, node);
        page
    }

    fn free(&mut self, page: PageId) -> GeoResult<Node> {
        self.pages.remove(&page).ok_or_else(|| missing_page(page))
    }

    fn root_level(&self) -> GeoResult<u32> {
        Ok(self.node(self.header.root_page)?.level())
    }

    fn set_root(&mut self, page: PageId, level: u32) {
        self.header.root_page = page;
        self.header.height = level + 1;
    }

    fn check_insertable(&self, id: RecordId, envelope: &Envelope) -> GeoResult<()> {
        if self.locator.contains_key(&id) {
            return Err(GeoError::new(
                &format!("Record {} is already indexed", id),
                ErrorKind::IndexError,
            ));
        }
        let finite = [envelope.min_x, envelope.min_y, envelope.max_x, envelope.max_y]
            .iter()
            .all(|v| v.is_finite());
        if envelope.is_empty() || !finite {
            return Err(GeoError::new(
                &format!("Cannot index record {} with envelope {}", id, envelope),
                ErrorKind::IndexError,
            ));
        }
        Ok(())
    }

    /// Adds an item to a node at `level`, splitting upward as needed.
    fn insert_item(&mut self, item: Item, level: u32) -> GeoResult<()> {
        if self.header.root_page == NO_PAGE {
            let root = self.allocate(Node::from_items(level, vec![item]));
            self.set_root(root, level);
            return Ok(());
        }

        let envelope = item.envelope();
        let mut path = Vec::new();
        let target = self.choose_node(self.header.root_page, &envelope, level, &mut path)?;
        self.node_mut(target)?.push(item);

        let split = self.split_if_overflowing(target)?;
        self.propagate_split(&path, split)
    }

    /// Descends from `page` to the node at `level` whose envelope needs the
    /// least enlargement to take `envelope`, recording the path taken.
    fn choose_node(
        &self,
        page: PageId,
        envelope: &Envelope,
        level: u32,
        path: &mut Vec<(PageId, usize)>,
    ) -> GeoResult<PageId> {
        let mut current = page;
        loop {
            let node = self.node(current)?;
            if node.level() <= level {
                return Ok(current);
            }
            let Node::Internal { children, .. } = node else {
                return Ok(current);
            };

            let mut best_idx = 0;
            let mut best_enlargement = f64::INFINITY;
            let mut best_area = f64::INFINITY;
            for (i, child) in children.iter().enumerate() {
                let enlargement = child.envelope.enlargement(envelope);
                let area = child.envelope.area();
                if enlargement < best_enlargement
                    || (enlargement == best_enlargement && area < best_area)
                {
                    best_enlargement = enlargement;
                    best_area = area;
                    best_idx = i;
                }
            }

            path.push((current, best_idx));
            current = children[best_idx].page_id;
        }
    }

    /// Splits `page` when it exceeds capacity, returning the new sibling.
    fn split_if_overflowing(&mut self, page: PageId) -> GeoResult<Option<ChildRef>> {
        let node = self.node(page)?;
        if node.len() <= self.max_entries {
            return Ok(None);
        }
        let level = node.level();
        let items = node.clone().into_items();
        let (keep, moved) = quadratic_split(items, self.min_entries);
        debug!(
            "Splitting page {} at level {} into {} + {}",
            page,
            level,
            keep.len(),
            moved.len()
        );

        *self.node_mut(page)? = Node::from_items(level, keep);
        let sibling = Node::from_items(level, moved);
        let envelope = sibling.compute_envelope();
        let page_id = self.allocate(sibling);
        Ok(Some(ChildRef { envelope, page_id }))
    }

    /// Walks the insertion path bottom-up, refreshing envelopes, adding any
    /// split sibling to its parent and growing a new root if the old one split.
    fn propagate_split(
        &mut self,
        path: &[(PageId, usize)],
        mut split: Option<ChildRef>,
    ) -> GeoResult<()> {
        for &(parent, child_idx) in path.iter().rev() {
            let child_page = match self.node(parent)? {
                Node::Internal { children, .. } => children[child_idx].page_id,
                Node::Leaf { .. } => return Err(missing_page(parent)),
            };
            let child_envelope = self.node(child_page)?.compute_envelope();

            if let Node::Internal { children, .. } = self.node_mut(parent)? {
                children[child_idx].envelope = child_envelope;
                if let Some(sibling) = split.take() {
                    children.push(sibling);
                }
            }
            split = self.split_if_overflowing(parent)?;
        }

        if let Some(sibling) = split {
            let old_root = self.header.root_page;
            let old_node = self.node(old_root)?;
            let level = old_node.level() + 1;
            let old_envelope = old_node.compute_envelope();
            let new_root = self.allocate(Node::Internal {
                children: vec![
                    ChildRef {
                        envelope: old_envelope,
                        page_id: old_root,
                    },
                    sibling,
                ],
                level,
            });
            debug!("Root split, tree grows to height {}", level + 1);
            self.set_root(new_root, level);
        }
        Ok(())
    }

    /// Finds the leaf holding `id`, following only children whose
    /// envelopes cover the entry's envelope.
    fn find_leaf(
        &self,
        page: PageId,
        envelope: &Envelope,
        id: RecordId,
        path: &mut Vec<(PageId, usize)>,
    ) -> GeoResult<Option<PageId>> {
        match self.node(page)? {
            Node::Leaf { entries } => {
                Ok(entries.iter().any(|e| e.id == id).then_some(page))
            }
            Node::Internal { children, .. } => {
                for (i, child) in children.iter().enumerate() {
                    if child.envelope.contains(envelope) {
                        path.push((page, i));
                        if let Some(leaf) = self.find_leaf(child.page_id, envelope, id, path)? {
                            return Ok(Some(leaf));
                        }
                        path.pop();
                    }
                }
                Ok(None)
            }
        }
    }

    /// Restores the occupancy and bounding invariants after a removal from `leaf`.
    fn condense(&mut self, leaf: PageId, path: &[(PageId, usize)]) -> GeoResult<()> {
        let mut orphans: Vec<(Item, u32)> = Vec::new();
        let mut current = leaf;

        for &(parent, child_idx) in path.iter().rev() {
            let node = self.node(current)?;
            if node.len() < self.min_entries {
                let level = node.level();
                let removed = self.free(current)?;
                orphans.extend(removed.into_items().into_iter().map(|item| (item, level)));
                if let Node::Internal { children, .. } = self.node_mut(parent)? {
                    children.remove(child_idx);
                }
            } else {
                let envelope = node.compute_envelope();
                if let Node::Internal { children, .. } = self.node_mut(parent)? {
                    children[child_idx].envelope = envelope;
                }
            }
            current = parent;
        }

        if self.node(self.header.root_page)?.is_empty() {
            let root = self.header.root_page;
            self.free(root)?;
            self.header.root_page = NO_PAGE;
            self.header.height = 0;
        }

        if !orphans.is_empty() {
            debug!("Condense reinserting {} orphaned items", orphans.len());
        }
        // subtrees first so their levels still exist
        orphans.sort_by(|a, b| b.1.cmp(&a.1));
        for (item, level) in orphans {
            self.reinsert(item, level)?;
        }

        self.shorten_root()
    }

    /// Reinserts an orphan at its level, or entry by entry when the tree has
    /// become too short to hold it there.
    fn reinsert(&mut self, item: Item, level: u32) -> GeoResult<()> {
        let fits = level == 0
            || (self.header.root_page != NO_PAGE && self.root_level()? >= level);
        if fits {
            return self.insert_item(item, level);
        }
        match item {
            Item::Entry(_) => self.insert_item(item, 0),
            Item::Child(child) => {
                for entry in self.take_entries(child.page_id)? {
                    self.insert_item(Item::Entry(entry), 0)?;
                }
                Ok(())
            }
        }
    }

    fn shorten_root(&mut self) -> GeoResult<()> {
        loop {
            let root = self.header.root_page;
            if root == NO_PAGE {
                return Ok(());
            }
            let only_child = match self.node(root)? {
                Node::Internal { children, level } if children.len() == 1 => {
                    Some((children[0].page_id, *level - 1))
                }
                _ => None,
            };
            match only_child {
                Some((child, level)) => {
                    self.free(root)?;
                    self.set_root(child, level);
                }
                None => return Ok(()),
            }
        }
    }

    /// Packs items bottom-up into a subtree, returning its root page and level.
    fn pack(&mut self, items: Vec<Item>) -> (PageId, u32) {
        let mut level = 0u32;
        let mut current = items;
        loop {
            if current.len() <= self.max_entries {
                let root = self.allocate(Node::from_items(level, current));
                return (root, level);
            }
            current = str_partition(current, self.max_entries)
                .into_iter()
                .map(|group| {
                    let node = Node::from_items(level, group);
                    let envelope = node.compute_envelope();
                    let page_id = self.allocate(node);
                    Item::Child(ChildRef { envelope, page_id })
                })
                .collect();
            level += 1;
        }
    }

    /// Attaches a packed subtree shorter than the tree.
    fn graft(&mut self, packed: PageId, packed_level: u32) -> GeoResult<()> {
        let node = self.node(packed)?;
        if node.len() >= self.min_entries {
            let envelope = node.compute_envelope();
            return self.insert_item(
                Item::Child(ChildRef {
                    envelope,
                    page_id: packed,
                }),
                packed_level + 1,
            );
        }
        // an underfull packed root is dissolved into its children
        let items = self.free(packed)?.into_items();
        for item in items {
            self.insert_item(item, packed_level)?;
        }
        Ok(())
    }

    /// Removes a subtree from the page map, returning its leaf entries.
    fn take_entries(&mut self, page: PageId) -> GeoResult<Vec<LeafEntry>> {
        let mut entries = Vec::new();
        let mut stack = vec![page];
        while let Some(current) = stack.pop() {
            match self.free(current)? {
                Node::Leaf { entries: leaf } => entries.extend(leaf),
                Node::Internal { children, .. } => {
                    stack.extend(children.iter().map(|c| c.page_id))
                }
            }
        }
        Ok(entries)
    }

    fn free_subtree(&mut self, page: PageId) -> GeoResult<()> {
        self.take_entries(page).map(|_| ())
    }

    fn check_node(
        &self,
        page: PageId,
        expected_level: u32,
        is_root: bool,
        report: &mut IntegrityReport,
        reachable: &mut HashSet<PageId>,
        leaf_entries: &mut u64,
    ) {
        if !reachable.insert(page) {
            report.fail(format!("Page {} is referenced twice", page));
            return;
        }
        let node = match self.node(page) {
            Ok(node) => node,
            Err(e) => {
                report.fail(e.to_string());
                return;
            }
        };
        report.nodes_checked += 1;

        if node.level() != expected_level {
            report.fail(format!(
                "Page {} at level {} where level {} was expected",
                page,
                node.level(),
                expected_level
            ));
        }
        if node.len() > self.max_entries {
            report.fail(format!(
                "Page {} holds {} items, above the maximum {}",
                page,
                node.len(),
                self.max_entries
            ));
        }
        if !is_root && node.len() < self.min_entries {
            report.fail(format!(
                "Page {} holds {} items, below the minimum {}",
                page,
                node.len(),
                self.min_entries
            ));
        }

        match node {
            Node::Leaf { entries } => {
                *leaf_entries += entries.len() as u64;
                for entry in entries {
                    if self.locator.get(&entry.id) != Some(&entry.envelope) {
                        report.fail(format!(
                            "Entry {} on page {} disagrees with the locator",
                            entry.id, page
                        ));
                    }
                }
            }
            Node::Internal { children, .. } => {
                for child in children {
                    if let Ok(child_node) = self.node(child.page_id) {
                        if child_node.compute_envelope() != child.envelope {
                            report.fail(format!(
                                "Envelope of page {} in parent {} is not tight",
                                child.page_id, page
                            ));
                        }
                    }
                    self.check_node(
                        child.page_id,
                        expected_level.saturating_sub(1),
                        false,
                        report,
                        reachable,
                        leaf_entries,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn point(x: f64, y: f64) -> Envelope {
        Envelope::new(x, y, x, y)
    }

    fn assert_valid(tree: &RTree) {
        let report = tree.check_integrity();
        assert!(report.is_valid, "{:?}", report.errors);
    }

    fn ids_in(tree: &RTree, window: &Envelope) -> Vec<u64> {
        let mut ids: Vec<u64> = tree
            .cursor(|e| e.intersects(window))
            .map(|r| r.unwrap().id.value())
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_empty_tree() {
        let tree = RTree::new(8, 3);
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
        assert!(tree.bounds().is_empty());
        assert_valid(&tree);
    }

    #[test]
    fn test_insert_and_search() {
        let mut tree = RTree::new(4, 2);
        for i in 0..50u64 {
            tree.insert(RecordId::new(i), point(i as f64, i as f64)).unwrap();
        }
        assert_eq!(tree.len(), 50);
        assert!(tree.height() > 1);
        assert_valid(&tree);
        assert_eq!(ids_in(&tree, &Envelope::new(10.0, 10.0, 12.0, 12.0)), vec![10, 11, 12]);
        assert_eq!(tree.bounds(), Envelope::new(0.0, 0.0, 49.0, 49.0));
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let mut tree = RTree::new(4, 2);
        tree.insert(RecordId::new(1), point(0.0, 0.0)).unwrap();
        let before = tree.clone();
        let err = tree.insert(RecordId::new(1), point(5.0, 5.0)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexError);
        assert_eq!(tree, before);
    }

    #[test]
    fn test_empty_envelope_is_rejected() {
        let mut tree = RTree::new(4, 2);
        let err = tree.insert(RecordId::new(1), Envelope::empty()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexError);
        let err = tree
            .insert(RecordId::new(2), Envelope::new(0.0, 0.0, f64::NAN, 1.0))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexError);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut tree = RTree::new(4, 2);
        for i in 0..30u64 {
            tree.insert(RecordId::new(i), point((i % 6) as f64, (i / 6) as f64)).unwrap();
        }
        for i in (0..30u64).step_by(2) {
            assert!(tree.remove(RecordId::new(i)).unwrap());
            assert_valid(&tree);
        }
        assert!(!tree.remove(RecordId::new(0)).unwrap());
        assert_eq!(tree.len(), 15);
        let all = ids_in(&tree, &Envelope::new(-1.0, -1.0, 10.0, 10.0));
        assert_eq!(all, (1..30u64).step_by(2).collect::<Vec<_>>());
    }

    #[test]
    fn test_remove_everything_empties_tree() {
        let mut tree = RTree::new(4, 2);
        for i in 0..40u64 {
            tree.insert(RecordId::new(i), point(i as f64, 0.0)).unwrap();
        }
        for i in 0..40u64 {
            assert!(tree.remove(RecordId::new(i)).unwrap());
        }
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.stats().node_count, 0);
        assert_valid(&tree);
    }

    #[test]
    fn test_random_insert_remove_keeps_invariants() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut tree = RTree::new(6, 2);
        let mut live: Vec<u64> = Vec::new();
        let mut next_id = 0u64;

        for round in 0..600 {
            if live.is_empty() || rng.gen_bool(0.6) {
                let x: f64 = rng.gen_range(-100.0..100.0);
                let y: f64 = rng.gen_range(-100.0..100.0);
                let w: f64 = rng.gen_range(0.0..5.0);
                tree.insert(RecordId::new(next_id), Envelope::new(x, y, x + w, y + w))
                    .unwrap();
                live.push(next_id);
                next_id += 1;
            } else {
                let idx = rng.gen_range(0..live.len());
                let id = live.swap_remove(idx);
                assert!(tree.remove(RecordId::new(id)).unwrap());
            }
            if round % 50 == 0 {
                assert_valid(&tree);
            }
        }
        assert_valid(&tree);
        assert_eq!(tree.len(), live.len() as u64);
        let mut ids: Vec<u64> = tree.ids().map(|id| id.value()).collect();
        ids.sort();
        live.sort();
        assert_eq!(ids, live);
    }

    #[test]
    fn test_bulk_load_into_empty_tree() {
        let mut tree = RTree::new(8, 3);
        let entries: Vec<_> = (0..500u64)
            .map(|i| (RecordId::new(i), point((i % 25) as f64, (i / 25) as f64)))
            .collect();
        tree.bulk_load(entries).unwrap();
        assert_eq!(tree.len(), 500);
        assert_valid(&tree);
        assert_eq!(
            ids_in(&tree, &Envelope::new(0.0, 0.0, 1.0, 0.0)),
            vec![0, 1]
        );
    }

    #[test]
    fn test_bulk_load_merges_with_existing_content() {
        let mut tree = RTree::new(4, 2);
        for i in 0..200u64 {
            tree.insert(RecordId::new(i), point(i as f64, 0.0)).unwrap();
        }
        // small batch: grafted below the root
        let small: Vec<_> = (1000..1006u64)
            .map(|i| (RecordId::new(i), point(i as f64, 1.0)))
            .collect();
        tree.bulk_load(small).unwrap();
        assert_valid(&tree);

        // large batch: repacked together with the existing entries
        let large: Vec<_> = (2000..3000u64)
            .map(|i| (RecordId::new(i), point(i as f64, 2.0)))
            .collect();
        tree.bulk_load(large).unwrap();
        assert_valid(&tree);
        assert_eq!(tree.len(), 1206);
        assert_eq!(ids_in(&tree, &Envelope::new(1000.0, 1.0, 1001.0, 1.0)), vec![1000, 1001]);
    }

    #[test]
    fn test_bulk_load_single_entry_graft() {
        let mut tree = RTree::new(4, 2);
        for i in 0..20u64 {
            tree.insert(RecordId::new(i), point(i as f64, 0.0)).unwrap();
        }
        tree.bulk_load(vec![(RecordId::new(99), point(3.0, 3.0))]).unwrap();
        assert_valid(&tree);
        assert!(tree.contains(RecordId::new(99)));
    }

    #[test]
    fn test_bulk_load_rejects_duplicates_atomically() {
        let mut tree = RTree::new(4, 2);
        tree.insert(RecordId::new(1), point(0.0, 0.0)).unwrap();
        let before = tree.clone();
        let err = tree
            .bulk_load(vec![
                (RecordId::new(2), point(1.0, 1.0)),
                (RecordId::new(1), point(2.0, 2.0)),
            ])
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexError);
        assert_eq!(tree, before);

        let err = tree
            .bulk_load(vec![
                (RecordId::new(3), point(1.0, 1.0)),
                (RecordId::new(3), point(2.0, 2.0)),
            ])
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexError);
        assert_eq!(tree, before);
    }

    #[test]
    fn test_clone_is_isolated() {
        let mut tree = RTree::new(4, 2);
        for i in 0..10u64 {
            tree.insert(RecordId::new(i), point(i as f64, 0.0)).unwrap();
        }
        let frozen = tree.clone();
        tree.remove(RecordId::new(3)).unwrap();
        tree.insert(RecordId::new(50), point(50.0, 0.0)).unwrap();
        assert!(frozen.contains(RecordId::new(3)));
        assert!(!frozen.contains(RecordId::new(50)));
        assert_eq!(frozen.len(), 10);
        assert_valid(&frozen);
        assert_valid(&tree);
    }

    #[test]
    fn test_stats() {
        let mut tree = RTree::new(4, 2);
        for i in 0..16u64 {
            tree.insert(RecordId::new(i), point(i as f64, 0.0)).unwrap();
        }
        let stats = tree.stats();
        assert_eq!(stats.total_entries, 16);
        assert_eq!(stats.tree_height, tree.height());
        assert!(stats.leaf_count >= 4);
        assert!(stats.average_leaf_fill > 0.0 && stats.average_leaf_fill <= 1.0);
    }

    #[test]
    fn test_clear() {
        let mut tree = RTree::new(4, 2);
        tree.insert(RecordId::new(1), point(0.0, 0.0)).unwrap();
        tree.set_version(1);
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.version(), 1);
        assert_valid(&tree);
    }
}
