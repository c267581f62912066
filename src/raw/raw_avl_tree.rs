use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::marker::PhantomData;

use smallvec::SmallVec;

use super::node::{Link, Node, NodePtr};
use crate::AvlError;
use crate::tracing_helpers::{debug_log, error_log, trace_log};

/// Stack used by every whole-tree walk. AVL height stays below 1.45 * log2(n + 2), so the
/// inline capacity is only exceeded by trees far beyond anything addressable.
pub(crate) type Stack<T> = SmallVec<[T; 64]>;

/// The core AVL implementation backing `AvlTree`.
///
/// Every `NodePtr` handled here was produced by [`Node::leak`] and is owned by exactly one
/// tree, except while a `split` or `join` call moves it from one tree to another.
pub(crate) struct RawAvlTree<V> {
    /// The root node, if the tree is non-empty.
    root: Link<V>,
    _owns: PhantomData<Box<Node<V>>>,
}

// SAFETY: The tree uniquely owns its nodes; sending it sends the values.
unsafe impl<V: Send> Send for RawAvlTree<V> {}
// SAFETY: Shared access only ever hands out shared references to values.
unsafe impl<V: Sync> Sync for RawAvlTree<V> {}

/// Result of searching for a key.
pub(crate) enum SearchResult<V> {
    /// The key is held by this node.
    Found(NodePtr<V>),
    /// The key is absent; this node would become its parent.
    NotFound(NodePtr<V>),
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

impl<V> RawAvlTree<V> {
    /// Creates a new, empty tree.
    pub(crate) const fn new() -> Self {
        Self {
            root: None,
            _owns: PhantomData,
        }
    }

    /// Wraps a subtree that has been cut loose from its parent.
    fn detached(&mut self, subtree: Link<V>) -> Self {
        self.set_parent(subtree, None);
        Self {
            root: subtree,
            _owns: PhantomData,
        }
    }

    /// Returns the root node, if any.
    pub(crate) fn root(&self) -> Link<V> {
        self.root
    }

    /// Returns the number of nodes in the tree.
    pub(crate) fn len(&self) -> usize {
        self.size_of(self.root)
    }

    /// Returns true if the tree contains no nodes.
    pub(crate) fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the height of the tree; -1 when empty.
    pub(crate) fn height(&self) -> isize {
        self.height_of(self.root)
    }

    /// Returns a reference to a node by pointer.
    #[inline]
    #[allow(clippy::unused_self)] // `&self` bounds the lifetime of the returned reference.
    pub(crate) fn node(&self, ptr: NodePtr<V>) -> &Node<V> {
        // SAFETY: `ptr` is a live node (see the type-level invariant) and `&self` keeps the
        // tree, and therefore the node, alive for the returned lifetime.
        unsafe { ptr.as_ref() }
    }

    /// Returns a mutable reference to a node by pointer.
    #[inline]
    #[allow(clippy::unused_self)] // `&mut self` makes the returned reference exclusive.
    fn node_mut(&mut self, mut ptr: NodePtr<V>) -> &mut Node<V> {
        // SAFETY: As for `node`; `&mut self` guarantees no other reference into the tree.
        unsafe { ptr.as_mut() }
    }

    #[inline]
    fn height_of(&self, link: Link<V>) -> isize {
        link.map_or(-1, |ptr| self.node(ptr).height)
    }

    #[inline]
    fn size_of(&self, link: Link<V>) -> usize {
        link.map_or(0, |ptr| self.node(ptr).size)
    }

    /// Sets the parent of `link`. Writing through the absent node is a no-op.
    #[inline]
    fn set_parent(&mut self, link: Link<V>, parent: Link<V>) {
        if let Some(ptr) = link {
            self.node_mut(ptr).parent = parent;
        }
    }

    #[inline]
    fn balance_factor(&self, ptr: NodePtr<V>) -> isize {
        let node = self.node(ptr);
        self.height_of(node.left) - self.height_of(node.right)
    }

    /// Turns `ptr` back into a lone leaf, keeping its key and value.
    fn reset_to_leaf(&mut self, ptr: NodePtr<V>) {
        let node = self.node_mut(ptr);
        node.left = None;
        node.right = None;
        node.parent = None;
        node.height = 0;
        node.size = 1;
        node.min = ptr;
        node.max = ptr;
    }

    // ─── Search ──────────────────────────────────────────────────────────────

    /// Descends from the root towards `key`. Returns `None` only for an empty tree.
    pub(crate) fn search(&self, key: i64) -> Option<SearchResult<V>> {
        let mut current = self.root?;

        loop {
            let node = self.node(current);
            let next = match key.cmp(&node.key) {
                Ordering::Equal => return Some(SearchResult::Found(current)),
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };
            match next {
                Some(child) => current = child,
                None => return Some(SearchResult::NotFound(current)),
            }
        }
    }

    /// Returns the node holding `key`.
    pub(crate) fn find(&self, key: i64) -> Link<V> {
        match self.search(key)? {
            SearchResult::Found(ptr) => Some(ptr),
            SearchResult::NotFound(_) => None,
        }
    }

    /// Returns a mutable reference to the value stored under `key`.
    pub(crate) fn get_mut(&mut self, key: i64) -> Option<&mut V> {
        let ptr = self.find(key)?;
        Some(self.node_mut(ptr).value_mut())
    }

    /// Returns the node with the smallest key.
    pub(crate) fn first(&self) -> Link<V> {
        self.root.map(|root| self.node(root).min)
    }

    /// Returns the node with the largest key.
    pub(crate) fn last(&self) -> Link<V> {
        self.root.map(|root| self.node(root).max)
    }

    // ─── Fixup and rotations ─────────────────────────────────────────────────

    /// Recomputes height, size, min and max of `ptr` from its children, which must already be
    /// up to date.
    fn fix(&mut self, ptr: NodePtr<V>) {
        let (left, right) = {
            let node = self.node(ptr);
            (node.left, node.right)
        };
        let height = 1 + self.height_of(left).max(self.height_of(right));
        let size = 1 + self.size_of(left) + self.size_of(right);
        let min = left.map_or(ptr, |l| self.node(l).min);
        let max = right.map_or(ptr, |r| self.node(r).max);

        let node = self.node_mut(ptr);
        node.height = height;
        node.size = size;
        node.min = min;
        node.max = max;
    }

    /// Points whichever slot of `parent` held `old` at `new`. With no parent, `old` was the
    /// root.
    fn replace_child(&mut self, parent: Link<V>, old: NodePtr<V>, new: Link<V>) {
        match parent {
            None => self.root = new,
            Some(parent) => {
                let parent = self.node_mut(parent);
                if parent.left == Some(old) {
                    parent.left = new;
                } else {
                    parent.right = new;
                }
            }
        }
    }

    /// Promotes the left child of `ptr` into its position. `ptr` becomes the right child of
    /// the promoted node and adopts its former right subtree. Aggregates are left stale.
    fn rotate_right(&mut self, ptr: NodePtr<V>) {
        let parent = self.node(ptr).parent;
        let pivot = self.node(ptr).left.expect("`rotate_right()` - node has no left child!");
        trace_log!(key = self.node(ptr).key, pivot = self.node(pivot).key, "rotate right");

        self.replace_child(parent, ptr, Some(pivot));
        self.node_mut(pivot).parent = parent;

        let inner = self.node(pivot).right;
        self.node_mut(ptr).left = inner;
        self.set_parent(inner, Some(ptr));

        self.node_mut(pivot).right = Some(ptr);
        self.node_mut(ptr).parent = Some(pivot);
    }

    /// Mirror image of [`rotate_right`](Self::rotate_right).
    fn rotate_left(&mut self, ptr: NodePtr<V>) {
        let parent = self.node(ptr).parent;
        let pivot = self.node(ptr).right.expect("`rotate_left()` - node has no right child!");
        trace_log!(key = self.node(ptr).key, pivot = self.node(pivot).key, "rotate left");

        self.replace_child(parent, ptr, Some(pivot));
        self.node_mut(pivot).parent = parent;

        let inner = self.node(pivot).left;
        self.node_mut(ptr).right = inner;
        self.set_parent(inner, Some(ptr));

        self.node_mut(pivot).left = Some(ptr);
        self.node_mut(ptr).parent = Some(pivot);
    }

    // ─── Balance propagation ─────────────────────────────────────────────────

    /// Walks from `start` to the root, restoring aggregates and the AVL condition.
    ///
    /// Returns the number of rebalancing operations: 1 per height change, 1 per single
    /// rotation and 4 per double rotation.
    fn rebalance_from(&mut self, start: Link<V>) -> usize {
        let mut count = 0;
        let mut current = start;

        while let Some(ptr) = current {
            let old_height = self.node(ptr).height;

            match self.balance_factor(ptr) {
                -1..=1 => {
                    self.fix(ptr);
                    if self.node(ptr).height != old_height {
                        count += 1;
                    }
                }
                2 => {
                    let left = self.node(ptr).left.expect("left-heavy node has a left child");
                    if self.balance_factor(left) >= 0 {
                        self.rotate_right(ptr);
                        self.fix(ptr);
                        count += if self.node(ptr).height == old_height { 1 } else { 2 };
                    } else {
                        self.rotate_left(left);
                        self.fix(left);
                        self.rotate_right(ptr);
                        self.fix(ptr);
                        count += 4;
                    }
                }
                -2 => {
                    let right = self.node(ptr).right.expect("right-heavy node has a right child");
                    if self.balance_factor(right) <= 0 {
                        self.rotate_left(ptr);
                        self.fix(ptr);
                        count += if self.node(ptr).height == old_height { 1 } else { 2 };
                    } else {
                        self.rotate_right(right);
                        self.fix(right);
                        self.rotate_left(ptr);
                        self.fix(ptr);
                        count += 4;
                    }
                }
                bf => {
                    error_log!(key = self.node(ptr).key, bf, "balance factor out of range");
                    unreachable!("balance factor {bf} at key {}", self.node(ptr).key);
                }
            }

            // After a rotation this is the promoted node, which still needs its own fixup.
            current = self.node(ptr).parent;
        }

        count
    }

    // ─── Insert ──────────────────────────────────────────────────────────────

    /// Inserts a key-value pair, returning the number of rebalancing operations.
    pub(crate) fn insert(&mut self, key: i64, value: V) -> Result<usize, AvlError> {
        match self.search(key) {
            None => {
                self.root = Some(Node::leak(key, value));
                Ok(0)
            }
            Some(SearchResult::Found(_)) => Err(AvlError::DuplicateKey(key)),
            Some(SearchResult::NotFound(parent)) => {
                let leaf = Node::leak(key, value);
                Ok(self.attach(parent, leaf))
            }
        }
    }

    /// Inserts an already allocated leaf whose key is known to be absent.
    fn insert_node(&mut self, leaf: NodePtr<V>) -> usize {
        let key = self.node(leaf).key;
        match self.search(key) {
            None => {
                self.root = Some(leaf);
                0
            }
            Some(SearchResult::NotFound(parent)) => self.attach(parent, leaf),
            Some(SearchResult::Found(_)) => unreachable!("`insert_node()` - key {key} is already present!"),
        }
    }

    /// Hangs `leaf` below `parent` on the side its key belongs to, then rebalances.
    fn attach(&mut self, parent: NodePtr<V>, leaf: NodePtr<V>) -> usize {
        let key = self.node(leaf).key;
        self.node_mut(leaf).parent = Some(parent);

        let parent_node = self.node_mut(parent);
        if parent_node.key < key {
            parent_node.right = Some(leaf);
        } else {
            parent_node.left = Some(leaf);
        }

        self.rebalance_from(Some(parent))
    }

    // ─── Delete ──────────────────────────────────────────────────────────────

    /// Removes `key`, returning its value and the number of rebalancing operations.
    pub(crate) fn delete(&mut self, key: i64) -> Result<(V, usize), AvlError> {
        let Some(ptr) = self.find(key) else {
            return Err(AvlError::KeyNotFound(key));
        };

        let (left, right, parent) = {
            let node = self.node(ptr);
            (node.left, node.right, node.parent)
        };

        let count = if left.is_some() && right.is_some() {
            let start = self.splice_successor(ptr);
            self.rebalance_from(Some(start))
        } else {
            // Leaf or unary: the surviving child (possibly absent) takes the node's slot.
            let child = left.or(right);
            self.set_parent(child, parent);
            self.replace_child(parent, ptr, child);
            match parent {
                Some(parent) => self.rebalance_from(Some(parent)),
                None => 0,
            }
        };

        // SAFETY: `ptr` has been unlinked from every node of the tree above.
        let node = unsafe { Node::unleak(ptr) };
        Ok((node.value, count))
    }

    /// Moves the in-order successor of `ptr` (which has two children) into `ptr`'s position.
    ///
    /// Returns the node from which rebalancing has to start: the successor's original parent
    /// when the successor sat deeper than `ptr`'s right child, otherwise the successor itself.
    fn splice_successor(&mut self, ptr: NodePtr<V>) -> NodePtr<V> {
        let (parent, left, right, height, size, min, max) = {
            let node = self.node(ptr);
            (
                node.parent,
                node.left,
                node.right.expect("`splice_successor()` - node has no right child!"),
                node.height,
                node.size,
                node.min,
                node.max,
            )
        };

        let mut successor = right;
        while let Some(next) = self.node(successor).left {
            successor = next;
        }
        let successor_parent = self.node(successor).parent.expect("successor sits below `ptr`");

        self.replace_child(parent, ptr, Some(successor));
        {
            let node = self.node_mut(successor);
            node.parent = parent;
            node.left = left;
            node.height = height;
            node.size = size;
            node.min = min;
            node.max = max;
        }
        self.set_parent(left, Some(successor));

        if successor_parent == ptr {
            return successor;
        }

        let orphan = self.node(successor).right;
        self.node_mut(successor_parent).left = orphan;
        self.set_parent(orphan, Some(successor_parent));

        self.node_mut(successor).right = Some(right);
        self.node_mut(right).parent = Some(successor);

        successor_parent
    }

    // ─── Split and join ──────────────────────────────────────────────────────

    /// Splits the tree around `key` into the nodes below it and the nodes above it. The node
    /// holding `key` is dropped together with its value.
    ///
    /// Returns `None` (leaving the tree untouched) if `key` is absent.
    pub(crate) fn split(&mut self, key: i64) -> Option<(Self, Self)> {
        let ptr = self.find(key)?;
        debug_log!(key, len = self.len(), "split");

        // The nodes now belong to `left`, `right` or to the climb below.
        self.root = None;

        let (left_subtree, right_subtree, mut ancestor) = {
            let node = self.node(ptr);
            (node.left, node.right, node.parent)
        };
        let mut left = self.detached(left_subtree);
        let mut right = self.detached(right_subtree);

        // SAFETY: Its children now hang off `left`/`right`, and the climb below only ever reads
        // the side of each ancestor that does not lead back to `ptr`.
        drop(unsafe { Node::unleak(ptr) });

        while let Some(a) = ancestor {
            let (a_key, a_left, a_right, a_parent) = {
                let node = self.node(a);
                (node.key, node.left, node.right, node.parent)
            };
            ancestor = a_parent;

            trace_log!(pivot = a_key, "split step");
            if a_key < key {
                let subtree = self.detached(a_left);
                left.join_node(a, subtree);
            } else {
                let subtree = self.detached(a_right);
                right.join_node(a, subtree);
            }
        }

        Some((left, right))
    }

    /// Allocates a pivot for `key`/`value` and joins `other` into `self` around it.
    pub(crate) fn join(&mut self, key: i64, value: V, other: Self) -> usize {
        let pivot = Node::leak(key, value);
        self.join_node(pivot, other)
    }

    /// Merges `self`, `pivot` and `other` into `self`, whose keys must lie on opposite sides of
    /// the pivot's key. Returns `|height(self) - height(other)| + 1`.
    fn join_node(&mut self, pivot: NodePtr<V>, mut other: Self) -> usize {
        self.reset_to_leaf(pivot);
        let pivot_key = self.node(pivot).key;

        let this_root = self.root.take();
        let other_root = other.root.take();
        let this_height = self.height_of(this_root);
        let other_height = self.height_of(other_root);

        let (tall, short) = if other_height > this_height {
            (other_root, this_root)
        } else {
            (this_root, other_root)
        };
        let short_height = self.height_of(short);
        let cost = (self.height_of(tall) - short_height).unsigned_abs() + 1;
        debug_log!(pivot = pivot_key, this_height, other_height, cost, "join");

        self.root = tall;

        let Some(short_root) = short else {
            self.insert_node(pivot);
            return cost;
        };

        if short_height == 0 {
            self.insert_node(pivot);
            self.reset_to_leaf(short_root);
            self.insert_node(short_root);
            return cost;
        }

        let other_is_right = other_root.is_some_and(|root| self.node(root).key > pivot_key);
        let (left, right) = if other_is_right {
            (this_root, other_root)
        } else {
            (other_root, this_root)
        };

        if cost <= 2 {
            {
                let node = self.node_mut(pivot);
                node.left = left;
                node.right = right;
            }
            self.set_parent(left, Some(pivot));
            self.set_parent(right, Some(pivot));
            self.fix(pivot);
            self.root = Some(pivot);
            return cost;
        }

        // Descend the tall tree along the side facing the short one until the heights meet.
        let side = if right == short { Side::Right } else { Side::Left };
        let mut cursor = tall.expect("taller operand is non-empty");
        while self.node(cursor).height > short_height {
            let node = self.node(cursor);
            let next = match side {
                Side::Right => node.right,
                Side::Left => node.left,
            };
            cursor = next.expect("nodes taller than 1 have both children");
        }
        let above = self.node(cursor).parent.expect("`cursor` is below the tall root");

        match side {
            Side::Right => {
                self.node_mut(above).right = Some(pivot);
                let node = self.node_mut(pivot);
                node.left = Some(cursor);
                node.right = Some(short_root);
            }
            Side::Left => {
                self.node_mut(above).left = Some(pivot);
                let node = self.node_mut(pivot);
                node.left = Some(short_root);
                node.right = Some(cursor);
            }
        }
        {
            let node = self.node_mut(pivot);
            node.parent = Some(above);
            node.height = short_height + 1;
        }
        self.node_mut(cursor).parent = Some(pivot);
        self.node_mut(short_root).parent = Some(pivot);

        self.rebalance_from(Some(pivot));
        cost
    }

    // ─── Order statistics ────────────────────────────────────────────────────

    /// Returns the node at zero-based position `rank` in key order.
    pub(crate) fn get_by_rank(&self, rank: usize) -> Link<V> {
        if rank >= self.len() {
            return None;
        }

        let mut current = self.root?;
        let mut remaining = rank;

        loop {
            let node = self.node(current);
            let left_size = self.size_of(node.left);
            match remaining.cmp(&left_size) {
                Ordering::Less => current = node.left?,
                Ordering::Equal => return Some(current),
                Ordering::Greater => {
                    remaining -= left_size + 1;
                    current = node.right?;
                }
            }
        }
    }

    /// Returns the zero-based position of `key` in key order.
    pub(crate) fn rank_of(&self, key: i64) -> Option<usize> {
        let mut current = self.root?;
        let mut rank = 0;

        loop {
            let node = self.node(current);
            match key.cmp(&node.key) {
                Ordering::Less => current = node.left?,
                Ordering::Equal => return Some(rank + self.size_of(node.left)),
                Ordering::Greater => {
                    rank += self.size_of(node.left) + 1;
                    current = node.right?;
                }
            }
        }
    }

    // ─── Teardown ────────────────────────────────────────────────────────────

    /// Frees every node without recursing.
    pub(crate) fn clear(&mut self) {
        let mut pending: Stack<NodePtr<V>> = self.root.take().into_iter().collect();

        while let Some(ptr) = pending.pop() {
            // SAFETY: Each node is pushed exactly once, by its parent, which is already freed
            // and no longer reachable from `self.root`.
            let node = unsafe { Node::unleak(ptr) };
            pending.extend(node.left);
            pending.extend(node.right);
        }
    }
}

impl<V> Drop for RawAvlTree<V> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<V: Clone> Clone for RawAvlTree<V> {
    /// Copies the shape of the tree node by node, then restores the min/max links, which must
    /// point into the copy.
    fn clone(&self) -> Self {
        let mut copy = Self::new();
        let Some(root) = self.root else {
            return copy;
        };

        let mut created: Vec<NodePtr<V>> = Vec::with_capacity(self.len());
        let mut pending: Stack<(NodePtr<V>, Link<V>, Side)> = Stack::new();
        pending.push((root, None, Side::Left));

        while let Some((source, parent, side)) = pending.pop() {
            let source = self.node(source);
            let ptr = Node::leak(source.key, source.value.clone());
            {
                let node = copy.node_mut(ptr);
                node.height = source.height;
                node.size = source.size;
                node.parent = parent;
            }
            match (parent, side) {
                (None, _) => copy.root = Some(ptr),
                (Some(parent), Side::Left) => copy.node_mut(parent).left = Some(ptr),
                (Some(parent), Side::Right) => copy.node_mut(parent).right = Some(ptr),
            }

            if let Some(left) = source.left {
                pending.push((left, Some(ptr), Side::Left));
            }
            if let Some(right) = source.right {
                pending.push((right, Some(ptr), Side::Right));
            }
            created.push(ptr);
        }

        // Children are created after their parents, so the reverse order fixes them first.
        for &ptr in created.iter().rev() {
            copy.fix(ptr);
        }

        copy
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation, clippy::uninlined_format_args)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;
    use alloc::string::String;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    impl<V> RawAvlTree<V> {
        /// Validates all AVL invariants. Panics with a descriptive message if any are violated.
        pub(crate) fn validate_invariants(&self) {
            let mut errors: Vec<String> = Vec::new();

            if let Some(root) = self.root {
                if self.node(root).parent.is_some() {
                    errors.push(alloc::format!("Root {} has a parent", self.node(root).key));
                }
                self.validate_node(root, None, None, &mut errors);
            }

            assert!(errors.is_empty(), "AVL invariants violated:\n{}", errors.join("\n"));
        }

        /// Checks the subtree at `ptr`, whose keys must lie strictly between `low` and `high`.
        /// Returns its height and size.
        fn validate_node(
            &self,
            ptr: NodePtr<V>,
            low: Option<i64>,
            high: Option<i64>,
            errors: &mut Vec<String>,
        ) -> (isize, usize) {
            let node = self.node(ptr);
            let key = node.key;

            if low.is_some_and(|low| key <= low) || high.is_some_and(|high| key >= high) {
                errors.push(alloc::format!("Key {} is out of order (bounds {:?}..{:?})", key, low, high));
            }

            let mut check_child = |child: Link<V>, low: Option<i64>, high: Option<i64>| match child {
                None => (-1, 0),
                Some(child) => {
                    if self.node(child).parent != Some(ptr) {
                        errors.push(alloc::format!("Child {} of {} has a stale parent", self.node(child).key, key));
                    }
                    self.validate_node(child, low, high, errors)
                }
            };
            let (left_height, left_size) = check_child(node.left, low, Some(key));
            let (right_height, right_size) = check_child(node.right, Some(key), high);

            if (left_height - right_height).abs() > 1 {
                errors.push(alloc::format!(
                    "Node {} is unbalanced: left height {}, right height {}",
                    key,
                    left_height,
                    right_height
                ));
            }

            let height = 1 + left_height.max(right_height);
            if node.height != height {
                errors.push(alloc::format!("Node {} height: stored={}, computed={}", key, node.height, height));
            }

            let size = 1 + left_size + right_size;
            if node.size != size {
                errors.push(alloc::format!("Node {} size: stored={}, computed={}", key, node.size, size));
            }

            let mut min = ptr;
            while let Some(left) = self.node(min).left {
                min = left;
            }
            if node.min != min {
                errors.push(alloc::format!(
                    "Node {} min: stored={}, computed={}",
                    key,
                    self.node(node.min).key,
                    self.node(min).key
                ));
            }

            let mut max = ptr;
            while let Some(right) = self.node(max).right {
                max = right;
            }
            if node.max != max {
                errors.push(alloc::format!(
                    "Node {} max: stored={}, computed={}",
                    key,
                    self.node(node.max).key,
                    self.node(max).key
                ));
            }

            (height, size)
        }

        fn keys(&self) -> Vec<i64> {
            let mut keys = Vec::with_capacity(self.len());
            let mut pending: Vec<NodePtr<V>> = Vec::new();
            let mut current = self.root;
            loop {
                while let Some(ptr) = current {
                    pending.push(ptr);
                    current = self.node(ptr).left;
                }
                let Some(ptr) = pending.pop() else {
                    break;
                };
                keys.push(self.node(ptr).key);
                current = self.node(ptr).right;
            }
            keys
        }

        fn root_key(&self) -> Option<i64> {
            self.root.map(|root| self.node(root).key)
        }
    }

    fn tree_from(keys: &[i64]) -> RawAvlTree<i64> {
        let mut tree = RawAvlTree::new();
        for &key in keys {
            tree.insert(key, key * 10).unwrap();
        }
        tree.validate_invariants();
        tree
    }

    #[test]
    fn ascending_inserts_rotate_once() {
        let mut tree = RawAvlTree::new();
        assert_eq!(tree.insert(1, ()), Ok(0));
        assert_eq!(tree.insert(2, ()), Ok(1));
        // Rotation step at 1 changes its height (2), plus the height change at 2 below it.
        assert_eq!(tree.insert(3, ()), Ok(3));
        tree.validate_invariants();
        assert_eq!(tree.root_key(), Some(2));
        assert_eq!(tree.keys(), [1, 2, 3]);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn zigzag_inserts_rotate_twice() {
        let mut tree = RawAvlTree::new();
        assert_eq!(tree.insert(3, ()), Ok(0));
        assert_eq!(tree.insert(1, ()), Ok(1));
        // Height change at 1, the double rotation (4) and the promoted node's height change.
        assert_eq!(tree.insert(2, ()), Ok(6));
        tree.validate_invariants();
        assert_eq!(tree.root_key(), Some(2));
        assert_eq!(tree.keys(), [1, 2, 3]);
    }

    #[test]
    fn complete_tree_needs_no_rotation() {
        let mut tree = RawAvlTree::new();
        let counts: Vec<usize> = [4, 2, 6, 1, 3, 5, 7].iter().map(|&k| tree.insert(k, ()).unwrap()).collect();
        assert_eq!(counts, [0, 1, 0, 2, 0, 1, 0]);
        tree.validate_invariants();
        assert_eq!(tree.height(), 2);
    }

    #[test]
    fn duplicate_insert_is_refused() {
        let mut tree = tree_from(&[1, 2, 3]);
        assert_eq!(tree.insert(2, 99), Err(AvlError::DuplicateKey(2)));
        assert_eq!(tree.keys(), [1, 2, 3]);
        assert_eq!(tree.get_mut(2).copied(), Some(20));
        tree.validate_invariants();
    }

    #[test]
    fn delete_from_empty_tree() {
        let mut tree: RawAvlTree<()> = RawAvlTree::new();
        assert_eq!(tree.delete(1).err(), Some(AvlError::KeyNotFound(1)));
    }

    #[test]
    fn delete_root_of_complete_tree() {
        let mut tree = tree_from(&[4, 2, 6, 1, 3, 5, 7]);
        let (value, count) = tree.delete(4).unwrap();
        assert_eq!(value, 40);
        assert_eq!(count, 0);
        tree.validate_invariants();
        assert_eq!(tree.root_key(), Some(5));
        assert_eq!(tree.keys(), [1, 2, 3, 5, 6, 7]);
    }

    #[test]
    fn delete_with_deep_successor_rebalances_its_old_parent() {
        let mut tree = tree_from(&[4, 2, 6, 1, 3, 5]);
        // 5 is 6's left child; 6 becomes a leaf and loses one unit of height.
        let (_, count) = tree.delete(4).unwrap();
        assert_eq!(count, 1);
        tree.validate_invariants();
        assert_eq!(tree.root_key(), Some(5));
        assert_eq!(tree.keys(), [1, 2, 3, 5, 6]);
    }

    #[test]
    fn delete_with_adjacent_successor() {
        let mut tree = tree_from(&[2, 1, 3]);
        let (_, count) = tree.delete(2).unwrap();
        assert_eq!(count, 0);
        tree.validate_invariants();
        assert_eq!(tree.root_key(), Some(3));
        assert_eq!(tree.keys(), [1, 3]);
    }

    #[test]
    fn delete_with_adjacent_successor_rotates() {
        let mut tree = tree_from(&[2, 1, 3, 0]);
        // 3 replaces 2 and inherits height 2 with only a left subtree of height 1.
        let (_, count) = tree.delete(2).unwrap();
        assert_eq!(count, 2);
        tree.validate_invariants();
        assert_eq!(tree.root_key(), Some(1));
        assert_eq!(tree.keys(), [0, 1, 3]);
    }

    #[test]
    fn delete_unary_root() {
        let mut tree = tree_from(&[1, 2]);
        assert_eq!(tree.delete(1).map(|(_, count)| count), Ok(0));
        tree.validate_invariants();
        assert_eq!(tree.root_key(), Some(2));

        assert_eq!(tree.delete(2).map(|(_, count)| count), Ok(0));
        assert!(tree.is_empty());
        assert_eq!(tree.height(), -1);
    }

    #[test]
    fn split_complete_tree_at_root() {
        let mut tree = tree_from(&[1, 2, 3, 4, 5, 6, 7]);
        let (left, right) = tree.split(4).unwrap();
        assert!(tree.is_empty());
        left.validate_invariants();
        right.validate_invariants();
        assert_eq!(left.keys(), [1, 2, 3]);
        assert_eq!(right.keys(), [5, 6, 7]);
    }

    #[test]
    fn split_at_extremes() {
        let mut tree = tree_from(&[1, 2, 3, 4, 5, 6, 7]);
        let (left, right) = tree.split(1).unwrap();
        left.validate_invariants();
        right.validate_invariants();
        assert!(left.is_empty());
        assert_eq!(right.keys(), [2, 3, 4, 5, 6, 7]);

        let mut tree = right;
        let (left, right) = tree.split(7).unwrap();
        left.validate_invariants();
        assert_eq!(left.keys(), [2, 3, 4, 5, 6]);
        assert!(right.is_empty());
    }

    #[test]
    fn split_missing_key_leaves_tree_alone() {
        let mut tree = tree_from(&[1, 3]);
        assert!(tree.split(2).is_none());
        assert_eq!(tree.keys(), [1, 3]);
        tree.validate_invariants();
    }

    #[test]
    fn join_empty_operands() {
        let mut tree: RawAvlTree<i64> = RawAvlTree::new();
        assert_eq!(tree.join(5, 50, RawAvlTree::new()), 1);
        tree.validate_invariants();
        assert_eq!(tree.keys(), [5]);

        let mut tree: RawAvlTree<i64> = RawAvlTree::new();
        assert_eq!(tree.join(0, 0, tree_from(&[1, 2, 3])), 3);
        tree.validate_invariants();
        assert_eq!(tree.keys(), [0, 1, 2, 3]);
    }

    #[test]
    fn join_with_single_leaf() {
        let mut tree = tree_from(&[10, 20, 30, 40]);
        assert_eq!(tree.join(5, 50, tree_from(&[1])), 3);
        tree.validate_invariants();
        assert_eq!(tree.keys(), [1, 5, 10, 20, 30, 40]);
    }

    #[test]
    fn join_equal_heights_makes_pivot_root() {
        let mut tree = tree_from(&[1, 2, 3]);
        assert_eq!(tree.join(4, 40, tree_from(&[5, 6, 7])), 1);
        tree.validate_invariants();
        assert_eq!(tree.root_key(), Some(4));
        assert_eq!(tree.keys(), [1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn join_large_gap_on_both_sides() {
        let tall: Vec<i64> = (100..164).collect();
        let tall_height = tree_from(&tall).height();
        assert!(tall_height >= 6);
        let expected = (tall_height - 1).unsigned_abs() + 1;

        let mut tree = tree_from(&tall);
        let cost = tree.join(50, 0, tree_from(&[10, 20, 30]));
        assert_eq!(cost, expected);
        tree.validate_invariants();
        assert_eq!(tree.len(), 68);
        assert_eq!(tree.keys()[..5], [10, 20, 30, 50, 100]);

        let mut tree = tree_from(&[200, 210, 220]);
        let cost = tree.join(190, 0, tree_from(&tall));
        assert_eq!(cost, expected);
        tree.validate_invariants();
        assert_eq!(tree.keys()[62..], [162, 163, 190, 200, 210, 220]);
    }

    #[test]
    fn rank_queries() {
        let tree = tree_from(&[50, 10, 40, 20, 30]);
        let by_rank: Vec<i64> = (0..5).map(|r| tree.node(tree.get_by_rank(r).unwrap()).key()).collect();
        assert_eq!(by_rank, [10, 20, 30, 40, 50]);
        assert!(tree.get_by_rank(5).is_none());
        assert_eq!(tree.rank_of(40), Some(3));
        assert_eq!(tree.rank_of(45), None);
    }

    #[test]
    fn clone_is_independent() {
        let tree = tree_from(&[5, 3, 8, 1, 4, 7, 9, 2, 6]);
        let mut copy = tree.clone();
        copy.validate_invariants();
        assert_eq!(copy.keys(), tree.keys());

        copy.delete(5).unwrap();
        copy.validate_invariants();
        assert_eq!(tree.keys(), [1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(copy.keys(), [1, 2, 3, 4, 6, 7, 8, 9]);
    }

    // Test operations enum for property testing
    #[derive(Clone, Debug)]
    enum Op {
        Insert(i64),
        Delete(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (-200i64..200).prop_map(Op::Insert),
            2 => (-200i64..200).prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn invariants_hold_after_every_operation(ops in prop::collection::vec(op_strategy(), 0..400)) {
            let mut tree = RawAvlTree::new();
            let mut model = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(key) => {
                        let expected = if model.contains_key(&key) {
                            Err(AvlError::DuplicateKey(key))
                        } else {
                            model.insert(key, key);
                            Ok(())
                        };
                        prop_assert_eq!(tree.insert(key, key).map(|_| ()), expected);
                    }
                    Op::Delete(key) => {
                        let result = tree.delete(key).map(|(value, _)| value);
                        prop_assert_eq!(result.ok(), model.remove(&key));
                    }
                }

                tree.validate_invariants();
                prop_assert_eq!(tree.len(), model.len());
                let first = tree.first().map(|ptr| tree.node(ptr).key());
                let last = tree.last().map(|ptr| tree.node(ptr).key());
                prop_assert_eq!(first, model.keys().next().copied());
                prop_assert_eq!(last, model.keys().next_back().copied());
            }

            prop_assert_eq!(tree.keys(), model.keys().copied().collect::<Vec<_>>());
        }

        #[test]
        fn split_then_join_restores_keys(
            keys in prop::collection::btree_set(-1000i64..1000, 1..300),
            which in any::<prop::sample::Index>(),
        ) {
            let keys: Vec<i64> = keys.into_iter().collect();
            let pivot = keys[which.index(keys.len())];
            let mut tree = RawAvlTree::new();
            for &key in &keys {
                tree.insert(key, ()).unwrap();
            }

            let (mut left, right) = tree.split(pivot).unwrap();
            left.validate_invariants();
            right.validate_invariants();
            prop_assert!(left.keys().iter().all(|&k| k < pivot));
            prop_assert!(right.keys().iter().all(|&k| k > pivot));
            prop_assert_eq!(left.len() + right.len() + 1, keys.len());

            let expected_cost = (left.height() - right.height()).unsigned_abs() + 1;
            prop_assert_eq!(left.join(pivot, (), right), expected_cost);
            left.validate_invariants();
            prop_assert_eq!(left.keys(), keys);
        }

        #[test]
        fn join_concatenates_key_ranges(
            low in prop::collection::btree_set(-1000i64..0, 0..200),
            high in prop::collection::btree_set(1i64..1000, 0..200),
            low_on_self in any::<bool>(),
        ) {
            let build = |keys: &alloc::collections::BTreeSet<i64>| {
                let mut tree = RawAvlTree::new();
                for &key in keys {
                    tree.insert(key, ()).unwrap();
                }
                tree
            };
            let (mut this, other) = if low_on_self {
                (build(&low), build(&high))
            } else {
                (build(&high), build(&low))
            };

            this.join(0, (), other);
            this.validate_invariants();

            let mut expected: Vec<i64> = low.iter().copied().collect();
            expected.push(0);
            expected.extend(high.iter().copied());
            prop_assert_eq!(this.keys(), expected);
        }
    }
}
