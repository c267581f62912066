use alloc::vec::Vec;
use core::fmt;
use core::iter::FusedIterator;
use core::ops::Index;

use crate::raw::{NodePtr, RawAvlTree, RawIter};
use crate::{AvlError, Rank};

/// An ordered map from unique `i64` keys to values, based on an [AVL tree].
///
/// Every node caches the height, size, smallest and largest node of its subtree. The height
/// keeps the tree balanced, the size answers rank queries in O(log n), and the extremes make
/// [`min`](AvlTree::min) and [`max`](AvlTree::max) O(1).
///
/// [`insert`](AvlTree::insert) and [`delete`](AvlTree::delete) report the number of
/// rebalancing operations they performed on the way back to the root: each height change
/// counts 1, each single rotation 1 and each double rotation 4.
///
/// # Examples
///
/// ```
/// use avl_ost::{AvlError, AvlTree};
///
/// let mut tree = AvlTree::new();
///
/// assert_eq!(tree.insert(1, "one"), Ok(0));
/// assert_eq!(tree.insert(2, "two"), Ok(1));
/// // The third ascending key forces a rotation at the root.
/// assert_eq!(tree.insert(3, "three"), Ok(3));
///
/// assert_eq!(tree.insert(2, "deux"), Err(AvlError::DuplicateKey(2)));
/// assert_eq!(tree.search(2), Some(&"two"));
/// assert_eq!(tree.root().map(|root| root.key()), Some(2));
///
/// assert_eq!(tree.delete(4), Err(AvlError::KeyNotFound(4)));
/// assert!(tree.delete(1).is_ok());
/// assert_eq!(tree.keys_in_order(), [2, 3]);
/// ```
///
/// Trees with separated key ranges can be split and joined in O(log n):
///
/// ```
/// use avl_ost::AvlTree;
///
/// let mut tree = AvlTree::new();
/// for key in 0..100 {
///     tree.insert(key, ()).unwrap();
/// }
///
/// let (mut low, high) = tree.split(40);
/// assert_eq!(low.len(), 40);
/// assert_eq!(high.len(), 59);
///
/// low.join(40, (), high);
/// assert_eq!(low.keys_in_order(), (0..100).collect::<Vec<_>>());
/// ```
///
/// [AVL tree]: https://en.wikipedia.org/wiki/AVL_tree
pub struct AvlTree<V> {
    raw: RawAvlTree<V>,
}

/// A shared view of one node of an [`AvlTree`].
///
/// This `struct` is created by the [`root`](AvlTree::root) method and the navigation methods
/// of `NodeRef` itself. It exposes the node's cached aggregates, which is mostly useful for
/// inspecting the shape of a tree.
///
/// # Examples
///
/// ```
/// use avl_ost::AvlTree;
///
/// let mut tree = AvlTree::new();
/// for key in [2, 1, 3] {
///     tree.insert(key, key * 10).unwrap();
/// }
///
/// let root = tree.root().unwrap();
/// assert_eq!((root.key(), *root.value()), (2, 20));
/// assert_eq!(root.height(), 1);
/// assert_eq!(root.size(), 3);
/// assert_eq!(root.min().key(), 1);
/// assert_eq!(root.right().map(|right| right.key()), Some(3));
/// ```
pub struct NodeRef<'a, V> {
    tree: &'a RawAvlTree<V>,
    ptr: NodePtr<V>,
}

/// An iterator over the entries of an `AvlTree`, sorted by key.
///
/// This `struct` is created by the [`iter`] method on [`AvlTree`]. See its
/// documentation for more.
///
/// [`iter`]: AvlTree::iter
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, V> {
    inner: RawIter<'a, V>,
}

/// An iterator over the keys of an `AvlTree`, in ascending order.
///
/// This `struct` is created by the [`keys`] method on [`AvlTree`].
///
/// [`keys`]: AvlTree::keys
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Keys<'a, V> {
    inner: Iter<'a, V>,
}

/// An iterator over the values of an `AvlTree`, in key order.
///
/// This `struct` is created by the [`values`] method on [`AvlTree`].
///
/// [`values`]: AvlTree::values
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Values<'a, V> {
    inner: Iter<'a, V>,
}

impl<V> AvlTree<V> {
    /// Makes a new, empty `AvlTree`.
    ///
    /// Does not allocate anything on its own.
    ///
    /// # Examples
    ///
    /// ```
    /// use avl_ost::AvlTree;
    ///
    /// let mut tree = AvlTree::new();
    /// tree.insert(1, "a").unwrap();
    /// ```
    #[must_use]
    pub const fn new() -> AvlTree<V> {
        AvlTree { raw: RawAvlTree::new() }
    }

    /// Returns `true` if the tree contains no elements.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Alias of [`is_empty`](AvlTree::is_empty).
    #[must_use]
    pub fn empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns the number of elements in the tree.
    ///
    /// # Complexity
    ///
    /// O(1), read from the root's size cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Alias of [`len`](AvlTree::len).
    #[must_use]
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// Returns the height of the tree: -1 when empty, 0 for a single node.
    #[must_use]
    pub fn height(&self) -> isize {
        self.raw.height()
    }

    /// Returns the root node, or `None` if the tree is empty.
    #[must_use]
    pub fn root(&self) -> Option<NodeRef<'_, V>> {
        self.raw.root().map(|ptr| NodeRef { tree: &self.raw, ptr })
    }

    /// Clears the tree, removing all elements.
    ///
    /// # Complexity
    ///
    /// O(n)
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Returns a reference to the value stored under `key`.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// use avl_ost::AvlTree;
    ///
    /// let mut tree = AvlTree::new();
    /// tree.insert(7, "seven").unwrap();
    /// assert_eq!(tree.search(7), Some(&"seven"));
    /// assert_eq!(tree.search(8), None);
    /// ```
    #[must_use]
    pub fn search(&self, key: i64) -> Option<&V> {
        self.raw.find(key).map(|ptr| self.raw.node(ptr).value())
    }

    /// Returns a mutable reference to the value stored under `key`.
    #[must_use]
    pub fn get_mut(&mut self, key: i64) -> Option<&mut V> {
        self.raw.get_mut(key)
    }

    /// Returns `true` if the tree holds `key`.
    #[must_use]
    pub fn contains_key(&self, key: i64) -> bool {
        self.raw.find(key).is_some()
    }

    /// Inserts a key-value pair.
    ///
    /// Returns the number of rebalancing operations performed, or
    /// [`AvlError::DuplicateKey`] if the key is already present, in which case the tree is
    /// unchanged and `value` is dropped.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Errors
    ///
    /// Fails with [`AvlError::DuplicateKey`] when `key` is already in the tree.
    pub fn insert(&mut self, key: i64, value: V) -> Result<usize, AvlError> {
        self.raw.insert(key, value)
    }

    /// Deletes `key` from the tree.
    ///
    /// Returns the number of rebalancing operations performed. A node with two children is
    /// replaced by its in-order successor, which is moved rather than copied.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Errors
    ///
    /// Fails with [`AvlError::KeyNotFound`] when `key` is not in the tree.
    ///
    /// # Examples
    ///
    /// ```
    /// use avl_ost::{AvlError, AvlTree};
    ///
    /// let mut tree = AvlTree::new();
    /// for key in [4, 2, 6, 1, 3, 5, 7] {
    ///     tree.insert(key, ()).unwrap();
    /// }
    ///
    /// assert_eq!(tree.delete(4), Ok(0));
    /// assert_eq!(tree.root().map(|root| root.key()), Some(5));
    /// assert_eq!(tree.delete(4), Err(AvlError::KeyNotFound(4)));
    /// ```
    pub fn delete(&mut self, key: i64) -> Result<usize, AvlError> {
        self.raw.delete(key).map(|(_, count)| count)
    }

    /// Removes `key` from the tree, returning its value if it was present.
    ///
    /// # Examples
    ///
    /// ```
    /// use avl_ost::AvlTree;
    ///
    /// let mut tree = AvlTree::new();
    /// tree.insert(1, "a").unwrap();
    /// assert_eq!(tree.remove(1), Some("a"));
    /// assert_eq!(tree.remove(1), None);
    /// ```
    pub fn remove(&mut self, key: i64) -> Option<V> {
        self.raw.delete(key).ok().map(|(value, _)| value)
    }

    /// Returns the value stored under the smallest key, or `None` if the tree is empty.
    ///
    /// # Complexity
    ///
    /// O(1), read from the root's min cache.
    #[must_use]
    pub fn min(&self) -> Option<&V> {
        self.first_key_value().map(|(_, value)| value)
    }

    /// Returns the value stored under the largest key, or `None` if the tree is empty.
    ///
    /// # Complexity
    ///
    /// O(1), read from the root's max cache.
    #[must_use]
    pub fn max(&self) -> Option<&V> {
        self.last_key_value().map(|(_, value)| value)
    }

    /// Returns the smallest key and its value.
    #[must_use]
    pub fn first_key_value(&self) -> Option<(i64, &V)> {
        let node = self.raw.node(self.raw.first()?);
        Some((node.key(), node.value()))
    }

    /// Returns the largest key and its value.
    #[must_use]
    pub fn last_key_value(&self) -> Option<(i64, &V)> {
        let node = self.raw.node(self.raw.last()?);
        Some((node.key(), node.value()))
    }

    /// Returns all keys in ascending order.
    ///
    /// # Examples
    ///
    /// ```
    /// use avl_ost::AvlTree;
    ///
    /// let mut tree = AvlTree::new();
    /// for key in [3, 1, 2] {
    ///     tree.insert(key, ()).unwrap();
    /// }
    /// assert_eq!(tree.keys_in_order(), [1, 2, 3]);
    /// assert!(AvlTree::<()>::new().keys_in_order().is_empty());
    /// ```
    #[must_use]
    pub fn keys_in_order(&self) -> Vec<i64> {
        self.keys().collect()
    }

    /// Returns all values, ordered by their keys.
    #[must_use]
    pub fn values_in_order(&self) -> Vec<&V> {
        self.values().collect()
    }

    /// Gets an iterator over the entries of the tree, sorted by key.
    ///
    /// # Complexity
    ///
    /// O(log n) to create the iterator; amortized O(1) per step.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            inner: RawIter::new(&self.raw),
        }
    }

    /// Gets an iterator over the keys of the tree, in ascending order.
    pub fn keys(&self) -> Keys<'_, V> {
        Keys { inner: self.iter() }
    }

    /// Gets an iterator over the values of the tree, in key order.
    pub fn values(&self) -> Values<'_, V> {
        Values { inner: self.iter() }
    }

    /// Splits the tree around `key`.
    ///
    /// The first tree receives every key below `key`, the second every key above it. The
    /// entry for `key` itself is dropped. Both results are valid AVL trees.
    ///
    /// # Complexity
    ///
    /// O(log n): the joins performed while climbing from `key` to the root telescope.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not in the tree.
    ///
    /// # Examples
    ///
    /// ```
    /// use avl_ost::AvlTree;
    ///
    /// let mut tree = AvlTree::new();
    /// for key in 1..=7 {
    ///     tree.insert(key, ()).unwrap();
    /// }
    ///
    /// let (left, right) = tree.split(4);
    /// assert_eq!(left.keys_in_order(), [1, 2, 3]);
    /// assert_eq!(right.keys_in_order(), [5, 6, 7]);
    /// ```
    #[must_use]
    pub fn split(mut self, key: i64) -> (AvlTree<V>, AvlTree<V>) {
        let Some((left, right)) = self.raw.split(key) else {
            panic!("split key {key} is not in the AvlTree");
        };
        (AvlTree { raw: left }, AvlTree { raw: right })
    }

    /// Joins `other` and a new entry for `key` into this tree.
    ///
    /// `key` must separate the two trees: either every key of `self` is below it and every
    /// key of `other` above it, or the other way around. Either tree may be empty.
    ///
    /// Returns the cost of the join, `|self.height() - other.height()| + 1`, measured before
    /// merging.
    ///
    /// # Complexity
    ///
    /// `O(|self.height() - other.height()| + 1)`
    ///
    /// # Panics
    ///
    /// Panics if `key` does not separate the key ranges of the two trees.
    ///
    /// # Examples
    ///
    /// ```
    /// use avl_ost::AvlTree;
    ///
    /// let mut low = AvlTree::new();
    /// let mut high = AvlTree::new();
    /// for key in 1..=3 {
    ///     low.insert(key, "low").unwrap();
    ///     high.insert(key + 10, "high").unwrap();
    /// }
    ///
    /// assert_eq!(high.join(5, "pivot", low), 1);
    /// assert_eq!(high.keys_in_order(), [1, 2, 3, 5, 11, 12, 13]);
    /// assert_eq!(high.root().map(|root| root.key()), Some(5));
    /// ```
    pub fn join(&mut self, key: i64, value: V, other: AvlTree<V>) -> usize {
        let below = |tree: &AvlTree<V>| tree.last_key_value().is_none_or(|(last, _)| last < key);
        let above = |tree: &AvlTree<V>| tree.first_key_value().is_none_or(|(first, _)| first > key);
        assert!(
            (below(self) && above(&other)) || (above(self) && below(&other)),
            "join key {key} does not separate the AvlTrees"
        );

        self.raw.join(key, value, other.raw)
    }

    /// Returns the entry at position `rank` in key order.
    ///
    /// The rank is zero-based. Returns `None` if `rank` is out of bounds.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// use avl_ost::AvlTree;
    ///
    /// let mut tree = AvlTree::new();
    /// for key in [30, 10, 20] {
    ///     tree.insert(key, key / 10).unwrap();
    /// }
    ///
    /// assert_eq!(tree.get_by_rank(1), Some((20, &2)));
    /// assert!(tree.get_by_rank(3).is_none());
    /// ```
    #[must_use]
    pub fn get_by_rank(&self, rank: usize) -> Option<(i64, &V)> {
        let node = self.raw.node(self.raw.get_by_rank(rank)?);
        Some((node.key(), node.value()))
    }

    /// Returns the zero-based rank of `key` in key order, or `None` if the key is not present.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// use avl_ost::AvlTree;
    ///
    /// let mut tree = AvlTree::new();
    /// tree.insert(10, "a").unwrap();
    /// tree.insert(20, "b").unwrap();
    ///
    /// assert_eq!(tree.rank_of(20), Some(1));
    /// assert_eq!(tree.rank_of(15), None);
    /// ```
    #[must_use]
    pub fn rank_of(&self, key: i64) -> Option<usize> {
        self.raw.rank_of(key)
    }
}

impl<'a, V> NodeRef<'a, V> {
    fn wrap(&self, ptr: NodePtr<V>) -> NodeRef<'a, V> {
        NodeRef { tree: self.tree, ptr }
    }

    /// Returns the key held by this node.
    #[must_use]
    pub fn key(&self) -> i64 {
        self.tree.node(self.ptr).key()
    }

    /// Returns the value held by this node.
    #[must_use]
    pub fn value(&self) -> &'a V {
        self.tree.node(self.ptr).value()
    }

    /// Returns the height of the subtree rooted here; 0 for a leaf.
    #[must_use]
    pub fn height(&self) -> isize {
        self.tree.node(self.ptr).height()
    }

    /// Returns the number of nodes in the subtree rooted here.
    #[must_use]
    pub fn size(&self) -> usize {
        self.tree.node(self.ptr).size()
    }

    /// Returns the node with the smallest key in this subtree, possibly this node.
    #[must_use]
    pub fn min(&self) -> NodeRef<'a, V> {
        self.wrap(self.tree.node(self.ptr).min())
    }

    /// Returns the node with the largest key in this subtree, possibly this node.
    #[must_use]
    pub fn max(&self) -> NodeRef<'a, V> {
        self.wrap(self.tree.node(self.ptr).max())
    }

    /// Returns the left child of this node, if any.
    #[must_use]
    pub fn left(&self) -> Option<NodeRef<'a, V>> {
        self.tree.node(self.ptr).left().map(|ptr| self.wrap(ptr))
    }

    /// Returns the right child of this node, if any.
    #[must_use]
    pub fn right(&self) -> Option<NodeRef<'a, V>> {
        self.tree.node(self.ptr).right().map(|ptr| self.wrap(ptr))
    }

    /// Returns the parent of this node, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeRef<'a, V>> {
        self.tree.node(self.ptr).parent().map(|ptr| self.wrap(ptr))
    }

    /// Returns `true` if both views refer to the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &NodeRef<'_, V>) -> bool {
        self.ptr == other.ptr
    }
}

impl<V> Clone for NodeRef<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for NodeRef<'_, V> {}

impl<V> fmt::Debug for NodeRef<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("key", &self.key())
            .field("height", &self.height())
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

impl<V: Clone> Clone for AvlTree<V> {
    fn clone(&self) -> Self {
        AvlTree { raw: self.raw.clone() }
    }
}

impl<V: PartialEq> PartialEq for AvlTree<V> {
    fn eq(&self, other: &AvlTree<V>) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<V: Eq> Eq for AvlTree<V> {}

impl<V: fmt::Debug> fmt::Debug for AvlTree<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<V> Default for AvlTree<V> {
    fn default() -> Self {
        AvlTree::new()
    }
}

impl<'a, V> IntoIterator for &'a AvlTree<V> {
    type Item = (i64, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Iter<'a, V> {
        self.iter()
    }
}

/// Indexes into the tree by rank.
///
/// # Panics
///
/// Panics if `rank` is out of bounds.
///
/// # Examples
///
/// ```
/// use avl_ost::{AvlTree, Rank};
///
/// let mut tree = AvlTree::new();
/// tree.insert(5, "b").unwrap();
/// tree.insert(1, "a").unwrap();
///
/// assert_eq!(tree[Rank(1)], "b");
/// ```
impl<V> Index<Rank> for AvlTree<V> {
    type Output = V;

    fn index(&self, rank: Rank) -> &Self::Output {
        self.get_by_rank(rank.0).map(|(_, v)| v).expect("index out of bounds")
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (i64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|node| (node.key(), node.value()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> DoubleEndedIterator for Iter<'_, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|node| (node.key(), node.value()))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {
    fn len(&self) -> usize {
        self.inner.remaining()
    }
}

impl<V> FusedIterator for Iter<'_, V> {}

impl<V> Clone for Iter<'_, V> {
    fn clone(&self) -> Self {
        Iter {
            inner: self.inner.clone(),
        }
    }
}

impl<V> fmt::Debug for Iter<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("remaining", &self.inner.remaining()).finish()
    }
}

impl<V> Iterator for Keys<'_, V> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> DoubleEndedIterator for Keys<'_, V> {
    fn next_back(&mut self) -> Option<i64> {
        self.inner.next_back().map(|(k, _)| k)
    }
}

impl<V> ExactSizeIterator for Keys<'_, V> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<V> FusedIterator for Keys<'_, V> {}

impl<V> fmt::Debug for Keys<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.clone().map(|(k, _)| k)).finish()
    }
}

impl<'a, V> Iterator for Values<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, V> DoubleEndedIterator for Values<'a, V> {
    fn next_back(&mut self) -> Option<&'a V> {
        self.inner.next_back().map(|(_, v)| v)
    }
}

impl<V> ExactSizeIterator for Values<'_, V> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<V> FusedIterator for Values<'_, V> {}

impl<V: fmt::Debug> fmt::Debug for Values<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.clone().map(|(_, v)| v)).finish()
    }
}
