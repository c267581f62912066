/// A zero-based position in the ascending key order of an [`AvlTree`](crate::AvlTree).
///
/// Indexing a tree with a `Rank` descends by subtree sizes, so it costs O(log n) and panics
/// when the rank is not below [`len`](crate::AvlTree::len). Use
/// [`get_by_rank`](crate::AvlTree::get_by_rank) for a fallible lookup and
/// [`rank_of`](crate::AvlTree::rank_of) for the inverse.
///
/// # Examples
///
/// ```
/// use avl_ost::{AvlTree, Rank};
///
/// let mut tree = AvlTree::new();
/// tree.insert(20, "b").unwrap();
/// tree.insert(10, "a").unwrap();
///
/// assert_eq!(tree[Rank(0)], "a");
/// assert_eq!(tree.rank_of(20).map(Rank), Some(Rank(1)));
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Rank(pub usize);

impl From<usize> for Rank {
    fn from(rank: usize) -> Self {
        Rank(rank)
    }
}

impl From<Rank> for usize {
    fn from(rank: Rank) -> Self {
        rank.0
    }
}
