use alloc::boxed::Box;
use core::ptr::NonNull;

/// A pointer to a node owned by some tree.
pub(crate) type NodePtr<V> = NonNull<Node<V>>;

/// A child, parent or root link. `None` is the absent node: height -1, size 0.
pub(crate) type Link<V> = Option<NodePtr<V>>;

/// A single AVL node together with the aggregates of the subtree rooted at it.
pub(crate) struct Node<V> {
    pub(super) key: i64,
    pub(super) value: V,
    // -1 is reserved for the absent node, so a real node is always >= 0.
    pub(super) height: isize,
    // Number of real nodes in this subtree, including this one.
    pub(super) size: usize,
    // Smallest and largest nodes of this subtree. They point back at the node itself when
    // the corresponding child is absent.
    pub(super) min: NodePtr<V>,
    pub(super) max: NodePtr<V>,
    pub(super) left: Link<V>,
    pub(super) right: Link<V>,
    // Non-owning. Only the root of a tree (or a detached subtree) has none.
    pub(super) parent: Link<V>,
}

impl<V> Node<V> {
    /// Allocates a fresh leaf and hands ownership to the caller as a raw pointer.
    pub(crate) fn leak(key: i64, value: V) -> NodePtr<V> {
        let node = Box::new(Node {
            key,
            value,
            height: 0,
            size: 1,
            min: NonNull::dangling(),
            max: NonNull::dangling(),
            left: None,
            right: None,
            parent: None,
        });
        let mut ptr = NonNull::from(Box::leak(node));
        // SAFETY: `ptr` was just produced by `Box::leak` and nothing else refers to it yet.
        let node = unsafe { ptr.as_mut() };
        node.min = ptr;
        node.max = ptr;
        ptr
    }

    /// Reclaims a node allocated by [`Node::leak`].
    ///
    /// # Safety
    /// - `ptr` must have been returned by [`Node::leak`] and not reclaimed since.
    /// - No tree may still reach `ptr` through a link that will be dereferenced later.
    pub(crate) unsafe fn unleak(ptr: NodePtr<V>) -> Self {
        // SAFETY: Guaranteed by the caller.
        unsafe { *Box::from_raw(ptr.as_ptr()) }
    }

    #[inline]
    pub(crate) fn key(&self) -> i64 {
        self.key
    }

    #[inline]
    pub(crate) fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub(crate) fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    #[inline]
    pub(crate) fn height(&self) -> isize {
        self.height
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub(crate) fn min(&self) -> NodePtr<V> {
        self.min
    }

    #[inline]
    pub(crate) fn max(&self) -> NodePtr<V> {
        self.max
    }

    #[inline]
    pub(crate) fn left(&self) -> Link<V> {
        self.left
    }

    #[inline]
    pub(crate) fn right(&self) -> Link<V> {
        self.right
    }

    #[inline]
    pub(crate) fn parent(&self) -> Link<V> {
        self.parent
    }
}
