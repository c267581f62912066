use super::node::{Link, Node, NodePtr};
use super::raw_avl_tree::{RawAvlTree, Stack};

/// In-order walk over a tree, from both ends, without recursion.
///
/// Each end keeps the path of nodes whose left (front) or right (back) subtree has been
/// visited but which have not been yielded yet.
pub(crate) struct RawIter<'a, V> {
    tree: &'a RawAvlTree<V>,
    front: Stack<NodePtr<V>>,
    back: Stack<NodePtr<V>>,
    remaining: usize,
}

// SAFETY: RawIter behaves as &RawAvlTree<V>.
unsafe impl<V: Sync> Send for RawIter<'_, V> {}
unsafe impl<V: Sync> Sync for RawIter<'_, V> {}

impl<'a, V> RawIter<'a, V> {
    pub(crate) fn new(tree: &'a RawAvlTree<V>) -> Self {
        let mut iter = Self {
            tree,
            front: Stack::new(),
            back: Stack::new(),
            remaining: tree.len(),
        };
        iter.descend_front(tree.root());
        iter.descend_back(tree.root());
        iter
    }

    fn descend_front(&mut self, mut link: Link<V>) {
        while let Some(ptr) = link {
            self.front.push(ptr);
            link = self.tree.node(ptr).left();
        }
    }

    fn descend_back(&mut self, mut link: Link<V>) {
        while let Some(ptr) = link {
            self.back.push(ptr);
            link = self.tree.node(ptr).right();
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.remaining
    }
}

impl<'a, V> Iterator for RawIter<'a, V> {
    type Item = &'a Node<V>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let ptr = self.front.pop()?;
        let node = self.tree.node(ptr);
        self.descend_front(node.right());
        self.remaining -= 1;
        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> DoubleEndedIterator for RawIter<'_, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let ptr = self.back.pop()?;
        let node = self.tree.node(ptr);
        self.descend_back(node.left());
        self.remaining -= 1;
        Some(node)
    }
}

impl<V> Clone for RawIter<'_, V> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree,
            front: self.front.clone(),
            back: self.back.clone(),
            remaining: self.remaining,
        }
    }
}
