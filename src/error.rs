use thiserror::Error;

/// The ways a keyed operation on an [`AvlTree`](crate::AvlTree) can be refused.
///
/// Both variants are expected outcomes rather than faults: the tree is left exactly as it was.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Error)]
pub enum AvlError {
    /// An insertion named a key that the tree already holds.
    #[error("key {0} is already present in the tree")]
    DuplicateKey(i64),
    /// A deletion named a key that the tree does not hold.
    #[error("key {0} is not present in the tree")]
    KeyNotFound(i64),
}

impl AvlError {
    /// Returns the key the refused operation was called with.
    #[must_use]
    pub const fn key(&self) -> i64 {
        match *self {
            AvlError::DuplicateKey(key) | AvlError::KeyNotFound(key) => key,
        }
    }
}
