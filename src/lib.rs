//! Height-balanced order-statistic trees for Rust.
//!
//! This crate provides [`AvlTree`], an AVL tree over unique `i64` keys whose nodes cache the
//! size, minimum and maximum of their subtree. On top of the usual dictionary operations it
//! offers:
//!
//! - [`split`](AvlTree::split) - Partition a tree around a key in O(log n)
//! - [`join`](AvlTree::join) - Merge two key-disjoint trees around a pivot in O(log n)
//! - [`get_by_rank`](AvlTree::get_by_rank) - Get the element at a given sorted position
//! - [`rank_of`](AvlTree::rank_of) - Get the sorted position of a key
//!
//! Mutating operations report how many rebalancing steps (height changes and rotations) they
//! performed, which makes the amortized behavior of the tree observable.
//!
//! # Example
//!
//! ```
//! use avl_ost::{AvlTree, Rank};
//!
//! let mut tree = AvlTree::new();
//! for key in 1..=7 {
//!     tree.insert(key, key * 10).unwrap();
//! }
//!
//! assert_eq!(tree.search(3), Some(&30));
//! assert_eq!(tree.len(), 7);
//! assert_eq!(tree[Rank(0)], 10);
//!
//! let (left, right) = tree.split(4);
//! assert_eq!(left.keys_in_order(), [1, 2, 3]);
//! assert_eq!(right.keys_in_order(), [5, 6, 7]);
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`, no standard library dependency
//! - **`tracing`** - Emit rotation, split and join events through the `tracing` crate
//!
//! # Implementation
//!
//! Nodes are individually heap allocated and linked by raw pointers, with a non-owning parent
//! link. Absent children are represented by `None`, which plays the role of a shared sentinel
//! with height -1 and size 0. Split and join relink whole subtrees, so neither ever copies a
//! node.

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
// NOTE: Parent back-links and subtree relinking between trees require raw pointers.
// #![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

mod error;
mod order_statistic;
mod raw;
mod tracing_helpers;

pub mod avl_tree;

pub use avl_tree::AvlTree;
pub use error::AvlError;
pub use order_statistic::Rank;
