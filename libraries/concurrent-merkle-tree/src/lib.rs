#![allow(clippy::arithmetic_side_effects)]
//! # Concurrent Merkle Tree
//!
//! A fixed-depth binary merkle tree that accepts writes whose proofs were
//! generated against an older root. Every successful write records a
//! [`ChangeLog`](changelog::ChangeLog) in a fixed-size ring buffer, and proofs
//! for roots still resident in that buffer are fast-forwarded through the
//! newer change logs before being applied.
//!
//! The core implementation lives in [concurrent_merkle_tree]. The persisted
//! representation of a tree is its `#[repr(C)]` memory layout; see
//! [`ConcurrentMerkleTree::encode`](concurrent_merkle_tree::ConcurrentMerkleTree::encode).

/// Private macros to enable logging behind the `log` feature
#[macro_use]
mod log;
/// Changelog implementation to keep track of information necessary to fast
/// forward proofs
pub mod changelog;
/// Core implementation of the concurrent merkle tree structure
pub mod concurrent_merkle_tree;
/// Descriptive errors
pub mod error;
/// Hashing utils to support merkle tree operations
pub mod hash;
/// Node implementation and utils
pub mod node;
/// Path implementation
pub mod path;
