//! A tree account persists a concurrent merkle tree in a single byte buffer:
//! a versioned header describing the tree's shape, the zero-copy tree itself
//! and an optional canopy caching the upper levels of the tree.
//!
//! A buffer of proof-like change logs stored in the tree allows multiple
//! proof-based writes against the same root to succeed: out-of-date proofs
//! are fast-forwarded with the information held in the change logs.
//!
//! Accounts **must** be supplemented by off-line indexers that cache leaves
//! and serve up-to-date proofs. Every successful operation returns a
//! [ChangeLogEvent](events::ChangeLogEvent) carrying everything an indexer
//! needs to replay it.

#[macro_use]
mod macros;

pub mod canopy;
pub mod concurrent_tree_wrapper;
pub mod error;
pub mod events;
pub mod instruction;
pub mod processor;
pub mod state;

pub use {
    concurrent_merkle_tree::{
        concurrent_merkle_tree::ConcurrentMerkleTree, error::ConcurrentMerkleTreeError,
        node::Node,
    },
    error::TreeAccountError,
    events::ChangeLogEvent,
    instruction::TreeOperation,
    processor::{account_size, process_operation},
};
