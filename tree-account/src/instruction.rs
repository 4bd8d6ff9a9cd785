//! Operations accepted by a tree account

use {
    borsh::{BorshDeserialize, BorshSerialize},
    concurrent_merkle_tree::node::Node,
};

/// Every operation a tree account can process.
///
/// Proofs may be truncated to `max_depth - canopy_depth` nodes, the remaining
/// upper nodes are read from the canopy.
#[derive(BorshDeserialize, BorshSerialize, Clone, Debug, PartialEq, Eq)]
pub enum TreeOperation {
    /// Writes the header and initializes an empty tree.
    /// The account must be zeroed and sized by
    /// [account_size](crate::processor::account_size).
    InitEmptyMerkleTree {
        max_depth: u32,
        max_buffer_size: u32,
        creation_slot: u64,
    },

    /// Writes the header for a tree that will be filled off-line, leaving the
    /// tree bytes zeroed. Canopy nodes may then be uploaded with
    /// `AppendCanopyNodes` before `InitPreparedTreeWithRoot` finalizes the tree.
    PrepareBatchMerkleTree {
        max_depth: u32,
        max_buffer_size: u32,
        creation_slot: u64,
    },

    /// Sets consecutive canopy leaf nodes, starting at `start_index`, of a
    /// prepared batch tree
    AppendCanopyNodes {
        start_index: u32,
        canopy_nodes: Vec<Node>,
    },

    /// Finalizes a prepared batch tree from its root and its rightmost leaf
    InitPreparedTreeWithRoot {
        root: Node,
        rightmost_leaf: Node,
        rightmost_index: u32,
        proof: Vec<Node>,
    },

    Append {
        leaf: Node,
    },

    /// Replaces `previous_leaf` at `index` with `new_leaf`, proven against a
    /// root that is still in the change log buffer
    ReplaceLeaf {
        root: Node,
        previous_leaf: Node,
        new_leaf: Node,
        index: u32,
        proof: Vec<Node>,
    },

    /// Inserts `leaf` at `index` if it is empty, otherwise appends it
    InsertOrAppend {
        root: Node,
        leaf: Node,
        index: u32,
        proof: Vec<Node>,
    },

    /// Verifies that `leaf` is at `index`. Never modifies the account.
    VerifyLeaf {
        root: Node,
        leaf: Node,
        index: u32,
        proof: Vec<Node>,
    },

    /// Zeroes the whole account once the tree is proven to hold no leaves
    CloseEmptyTree,
}
