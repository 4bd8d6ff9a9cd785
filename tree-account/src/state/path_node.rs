use {
    borsh::{BorshDeserialize, BorshSerialize},
    concurrent_merkle_tree::node::Node,
};

/// A node on a change log path, addressed by its heap index in the full tree
/// (root = 1, children of `i` are `2i` and `2i + 1`)
#[derive(BorshDeserialize, BorshSerialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathNode {
    pub node: [u8; 32],
    pub index: u32,
}

impl PathNode {
    pub fn new(tree_node: Node, index: u32) -> Self {
        Self {
            node: tree_node,
            index,
        }
    }
}
