//! Off-chain implementation to keep track of nodes
//!
//! Every node of a complete binary tree is stored, so proofs and roots are
//! read directly instead of being derived from a change log. Used as the
//! oracle for concurrent merkle tree tests.

use solana_program::keccak::hashv;

pub type Node = [u8; 32];
pub const EMPTY: Node = [0; 32];

/// Calculates the hash of empty nodes up to level i
pub fn empty_node(level: u32) -> Node {
    let mut data = EMPTY;
    if level != 0 {
        let lower_empty = empty_node(level - 1);
        data = hashv(&[&lower_empty, &lower_empty]).to_bytes();
    }
    data
}

#[derive(Clone, Debug)]
pub struct MerkleTree {
    pub leaf_nodes: Vec<Node>,
    /// `levels[0]` mirrors `leaf_nodes`, `levels[depth]` holds only the root
    levels: Vec<Vec<Node>>,
}

impl MerkleTree {
    /// Builds a tree over `leaves`, whose length must be a power of two
    pub fn new(leaves: &[Node]) -> Self {
        assert!(
            leaves.len().is_power_of_two(),
            "leaf count must be a power of two"
        );
        let mut levels = vec![leaves.to_vec()];
        while levels[levels.len() - 1].len() > 1 {
            let parents = levels[levels.len() - 1]
                .chunks(2)
                .map(|pair| hashv(&[&pair[0], &pair[1]]).to_bytes())
                .collect();
            levels.push(parents);
        }
        Self {
            leaf_nodes: leaves.to_vec(),
            levels,
        }
    }

    /// Builds a tree of `1 << depth` empty leaves
    pub fn new_empty(depth: usize) -> Self {
        Self::new(&vec![EMPTY; 1 << depth])
    }

    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn get_root(&self) -> Node {
        self.levels[self.depth()][0]
    }

    pub fn get_leaf(&self, leaf_index: usize) -> Node {
        self.leaf_nodes[leaf_index]
    }

    /// Node at `level` (0 is the leaf level), `position` counted from the left
    pub fn get_node(&self, level: usize, position: usize) -> Node {
        self.levels[level][position]
    }

    /// Sibling nodes from the leaf level upwards
    pub fn get_proof_of_leaf(&self, leaf_index: usize) -> Vec<Node> {
        let mut proof = Vec::with_capacity(self.depth());
        let mut position = leaf_index;
        for level in &self.levels[..self.depth()] {
            proof.push(level[position ^ 1]);
            position >>= 1;
        }
        proof
    }

    /// Overwrites the leaf at `leaf_index` and rehashes its path
    pub fn add_leaf(&mut self, leaf: Node, leaf_index: usize) {
        self.leaf_nodes[leaf_index] = leaf;
        self.levels[0][leaf_index] = leaf;
        let mut position = leaf_index;
        for level in 0..self.depth() {
            let left = self.levels[level][position & !1];
            let right = self.levels[level][position | 1];
            position >>= 1;
            self.levels[level + 1][position] = hashv(&[&left, &right]).to_bytes();
        }
    }

    pub fn remove_leaf(&mut self, leaf_index: usize) {
        self.add_leaf(EMPTY, leaf_index);
    }
}
