use crate::{
    hash::recompute,
    node::{Node, EMPTY},
};

/// Represents a proof to perform a Merkle tree operation on the leaf at `index`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Path<const MAX_DEPTH: usize> {
    /// Sibling nodes ordered from the leaf level upwards
    pub proof: [Node; MAX_DEPTH],
    pub leaf: Node,
    pub index: u32,
    pub _padding: u32,
}

impl<const MAX_DEPTH: usize> Default for Path<MAX_DEPTH> {
    fn default() -> Self {
        Self {
            proof: [EMPTY; MAX_DEPTH],
            leaf: EMPTY,
            index: 0,
            _padding: 0,
        }
    }
}

impl<const MAX_DEPTH: usize> Path<MAX_DEPTH> {
    pub fn new(proof: [Node; MAX_DEPTH], leaf: Node, index: u32) -> Self {
        Self {
            proof,
            leaf,
            index,
            _padding: 0,
        }
    }

    /// Number of sibling nodes in the proof
    pub fn depth(&self) -> usize {
        MAX_DEPTH
    }

    /// Root obtained by folding `leaf` up through `proof`
    pub fn root(&self) -> Node {
        recompute(self.leaf, &self.proof, self.index)
    }
}
