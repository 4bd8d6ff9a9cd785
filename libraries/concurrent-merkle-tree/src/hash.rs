use {
    crate::node::{empty_node_cached_mut, Node},
    solana_program::keccak::hashv,
};

/// Hashes the concatenation of two children into their parent
///
/// This is the only place the tree touches its hash primitive (Keccak-256).
#[inline(always)]
pub fn hashv_node(left: &Node, right: &Node) -> Node {
    hashv(&[left.as_ref(), right.as_ref()]).to_bytes()
}

/// Recomputes root of the Merkle tree from Node & proof
pub fn recompute(leaf: Node, proof: &[Node], index: u32) -> Node {
    let mut current_node = leaf;
    for (depth, sibling) in proof.iter().enumerate() {
        hash_to_parent(&mut current_node, sibling, index >> depth & 1 == 0);
    }
    current_node
}

/// Computes the parent node of `node` and `sibling` and copies the result into
/// `node`
#[inline(always)]
pub fn hash_to_parent(node: &mut Node, sibling: &Node, is_left: bool) {
    *node = if is_left {
        hashv_node(node, sibling)
    } else {
        hashv_node(sibling, node)
    };
}

/// Fills in proof to the height of the concurrent merkle tree.
/// Missing nodes are inferred as empty node hashes.
///
/// Nodes beyond `MAX_DEPTH` in `proof_vec` are ignored.
pub fn fill_in_proof<const MAX_DEPTH: usize>(
    proof_vec: &[Node],
    full_proof: &mut [Node; MAX_DEPTH],
) {
    cmt_logging!("Attempting to fill in proof");
    let supplied = proof_vec.len().min(MAX_DEPTH);
    full_proof[..supplied].copy_from_slice(&proof_vec[..supplied]);

    let mut empty_node_cache = [Node::default(); MAX_DEPTH];
    for (i, item) in full_proof.iter_mut().enumerate().skip(supplied) {
        *item = empty_node_cached_mut::<MAX_DEPTH>(i as u32, &mut empty_node_cache);
    }
}
