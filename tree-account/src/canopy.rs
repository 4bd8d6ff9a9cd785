//! Canopy is way to cache the upper `N` levels of a concurrent merkle tree.
//!
//! By caching the upper `N` levels of a depth `D` tree, proofs can be
//! truncated to the first `D - N` nodes. The canopy is stored right after the
//! tree bytes as a flat array of `2^(N+1) - 2` nodes: every node of the top `N`
//! levels except the root, which the newest change log already holds.
//!
//! Nodes are addressed by heap index (root = 1, children of `i` are `2i` and
//! `2i + 1`), and node `i` lives at `canopy[i - 2]`. An `EMPTY` entry stands
//! for an empty subtree, so a freshly zeroed canopy is valid for an empty tree.
//!
//! The canopy is updated every time the tree is modified through
//! [process_operation](crate::processor::process_operation).

use {
    crate::{error::TreeAccountError, events::ChangeLogEvent},
    bytemuck::{cast_slice, cast_slice_mut},
    concurrent_merkle_tree::{
        hash::hashv_node,
        node::{empty_node_cached_mut, Node, EMPTY},
    },
    std::mem::size_of,
};

// 30 is hard coded as it is the max depth the tree supports
const MAX_SUPPORTED_DEPTH: usize = 30;

#[inline(always)]
pub fn check_canopy_bytes(canopy_bytes: &[u8]) -> Result<(), TreeAccountError> {
    if canopy_bytes.len() % size_of::<Node>() != 0 {
        log::warn!(
            "Canopy byte length {} is not a multiple of {}",
            canopy_bytes.len(),
            size_of::<Node>()
        );
        Err(TreeAccountError::CanopyLengthMismatch)
    } else {
        Ok(())
    }
}

/// Number of tree levels cached by a canopy of `canopy.len()` nodes
#[inline(always)]
pub fn get_cached_path_length(canopy: &[Node], max_depth: u32) -> Result<u32, TreeAccountError> {
    // The canopy is a full binary tree without the root node
    // Size: (2^n - 2) -> Size + 2 must be a power of 2
    let closest_power_of_2 = (canopy.len() + 2) as u32;
    if !closest_power_of_2.is_power_of_two() {
        log::warn!(
            "Canopy length {} is not 2 less than a power of 2",
            canopy.len()
        );
        return Err(TreeAccountError::CanopyLengthMismatch);
    }
    // The canopy size cannot exceed the size of the tree
    if closest_power_of_2 > (1 << (max_depth + 1)) {
        log::warn!(
            "Canopy size is too large. Size: {}. Max size: {}",
            closest_power_of_2 - 2,
            (1_u32 << (max_depth + 1)) - 2
        );
        return Err(TreeAccountError::CanopyLengthMismatch);
    }
    // 1 is subtracted from the trailing zeros because the root is not stored in the canopy
    Ok(closest_power_of_2.trailing_zeros() - 1)
}

/// Heap index of the node at `level` below the root (1 is the root's children)
/// and `position` counted from the left
#[inline(always)]
fn heap_index(level: u32, position: u32) -> usize {
    (1_usize << level) + position as usize
}

fn check_cached_position(level: u32, position: u32, path_len: u32) -> Result<(), TreeAccountError> {
    if level == 0 || level > path_len || position as usize >= 1 << level {
        log::warn!(
            "Node ({}, {}) is outside of a canopy caching {} levels",
            level,
            position,
            path_len
        );
        return Err(TreeAccountError::CanopyLengthMismatch);
    }
    Ok(())
}

/// Reads the node cached at `level` below the root and `position` from the left
pub fn get_cached_node(
    canopy_bytes: &[u8],
    max_depth: u32,
    level: u32,
    position: u32,
) -> Result<Node, TreeAccountError> {
    check_canopy_bytes(canopy_bytes)?;
    let canopy = cast_slice::<u8, Node>(canopy_bytes);
    let path_len = get_cached_path_length(canopy, max_depth)?;
    check_cached_position(level, position, path_len)?;
    Ok(canopy[heap_index(level, position) - 2])
}

/// Overwrites a single cached node; parents are left untouched
pub fn set_cached_node(
    canopy_bytes: &mut [u8],
    max_depth: u32,
    level: u32,
    position: u32,
    node: Node,
) -> Result<(), TreeAccountError> {
    check_canopy_bytes(canopy_bytes)?;
    let canopy = cast_slice_mut::<u8, Node>(canopy_bytes);
    let path_len = get_cached_path_length(canopy, max_depth)?;
    check_cached_position(level, position, path_len)?;
    canopy[heap_index(level, position) - 2] = node;
    Ok(())
}

pub fn update_canopy(
    canopy_bytes: &mut [u8],
    max_depth: u32,
    change_log: Option<&ChangeLogEvent>,
) -> Result<(), TreeAccountError> {
    check_canopy_bytes(canopy_bytes)?;
    let canopy = cast_slice_mut::<u8, Node>(canopy_bytes);
    let path_len = get_cached_path_length(canopy, max_depth)?;
    if let Some(cl_event) = change_log {
        match cl_event {
            ChangeLogEvent::V1(cl) => {
                // Update the canopy from the newest change log
                for path_node in cl.path.iter().rev().skip(1).take(path_len as usize) {
                    canopy[(path_node.index - 2) as usize] = path_node.node;
                }
            }
        }
    }
    Ok(())
}

/// Completes a truncated `proof` for the leaf at `index` with sibling nodes
/// read from the canopy
pub fn fill_in_proof_from_canopy(
    canopy_bytes: &[u8],
    max_depth: u32,
    index: u32,
    proof: &mut Vec<Node>,
) -> Result<(), TreeAccountError> {
    let mut empty_node_cache = Box::new([EMPTY; MAX_SUPPORTED_DEPTH]);
    check_canopy_bytes(canopy_bytes)?;
    let canopy = cast_slice::<u8, Node>(canopy_bytes);
    let path_len = get_cached_path_length(canopy, max_depth)?;

    // Node index (w.r.t. the canopy) where the current path intersects the
    // leaves of the canopy
    let mut node_idx = ((1_u64 << max_depth) + index as u64) >> (max_depth - path_len);
    let mut inferred_nodes = vec![];
    while node_idx > 1 {
        let shifted_index = node_idx as usize - 2;
        let cached_idx = if shifted_index % 2 == 0 {
            shifted_index + 1
        } else {
            shifted_index - 1
        };
        if canopy[cached_idx] == EMPTY {
            let level = max_depth - (63 - node_idx.leading_zeros());
            inferred_nodes.push(empty_node_cached_mut::<MAX_SUPPORTED_DEPTH>(
                level,
                &mut empty_node_cache,
            ));
        } else {
            inferred_nodes.push(canopy[cached_idx]);
        }
        node_idx >>= 1;
    }
    // Only add inferred canopy nodes such that the proof length is equal to
    // the tree depth. Shorter proofs fail verification in the tree.
    let overlap = (proof.len() + inferred_nodes.len()).saturating_sub(max_depth as usize);
    proof.extend(inferred_nodes.iter().skip(overlap));
    Ok(())
}

/// Sets the leaf nodes of the canopy, its lowest level, starting at the
/// 0-based `start_index`, and recomputes the parents of every modified subtree
/// up to the uppermost level of the canopy.
pub fn set_canopy_leaf_nodes(
    canopy_bytes: &mut [u8],
    max_depth: u32,
    start_index: u32,
    nodes: &[Node],
) -> Result<(), TreeAccountError> {
    check_canopy_bytes(canopy_bytes)?;
    let canopy = cast_slice_mut::<u8, Node>(canopy_bytes);
    let path_len = get_cached_path_length(canopy, max_depth)?;
    if nodes.is_empty() {
        return Ok(());
    }
    if path_len == 0 || start_index as usize + nodes.len() > 1 << path_len {
        log::warn!(
            "Cannot set {} canopy leaf nodes from index {} in a canopy caching {} levels",
            nodes.len(),
            start_index,
            path_len
        );
        return Err(TreeAccountError::CanopyLengthMismatch);
    }

    let start_canopy_node = heap_index(path_len, start_index);
    canopy[start_canopy_node - 2..start_canopy_node - 2 + nodes.len()].copy_from_slice(nodes);

    let mut start_canopy_node = start_canopy_node;
    let mut end_canopy_node = start_canopy_node + nodes.len() - 1;
    let mut empty_node_cache = Box::new([EMPTY; MAX_SUPPORTED_DEPTH]);
    let leaf_node_level = max_depth - path_len;
    // Traverse up the tree and update the parent nodes in the modified subtree
    for level in leaf_node_level + 1..max_depth {
        start_canopy_node >>= 1;
        end_canopy_node >>= 1;
        for node in start_canopy_node..=end_canopy_node {
            let left_child =
                get_value_for_node(node << 1, level - 1, canopy, &mut empty_node_cache);
            let right_child =
                get_value_for_node((node << 1) + 1, level - 1, canopy, &mut empty_node_cache);
            canopy[node - 2] = hashv_node(&left_child, &right_child);
        }
    }
    Ok(())
}

/// Checks that the two top canopy nodes hash to `expected_root`
pub fn check_canopy_root(
    canopy_bytes: &[u8],
    expected_root: &Node,
    max_depth: u32,
) -> Result<(), TreeAccountError> {
    check_canopy_bytes(canopy_bytes)?;
    let canopy = cast_slice::<u8, Node>(canopy_bytes);
    if canopy.is_empty() {
        return Ok(());
    }
    get_cached_path_length(canopy, max_depth)?;
    let mut empty_node_cache = Box::new([EMPTY; MAX_SUPPORTED_DEPTH]);
    let left_root = get_value_for_node(2, max_depth - 1, canopy, &mut empty_node_cache);
    let right_root = get_value_for_node(3, max_depth - 1, canopy, &mut empty_node_cache);
    if hashv_node(&left_root, &right_root) != *expected_root {
        log::warn!("Canopy root does not match the expected root");
        return Err(TreeAccountError::CanopyRootMismatch);
    }
    Ok(())
}

/// Checks that every cached node lying entirely to the right of the leaf at
/// `index` is `EMPTY`
pub fn check_canopy_no_nodes_to_right_of_index(
    canopy_bytes: &[u8],
    max_depth: u32,
    index: u32,
) -> Result<(), TreeAccountError> {
    check_canopy_bytes(canopy_bytes)?;
    let canopy = cast_slice::<u8, Node>(canopy_bytes);
    let path_len = get_cached_path_length(canopy, max_depth)?;

    for level in 1..=path_len {
        let position = (index >> (max_depth - level)) as usize;
        let level_end = 1_usize << level;
        let first_to_the_right = heap_index(level, 0) + position + 1;
        let last = heap_index(level, 0) + level_end;
        if canopy[first_to_the_right - 2..last - 2]
            .iter()
            .any(|node| *node != EMPTY)
        {
            log::warn!(
                "Canopy level {} holds nodes to the right of leaf {}",
                level,
                index
            );
            return Err(TreeAccountError::CanopyRightmostLeafMismatch);
        }
    }
    Ok(())
}

#[inline(always)]
fn get_value_for_node<const N: usize>(
    node_idx: usize,
    level: u32,
    canopy: &[Node],
    empty_node_cache: &mut [Node; N],
) -> Node {
    if canopy[node_idx - 2] != EMPTY {
        return canopy[node_idx - 2];
    }
    empty_node_cached_mut::<N>(level, empty_node_cache)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        concurrent_merkle_tree::node::empty_node,
        merkle_tree_reference::MerkleTree,
    };

    fn canopy_of(nodes: usize) -> Vec<u8> {
        vec![0_u8; nodes * size_of::<Node>()]
    }

    #[test]
    fn test_cached_path_length() {
        assert_eq!(get_cached_path_length(&[], 5).unwrap(), 0);
        assert_eq!(get_cached_path_length(&[EMPTY; 2], 5).unwrap(), 1);
        assert_eq!(get_cached_path_length(&[EMPTY; 14], 5).unwrap(), 3);
        assert_eq!(get_cached_path_length(&[EMPTY; 62], 5).unwrap(), 5);
        assert_eq!(
            get_cached_path_length(&[EMPTY; 126], 5).unwrap_err(),
            TreeAccountError::CanopyLengthMismatch
        );
        assert_eq!(
            get_cached_path_length(&[EMPTY; 3], 5).unwrap_err(),
            TreeAccountError::CanopyLengthMismatch
        );
        assert_eq!(
            check_canopy_bytes(&[0; 33]).unwrap_err(),
            TreeAccountError::CanopyLengthMismatch
        );
    }

    #[test]
    fn test_set_leaf_nodes_single_level() {
        let mut canopy_bytes = canopy_of(2);
        set_canopy_leaf_nodes(&mut canopy_bytes, 1, 0, &[[1_u8; 32], [2_u8; 32]]).unwrap();
        let canopy = cast_slice::<u8, Node>(&canopy_bytes);
        assert_eq!(canopy[0], [1_u8; 32]);
        assert_eq!(canopy[1], [2_u8; 32]);
    }

    #[test]
    fn test_set_leaf_nodes_two_levels() {
        let mut canopy_bytes = canopy_of(6);
        set_canopy_leaf_nodes(&mut canopy_bytes, 2, 1, &[[1_u8; 32], [2_u8; 32]]).unwrap();
        let canopy = cast_slice::<u8, Node>(&canopy_bytes);

        assert_eq!(canopy[2], EMPTY);
        assert_eq!(canopy[3], [1_u8; 32]);
        assert_eq!(canopy[4], [2_u8; 32]);
        assert_eq!(canopy[5], EMPTY);
        assert_eq!(canopy[0], hashv_node(&EMPTY, &[1_u8; 32]));
        assert_eq!(canopy[1], hashv_node(&[2_u8; 32], &EMPTY));
    }

    #[test]
    fn test_set_leaf_nodes_in_deep_tree_uses_empty_subtrees() {
        let mut canopy_bytes = canopy_of(14);
        set_canopy_leaf_nodes(&mut canopy_bytes, 10, 3, &[[1_u8; 32], [2_u8; 32]]).unwrap();
        let canopy = cast_slice::<u8, Node>(&canopy_bytes);

        let empty_then_1 = hashv_node(&empty_node(7), &[1_u8; 32]);
        let two_then_empty = hashv_node(&[2_u8; 32], &empty_node(7));
        assert_eq!(canopy[0], hashv_node(&empty_node(8), &empty_then_1));
        assert_eq!(canopy[1], hashv_node(&two_then_empty, &empty_node(8)));
        assert_eq!(canopy[2], EMPTY);
        assert_eq!(canopy[3], empty_then_1);
        assert_eq!(canopy[4], two_then_empty);
        assert_eq!(canopy[5], EMPTY);
        assert_eq!(canopy[9], [1_u8; 32]);
        assert_eq!(canopy[10], [2_u8; 32]);
    }

    #[test]
    fn test_set_leaf_nodes_bounds() {
        let mut canopy_bytes = canopy_of(14);
        set_canopy_leaf_nodes(&mut canopy_bytes, 10, 0, &[]).unwrap();
        assert_eq!(canopy_bytes, canopy_of(14));
        assert_eq!(
            set_canopy_leaf_nodes(&mut canopy_bytes, 10, 7, &[[1; 32], [2; 32]]).unwrap_err(),
            TreeAccountError::CanopyLengthMismatch
        );
        assert_eq!(
            set_canopy_leaf_nodes(&mut [], 10, 0, &[[1; 32]]).unwrap_err(),
            TreeAccountError::CanopyLengthMismatch
        );
    }

    #[test]
    fn test_cached_node_accessors() {
        let mut canopy_bytes = canopy_of(6);
        set_cached_node(&mut canopy_bytes, 4, 2, 3, [7; 32]).unwrap();
        assert_eq!(get_cached_node(&canopy_bytes, 4, 2, 3).unwrap(), [7; 32]);
        assert_eq!(cast_slice::<u8, Node>(&canopy_bytes)[5], [7; 32]);
        assert_eq!(
            get_cached_node(&canopy_bytes, 4, 3, 0).unwrap_err(),
            TreeAccountError::CanopyLengthMismatch
        );
        assert_eq!(
            get_cached_node(&canopy_bytes, 4, 1, 2).unwrap_err(),
            TreeAccountError::CanopyLengthMismatch
        );
    }

    #[test]
    fn test_fill_in_proof_matches_reference() {
        let depth = 6_u32;
        let mut reference_tree = MerkleTree::new_empty(depth as usize);
        for i in 0..40 {
            reference_tree.add_leaf([i as u8 + 1; 32], i);
        }
        // Cache the top 3 levels
        let mut canopy_bytes = canopy_of(14);
        let canopy_leaves: Vec<Node> = (0..8)
            .map(|position| reference_tree.get_node(depth as usize - 3, position))
            .collect();
        set_canopy_leaf_nodes(&mut canopy_bytes, depth, 0, &canopy_leaves).unwrap();
        check_canopy_root(&canopy_bytes, &reference_tree.get_root(), depth).unwrap();

        for index in [0_usize, 17, 39, 63] {
            let full = reference_tree.get_proof_of_leaf(index);
            let mut proof = full[..3].to_vec();
            fill_in_proof_from_canopy(&canopy_bytes, depth, index as u32, &mut proof).unwrap();
            assert_eq!(proof, full);

            // Longer proofs keep their own nodes
            let mut proof = full.clone();
            fill_in_proof_from_canopy(&canopy_bytes, depth, index as u32, &mut proof).unwrap();
            assert_eq!(proof, full);
        }
    }

    #[test]
    fn test_check_canopy_root_mismatch() {
        let mut canopy_bytes = canopy_of(2);
        set_canopy_leaf_nodes(&mut canopy_bytes, 3, 0, &[[1; 32]]).unwrap();
        let expected = hashv_node(&[1; 32], &empty_node(2));
        check_canopy_root(&canopy_bytes, &expected, 3).unwrap();
        assert_eq!(
            check_canopy_root(&canopy_bytes, &[5; 32], 3).unwrap_err(),
            TreeAccountError::CanopyRootMismatch
        );
        check_canopy_root(&[], &[5; 32], 3).unwrap();
    }

    #[test]
    fn test_no_nodes_to_right_of_index() {
        let mut canopy_bytes = canopy_of(6);
        set_canopy_leaf_nodes(&mut canopy_bytes, 4, 0, &[[1; 32], [2; 32]]).unwrap();
        // Leaf 7 lives under canopy leaf 1
        check_canopy_no_nodes_to_right_of_index(&canopy_bytes, 4, 7).unwrap();
        assert_eq!(
            check_canopy_no_nodes_to_right_of_index(&canopy_bytes, 4, 3).unwrap_err(),
            TreeAccountError::CanopyRightmostLeafMismatch
        );
        check_canopy_no_nodes_to_right_of_index(&[], 4, 0).unwrap();
    }
}
