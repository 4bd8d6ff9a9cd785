//! Entry points that apply a single operation to the tree bytes of an
//! account. The tree is generic over its depth and buffer size, so every
//! function dispatches on the shape stored in the header through the
//! `merkle_tree_apply_fn!` macros. Those macros expand to a large match with a
//! stack frame per arm: call these functions instead and pass arguments by
//! reference to keep the frames small.

use {
    crate::{error::TreeAccountError, events::ChangeLogEvent, state::ConcurrentMerkleTreeHeader},
    concurrent_merkle_tree::{
        concurrent_merkle_tree::{
            ConcurrentMerkleTree, FillEmptyOrAppendArgs, InitializeWithRootArgs, ProveLeafArgs,
            SetLeafArgs,
        },
        node::Node,
    },
};

#[inline(never)]
pub fn merkle_tree_initialize_empty(
    header: &ConcurrentMerkleTreeHeader,
    tree_id: [u8; 32],
    tree_bytes: &mut [u8],
) -> Result<Box<ChangeLogEvent>, TreeAccountError> {
    merkle_tree_apply_fn_mut!(header, tree_id, tree_bytes, initialize,)
}

#[inline(never)]
pub fn merkle_tree_initialize_with_root(
    header: &ConcurrentMerkleTreeHeader,
    tree_id: [u8; 32],
    tree_bytes: &mut [u8],
    args: &InitializeWithRootArgs,
) -> Result<Box<ChangeLogEvent>, TreeAccountError> {
    merkle_tree_apply_fn_mut!(header, tree_id, tree_bytes, initialize_with_root, args)
}

#[inline(never)]
pub fn merkle_tree_set_leaf(
    header: &ConcurrentMerkleTreeHeader,
    tree_id: [u8; 32],
    tree_bytes: &mut [u8],
    args: &SetLeafArgs,
) -> Result<Box<ChangeLogEvent>, TreeAccountError> {
    merkle_tree_apply_fn_mut!(header, tree_id, tree_bytes, set_leaf, args)
}

#[inline(never)]
pub fn merkle_tree_fill_empty_or_append(
    header: &ConcurrentMerkleTreeHeader,
    tree_id: [u8; 32],
    tree_bytes: &mut [u8],
    args: &FillEmptyOrAppendArgs,
) -> Result<Box<ChangeLogEvent>, TreeAccountError> {
    merkle_tree_apply_fn_mut!(header, tree_id, tree_bytes, fill_empty_or_append, args)
}

#[inline(never)]
pub fn merkle_tree_prove_leaf(
    header: &ConcurrentMerkleTreeHeader,
    tree_id: [u8; 32],
    tree_bytes: &[u8],
    args: &ProveLeafArgs,
) -> Result<Box<ChangeLogEvent>, TreeAccountError> {
    merkle_tree_apply_fn!(header, tree_id, tree_bytes, prove_leaf, args)
}

#[inline(never)]
pub fn merkle_tree_append_leaf(
    header: &ConcurrentMerkleTreeHeader,
    tree_id: [u8; 32],
    tree_bytes: &mut [u8],
    leaf: &Node,
) -> Result<Box<ChangeLogEvent>, TreeAccountError> {
    merkle_tree_apply_fn_mut!(header, tree_id, tree_bytes, append, *leaf)
}

/// Checks whether the tree is not initialized yet without loading it.
///
/// A fresh account is zeroed. A regular tree is initialized as soon as
/// `InitEmptyMerkleTree` runs, while a batch initialized tree keeps zeroed
/// tree bytes until `InitPreparedTreeWithRoot` runs.
pub fn tree_bytes_uninitialized(tree_bytes: &[u8]) -> bool {
    tree_bytes.iter().all(|&x| x == 0)
}

#[inline(never)]
pub fn assert_tree_is_empty(
    header: &ConcurrentMerkleTreeHeader,
    tree_id: [u8; 32],
    tree_bytes: &[u8],
) -> Result<(), TreeAccountError> {
    // A prepared batch tree only has its header written, so it is empty as
    // long as the tree bytes are still zeroed
    if header.get_is_batch_initialized() && tree_bytes_uninitialized(tree_bytes) {
        return Ok(());
    }
    merkle_tree_apply_fn!(header, tree_id, tree_bytes, prove_tree_is_empty,)?;
    Ok(())
}
