//! Operation processor for tree accounts.
//!
//! An account is laid out as the header, followed by the tree bytes whose
//! size the header implies, followed by the canopy bytes. The header is
//! rewritten only once the tree accepted the operation.

use {
    crate::{
        canopy::{
            check_canopy_bytes, check_canopy_no_nodes_to_right_of_index, check_canopy_root,
            fill_in_proof_from_canopy, get_cached_path_length, set_canopy_leaf_nodes,
            update_canopy,
        },
        concurrent_tree_wrapper::*,
        error::TreeAccountError,
        events::ChangeLogEvent,
        instruction::TreeOperation,
        state::{
            merkle_tree_get_size, ConcurrentMerkleTreeHeader, CONCURRENT_MERKLE_TREE_HEADER_SIZE_V1,
        },
    },
    bytemuck::cast_slice,
    concurrent_merkle_tree::{
        concurrent_merkle_tree::{
            concurrent_merkle_tree_size, FillEmptyOrAppendArgs, InitializeWithRootArgs,
            ProveLeafArgs, SetLeafArgs,
        },
        error::ConcurrentMerkleTreeError,
        node::Node,
    },
    std::mem::size_of,
};

/// Number of account bytes needed for a tree of the given shape caching the
/// top `canopy_depth` levels
pub fn account_size(max_depth: u32, max_buffer_size: u32, canopy_depth: u32) -> usize {
    let canopy_nodes = (1_usize << (canopy_depth + 1)) - 2;
    CONCURRENT_MERKLE_TREE_HEADER_SIZE_V1
        + concurrent_merkle_tree_size(max_depth as usize, max_buffer_size as usize)
        + canopy_nodes * size_of::<Node>()
}

/// Splits `account_bytes` into header, tree and canopy bytes for the tree
/// shape described by `header`
pub fn split_account<'a>(
    account_bytes: &'a mut [u8],
    header: &ConcurrentMerkleTreeHeader,
) -> Result<(&'a mut [u8], &'a mut [u8], &'a mut [u8]), TreeAccountError> {
    let merkle_tree_size = merkle_tree_get_size(header)?;
    let expected = CONCURRENT_MERKLE_TREE_HEADER_SIZE_V1 + merkle_tree_size;
    if account_bytes.len() < expected {
        return Err(ConcurrentMerkleTreeError::MalformedLayout {
            expected,
            actual: account_bytes.len(),
        }
        .into());
    }
    let (header_bytes, rest) = account_bytes.split_at_mut(CONCURRENT_MERKLE_TREE_HEADER_SIZE_V1);
    let (tree_bytes, canopy_bytes) = rest.split_at_mut(merkle_tree_size);
    check_canopy_bytes(canopy_bytes)?;
    get_cached_path_length(cast_slice::<u8, Node>(canopy_bytes), header.get_max_depth())?;
    Ok((header_bytes, tree_bytes, canopy_bytes))
}

/// Applies `op` to the tree account held in `account_bytes`.
///
/// Returns the change log event of the resulting tree state, to be forwarded
/// to indexers, for every operation that produces one.
pub fn process_operation(
    account_bytes: &mut [u8],
    tree_id: [u8; 32],
    op: &TreeOperation,
) -> Result<Option<ChangeLogEvent>, TreeAccountError> {
    match op {
        TreeOperation::InitEmptyMerkleTree {
            max_depth,
            max_buffer_size,
            creation_slot,
        } => init_empty_merkle_tree(
            account_bytes,
            tree_id,
            *max_depth,
            *max_buffer_size,
            *creation_slot,
        )
        .map(Some),
        TreeOperation::PrepareBatchMerkleTree {
            max_depth,
            max_buffer_size,
            creation_slot,
        } => prepare_batch_merkle_tree(account_bytes, *max_depth, *max_buffer_size, *creation_slot)
            .map(|_| None),
        TreeOperation::AppendCanopyNodes {
            start_index,
            canopy_nodes,
        } => append_canopy_nodes(account_bytes, *start_index, canopy_nodes).map(|_| None),
        TreeOperation::InitPreparedTreeWithRoot {
            root,
            rightmost_leaf,
            rightmost_index,
            proof,
        } => init_prepared_tree_with_root(
            account_bytes,
            tree_id,
            *root,
            *rightmost_leaf,
            *rightmost_index,
            proof,
        )
        .map(Some),
        TreeOperation::Append { leaf } => append(account_bytes, tree_id, leaf).map(Some),
        TreeOperation::ReplaceLeaf {
            root,
            previous_leaf,
            new_leaf,
            index,
            proof,
        } => replace_leaf(
            account_bytes,
            tree_id,
            *root,
            *previous_leaf,
            *new_leaf,
            *index,
            proof,
        )
        .map(Some),
        TreeOperation::InsertOrAppend {
            root,
            leaf,
            index,
            proof,
        } => insert_or_append(account_bytes, tree_id, *root, *leaf, *index, proof).map(Some),
        TreeOperation::VerifyLeaf {
            root,
            leaf,
            index,
            proof,
        } => verify_leaf(account_bytes, tree_id, *root, *leaf, *index, proof).map(|_| None),
        TreeOperation::CloseEmptyTree => close_empty_tree(account_bytes, tree_id).map(|_| None),
    }
}

fn init_empty_merkle_tree(
    account_bytes: &mut [u8],
    tree_id: [u8; 32],
    max_depth: u32,
    max_buffer_size: u32,
    creation_slot: u64,
) -> Result<ChangeLogEvent, TreeAccountError> {
    let mut header = ConcurrentMerkleTreeHeader::load(account_bytes)?;
    header.initialize(max_depth, max_buffer_size, creation_slot)?;
    let (header_bytes, tree_bytes, canopy_bytes) = split_account(account_bytes, &header)?;

    let change_log_event = merkle_tree_initialize_empty(&header, tree_id, tree_bytes)?;
    header.store(header_bytes)?;
    update_canopy(canopy_bytes, header.get_max_depth(), None)?;
    log::debug!(
        "Initialized empty tree with max depth {} and max buffer size {}",
        max_depth,
        max_buffer_size
    );
    Ok(*change_log_event)
}

/// A tree with a canopy can only be initialized with a root once the canopy
/// holds the nodes matching that root. The flow is `PrepareBatchMerkleTree`,
/// then `AppendCanopyNodes` until the canopy is filled, then
/// `InitPreparedTreeWithRoot`. Only the header is written here, the zeroed
/// tree bytes tell a prepared tree apart from an initialized empty one.
fn prepare_batch_merkle_tree(
    account_bytes: &mut [u8],
    max_depth: u32,
    max_buffer_size: u32,
    creation_slot: u64,
) -> Result<(), TreeAccountError> {
    let mut header = ConcurrentMerkleTreeHeader::load(account_bytes)?;
    header.initialize_batched(max_depth, max_buffer_size, creation_slot)?;
    let (header_bytes, _tree_bytes, _canopy_bytes) = split_account(account_bytes, &header)?;
    header.store(header_bytes)?;
    log::debug!(
        "Prepared batch tree with max depth {} and max buffer size {}",
        max_depth,
        max_buffer_size
    );
    Ok(())
}

fn append_canopy_nodes(
    account_bytes: &mut [u8],
    start_index: u32,
    canopy_nodes: &[Node],
) -> Result<(), TreeAccountError> {
    let header = ConcurrentMerkleTreeHeader::load(account_bytes)?;
    header.assert_valid()?;
    header.assert_is_batch_initialized()?;
    let (_header_bytes, tree_bytes, canopy_bytes) = split_account(account_bytes, &header)?;
    // The canopy of an initialized tree is only ever written from change logs
    if !tree_bytes_uninitialized(tree_bytes) {
        return Err(TreeAccountError::TreeAlreadyInitialized);
    }
    set_canopy_leaf_nodes(
        canopy_bytes,
        header.get_max_depth(),
        start_index,
        canopy_nodes,
    )
}

fn init_prepared_tree_with_root(
    account_bytes: &mut [u8],
    tree_id: [u8; 32],
    root: Node,
    rightmost_leaf: Node,
    rightmost_index: u32,
    proof: &[Node],
) -> Result<ChangeLogEvent, TreeAccountError> {
    let header = ConcurrentMerkleTreeHeader::load(account_bytes)?;
    header.assert_valid()?;
    header.assert_is_batch_initialized()?;
    let (_header_bytes, tree_bytes, canopy_bytes) = split_account(account_bytes, &header)?;
    header.assert_valid_leaf_index(rightmost_index)?;
    if !tree_bytes_uninitialized(tree_bytes) {
        return Err(TreeAccountError::TreeAlreadyInitialized);
    }
    check_canopy_root(canopy_bytes, &root, header.get_max_depth())?;
    check_canopy_no_nodes_to_right_of_index(canopy_bytes, header.get_max_depth(), rightmost_index)?;

    let mut proof = proof.to_vec();
    fill_in_proof_from_canopy(
        canopy_bytes,
        header.get_max_depth(),
        rightmost_index,
        &mut proof,
    )?;
    let args = &InitializeWithRootArgs {
        root,
        rightmost_leaf,
        proof_vec: proof,
        index: rightmost_index,
    };
    let change_log_event = merkle_tree_initialize_with_root(&header, tree_id, tree_bytes, args)?;
    update_canopy(
        canopy_bytes,
        header.get_max_depth(),
        Some(&change_log_event),
    )?;
    Ok(*change_log_event)
}

fn append(
    account_bytes: &mut [u8],
    tree_id: [u8; 32],
    leaf: &Node,
) -> Result<ChangeLogEvent, TreeAccountError> {
    let header = ConcurrentMerkleTreeHeader::load(account_bytes)?;
    header.assert_valid()?;
    let (_header_bytes, tree_bytes, canopy_bytes) = split_account(account_bytes, &header)?;

    let change_log_event = merkle_tree_append_leaf(&header, tree_id, tree_bytes, leaf)?;
    update_canopy(
        canopy_bytes,
        header.get_max_depth(),
        Some(&change_log_event),
    )?;
    Ok(*change_log_event)
}

fn replace_leaf(
    account_bytes: &mut [u8],
    tree_id: [u8; 32],
    root: Node,
    previous_leaf: Node,
    new_leaf: Node,
    index: u32,
    proof: &[Node],
) -> Result<ChangeLogEvent, TreeAccountError> {
    let header = ConcurrentMerkleTreeHeader::load(account_bytes)?;
    header.assert_valid()?;
    let (_header_bytes, tree_bytes, canopy_bytes) = split_account(account_bytes, &header)?;
    header.assert_valid_leaf_index(index)?;

    let mut proof = proof.to_vec();
    fill_in_proof_from_canopy(canopy_bytes, header.get_max_depth(), index, &mut proof)?;
    let args = &SetLeafArgs {
        current_root: root,
        previous_leaf,
        new_leaf,
        proof_vec: proof,
        index,
    };
    let change_log_event = merkle_tree_set_leaf(&header, tree_id, tree_bytes, args)?;
    update_canopy(
        canopy_bytes,
        header.get_max_depth(),
        Some(&change_log_event),
    )?;
    Ok(*change_log_event)
}

fn insert_or_append(
    account_bytes: &mut [u8],
    tree_id: [u8; 32],
    root: Node,
    leaf: Node,
    index: u32,
    proof: &[Node],
) -> Result<ChangeLogEvent, TreeAccountError> {
    let header = ConcurrentMerkleTreeHeader::load(account_bytes)?;
    header.assert_valid()?;
    let (_header_bytes, tree_bytes, canopy_bytes) = split_account(account_bytes, &header)?;
    header.assert_valid_leaf_index(index)?;

    let mut proof = proof.to_vec();
    fill_in_proof_from_canopy(canopy_bytes, header.get_max_depth(), index, &mut proof)?;
    let args = &FillEmptyOrAppendArgs {
        current_root: root,
        leaf,
        proof_vec: proof,
        index,
    };
    let change_log_event = merkle_tree_fill_empty_or_append(&header, tree_id, tree_bytes, args)?;
    update_canopy(
        canopy_bytes,
        header.get_max_depth(),
        Some(&change_log_event),
    )?;
    Ok(*change_log_event)
}

fn verify_leaf(
    account_bytes: &mut [u8],
    tree_id: [u8; 32],
    root: Node,
    leaf: Node,
    index: u32,
    proof: &[Node],
) -> Result<(), TreeAccountError> {
    let header = ConcurrentMerkleTreeHeader::load(account_bytes)?;
    header.assert_valid()?;
    let (_header_bytes, tree_bytes, canopy_bytes) = split_account(account_bytes, &header)?;
    header.assert_valid_leaf_index(index)?;

    let mut proof = proof.to_vec();
    fill_in_proof_from_canopy(canopy_bytes, header.get_max_depth(), index, &mut proof)?;
    let args = &ProveLeafArgs {
        current_root: root,
        leaf,
        proof_vec: proof,
        index,
    };
    merkle_tree_prove_leaf(&header, tree_id, tree_bytes, args)?;
    Ok(())
}

fn close_empty_tree(account_bytes: &mut [u8], tree_id: [u8; 32]) -> Result<(), TreeAccountError> {
    let header = ConcurrentMerkleTreeHeader::load(account_bytes)?;
    header.assert_valid()?;
    let (header_bytes, tree_bytes, canopy_bytes) = split_account(account_bytes, &header)?;

    assert_tree_is_empty(&header, tree_id, tree_bytes)?;

    header_bytes.fill(0);
    tree_bytes.fill(0);
    canopy_bytes.fill(0);
    log::debug!("Closed empty tree");
    Ok(())
}
