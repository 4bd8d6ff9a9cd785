use {
    crate::{
        changelog::ChangeLog,
        error::ConcurrentMerkleTreeError,
        hash::{fill_in_proof, hash_to_parent, recompute},
        node::{empty_node, empty_node_cached_mut, is_empty, Node, EMPTY},
        path::Path,
    },
    bytemuck::{Pod, Zeroable},
    std::mem::size_of,
};

/// Enforce constraints on max depth and buffer size
#[inline(always)]
fn check_bounds(max_depth: usize, max_buffer_size: usize) {
    // We cannot allow a tree depth greater than 30 because of the bit math
    // required to update `ChangeLog`s
    assert!(max_depth > 0 && max_depth < 31);
    // Ring buffer slots are computed by masking the active index
    assert!(max_buffer_size.is_power_of_two());
}

fn check_leaf_index(leaf_index: u32, max_depth: usize) -> Result<(), ConcurrentMerkleTreeError> {
    if leaf_index >= (1 << max_depth) {
        return Err(ConcurrentMerkleTreeError::LeafIndexOutOfBounds);
    }
    Ok(())
}

/// Number of bytes occupied by a `ConcurrentMerkleTree<max_depth, max_buffer_size>`
///
/// The layout is, in order and without implicit padding:
/// `sequence_number: u64`, `active_index: u64`, `buffer_size: u64`,
/// `max_buffer_size` change logs and the rightmost proof. A change log and a
/// path both occupy `32 * (max_depth + 1) + 8` bytes.
pub const fn concurrent_merkle_tree_size(max_depth: usize, max_buffer_size: usize) -> usize {
    let path_size = size_of::<Node>() * (max_depth + 1) + 2 * size_of::<u32>();
    3 * size_of::<u64>() + path_size * (max_buffer_size + 1)
}

/// Concurrent Merkle Tree is a Merkle Tree that allows
/// multiple tree operations targeted for the same tree root to succeed.
///
/// In a normal merkle tree, only the first tree operation will succeed because
/// the following operations will have proofs for the unmodified tree state.
/// ConcurrentMerkleTree avoids this by storing a buffer of modified nodes
/// (`change_logs`) which allows it to implement fast-forwarding of concurrent
/// merkle tree operations.
///
/// As long as the concurrent merkle tree operations
/// have proofs that are valid for a previous state of the tree that can be
/// found in the stored buffer, that tree operation's proof can be
/// fast-forwarded and the tree operation can be applied.
///
/// There are two primitive operations for Concurrent Merkle Trees:
/// [set_leaf](ConcurrentMerkleTree::set_leaf) and
/// [append](ConcurrentMerkleTree::append). Setting a leaf value requires
/// passing a proof to perform that tree operation, but appending does not
/// require a proof. Appends are served by the proof to the rightmost leaf in
/// the tree (`rightmost_proof`), which the tree maintains itself.
///
/// The current root is always `change_logs[active_index].root`.
///
/// Arguments that carry proofs are passed as references to structs so that
/// callers dispatching over many `(MAX_DEPTH, MAX_BUFFER_SIZE)` pairs keep
/// small stack frames.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConcurrentMerkleTree<const MAX_DEPTH: usize, const MAX_BUFFER_SIZE: usize> {
    /// Number of successful mutations since initialization
    pub sequence_number: u64,
    /// Index of most recent root & changes
    pub active_index: u64,
    /// Number of active changes we are tracking
    pub buffer_size: u64,
    /// Proof for respective root
    pub change_logs: [ChangeLog<MAX_DEPTH>; MAX_BUFFER_SIZE],
    /// Proof of the last leaf placed at the frontier. Its `index` is the
    /// frontier itself, one past that leaf, so fold it with
    /// [rightmost_root](ConcurrentMerkleTree::rightmost_root) rather than
    /// [Path::root].
    pub rightmost_proof: Path<MAX_DEPTH>,
}

unsafe impl<const MAX_DEPTH: usize, const MAX_BUFFER_SIZE: usize> Zeroable
    for ConcurrentMerkleTree<MAX_DEPTH, MAX_BUFFER_SIZE>
{
}
unsafe impl<const MAX_DEPTH: usize, const MAX_BUFFER_SIZE: usize> Pod
    for ConcurrentMerkleTree<MAX_DEPTH, MAX_BUFFER_SIZE>
{
}

impl<const MAX_DEPTH: usize, const MAX_BUFFER_SIZE: usize> Default
    for ConcurrentMerkleTree<MAX_DEPTH, MAX_BUFFER_SIZE>
{
    fn default() -> Self {
        Self {
            sequence_number: 0,
            active_index: 0,
            buffer_size: 0,
            change_logs: [ChangeLog::<MAX_DEPTH>::default(); MAX_BUFFER_SIZE],
            rightmost_proof: Path::<MAX_DEPTH>::default(),
        }
    }
}

/// Arguments structure for initializing a tree with a root.
pub struct InitializeWithRootArgs {
    pub root: Node,
    pub rightmost_leaf: Node,
    pub proof_vec: Vec<Node>,
    pub index: u32,
}

/// Arguments structure for setting a leaf in the tree.
pub struct SetLeafArgs {
    /// Root the proof was generated against
    pub current_root: Node,
    pub previous_leaf: Node,
    pub new_leaf: Node,
    pub proof_vec: Vec<Node>,
    pub index: u32,
}

/// Arguments structure for filling an empty leaf or appending a new leaf to the
/// tree.
pub struct FillEmptyOrAppendArgs {
    pub current_root: Node,
    pub leaf: Node,
    pub proof_vec: Vec<Node>,
    pub index: u32,
}

/// Arguments structure for proving a leaf in the tree.
pub struct ProveLeafArgs {
    pub current_root: Node,
    pub leaf: Node,
    pub proof_vec: Vec<Node>,
    pub index: u32,
}

impl<const MAX_DEPTH: usize, const MAX_BUFFER_SIZE: usize>
    ConcurrentMerkleTree<MAX_DEPTH, MAX_BUFFER_SIZE>
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an uninitialized tree directly on the heap
    pub fn new_boxed() -> Box<Self> {
        bytemuck::allocation::zeroed_box()
    }

    pub fn is_initialized(&self) -> bool {
        !(self.buffer_size == 0 && self.sequence_number == 0 && self.active_index == 0)
    }

    /// This is the trustless initialization method that should be used in most
    /// cases.
    pub fn initialize(&mut self) -> Result<Node, ConcurrentMerkleTreeError> {
        check_bounds(MAX_DEPTH, MAX_BUFFER_SIZE);
        if self.is_initialized() {
            return Err(ConcurrentMerkleTreeError::TreeAlreadyInitialized);
        }
        let mut rightmost_proof = Path::default();
        let mut empty_node_cache = [Node::default(); MAX_DEPTH];
        for (i, node) in rightmost_proof.proof.iter_mut().enumerate() {
            *node = empty_node_cached_mut::<MAX_DEPTH>(i as u32, &mut empty_node_cache);
        }
        // The path to leaf 0 of an empty tree consists of the same empty
        // subtree hashes as its siblings
        self.change_logs[0] = ChangeLog::new(
            empty_node(MAX_DEPTH as u32),
            rightmost_proof.proof,
            0,
        );
        self.sequence_number = 0;
        self.active_index = 0;
        self.buffer_size = 1;
        self.rightmost_proof = rightmost_proof;
        Ok(self.change_logs[0].root)
    }

    /// This is a trustful initialization method that assumes the root contains
    /// the expected leaves.
    ///
    /// The proof of the rightmost leaf is verified against `root` before any
    /// state is written. Leaves to the left of `index` cannot be checked, so
    /// indexers must obtain them from whoever prepared the root.
    pub fn initialize_with_root(
        &mut self,
        args: &InitializeWithRootArgs,
    ) -> Result<Node, ConcurrentMerkleTreeError> {
        check_bounds(MAX_DEPTH, MAX_BUFFER_SIZE);
        check_leaf_index(args.index, MAX_DEPTH)?;

        if self.is_initialized() {
            return Err(ConcurrentMerkleTreeError::TreeAlreadyInitialized);
        }
        let mut proof: [Node; MAX_DEPTH] = [Node::default(); MAX_DEPTH];
        fill_in_proof::<MAX_DEPTH>(&args.proof_vec, &mut proof);
        if args.root != recompute(args.rightmost_leaf, &proof, args.index) {
            cmt_logging!("Proof failed to verify");
            return Err(ConcurrentMerkleTreeError::InvalidProof);
        }

        let mut change_log = ChangeLog::<MAX_DEPTH>::default();
        change_log.replace_and_recompute_path(args.index, args.rightmost_leaf, &proof);
        self.change_logs[0] = change_log;
        self.sequence_number = 0;
        self.active_index = 0;
        self.buffer_size = 1;
        self.rightmost_proof = Path::new(proof, args.rightmost_leaf, args.index + 1);
        Ok(args.root)
    }

    /// Errors if one of the leaves of the current merkle tree is non-EMPTY
    pub fn prove_tree_is_empty(&self) -> Result<(), ConcurrentMerkleTreeError> {
        if !self.is_initialized() {
            return Err(ConcurrentMerkleTreeError::TreeNotInitialized);
        }
        let mut empty_node_cache = [EMPTY; MAX_DEPTH];
        if self.get_root()
            != empty_node_cached_mut::<MAX_DEPTH>(MAX_DEPTH as u32, &mut empty_node_cache)
        {
            return Err(ConcurrentMerkleTreeError::TreeNonEmpty);
        }
        Ok(())
    }

    /// Returns the current root of the merkle tree
    pub fn get_root(&self) -> [u8; 32] {
        self.get_change_log().root
    }

    /// Returns the most recent changelog
    pub fn get_change_log(&self) -> Box<ChangeLog<MAX_DEPTH>> {
        if !self.is_initialized() {
            cmt_logging!("Tree is not initialized, returning default change log");
            return Box::<ChangeLog<MAX_DEPTH>>::default();
        }
        Box::new(self.change_logs[self.active_index as usize])
    }

    /// Returns the Current Seq of the tree, the seq is the monotonic counter of
    /// the tree operations that is incremented every time a mutable
    /// operation is performed on the tree.
    pub fn get_seq(&self) -> u64 {
        self.sequence_number
    }

    /// Index of the highest leaf ever placed at the frontier, if any
    pub fn rightmost_leaf_index(&self) -> Option<u32> {
        self.rightmost_proof.index.checked_sub(1)
    }

    /// Root obtained by folding the rightmost leaf up through the rightmost
    /// proof. Always equal to [get_root](ConcurrentMerkleTree::get_root) for
    /// an initialized tree.
    pub fn rightmost_root(&self) -> Node {
        recompute(
            self.rightmost_proof.leaf,
            &self.rightmost_proof.proof,
            self.rightmost_leaf_index().unwrap_or(0),
        )
    }

    /// This method will fail if the leaf cannot be proven
    /// to exist in the current tree root.
    ///
    /// The proof is fast-forwarded from `current_root` when that root is
    /// still in the buffer. Otherwise the proof is replayed through every
    /// buffered change log, which succeeds only if the evicted history did
    /// not touch the proof.
    ///
    /// Note: this is *not* the same as verifying that a (proof, leaf)
    /// combination is valid for the current root. That functionality
    /// is provided by `check_valid_proof`.
    pub fn prove_leaf(&self, args: &ProveLeafArgs) -> Result<(), ConcurrentMerkleTreeError> {
        check_bounds(MAX_DEPTH, MAX_BUFFER_SIZE);
        check_leaf_index(args.index, MAX_DEPTH)?;
        if !self.is_initialized() {
            return Err(ConcurrentMerkleTreeError::TreeNotInitialized);
        }

        if args.index > self.rightmost_proof.index {
            cmt_logging!(
                "Received an index larger than the rightmost index {} > {}",
                args.index,
                self.rightmost_proof.index
            );
            Err(ConcurrentMerkleTreeError::LeafIndexOutOfBounds)
        } else {
            let mut proof: [Node; MAX_DEPTH] = [Node::default(); MAX_DEPTH];
            fill_in_proof::<MAX_DEPTH>(&args.proof_vec, &mut proof);
            let valid_root =
                self.check_valid_leaf(args.current_root, args.leaf, &mut proof, args.index, true)?;
            if !valid_root {
                cmt_logging!("Proof failed to verify");
                return Err(ConcurrentMerkleTreeError::InvalidProof);
            }
            Ok(())
        }
    }

    /// Only used to initialize right most path for a completely empty tree.
    #[inline(always)]
    fn initialize_tree_from_append(
        &mut self,
        leaf: Node,
        mut proof: [Node; MAX_DEPTH],
    ) -> Result<Node, ConcurrentMerkleTreeError> {
        let old_root = recompute(EMPTY, &proof, 0);
        if old_root == empty_node(MAX_DEPTH as u32) {
            self.try_apply_proof(old_root, EMPTY, leaf, &mut proof, 0, false)
        } else {
            Err(ConcurrentMerkleTreeError::TreeAlreadyInitialized)
        }
    }

    /// Appending a non-empty Node will always succeed unless the tree is full.
    pub fn append(&mut self, mut node: Node) -> Result<Node, ConcurrentMerkleTreeError> {
        check_bounds(MAX_DEPTH, MAX_BUFFER_SIZE);
        if !self.is_initialized() {
            return Err(ConcurrentMerkleTreeError::TreeNotInitialized);
        }
        if is_empty(&node) {
            return Err(ConcurrentMerkleTreeError::CannotAppendEmptyNode);
        }
        if self.rightmost_proof.index >= 1 << MAX_DEPTH {
            return Err(ConcurrentMerkleTreeError::TreeFull);
        }
        if self.rightmost_proof.index == 0 {
            return self.initialize_tree_from_append(node, self.rightmost_proof.proof);
        }
        let leaf = node;
        let intersection = self.rightmost_proof.index.trailing_zeros() as usize;
        let mut change_list = [EMPTY; MAX_DEPTH];
        let mut intersection_node = self.rightmost_proof.leaf;
        let mut empty_node_cache = [Node::default(); MAX_DEPTH];

        for (i, cl_item) in change_list.iter_mut().enumerate() {
            *cl_item = node;
            match i {
                i if i < intersection => {
                    // Compute proof to the appended node from empty nodes
                    let sibling =
                        empty_node_cached_mut::<MAX_DEPTH>(i as u32, &mut empty_node_cache);
                    hash_to_parent(
                        &mut intersection_node,
                        &self.rightmost_proof.proof[i],
                        ((self.rightmost_proof.index - 1) >> i) & 1 == 0,
                    );
                    hash_to_parent(&mut node, &sibling, true);
                    self.rightmost_proof.proof[i] = sibling;
                }
                i if i == intersection => {
                    // Compute the where the new node intersects the main tree
                    hash_to_parent(&mut node, &intersection_node, false);
                    self.rightmost_proof.proof[intersection] = intersection_node;
                }
                _ => {
                    // Update the change list path up to the root
                    hash_to_parent(
                        &mut node,
                        &self.rightmost_proof.proof[i],
                        ((self.rightmost_proof.index - 1) >> i) & 1 == 0,
                    );
                }
            }
        }

        self.update_internal_counters();
        self.change_logs[self.active_index as usize] =
            ChangeLog::<MAX_DEPTH>::new(node, change_list, self.rightmost_proof.index);
        self.rightmost_proof.index += 1;
        self.rightmost_proof.leaf = leaf;
        Ok(node)
    }

    /// Convenience function for `set_leaf`
    ///
    /// This method will `set_leaf` if the leaf at `index` is an empty node,
    /// otherwise it will `append` the new leaf. Indices past the frontier are
    /// appended at the frontier, and so is a leaf whose slot was written
    /// after `current_root`.
    pub fn fill_empty_or_append(
        &mut self,
        args: &FillEmptyOrAppendArgs,
    ) -> Result<Node, ConcurrentMerkleTreeError> {
        check_bounds(MAX_DEPTH, MAX_BUFFER_SIZE);
        check_leaf_index(args.index, MAX_DEPTH)?;
        if !self.is_initialized() {
            return Err(ConcurrentMerkleTreeError::TreeNotInitialized);
        }
        if args.index > self.rightmost_proof.index {
            if self.find_root_in_changelog(args.current_root).is_none() {
                cmt_logging!("Failed to find root in change log");
                return Err(ConcurrentMerkleTreeError::RootNotFound);
            }
            cmt_logging!(
                "Index {} is past the frontier {}, appending",
                args.index,
                self.rightmost_proof.index
            );
            return self.append(args.leaf);
        }

        let mut proof: [Node; MAX_DEPTH] = [Node::default(); MAX_DEPTH];
        fill_in_proof::<MAX_DEPTH>(&args.proof_vec, &mut proof);

        match self.try_apply_proof(
            args.current_root,
            EMPTY,
            args.leaf,
            &mut proof,
            args.index,
            false,
        ) {
            Ok(new_root) => Ok(new_root),
            Err(ConcurrentMerkleTreeError::LeafContentsModified) => self.append(args.leaf),
            Err(error) => Err(error),
        }
    }

    /// This method will update the leaf at `index`.
    ///
    /// The proof must be valid for `current_root`, and `current_root` must
    /// still be in the change log buffer. If a change log newer than
    /// `current_root` wrote the same leaf, the update fails with
    /// `LeafContentsModified` and the tree is left untouched.
    pub fn set_leaf(&mut self, args: &SetLeafArgs) -> Result<Node, ConcurrentMerkleTreeError> {
        check_bounds(MAX_DEPTH, MAX_BUFFER_SIZE);
        check_leaf_index(args.index, MAX_DEPTH)?;
        if !self.is_initialized() {
            return Err(ConcurrentMerkleTreeError::TreeNotInitialized);
        }

        let mut proof: [Node; MAX_DEPTH] = [Node::default(); MAX_DEPTH];
        fill_in_proof::<MAX_DEPTH>(&args.proof_vec, &mut proof);
        self.set_leaf_with_proof(
            args.current_root,
            args.previous_leaf,
            args.new_leaf,
            &mut proof,
            args.index,
        )
    }

    /// Replaces `path.leaf` at `path.index` with `new_leaf`.
    ///
    /// The historical root is the one implied by folding `path`, so a path
    /// whose root has left the buffer fails with `RootNotFound`.
    pub fn replace_leaf(
        &mut self,
        path: &Path<MAX_DEPTH>,
        new_leaf: Node,
    ) -> Result<Node, ConcurrentMerkleTreeError> {
        check_bounds(MAX_DEPTH, MAX_BUFFER_SIZE);
        check_leaf_index(path.index, MAX_DEPTH)?;
        if !self.is_initialized() {
            return Err(ConcurrentMerkleTreeError::TreeNotInitialized);
        }
        let mut proof = path.proof;
        self.set_leaf_with_proof(path.root(), path.leaf, new_leaf, &mut proof, path.index)
    }

    /// [fill_empty_or_append](ConcurrentMerkleTree::fill_empty_or_append)
    /// for a caller-held path to an empty slot (`path.leaf` is `EMPTY`).
    pub fn insert_or_append(
        &mut self,
        path: &Path<MAX_DEPTH>,
        new_leaf: Node,
    ) -> Result<Node, ConcurrentMerkleTreeError> {
        self.fill_empty_or_append(&FillEmptyOrAppendArgs {
            current_root: path.root(),
            leaf: new_leaf,
            proof_vec: path.proof.to_vec(),
            index: path.index,
        })
    }

    fn set_leaf_with_proof(
        &mut self,
        current_root: Node,
        previous_leaf: Node,
        new_leaf: Node,
        proof: &mut [Node; MAX_DEPTH],
        index: u32,
    ) -> Result<Node, ConcurrentMerkleTreeError> {
        if index > self.rightmost_proof.index {
            cmt_logging!(
                "Received an index larger than the rightmost index {} > {}",
                index,
                self.rightmost_proof.index
            );
            return Err(ConcurrentMerkleTreeError::LeafIndexOutOfBounds);
        }
        self.try_apply_proof(current_root, previous_leaf, new_leaf, proof, index, false)
    }

    /// Modifies the `proof` for leaf at `leaf_index` in place by
    /// fast-forwarding it through `count` change logs, starting at buffer
    /// slot `first_changelog_index`
    ///
    /// `leaf` ends up holding the most recent value written to `leaf_index`.
    /// Returns true if any of the replayed change logs wrote that leaf.
    #[inline(always)]
    fn fast_forward_proof(
        &self,
        leaf: &mut Node,
        proof: &mut [Node; MAX_DEPTH],
        leaf_index: u32,
        first_changelog_index: u64,
        count: u64,
    ) -> bool {
        cmt_logging!(
            "Fast-forwarding proof through {} change logs, starting index {}",
            count,
            first_changelog_index
        );
        let mask: u64 = MAX_BUFFER_SIZE as u64 - 1;
        let mut leaf_written = false;
        for offset in 0..count {
            let changelog_buffer_index = (first_changelog_index + offset) & mask;
            leaf_written |= self.change_logs[changelog_buffer_index as usize]
                .update_proof_or_leaf(leaf_index, proof, leaf);
        }
        leaf_written
    }

    #[inline(always)]
    fn find_root_in_changelog(&self, current_root: Node) -> Option<u64> {
        let mask: u64 = MAX_BUFFER_SIZE as u64 - 1;
        for i in 0..self.buffer_size {
            let j = self.active_index.wrapping_sub(i) & mask;
            if self.change_logs[j as usize].root == current_root {
                return Some(j);
            }
        }
        None
    }

    /// Rebases `proof` onto the current root and checks it.
    ///
    /// With a root found in the buffer, only the newer change logs are
    /// replayed and any write to `leaf_index` among them is contention. With
    /// `allow_inferred_proof` and an unknown root, the whole buffer is
    /// replayed and contention means the leaf no longer holds `leaf`.
    #[inline(always)]
    fn check_valid_leaf(
        &self,
        current_root: Node,
        leaf: Node,
        proof: &mut [Node; MAX_DEPTH],
        leaf_index: u32,
        allow_inferred_proof: bool,
    ) -> Result<bool, ConcurrentMerkleTreeError> {
        let mask: u64 = MAX_BUFFER_SIZE as u64 - 1;
        let mut updatable_leaf_node = leaf;
        let leaf_contended = match self.find_root_in_changelog(current_root) {
            Some(matching_changelog_index) => {
                let newer_changelogs =
                    self.active_index.wrapping_sub(matching_changelog_index) & mask;
                self.fast_forward_proof(
                    &mut updatable_leaf_node,
                    proof,
                    leaf_index,
                    matching_changelog_index + 1,
                    newer_changelogs,
                )
            }
            None if allow_inferred_proof => {
                cmt_logging!("Failed to find root in change log -> replaying full buffer");
                let oldest_changelog_index =
                    self.active_index.wrapping_sub(self.buffer_size - 1) & mask;
                self.fast_forward_proof(
                    &mut updatable_leaf_node,
                    proof,
                    leaf_index,
                    oldest_changelog_index,
                    self.buffer_size,
                );
                updatable_leaf_node != leaf
            }
            None => return Err(ConcurrentMerkleTreeError::RootNotFound),
        };
        if leaf_contended {
            cmt_logging!("Leaf was updated since proof was issued. Failing to verify");
            return Err(ConcurrentMerkleTreeError::LeafContentsModified);
        }
        Ok(self.check_valid_proof(updatable_leaf_node, proof, leaf_index))
    }

    /// Checks that the proof provided is valid for the current root.
    pub fn check_valid_proof(
        &self,
        leaf: Node,
        proof: &[Node; MAX_DEPTH],
        leaf_index: u32,
    ) -> bool {
        if !self.is_initialized() {
            cmt_logging!("Tree is not initialized, returning false");
            return false;
        }
        if check_leaf_index(leaf_index, MAX_DEPTH).is_err() {
            cmt_logging!("Leaf index out of bounds for max_depth");
            return false;
        }
        recompute(leaf, proof, leaf_index) == self.get_root()
    }

    /// Note: Enabling `allow_inferred_proof` will fast forward the given proof
    /// from the beginning of the buffer in the case that the supplied root is
    /// not in the buffer.
    #[inline(always)]
    fn try_apply_proof(
        &mut self,
        current_root: Node,
        leaf: Node,
        new_leaf: Node,
        proof: &mut [Node; MAX_DEPTH],
        leaf_index: u32,
        allow_inferred_proof: bool,
    ) -> Result<Node, ConcurrentMerkleTreeError> {
        cmt_logging!("Active Index: {}", self.active_index);
        cmt_logging!("Rightmost Index: {}", self.rightmost_proof.index);
        cmt_logging!("Buffer Size: {}", self.buffer_size);
        cmt_logging!("Leaf Index: {}", leaf_index);
        let valid_root =
            self.check_valid_leaf(current_root, leaf, proof, leaf_index, allow_inferred_proof)?;
        if !valid_root {
            return Err(ConcurrentMerkleTreeError::InvalidProof);
        }
        self.update_internal_counters();
        Ok(self.update_buffers_from_proof(new_leaf, proof, leaf_index))
    }

    /// Implements circular addition for changelog buffer index
    fn update_internal_counters(&mut self) {
        let mask: u64 = MAX_BUFFER_SIZE as u64 - 1;
        self.active_index += 1;
        self.active_index &= mask;
        if self.buffer_size < MAX_BUFFER_SIZE as u64 {
            self.buffer_size += 1;
        }
        self.sequence_number = self.sequence_number.saturating_add(1);
    }

    /// Creates a new root from a proof that is valid for the root at
    /// `self.active_index`
    fn update_buffers_from_proof(&mut self, start: Node, proof: &[Node], index: u32) -> Node {
        let change_log = &mut self.change_logs[self.active_index as usize];
        // Also updates change_log's current root
        let root = change_log.replace_and_recompute_path(index, start, proof);
        // Update rightmost path if possible
        if index < self.rightmost_proof.index {
            change_log.update_proof_or_leaf(
                self.rightmost_proof.index - 1,
                &mut self.rightmost_proof.proof,
                &mut self.rightmost_proof.leaf,
            );
        } else {
            debug_assert_eq!(index, self.rightmost_proof.index);
            cmt_logging!("Appending rightmost leaf");
            self.rightmost_proof.proof.copy_from_slice(proof);
            self.rightmost_proof.index = index + 1;
            self.rightmost_proof.leaf = change_log.get_leaf();
        }
        root
    }

    /// Borrows a tree in place from its serialized bytes
    ///
    /// `bytes` must be exactly [concurrent_merkle_tree_size] long and 8-byte
    /// aligned.
    pub fn load_bytes(bytes: &[u8]) -> Result<&Self, ConcurrentMerkleTreeError> {
        check_layout_len::<MAX_DEPTH, MAX_BUFFER_SIZE>(bytes.len())?;
        bytemuck::try_from_bytes(bytes).map_err(|_err| {
            cmt_logging!("Failed to load tree bytes: {}", _err);
            ConcurrentMerkleTreeError::MalformedLayout {
                expected: size_of::<Self>(),
                actual: bytes.len(),
            }
        })
    }

    /// Mutably borrows a tree in place from its serialized bytes
    pub fn load_mut_bytes(bytes: &mut [u8]) -> Result<&mut Self, ConcurrentMerkleTreeError> {
        let actual = bytes.len();
        check_layout_len::<MAX_DEPTH, MAX_BUFFER_SIZE>(actual)?;
        bytemuck::try_from_bytes_mut(bytes).map_err(|_err| {
            cmt_logging!("Failed to load tree bytes: {}", _err);
            ConcurrentMerkleTreeError::MalformedLayout {
                expected: size_of::<Self>(),
                actual,
            }
        })
    }

    /// Serializes the tree into its little-endian persisted layout
    pub fn encode(&self) -> Vec<u8> {
        bytemuck::bytes_of(self).to_vec()
    }

    /// Deserializes a tree from bytes of any alignment
    pub fn decode(bytes: &[u8]) -> Result<Box<Self>, ConcurrentMerkleTreeError> {
        check_layout_len::<MAX_DEPTH, MAX_BUFFER_SIZE>(bytes.len())?;
        let mut tree = Self::new_boxed();
        bytemuck::bytes_of_mut(tree.as_mut()).copy_from_slice(bytes);
        Ok(tree)
    }
}

fn check_layout_len<const MAX_DEPTH: usize, const MAX_BUFFER_SIZE: usize>(
    actual: usize,
) -> Result<(), ConcurrentMerkleTreeError> {
    let expected = concurrent_merkle_tree_size(MAX_DEPTH, MAX_BUFFER_SIZE);
    if actual != expected {
        cmt_logging!("Expected {} tree bytes, received {}", expected, actual);
        return Err(ConcurrentMerkleTreeError::MalformedLayout { expected, actual });
    }
    Ok(())
}
