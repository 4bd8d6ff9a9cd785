#![allow(clippy::arithmetic_side_effects)]
use {
    borsh::BorshDeserialize,
    bytemuck::cast_slice_mut,
    merkle_tree_reference::MerkleTree,
    rand::{thread_rng, Rng},
    std::sync::Arc,
    tokio::sync::Mutex,
    tree_account::{
        account_size, canopy::get_cached_node, process_operation,
        state::{ConcurrentMerkleTreeHeader, CONCURRENT_MERKLE_TREE_HEADER_SIZE_V1},
        ChangeLogEvent, ConcurrentMerkleTreeError, Node, TreeAccountError, TreeOperation,
    },
};

const TREE_ID: [u8; 32] = [7; 32];

/// Account data backed by `u64`s so the tree bytes are 8-byte aligned
struct TreeAccount {
    data: Vec<u64>,
    len: usize,
}

impl TreeAccount {
    fn new(max_depth: u32, max_buffer_size: u32, canopy_depth: u32) -> Self {
        let len = account_size(max_depth, max_buffer_size, canopy_depth);
        Self {
            data: vec![0; (len + 7) / 8],
            len,
        }
    }

    fn bytes(&mut self) -> &mut [u8] {
        &mut cast_slice_mut::<u64, u8>(&mut self.data)[..self.len]
    }

    fn canopy(&mut self) -> Vec<u8> {
        let tree_end = self.len - self.canopy_len();
        self.bytes()[tree_end..].to_vec()
    }

    fn canopy_len(&mut self) -> usize {
        let header = ConcurrentMerkleTreeHeader::load(self.bytes()).unwrap();
        let tree_size = tree_account::state::merkle_tree_get_size(&header).unwrap();
        self.len - CONCURRENT_MERKLE_TREE_HEADER_SIZE_V1 - tree_size
    }

    fn process(&mut self, op: &TreeOperation) -> Result<Option<ChangeLogEvent>, TreeAccountError> {
        process_operation(self.bytes(), TREE_ID, op)
    }
}

fn random_leaf() -> Node {
    let mut leaf: Node = thread_rng().gen();
    leaf[0] |= 1;
    leaf
}

/// Replays an event the way an indexer would, returning the new root
fn sync_indexer(reference_tree: &mut MerkleTree, event: &ChangeLogEvent) -> Node {
    let ChangeLogEvent::V1(event) = event;
    assert_eq!(event.id, TREE_ID);
    assert_eq!(event.path.len(), reference_tree.depth() + 1);
    let leaf = event.path[0];
    let leaf_index = leaf.index as usize - (1 << reference_tree.depth());
    assert_eq!(leaf_index, event.index as usize);
    reference_tree.add_leaf(leaf.node, leaf_index);
    event.path[event.path.len() - 1].node
}

fn init_empty(account: &mut TreeAccount, max_depth: u32, max_buffer_size: u32) -> ChangeLogEvent {
    account
        .process(&TreeOperation::InitEmptyMerkleTree {
            max_depth,
            max_buffer_size,
            creation_slot: 42,
        })
        .unwrap()
        .unwrap()
}

fn truncated_proof(reference_tree: &MerkleTree, index: usize, canopy_depth: usize) -> Vec<Node> {
    let mut proof = reference_tree.get_proof_of_leaf(index);
    proof.truncate(reference_tree.depth() - canopy_depth);
    proof
}

#[tokio::test(flavor = "multi_thread")]
async fn test_init_empty_merkle_tree() {
    let mut account = TreeAccount::new(14, 64, 0);
    let event = init_empty(&mut account, 14, 64);

    let reference_tree = MerkleTree::new_empty(14);
    assert_eq!(event.root(), reference_tree.get_root());
    assert_eq!(event.seq(), 0);

    let header = ConcurrentMerkleTreeHeader::load(account.bytes()).unwrap();
    header.assert_valid().unwrap();
    assert_eq!(header.get_max_depth(), 14);
    assert_eq!(header.get_max_buffer_size(), 64);
    assert_eq!(header.get_creation_slot(), 42);
    assert!(!header.get_is_batch_initialized());

    assert_eq!(
        account
            .process(&TreeOperation::InitEmptyMerkleTree {
                max_depth: 14,
                max_buffer_size: 64,
                creation_slot: 43,
            })
            .unwrap_err(),
        TreeAccountError::TreeAlreadyInitialized
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_corrupted_header_depth_is_rejected() {
    let mut data = vec![0_u64; 512];
    let account_bytes = cast_slice_mut::<u64, u8>(&mut data);
    let mut header = ConcurrentMerkleTreeHeader::default();
    header.initialize(40, 8, 0).unwrap();
    header.store(account_bytes).unwrap();
    let before = account_bytes.to_vec();

    let ops = [
        TreeOperation::ReplaceLeaf {
            root: [1; 32],
            previous_leaf: [2; 32],
            new_leaf: [3; 32],
            index: 0,
            proof: vec![],
        },
        TreeOperation::InsertOrAppend {
            root: [1; 32],
            leaf: [2; 32],
            index: 0,
            proof: vec![],
        },
        TreeOperation::VerifyLeaf {
            root: [1; 32],
            leaf: [2; 32],
            index: 0,
            proof: vec![],
        },
        TreeOperation::Append { leaf: [2; 32] },
    ];
    for op in &ops {
        assert_eq!(
            process_operation(account_bytes, TREE_ID, op).unwrap_err(),
            TreeAccountError::ConcurrentMerkleTreeConstantsError
        );
    }
    assert_eq!(account_bytes.to_vec(), before);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unsupported_shape_writes_nothing() {
    let mut account = TreeAccount::new(4, 8, 0);
    assert_eq!(
        account
            .process(&TreeOperation::InitEmptyMerkleTree {
                max_depth: 4,
                max_buffer_size: 8,
                creation_slot: 0,
            })
            .unwrap_err(),
        TreeAccountError::ConcurrentMerkleTreeConstantsError
    );
    assert!(account.bytes().iter().all(|&b| b == 0));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_operations_require_initialized_header() {
    let mut account = TreeAccount::new(3, 8, 0);
    assert_eq!(
        account
            .process(&TreeOperation::Append { leaf: [1; 32] })
            .unwrap_err(),
        TreeAccountError::IncorrectAccountType
    );
    assert_eq!(
        account.process(&TreeOperation::CloseEmptyTree).unwrap_err(),
        TreeAccountError::IncorrectAccountType
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_truncated_proofs_with_canopy() {
    const CANOPY_DEPTH: usize = 5;
    let mut account = TreeAccount::new(14, 64, CANOPY_DEPTH as u32);
    let mut reference_tree = MerkleTree::new_empty(14);
    init_empty(&mut account, 14, 64);

    for _ in 0..40 {
        let event = account
            .process(&TreeOperation::Append {
                leaf: random_leaf(),
            })
            .unwrap()
            .unwrap();
        assert_eq!(sync_indexer(&mut reference_tree, &event), reference_tree.get_root());
    }

    // The canopy caches the upper levels of the current tree
    let canopy = account.canopy();
    assert_eq!(
        get_cached_node(&canopy, 14, 1, 0).unwrap(),
        reference_tree.get_node(13, 0)
    );
    assert_eq!(
        get_cached_node(&canopy, 14, 5, 0).unwrap(),
        reference_tree.get_node(9, 0)
    );

    for index in [0, 17, 39] {
        let new_leaf = random_leaf();
        let event = account
            .process(&TreeOperation::ReplaceLeaf {
                root: reference_tree.get_root(),
                previous_leaf: reference_tree.get_leaf(index),
                new_leaf,
                index: index as u32,
                proof: truncated_proof(&reference_tree, index, CANOPY_DEPTH),
            })
            .unwrap()
            .unwrap();
        assert_eq!(sync_indexer(&mut reference_tree, &event), reference_tree.get_root());
    }

    assert_eq!(
        account
            .process(&TreeOperation::VerifyLeaf {
                root: reference_tree.get_root(),
                leaf: reference_tree.get_leaf(17),
                index: 17,
                proof: truncated_proof(&reference_tree, 17, CANOPY_DEPTH),
            })
            .unwrap(),
        None
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_verify_leaf_never_writes() {
    let mut account = TreeAccount::new(5, 8, 0);
    let mut reference_tree = MerkleTree::new_empty(5);
    init_empty(&mut account, 5, 8);
    for _ in 0..6 {
        let event = account
            .process(&TreeOperation::Append {
                leaf: random_leaf(),
            })
            .unwrap()
            .unwrap();
        sync_indexer(&mut reference_tree, &event);
    }
    let before = account.bytes().to_vec();

    let verify = |leaf: Node, index: usize| TreeOperation::VerifyLeaf {
        root: reference_tree.get_root(),
        leaf,
        index: index as u32,
        proof: reference_tree.get_proof_of_leaf(index),
    };
    account
        .process(&verify(reference_tree.get_leaf(3), 3))
        .unwrap();
    assert_eq!(
        account.process(&verify([9; 32], 3)).unwrap_err(),
        TreeAccountError::ConcurrentMerkleTree(ConcurrentMerkleTreeError::InvalidProof)
    );
    assert_eq!(
        account
            .process(&TreeOperation::VerifyLeaf {
                root: reference_tree.get_root(),
                leaf: EMPTY_LEAF,
                index: 1 << 5,
                proof: vec![],
            })
            .unwrap_err(),
        TreeAccountError::LeafIndexOutOfBounds
    );
    assert_eq!(account.bytes().to_vec(), before);
}

const EMPTY_LEAF: Node = [0; 32];

#[tokio::test(flavor = "multi_thread")]
async fn test_insert_or_append() {
    const CANOPY_DEPTH: usize = 2;
    let mut account = TreeAccount::new(5, 8, CANOPY_DEPTH as u32);
    let mut reference_tree = MerkleTree::new_empty(5);
    init_empty(&mut account, 5, 8);
    for _ in 0..4 {
        let event = account
            .process(&TreeOperation::Append {
                leaf: random_leaf(),
            })
            .unwrap()
            .unwrap();
        sync_indexer(&mut reference_tree, &event);
    }

    // Two writers race for the empty slot at index 4 against the same root
    let root = reference_tree.get_root();
    let proof = truncated_proof(&reference_tree, 4, CANOPY_DEPTH);
    let first = account
        .process(&TreeOperation::InsertOrAppend {
            root,
            leaf: [0xaa; 32],
            index: 4,
            proof: proof.clone(),
        })
        .unwrap()
        .unwrap();
    sync_indexer(&mut reference_tree, &first);
    let second = account
        .process(&TreeOperation::InsertOrAppend {
            root,
            leaf: [0xbb; 32],
            index: 4,
            proof,
        })
        .unwrap()
        .unwrap();
    let ChangeLogEvent::V1(second_v1) = &second;
    assert_eq!(second_v1.index, 5);
    assert_eq!(sync_indexer(&mut reference_tree, &second), reference_tree.get_root());
    assert_eq!(reference_tree.get_leaf(4), [0xaa; 32]);
    assert_eq!(reference_tree.get_leaf(5), [0xbb; 32]);

    // Past the frontier the leaf lands on the next free index
    let appended = account
        .process(&TreeOperation::InsertOrAppend {
            root: reference_tree.get_root(),
            leaf: [0xcc; 32],
            index: 20,
            proof: vec![],
        })
        .unwrap()
        .unwrap();
    let ChangeLogEvent::V1(appended_v1) = &appended;
    assert_eq!(appended_v1.index, 6);
    assert_eq!(sync_indexer(&mut reference_tree, &appended), reference_tree.get_root());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_writers_share_a_root() {
    const WRITERS: usize = 32;
    let mut account = TreeAccount::new(14, 64, 3);
    let mut reference_tree = MerkleTree::new_empty(14);
    init_empty(&mut account, 14, 64);
    for _ in 0..WRITERS {
        let event = account
            .process(&TreeOperation::Append {
                leaf: random_leaf(),
            })
            .unwrap()
            .unwrap();
        sync_indexer(&mut reference_tree, &event);
    }

    // Every writer fetched its proof from the same snapshot
    let snapshot = Arc::new(reference_tree.clone());
    let account = Arc::new(Mutex::new(account));
    let mut handles = vec![];
    for index in 0..WRITERS {
        let snapshot = snapshot.clone();
        let account = account.clone();
        handles.push(tokio::spawn(async move {
            let new_leaf = random_leaf();
            let op = TreeOperation::ReplaceLeaf {
                root: snapshot.get_root(),
                previous_leaf: snapshot.get_leaf(index),
                new_leaf,
                index: index as u32,
                proof: truncated_proof(&snapshot, index, 3),
            };
            // Operations travel serialized
            let op = TreeOperation::try_from_slice(&borsh::to_vec(&op).unwrap()).unwrap();
            let event = account.lock().await.process(&op).unwrap().unwrap();
            borsh::to_vec(&event).unwrap()
        }));
    }

    let mut events = vec![];
    for handle in handles {
        let event_bytes = handle.await.unwrap();
        events.push(ChangeLogEvent::try_from_slice(&event_bytes).unwrap());
    }
    events.sort_by_key(|event| event.seq());
    let mut root = snapshot.get_root();
    for event in &events {
        root = sync_indexer(&mut reference_tree, event);
    }
    assert_eq!(root, reference_tree.get_root());
    assert_eq!(events.last().unwrap().seq(), 2 * WRITERS as u64);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_initialization() {
    const MAX_DEPTH: usize = 14;
    const CANOPY_DEPTH: usize = 5;
    const NUM_LEAVES: usize = 1100;
    let mut reference_tree = MerkleTree::new_empty(MAX_DEPTH);
    for index in 0..NUM_LEAVES {
        reference_tree.add_leaf(random_leaf(), index);
    }
    let mut account = TreeAccount::new(MAX_DEPTH as u32, 64, CANOPY_DEPTH as u32);

    assert_eq!(
        account
            .process(&TreeOperation::AppendCanopyNodes {
                start_index: 0,
                canopy_nodes: vec![[1; 32]],
            })
            .unwrap_err(),
        TreeAccountError::IncorrectAccountType
    );
    assert_eq!(
        account
            .process(&TreeOperation::PrepareBatchMerkleTree {
                max_depth: MAX_DEPTH as u32,
                max_buffer_size: 64,
                creation_slot: 1,
            })
            .unwrap(),
        None
    );
    let header = ConcurrentMerkleTreeHeader::load(account.bytes()).unwrap();
    assert!(header.get_is_batch_initialized());

    // Canopy leaves cover 2^9 leaves each, only the first three hold data
    let canopy_level = MAX_DEPTH - CANOPY_DEPTH;
    let canopy_leaves: Vec<Node> = (0..3)
        .map(|position| reference_tree.get_node(canopy_level, position))
        .collect();
    account
        .process(&TreeOperation::AppendCanopyNodes {
            start_index: 0,
            canopy_nodes: canopy_leaves[..2].to_vec(),
        })
        .unwrap();
    account
        .process(&TreeOperation::AppendCanopyNodes {
            start_index: 2,
            canopy_nodes: canopy_leaves[2..].to_vec(),
        })
        .unwrap();

    let rightmost_index = NUM_LEAVES - 1;
    let init = |root: Node| TreeOperation::InitPreparedTreeWithRoot {
        root,
        rightmost_leaf: reference_tree.get_leaf(rightmost_index),
        rightmost_index: rightmost_index as u32,
        proof: truncated_proof(&reference_tree, rightmost_index, CANOPY_DEPTH),
    };
    assert_eq!(
        account.process(&init([3; 32])).unwrap_err(),
        TreeAccountError::CanopyRootMismatch
    );
    let event = account
        .process(&init(reference_tree.get_root()))
        .unwrap()
        .unwrap();
    assert_eq!(event.root(), reference_tree.get_root());
    assert_eq!(event.seq(), 0);

    assert_eq!(
        account
            .process(&init(reference_tree.get_root()))
            .unwrap_err(),
        TreeAccountError::TreeAlreadyInitialized
    );
    assert_eq!(
        account
            .process(&TreeOperation::AppendCanopyNodes {
                start_index: 0,
                canopy_nodes: canopy_leaves.clone(),
            })
            .unwrap_err(),
        TreeAccountError::TreeAlreadyInitialized
    );

    // The tree keeps working from the supplied root
    let event = account
        .process(&TreeOperation::Append {
            leaf: random_leaf(),
        })
        .unwrap()
        .unwrap();
    assert_eq!(sync_indexer(&mut reference_tree, &event), reference_tree.get_root());
    let event = account
        .process(&TreeOperation::ReplaceLeaf {
            root: reference_tree.get_root(),
            previous_leaf: reference_tree.get_leaf(5),
            new_leaf: random_leaf(),
            index: 5,
            proof: truncated_proof(&reference_tree, 5, CANOPY_DEPTH),
        })
        .unwrap()
        .unwrap();
    assert_eq!(sync_indexer(&mut reference_tree, &event), reference_tree.get_root());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_canopy_must_end_at_rightmost_leaf() {
    let mut reference_tree = MerkleTree::new_empty(5);
    for index in 0..20 {
        reference_tree.add_leaf(random_leaf(), index);
    }
    let mut account = TreeAccount::new(5, 8, 2);
    account
        .process(&TreeOperation::PrepareBatchMerkleTree {
            max_depth: 5,
            max_buffer_size: 8,
            creation_slot: 0,
        })
        .unwrap();
    let canopy_leaves: Vec<Node> = (0..4).map(|p| reference_tree.get_node(3, p)).collect();
    account
        .process(&TreeOperation::AppendCanopyNodes {
            start_index: 0,
            canopy_nodes: canopy_leaves,
        })
        .unwrap();

    // Index 7 sits in the first canopy leaf, the second one is not empty
    assert_eq!(
        account
            .process(&TreeOperation::InitPreparedTreeWithRoot {
                root: reference_tree.get_root(),
                rightmost_leaf: reference_tree.get_leaf(7),
                rightmost_index: 7,
                proof: truncated_proof(&reference_tree, 7, 2),
            })
            .unwrap_err(),
        TreeAccountError::CanopyRightmostLeafMismatch
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_append_canopy_nodes_requires_batch_tree() {
    let mut account = TreeAccount::new(5, 8, 2);
    init_empty(&mut account, 5, 8);
    assert_eq!(
        account
            .process(&TreeOperation::AppendCanopyNodes {
                start_index: 0,
                canopy_nodes: vec![[1; 32]],
            })
            .unwrap_err(),
        TreeAccountError::BatchNotInitialized
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_empty_tree() {
    let mut account = TreeAccount::new(3, 8, 1);
    init_empty(&mut account, 3, 8);
    account
        .process(&TreeOperation::Append { leaf: [1; 32] })
        .unwrap();
    let before = account.bytes().to_vec();
    assert_eq!(
        account.process(&TreeOperation::CloseEmptyTree).unwrap_err(),
        TreeAccountError::ConcurrentMerkleTree(ConcurrentMerkleTreeError::TreeNonEmpty)
    );
    assert_eq!(account.bytes().to_vec(), before);

    let mut account = TreeAccount::new(3, 8, 1);
    init_empty(&mut account, 3, 8);
    assert_eq!(account.process(&TreeOperation::CloseEmptyTree).unwrap(), None);
    assert!(account.bytes().iter().all(|&b| b == 0));

    // A prepared tree that was never finalized is empty too
    let mut account = TreeAccount::new(3, 8, 1);
    account
        .process(&TreeOperation::PrepareBatchMerkleTree {
            max_depth: 3,
            max_buffer_size: 8,
            creation_slot: 0,
        })
        .unwrap();
    account.process(&TreeOperation::CloseEmptyTree).unwrap();
    assert!(account.bytes().iter().all(|&b| b == 0));

    // Closed accounts can be reused
    init_empty(&mut account, 3, 8);
}
