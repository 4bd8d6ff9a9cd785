use {
    crate::state::PathNode,
    borsh::{BorshDeserialize, BorshSerialize},
    concurrent_merkle_tree::changelog::ChangeLog,
};

#[derive(BorshDeserialize, BorshSerialize, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub enum ChangeLogEvent {
    V1(ChangeLogEventV1),
}

#[derive(BorshDeserialize, BorshSerialize, Clone, Debug, PartialEq, Eq)]
pub struct ChangeLogEventV1 {
    /// Identifier of the tree account
    pub id: [u8; 32],

    /// Nodes of off-chain merkle tree needed by indexer, leaf first, root last
    pub path: Vec<PathNode>,

    /// Index corresponding to the number of successful operations on this tree.
    /// Used by the off-chain indexer to figure out when there are gaps to be backfilled.
    pub seq: u64,

    /// Bitmap of node parity (used when hashing)
    pub index: u32,
}

impl ChangeLogEvent {
    pub fn new(id: [u8; 32], path: Vec<PathNode>, seq: u64, index: u32) -> Self {
        Self::V1(ChangeLogEventV1 {
            id,
            path,
            seq,
            index,
        })
    }

    /// Root of the tree after the logged mutation
    pub fn root(&self) -> [u8; 32] {
        match self {
            ChangeLogEvent::V1(event) => event.path.last().map(|n| n.node).unwrap_or_default(),
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            ChangeLogEvent::V1(event) => event.seq,
        }
    }
}

impl<const MAX_DEPTH: usize> From<(Box<ChangeLog<MAX_DEPTH>>, [u8; 32], u64)>
    for Box<ChangeLogEvent>
{
    fn from(log_info: (Box<ChangeLog<MAX_DEPTH>>, [u8; 32], u64)) -> Self {
        let (changelog, tree_id, seq) = log_info;
        let path_len = changelog.path.len() as u32;
        let mut path: Vec<PathNode> = changelog
            .path
            .iter()
            .enumerate()
            .map(|(lvl, n)| {
                PathNode::new(
                    *n,
                    (1 << (path_len - lvl as u32)) + (changelog.index >> lvl),
                )
            })
            .collect();
        path.push(PathNode::new(changelog.root, 1));
        Box::new(ChangeLogEvent::new(tree_id, path, seq, changelog.index))
    }
}
