//! State needed to manipulate concurrent merkle tree accounts
mod concurrent_merkle_tree_header;
mod path_node;

pub use concurrent_merkle_tree_header::{
    merkle_tree_get_size, CompressionAccountType, ConcurrentMerkleTreeHeader,
    ConcurrentMerkleTreeHeaderData, ConcurrentMerkleTreeHeaderDataV1,
    CONCURRENT_MERKLE_TREE_HEADER_SIZE_V1,
};
pub use path_node::PathNode;
