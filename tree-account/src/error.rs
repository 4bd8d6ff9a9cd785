use {concurrent_merkle_tree::error::ConcurrentMerkleTreeError, thiserror::Error};

/// Errors related to misconfiguration or misuse of a tree account
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TreeAccountError {
    /// A modification to the tree was invalid and a changelog was not emitted.
    /// The proof may be invalid or out-of-date, or the provided leaf hash was invalid.
    #[error("Concurrent merkle tree error: {0}")]
    ConcurrentMerkleTree(#[from] ConcurrentMerkleTreeError),

    /// See [ConcurrentMerkleTreeHeader](crate::state::ConcurrentMerkleTreeHeader) for valid
    /// configuration options.
    #[error("An unsupported max depth or max buffer size constant was provided")]
    ConcurrentMerkleTreeConstantsError,

    /// When using Canopy, the stored byte length should a multiple of the node's byte length (32 bytes)
    #[error("Expected a different byte length for the merkle tree canopy")]
    CanopyLengthMismatch,

    #[error("Account provided has incorrect account type")]
    IncorrectAccountType,

    /// Tree information cannot be processed because the provided leaf_index
    /// is out of bounds of tree's maximum leaf capacity
    #[error("Leaf index of concurrent merkle tree is out of bounds")]
    LeafIndexOutOfBounds,

    /// The account is too small to hold the header and the tree it describes
    #[error("Account holds {actual} bytes, expected at least {expected}")]
    AccountSizeMismatch { expected: usize, actual: usize },

    #[error("Header could not be (de)serialized: {0}")]
    HeaderSerialization(String),

    #[error("Tree was already initialized")]
    TreeAlreadyInitialized,

    /// Batch operations require `PrepareBatchMerkleTree` to have run first
    #[error("Tree header was not initialized for batch processing")]
    BatchNotInitialized,

    /// The canopy root (hash of its two top nodes) does not match the supplied root
    #[error("Canopy root does not match the root of the tree")]
    CanopyRootMismatch,

    /// The canopy contains non-empty nodes to the right of the rightmost leaf
    #[error("Canopy contains nodes to the right of the rightmost leaf of the tree")]
    CanopyRightmostLeafMismatch,
}

impl From<std::io::Error> for TreeAccountError {
    fn from(error: std::io::Error) -> Self {
        TreeAccountError::HeaderSerialization(error.to_string())
    }
}
