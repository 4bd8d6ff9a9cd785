use thiserror::Error;

/// Concurrent merkle tree operation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConcurrentMerkleTreeError {
    /// Received an index larger than the rightmost index, or larger than
    /// `(1 << MAX_DEPTH) - 1`
    #[error("Received an index larger than the rightmost index")]
    LeafIndexOutOfBounds,

    /// Invalid root recomputed from proof
    #[error("Invalid root recomputed from proof")]
    InvalidProof,

    /// Node to append cannot be empty
    #[error("Cannot append an empty node")]
    CannotAppendEmptyNode,

    /// The tree is at capacity
    #[error("Tree is full, cannot append")]
    TreeFull,

    /// This tree has already been initialized
    #[error("Tree already initialized")]
    TreeAlreadyInitialized,

    /// This tree has not yet been initialized
    #[error("Tree needs to be initialized before using")]
    TreeNotInitialized,

    /// Root passed as argument cannot be found in stored changelog buffer.
    /// The proof is older than the buffer window; fetch a fresh one and retry.
    #[error("Root not found in changelog buffer")]
    RootNotFound,

    /// Valid proof was passed to a leaf, but the leaf was written since the
    /// proof was issued
    #[error(
        "Valid proof was passed to a leaf, but its value has changed since the proof was issued"
    )]
    LeafContentsModified,

    /// Tree has at least 1 non-EMPTY leaf
    #[error("Tree is not empty")]
    TreeNonEmpty,

    /// Byte length does not match the layout implied by the tree parameters
    #[error("Expected {expected} bytes for the tree layout, received {actual}")]
    MalformedLayout {
        /// Size implied by `MAX_DEPTH` and `MAX_BUFFER_SIZE`
        expected: usize,
        /// Length of the bytes that were provided
        actual: usize,
    },
}
