use {
    crate::error::TreeAccountError,
    borsh::{BorshDeserialize, BorshSerialize},
    concurrent_merkle_tree::concurrent_merkle_tree::ConcurrentMerkleTree,
    std::mem::size_of,
};

/// Serialized size of [ConcurrentMerkleTreeHeader]. Tree bytes start at this
/// offset, which keeps them 8-byte aligned within an aligned account.
pub const CONCURRENT_MERKLE_TREE_HEADER_SIZE_V1: usize = 2 + 54;

#[derive(Debug, Copy, Clone, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
#[repr(u8)]
pub enum CompressionAccountType {
    /// Uninitialized
    Uninitialized,

    /// Concurrent Merkle Tree data
    ConcurrentMerkleTree,
}

impl std::fmt::Display for CompressionAccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", &self)
    }
}

/// Initialization parameters for a concurrent merkle tree account.
///
/// Only the following permutations are valid:
///
/// | max_depth | max_buffer_size            |
/// | --------- | -------------------------- |
/// | 3         | (8)                        |
/// | 5         | (8)                        |
/// | 14        | (64, 256, 1024, 2048)      |
/// | 15-19     | (64)                       |
/// | 20        | (64, 256, 1024, 2048)      |
/// | 24        | (64, 256, 512, 1024, 2048) |
/// | 26        | (512, 1024, 2048)          |
/// | 30        | (512, 1024, 2048)          |
#[derive(Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
#[repr(C)]
pub struct ConcurrentMerkleTreeHeader {
    /// Account type
    pub account_type: CompressionAccountType,
    /// Versioned header
    pub header: ConcurrentMerkleTreeHeaderData,
}

#[derive(Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
#[repr(C)]
pub struct ConcurrentMerkleTreeHeaderDataV1 {
    /// Buffer of changelogs stored alongside the tree.
    /// Must be a power of 2; see above table for valid combinations.
    max_buffer_size: u32,

    /// Depth of the concurrent merkle tree to store.
    /// Tree capacity can be calculated as power(2, max_depth).
    /// See above table for valid options.
    max_depth: u32,

    /// Slot corresponding to when the Merkle tree was created.
    /// Provides a lower-bound on what slot to start (re-)building a tree from.
    creation_slot: u64,

    /// A flag indicating whether the tree has been initialized with a root.
    /// This field was added together with the `finalize_tree_with_root` instruction.
    /// It takes 1 byte of space taken from the previous padding for existing accounts.
    is_batch_initialized: bool,

    /// Needs padding for the account to be 8-byte aligned
    /// 8-byte alignment is necessary to zero-copy the tree
    _padding: [u8; 37],
}

#[derive(Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
#[repr(C)]
pub enum ConcurrentMerkleTreeHeaderData {
    V1(ConcurrentMerkleTreeHeaderDataV1),
}

impl Default for ConcurrentMerkleTreeHeader {
    fn default() -> Self {
        Self {
            account_type: CompressionAccountType::Uninitialized,
            header: ConcurrentMerkleTreeHeaderData::V1(ConcurrentMerkleTreeHeaderDataV1 {
                max_buffer_size: 0,
                max_depth: 0,
                creation_slot: 0,
                is_batch_initialized: false,
                _padding: [0; 37],
            }),
        }
    }
}

impl ConcurrentMerkleTreeHeader {
    pub fn initialize(
        &mut self,
        max_depth: u32,
        max_buffer_size: u32,
        creation_slot: u64,
    ) -> Result<(), TreeAccountError> {
        if self.account_type != CompressionAccountType::Uninitialized {
            log::warn!("Header is already initialized as {}", self.account_type);
            return Err(TreeAccountError::TreeAlreadyInitialized);
        }
        self.account_type = CompressionAccountType::ConcurrentMerkleTree;

        match self.header {
            ConcurrentMerkleTreeHeaderData::V1(ref mut header) => {
                header.max_buffer_size = max_buffer_size;
                header.max_depth = max_depth;
                header.creation_slot = creation_slot;
                // is_batch_initialized is left false by default
            }
        }
        Ok(())
    }

    /// Initializes the header with the given parameters and sets the `is_batch_initialized` flag to
    /// true.
    pub fn initialize_batched(
        &mut self,
        max_depth: u32,
        max_buffer_size: u32,
        creation_slot: u64,
    ) -> Result<(), TreeAccountError> {
        self.initialize(max_depth, max_buffer_size, creation_slot)?;
        match self.header {
            ConcurrentMerkleTreeHeaderData::V1(ref mut header) => {
                header.is_batch_initialized = true;
            }
        }
        Ok(())
    }

    pub fn get_max_depth(&self) -> u32 {
        match &self.header {
            ConcurrentMerkleTreeHeaderData::V1(header) => header.max_depth,
        }
    }

    pub fn get_max_buffer_size(&self) -> u32 {
        match &self.header {
            ConcurrentMerkleTreeHeaderData::V1(header) => header.max_buffer_size,
        }
    }

    pub fn get_creation_slot(&self) -> u64 {
        match &self.header {
            ConcurrentMerkleTreeHeaderData::V1(header) => header.creation_slot,
        }
    }

    pub fn get_is_batch_initialized(&self) -> bool {
        match &self.header {
            ConcurrentMerkleTreeHeaderData::V1(header) => header.is_batch_initialized,
        }
    }

    pub fn assert_valid(&self) -> Result<(), TreeAccountError> {
        if self.account_type != CompressionAccountType::ConcurrentMerkleTree {
            log::warn!(
                "Expected account type {}, found {}",
                CompressionAccountType::ConcurrentMerkleTree,
                self.account_type
            );
            return Err(TreeAccountError::IncorrectAccountType);
        }
        Ok(())
    }

    pub fn assert_valid_leaf_index(&self, leaf_index: u32) -> Result<(), TreeAccountError> {
        // Trees are at most 30 levels deep
        if self.get_max_depth() > 30 {
            log::warn!("Unsupported max depth {}", self.get_max_depth());
            return Err(TreeAccountError::ConcurrentMerkleTreeConstantsError);
        }
        if leaf_index >= (1 << self.get_max_depth()) {
            log::warn!(
                "Leaf index {} exceeds capacity of a depth {} tree",
                leaf_index,
                self.get_max_depth()
            );
            return Err(TreeAccountError::LeafIndexOutOfBounds);
        }
        Ok(())
    }

    pub fn assert_is_batch_initialized(&self) -> Result<(), TreeAccountError> {
        if !self.get_is_batch_initialized() {
            return Err(TreeAccountError::BatchNotInitialized);
        }
        Ok(())
    }

    /// Reads the header from the front of `account_bytes`
    pub fn load(account_bytes: &[u8]) -> Result<Self, TreeAccountError> {
        if account_bytes.len() < CONCURRENT_MERKLE_TREE_HEADER_SIZE_V1 {
            return Err(TreeAccountError::AccountSizeMismatch {
                expected: CONCURRENT_MERKLE_TREE_HEADER_SIZE_V1,
                actual: account_bytes.len(),
            });
        }
        Ok(Self::try_from_slice(
            &account_bytes[..CONCURRENT_MERKLE_TREE_HEADER_SIZE_V1],
        )?)
    }

    /// Writes the header into the front of `header_bytes`
    pub fn store(&self, mut header_bytes: &mut [u8]) -> Result<(), TreeAccountError> {
        self.serialize(&mut header_bytes)?;
        Ok(())
    }
}

macro_rules! tree_size_table {
    ($max_depth:expr, $max_buffer_size:expr, $(($depth:literal, $size:literal)),* $(,)?) => {
        match ($max_depth, $max_buffer_size) {
            $(($depth, $size) => Ok(size_of::<ConcurrentMerkleTree<$depth, $size>>()),)*
            _ => {
                log::warn!(
                    "Unsupported tree shape: max depth {}, max buffer size {}",
                    $max_depth,
                    $max_buffer_size
                );
                Err(TreeAccountError::ConcurrentMerkleTreeConstantsError)
            }
        }
    };
}

/// Number of tree bytes following the header, for the shape it describes
pub fn merkle_tree_get_size(
    header: &ConcurrentMerkleTreeHeader,
) -> Result<usize, TreeAccountError> {
    // Note: max_buffer_size MUST be a power of 2
    tree_size_table!(
        header.get_max_depth(),
        header.get_max_buffer_size(),
        (3, 8),
        (5, 8),
        (14, 64),
        (14, 256),
        (14, 1024),
        (14, 2048),
        (15, 64),
        (16, 64),
        (17, 64),
        (18, 64),
        (19, 64),
        (20, 64),
        (20, 256),
        (20, 1024),
        (20, 2048),
        (24, 64),
        (24, 256),
        (24, 512),
        (24, 1024),
        (24, 2048),
        (26, 512),
        (26, 1024),
        (26, 2048),
        (30, 512),
        (30, 1024),
        (30, 2048),
    )
}
