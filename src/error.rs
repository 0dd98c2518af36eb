//! Error types for the Clay erasure code engine

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running the codec
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Parameter Validation Errors
    // =========================================================================
    /// k (data chunk count) out of range
    #[error("k must be at least 2, got {0}")]
    InvalidK(usize),

    /// m (parity chunk count) out of range
    #[error("m must be at least 1, got {0}")]
    InvalidM(usize),

    /// d (repair helper count) out of range
    #[error("d must be within [{min}, {max}], got {d}")]
    InvalidD { d: usize, min: usize, max: usize },

    /// Code does not fit in GF(2^8)
    #[error("code too large: {nodes} logical nodes exceed the field limit of {max}")]
    CodeTooLarge { nodes: usize, max: usize },

    // =========================================================================
    // Input Validation Errors
    // =========================================================================
    /// Generic malformed input (bad index, overlap, missing chunk, ...)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Chunk size is not a multiple of the sub-chunk count
    #[error("chunk size {size} is not divisible by {alpha} sub-chunks")]
    InvalidChunkSize { size: usize, alpha: usize },

    /// Two supplied chunks disagree on size
    #[error("inconsistent chunk sizes: chunk {index} is {actual} bytes, expected {expected}")]
    InconsistentChunkSizes {
        index: usize,
        expected: usize,
        actual: usize,
    },

    // =========================================================================
    // Decode / Repair Errors
    // =========================================================================
    /// Not enough surviving chunks to decode
    #[error("insufficient chunks: have {available}, need {required}")]
    InsufficientChunks { available: usize, required: usize },

    /// Erasure pattern violates the y-section repair rules
    #[error("erasure pattern is not repairable: {0}")]
    UnrepairablePattern(String),

    /// Pair codec received a contradictory or unsolvable role assignment
    #[error("pair codec received a singular role assignment: {0}")]
    Singular(String),

    /// Propagated failure from the scalar MDS codec
    #[error("scalar MDS failure: {0}")]
    ScalarMds(String),

    /// Buffer allocation failed
    #[error("failed to allocate {size} byte buffer")]
    AllocationFailed { size: usize },
}
