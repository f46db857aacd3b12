//! Error taxonomy for the beam search engine.
//!
//! Every call to [`crate::driver::BeamSearchDecoder::execute`] is a single
//! attempt: errors are final, no retries happen, and no partial outputs are
//! ever emitted on failure.

use thiserror::Error;

/// All errors the engine can surface.
#[derive(Error, Debug)]
pub enum BeamSearchError {
    /// A shape or arity violation on the supplied parameters, e.g.
    /// `num_return_sequences > num_beams` or a `vocab_mask` length mismatch.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The supplied `Subgraph` reported a logits dtype other than 32-bit
    /// float; only `f32` decoding is implemented.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The subgraph executor failed. Propagated unmodified from candle.
    #[error("subgraph failure: {0}")]
    SubgraphFailure(#[from] candle_core::Error),

    /// A scratch allocation was refused.
    #[error("allocator failure: {0}")]
    AllocatorFailure(String),

    /// The caller's terminate flag was observed mid-decode.
    #[error("decoding canceled")]
    Canceled,
}

pub type Result<T> = std::result::Result<T, BeamSearchError>;
