use thiserror::Error;

/// Failures of the binary frame layer. None of these are fatal: truncated
/// frames are dropped by the consumer, range errors reject a command before
/// any bytes are sent.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    #[error("frame truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    #[error("chunk ({i}, {j}) does not fit the one-byte wire index")]
    ChunkOutOfRange { i: i32, j: i32 },
    #[error("subscribe batch of {count} chunks exceeds the 255 per-frame limit")]
    BatchTooLarge { count: usize },
}
