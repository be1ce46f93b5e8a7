use thiserror::Error;

/// Errors surfaced by the receiver and its parts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReceiverError {
    /// A submitted SPS or PPS was empty or longer than the configured limit.
    /// The gate stays pending.
    #[error("invalid {kind} parameter set (length {len})")]
    InvalidParameter { kind: &'static str, len: usize },

    /// The decoder side returned no input buffers when the codec config was
    /// applied. Fatal.
    #[error("decoder provided no input buffers")]
    NoDecoderBuffers,

    /// An access unit arrived before the codec config gate fired. Fatal.
    #[error("access unit received before codec configuration")]
    NotConfigured,

    /// Release of an out-of-range or already free slot. The ledger is left
    /// untouched.
    #[error("invalid slot {index}: {reason}")]
    InvalidSlot { index: usize, reason: &'static str },

    /// Parameter sets that differ from the applied ones. A renegotiated
    /// stream needs a new receiver.
    #[error("codec configuration already applied")]
    AlreadyConfigured,
}

impl ReceiverError {
    /// Fatal errors move the receiver to `Halted`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReceiverError::NoDecoderBuffers | ReceiverError::NotConfigured)
    }
}
