use thiserror::Error;

/// Protocol-domain failures surfaced by the channel primitives core.
///
/// The core never logs, retries, or swallows an error: every variant here
/// is meant to propagate to the caller unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("lightning peer connection closed")]
    LightningPeerConnectionClosed,

    #[error("unable to derive secret for requested index")]
    UnableToDeriveSecret,

    #[error("noise handshake failed")]
    HandshakeFailed,

    #[error("payment failed")]
    PaymentFailure,

    #[error("fulfill arrived for unknown payment hash")]
    UnknownPaymentHash,

    #[error("malformed connect string: {0}")]
    ConnStringFormatError(String),

    #[error("malformed persisted record: {0}")]
    PersistedFormError(String),

    #[error("shachain insertion mismatch at bucket {bucket}")]
    ShachainInsertionMismatch { bucket: usize },

    #[error("secp256k1 tweak produced an invalid key")]
    InvalidTweak,

    #[error("duplicate payment hash within a single commitment")]
    DuplicatePaymentHash,

    #[error("short channel id component out of range")]
    ShortChannelIdOutOfRange,

    #[error("htlc amount too small to cover its second-stage transaction fee")]
    HtlcValueTooSmallForFee,
}
