//! Typed errors for every fallible entry point in the crate (spec.md §7).
//!
//! Block validation and payload-encryption errors are surfaced to the
//! caller as-is. The verification chain (`verification` module) never
//! propagates an `Error` out of `receive_broadcast`; it logs one via
//! `tracing` and drops the offending broadcast instead, per spec.md §4.D.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // --- wire / parsing ---
    #[error("malformed TL data: {0}")]
    ParseError(&'static str),

    // --- block validation (§4.C.1) ---
    #[error("block height mismatch: expected {expected}, got {actual}")]
    HeightMismatch { expected: i32, actual: i32 },
    #[error("block hash mismatch with previous block")]
    HashMismatch,
    #[error("state proof does not match recomputed state")]
    StateProofMismatch,
    #[error("signer lacks permission for this change")]
    PermissionDenied,
    #[error("signer is not a member of the group state")]
    UnknownSigner,
    #[error("signature verification failed")]
    BadSignature,
    #[error("malformed change: {0}")]
    MalformedChange(&'static str),
    #[error("duplicate participant in group state")]
    DuplicateParticipant,

    // --- payload encryption (§4.E.1 / §4.B) ---
    #[error("no encryptor known for this epoch")]
    UnknownEpoch,
    #[error("sequence number already seen")]
    Replayed,
    #[error("sequence number older than the replay window")]
    TooOld,
    #[error("per-sender sequence number overflowed")]
    SeqnoOverflow,
    #[error("MAC mismatch while decrypting")]
    MacMismatch,
    #[error("invalid ciphertext length")]
    InvalidLength,
    #[error("invalid padding")]
    InvalidPadding,
    #[error("unknown sender user id")]
    UnknownSender,

    // --- verification chain (§4.D) ---
    #[error("revealed nonce does not hash to the committed value")]
    NonceHashMismatch,
    #[error("duplicate broadcast from the same signer")]
    DuplicateBroadcast,
    #[error("broadcast signer is not a participant")]
    UnknownBroadcastSigner,
    #[error("broadcast received in the wrong verification state")]
    WrongVerificationState,
    #[error("delayed-broadcast height is too far in the future")]
    BroadcastHeightTooFarAhead,

    // --- crypto primitives (§4.A) ---
    #[error("cryptographic primitive failed: {0}")]
    CryptoFailure(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
