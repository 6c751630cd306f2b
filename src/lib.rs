//! End-to-end encrypted group call core: a signed append-only blockchain
//! of group membership and shared-key changes, per-epoch authenticated
//! payload encryption, and a commit/reveal verification-word protocol.
//!
//! [`Call`] is the facade most embedders drive directly: build a genesis
//! block with [`create_zero_block`], add a second participant with
//! [`create_self_add_block`], then construct a live `Call` from whichever
//! block is currently latest with [`Call::create`].
//!
//! This crate owns no transport, no signaling, and no threading model
//! (spec.md §1, §5): it is driven synchronously, single-threaded per call,
//! by an embedder that serializes access and ships the serialized blocks
//! and verification broadcasts over its own channel.

pub mod blockchain;
mod call;
pub mod config;
pub mod crypto;
mod epoch;
pub mod error;
pub mod message_encryption;
pub mod verification;
mod wire;

pub use call::{create_self_add_block, create_zero_block, Call, CallVerificationState, CallVerificationWords};
pub use config::CallConfig;
pub use error::{Error, Result};
