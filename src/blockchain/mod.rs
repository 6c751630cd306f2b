//! The signed append-only blockchain of group membership and shared-key
//! changes (spec.md §4.C). Pure data and pure functions: no networking, no
//! I/O, no knowledge of epochs or verification words -- those live in
//! `epoch` and `verification` respectively.

mod builder;
mod kv_hash;
mod model;
mod state;
mod validate;

pub use builder::build_block;
pub use kv_hash::compute as compute_kv_hash;
pub use model::{
    Block, Change, GroupBroadcast, GroupParticipant, GroupSharedKey, GroupState, Permissions, StateProof, UserId,
};
pub use state::ChainState;
pub use validate::{bootstrap, validate_and_apply};
