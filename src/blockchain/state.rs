//! The chain's materialized state: the latest accepted height, its hash,
//! and the current group state / shared key (spec.md §4.C.1).

use std::sync::Arc;

use crate::crypto::Hash256;

use super::model::GroupSharedKey;
use super::model::GroupState;

/// A snapshot of the chain after the last accepted block.
///
/// `height == -1` and `last_block_hash == 0^32` denote "no blocks yet",
/// the state a chain is in immediately before genesis.
#[derive(Debug, Clone)]
pub struct ChainState {
    pub height: i32,
    pub last_block_hash: Hash256,
    pub group_state: Arc<GroupState>,
    pub shared_key: Option<Arc<GroupSharedKey>>,
}

impl ChainState {
    pub fn before_genesis() -> Self {
        ChainState {
            height: -1,
            last_block_hash: [0u8; 32],
            group_state: Arc::new(GroupState::default()),
            shared_key: None,
        }
    }
}
