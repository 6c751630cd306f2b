//! Block building (spec.md §4.C.2): propose a list of changes against a
//! known state and produce a signed, self-validating block.

use crate::crypto::{PrivateKey, Signature};
use crate::error::Result;

use super::kv_hash;
use super::model::{Block, Change, StateProof};
use super::state::ChainState;
use super::validate;

/// Builds and signs a block extending `state` with `changes`, then runs it
/// back through [`validate::validate_and_apply`] so the returned state is
/// guaranteed to be exactly what a remote peer would accept -- "propose
/// and adopt" in one step, matching spec.md §4.C.2 step 5.
pub fn build_block(state: &ChainState, signer: &PrivateKey, changes: Vec<Change>) -> Result<(Block, ChainState)> {
    let is_genesis = state.height == -1;

    let mut new_group_state = (*state.group_state).clone();
    let mut new_shared_key = state.shared_key.as_deref().cloned();
    let mut saw_set_group_state = false;
    let mut saw_set_shared_key = false;
    for change in &changes {
        match change {
            Change::SetGroupState { state: set_state } => {
                new_group_state = set_state.clone();
                saw_set_group_state = true;
            }
            Change::SetSharedKey { key } => {
                new_shared_key = Some(key.clone());
                saw_set_shared_key = true;
            }
            Change::NoOp { .. } | Change::SetValue { .. } => {}
        }
    }

    let state_proof = StateProof {
        kv_hash: kv_hash::compute(&changes),
        group_state: saw_set_group_state.then_some(new_group_state),
        shared_key: saw_set_shared_key.then_some(new_shared_key).flatten(),
    };

    let mut block = Block {
        signature: Signature::zero(),
        prev_block_hash: state.last_block_hash,
        changes,
        height: state.height + 1,
        state_proof,
        signature_public_key: is_genesis.then(|| signer.to_public_key()),
    };
    block.signature = signer.sign(&block.signing_bytes())?;

    let new_state = validate::validate_and_apply(state, &block)?;
    Ok((block, new_state))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blockchain::model::{GroupParticipant, GroupState, Permissions};

    #[test]
    fn builds_genesis_and_revalidates() {
        let sk = PrivateKey::from_bytes([4u8; 32]);
        let group_state = GroupState {
            participants: vec![GroupParticipant {
                user_id: 1,
                public_key: sk.to_public_key(),
                permissions: Permissions {
                    add_users: true,
                    remove_users: true,
                },
                version: 0,
            }],
            external_permissions: 0,
        };
        let before = ChainState::before_genesis();
        let (block, new_state) = build_block(
            &before,
            &sk,
            vec![Change::SetGroupState { state: group_state.clone() }],
        )
        .unwrap();
        assert_eq!(block.height, 0);
        assert_eq!(new_state.height, 0);
        assert_eq!(*new_state.group_state, group_state);

        let replayed = validate::validate_and_apply(&before, &block).unwrap();
        assert_eq!(replayed.last_block_hash, new_state.last_block_hash);
    }

    #[test]
    fn builds_follow_on_block_with_rotation() {
        let sk = PrivateKey::from_bytes([5u8; 32]);
        let group_state = GroupState {
            participants: vec![GroupParticipant {
                user_id: 1,
                public_key: sk.to_public_key(),
                permissions: Permissions {
                    add_users: true,
                    remove_users: true,
                },
                version: 0,
            }],
            external_permissions: 0,
        };
        let (_genesis_block, genesis_state) = build_block(
            &ChainState::before_genesis(),
            &sk,
            vec![Change::SetGroupState { state: group_state.clone() }],
        )
        .unwrap();

        let shared_key = super::super::model::GroupSharedKey {
            ek: sk.to_public_key(),
            encrypted_shared_key: vec![1, 2, 3],
            dest_user_id: vec![1],
            dest_header: vec![vec![0u8; 32]],
        };
        let (block, new_state) = build_block(
            &genesis_state,
            &sk,
            vec![Change::SetSharedKey { key: shared_key.clone() }],
        )
        .unwrap();
        assert_eq!(block.height, 1);
        assert_eq!(new_state.shared_key.as_deref(), Some(&shared_key));
    }
}
