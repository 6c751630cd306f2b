//! Block validation (spec.md §4.C.1, steps 1-7).

use std::sync::Arc;

use crate::crypto::{PublicKey, Signature};
use crate::error::{Error, Result};

use super::kv_hash;
use super::model::{Block, Change, GroupSharedKey, GroupState};
use super::state::ChainState;

/// Validates `block` against `state` and returns the resulting state.
/// Never mutates `state`; on any failure the caller's state is untouched.
pub fn validate_and_apply(state: &ChainState, block: &Block) -> Result<ChainState> {
    // step 2: height and chain linkage
    if state.height == -1 {
        if block.height != 0 || block.prev_block_hash != [0u8; 32] {
            return Err(Error::HeightMismatch {
                expected: 0,
                actual: block.height,
            });
        }
    } else {
        if block.height != state.height + 1 {
            return Err(Error::HeightMismatch {
                expected: state.height + 1,
                actual: block.height,
            });
        }
        if block.prev_block_hash != state.last_block_hash {
            return Err(Error::HashMismatch);
        }
    }

    // step 5 (computed ahead of step 3): apply changes to a scratch copy.
    // Signer resolution for a genesis block needs the post-change state,
    // so the new state is built before the signer is known.
    let mut new_group_state = (*state.group_state).clone();
    let mut new_shared_key = state.shared_key.as_deref().cloned();
    let mut saw_set_group_state = false;
    let mut saw_set_shared_key = false;

    for change in &block.changes {
        match change {
            Change::NoOp { .. } => {}
            Change::SetValue { .. } => {}
            Change::SetGroupState { state: set_state } => {
                if set_state.has_duplicates() {
                    return Err(Error::DuplicateParticipant);
                }
                new_group_state = set_state.clone();
                saw_set_group_state = true;
            }
            Change::SetSharedKey { key } => {
                new_shared_key = Some(key.clone());
                saw_set_shared_key = true;
            }
        }
    }

    if saw_set_shared_key {
        let key = new_shared_key.as_ref().expect("just set");
        validate_shared_key_shape(key, &new_group_state)?;
    }

    // step 3: resolve the signer's public key.
    let is_genesis = state.height == -1;
    let signer = match block.signature_public_key {
        Some(declared) => {
            if !is_genesis {
                return Err(Error::MalformedChange(
                    "signature_public_key present on a non-genesis block",
                ));
            }
            if new_group_state.get_participant_by_key(&declared).is_none() {
                return Err(Error::UnknownSigner);
            }
            declared
        }
        None => {
            if is_genesis {
                return Err(Error::UnknownSigner);
            }
            find_unique_signer(&state.group_state, block)?
        }
    };

    // step 4: verify the signature.
    signer.verify(&block.signing_bytes(), &block.signature)?;

    // step 5 (permission checks): a genesis block carries no prior
    // authority to check against.
    if !is_genesis && saw_set_group_state {
        check_group_state_diff_permissions(&state.group_state, &new_group_state, &signer)?;
    }

    // step 6: verify the state proof.
    let kv_hash = kv_hash::compute(&block.changes);
    if block.state_proof.kv_hash != kv_hash {
        return Err(Error::StateProofMismatch);
    }
    match (&block.state_proof.group_state, saw_set_group_state) {
        (Some(proof_state), true) => {
            if *proof_state != new_group_state {
                return Err(Error::StateProofMismatch);
            }
        }
        (None, false) => {}
        _ => return Err(Error::StateProofMismatch),
    }
    match (&block.state_proof.shared_key, saw_set_shared_key) {
        (Some(proof_key), true) => {
            if Some(proof_key) != new_shared_key.as_ref() {
                return Err(Error::StateProofMismatch);
            }
        }
        (None, false) => {}
        _ => return Err(Error::StateProofMismatch),
    }

    // step 7: accept.
    Ok(ChainState {
        height: block.height,
        last_block_hash: block.hash(),
        group_state: Arc::new(new_group_state),
        shared_key: new_shared_key.map(Arc::new),
    })
}

/// Recovers a `ChainState` directly from a single already-accepted block,
/// trusting its embedded state proof rather than replaying the chain from
/// genesis (spec.md §4.C.3, §4.E `create`). Only valid for a block whose
/// proof carries a `group_state` -- every block this crate's facade
/// produces does, since `build_change_state`/`create_self_add_block`
/// always pair a `SetSharedKey` with a `SetGroupState`.
pub fn bootstrap(block: &Block) -> Result<ChainState> {
    let group_state = block
        .state_proof
        .group_state
        .clone()
        .ok_or(Error::StateProofMismatch)?;

    let signer = match block.signature_public_key {
        Some(key) => key,
        None => find_unique_signer(&group_state, block)?,
    };
    signer.verify(&block.signing_bytes(), &block.signature)?;
    if group_state.get_participant_by_key(&signer).is_none() {
        return Err(Error::UnknownSigner);
    }

    Ok(ChainState {
        height: block.height,
        last_block_hash: block.hash(),
        group_state: Arc::new(group_state),
        shared_key: block.state_proof.shared_key.clone().map(Arc::new),
    })
}

fn find_unique_signer(old_state: &GroupState, block: &Block) -> Result<PublicKey> {
    let signing_bytes = block.signing_bytes();
    old_state
        .participants
        .iter()
        .map(|p| p.public_key)
        .find(|key| key.verify(&signing_bytes, &block.signature).is_ok())
        .ok_or(Error::UnknownSigner)
}

fn check_group_state_diff_permissions(
    old_state: &GroupState,
    new_state: &GroupState,
    signer: &PublicKey,
) -> Result<()> {
    let added = new_state
        .participants
        .iter()
        .any(|p| old_state.get_participant_by_user_id(p.user_id).is_none());
    let removed = old_state
        .participants
        .iter()
        .any(|p| new_state.get_participant_by_user_id(p.user_id).is_none());

    let signer_permissions = old_state
        .get_participant_by_key(signer)
        .map(|p| p.permissions)
        .ok_or(Error::UnknownSigner)?;

    if added && !signer_permissions.add_users {
        return Err(Error::PermissionDenied);
    }
    if removed && !signer_permissions.remove_users {
        return Err(Error::PermissionDenied);
    }
    Ok(())
}

fn validate_shared_key_shape(key: &GroupSharedKey, group_state: &GroupState) -> Result<()> {
    if key.dest_user_id.len() != key.dest_header.len()
        || key.dest_user_id.len() != group_state.participants.len()
    {
        return Err(Error::MalformedChange(
            "shared key destination lists must match the group state size",
        ));
    }
    if key.dest_header.iter().any(|h| h.len() != 32) {
        return Err(Error::MalformedChange("shared key header must be 32 bytes"));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blockchain::model::{GroupParticipant, Permissions};
    use crate::blockchain::state::ChainState;
    use crate::crypto::PrivateKey;

    fn participant(sk: &PrivateKey, user_id: i64, permissions: Permissions) -> GroupParticipant {
        GroupParticipant {
            user_id,
            public_key: sk.to_public_key(),
            permissions,
            version: 0,
        }
    }

    fn sign_block(sk: &PrivateKey, mut block: Block) -> Block {
        block.signature = sk.sign(&block.signing_bytes()).unwrap();
        block
    }

    #[test]
    fn accepts_well_formed_genesis_block() {
        let sk = PrivateKey::from_bytes([1u8; 32]);
        let state = GroupState {
            participants: vec![participant(
                &sk,
                1,
                Permissions {
                    add_users: true,
                    remove_users: true,
                },
            )],
            external_permissions: 0,
        };
        let changes = vec![Change::SetGroupState { state: state.clone() }];
        let block = Block {
            signature: Signature::zero(),
            prev_block_hash: [0u8; 32],
            changes: changes.clone(),
            height: 0,
            state_proof: super::super::model::StateProof {
                kv_hash: kv_hash::compute(&changes),
                group_state: Some(state),
                shared_key: None,
            },
            signature_public_key: Some(sk.to_public_key()),
        };
        let block = sign_block(&sk, block);

        let genesis_chain_state = ChainState::before_genesis();
        let new_state = validate_and_apply(&genesis_chain_state, &block).unwrap();
        assert_eq!(new_state.height, 0);
    }

    #[test]
    fn rejects_wrong_height() {
        let sk = PrivateKey::from_bytes([1u8; 32]);
        let mut block = Block {
            signature: Signature::zero(),
            prev_block_hash: [0u8; 32],
            changes: vec![],
            height: 5,
            state_proof: super::super::model::StateProof::default(),
            signature_public_key: Some(sk.to_public_key()),
        };
        block = sign_block(&sk, block);
        let result = validate_and_apply(&ChainState::before_genesis(), &block);
        assert!(matches!(result, Err(Error::HeightMismatch { .. })));
    }

    #[test]
    fn rejects_permission_denied_add_without_rights() {
        let owner_sk = PrivateKey::from_bytes([2u8; 32]);
        let old_state = GroupState {
            participants: vec![participant(
                &owner_sk,
                1,
                Permissions {
                    add_users: false,
                    remove_users: false,
                },
            )],
            external_permissions: 0,
        };
        let mut new_state = old_state.clone();
        let new_sk = PrivateKey::from_bytes([3u8; 32]);
        new_state.participants.push(participant(
            &new_sk,
            2,
            Permissions {
                add_users: false,
                remove_users: false,
            },
        ));
        let changes = vec![Change::SetGroupState {
            state: new_state.clone(),
        }];
        let block = Block {
            signature: Signature::zero(),
            prev_block_hash: [9u8; 32],
            changes: changes.clone(),
            height: 1,
            state_proof: super::super::model::StateProof {
                kv_hash: kv_hash::compute(&changes),
                group_state: Some(new_state),
                shared_key: None,
            },
            signature_public_key: None,
        };
        let block = sign_block(&owner_sk, block);

        let chain_state = ChainState {
            height: 0,
            last_block_hash: [9u8; 32],
            group_state: Arc::new(old_state),
            shared_key: None,
        };
        let result = validate_and_apply(&chain_state, &block);
        assert!(matches!(result, Err(Error::PermissionDenied)));
    }
}
