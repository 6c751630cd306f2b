//! The `Call` facade (spec.md §4.E): holds the private key, the
//! blockchain, the current unwrapped group shared key's derived epoch
//! state, a `CallVerification`, and a `CallEncryption`.

use std::sync::Arc;

use crate::blockchain::{self, Block, Change, ChainState, GroupParticipant, GroupSharedKey, GroupState, UserId};
use crate::config::CallConfig;
use crate::crypto::{self, Hash256, PrivateKey};
use crate::error::{Error, Result};
use crate::message_encryption;
use crate::verification::CallVerification;
use crate::epoch::CallEncryption;

/// `CallVerificationState` (spec.md §3): `emoji_hash` is `None` until the
/// commit/reveal exchange for `height` has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallVerificationState {
    pub height: i32,
    pub emoji_hash: Option<Hash256>,
}

/// `CallVerificationWords` (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallVerificationWords {
    pub height: i32,
    pub words: Vec<String>,
}

/// Builds and returns the genesis block without constructing a live
/// `Call` (spec.md §4.E). Per spec.md §3's block invariants, a height-0
/// block's `changes` must establish both a non-empty `GroupState` and a
/// matching `GroupSharedKey`, so this generates and wraps a fresh key
/// exactly as `create_self_add_block`/`build_change_state` do.
pub fn create_zero_block(private_key: &PrivateKey, group_state: GroupState) -> Result<Vec<u8>> {
    let new_key = crypto::secure_random_array::<32>();
    let shared_key = wrap_shared_key(&group_state, &new_key)?;
    let changes = vec![
        Change::SetGroupState { state: group_state },
        Change::SetSharedKey { key: shared_key },
    ];
    let (block, _state) = blockchain::build_block(&ChainState::before_genesis(), private_key, changes)?;
    Ok(block.to_tl_bytes())
}

/// Validates `last_block`, adds or replaces `new_participant`, rotates the
/// shared key, and returns the serialized new block (spec.md §4.E).
pub fn create_self_add_block(
    private_key: &PrivateKey,
    last_block_bytes: &[u8],
    new_participant: GroupParticipant,
) -> Result<Vec<u8>> {
    let last_block = Block::from_tl_bytes(last_block_bytes)?;
    let state = blockchain::bootstrap(&last_block)?;

    let mut new_group_state = (*state.group_state).clone();
    match new_group_state.participants.iter_mut().find(|p| p.user_id == new_participant.user_id) {
        Some(existing) => *existing = new_participant,
        None => new_group_state.participants.push(new_participant),
    }

    let new_key = crypto::secure_random_array::<32>();
    let shared_key = wrap_shared_key(&new_group_state, &new_key)?;
    let changes = vec![
        Change::SetGroupState { state: new_group_state },
        Change::SetSharedKey { key: shared_key },
    ];
    let (block, _new_state) = blockchain::build_block(&state, private_key, changes)?;
    Ok(block.to_tl_bytes())
}

/// A live call: an accepted chain state, an unwrapped epoch key schedule,
/// and a running verification chain.
pub struct Call {
    private_key: PrivateKey,
    chain_state: ChainState,
    local_user_id: Option<UserId>,
    verification: CallVerification,
    encryption: CallEncryption,
}

impl Call {
    /// Builds a live `Call` from a known latest block, trusting its
    /// embedded state proof rather than replaying from genesis (spec.md
    /// §4.E `create`, §4.C.3).
    pub fn create(private_key: PrivateKey, last_block_bytes: &[u8], config: &CallConfig) -> Result<Self> {
        let last_block = Block::from_tl_bytes(last_block_bytes)?;
        let chain_state = blockchain::bootstrap(&last_block)?;

        let local_user_id = resolve_local_user_id(&chain_state.group_state, &private_key);

        let mut encryption = CallEncryption::new(config.epoch_grace_period, config.replay_window);
        if let Some(shared_key) = &chain_state.shared_key {
            if let Some(user_id) = local_user_id {
                let key = unwrap_shared_key(shared_key, user_id, &private_key)?;
                encryption.add_shared_key(chain_state.height, key, chain_state.group_state.clone());
            }
        }

        let mut verification = CallVerification::new(private_key.clone(), config);
        verification.reset(chain_state.height, chain_state.last_block_hash, &chain_state.group_state);

        Ok(Call {
            private_key,
            chain_state,
            local_user_id,
            verification,
            encryption,
        })
    }

    /// Generates a fresh shared key, wraps it per recipient, and produces
    /// and applies a block containing `SetGroupState` + `SetSharedKey`
    /// (spec.md §4.E).
    pub fn build_change_state(&mut self, new_group_state: GroupState) -> Result<Vec<u8>> {
        let new_key = crypto::secure_random_array::<32>();
        let shared_key = wrap_shared_key(&new_group_state, &new_key)?;
        let changes = vec![
            Change::SetGroupState { state: new_group_state },
            Change::SetSharedKey { key: shared_key },
        ];
        let (block, new_state) = blockchain::build_block(&self.chain_state, &self.private_key, changes)?;

        self.local_user_id = resolve_local_user_id(&new_state.group_state, &self.private_key);
        self.encryption.add_shared_key(new_state.height, new_key, new_state.group_state.clone());
        self.verification.reset(new_state.height, new_state.last_block_hash, &new_state.group_state);
        self.chain_state = new_state;

        Ok(block.to_tl_bytes())
    }

    /// Applies a remote block; unwraps the shared key if it changed, and
    /// in all cases resets the verification chain (spec.md §4.E).
    pub fn apply_block(&mut self, block_bytes: &[u8]) -> Result<()> {
        let block = Block::from_tl_bytes(block_bytes)?;
        let new_state = blockchain::validate_and_apply(&self.chain_state, &block)?;

        if new_state.shared_key != self.chain_state.shared_key {
            self.local_user_id = resolve_local_user_id(&new_state.group_state, &self.private_key);
            if let (Some(shared_key), Some(user_id)) = (&new_state.shared_key, self.local_user_id) {
                let key = unwrap_shared_key(shared_key, user_id, &self.private_key)?;
                self.encryption.add_shared_key(new_state.height, key, new_state.group_state.clone());
            }
        }

        self.verification.reset(new_state.height, new_state.last_block_hash, &new_state.group_state);
        self.chain_state = new_state;
        Ok(())
    }

    pub fn encrypt(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let user_id = self.local_user_id.ok_or(Error::UnknownSender)?;
        self.encryption.encrypt(user_id, &self.private_key, payload)
    }

    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.encryption.decrypt(ciphertext)
    }

    pub fn pull_outbound_verification_messages(&mut self) -> Vec<Vec<u8>> {
        self.verification.pull_outbound()
    }

    pub fn receive_verification_message(&mut self, bytes: &[u8]) {
        self.verification.receive_message(bytes)
    }

    pub fn get_verification_state(&self) -> CallVerificationState {
        CallVerificationState {
            height: self.verification.height(),
            emoji_hash: self.verification.emoji_hash(),
        }
    }

    pub fn get_verification_words(&self) -> CallVerificationWords {
        CallVerificationWords {
            height: self.verification.height(),
            words: self.verification.verification_words().to_vec(),
        }
    }

    pub fn get_group_state(&self) -> Arc<GroupState> {
        self.chain_state.group_state.clone()
    }

    pub fn get_height(&self) -> i32 {
        self.chain_state.height
    }
}

fn resolve_local_user_id(group_state: &GroupState, private_key: &PrivateKey) -> Option<UserId> {
    group_state
        .get_participant_by_key(&private_key.to_public_key())
        .map(|p| p.user_id)
}

/// Wraps `new_key` for every participant in `group_state`: a random
/// `master_secret` encrypts the key once (`encrypted_shared_key`), and
/// each recipient's `dest_header` entry is that `master_secret` wrapped
/// under an ECDH secret with a fresh ephemeral key (`ek`), using
/// `message_encryption::encrypt_header`'s existing header-wrapping
/// primitive for exactly this purpose.
fn wrap_shared_key(group_state: &GroupState, new_key: &[u8; 32]) -> Result<GroupSharedKey> {
    let master_secret = crypto::secure_random_array::<32>();
    let encrypted_shared_key = message_encryption::encrypt_data(new_key, &master_secret);

    let ephemeral = PrivateKey::generate();
    let ek = ephemeral.to_public_key();

    let mut dest_user_id = Vec::with_capacity(group_state.participants.len());
    let mut dest_header = Vec::with_capacity(group_state.participants.len());
    for participant in &group_state.participants {
        let shared_secret = ephemeral.compute_shared_secret(&participant.public_key)?;
        let header = message_encryption::encrypt_header(&master_secret, &encrypted_shared_key, &shared_secret)?;
        dest_user_id.push(participant.user_id);
        dest_header.push(header.to_vec());
    }

    Ok(GroupSharedKey {
        ek,
        encrypted_shared_key,
        dest_user_id,
        dest_header,
    })
}

fn unwrap_shared_key(shared_key: &GroupSharedKey, local_user_id: UserId, private_key: &PrivateKey) -> Result<[u8; 32]> {
    let index = shared_key
        .dest_user_id
        .iter()
        .position(|&id| id == local_user_id)
        .ok_or(Error::UnknownSender)?;

    let shared_secret = private_key.compute_shared_secret(&shared_key.ek)?;
    let header_bytes = &shared_key.dest_header[index];
    if header_bytes.len() != 32 {
        return Err(Error::InvalidLength);
    }
    let mut header = [0u8; 32];
    header.copy_from_slice(header_bytes);

    let master_secret = message_encryption::decrypt_header(&header, &shared_key.encrypted_shared_key, &shared_secret)?;
    let plaintext = message_encryption::decrypt_data(&shared_key.encrypted_shared_key, &master_secret)?;
    if plaintext.len() != 32 {
        return Err(Error::InvalidLength);
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&plaintext);
    Ok(key)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blockchain::Permissions;

    fn participant(sk: &PrivateKey, user_id: i64) -> GroupParticipant {
        GroupParticipant {
            user_id,
            public_key: sk.to_public_key(),
            permissions: Permissions { add_users: true, remove_users: true },
            version: 0,
        }
    }

    #[test]
    fn solo_genesis_then_encrypt_decrypt_round_trip() {
        let alice = PrivateKey::from_bytes([1u8; 32]);
        let group_state = GroupState {
            participants: vec![participant(&alice, 1)],
            external_permissions: 0,
        };
        let zero_block = create_zero_block(&alice, group_state).unwrap();

        let config = CallConfig::default();
        let mut call = Call::create(alice.clone(), &zero_block, &config).unwrap();
        assert_eq!(call.get_height(), 0);

        let ciphertext = call.encrypt(b"hello").unwrap();
        let plaintext = call.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn self_add_then_two_party_encrypt_decrypt() {
        let alice = PrivateKey::from_bytes([1u8; 32]);
        let bob = PrivateKey::from_bytes([2u8; 32]);
        let group_state = GroupState {
            participants: vec![participant(&alice, 1)],
            external_permissions: 0,
        };
        let zero_block = create_zero_block(&alice, group_state).unwrap();

        let config = CallConfig::default();
        let add_block = create_self_add_block(&alice, &zero_block, participant(&bob, 2)).unwrap();

        let mut alice_call = Call::create(alice.clone(), &zero_block, &config).unwrap();
        alice_call.apply_block(&add_block).unwrap();
        let mut bob_call = Call::create(bob.clone(), &add_block, &config).unwrap();

        let ciphertext = alice_call.encrypt(b"hello bob").unwrap();
        let plaintext = bob_call.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, b"hello bob");
    }

    #[test]
    fn two_calls_converge_on_same_emoji_hash_and_words_after_add() {
        let alice = PrivateKey::from_bytes([1u8; 32]);
        let bob = PrivateKey::from_bytes([2u8; 32]);
        let group_state = GroupState {
            participants: vec![participant(&alice, 1)],
            external_permissions: 0,
        };
        let zero_block = create_zero_block(&alice, group_state).unwrap();

        let config = CallConfig::default();
        let add_block = create_self_add_block(&alice, &zero_block, participant(&bob, 2)).unwrap();

        let mut alice_call = Call::create(alice.clone(), &zero_block, &config).unwrap();
        alice_call.apply_block(&add_block).unwrap();
        let mut bob_call = Call::create(bob.clone(), &add_block, &config).unwrap();

        // drain and exchange until both sides have finished the commit/reveal
        // exchange (spec.md §8 scenario 4).
        for _ in 0..4 {
            for msg in alice_call.pull_outbound_verification_messages() {
                bob_call.receive_verification_message(&msg);
            }
            for msg in bob_call.pull_outbound_verification_messages() {
                alice_call.receive_verification_message(&msg);
            }
        }

        let alice_state = alice_call.get_verification_state();
        let bob_state = bob_call.get_verification_state();
        assert_eq!(alice_state.height, 1);
        assert_eq!(alice_state, bob_state);
        assert!(alice_state.emoji_hash.is_some());

        let alice_words = alice_call.get_verification_words();
        let bob_words = bob_call.get_verification_words();
        assert_eq!(alice_words, bob_words);
        assert_eq!(alice_words.words.len(), 4);
    }

    #[test]
    fn apply_block_with_wrong_height_is_rejected() {
        let alice = PrivateKey::from_bytes([1u8; 32]);
        let group_state = GroupState {
            participants: vec![participant(&alice, 1)],
            external_permissions: 0,
        };
        let zero_block = create_zero_block(&alice, group_state).unwrap();
        let config = CallConfig::default();
        let mut call = Call::create(alice.clone(), &zero_block, &config).unwrap();

        let result = call.apply_block(&zero_block);
        assert!(matches!(result, Err(Error::HeightMismatch { .. })));
    }
}
