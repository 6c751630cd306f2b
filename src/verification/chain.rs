//! The commit/reveal verification state machine (spec.md §4.D). Pure
//! protocol state: no signing, no key material. The owning `CallVerification`
//! (in `verification::mod`) holds the private key and drives this chain.

use std::collections::BTreeMap;

use crate::blockchain::{GroupBroadcast, GroupState, UserId};
use crate::crypto::{Hash256, PublicKey};
use crate::error::{Error, Result};
use crate::message_encryption::combine_secrets;

use super::mnemonic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    Commit,
    Reveal,
    End,
}

pub struct CallVerificationChain {
    height: i32,
    last_block_hash: Hash256,
    participant_keys: BTreeMap<PublicKey, UserId>,
    committed: BTreeMap<PublicKey, Hash256>,
    revealed: BTreeMap<PublicKey, Hash256>,
    state: VerificationState,
    emoji_hash: Option<Hash256>,
    verification_words: Vec<String>,
    pending: Vec<GroupBroadcast>,
    max_broadcast_lookahead: i32,
}

impl CallVerificationChain {
    pub fn new(max_broadcast_lookahead: i32) -> Self {
        CallVerificationChain {
            height: -1,
            last_block_hash: [0u8; 32],
            participant_keys: BTreeMap::new(),
            committed: BTreeMap::new(),
            revealed: BTreeMap::new(),
            state: VerificationState::Commit,
            emoji_hash: None,
            verification_words: Vec::new(),
            pending: Vec::new(),
            max_broadcast_lookahead,
        }
    }

    pub fn state(&self) -> VerificationState {
        self.state
    }

    pub fn emoji_hash(&self) -> Option<Hash256> {
        self.emoji_hash
    }

    pub fn verification_words(&self) -> &[String] {
        &self.verification_words
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Resets on a new accepted main block (spec.md §4.D "Reset on new
    /// main block"). Previously buffered broadcasts are replayed through
    /// the new height so a delayed commit/reveal that arrived early is
    /// not lost.
    pub fn reset(&mut self, height: i32, last_block_hash: Hash256, group_state: &GroupState) {
        self.height = height;
        self.last_block_hash = last_block_hash;
        self.participant_keys = group_state
            .participants
            .iter()
            .map(|p| (p.public_key, p.user_id))
            .collect();
        self.committed.clear();
        self.revealed.clear();
        self.state = VerificationState::Commit;
        self.emoji_hash = None;
        self.verification_words = mnemonic::derive_words(&crate::crypto::sha256(&last_block_hash));

        let buffered = std::mem::take(&mut self.pending);
        for broadcast in buffered {
            if let Err(error) = self.receive_broadcast(broadcast) {
                tracing::debug!(%error, "dropping buffered verification broadcast after reset");
            }
        }
    }

    /// Processes an incoming broadcast, transitioning state as needed.
    /// Per spec.md §4.D, callers must treat every `Err` as "log and drop"
    /// rather than propagating it further.
    pub fn receive_broadcast(&mut self, broadcast: GroupBroadcast) -> Result<()> {
        let declared_height = broadcast.chain_height();
        if declared_height < self.height {
            return Ok(());
        }
        if declared_height > self.height {
            if declared_height - self.height > self.max_broadcast_lookahead {
                return Err(Error::BroadcastHeightTooFarAhead);
            }
            self.pending.push(broadcast);
            return Ok(());
        }
        self.process_at_current_height(broadcast)
    }

    fn process_at_current_height(&mut self, broadcast: GroupBroadcast) -> Result<()> {
        let signer = broadcast.public_key();
        if !self.participant_keys.contains_key(&signer) {
            return Err(Error::UnknownBroadcastSigner);
        }
        signer.verify(&broadcast.signing_bytes(), &broadcast.signature())?;

        match broadcast {
            GroupBroadcast::NonceCommit { nonce_hash, .. } => {
                if self.state != VerificationState::Commit {
                    return Err(Error::WrongVerificationState);
                }
                if self.committed.contains_key(&signer) {
                    return Err(Error::DuplicateBroadcast);
                }
                self.committed.insert(signer, nonce_hash);
                if self.committed.len() == self.participant_keys.len() {
                    self.state = VerificationState::Reveal;
                }
            }
            GroupBroadcast::NonceReveal { nonce, .. } => {
                if self.state != VerificationState::Reveal {
                    return Err(Error::WrongVerificationState);
                }
                let expected_hash = *self.committed.get(&signer).ok_or(Error::UnknownBroadcastSigner)?;
                if crate::crypto::sha256(&nonce) != expected_hash {
                    return Err(Error::NonceHashMismatch);
                }
                if self.revealed.contains_key(&signer) {
                    return Err(Error::DuplicateBroadcast);
                }
                self.revealed.insert(signer, nonce);
                if self.revealed.len() == self.participant_keys.len() {
                    self.finish();
                }
            }
        }
        Ok(())
    }

    /// Concatenates revealed nonces in ascending public-key byte order
    /// (spec.md §4.D's resolved ordering policy) and derives the emoji
    /// hash.
    fn finish(&mut self) {
        let mut full_nonce = Vec::with_capacity(32 * self.revealed.len());
        for nonce in self.revealed.values() {
            full_nonce.extend_from_slice(nonce);
        }
        self.emoji_hash = Some(combine_secrets(&self.last_block_hash, &full_nonce));
        self.state = VerificationState::End;
    }
}
