//! The commit/reveal verification-word protocol layered on top of an
//! accepted main block (spec.md §4.D). `CallVerificationChain` is pure
//! protocol state; `CallVerification` adds the local signing key, nonce
//! generation, and the outbound broadcast queue the facade drains via
//! `pull_outbound_verification_messages`.

mod chain;
mod mnemonic;

pub use chain::VerificationState;

use crate::blockchain::{GroupBroadcast, GroupState};
use crate::config::CallConfig;
use crate::crypto::{Hash256, PrivateKey, Signature};

use chain::CallVerificationChain;

pub struct CallVerification {
    private_key: PrivateKey,
    chain: CallVerificationChain,
    local_nonce: Option<[u8; 32]>,
    outbound: Vec<Vec<u8>>,
}

impl CallVerification {
    pub fn new(private_key: PrivateKey, config: &CallConfig) -> Self {
        CallVerification {
            private_key,
            chain: CallVerificationChain::new(config.max_broadcast_lookahead),
            local_nonce: None,
            outbound: Vec::new(),
        }
    }

    /// Resets the chain for a newly accepted main block and immediately
    /// emits (and self-delivers) this participant's `NonceCommit`
    /// (spec.md §4.D "Local participant action on reset").
    pub fn reset(&mut self, height: i32, last_block_hash: Hash256, group_state: &GroupState) {
        self.chain.reset(height, last_block_hash, group_state);
        self.outbound.clear();

        let nonce = crate::crypto::secure_random_array::<32>();
        let nonce_hash = crate::crypto::sha256(&nonce);
        self.local_nonce = Some(nonce);

        let commit = GroupBroadcast::NonceCommit {
            signature: Signature::zero(),
            public_key: self.private_key.to_public_key(),
            chain_height: height,
            nonce_hash,
        };
        self.deliver_local(commit);
    }

    /// Forwards a remote broadcast to the chain, logging and dropping on
    /// any failure (spec.md §4.D), and emits our `NonceReveal` the moment
    /// the chain tells us every commit has arrived.
    pub fn receive_message(&mut self, bytes: &[u8]) {
        let broadcast = match GroupBroadcast::from_tl_bytes(bytes) {
            Ok(broadcast) => broadcast,
            Err(error) => {
                tracing::debug!(%error, "dropping malformed verification broadcast");
                return;
            }
        };
        let before = self.chain.state();
        if let Err(error) = self.chain.receive_broadcast(broadcast) {
            tracing::debug!(%error, "dropping rejected verification broadcast");
            return;
        }
        self.maybe_emit_reveal(before);
    }

    pub fn pull_outbound(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbound)
    }

    pub fn state(&self) -> VerificationState {
        self.chain.state()
    }

    pub fn emoji_hash(&self) -> Option<Hash256> {
        self.chain.emoji_hash()
    }

    pub fn verification_words(&self) -> &[String] {
        self.chain.verification_words()
    }

    pub fn height(&self) -> i32 {
        self.chain.height()
    }

    fn maybe_emit_reveal(&mut self, before: VerificationState) {
        if before == VerificationState::Commit && self.chain.state() == VerificationState::Reveal {
            let nonce = self.local_nonce.expect("local nonce set during reset");
            let reveal = GroupBroadcast::NonceReveal {
                signature: Signature::zero(),
                public_key: self.private_key.to_public_key(),
                chain_height: self.chain.height(),
                nonce,
            };
            self.deliver_local(reveal);
        }
    }

    fn deliver_local(&mut self, broadcast: GroupBroadcast) {
        let before = self.chain.state();
        let signing_bytes = broadcast.signing_bytes();
        let signature = match self.private_key.sign(&signing_bytes) {
            Ok(signature) => signature,
            Err(error) => {
                tracing::warn!(%error, "failed to sign local verification broadcast");
                return;
            }
        };
        let signed = attach_signature(broadcast, signature);
        self.outbound.push(signed.to_tl_bytes());
        if let Err(error) = self.chain.receive_broadcast(signed) {
            tracing::warn!(%error, "local verification broadcast rejected by our own chain");
            return;
        }
        self.maybe_emit_reveal(before);
    }
}

fn attach_signature(broadcast: GroupBroadcast, signature: Signature) -> GroupBroadcast {
    match broadcast {
        GroupBroadcast::NonceCommit { public_key, chain_height, nonce_hash, .. } => {
            GroupBroadcast::NonceCommit { signature, public_key, chain_height, nonce_hash }
        }
        GroupBroadcast::NonceReveal { public_key, chain_height, nonce, .. } => {
            GroupBroadcast::NonceReveal { signature, public_key, chain_height, nonce }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blockchain::{GroupParticipant, Permissions};

    fn group_state(keys: &[PrivateKey]) -> GroupState {
        GroupState {
            participants: keys
                .iter()
                .enumerate()
                .map(|(i, sk)| GroupParticipant {
                    user_id: i as i64,
                    public_key: sk.to_public_key(),
                    permissions: Permissions::default(),
                    version: 0,
                })
                .collect(),
            external_permissions: 0,
        }
    }

    #[test]
    fn solo_participant_completes_immediately() {
        let alice = PrivateKey::from_bytes([1u8; 32]);
        let state = group_state(&[alice.clone()]);
        let mut verification = CallVerification::new(alice, &CallConfig::default());
        verification.reset(0, [9u8; 32], &state);
        assert_eq!(verification.state(), VerificationState::End);
        assert!(verification.emoji_hash().is_some());
        // commit + reveal both queued.
        assert_eq!(verification.pull_outbound().len(), 2);
    }

    #[test]
    fn two_participants_exchange_messages_to_convergence() {
        let alice = PrivateKey::from_bytes([1u8; 32]);
        let bob = PrivateKey::from_bytes([2u8; 32]);
        let state = group_state(&[alice.clone(), bob.clone()]);

        let mut alice_v = CallVerification::new(alice, &CallConfig::default());
        let mut bob_v = CallVerification::new(bob, &CallConfig::default());

        alice_v.reset(0, [9u8; 32], &state);
        bob_v.reset(0, [9u8; 32], &state);

        let mut alice_out = alice_v.pull_outbound();
        let mut bob_out = bob_v.pull_outbound();

        for msg in bob_out.drain(..) {
            alice_v.receive_message(&msg);
        }
        for msg in alice_out.drain(..) {
            bob_v.receive_message(&msg);
        }

        // both sides may now have fresh reveals queued from the commit exchange.
        let mut alice_out2 = alice_v.pull_outbound();
        let mut bob_out2 = bob_v.pull_outbound();
        for msg in bob_out2.drain(..) {
            alice_v.receive_message(&msg);
        }
        for msg in alice_out2.drain(..) {
            bob_v.receive_message(&msg);
        }

        assert_eq!(alice_v.state(), VerificationState::End);
        assert_eq!(bob_v.state(), VerificationState::End);
        assert_eq!(alice_v.emoji_hash(), bob_v.emoji_hash());
    }
}
