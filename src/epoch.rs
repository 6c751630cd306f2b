//! Per-epoch authenticated payload encryption (spec.md §4.E.1). An epoch
//! corresponds to one adopted group shared key, identified by the chain
//! height at which it was adopted.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::blockchain::{GroupState, UserId};
use crate::crypto::{PrivateKey, Signature};
use crate::error::{Error, Result};
use crate::message_encryption;
use crate::wire::{Reader, Writer};

/// One epoch's encryption state: the unwrapped shared key, the group
/// state it was issued against (for signer lookup by `user_id`), the
/// local outgoing seqno counter, and the per-sender replay windows.
struct EpochEncryptor {
    height: i32,
    key: [u8; 32],
    group_state: Arc<GroupState>,
    local_seqno: u32,
    seen: HashMap<UserId, BTreeSet<u32>>,
    replay_window_capacity: usize,
    /// Set the moment a newer epoch supersedes this one; `None` while this
    /// epoch is still current (spec.md §3 "kept alive at most a fixed
    /// grace interval after they stop being current" -- the clock starts
    /// at hand-off, not at this epoch's own adoption).
    deprecated_at: Option<Instant>,
}

impl EpochEncryptor {
    fn new(height: i32, key: [u8; 32], group_state: Arc<GroupState>, replay_window_capacity: usize) -> Self {
        EpochEncryptor {
            height,
            key,
            group_state,
            local_seqno: 0,
            seen: HashMap::new(),
            replay_window_capacity,
            deprecated_at: None,
        }
    }

    fn encrypt(&mut self, user_id: UserId, private_key: &PrivateKey, payload: &[u8]) -> Result<Vec<u8>> {
        self.local_seqno = self.local_seqno.checked_add(1).ok_or(Error::SeqnoOverflow)?;

        let mut body = Writer::new();
        body.write_i64(user_id);
        body.write_i32(self.local_seqno as i32);
        body.write_raw(payload);
        let body = body.into_bytes();

        let signature = private_key.sign(&body)?;
        let mut signed = body;
        signed.extend_from_slice(signature.as_bytes());

        let env = message_encryption::encrypt_data(&signed, &self.key);

        let mut out = Writer::new();
        out.write_i32(self.height);
        out.write_raw(&env);
        Ok(out.into_bytes())
    }

    fn decrypt(&mut self, env: &[u8]) -> Result<Vec<u8>> {
        let signed = message_encryption::decrypt_data(env, &self.key)?;
        if signed.len() < 64 {
            return Err(Error::InvalidLength);
        }
        let (body, signature_bytes) = signed.split_at(signed.len() - 64);

        let mut r = Reader::new(body);
        let user_id = r.read_i64()?;
        let seqno = r.read_i32()? as u32;
        let payload = r.read_raw(r.remaining())?.to_vec();

        let participant = self
            .group_state
            .get_participant_by_user_id(user_id)
            .ok_or(Error::UnknownSender)?;

        let mut signature_array = [0u8; 64];
        signature_array.copy_from_slice(signature_bytes);
        participant.public_key.verify(body, &Signature::from_bytes(signature_array))?;

        self.check_replay(user_id, seqno)?;
        Ok(payload)
    }

    fn check_replay(&mut self, user_id: UserId, seqno: u32) -> Result<()> {
        let seen = self.seen.entry(user_id).or_default();
        if let Some(&min) = seen.iter().next() {
            if seqno < min {
                return Err(Error::TooOld);
            }
        }
        if seen.contains(&seqno) {
            return Err(Error::Replayed);
        }
        seen.insert(seqno);
        if seen.len() > self.replay_window_capacity {
            let smallest = *seen.iter().next().expect("just inserted");
            seen.remove(&smallest);
        }
        Ok(())
    }
}

/// Owns every live epoch for a call (spec.md §4.E.1). Expired epochs are
/// evicted lazily, never from a background task (spec.md §5).
pub struct CallEncryption {
    epochs: BTreeMap<i32, EpochEncryptor>,
    grace_period: Duration,
    replay_window_capacity: usize,
}

impl CallEncryption {
    pub fn new(grace_period: Duration, replay_window_capacity: usize) -> Self {
        CallEncryption {
            epochs: BTreeMap::new(),
            grace_period,
            replay_window_capacity,
        }
    }

    pub fn current_height(&self) -> Option<i32> {
        self.epochs.keys().next_back().copied()
    }

    /// Adopts a new epoch. The previously-current epoch (if any) starts its
    /// grace-period clock now, at the moment it is superseded, mirroring
    /// the original's scheduling the forget timer from `add_shared_key`
    /// rather than from the old epoch's own adoption time.
    pub fn add_shared_key(&mut self, height: i32, key: [u8; 32], group_state: Arc<GroupState>) {
        let now = Instant::now();
        if let Some(&old_height) = self.epochs.keys().next_back() {
            if old_height != height {
                if let Some(old) = self.epochs.get_mut(&old_height) {
                    old.deprecated_at = Some(now);
                }
            }
        }
        self.epochs
            .insert(height, EpochEncryptor::new(height, key, group_state, self.replay_window_capacity));
        self.forget_old_epochs();
    }

    pub fn encrypt(&mut self, user_id: UserId, private_key: &PrivateKey, payload: &[u8]) -> Result<Vec<u8>> {
        self.forget_old_epochs();
        let height = self.current_height().ok_or(Error::UnknownEpoch)?;
        self.epochs
            .get_mut(&height)
            .expect("current_height only returns known keys")
            .encrypt(user_id, private_key, payload)
    }

    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.forget_old_epochs();
        let mut r = Reader::new(ciphertext);
        let height = r.read_i32()?;
        let env = r.read_raw(r.remaining())?;
        let encryptor = self.epochs.get_mut(&height).ok_or(Error::UnknownEpoch)?;
        encryptor.decrypt(env)
    }

    fn forget_old_epochs(&mut self) {
        let Some(current) = self.current_height() else {
            return;
        };
        let grace = self.grace_period;
        self.epochs.retain(|&height, encryptor| {
            height == current
                || match encryptor.deprecated_at {
                    Some(at) => at.elapsed() < grace,
                    None => true,
                }
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blockchain::{GroupParticipant, Permissions};
    use crate::crypto::PrivateKey;

    fn group_state(keys: &[PrivateKey]) -> Arc<GroupState> {
        Arc::new(GroupState {
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
        })
    }

    #[test]
    fn round_trip_through_one_epoch() {
        let alice = PrivateKey::from_bytes([1u8; 32]);
        let state = group_state(&[alice.clone()]);
        let mut enc = CallEncryption::new(Duration::from_secs(10), 1024);
        enc.add_shared_key(0, [7u8; 32], state);

        let ciphertext = enc.encrypt(0, &alice, b"hello").unwrap();
        let plaintext = enc.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn replay_is_rejected() {
        let alice = PrivateKey::from_bytes([2u8; 32]);
        let state = group_state(&[alice.clone()]);
        let mut enc = CallEncryption::new(Duration::from_secs(10), 1024);
        enc.add_shared_key(0, [8u8; 32], state);

        let ciphertext = enc.encrypt(0, &alice, b"payload").unwrap();
        enc.decrypt(&ciphertext).unwrap();
        assert_eq!(enc.decrypt(&ciphertext), Err(Error::Replayed));
    }

    #[test]
    fn unknown_epoch_is_rejected() {
        let mut enc = CallEncryption::new(Duration::from_secs(10), 1024);
        let mut w = Writer::new();
        w.write_i32(99);
        w.write_raw(&[0u8; 32]);
        assert_eq!(enc.decrypt(&w.into_bytes()), Err(Error::UnknownEpoch));
    }

    #[test]
    fn unknown_sender_is_rejected() {
        let alice = PrivateKey::from_bytes([3u8; 32]);
        let state = group_state(&[alice.clone()]);
        let mut enc = CallEncryption::new(Duration::from_secs(10), 1024);
        enc.add_shared_key(0, [9u8; 32], state);

        let ciphertext = enc.encrypt(5, &alice, b"x").unwrap();
        assert_eq!(enc.decrypt(&ciphertext), Err(Error::UnknownSender));
    }

    #[test]
    fn deprecated_epoch_survives_grace_period_from_rotation_not_adoption() {
        let alice = PrivateKey::from_bytes([4u8; 32]);
        let state = group_state(&[alice.clone()]);
        let grace = Duration::from_millis(80);
        let mut enc = CallEncryption::new(grace, 1024);

        // epoch 0 has been current for close to the full grace period
        // before it is superseded -- under adoption-time eviction it would
        // be forgotten almost immediately after rotation.
        enc.add_shared_key(0, [1u8; 32], state.clone());
        let in_flight = enc.encrypt(0, &alice, b"in flight").unwrap();
        std::thread::sleep(grace / 2);
        enc.add_shared_key(1, [2u8; 32], state);

        assert_eq!(enc.decrypt(&in_flight).unwrap(), b"in flight");

        std::thread::sleep(grace + Duration::from_millis(40));
        assert_eq!(enc.decrypt(&in_flight), Err(Error::UnknownEpoch));
    }
}
