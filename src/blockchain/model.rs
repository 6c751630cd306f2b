//! The wire-level data model (spec.md §3, §6): `GroupParticipant`,
//! `GroupState`, `GroupSharedKey`, `Change`, `StateProof`, `Block`, and
//! the two verification-chain broadcast shapes.

use crate::crypto::{Hash256, PublicKey, Signature};
use crate::error::{Error, Result};
use crate::wire::{Magic, Reader, Writer};

pub type UserId = i64;

/// `bitset{add_users, remove_users}` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    pub add_users: bool,
    pub remove_users: bool,
}

impl Permissions {
    const ADD_USERS_BIT: i32 = 1;
    const REMOVE_USERS_BIT: i32 = 2;

    pub fn from_bits(bits: i32) -> Self {
        Permissions {
            add_users: bits & Self::ADD_USERS_BIT != 0,
            remove_users: bits & Self::REMOVE_USERS_BIT != 0,
        }
    }

    pub fn to_bits(self) -> i32 {
        let mut bits = 0;
        if self.add_users {
            bits |= Self::ADD_USERS_BIT;
        }
        if self.remove_users {
            bits |= Self::REMOVE_USERS_BIT;
        }
        bits
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupParticipant {
    pub user_id: UserId,
    pub public_key: PublicKey,
    pub permissions: Permissions,
    pub version: i32,
}

impl GroupParticipant {
    pub(crate) fn write(&self, w: &mut Writer) {
        w.write_magic(Magic::GROUP_PARTICIPANT);
        w.write_i64(self.user_id);
        w.write_raw(self.public_key.as_bytes());
        w.write_i32(self.permissions.to_bits());
        w.write_i32(self.version);
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self> {
        let magic = r.read_magic()?;
        if magic != Magic::GROUP_PARTICIPANT {
            return Err(Error::ParseError("unexpected magic for groupParticipant"));
        }
        let user_id = r.read_i64()?;
        let public_key = PublicKey::from_bytes(r.read_raw_array::<32>()?);
        let permissions = Permissions::from_bits(r.read_i32()?);
        let version = r.read_i32()?;
        Ok(GroupParticipant {
            user_id,
            public_key,
            permissions,
            version,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupState {
    pub participants: Vec<GroupParticipant>,
    pub external_permissions: i32,
}

impl GroupState {
    pub fn get_participant_by_key(&self, public_key: &PublicKey) -> Option<&GroupParticipant> {
        self.participants.iter().find(|p| &p.public_key == public_key)
    }

    pub fn get_participant_by_user_id(&self, user_id: UserId) -> Option<&GroupParticipant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn has_duplicates(&self) -> bool {
        for i in 0..self.participants.len() {
            for j in (i + 1)..self.participants.len() {
                if self.participants[i].public_key == self.participants[j].public_key
                    || self.participants[i].user_id == self.participants[j].user_id
                {
                    return true;
                }
            }
        }
        false
    }

    pub(crate) fn write(&self, w: &mut Writer) {
        w.write_magic(Magic::GROUP_STATE);
        w.write_vector(&self.participants, |w, p| p.write(w));
        w.write_i32(self.external_permissions);
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self> {
        let magic = r.read_magic()?;
        if magic != Magic::GROUP_STATE {
            return Err(Error::ParseError("unexpected magic for groupState"));
        }
        let participants = r.read_vector(GroupParticipant::read)?;
        let external_permissions = r.read_i32()?;
        Ok(GroupState {
            participants,
            external_permissions,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSharedKey {
    pub ek: PublicKey,
    pub encrypted_shared_key: Vec<u8>,
    pub dest_user_id: Vec<UserId>,
    pub dest_header: Vec<Vec<u8>>,
}

impl GroupSharedKey {
    pub(crate) fn write(&self, w: &mut Writer) {
        w.write_magic(Magic::SHARED_KEY);
        w.write_raw(self.ek.as_bytes());
        w.write_bytes(&self.encrypted_shared_key);
        w.write_vector(&self.dest_user_id, |w, id| w.write_i64(*id));
        w.write_vector(&self.dest_header, |w, h| w.write_bytes(h));
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self> {
        let magic = r.read_magic()?;
        if magic != Magic::SHARED_KEY {
            return Err(Error::ParseError("unexpected magic for sharedKey"));
        }
        let ek = PublicKey::from_bytes(r.read_raw_array::<32>()?);
        let encrypted_shared_key = r.read_bytes()?;
        let dest_user_id = r.read_vector(|r| r.read_i64())?;
        let dest_header = r.read_vector(|r| r.read_bytes())?;
        Ok(GroupSharedKey {
            ek,
            encrypted_shared_key,
            dest_user_id,
            dest_header,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    NoOp { nonce: Hash256 },
    /// Reserved; the call core never emits or interprets this. Only
    /// participates in the KV hash (spec.md §9).
    SetValue { key: Vec<u8>, value: Vec<u8> },
    SetGroupState { state: GroupState },
    SetSharedKey { key: GroupSharedKey },
}

impl Change {
    pub(crate) fn write(&self, w: &mut Writer) {
        match self {
            Change::NoOp { nonce } => {
                w.write_magic(Magic::CHANGE_NOOP);
                w.write_raw(nonce);
            }
            Change::SetValue { key, value } => {
                w.write_magic(Magic::CHANGE_SET_VALUE);
                w.write_bytes(key);
                w.write_bytes(value);
            }
            Change::SetGroupState { state } => {
                w.write_magic(Magic::CHANGE_SET_GROUP_STATE);
                state.write(w);
            }
            Change::SetSharedKey { key } => {
                w.write_magic(Magic::CHANGE_SET_SHARED_KEY);
                key.write(w);
            }
        }
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self> {
        let magic = r.read_magic()?;
        if magic == Magic::CHANGE_NOOP {
            Ok(Change::NoOp {
                nonce: r.read_raw_array::<32>()?,
            })
        } else if magic == Magic::CHANGE_SET_VALUE {
            Ok(Change::SetValue {
                key: r.read_bytes()?,
                value: r.read_bytes()?,
            })
        } else if magic == Magic::CHANGE_SET_GROUP_STATE {
            Ok(Change::SetGroupState {
                state: GroupState::read(r)?,
            })
        } else if magic == Magic::CHANGE_SET_SHARED_KEY {
            Ok(Change::SetSharedKey {
                key: GroupSharedKey::read(r)?,
            })
        } else {
            Err(Error::ParseError("unknown change magic"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateProof {
    pub kv_hash: Hash256,
    pub group_state: Option<GroupState>,
    pub shared_key: Option<GroupSharedKey>,
}

impl StateProof {
    const GROUP_STATE_BIT: i32 = 1;
    const SHARED_KEY_BIT: i32 = 2;

    pub(crate) fn write(&self, w: &mut Writer) {
        w.write_magic(Magic::STATE_PROOF);
        let mut flags = 0;
        if self.group_state.is_some() {
            flags |= Self::GROUP_STATE_BIT;
        }
        if self.shared_key.is_some() {
            flags |= Self::SHARED_KEY_BIT;
        }
        w.write_i32(flags);
        w.write_raw(&self.kv_hash);
        if let Some(state) = &self.group_state {
            state.write(w);
        }
        if let Some(key) = &self.shared_key {
            key.write(w);
        }
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self> {
        let magic = r.read_magic()?;
        if magic != Magic::STATE_PROOF {
            return Err(Error::ParseError("unexpected magic for stateProof"));
        }
        let flags = r.read_i32()?;
        let kv_hash = r.read_raw_array::<32>()?;
        let group_state = if flags & Self::GROUP_STATE_BIT != 0 {
            Some(GroupState::read(r)?)
        } else {
            None
        };
        let shared_key = if flags & Self::SHARED_KEY_BIT != 0 {
            Some(GroupSharedKey::read(r)?)
        } else {
            None
        };
        Ok(StateProof {
            kv_hash,
            group_state,
            shared_key,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub signature: Signature,
    pub prev_block_hash: Hash256,
    pub changes: Vec<Change>,
    pub height: i32,
    pub state_proof: StateProof,
    /// Present iff this is the genesis block (spec.md §3).
    pub signature_public_key: Option<PublicKey>,
}

impl Block {
    const SIGNATURE_PUBLIC_KEY_BIT: i32 = 1;

    /// Serializes the block, substituting `signature_override` for the
    /// `signature` field -- used both to sign (with a zero signature)
    /// and to hash (spec.md §4.C.1 step 4, §6).
    fn write_with_signature(&self, w: &mut Writer, signature_override: Signature) {
        w.write_magic(Magic::CHAIN_BLOCK);
        w.write_raw(signature_override.as_bytes());
        let mut flags = 0;
        if self.signature_public_key.is_some() {
            flags |= Self::SIGNATURE_PUBLIC_KEY_BIT;
        }
        w.write_i32(flags);
        w.write_raw(&self.prev_block_hash);
        w.write_vector(&self.changes, |w, c| c.write(w));
        w.write_i32(self.height);
        self.state_proof.write(w);
        if let Some(key) = &self.signature_public_key {
            w.write_raw(key.as_bytes());
        }
    }

    pub fn to_tl_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.write_with_signature(&mut w, self.signature);
        w.into_bytes()
    }

    /// Bytes that are signed: the full serialization with the signature
    /// field zeroed, restored to the real signature once signing is done
    /// (spec.md §4.C.1 step 4, §6).
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.write_with_signature(&mut w, Signature::zero());
        w.into_bytes()
    }

    /// The chain-link hash used as the next block's `prev_block_hash`:
    /// SHA-256 of the block exactly as transmitted, signature intact
    /// (spec.md §4.C.1 step 7).
    pub fn hash(&self) -> Hash256 {
        crate::crypto::sha256(&self.to_tl_bytes())
    }

    pub fn from_tl_bytes(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let magic = r.read_magic()?;
        if magic != Magic::CHAIN_BLOCK {
            return Err(Error::ParseError("unexpected magic for block"));
        }
        let signature = Signature::from_bytes(r.read_raw_array::<64>()?);
        let flags = r.read_i32()?;
        let prev_block_hash = r.read_raw_array::<32>()?;
        let changes = r.read_vector(Change::read)?;
        let height = r.read_i32()?;
        let state_proof = StateProof::read(&mut r)?;
        let signature_public_key = if flags & Self::SIGNATURE_PUBLIC_KEY_BIT != 0 {
            Some(PublicKey::from_bytes(r.read_raw_array::<32>()?))
        } else {
            None
        };
        r.fetch_end()?;
        Ok(Block {
            signature,
            prev_block_hash,
            changes,
            height,
            state_proof,
            signature_public_key,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupBroadcast {
    NonceCommit {
        signature: Signature,
        public_key: PublicKey,
        chain_height: i32,
        nonce_hash: Hash256,
    },
    NonceReveal {
        signature: Signature,
        public_key: PublicKey,
        chain_height: i32,
        nonce: Hash256,
    },
}

impl GroupBroadcast {
    pub fn chain_height(&self) -> i32 {
        match self {
            GroupBroadcast::NonceCommit { chain_height, .. } => *chain_height,
            GroupBroadcast::NonceReveal { chain_height, .. } => *chain_height,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            GroupBroadcast::NonceCommit { public_key, .. } => *public_key,
            GroupBroadcast::NonceReveal { public_key, .. } => *public_key,
        }
    }

    /// Bytes that are signed: the full serialization with `signature`
    /// zeroed, mirroring `Block::signing_bytes`.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.write_with_signature(&mut w, Signature::zero());
        w.into_bytes()
    }

    pub fn signature(&self) -> Signature {
        match self {
            GroupBroadcast::NonceCommit { signature, .. } => *signature,
            GroupBroadcast::NonceReveal { signature, .. } => *signature,
        }
    }

    fn write_with_signature(&self, w: &mut Writer, signature_override: Signature) {
        match self {
            GroupBroadcast::NonceCommit {
                public_key,
                chain_height,
                nonce_hash,
                ..
            } => {
                w.write_magic(Magic::BROADCAST_NONCE_COMMIT);
                w.write_raw(signature_override.as_bytes());
                w.write_raw(public_key.as_bytes());
                w.write_i32(*chain_height);
                w.write_raw(nonce_hash);
            }
            GroupBroadcast::NonceReveal {
                public_key,
                chain_height,
                nonce,
                ..
            } => {
                w.write_magic(Magic::BROADCAST_NONCE_REVEAL);
                w.write_raw(signature_override.as_bytes());
                w.write_raw(public_key.as_bytes());
                w.write_i32(*chain_height);
                w.write_raw(nonce);
            }
        }
    }

    pub fn to_tl_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.write_with_signature(&mut w, self.signature());
        w.into_bytes()
    }

    pub fn from_tl_bytes(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let magic = r.read_magic()?;
        let broadcast = if magic == Magic::BROADCAST_NONCE_COMMIT {
            let signature = Signature::from_bytes(r.read_raw_array::<64>()?);
            let public_key = PublicKey::from_bytes(r.read_raw_array::<32>()?);
            let chain_height = r.read_i32()?;
            let nonce_hash = r.read_raw_array::<32>()?;
            GroupBroadcast::NonceCommit {
                signature,
                public_key,
                chain_height,
                nonce_hash,
            }
        } else if magic == Magic::BROADCAST_NONCE_REVEAL {
            let signature = Signature::from_bytes(r.read_raw_array::<64>()?);
            let public_key = PublicKey::from_bytes(r.read_raw_array::<32>()?);
            let chain_height = r.read_i32()?;
            let nonce = r.read_raw_array::<32>()?;
            GroupBroadcast::NonceReveal {
                signature,
                public_key,
                chain_height,
                nonce,
            }
        } else {
            return Err(Error::ParseError("unknown broadcast magic"));
        };
        r.fetch_end()?;
        Ok(broadcast)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::PrivateKey;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn permissions_bits_round_trip(add_users: bool, remove_users: bool) -> bool {
        let permissions = Permissions { add_users, remove_users };
        Permissions::from_bits(permissions.to_bits()) == permissions
    }

    fn sample_participant(user_id: UserId) -> GroupParticipant {
        GroupParticipant {
            user_id,
            public_key: PrivateKey::from_bytes([user_id as u8; 32]).to_public_key(),
            permissions: Permissions {
                add_users: true,
                remove_users: false,
            },
            version: 1,
        }
    }

    #[test]
    fn group_state_round_trips() {
        let state = GroupState {
            participants: vec![sample_participant(1), sample_participant(2)],
            external_permissions: 0,
        };
        let mut w = Writer::new();
        state.write(&mut w);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let parsed = GroupState::read(&mut r).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn block_round_trips_and_hash_excludes_signature() {
        let block = Block {
            signature: Signature::from_bytes([9u8; 64]),
            prev_block_hash: [0u8; 32],
            changes: vec![Change::NoOp { nonce: [1u8; 32] }],
            height: 0,
            state_proof: StateProof {
                kv_hash: [2u8; 32],
                group_state: Some(GroupState {
                    participants: vec![sample_participant(1)],
                    external_permissions: 0,
                }),
                shared_key: None,
            },
            signature_public_key: Some(sample_participant(1).public_key),
        };
        let bytes = block.to_tl_bytes();
        let parsed = Block::from_tl_bytes(&bytes).unwrap();
        assert_eq!(parsed.height, block.height);
        assert_eq!(parsed.prev_block_hash, block.prev_block_hash);

        let mut other_signature_block = block.clone();
        other_signature_block.signature = Signature::from_bytes([1u8; 64]);
        assert_eq!(block.signing_bytes(), other_signature_block.signing_bytes());
        assert_ne!(block.hash(), other_signature_block.hash());
    }

    #[test]
    fn broadcast_round_trips() {
        let broadcast = GroupBroadcast::NonceCommit {
            signature: Signature::from_bytes([1u8; 64]),
            public_key: sample_participant(1).public_key,
            chain_height: 3,
            nonce_hash: [5u8; 32],
        };
        let bytes = broadcast.to_tl_bytes();
        let parsed = GroupBroadcast::from_tl_bytes(&bytes).unwrap();
        assert_eq!(parsed, broadcast);
    }
}
