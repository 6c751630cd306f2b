//! Incremental KV hash over a block's changes (spec.md §4.C.3).
//!
//! `kv_hash_0 := 0^32`; `kv_hash_{i+1} := SHA256(kv_hash_i || tl(change_i))`.

use crate::crypto::Hash256;
use crate::wire::Writer;

use super::model::Change;

pub fn compute(changes: &[Change]) -> Hash256 {
    let mut hash = [0u8; 32];
    for change in changes {
        hash = fold(hash, change);
    }
    hash
}

fn fold(prev: Hash256, change: &Change) -> Hash256 {
    let mut w = Writer::new();
    change.write(&mut w);
    let serialized = w.into_bytes();

    let mut buf = Vec::with_capacity(32 + serialized.len());
    buf.extend_from_slice(&prev);
    buf.extend_from_slice(&serialized);
    crate::crypto::sha256(&buf)
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn swapping_two_distinct_changes_changes_the_hash(a: Vec<u8>, b: Vec<u8>) -> bool {
        if a == b {
            return true;
        }
        let change_a = Change::NoOp { nonce: crate::crypto::sha256(&a) };
        let change_b = Change::NoOp { nonce: crate::crypto::sha256(&b) };
        compute(&[change_a.clone(), change_b.clone()]) != compute(&[change_b, change_a])
    }

    #[test]
    fn empty_change_list_hashes_to_zero() {
        assert_eq!(compute(&[]), [0u8; 32]);
    }

    #[test]
    fn order_matters() {
        let a = Change::NoOp { nonce: [1u8; 32] };
        let b = Change::NoOp { nonce: [2u8; 32] };
        let forward = compute(&[a.clone(), b.clone()]);
        let backward = compute(&[b, a]);
        assert_ne!(forward, backward);
    }

    #[test]
    fn is_deterministic() {
        let changes = vec![Change::NoOp { nonce: [7u8; 32] }];
        assert_eq!(compute(&changes), compute(&changes));
    }
}
