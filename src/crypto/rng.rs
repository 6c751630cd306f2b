//! OS CSPRNG access and constant-time comparison (spec.md §4.A).

use rand_core::{OsRng, RngCore};
use subtle::ConstantTimeEq;

pub fn secure_random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    OsRng.fill_bytes(&mut buf);
    buf
}

pub fn secure_random_array<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Timing-safe equality check, used wherever a MAC or nonce hash is
/// compared against an attacker-influenced value (spec.md §4.B).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
