//! Tunable constants that the original C++ hardcodes (spec.md §3, §4.E.1,
//! §9). Kept as an explicit, `serde`-deserializable struct so an embedder
//! can override them from its own config without this crate ever touching
//! a file itself.

use std::time::Duration;

use serde::Deserialize;

/// How long an `EpochEncryptor` survives after its epoch stops being
/// current, to drain in-flight ciphertexts (spec.md §3 "Lifecycle",
/// §4.E.1, §8 scenario 6).
const DEFAULT_EPOCH_GRACE: Duration = Duration::from_secs(10);

/// Size of the per-sender replay window before the oldest seqno is
/// evicted (spec.md §4.E.1 step 6).
const DEFAULT_REPLAY_WINDOW: usize = 1024;

/// How far above the current height a verification broadcast may declare
/// itself before it is rejected outright instead of buffered (spec.md §9:
/// "cap its size to prevent an attacker from buffering broadcasts for an
/// unreached height indefinitely").
const DEFAULT_MAX_BROADCAST_LOOKAHEAD: i32 = 8;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    #[serde(with = "duration_secs")]
    pub epoch_grace_period: Duration,
    pub replay_window: usize,
    pub max_broadcast_lookahead: i32,
}

impl Default for CallConfig {
    fn default() -> Self {
        CallConfig {
            epoch_grace_period: DEFAULT_EPOCH_GRACE,
            replay_window: DEFAULT_REPLAY_WINDOW,
            max_broadcast_lookahead: DEFAULT_MAX_BROADCAST_LOOKAHEAD,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
