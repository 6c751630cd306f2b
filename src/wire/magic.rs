//! TL constructor ids, preserved byte-exactly for interoperability with
//! existing deployments (spec.md §6).

/// A boxed TL constructor id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Magic(pub i32);

impl Magic {
    pub const CHAIN_BLOCK: Magic = Magic(1671052726);
    pub const CHANGE_NOOP: Magic = Magic(-558586853);
    pub const CHANGE_SET_VALUE: Magic = Magic(-33474100);
    pub const CHANGE_SET_GROUP_STATE: Magic = Magic(754020678);
    pub const CHANGE_SET_SHARED_KEY: Magic = Magic(-1736826536);
    pub const GROUP_PARTICIPANT: Magic = Magic(418617119);
    pub const GROUP_STATE: Magic = Magic(500987268);
    pub const SHARED_KEY: Magic = Magic(-1971028353);
    pub const STATE_PROOF: Magic = Magic(-692684314);
    pub const BROADCAST_NONCE_COMMIT: Magic = Magic(-783209753);
    pub const BROADCAST_NONCE_REVEAL: Magic = Magic(-2081097256);
}
