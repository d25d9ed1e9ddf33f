use std::fmt;
use uuid::Uuid;

/// The ledger's native word size, in bytes
const LEDGER_WORD_BYTES: usize = 32;

/// Fixed-width escrow ledger match key.
///
/// The opaque match id maps onto the ledger's 32-byte key space by hex
/// encoding the uuid bytes and left-padding with zeros. Deterministic and
/// collision-free for the lifetime of a deployment (uuid bytes are unique).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey(String);

impl MatchKey {
    pub fn from_match_id(match_id: Uuid) -> Self {
        let hex = hex::encode(match_id.as_bytes());
        let width = LEDGER_WORD_BYTES * 2;
        MatchKey(format!("{:0>width$}", hex, width = width))
    }

    /// Wrap a key already persisted on a record
    pub fn from_encoded(encoded: &str) -> Self {
        MatchKey(encoded.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
