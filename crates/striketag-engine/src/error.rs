use striketag_core::error::LedgerError;

use crate::store::StoreError;

/// Engine-level failure taxonomy.
///
/// Blocked tags are not errors; they come back as `TagResult::Blocked`.
#[derive(Debug)]
pub enum EngineError {
    /// Malformed request or unknown game/player id. Rejected before any
    /// state is written.
    Validation(String),
    /// A compare-and-swap lost to a racing writer. The operation is treated
    /// as already handled; callers may retry with a fresh read.
    Conflict(String),
    /// Store timeout or unavailability. Not a commit.
    Transient(String),
    /// A record failed its own invariants. The mutation was rejected; the
    /// upstream state needs repair, not guessing.
    Invariant(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(m) => write!(f, "validation: {m}"),
            Self::Conflict(m) => write!(f, "concurrency conflict: {m}"),
            Self::Transient(m) => write!(f, "transient store failure: {m}"),
            Self::Invariant(m) => write!(f, "invariant violation: {m}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::Validation(format!("unknown {what}")),
            StoreError::Conflict => {
                Self::Conflict("record changed since it was read".to_string())
            },
            StoreError::Transient(m) => Self::Transient(m),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvariantViolation(m) => Self::Invariant(m),
            LedgerError::AlreadyEliminated => {
                Self::Conflict("player eliminated by a racing writer".to_string())
            },
            LedgerError::OutOfTags => Self::Validation("no tags remaining".to_string()),
        }
    }
}
