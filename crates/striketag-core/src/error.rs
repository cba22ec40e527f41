/// Failures from player-ledger mutations.
///
/// `OutOfTags` and `AlreadyEliminated` are expected rule outcomes the caller
/// turns into blocked results; `InvariantViolation` means the record was
/// corrupt before the mutation and must not be committed or repaired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    OutOfTags,
    AlreadyEliminated,
    InvariantViolation(String),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfTags => write!(f, "no tags remaining for this kind"),
            Self::AlreadyEliminated => write!(f, "player is already eliminated"),
            Self::InvariantViolation(m) => write!(f, "invariant violation: {m}"),
        }
    }
}

impl std::error::Error for LedgerError {}
