use thiserror::Error;

/// Error taxonomy (spec §7). All variants except [`CrdtError::UnknownElemId`]
/// are reported to the caller with no state change; `UnknownElemId` is a
/// fatal integrity error — it means the change log itself is corrupted (I4
/// violated) and the replica should not be trusted for further mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrdtError {
    #[error("no object at path `{0}`")]
    InvalidPath(String),

    #[error("type mismatch at path `{0}`: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("index {index} out of bounds (visible length {len})")]
    IndexOutOfBounds { index: u64, len: u64 },

    #[error("op references unknown elemId `{0}` (corrupted change log)")]
    UnknownElemId(String),

    #[error("causality violation: {0}")]
    CausalityViolation(String),

    #[error("attrs missing for markType `{0}`")]
    AttrsMissing(String),

    #[error("invalid opid format `{0}`")]
    InvalidOpId(String),

    #[error("not a list: `{0}`")]
    NotAList(String),
}

pub type Result<T> = std::result::Result<T, CrdtError>;
