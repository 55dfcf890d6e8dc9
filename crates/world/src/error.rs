use uuid::Uuid;

/// Invariant violations raised by a [`crate::model::World`] mutation.
///
/// These are not transport errors — `tf_domain::Error` is reserved for the
/// provider/HTTP boundary. A `WorldError` means a mutation was rejected
/// before it could corrupt state; the caller (tool dispatch) turns it into
/// a tool-result string rather than aborting the turn.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("no location cluster with id {0}")]
    UnknownCluster(Uuid),

    #[error("no character with id {0}")]
    UnknownCharacter(Uuid),

    #[error("no character named {0:?}")]
    UnknownCharacterName(String),

    #[error("no location cluster named {0:?}")]
    UnknownClusterName(String),

    #[error("world has no player character")]
    NoPlayerCharacter,

    #[error("tick count must be non-negative, got {0}")]
    NegativeTicks(i64),
}

pub type Result<T> = std::result::Result<T, WorldError>;
