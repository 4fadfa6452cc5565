use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("identity must not be empty")]
    EmptyIdentity,
    #[error("identity {0:?} contains the room key separator '{sep}'", sep = crate::domain::ROOM_KEY_SEPARATOR)]
    SeparatorInIdentity(String),
    #[error("cannot open a private room with yourself ({0})")]
    SelfPairing(String),
    #[error("malformed room key {0:?}")]
    MalformedRoomKey(String),
}
