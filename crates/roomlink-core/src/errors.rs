use thiserror::Error;

use crate::sdk::SdkError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("room is full")]
    CapacityExceeded,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("a room session is already active")]
    SessionActive,
    #[error("not connected")]
    NotConnected,
    #[error("media error: {0}")]
    Media(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("closed")]
    Closed,
}

impl From<SdkError> for RoomError {
    fn from(e: SdkError) -> Self {
        if e.is_capacity_exceeded() {
            Self::CapacityExceeded
        } else {
            Self::Connection(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::ROOM_MAX_PARTICIPANTS_EXCEEDED;

    #[test]
    fn capacity_code_maps_to_capacity_exceeded() {
        let err: RoomError = SdkError::new(ROOM_MAX_PARTICIPANTS_EXCEEDED, "full").into();
        assert_eq!(err, RoomError::CapacityExceeded);
    }

    #[test]
    fn other_codes_map_to_connection() {
        let err: RoomError = SdkError::new(53000, "signaling failed").into();
        assert!(matches!(err, RoomError::Connection(msg) if msg.contains("signaling failed")));
    }
}
