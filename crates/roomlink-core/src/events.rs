use serde::Serialize;

use crate::participants::VideoTrackViewState;
use crate::stats::RoomStats;

/// Events emitted by the session controller to room event subscribers.
///
/// This is the closed set every SDK callback is translated into. No SDK
/// type crosses this boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Connecting,
    Connected {
        /// Local participant first, then remotes in SDK order.
        participants: Vec<ParticipantSnapshot>,
        room_name: String,
    },
    Disconnected,
    ConnectFailure,
    MaxParticipantFailure,
    DominantSpeakerChanged { sid: Option<String> },
    RecordingStarted,
    RecordingStopped,
    StatsUpdate(RoomStats),
    RemoteParticipant(RemoteParticipantEvent),
    LocalParticipant(LocalParticipantEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteParticipantEvent {
    Connected(ParticipantSnapshot),
    Disconnected { sid: String },
    VideoTrackUpdated { sid: String, track: Option<VideoTrack> },
    ScreenTrackUpdated { sid: String, track: Option<VideoTrack> },
    TrackSwitchOff { sid: String, track: VideoTrack, switched_off: bool },
    MuteChanged { sid: String, muted: bool },
    NetworkQualityChanged { sid: String, level: NetworkQualityLevel },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocalParticipantEvent {
    VideoTrackUpdated { track: Option<VideoTrack> },
    AudioOn,
    AudioOff,
    AudioEnabled,
    AudioDisabled,
    VideoEnabled,
    VideoDisabled,
    ScreenCaptureOn,
    ScreenCaptureOff,
    NetworkQualityChanged { level: NetworkQualityLevel },
}

impl RoomEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::Connecting => "Connecting",
            RoomEvent::Connected { .. } => "Connected",
            RoomEvent::Disconnected => "Disconnected",
            RoomEvent::ConnectFailure => "ConnectFailure",
            RoomEvent::MaxParticipantFailure => "MaxParticipantFailure",
            RoomEvent::DominantSpeakerChanged { .. } => "DominantSpeakerChanged",
            RoomEvent::RecordingStarted => "RecordingStarted",
            RoomEvent::RecordingStopped => "RecordingStopped",
            RoomEvent::StatsUpdate(_) => "StatsUpdate",
            RoomEvent::RemoteParticipant(_) => "RemoteParticipant",
            RoomEvent::LocalParticipant(_) => "LocalParticipant",
        }
    }
}

/// A published media track reference, as far as the view layer cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoTrack {
    pub sid: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Network quality as reported by the SDK, 0 (broken) to 5 (excellent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Default)]
pub enum NetworkQualityLevel {
    #[default]
    Unknown,
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
}

impl NetworkQualityLevel {
    pub fn from_level(level: Option<u8>) -> Self {
        match level {
            Some(0) => Self::Zero,
            Some(1) => Self::One,
            Some(2) => Self::Two,
            Some(3) => Self::Three,
            Some(4) => Self::Four,
            Some(5) => Self::Five,
            _ => Self::Unknown,
        }
    }

    pub fn level(self) -> Option<u8> {
        match self {
            Self::Unknown => None,
            Self::Zero => Some(0),
            Self::One => Some(1),
            Self::Two => Some(2),
            Self::Three => Some(3),
            Self::Four => Some(4),
            Self::Five => Some(5),
        }
    }
}

/// Participant data carried by `Connected` and participant-join events.
///
/// `identity` is the raw SDK identity; the registry derives the display
/// identity from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantSnapshot {
    pub sid: String,
    pub identity: String,
    pub is_muted: bool,
    pub network_quality_level: NetworkQualityLevel,
    pub video_track: Option<VideoTrackViewState>,
    pub screen_track: Option<VideoTrackViewState>,
}
