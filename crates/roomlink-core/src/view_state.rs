use crate::devices::AudioDevice;
use crate::participants::ParticipantViewState;
use crate::stats::RoomStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomViewConfiguration {
    #[default]
    Lobby,
    Connecting,
    Connected,
}

/// Immutable snapshot rendered by the room screen.
///
/// There is no "disconnecting" configuration: after a disconnect request the
/// configuration stays put until the room reports `Disconnected`.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomViewState {
    pub configuration: RoomViewConfiguration,
    pub title: Option<String>,
    /// Every participant except the primary one, in join order.
    pub participant_thumbnails: Vec<ParticipantViewState>,
    pub primary_participant: ParticipantViewState,
    /// Camera permission granted.
    pub is_camera_enabled: bool,
    /// Microphone permission granted.
    pub is_mic_enabled: bool,
    pub is_audio_enabled: bool,
    pub is_audio_muted: bool,
    pub is_video_enabled: bool,
    pub is_video_off: bool,
    pub is_screen_capture_on: bool,
    pub is_recording: bool,
    pub selected_device: Option<AudioDevice>,
    pub available_audio_devices: Vec<AudioDevice>,
    pub room_stats: Option<RoomStats>,
}

impl RoomViewState {
    pub fn new(primary_participant: ParticipantViewState) -> Self {
        Self {
            configuration: RoomViewConfiguration::Lobby,
            title: None,
            participant_thumbnails: Vec::new(),
            primary_participant,
            is_camera_enabled: false,
            is_mic_enabled: false,
            is_audio_enabled: true,
            is_audio_muted: false,
            is_video_enabled: true,
            is_video_off: false,
            is_screen_capture_on: false,
            is_recording: false,
            selected_device: None,
            available_audio_devices: Vec::new(),
            room_stats: None,
        }
    }
}

/// One-shot effects for the UI (navigation, dialogs, toasts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomViewEffect {
    Connected { room_name: String },
    Disconnected,
    ShowConnectFailureDialog,
    ShowMaxParticipantFailureDialog,
    PermissionsDenied,
}
