//! UniFFI bindings for roomlink-core.
//!
//! Provides a RoomClient object that wraps the session controller and the
//! room view model into a single FFI-safe interface. The native shell
//! implements the video SDK, local media, audio routing and permission
//! traits; room callbacks flow back in through [`RoomCallbacks`].

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use roomlink_core::{
    config::SessionConfig,
    devices::{
        AudioDevice as CoreAudioDevice, AudioDeviceKind as CoreAudioDeviceKind, AudioDeviceListener,
        AudioDeviceManager, Permission as CorePermission, PermissionSource,
    },
    errors::RoomError as CoreRoomError,
    events::TrackKind as CoreTrackKind,
    media::LocalMedia,
    participants::{ParticipantViewState, VideoTrackViewState},
    sdk::{
        ConnectOptions, LocalTrack, ROOM_MAX_PARTICIPANTS_EXCEEDED, RoomHandle, SdkError, SdkParticipant, SdkTrack,
        VideoClient,
    },
    session::{RoomListener, RoomSessionController, SessionCommand as CoreSessionCommand, SessionState as CoreSessionState},
    settings::{FileSettings, VideoDimensions},
    stats::{StatsReport, TrackStats},
    view_model::{RoomViewEvent as CoreRoomViewEvent, RoomViewModel},
    view_state::{
        RoomViewConfiguration as CoreRoomViewConfiguration, RoomViewEffect as CoreRoomViewEffect,
        RoomViewState as CoreRoomViewState,
    },
};
use tokio::sync::{mpsc, watch};

uniffi::setup_scaffolding!();

// ── Namespace functions ──────────────────────────────────────────────

/// Initialize tracing/logging. Call once from the host before using RoomClient.
#[uniffi::export]
pub fn init_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        if let Err(e) = install_subscriber() {
            // The host installed its own global subscriber; keep it.
            eprintln!("roomlink: tracing subscriber not installed: {e}");
        }
    });
}

fn install_subscriber() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("roomlink_core=debug,roomlink_ffi=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).with_ansi(false).try_init()
}

// ── Error conversion ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum RoomError {
    #[error("Connection error: {msg}")]
    Connection { msg: String },
    #[error("Room is full")]
    CapacityExceeded,
    #[error("Permission denied: {msg}")]
    PermissionDenied { msg: String },
    #[error("A room session is already active")]
    SessionActive,
    #[error("Not connected")]
    NotConnected,
    #[error("Media error: {msg}")]
    Media { msg: String },
    #[error("Config error: {msg}")]
    Config { msg: String },
    #[error("Client closed")]
    Closed,
    #[error("Internal error: {msg}")]
    Internal { msg: String },
}

impl From<CoreRoomError> for RoomError {
    fn from(e: CoreRoomError) -> Self {
        tracing::error!("RoomError: {e}");
        match e {
            CoreRoomError::Connection(msg) => Self::Connection { msg },
            CoreRoomError::CapacityExceeded => Self::CapacityExceeded,
            CoreRoomError::PermissionDenied(msg) => Self::PermissionDenied { msg },
            CoreRoomError::SessionActive => Self::SessionActive,
            CoreRoomError::NotConnected => Self::NotConnected,
            CoreRoomError::Media(msg) => Self::Media { msg },
            CoreRoomError::Config(msg) => Self::Config { msg },
            CoreRoomError::Closed => Self::Closed,
        }
    }
}

/// Errors thrown by native media callbacks back into the core.
impl From<RoomError> for CoreRoomError {
    fn from(e: RoomError) -> Self {
        match e {
            RoomError::Connection { msg } => Self::Connection(msg),
            RoomError::CapacityExceeded => Self::CapacityExceeded,
            RoomError::PermissionDenied { msg } => Self::PermissionDenied(msg),
            RoomError::SessionActive => Self::SessionActive,
            RoomError::NotConnected => Self::NotConnected,
            RoomError::Media { msg } | RoomError::Internal { msg } => Self::Media(msg),
            RoomError::Config { msg } => Self::Config(msg),
            RoomError::Closed => Self::Closed,
        }
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for RoomError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::Internal { msg: e.reason }
    }
}

/// A native connect error as the core sees it.
fn sdk_error(e: RoomError) -> SdkError {
    match e {
        RoomError::CapacityExceeded => SdkError::new(ROOM_MAX_PARTICIPANTS_EXCEEDED, "room is full"),
        other => SdkError::new(0, other.to_string()),
    }
}

// ── FFI-safe types: SDK side ──────────────────────────────────────────

#[derive(Debug, Clone, uniffi::Record)]
pub struct SdkFailure {
    pub code: i32,
    pub message: String,
}

impl From<SdkFailure> for SdkError {
    fn from(f: SdkFailure) -> Self {
        SdkError::new(f.code, f.message)
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct TrackInfo {
    pub sid: String,
    pub name: String,
    pub enabled: bool,
    pub switched_off: bool,
}

impl From<TrackInfo> for SdkTrack {
    fn from(t: TrackInfo) -> Self {
        Self { sid: t.sid, name: t.name, enabled: t.enabled, switched_off: t.switched_off }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct ParticipantInfo {
    pub sid: String,
    pub identity: String,
    pub audio_tracks: Vec<TrackInfo>,
    pub video_tracks: Vec<TrackInfo>,
    pub network_quality_level: Option<u8>,
}

impl From<ParticipantInfo> for SdkParticipant {
    fn from(p: ParticipantInfo) -> Self {
        Self {
            sid: p.sid,
            identity: p.identity,
            audio_tracks: p.audio_tracks.into_iter().map(SdkTrack::from).collect(),
            video_tracks: p.video_tracks.into_iter().map(SdkTrack::from).collect(),
            network_quality_level: p.network_quality_level,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct ConnectRequest {
    pub identity: String,
    pub room_name: String,
    pub audio_codec: String,
    pub video_codec: String,
    pub enable_network_quality: bool,
    pub enable_dominant_speaker: bool,
}

impl From<ConnectOptions> for ConnectRequest {
    fn from(o: ConnectOptions) -> Self {
        Self {
            identity: o.identity,
            room_name: o.room_name,
            audio_codec: o.preferred_audio_codec.name().to_string(),
            video_codec: o.preferred_video_codec.name().to_string(),
            enable_network_quality: o.enable_network_quality,
            enable_dominant_speaker: o.enable_dominant_speaker,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct LocalTrackInfo {
    pub sid: String,
    pub name: String,
}

impl From<&LocalTrack> for LocalTrackInfo {
    fn from(t: &LocalTrack) -> Self {
        Self { sid: t.sid.clone(), name: t.name.clone() }
    }
}

impl From<LocalTrackInfo> for LocalTrack {
    fn from(t: LocalTrackInfo) -> Self {
        Self { sid: t.sid, name: t.name }
    }
}

#[derive(Debug, Clone, uniffi::Enum)]
pub enum TrackKind {
    Audio,
    Video,
}

impl From<TrackKind> for CoreTrackKind {
    fn from(k: TrackKind) -> Self {
        match k {
            TrackKind::Audio => Self::Audio,
            TrackKind::Video => Self::Video,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct TrackStatsInfo {
    pub track_sid: String,
    pub kind: TrackKind,
    pub local: bool,
    pub codec: String,
    pub packets: u64,
    pub packets_lost: u64,
    pub bytes: u64,
    pub round_trip_time_ms: Option<u32>,
    pub jitter_ms: Option<u32>,
}

impl From<TrackStatsInfo> for TrackStats {
    fn from(t: TrackStatsInfo) -> Self {
        Self {
            track_sid: t.track_sid,
            kind: t.kind.into(),
            local: t.local,
            codec: t.codec,
            packets: t.packets,
            packets_lost: t.packets_lost,
            bytes: t.bytes,
            round_trip_time_ms: t.round_trip_time_ms,
            jitter_ms: t.jitter_ms,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct StatsReportInfo {
    pub peer_connection_id: String,
    pub tracks: Vec<TrackStatsInfo>,
}

impl From<StatsReportInfo> for StatsReport {
    fn from(r: StatsReportInfo) -> Self {
        Self {
            peer_connection_id: r.peer_connection_id,
            tracks: r.tracks.into_iter().map(TrackStats::from).collect(),
        }
    }
}

// ── FFI-safe types: view side ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum AudioDeviceKind {
    BluetoothHeadset,
    WiredHeadset,
    Earpiece,
    Speakerphone,
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct AudioDevice {
    pub name: String,
    pub kind: AudioDeviceKind,
}

impl From<CoreAudioDevice> for AudioDevice {
    fn from(d: CoreAudioDevice) -> Self {
        let kind = match d.kind {
            CoreAudioDeviceKind::BluetoothHeadset => AudioDeviceKind::BluetoothHeadset,
            CoreAudioDeviceKind::WiredHeadset => AudioDeviceKind::WiredHeadset,
            CoreAudioDeviceKind::Earpiece => AudioDeviceKind::Earpiece,
            CoreAudioDeviceKind::Speakerphone => AudioDeviceKind::Speakerphone,
        };
        Self { name: d.name, kind }
    }
}

impl From<AudioDevice> for CoreAudioDevice {
    fn from(d: AudioDevice) -> Self {
        let kind = match d.kind {
            AudioDeviceKind::BluetoothHeadset => CoreAudioDeviceKind::BluetoothHeadset,
            AudioDeviceKind::WiredHeadset => CoreAudioDeviceKind::WiredHeadset,
            AudioDeviceKind::Earpiece => CoreAudioDeviceKind::Earpiece,
            AudioDeviceKind::Speakerphone => CoreAudioDeviceKind::Speakerphone,
        };
        Self { name: d.name, kind }
    }
}

#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum Permission {
    Camera,
    Microphone,
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct VideoTrackInfo {
    pub sid: String,
    pub name: String,
    pub is_switched_off: bool,
}

/// `None` when there is no track to render.
fn video_track_info(state: Option<VideoTrackViewState>) -> Option<VideoTrackInfo> {
    let state = state?;
    let track = state.track?;
    Some(VideoTrackInfo { sid: track.sid, name: track.name, is_switched_off: state.is_switched_off })
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct ParticipantTile {
    pub sid: String,
    pub identity: String,
    pub is_local: bool,
    pub is_muted: bool,
    pub is_pinned: bool,
    pub network_quality_level: Option<u8>,
    pub video_track: Option<VideoTrackInfo>,
    pub screen_track: Option<VideoTrackInfo>,
}

impl From<ParticipantViewState> for ParticipantTile {
    fn from(p: ParticipantViewState) -> Self {
        Self {
            sid: p.sid,
            identity: p.identity,
            is_local: p.is_local,
            is_muted: p.is_muted,
            is_pinned: p.is_pinned,
            network_quality_level: p.network_quality_level.level(),
            video_track: video_track_info(p.video_track),
            screen_track: video_track_info(p.screen_track),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum RoomViewConfiguration {
    Lobby,
    Connecting,
    Connected,
}

impl From<CoreRoomViewConfiguration> for RoomViewConfiguration {
    fn from(c: CoreRoomViewConfiguration) -> Self {
        match c {
            CoreRoomViewConfiguration::Lobby => Self::Lobby,
            CoreRoomViewConfiguration::Connecting => Self::Connecting,
            CoreRoomViewConfiguration::Connected => Self::Connected,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct RoomViewState {
    pub configuration: RoomViewConfiguration,
    pub title: Option<String>,
    pub participant_thumbnails: Vec<ParticipantTile>,
    pub primary_participant: ParticipantTile,
    pub is_camera_enabled: bool,
    pub is_mic_enabled: bool,
    pub is_audio_enabled: bool,
    pub is_audio_muted: bool,
    pub is_video_enabled: bool,
    pub is_video_off: bool,
    pub is_screen_capture_on: bool,
    pub is_recording: bool,
    pub selected_device: Option<AudioDevice>,
    pub available_audio_devices: Vec<AudioDevice>,
    /// Latest room stats as JSON, for the stats screen.
    pub room_stats_json: Option<String>,
}

impl From<CoreRoomViewState> for RoomViewState {
    fn from(s: CoreRoomViewState) -> Self {
        Self {
            configuration: s.configuration.into(),
            title: s.title,
            participant_thumbnails: s.participant_thumbnails.into_iter().map(ParticipantTile::from).collect(),
            primary_participant: s.primary_participant.into(),
            is_camera_enabled: s.is_camera_enabled,
            is_mic_enabled: s.is_mic_enabled,
            is_audio_enabled: s.is_audio_enabled,
            is_audio_muted: s.is_audio_muted,
            is_video_enabled: s.is_video_enabled,
            is_video_off: s.is_video_off,
            is_screen_capture_on: s.is_screen_capture_on,
            is_recording: s.is_recording,
            selected_device: s.selected_device.map(AudioDevice::from),
            available_audio_devices: s.available_audio_devices.into_iter().map(AudioDevice::from).collect(),
            room_stats_json: s.room_stats.and_then(|stats| stats.to_json()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum RoomViewEffect {
    Connected { room_name: String },
    Disconnected,
    ShowConnectFailureDialog,
    ShowMaxParticipantFailureDialog,
    PermissionsDenied,
}

impl From<CoreRoomViewEffect> for RoomViewEffect {
    fn from(e: CoreRoomViewEffect) -> Self {
        match e {
            CoreRoomViewEffect::Connected { room_name } => Self::Connected { room_name },
            CoreRoomViewEffect::Disconnected => Self::Disconnected,
            CoreRoomViewEffect::ShowConnectFailureDialog => Self::ShowConnectFailureDialog,
            CoreRoomViewEffect::ShowMaxParticipantFailureDialog => Self::ShowMaxParticipantFailureDialog,
            CoreRoomViewEffect::PermissionsDenied => Self::PermissionsDenied,
        }
    }
}

#[derive(Debug, Clone, uniffi::Enum)]
pub enum RoomViewEvent {
    OnResume,
    OnPause,
    SelectAudioDevice { device: AudioDevice },
    ActivateAudioDevice,
    DeactivateAudioDevice,
    Connect { identity: String, room_name: String },
    PinParticipant { sid: String },
    ToggleLocalVideo,
    EnableLocalVideo,
    DisableLocalVideo,
    ToggleLocalAudio,
    EnableLocalAudio,
    DisableLocalAudio,
    StartScreenCapture,
    StopScreenCapture,
    SwitchCamera,
    VideoTrackRemoved { sid: String },
    ScreenTrackRemoved { sid: String },
    Disconnect,
}

impl From<RoomViewEvent> for CoreRoomViewEvent {
    fn from(e: RoomViewEvent) -> Self {
        match e {
            RoomViewEvent::OnResume => Self::OnResume,
            RoomViewEvent::OnPause => Self::OnPause,
            RoomViewEvent::SelectAudioDevice { device } => Self::SelectAudioDevice(device.into()),
            RoomViewEvent::ActivateAudioDevice => Self::ActivateAudioDevice,
            RoomViewEvent::DeactivateAudioDevice => Self::DeactivateAudioDevice,
            RoomViewEvent::Connect { identity, room_name } => Self::Connect { identity, room_name },
            RoomViewEvent::PinParticipant { sid } => Self::PinParticipant { sid },
            RoomViewEvent::ToggleLocalVideo => Self::ToggleLocalVideo,
            RoomViewEvent::EnableLocalVideo => Self::EnableLocalVideo,
            RoomViewEvent::DisableLocalVideo => Self::DisableLocalVideo,
            RoomViewEvent::ToggleLocalAudio => Self::ToggleLocalAudio,
            RoomViewEvent::EnableLocalAudio => Self::EnableLocalAudio,
            RoomViewEvent::DisableLocalAudio => Self::DisableLocalAudio,
            RoomViewEvent::StartScreenCapture => Self::StartScreenCapture,
            RoomViewEvent::StopScreenCapture => Self::StopScreenCapture,
            RoomViewEvent::SwitchCamera => Self::SwitchCamera,
            RoomViewEvent::VideoTrackRemoved { sid } => Self::VideoTrackRemoved { sid },
            RoomViewEvent::ScreenTrackRemoved { sid } => Self::ScreenTrackRemoved { sid },
            RoomViewEvent::Disconnect => Self::Disconnect,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum SessionCommand {
    StartForegroundService { room_name: String },
    StopForegroundService,
}

impl From<CoreSessionCommand> for SessionCommand {
    fn from(c: CoreSessionCommand) -> Self {
        match c {
            CoreSessionCommand::StartForegroundService { room_name } => Self::StartForegroundService { room_name },
            CoreSessionCommand::StopForegroundService => Self::StopForegroundService,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
}

impl From<CoreSessionState> for SessionState {
    fn from(s: CoreSessionState) -> Self {
        match s {
            CoreSessionState::Idle => Self::Idle,
            CoreSessionState::Connecting => Self::Connecting,
            CoreSessionState::Connected => Self::Connected,
            CoreSessionState::Reconnecting => Self::Reconnecting,
        }
    }
}

// ── Native interfaces (implemented in Kotlin/Swift) ───────────────────

#[uniffi::export(with_foreign)]
pub trait NativeVideoSdk: Send + Sync {
    /// Start connecting. The outcome is reported through `callbacks`.
    fn connect(&self, request: ConnectRequest, callbacks: Arc<RoomCallbacks>) -> Result<Arc<dyn NativeRoom>, RoomError>;
}

#[uniffi::export(with_foreign)]
pub trait NativeRoom: Send + Sync {
    fn sid(&self) -> String;
    fn name(&self) -> String;
    fn local_participant(&self) -> Option<ParticipantInfo>;
    fn remote_participants(&self) -> Vec<ParticipantInfo>;
    fn publish_track(&self, track: LocalTrackInfo);
    fn unpublish_track(&self, track: LocalTrackInfo);
    fn disconnect(&self);
    fn stats(&self) -> Vec<StatsReportInfo>;
}

#[uniffi::export(with_foreign)]
pub trait NativeLocalMedia: Send + Sync {
    fn create_audio_track(&self, name: String) -> Result<LocalTrackInfo, RoomError>;
    fn set_audio_enabled(&self, track: LocalTrackInfo, enabled: bool);
    fn release_audio_track(&self, track: LocalTrackInfo);
    fn create_camera_track(&self, name: String, width: u32, height: u32) -> Result<LocalTrackInfo, RoomError>;
    fn set_video_enabled(&self, track: LocalTrackInfo, enabled: bool);
    fn release_video_track(&self, track: LocalTrackInfo);
    fn switch_camera(&self);
    fn start_screen_capture(&self, name: String) -> Result<LocalTrackInfo, RoomError>;
    fn stop_screen_capture(&self, track: LocalTrackInfo);
}

/// Audio routing. Device changes are pushed back with
/// [`RoomClient::audio_devices_changed`].
#[uniffi::export(with_foreign)]
pub trait NativeAudioDevices: Send + Sync {
    fn start(&self);
    fn stop(&self);
    fn select_device(&self, device: AudioDevice);
    fn activate(&self);
    fn deactivate(&self);
}

#[uniffi::export(with_foreign)]
pub trait NativePermissions: Send + Sync {
    fn is_granted(&self, permission: Permission) -> bool;
}

#[uniffi::export(callback_interface)]
pub trait RoomViewListener: Send + Sync {
    fn on_state(&self, state: RoomViewState);
    fn on_effect(&self, effect: RoomViewEffect);
    fn on_command(&self, command: SessionCommand);
}

// ── Room callbacks: native SDK → core listener ────────────────────────

/// Handed to [`NativeVideoSdk::connect`]; the native SDK adapter forwards
/// its room callbacks here, from any thread.
#[derive(uniffi::Object)]
pub struct RoomCallbacks {
    listener: RoomListener,
}

#[uniffi::export]
impl RoomCallbacks {
    pub fn on_connected(&self, room: Arc<dyn NativeRoom>) {
        self.listener.on_connected(Arc::new(RoomBridge { room }));
    }

    pub fn on_connect_failure(&self, error: SdkFailure) {
        self.listener.on_connect_failure(error.into());
    }

    pub fn on_disconnected(&self, error: Option<SdkFailure>) {
        self.listener.on_disconnected(error.map(SdkError::from));
    }

    pub fn on_reconnecting(&self, error: SdkFailure) {
        self.listener.on_reconnecting(error.into());
    }

    pub fn on_reconnected(&self) {
        self.listener.on_reconnected();
    }

    pub fn on_participant_connected(&self, participant: ParticipantInfo) {
        self.listener.on_participant_connected(participant.into());
    }

    pub fn on_participant_disconnected(&self, sid: String) {
        self.listener.on_participant_disconnected(&sid);
    }

    pub fn on_dominant_speaker_changed(&self, sid: Option<String>) {
        self.listener.on_dominant_speaker_changed(sid.as_deref());
    }

    pub fn on_recording_started(&self) {
        self.listener.on_recording_started();
    }

    pub fn on_recording_stopped(&self) {
        self.listener.on_recording_stopped();
    }

    pub fn on_video_track_subscribed(&self, participant_sid: String, track: TrackInfo) {
        self.listener.on_video_track_subscribed(&participant_sid, track.into());
    }

    pub fn on_video_track_unsubscribed(&self, participant_sid: String, track: TrackInfo) {
        self.listener.on_video_track_unsubscribed(&participant_sid, track.into());
    }

    pub fn on_video_track_switched_off(&self, participant_sid: String, track: TrackInfo) {
        self.listener.on_video_track_switched_off(&participant_sid, track.into());
    }

    pub fn on_video_track_switched_on(&self, participant_sid: String, track: TrackInfo) {
        self.listener.on_video_track_switched_on(&participant_sid, track.into());
    }

    pub fn on_audio_track_subscribed(&self, participant_sid: String) {
        self.listener.on_audio_track_subscribed(&participant_sid);
    }

    pub fn on_audio_track_unsubscribed(&self, participant_sid: String) {
        self.listener.on_audio_track_unsubscribed(&participant_sid);
    }

    pub fn on_audio_track_enabled(&self, participant_sid: String) {
        self.listener.on_audio_track_enabled(&participant_sid);
    }

    pub fn on_audio_track_disabled(&self, participant_sid: String) {
        self.listener.on_audio_track_disabled(&participant_sid);
    }

    pub fn on_network_quality_level_changed(&self, participant_sid: String, level: Option<u8>) {
        self.listener.on_network_quality_level_changed(&participant_sid, level);
    }
}

// ── Bridges: native interfaces → core traits ──────────────────────────

struct SdkBridge {
    sdk: Arc<dyn NativeVideoSdk>,
}

#[async_trait]
impl VideoClient for SdkBridge {
    async fn connect(&self, options: ConnectOptions, listener: RoomListener) -> Result<Arc<dyn RoomHandle>, SdkError> {
        let sdk = self.sdk.clone();
        let request = ConnectRequest::from(options);
        let callbacks = Arc::new(RoomCallbacks { listener });
        // Native connect may block on the platform SDK.
        let room = tokio::task::spawn_blocking(move || sdk.connect(request, callbacks))
            .await
            .map_err(|e| SdkError::new(0, format!("native connect aborted: {e}")))?
            .map_err(sdk_error)?;
        Ok(Arc::new(RoomBridge { room }))
    }
}

struct RoomBridge {
    room: Arc<dyn NativeRoom>,
}

#[async_trait]
impl RoomHandle for RoomBridge {
    fn sid(&self) -> String {
        self.room.sid()
    }

    fn name(&self) -> String {
        self.room.name()
    }

    fn local_participant(&self) -> Option<SdkParticipant> {
        self.room.local_participant().map(SdkParticipant::from)
    }

    fn remote_participants(&self) -> Vec<SdkParticipant> {
        self.room.remote_participants().into_iter().map(SdkParticipant::from).collect()
    }

    fn publish_track(&self, track: &LocalTrack) {
        self.room.publish_track(track.into());
    }

    fn unpublish_track(&self, track: &LocalTrack) {
        self.room.unpublish_track(track.into());
    }

    fn disconnect(&self) {
        self.room.disconnect();
    }

    async fn stats(&self) -> Vec<StatsReport> {
        let room = self.room.clone();
        match tokio::task::spawn_blocking(move || room.stats()).await {
            Ok(reports) => reports.into_iter().map(StatsReport::from).collect(),
            Err(e) => {
                tracing::warn!("native stats call failed: {e}");
                Vec::new()
            }
        }
    }
}

struct MediaBridge {
    media: Arc<dyn NativeLocalMedia>,
}

impl LocalMedia for MediaBridge {
    fn create_audio_track(&self, name: &str) -> Result<LocalTrack, CoreRoomError> {
        Ok(self.media.create_audio_track(name.to_string())?.into())
    }

    fn set_audio_enabled(&self, track: &LocalTrack, enabled: bool) {
        self.media.set_audio_enabled(track.into(), enabled);
    }

    fn release_audio_track(&self, track: &LocalTrack) {
        self.media.release_audio_track(track.into());
    }

    fn create_camera_track(&self, name: &str, dimensions: VideoDimensions) -> Result<LocalTrack, CoreRoomError> {
        Ok(self
            .media
            .create_camera_track(name.to_string(), dimensions.width, dimensions.height)?
            .into())
    }

    fn set_video_enabled(&self, track: &LocalTrack, enabled: bool) {
        self.media.set_video_enabled(track.into(), enabled);
    }

    fn release_video_track(&self, track: &LocalTrack) {
        self.media.release_video_track(track.into());
    }

    fn switch_camera(&self) {
        self.media.switch_camera();
    }

    fn start_screen_capture(&self, name: &str) -> Result<LocalTrack, CoreRoomError> {
        Ok(self.media.start_screen_capture(name.to_string())?.into())
    }

    fn stop_screen_capture(&self, track: &LocalTrack) {
        self.media.stop_screen_capture(track.into());
    }
}

type DeviceListenerSlot = Arc<StdMutex<Option<AudioDeviceListener>>>;

struct AudioBridge {
    native: Arc<dyn NativeAudioDevices>,
    listener: DeviceListenerSlot,
}

impl AudioDeviceManager for AudioBridge {
    fn start(&self, listener: AudioDeviceListener) {
        *self.listener.lock().unwrap_or_else(|p| p.into_inner()) = Some(listener);
        self.native.start();
    }

    fn stop(&self) {
        self.native.stop();
        self.listener.lock().unwrap_or_else(|p| p.into_inner()).take();
    }

    fn select_device(&self, device: &CoreAudioDevice) {
        self.native.select_device(device.clone().into());
    }

    fn activate(&self) {
        self.native.activate();
    }

    fn deactivate(&self) {
        self.native.deactivate();
    }
}

struct PermissionBridge {
    native: Arc<dyn NativePermissions>,
}

impl PermissionSource for PermissionBridge {
    fn is_granted(&self, permission: CorePermission) -> bool {
        let permission = match permission {
            CorePermission::Camera => Permission::Camera,
            CorePermission::Microphone => Permission::Microphone,
        };
        self.native.is_granted(permission)
    }
}

// ── RoomClient: main FFI object ───────────────────────────────────────

type ViewListeners = Arc<StdMutex<Vec<Arc<dyn RoomViewListener>>>>;

#[derive(uniffi::Object)]
pub struct RoomClient {
    controller: RoomSessionController,
    view_model: RoomViewModel,
    audio_listener: DeviceListenerSlot,
    listeners: ViewListeners,
    dispatcher: tokio::task::JoinHandle<()>,
    rt: tokio::runtime::Runtime,
}

#[uniffi::export]
impl RoomClient {
    /// `data_dir` holds `settings.json`; `config_json` overrides
    /// [`SessionConfig`] defaults.
    #[uniffi::constructor]
    pub fn new(
        data_dir: String,
        config_json: Option<String>,
        sdk: Arc<dyn NativeVideoSdk>,
        media: Arc<dyn NativeLocalMedia>,
        audio: Arc<dyn NativeAudioDevices>,
        permissions: Arc<dyn NativePermissions>,
    ) -> Result<Arc<Self>, RoomError> {
        let config = match config_json {
            Some(json) => SessionConfig::from_json(&json)?,
            None => SessionConfig::default(),
        };
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("roomlink")
            .build()
            .map_err(|e| RoomError::Internal { msg: format!("failed to create tokio runtime: {e}") })?;
        tracing::info!("RoomClient::new data_dir={data_dir}");

        let settings = Arc::new(FileSettings::new(&data_dir));
        let (controller, commands) = RoomSessionController::new(
            rt.handle().clone(),
            Arc::new(SdkBridge { sdk }),
            Arc::new(MediaBridge { media }),
            settings,
            config,
        );
        let audio_listener = DeviceListenerSlot::default();
        let (view_model, effects) = RoomViewModel::start(
            rt.handle(),
            controller.clone(),
            Arc::new(AudioBridge { native: audio, listener: audio_listener.clone() }),
            Arc::new(PermissionBridge { native: permissions }),
        );

        let listeners = ViewListeners::default();
        let dispatcher = rt.spawn(dispatch(listeners.clone(), view_model.state(), effects, commands));

        Ok(Arc::new(Self { controller, view_model, audio_listener, listeners, dispatcher, rt }))
    }

    pub fn process_input(&self, event: RoomViewEvent) {
        self.view_model.process_input(event.into());
    }

    pub fn view_state(&self) -> RoomViewState {
        self.view_model.snapshot().into()
    }

    pub fn session_state(&self) -> SessionState {
        self.controller.state().into()
    }

    /// Register a listener for view state, effects and session commands.
    /// It receives the current state right away.
    pub fn add_listener(&self, listener: Box<dyn RoomViewListener>) {
        let listener: Arc<dyn RoomViewListener> = Arc::from(listener);
        listener.on_state(self.view_state());
        self.listeners.lock().unwrap_or_else(|p| p.into_inner()).push(listener);
    }

    /// Called by the native audio router whenever devices change.
    pub fn audio_devices_changed(&self, available: Vec<AudioDevice>, selected: Option<AudioDevice>) {
        let guard = self.audio_listener.lock().unwrap_or_else(|p| p.into_inner());
        match guard.as_ref() {
            Some(listener) => listener(
                available.into_iter().map(CoreAudioDevice::from).collect(),
                selected.map(CoreAudioDevice::from),
            ),
            None => tracing::debug!("audio devices changed while audio manager stopped"),
        }
    }

    /// Leave any room and release everything. The client is unusable after.
    pub fn dispose(&self) {
        let _guard = self.rt.enter();
        self.view_model.close();
        self.controller.dispose();
        self.dispatcher.abort();
        self.listeners.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

/// Forward view state, effects and session commands to the native listeners.
async fn dispatch(
    listeners: ViewListeners,
    mut state: watch::Receiver<CoreRoomViewState>,
    mut effects: mpsc::UnboundedReceiver<CoreRoomViewEffect>,
    mut commands: mpsc::UnboundedReceiver<CoreSessionCommand>,
) {
    let snapshot = |listeners: &ViewListeners| listeners.lock().unwrap_or_else(|p| p.into_inner()).clone();
    loop {
        tokio::select! {
            Ok(()) = state.changed() => {
                let view_state: RoomViewState = state.borrow_and_update().clone().into();
                for listener in snapshot(&listeners) {
                    listener.on_state(view_state.clone());
                }
            }
            Some(effect) = effects.recv() => {
                let effect = RoomViewEffect::from(effect);
                for listener in snapshot(&listeners) {
                    listener.on_effect(effect.clone());
                }
            }
            Some(command) = commands.recv() => {
                let command = SessionCommand::from(command);
                for listener in snapshot(&listeners) {
                    listener.on_command(command.clone());
                }
            }
            else => break,
        }
    }
    tracing::debug!("view dispatcher ended");
}
