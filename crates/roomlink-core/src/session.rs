use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::channel::{RoomEventChannel, RoomEventListener, RoomEventStream};
use crate::config::SessionConfig;
use crate::errors::RoomError;
use crate::events::{
    LocalParticipantEvent, NetworkQualityLevel, ParticipantSnapshot, RemoteParticipantEvent, RoomEvent,
    VideoTrack,
};
use crate::local::LocalParticipantManager;
use crate::media::LocalMedia;
use crate::participants::VideoTrackViewState;
use crate::sdk::{ConnectOptions, RoomHandle, RoomSlot, SdkError, SdkParticipant, SdkTrack, VideoClient};
use crate::settings::{MediaPreferences, SettingsSource};
use crate::stats::{RoomStats, StatsReport, StatsScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
}

/// Side effects the host performs on behalf of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    StartForegroundService { room_name: String },
    StopForegroundService,
}

struct RoomSession {
    id: Uuid,
    room_name: String,
    local_sid: Option<String>,
    /// Remote participants whose callbacks are forwarded.
    remote_listeners: BTreeSet<String>,
    stats: Option<StatsScheduler>,
    connect_task: Option<JoinHandle<()>>,
    /// Handle returned by the SDK while the room is still connecting.
    pending_room: Option<Arc<dyn RoomHandle>>,
    disconnect_requested: bool,
}

impl RoomSession {
    fn new(id: Uuid, room_name: &str) -> Self {
        Self {
            id,
            room_name: room_name.to_string(),
            local_sid: None,
            remote_listeners: BTreeSet::new(),
            stats: None,
            connect_task: None,
            pending_room: None,
            disconnect_requested: false,
        }
    }
}

struct Slot {
    state: SessionState,
    session: Option<RoomSession>,
}

impl Slot {
    /// The session `id` if it is still the active one and in one of `states`.
    fn current(&mut self, id: Uuid, states: &[SessionState]) -> Option<&mut RoomSession> {
        if !states.contains(&self.state) {
            return None;
        }
        self.session.as_mut().filter(|s| s.id == id)
    }
}

const LIVE: [SessionState; 2] = [SessionState::Connected, SessionState::Reconnecting];

struct Inner {
    runtime: Handle,
    client: Arc<dyn VideoClient>,
    settings: Arc<dyn SettingsSource>,
    channel: RoomEventChannel,
    room: RoomSlot,
    local: LocalParticipantManager,
    slot: Mutex<Slot>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    config: SessionConfig,
}

/// Owns the lifecycle of a room connection.
///
/// Translates SDK callbacks (delivered through [`RoomListener`]) into
/// [`RoomEvent`]s on a single ordered channel. At most one session is
/// active at a time.
#[derive(Clone)]
pub struct RoomSessionController {
    inner: Arc<Inner>,
}

impl RoomSessionController {
    /// `runtime` is used for the connect call and stats polling, so SDK
    /// callbacks may arrive on threads outside any tokio context.
    pub fn new(
        runtime: Handle,
        client: Arc<dyn VideoClient>,
        media: Arc<dyn LocalMedia>,
        settings: Arc<dyn SettingsSource>,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionCommand>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let channel = RoomEventChannel::new();
        let room = RoomSlot::default();
        let local = LocalParticipantManager::new(media, settings.clone(), channel.clone(), room.clone());
        let inner = Inner {
            runtime,
            client,
            settings,
            channel,
            room,
            local,
            slot: Mutex::new(Slot { state: SessionState::Idle, session: None }),
            commands,
            config,
        };
        (Self { inner: Arc::new(inner) }, command_rx)
    }

    /// Stream of every room event emitted from now on.
    pub fn subscribe(&self) -> RoomEventStream {
        self.inner.channel.subscribe()
    }

    pub fn add_listener(&self, listener: Arc<dyn RoomEventListener>) {
        self.inner.channel.add_listener(listener);
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn room_name(&self) -> Option<String> {
        self.inner.lock().session.as_ref().map(|s| s.room_name.clone())
    }

    /// The connected room, if any.
    pub fn room(&self) -> Option<Arc<dyn RoomHandle>> {
        self.inner.room.get()
    }

    /// Start connecting to `room_name`.
    ///
    /// Returns once the attempt is under way; the outcome is reported on the
    /// event channel (`Connected`, `ConnectFailure` or
    /// `MaxParticipantFailure`).
    pub fn connect(&self, identity: &str, room_name: &str) -> Result<(), RoomError> {
        let inner = &self.inner;
        if inner.channel.is_closed() {
            return Err(RoomError::Closed);
        }
        let id = Uuid::new_v4();
        {
            let mut slot = inner.lock();
            if slot.state != SessionState::Idle {
                return Err(RoomError::SessionActive);
            }
            slot.state = SessionState::Connecting;
            slot.session = Some(RoomSession::new(id, room_name));
            inner.channel.emit(RoomEvent::Connecting);
        }
        tracing::info!("connecting to room {room_name} as {identity} (session {id})");

        let prefs = MediaPreferences::from_settings(inner.settings.as_ref());
        let options = ConnectOptions {
            identity: identity.to_string(),
            room_name: room_name.to_string(),
            preferred_audio_codec: prefs.audio_codec,
            preferred_video_codec: prefs.video_codec,
            enable_network_quality: true,
            enable_dominant_speaker: true,
        };
        let listener = RoomListener { inner: Arc::downgrade(inner), session_id: id };
        let client = inner.client.clone();
        let task = inner.runtime.spawn(async move {
            match client.connect(options, listener.clone()).await {
                Ok(room) => listener.connect_started(room),
                Err(e) => {
                    tracing::warn!("connect call failed: {e}");
                    listener.on_connect_failure(e);
                }
            }
        });

        let mut slot = inner.lock();
        if let Some(session) = slot.current(id, &[SessionState::Connecting]) {
            session.connect_task = Some(task);
        }
        Ok(())
    }

    /// Leave the room.
    ///
    /// While connected this asks the SDK to disconnect; the state changes
    /// when the SDK reports `on_disconnected`. A pending connect is
    /// cancelled right away. Without a session this does nothing.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        let mut slot = inner.lock();
        match slot.state {
            SessionState::Idle => {
                tracing::debug!("disconnect ignored: no active session");
            }
            SessionState::Connecting => {
                let session = slot.session.take();
                slot.state = SessionState::Idle;
                inner.channel.emit(RoomEvent::Disconnected);
                drop(slot);
                tracing::info!("connect cancelled");
                if let Some(mut session) = session {
                    if let Some(task) = session.connect_task.take() {
                        task.abort();
                    }
                    if let Some(room) = session.pending_room.take() {
                        room.disconnect();
                    }
                }
            }
            SessionState::Connected | SessionState::Reconnecting => {
                let Some(session) = slot.session.as_mut() else {
                    return;
                };
                if session.disconnect_requested {
                    tracing::debug!("disconnect already requested");
                    return;
                }
                session.disconnect_requested = true;
                drop(slot);
                if let Some(room) = inner.room.get() {
                    tracing::info!("disconnecting from room {}", room.name());
                    room.disconnect();
                }
            }
        }
    }

    /// Tear the controller down: stop stats, cancel any connect, leave the
    /// room and unsubscribe every event consumer.
    pub fn dispose(&self) {
        let inner = &self.inner;
        let (state, session) = {
            let mut slot = inner.lock();
            let state = slot.state;
            slot.state = SessionState::Idle;
            (state, slot.session.take())
        };
        let room = inner.room.take();
        inner.channel.close();
        if let Some(mut session) = session {
            if let Some(mut stats) = session.stats.take() {
                stats.stop();
            }
            if let Some(task) = session.connect_task.take() {
                task.abort();
            }
            if let Some(room) = room.or(session.pending_room.take()) {
                room.disconnect();
            }
        }
        if LIVE.contains(&state) {
            inner.send_command(SessionCommand::StopForegroundService);
        }
        inner.local.on_room_disconnected();
        tracing::info!("room session controller disposed");
    }

    pub fn on_resume(&self) {
        self.inner.local.on_resume();
    }

    pub fn on_pause(&self) {
        self.inner.local.on_pause();
    }

    pub fn toggle_local_video(&self) {
        self.inner.local.toggle_local_video();
    }

    pub fn enable_local_video(&self) {
        self.inner.local.enable_local_video();
    }

    pub fn disable_local_video(&self) {
        self.inner.local.disable_local_video();
    }

    pub fn toggle_local_audio(&self) {
        self.inner.local.toggle_local_audio();
    }

    pub fn enable_local_audio(&self) {
        self.inner.local.enable_local_audio();
    }

    pub fn disable_local_audio(&self) {
        self.inner.local.disable_local_audio();
    }

    pub fn switch_camera(&self) {
        self.inner.local.switch_camera();
    }

    pub fn start_screen_capture(&self) {
        self.inner.local.start_screen_capture();
    }

    pub fn stop_screen_capture(&self) {
        self.inner.local.stop_screen_capture();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn send_command(&self, command: SessionCommand) {
        tracing::debug!("session command: {command:?}");
        if self.commands.send(command).is_err() {
            tracing::debug!("no command executor attached");
        }
    }

    fn connect_started(&self, id: Uuid, room: Arc<dyn RoomHandle>) {
        let mut slot = self.lock();
        if let Some(session) = slot.current(id, &[SessionState::Connecting]) {
            session.pending_room = Some(room);
        }
    }

    fn handle_connected(self: &Arc<Self>, id: Uuid, room: Arc<dyn RoomHandle>) {
        let local = room.local_participant();
        let remotes = room.remote_participants();
        let room_name = room.name();

        let mut slot = self.lock();
        if slot.current(id, &[SessionState::Connecting]).is_none() {
            let owned = slot.session.as_ref().is_some_and(|s| s.id == id);
            drop(slot);
            if owned {
                tracing::debug!("ignoring repeated on_connected for session {id}");
            } else {
                // The attempt was cancelled while the SDK was still joining.
                tracing::info!("room {room_name} connected for ended session {id}, leaving it");
                room.disconnect();
            }
            return;
        }
        let Some(local) = local else {
            tracing::error!("room {room_name} connected without a local participant");
            slot.session = None;
            slot.state = SessionState::Idle;
            self.channel.emit(RoomEvent::ConnectFailure);
            drop(slot);
            room.disconnect();
            return;
        };
        tracing::info!("connected to room {room_name} (sid {})", room.sid());

        slot.state = SessionState::Connected;
        self.room.set(room.clone());
        let Some(session) = slot.session.as_mut() else {
            return;
        };
        session.local_sid = Some(local.sid.clone());
        session.remote_listeners = remotes.iter().map(|p| p.sid.clone()).collect();
        session.pending_room = None;
        session.connect_task = None;
        session.room_name = room_name.clone();

        let participants = std::iter::once(&local)
            .chain(remotes.iter())
            .map(participant_snapshot)
            .collect();
        self.channel.emit(RoomEvent::Connected { participants, room_name: room_name.clone() });
        self.send_command(SessionCommand::StartForegroundService { room_name: room_name.clone() });

        let weak = Arc::downgrade(self);
        session.stats = Some(StatsScheduler::start(
            &self.runtime,
            room,
            self.config.stats_interval(),
            move |reports| {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.send_stats_update(id, reports);
                    }
                }
            },
        ));
        drop(slot);

        if let Err(e) = self.local.publish_local_tracks() {
            tracing::warn!("local tracks not published on {room_name}: {e}");
        }
    }

    fn handle_connect_failure(&self, id: Uuid, error: SdkError) {
        let mut slot = self.lock();
        if slot.current(id, &[SessionState::Connecting]).is_none() {
            tracing::debug!("ignoring connect failure for stale session {id}: {error}");
            return;
        }
        tracing::error!("failed to connect to room: code={} error={}", error.code, error.message);
        slot.session = None;
        slot.state = SessionState::Idle;
        self.channel.emit(if error.is_capacity_exceeded() {
            RoomEvent::MaxParticipantFailure
        } else {
            RoomEvent::ConnectFailure
        });
    }

    fn handle_disconnected(&self, id: Uuid, error: Option<SdkError>) {
        let mut slot = self.lock();
        if slot.current(id, &[SessionState::Connecting]).is_some() {
            drop(slot);
            let error = error.unwrap_or_else(|| SdkError::new(0, "disconnected while connecting"));
            self.handle_connect_failure(id, error);
            return;
        }
        if slot.current(id, &LIVE).is_none() {
            tracing::debug!("ignoring on_disconnected for stale session {id}");
            return;
        }
        match &error {
            Some(e) => tracing::info!("disconnected from room: {e}"),
            None => tracing::info!("disconnected from room"),
        }
        let session = slot.session.take();
        slot.state = SessionState::Idle;
        if let Some(mut stats) = session.and_then(|mut s| s.stats.take()) {
            stats.stop();
        }
        self.room.take();
        self.channel.emit(RoomEvent::Disconnected);
        self.send_command(SessionCommand::StopForegroundService);
        drop(slot);

        self.local.on_room_disconnected();
    }

    fn handle_reconnecting(&self, id: Uuid, error: SdkError) {
        let mut slot = self.lock();
        if slot.current(id, &[SessionState::Connected]).is_some() {
            tracing::info!("reconnecting: {error}");
            slot.state = SessionState::Reconnecting;
        }
    }

    fn handle_reconnected(&self, id: Uuid) {
        let mut slot = self.lock();
        if slot.current(id, &[SessionState::Reconnecting]).is_some() {
            tracing::info!("reconnected");
            slot.state = SessionState::Connected;
        }
    }

    /// Emit the event `f` derives from the live session `id`, if any.
    fn emit_live(&self, id: Uuid, f: impl FnOnce(&mut RoomSession) -> Option<RoomEvent>) {
        let mut slot = self.lock();
        let Some(session) = slot.current(id, &LIVE) else {
            tracing::debug!("dropping room callback for inactive session {id}");
            return;
        };
        if let Some(event) = f(session) {
            self.channel.emit(event);
        }
    }

    /// Emit a remote participant event if that participant has a listener.
    fn emit_remote(&self, id: Uuid, sid: &str, event: RemoteParticipantEvent) {
        self.emit_live(id, |session| {
            if session.remote_listeners.contains(sid) {
                Some(RoomEvent::RemoteParticipant(event))
            } else {
                tracing::debug!("no listener on participant {sid}, dropping callback");
                None
            }
        });
    }

    fn send_stats_update(&self, id: Uuid, reports: Vec<StatsReport>) {
        let Some(room) = self.room.get() else {
            return;
        };
        let remote_participants = room.remote_participants().iter().map(participant_snapshot).collect();
        let local_video_track_names = self.local.local_video_track_names();
        self.emit_live(id, |_| {
            Some(RoomEvent::StatsUpdate(RoomStats { remote_participants, local_video_track_names, reports }))
        });
    }
}

fn video_track(track: &SdkTrack) -> VideoTrack {
    VideoTrack { sid: track.sid.clone(), name: track.name.clone() }
}

/// Convert an SDK participant to the domain snapshot.
fn participant_snapshot(p: &SdkParticipant) -> ParticipantSnapshot {
    let camera = p.video_tracks.iter().find(|t| !t.is_screen());
    let screen = p.video_tracks.iter().find(|t| t.is_screen());
    ParticipantSnapshot {
        sid: p.sid.clone(),
        identity: p.identity.clone(),
        is_muted: !p.audio_tracks.iter().any(|t| t.enabled),
        network_quality_level: NetworkQualityLevel::from_level(p.network_quality_level),
        video_track: camera.map(|t| VideoTrackViewState::switched(video_track(t), t.switched_off)),
        screen_track: screen.map(|t| VideoTrackViewState::new(video_track(t))),
    }
}

/// Callback sink handed to the SDK on connect.
///
/// The SDK adapter calls these from any thread. Each listener is bound to
/// the session it was created for; callbacks arriving after that session
/// ended are ignored.
#[derive(Clone)]
pub struct RoomListener {
    inner: Weak<Inner>,
    session_id: Uuid,
}

impl RoomListener {
    fn with_inner(&self, f: impl FnOnce(&Arc<Inner>)) {
        match self.inner.upgrade() {
            Some(inner) => f(&inner),
            None => tracing::debug!("room callback after controller was dropped"),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    fn connect_started(&self, room: Arc<dyn RoomHandle>) {
        self.with_inner(|inner| inner.connect_started(self.session_id, room));
    }

    pub fn on_connected(&self, room: Arc<dyn RoomHandle>) {
        match self.inner.upgrade() {
            Some(inner) => inner.handle_connected(self.session_id, room),
            None => {
                tracing::info!("room {} connected after controller was dropped, leaving it", room.name());
                room.disconnect();
            }
        }
    }

    pub fn on_connect_failure(&self, error: SdkError) {
        self.with_inner(|inner| inner.handle_connect_failure(self.session_id, error));
    }

    pub fn on_disconnected(&self, error: Option<SdkError>) {
        self.with_inner(|inner| inner.handle_disconnected(self.session_id, error));
    }

    pub fn on_reconnecting(&self, error: SdkError) {
        self.with_inner(|inner| inner.handle_reconnecting(self.session_id, error));
    }

    pub fn on_reconnected(&self) {
        self.with_inner(|inner| inner.handle_reconnected(self.session_id));
    }

    pub fn on_participant_connected(&self, participant: SdkParticipant) {
        self.with_inner(|inner| {
            tracing::info!("remote participant connected: {}", participant.sid);
            inner.emit_live(self.session_id, |session| {
                session.remote_listeners.insert(participant.sid.clone());
                Some(RoomEvent::RemoteParticipant(RemoteParticipantEvent::Connected(
                    participant_snapshot(&participant),
                )))
            });
        });
    }

    pub fn on_participant_disconnected(&self, sid: &str) {
        self.with_inner(|inner| {
            tracing::info!("remote participant disconnected: {sid}");
            inner.emit_live(self.session_id, |session| {
                session.remote_listeners.remove(sid);
                Some(RoomEvent::RemoteParticipant(RemoteParticipantEvent::Disconnected {
                    sid: sid.to_string(),
                }))
            });
        });
    }

    pub fn on_dominant_speaker_changed(&self, sid: Option<&str>) {
        self.with_inner(|inner| {
            inner.emit_live(self.session_id, |_| {
                Some(RoomEvent::DominantSpeakerChanged { sid: sid.map(str::to_string) })
            });
        });
    }

    pub fn on_recording_started(&self) {
        self.with_inner(|inner| inner.emit_live(self.session_id, |_| Some(RoomEvent::RecordingStarted)));
    }

    pub fn on_recording_stopped(&self) {
        self.with_inner(|inner| inner.emit_live(self.session_id, |_| Some(RoomEvent::RecordingStopped)));
    }

    pub fn on_video_track_subscribed(&self, participant_sid: &str, track: SdkTrack) {
        let sid = participant_sid.to_string();
        let event = if track.is_screen() {
            RemoteParticipantEvent::ScreenTrackUpdated { sid, track: Some(video_track(&track)) }
        } else {
            RemoteParticipantEvent::VideoTrackUpdated { sid, track: Some(video_track(&track)) }
        };
        self.with_inner(|inner| inner.emit_remote(self.session_id, participant_sid, event));
    }

    pub fn on_video_track_unsubscribed(&self, participant_sid: &str, track: SdkTrack) {
        let sid = participant_sid.to_string();
        let event = if track.is_screen() {
            RemoteParticipantEvent::ScreenTrackUpdated { sid, track: None }
        } else {
            RemoteParticipantEvent::VideoTrackUpdated { sid, track: None }
        };
        self.with_inner(|inner| inner.emit_remote(self.session_id, participant_sid, event));
    }

    pub fn on_video_track_switched_off(&self, participant_sid: &str, track: SdkTrack) {
        self.track_switch(participant_sid, track, true);
    }

    pub fn on_video_track_switched_on(&self, participant_sid: &str, track: SdkTrack) {
        self.track_switch(participant_sid, track, false);
    }

    fn track_switch(&self, participant_sid: &str, track: SdkTrack, switched_off: bool) {
        if track.is_screen() {
            tracing::debug!("screen track {} switched_off={switched_off}, not tracked", track.sid);
            return;
        }
        let event = RemoteParticipantEvent::TrackSwitchOff {
            sid: participant_sid.to_string(),
            track: video_track(&track),
            switched_off,
        };
        self.with_inner(|inner| inner.emit_remote(self.session_id, participant_sid, event));
    }

    pub fn on_audio_track_subscribed(&self, participant_sid: &str) {
        self.mute_changed(participant_sid, false);
    }

    pub fn on_audio_track_unsubscribed(&self, participant_sid: &str) {
        self.mute_changed(participant_sid, true);
    }

    pub fn on_audio_track_enabled(&self, participant_sid: &str) {
        self.mute_changed(participant_sid, false);
    }

    pub fn on_audio_track_disabled(&self, participant_sid: &str) {
        self.mute_changed(participant_sid, true);
    }

    fn mute_changed(&self, participant_sid: &str, muted: bool) {
        let event = RemoteParticipantEvent::MuteChanged { sid: participant_sid.to_string(), muted };
        self.with_inner(|inner| inner.emit_remote(self.session_id, participant_sid, event));
    }

    /// Network quality of any participant, local or remote.
    pub fn on_network_quality_level_changed(&self, participant_sid: &str, level: Option<u8>) {
        let level = NetworkQualityLevel::from_level(level);
        self.with_inner(|inner| {
            inner.emit_live(self.session_id, |session| {
                if session.local_sid.as_deref() == Some(participant_sid) {
                    Some(RoomEvent::LocalParticipant(LocalParticipantEvent::NetworkQualityChanged { level }))
                } else if session.remote_listeners.contains(participant_sid) {
                    Some(RoomEvent::RemoteParticipant(RemoteParticipantEvent::NetworkQualityChanged {
                        sid: participant_sid.to_string(),
                        level,
                    }))
                } else {
                    None
                }
            });
        });
    }
}
