use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::channel::RoomEventChannel;
use crate::errors::RoomError;
use crate::events::{LocalParticipantEvent, RoomEvent, VideoTrack};
use crate::media::LocalMedia;
use crate::sdk::{CAMERA_TRACK_NAME, LocalTrack, MICROPHONE_TRACK_NAME, RoomSlot, SCREEN_TRACK_NAME};
use crate::settings::{MediaPreferences, SettingsSource};

#[derive(Default)]
struct LocalTracks {
    audio: Option<LocalTrack>,
    camera: Option<LocalTrack>,
    screen: Option<LocalTrack>,
    /// User muted the microphone.
    is_audio_muted: bool,
    /// User turned the camera off (as opposed to a pause releasing it).
    is_video_muted: bool,
    /// Published video tracks, sid to name.
    published_video: BTreeMap<String, String>,
}

/// Local microphone, camera and screen tracks of the user.
///
/// Tracks exist in the lobby too (camera preview); they are published
/// whenever a room is connected. Every visible change is reported as a
/// [`LocalParticipantEvent`] on the room event channel.
pub struct LocalParticipantManager {
    media: Arc<dyn LocalMedia>,
    settings: Arc<dyn SettingsSource>,
    channel: RoomEventChannel,
    room: RoomSlot,
    tracks: Mutex<LocalTracks>,
}

impl LocalParticipantManager {
    pub fn new(
        media: Arc<dyn LocalMedia>,
        settings: Arc<dyn SettingsSource>,
        channel: RoomEventChannel,
        room: RoomSlot,
    ) -> Self {
        Self {
            media,
            settings,
            channel,
            room,
            tracks: Mutex::new(LocalTracks::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LocalTracks> {
        self.tracks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: LocalParticipantEvent) {
        self.channel.emit(RoomEvent::LocalParticipant(event));
    }

    /// Recreate the tracks the user has not switched off.
    pub fn on_resume(&self) {
        let mut tracks = self.lock();
        if !tracks.is_audio_muted && tracks.audio.is_none() {
            self.setup_audio_track(&mut tracks);
        }
        if !tracks.is_video_muted && tracks.camera.is_none() {
            self.setup_camera_track(&mut tracks);
        }
    }

    /// Release the camera while the app is in the background.
    pub fn on_pause(&self) {
        let mut tracks = self.lock();
        if !tracks.is_video_muted {
            self.remove_camera_track(&mut tracks);
        }
    }

    pub fn toggle_local_video(&self) {
        let mut tracks = self.lock();
        if tracks.camera.is_some() {
            tracks.is_video_muted = true;
            self.remove_camera_track(&mut tracks);
        } else {
            tracks.is_video_muted = false;
            self.setup_camera_track(&mut tracks);
        }
    }

    pub fn enable_local_video(&self) {
        let tracks = self.lock();
        if let Some(track) = &tracks.camera {
            self.media.set_video_enabled(track, true);
        }
        self.emit(LocalParticipantEvent::VideoEnabled);
    }

    pub fn disable_local_video(&self) {
        let tracks = self.lock();
        if let Some(track) = &tracks.camera {
            self.media.set_video_enabled(track, false);
        }
        self.emit(LocalParticipantEvent::VideoDisabled);
    }

    /// Mute or unmute the microphone.
    pub fn toggle_local_audio(&self) {
        let mut tracks = self.lock();
        let mute = !tracks.is_audio_muted;
        tracks.is_audio_muted = mute;
        if let Some(track) = &tracks.audio {
            self.media.set_audio_enabled(track, !mute);
        } else if !mute {
            self.setup_audio_track(&mut tracks);
        }
        self.emit(if mute {
            LocalParticipantEvent::AudioOff
        } else {
            LocalParticipantEvent::AudioOn
        });
    }

    pub fn enable_local_audio(&self) {
        let mut tracks = self.lock();
        if tracks.audio.is_none() && !tracks.is_audio_muted {
            self.setup_audio_track(&mut tracks);
        }
        self.emit(LocalParticipantEvent::AudioEnabled);
    }

    pub fn disable_local_audio(&self) {
        let mut tracks = self.lock();
        if let Some(track) = tracks.audio.take() {
            self.unpublish(&mut tracks, &track);
            self.media.release_audio_track(&track);
        }
        self.emit(LocalParticipantEvent::AudioDisabled);
    }

    pub fn switch_camera(&self) {
        if self.lock().camera.is_some() {
            self.media.switch_camera();
        }
    }

    pub fn start_screen_capture(&self) {
        let mut tracks = self.lock();
        if tracks.screen.is_some() {
            return;
        }
        match self.media.start_screen_capture(SCREEN_TRACK_NAME) {
            Ok(track) => {
                self.publish(&mut tracks, &track);
                tracks.screen = Some(track);
                self.emit(LocalParticipantEvent::ScreenCaptureOn);
            }
            Err(e) => tracing::warn!("screen capture failed to start: {e}"),
        }
    }

    pub fn stop_screen_capture(&self) {
        let mut tracks = self.lock();
        if let Some(track) = tracks.screen.take() {
            self.unpublish(&mut tracks, &track);
            self.media.stop_screen_capture(&track);
            self.emit(LocalParticipantEvent::ScreenCaptureOff);
        }
    }

    /// Publish every existing track on the freshly connected room.
    pub fn publish_local_tracks(&self) -> Result<(), RoomError> {
        if self.room.get().is_none() {
            return Err(RoomError::NotConnected);
        }
        let mut tracks = self.lock();
        let existing: Vec<LocalTrack> =
            [&tracks.audio, &tracks.camera, &tracks.screen].into_iter().flatten().cloned().collect();
        for track in existing {
            self.publish(&mut tracks, &track);
        }
        Ok(())
    }

    /// Forget publications once the room is gone. Tracks stay for the lobby.
    pub fn on_room_disconnected(&self) {
        self.lock().published_video.clear();
    }

    pub fn local_video_track_names(&self) -> BTreeMap<String, String> {
        self.lock().published_video.clone()
    }

    pub fn is_audio_muted(&self) -> bool {
        self.lock().is_audio_muted
    }

    pub fn has_camera_track(&self) -> bool {
        self.lock().camera.is_some()
    }

    fn setup_audio_track(&self, tracks: &mut LocalTracks) {
        match self.media.create_audio_track(MICROPHONE_TRACK_NAME) {
            Ok(track) => {
                self.publish(tracks, &track);
                tracks.audio = Some(track);
            }
            Err(e) => tracing::warn!("microphone track unavailable: {e}"),
        }
    }

    fn setup_camera_track(&self, tracks: &mut LocalTracks) {
        let dimensions = MediaPreferences::from_settings(self.settings.as_ref()).capture_dimensions;
        match self.media.create_camera_track(CAMERA_TRACK_NAME, dimensions) {
            Ok(track) => {
                tracing::info!(
                    "camera track {} created at {}x{}",
                    track.sid,
                    dimensions.width,
                    dimensions.height
                );
                self.publish(tracks, &track);
                let video = VideoTrack { sid: track.sid.clone(), name: track.name.clone() };
                tracks.camera = Some(track);
                self.emit(LocalParticipantEvent::VideoTrackUpdated { track: Some(video) });
            }
            Err(e) => tracing::warn!("camera track unavailable: {e}"),
        }
    }

    fn remove_camera_track(&self, tracks: &mut LocalTracks) {
        if let Some(track) = tracks.camera.take() {
            self.unpublish(tracks, &track);
            self.media.release_video_track(&track);
            self.emit(LocalParticipantEvent::VideoTrackUpdated { track: None });
        }
    }

    fn publish(&self, tracks: &mut LocalTracks, track: &LocalTrack) {
        let Some(room) = self.room.get() else {
            return;
        };
        room.publish_track(track);
        if track.name != MICROPHONE_TRACK_NAME {
            tracks.published_video.insert(track.sid.clone(), track.name.clone());
        }
    }

    fn unpublish(&self, tracks: &mut LocalTracks, track: &LocalTrack) {
        tracks.published_video.remove(&track.sid);
        if let Some(room) = self.room.get() {
            room.unpublish_track(track);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::settings::{MemorySettings, VideoDimensions, keys};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Records every capture call; tracks get sequential sids.
    #[derive(Default)]
    pub(crate) struct FakeMedia {
        next: AtomicUsize,
        log: Mutex<Vec<String>>,
        pub deny_camera: AtomicBool,
    }

    impl FakeMedia {
        fn track(&self, name: &str) -> LocalTrack {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            LocalTrack { sid: format!("MT{n}"), name: name.to_string() }
        }

        fn record(&self, call: String) {
            self.log.lock().unwrap().push(call);
        }

        pub fn calls(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl LocalMedia for FakeMedia {
        fn create_audio_track(&self, name: &str) -> Result<LocalTrack, RoomError> {
            self.record("create_audio".into());
            Ok(self.track(name))
        }
        fn set_audio_enabled(&self, _track: &LocalTrack, enabled: bool) {
            self.record(format!("audio_enabled={enabled}"));
        }
        fn release_audio_track(&self, _track: &LocalTrack) {
            self.record("release_audio".into());
        }
        fn create_camera_track(&self, name: &str, dimensions: VideoDimensions) -> Result<LocalTrack, RoomError> {
            if self.deny_camera.load(Ordering::SeqCst) {
                return Err(RoomError::PermissionDenied("camera".into()));
            }
            self.record(format!("create_camera {}x{}", dimensions.width, dimensions.height));
            Ok(self.track(name))
        }
        fn set_video_enabled(&self, _track: &LocalTrack, enabled: bool) {
            self.record(format!("video_enabled={enabled}"));
        }
        fn release_video_track(&self, _track: &LocalTrack) {
            self.record("release_camera".into());
        }
        fn switch_camera(&self) {
            self.record("switch_camera".into());
        }
        fn start_screen_capture(&self, name: &str) -> Result<LocalTrack, RoomError> {
            self.record("start_screen".into());
            Ok(self.track(name))
        }
        fn stop_screen_capture(&self, _track: &LocalTrack) {
            self.record("stop_screen".into());
        }
    }

    fn manager() -> (LocalParticipantManager, Arc<FakeMedia>, crate::channel::RoomEventStream) {
        let media = Arc::new(FakeMedia::default());
        let settings = Arc::new(MemorySettings::default());
        settings.set(keys::VIDEO_CAPTURE_RESOLUTION, "3");
        let channel = RoomEventChannel::new();
        let stream = channel.subscribe();
        let mgr = LocalParticipantManager::new(media.clone(), settings, channel, RoomSlot::default());
        (mgr, media, stream)
    }

    fn drain(stream: &mut crate::channel::RoomEventStream) -> Vec<LocalParticipantEvent> {
        let mut out = Vec::new();
        while let Some(event) = stream.try_recv() {
            if let RoomEvent::LocalParticipant(e) = event {
                out.push(e);
            }
        }
        out
    }

    #[test]
    fn resume_creates_tracks_with_preferred_resolution() {
        let (mgr, media, mut stream) = manager();
        mgr.on_resume();
        assert_eq!(media.calls(), vec!["create_audio", "create_camera 960x540"]);
        assert!(matches!(
            drain(&mut stream).as_slice(),
            [LocalParticipantEvent::VideoTrackUpdated { track: Some(_) }]
        ));
        // Already there: nothing new.
        mgr.on_resume();
        assert_eq!(media.calls().len(), 2);
    }

    #[test]
    fn toggle_video_releases_and_recreates_camera() {
        let (mgr, media, mut stream) = manager();
        mgr.on_resume();
        drain(&mut stream);

        mgr.toggle_local_video();
        assert!(!mgr.has_camera_track());
        assert_eq!(drain(&mut stream), vec![LocalParticipantEvent::VideoTrackUpdated { track: None }]);

        // User turned video off: pause/resume must not bring it back.
        mgr.on_pause();
        mgr.on_resume();
        assert!(!mgr.has_camera_track());

        mgr.toggle_local_video();
        assert!(mgr.has_camera_track());
        assert!(media.calls().contains(&"release_camera".to_string()));
    }

    #[test]
    fn pause_releases_camera_until_resume() {
        let (mgr, _media, mut stream) = manager();
        mgr.on_resume();
        mgr.on_pause();
        assert!(!mgr.has_camera_track());
        mgr.on_resume();
        assert!(mgr.has_camera_track());
        let events = drain(&mut stream);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn toggle_audio_mutes_existing_track() {
        let (mgr, media, mut stream) = manager();
        mgr.on_resume();
        drain(&mut stream);

        mgr.toggle_local_audio();
        assert!(mgr.is_audio_muted());
        mgr.toggle_local_audio();
        assert!(!mgr.is_audio_muted());
        assert_eq!(
            drain(&mut stream),
            vec![LocalParticipantEvent::AudioOff, LocalParticipantEvent::AudioOn]
        );
        assert!(media.calls().ends_with(&["audio_enabled=false".to_string(), "audio_enabled=true".to_string()]));
    }

    #[test]
    fn enable_and_disable_emit_control_events() {
        let (mgr, media, mut stream) = manager();
        mgr.enable_local_audio();
        mgr.disable_local_audio();
        mgr.enable_local_video();
        mgr.disable_local_video();
        assert_eq!(
            drain(&mut stream),
            vec![
                LocalParticipantEvent::AudioEnabled,
                LocalParticipantEvent::AudioDisabled,
                LocalParticipantEvent::VideoEnabled,
                LocalParticipantEvent::VideoDisabled,
            ]
        );
        assert_eq!(media.calls(), vec!["create_audio", "release_audio"]);
    }

    #[test]
    fn screen_capture_starts_once() {
        let (mgr, media, mut stream) = manager();
        mgr.start_screen_capture();
        mgr.start_screen_capture();
        mgr.stop_screen_capture();
        mgr.stop_screen_capture();
        assert_eq!(
            drain(&mut stream),
            vec![LocalParticipantEvent::ScreenCaptureOn, LocalParticipantEvent::ScreenCaptureOff]
        );
        assert_eq!(media.calls(), vec!["start_screen", "stop_screen"]);
    }

    #[test]
    fn camera_failure_emits_nothing() {
        let (mgr, media, mut stream) = manager();
        media.deny_camera.store(true, Ordering::SeqCst);
        mgr.toggle_local_video();
        assert!(!mgr.has_camera_track());
        assert!(drain(&mut stream).is_empty());
    }

    #[test]
    fn switch_camera_needs_a_camera() {
        let (mgr, media, _stream) = manager();
        mgr.switch_camera();
        assert!(media.calls().is_empty());
        mgr.on_resume();
        mgr.switch_camera();
        assert_eq!(media.calls().last().map(String::as_str), Some("switch_camera"));
    }

    #[test]
    fn nothing_is_published_without_a_room() {
        let (mgr, _media, _stream) = manager();
        mgr.on_resume();
        assert_eq!(mgr.publish_local_tracks(), Err(RoomError::NotConnected));
        assert!(mgr.local_video_track_names().is_empty());
    }
}
