//! Folds room events and user actions into a [`RoomViewState`].
//!
//! The reducer is plain data: no locks, no I/O. [`crate::view_model`] runs
//! it on a single task so events are applied strictly in arrival order.

use crate::config::SessionConfig;
use crate::devices::AudioDevice;
use crate::events::{LocalParticipantEvent, RemoteParticipantEvent, RoomEvent, VideoTrack};
use crate::participants::{ParticipantRegistry, ParticipantViewState, VideoTrackViewState};
use crate::view_state::{RoomViewConfiguration, RoomViewEffect, RoomViewState};

pub struct RoomReducer {
    registry: ParticipantRegistry,
    state: RoomViewState,
    permissions_denied_reported: bool,
}

impl RoomReducer {
    pub fn new(config: &SessionConfig) -> Self {
        let registry = ParticipantRegistry::new(&config.local_participant_label);
        let state = RoomViewState::new(registry.primary_participant().clone());
        Self { registry, state, permissions_denied_reported: false }
    }

    pub fn state(&self) -> &RoomViewState {
        &self.state
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    pub fn remote_participant_count(&self) -> usize {
        self.registry.remote_participant_count()
    }

    pub fn apply_room_event(&mut self, event: &RoomEvent) -> Vec<RoomViewEffect> {
        let mut effects = Vec::new();
        match event {
            RoomEvent::Connecting => {
                self.state.configuration = RoomViewConfiguration::Connecting;
            }
            RoomEvent::Connected { participants, room_name } => {
                self.state.configuration = RoomViewConfiguration::Connected;
                self.state.title = Some(room_name.clone());
                let mut participants = participants.iter();
                if let Some(local) = participants.next() {
                    self.registry.update_local_participant_sid(&local.sid);
                }
                for remote in participants {
                    self.registry.add_participant(ParticipantViewState::remote(remote));
                }
                self.refresh_participants();
                effects.push(RoomViewEffect::Connected { room_name: room_name.clone() });
            }
            RoomEvent::Disconnected => self.show_lobby(&mut effects),
            RoomEvent::ConnectFailure => {
                self.show_lobby(&mut effects);
                effects.push(RoomViewEffect::ShowConnectFailureDialog);
            }
            RoomEvent::MaxParticipantFailure => {
                self.show_lobby(&mut effects);
                effects.push(RoomViewEffect::ShowMaxParticipantFailureDialog);
            }
            RoomEvent::DominantSpeakerChanged { sid } => {
                self.registry.change_dominant_speaker(sid.as_deref());
                self.refresh_participants();
            }
            RoomEvent::RecordingStarted => self.state.is_recording = true,
            RoomEvent::RecordingStopped => self.state.is_recording = false,
            RoomEvent::StatsUpdate(stats) => self.state.room_stats = Some(stats.clone()),
            RoomEvent::RemoteParticipant(event) => self.apply_remote(event),
            RoomEvent::LocalParticipant(event) => self.apply_local(event),
        }
        effects
    }

    fn apply_remote(&mut self, event: &RemoteParticipantEvent) {
        match event {
            RemoteParticipantEvent::Connected(snapshot) => {
                self.registry.add_participant(ParticipantViewState::remote(snapshot));
            }
            RemoteParticipantEvent::Disconnected { sid } => self.registry.remove_participant(sid),
            RemoteParticipantEvent::VideoTrackUpdated { sid, track } => {
                self.registry.update_video_track(sid, track_state(track));
            }
            RemoteParticipantEvent::ScreenTrackUpdated { sid, track } => {
                self.registry.update_screen_track(sid, track_state(track));
            }
            RemoteParticipantEvent::TrackSwitchOff { sid, track, switched_off } => {
                self.registry
                    .update_video_track(sid, Some(VideoTrackViewState::switched(track.clone(), *switched_off)));
            }
            RemoteParticipantEvent::MuteChanged { sid, muted } => self.registry.mute_participant(sid, *muted),
            RemoteParticipantEvent::NetworkQualityChanged { sid, level } => {
                self.registry.update_network_quality(sid, *level);
            }
        }
        self.refresh_participants();
    }

    fn apply_local(&mut self, event: &LocalParticipantEvent) {
        match event {
            LocalParticipantEvent::VideoTrackUpdated { track } => {
                self.registry.update_local_video_track(track_state(track));
                self.state.is_video_off = track.is_none();
                self.refresh_participants();
            }
            LocalParticipantEvent::NetworkQualityChanged { level } => {
                self.registry.update_local_network_quality(*level);
                self.refresh_participants();
            }
            LocalParticipantEvent::AudioOn => self.state.is_audio_muted = false,
            LocalParticipantEvent::AudioOff => self.state.is_audio_muted = true,
            LocalParticipantEvent::AudioEnabled => self.state.is_audio_enabled = true,
            LocalParticipantEvent::AudioDisabled => self.state.is_audio_enabled = false,
            LocalParticipantEvent::VideoEnabled => self.state.is_video_enabled = true,
            LocalParticipantEvent::VideoDisabled => self.state.is_video_enabled = false,
            LocalParticipantEvent::ScreenCaptureOn => self.state.is_screen_capture_on = true,
            LocalParticipantEvent::ScreenCaptureOff => self.state.is_screen_capture_on = false,
        }
    }

    /// Record the permission check. Returns the effects and whether both
    /// permissions are granted. `PermissionsDenied` is reported only once.
    pub fn apply_permissions(&mut self, camera: bool, microphone: bool) -> (Vec<RoomViewEffect>, bool) {
        self.state.is_camera_enabled = camera;
        self.state.is_mic_enabled = microphone;
        let granted = camera && microphone;
        let mut effects = Vec::new();
        if !granted && !self.permissions_denied_reported {
            self.permissions_denied_reported = true;
            effects.push(RoomViewEffect::PermissionsDenied);
        }
        (effects, granted)
    }

    pub fn pin_participant(&mut self, sid: &str) {
        self.registry.change_pinned_participant(sid);
        self.refresh_participants();
    }

    /// The renderer lost a participant's video track.
    pub fn remove_video_track(&mut self, sid: &str) {
        self.registry.update_video_track(sid, None);
        self.refresh_participants();
    }

    pub fn remove_screen_track(&mut self, sid: &str) {
        self.registry.update_screen_track(sid, None);
        self.refresh_participants();
    }

    pub fn apply_audio_devices(&mut self, available: Vec<AudioDevice>, selected: Option<AudioDevice>) {
        self.state.available_audio_devices = available;
        self.state.selected_device = selected;
    }

    fn show_lobby(&mut self, effects: &mut Vec<RoomViewEffect>) {
        effects.push(RoomViewEffect::Disconnected);
        self.state.configuration = RoomViewConfiguration::Lobby;
        self.registry.clear_remote_participants();
        self.refresh_participants();
    }

    fn refresh_participants(&mut self) {
        self.state.primary_participant = self.registry.primary_participant().clone();
        self.state.participant_thumbnails = self.registry.participant_thumbnails();
    }
}

fn track_state(track: &Option<VideoTrack>) -> Option<VideoTrackViewState> {
    track.clone().map(VideoTrackViewState::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::AudioDeviceKind;
    use crate::events::{NetworkQualityLevel, ParticipantSnapshot};
    use crate::stats::RoomStats;

    fn snapshot(sid: &str, identity: &str) -> ParticipantSnapshot {
        ParticipantSnapshot {
            sid: sid.to_string(),
            identity: identity.to_string(),
            is_muted: false,
            network_quality_level: NetworkQualityLevel::Unknown,
            video_track: None,
            screen_track: None,
        }
    }

    fn track(sid: &str) -> VideoTrack {
        VideoTrack { sid: sid.to_string(), name: "camera".to_string() }
    }

    fn connected(reducer: &mut RoomReducer, remotes: &[(&str, &str)]) -> Vec<RoomViewEffect> {
        let participants = std::iter::once(snapshot("PA", "me"))
            .chain(remotes.iter().map(|(sid, identity)| snapshot(sid, identity)))
            .collect();
        reducer.apply_room_event(&RoomEvent::Connecting);
        reducer.apply_room_event(&RoomEvent::Connected { participants, room_name: "standup".into() })
    }

    fn thumbnail_sids(reducer: &RoomReducer) -> Vec<String> {
        reducer.state().participant_thumbnails.iter().map(|p| p.sid.clone()).collect()
    }

    #[test]
    fn initial_state_is_lobby_with_local_primary() {
        let reducer = RoomReducer::new(&SessionConfig::default());
        let state = reducer.state();
        assert_eq!(state.configuration, RoomViewConfiguration::Lobby);
        assert!(state.primary_participant.is_local);
        assert_eq!(state.primary_participant.identity, "You");
        assert!(state.participant_thumbnails.is_empty());
        assert!(state.is_audio_enabled && state.is_video_enabled);
    }

    #[test]
    fn connected_sets_title_and_participants() {
        let mut reducer = RoomReducer::new(&SessionConfig::default());
        let effects = connected(&mut reducer, &[("PB", "bob@acme.org"), ("PC", "carol")]);
        assert_eq!(effects, vec![RoomViewEffect::Connected { room_name: "standup".into() }]);

        let state = reducer.state();
        assert_eq!(state.configuration, RoomViewConfiguration::Connected);
        assert_eq!(state.title.as_deref(), Some("standup"));
        assert_eq!(state.primary_participant.sid, "PB");
        assert_eq!(state.primary_participant.identity, "bob");
        assert_eq!(thumbnail_sids(&reducer), vec!["PA", "PC"]);
        assert_eq!(reducer.registry().local_participant().map(|p| p.sid.as_str()), Some("PA"));
    }

    #[test]
    fn pin_then_dominant_speaker() {
        // B and C remote; pin C; dominant speaker B; C stays primary.
        let mut reducer = RoomReducer::new(&SessionConfig::default());
        connected(&mut reducer, &[("PB", "bob"), ("PC", "carol")]);

        reducer.pin_participant("PC");
        reducer.apply_room_event(&RoomEvent::DominantSpeakerChanged { sid: Some("PB".into()) });
        assert_eq!(reducer.state().primary_participant.sid, "PC");
        assert_eq!(thumbnail_sids(&reducer), vec!["PA", "PB"]);

        // Unpin: the dominant speaker takes over.
        reducer.pin_participant("PC");
        assert_eq!(reducer.state().primary_participant.sid, "PB");
        assert_eq!(thumbnail_sids(&reducer), vec!["PA", "PC"]);
    }

    #[test]
    fn remote_video_updates_move_primary() {
        let mut reducer = RoomReducer::new(&SessionConfig::default());
        connected(&mut reducer, &[("PB", "bob"), ("PC", "carol")]);

        let update = |sid: &str, track| {
            RoomEvent::RemoteParticipant(RemoteParticipantEvent::VideoTrackUpdated { sid: sid.into(), track })
        };
        reducer.apply_room_event(&update("PC", Some(track("TC"))));
        assert_eq!(reducer.state().primary_participant.sid, "PC");

        reducer.apply_room_event(&RoomEvent::RemoteParticipant(RemoteParticipantEvent::TrackSwitchOff {
            sid: "PC".into(),
            track: track("TC"),
            switched_off: true,
        }));
        let primary = &reducer.state().primary_participant;
        assert_eq!(primary.sid, "PB");
        assert_eq!(
            reducer.registry().participant("PC").and_then(|p| p.video_track.clone()),
            Some(VideoTrackViewState::switched(track("TC"), true))
        );

        reducer.apply_room_event(&update("PC", Some(track("TC"))));
        reducer.remove_video_track("PC");
        assert_eq!(reducer.state().primary_participant.sid, "PB");
    }

    #[test]
    fn remote_leave_and_mute() {
        let mut reducer = RoomReducer::new(&SessionConfig::default());
        connected(&mut reducer, &[("PB", "bob")]);
        reducer.apply_room_event(&RoomEvent::RemoteParticipant(RemoteParticipantEvent::Connected(snapshot(
            "PC", "carol",
        ))));
        reducer.apply_room_event(&RoomEvent::RemoteParticipant(RemoteParticipantEvent::MuteChanged {
            sid: "PC".into(),
            muted: true,
        }));
        assert_eq!(thumbnail_sids(&reducer), vec!["PA", "PC"]);
        assert!(reducer.state().participant_thumbnails[1].is_muted);

        reducer.apply_room_event(&RoomEvent::RemoteParticipant(RemoteParticipantEvent::Disconnected {
            sid: "PB".into(),
        }));
        assert_eq!(reducer.state().primary_participant.sid, "PC");
        assert_eq!(reducer.remote_participant_count(), 1);
    }

    #[test]
    fn failures_return_to_lobby_with_distinct_dialogs() {
        let mut reducer = RoomReducer::new(&SessionConfig::default());
        connected(&mut reducer, &[("PB", "bob")]);
        let effects = reducer.apply_room_event(&RoomEvent::Disconnected);
        assert_eq!(effects, vec![RoomViewEffect::Disconnected]);
        assert_eq!(reducer.state().configuration, RoomViewConfiguration::Lobby);
        assert_eq!(reducer.remote_participant_count(), 0);
        assert!(reducer.state().primary_participant.is_local);

        reducer.apply_room_event(&RoomEvent::Connecting);
        let effects = reducer.apply_room_event(&RoomEvent::ConnectFailure);
        assert_eq!(effects, vec![RoomViewEffect::Disconnected, RoomViewEffect::ShowConnectFailureDialog]);

        reducer.apply_room_event(&RoomEvent::Connecting);
        let effects = reducer.apply_room_event(&RoomEvent::MaxParticipantFailure);
        assert_eq!(
            effects,
            vec![RoomViewEffect::Disconnected, RoomViewEffect::ShowMaxParticipantFailureDialog]
        );
        assert_eq!(reducer.state().configuration, RoomViewConfiguration::Lobby);
    }

    #[test]
    fn local_events_update_flags() {
        let mut reducer = RoomReducer::new(&SessionConfig::default());
        for event in [
            LocalParticipantEvent::AudioOff,
            LocalParticipantEvent::VideoDisabled,
            LocalParticipantEvent::ScreenCaptureOn,
            LocalParticipantEvent::VideoTrackUpdated { track: None },
            LocalParticipantEvent::NetworkQualityChanged { level: NetworkQualityLevel::Three },
        ] {
            assert!(reducer.apply_room_event(&RoomEvent::LocalParticipant(event)).is_empty());
        }
        let state = reducer.state();
        assert!(state.is_audio_muted);
        assert!(!state.is_video_enabled);
        assert!(state.is_screen_capture_on);
        assert!(state.is_video_off);
        assert_eq!(state.primary_participant.network_quality_level, NetworkQualityLevel::Three);

        reducer.apply_room_event(&RoomEvent::LocalParticipant(LocalParticipantEvent::VideoTrackUpdated {
            track: Some(track("MT1")),
        }));
        assert!(!reducer.state().is_video_off);
        assert!(reducer.state().primary_participant.video_track.is_some());
    }

    #[test]
    fn recording_and_stats() {
        let mut reducer = RoomReducer::new(&SessionConfig::default());
        reducer.apply_room_event(&RoomEvent::RecordingStarted);
        assert!(reducer.state().is_recording);
        reducer.apply_room_event(&RoomEvent::RecordingStopped);
        assert!(!reducer.state().is_recording);

        reducer.apply_room_event(&RoomEvent::StatsUpdate(RoomStats::default()));
        assert_eq!(reducer.state().room_stats, Some(RoomStats::default()));
    }

    #[test]
    fn permissions_denied_reported_once() {
        let mut reducer = RoomReducer::new(&SessionConfig::default());
        assert_eq!(reducer.apply_permissions(true, false), (vec![RoomViewEffect::PermissionsDenied], false));
        assert_eq!(reducer.apply_permissions(false, false), (Vec::new(), false));
        assert!(!reducer.state().is_camera_enabled);
        assert_eq!(reducer.apply_permissions(true, true), (Vec::new(), true));
        assert!(reducer.state().is_camera_enabled && reducer.state().is_mic_enabled);
    }

    #[test]
    fn audio_devices_are_stored() {
        let mut reducer = RoomReducer::new(&SessionConfig::default());
        let speaker = AudioDevice { name: "Speakerphone".into(), kind: AudioDeviceKind::Speakerphone };
        let earpiece = AudioDevice { name: "Earpiece".into(), kind: AudioDeviceKind::Earpiece };
        reducer.apply_audio_devices(vec![speaker.clone(), earpiece], Some(speaker.clone()));
        assert_eq!(reducer.state().available_audio_devices.len(), 2);
        assert_eq!(reducer.state().selected_device, Some(speaker));
    }
}
