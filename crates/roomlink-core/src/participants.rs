use serde::Serialize;

use crate::events::{NetworkQualityLevel, ParticipantSnapshot, VideoTrack};

/// A video track as rendered in a participant tile.
///
/// A `None` track means "no video" whatever `is_switched_off` says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoTrackViewState {
    pub track: Option<VideoTrack>,
    pub is_switched_off: bool,
}

impl VideoTrackViewState {
    pub fn new(track: VideoTrack) -> Self {
        Self { track: Some(track), is_switched_off: false }
    }

    pub fn switched(track: VideoTrack, is_switched_off: bool) -> Self {
        Self { track: Some(track), is_switched_off }
    }

    /// True when there is a track and the server has not switched it off.
    pub fn is_active(&self) -> bool {
        self.track.is_some() && !self.is_switched_off
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantViewState {
    pub sid: String,
    /// Display identity, see [`display_identity`].
    pub identity: String,
    pub is_local: bool,
    pub is_muted: bool,
    pub is_pinned: bool,
    pub network_quality_level: NetworkQualityLevel,
    pub video_track: Option<VideoTrackViewState>,
    pub screen_track: Option<VideoTrackViewState>,
}

impl ParticipantViewState {
    fn local(label: &str) -> Self {
        Self {
            sid: String::new(),
            identity: label.to_string(),
            is_local: true,
            is_muted: false,
            is_pinned: false,
            network_quality_level: NetworkQualityLevel::Unknown,
            video_track: None,
            screen_track: None,
        }
    }

    /// Build the tile state of a remote participant from an SDK snapshot.
    pub fn remote(snapshot: &ParticipantSnapshot) -> Self {
        Self {
            sid: snapshot.sid.clone(),
            identity: display_identity(&snapshot.identity).to_string(),
            is_local: false,
            is_muted: snapshot.is_muted,
            is_pinned: false,
            network_quality_level: snapshot.network_quality_level,
            video_track: snapshot.video_track.clone(),
            screen_track: snapshot.screen_track.clone(),
        }
    }

    fn has_active_video(&self) -> bool {
        self.video_track.as_ref().is_some_and(VideoTrackViewState::is_active)
    }
}

/// Display identity of a remote participant.
///
/// The room service appends `@<suffix>` to identities; only the part before
/// the first `@` is shown.
pub fn display_identity(identity: &str) -> &str {
    identity.split('@').next().unwrap_or(identity)
}

/// Ordered view state of every participant in a room.
///
/// Always holds exactly one local participant, created at construction and
/// kept at index 0. Remote participants follow in join order. Every
/// operation is a no-op on an unknown sid.
#[derive(Debug, Clone)]
pub struct ParticipantRegistry {
    participants: Vec<ParticipantViewState>,
    dominant_speaker: Option<String>,
}

impl ParticipantRegistry {
    pub fn new(local_label: &str) -> Self {
        Self {
            participants: vec![ParticipantViewState::local(local_label)],
            dominant_speaker: None,
        }
    }

    /// Fix the local participant's sid once the room is connected.
    pub fn update_local_participant_sid(&mut self, sid: &str) {
        if let Some(local) = self.local_mut() {
            local.sid = sid.to_string();
        }
    }

    pub fn local_participant(&self) -> Option<&ParticipantViewState> {
        self.participants.iter().find(|p| p.is_local)
    }

    fn local_mut(&mut self) -> Option<&mut ParticipantViewState> {
        self.participants.iter_mut().find(|p| p.is_local)
    }

    /// Add a remote participant. A second add with the same sid replaces
    /// the tile in place so join order is kept.
    pub fn add_participant(&mut self, state: ParticipantViewState) {
        if state.is_local {
            tracing::warn!("refusing to add a second local participant {}", state.sid);
            return;
        }
        match self.participant_mut(&state.sid) {
            Some(existing) => {
                let is_pinned = existing.is_pinned;
                *existing = ParticipantViewState { is_pinned, ..state };
            }
            None => self.participants.push(state),
        }
    }

    pub fn remove_participant(&mut self, sid: &str) {
        self.participants.retain(|p| p.is_local || p.sid != sid);
        if self.dominant_speaker.as_deref() == Some(sid) {
            self.dominant_speaker = None;
        }
    }

    pub fn participants(&self) -> &[ParticipantViewState] {
        &self.participants
    }

    pub fn participant(&self, sid: &str) -> Option<&ParticipantViewState> {
        self.participants.iter().find(|p| p.sid == sid)
    }

    fn participant_mut(&mut self, sid: &str) -> Option<&mut ParticipantViewState> {
        self.participants.iter_mut().find(|p| p.sid == sid)
    }

    pub fn remote_participant_count(&self) -> usize {
        self.participants.iter().filter(|p| !p.is_local).count()
    }

    pub fn update_video_track(&mut self, sid: &str, track: Option<VideoTrackViewState>) {
        if let Some(p) = self.participant_mut(sid) {
            p.video_track = track;
        }
    }

    pub fn update_screen_track(&mut self, sid: &str, track: Option<VideoTrackViewState>) {
        if let Some(p) = self.participant_mut(sid) {
            p.screen_track = track;
        }
    }

    pub fn update_local_video_track(&mut self, track: Option<VideoTrackViewState>) {
        if let Some(local) = self.local_mut() {
            local.video_track = track;
        }
    }

    pub fn mute_participant(&mut self, sid: &str, muted: bool) {
        if let Some(p) = self.participant_mut(sid) {
            p.is_muted = muted;
        }
    }

    pub fn update_network_quality(&mut self, sid: &str, level: NetworkQualityLevel) {
        if let Some(p) = self.participant_mut(sid) {
            p.network_quality_level = level;
        }
    }

    pub fn update_local_network_quality(&mut self, level: NetworkQualityLevel) {
        if let Some(local) = self.local_mut() {
            local.network_quality_level = level;
        }
    }

    /// Pin `sid`, or unpin it if it is already pinned. At most one
    /// participant is pinned.
    pub fn change_pinned_participant(&mut self, sid: &str) {
        let Some(target) = self.participant(sid) else {
            return;
        };
        let pin = !target.is_pinned;
        for p in &mut self.participants {
            p.is_pinned = pin && p.sid == sid;
        }
    }

    pub fn pinned_participant(&self) -> Option<&ParticipantViewState> {
        self.participants.iter().find(|p| p.is_pinned)
    }

    /// Record the current dominant speaker. `None` or a sid the registry
    /// does not know clears it: the previous speaker is no longer dominant.
    pub fn change_dominant_speaker(&mut self, sid: Option<&str>) {
        self.dominant_speaker = match sid {
            Some(sid) if self.participant(sid).is_some() => Some(sid.to_string()),
            Some(sid) => {
                tracing::debug!("dominant speaker {sid} not in room, clearing");
                None
            }
            None => None,
        };
    }

    pub fn dominant_speaker(&self) -> Option<&str> {
        self.dominant_speaker.as_deref()
    }

    /// Drop every remote participant, keeping the local tile.
    pub fn clear_remote_participants(&mut self) {
        self.participants.retain(|p| p.is_local);
        if let Some(local) = self.local_mut() {
            local.is_pinned = false;
        }
        self.dominant_speaker = None;
    }

    /// The participant shown in the main view.
    ///
    /// Pinned, then dominant speaker, then the first remote with active
    /// video, then the first remote, then the local participant.
    pub fn primary_participant(&self) -> &ParticipantViewState {
        let remotes = || self.participants.iter().filter(|p| !p.is_local);
        self.pinned_participant()
            .or_else(|| self.dominant_speaker.as_deref().and_then(|sid| self.participant(sid)))
            .or_else(|| remotes().find(|p| p.has_active_video()))
            .or_else(|| remotes().next())
            .or_else(|| self.local_participant())
            .unwrap_or(&self.participants[0])
    }

    /// Every participant except the primary one, in join order.
    pub fn participant_thumbnails(&self) -> Vec<ParticipantViewState> {
        let primary = self.primary_participant();
        let primary_index = self
            .participants
            .iter()
            .position(|p| std::ptr::eq(p, primary));
        self.participants
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != primary_index)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(sid: &str) -> VideoTrack {
        VideoTrack { sid: sid.to_string(), name: "camera".to_string() }
    }

    fn make_participant(sid: &str, identity: &str, video: Option<VideoTrackViewState>) -> ParticipantViewState {
        ParticipantViewState::remote(&ParticipantSnapshot {
            sid: sid.to_string(),
            identity: identity.to_string(),
            is_muted: false,
            network_quality_level: NetworkQualityLevel::Unknown,
            video_track: video,
            screen_track: None,
        })
    }

    /// local(A), remote(B, video on), remote(C, video off)
    fn scenario() -> ParticipantRegistry {
        let mut reg = ParticipantRegistry::new("You");
        reg.update_local_participant_sid("A");
        reg.add_participant(make_participant("B", "bob@acme", Some(VideoTrackViewState::new(track("TB")))));
        reg.add_participant(make_participant("C", "carol@acme", None));
        reg
    }

    #[test]
    fn registry_starts_with_local_participant() {
        let reg = ParticipantRegistry::new("You");
        assert_eq!(reg.participants().len(), 1);
        let local = reg.local_participant().unwrap();
        assert!(local.is_local);
        assert_eq!(local.identity, "You");
        assert!(reg.primary_participant().is_local);
        assert!(reg.participant_thumbnails().is_empty());
    }

    #[test]
    fn remote_identity_is_cut_at_first_at_sign() {
        assert_eq!(display_identity("alice@room-42@x"), "alice");
        assert_eq!(display_identity("bob"), "bob");
        assert_eq!(display_identity("@anon"), "");
        let p = make_participant("p1", "alice@acme", None);
        assert_eq!(p.identity, "alice");
    }

    #[test]
    fn no_duplicate_participants() {
        let mut reg = ParticipantRegistry::new("You");
        reg.add_participant(make_participant("p1", "alice", None));
        reg.add_participant(make_participant("p1", "alice", None));
        assert_eq!(reg.remote_participant_count(), 1);
    }

    #[test]
    fn second_local_participant_is_rejected() {
        let mut reg = ParticipantRegistry::new("You");
        let mut local = make_participant("x", "x", None);
        local.is_local = true;
        reg.add_participant(local);
        assert_eq!(reg.participants().iter().filter(|p| p.is_local).count(), 1);
    }

    #[test]
    fn unknown_sids_are_ignored() {
        let mut reg = scenario();
        let before = reg.participants().to_vec();
        reg.remove_participant("nope");
        reg.mute_participant("nope", true);
        reg.update_video_track("nope", None);
        reg.update_screen_track("nope", None);
        reg.update_network_quality("nope", NetworkQualityLevel::Two);
        reg.change_pinned_participant("nope");
        reg.change_dominant_speaker(Some("nope"));
        assert_eq!(reg.participants(), before.as_slice());
        assert!(reg.dominant_speaker().is_none());
    }

    #[test]
    fn unknown_dominant_speaker_clears_the_previous_one() {
        let mut reg = scenario();
        reg.change_dominant_speaker(Some("C"));
        assert_eq!(reg.primary_participant().sid, "C");
        reg.change_dominant_speaker(Some("not-yet-joined"));
        assert!(reg.dominant_speaker().is_none());
        assert_eq!(reg.primary_participant().sid, "B");
    }

    #[test]
    fn primary_prefers_active_video_then_pin_then_dominant_speaker() {
        let mut reg = scenario();
        assert_eq!(reg.primary_participant().sid, "B");

        reg.change_pinned_participant("C");
        assert_eq!(reg.primary_participant().sid, "C");

        reg.change_pinned_participant("C");
        assert!(reg.pinned_participant().is_none());
        reg.change_dominant_speaker(Some("B"));
        assert_eq!(reg.primary_participant().sid, "B");
    }

    #[test]
    fn pin_outranks_dominant_speaker_until_pinned_leaves() {
        let mut reg = scenario();
        reg.change_pinned_participant("C");
        reg.change_dominant_speaker(Some("B"));
        assert_eq!(reg.primary_participant().sid, "C");

        reg.remove_participant("C");
        assert_eq!(reg.primary_participant().sid, "B");
    }

    #[test]
    fn switched_off_video_does_not_count_as_active() {
        let mut reg = scenario();
        reg.update_video_track("B", Some(VideoTrackViewState::switched(track("TB"), true)));
        // No active video anywhere: first remote in join order.
        assert_eq!(reg.primary_participant().sid, "B");

        reg.update_video_track("C", Some(VideoTrackViewState::new(track("TC"))));
        assert_eq!(reg.primary_participant().sid, "C");
    }

    #[test]
    fn none_track_is_never_active() {
        let state = VideoTrackViewState { track: None, is_switched_off: false };
        assert!(!state.is_active());
    }

    #[test]
    fn primary_is_deterministic() {
        let reg = scenario();
        let first = reg.primary_participant().clone();
        for _ in 0..10 {
            assert_eq!(reg.primary_participant(), &first);
            assert_eq!(reg.clone().primary_participant(), &first);
        }
    }

    #[test]
    fn thumbnails_exclude_primary_and_keep_join_order() {
        let reg = scenario();
        let sids: Vec<_> = reg.participant_thumbnails().into_iter().map(|p| p.sid).collect();
        assert_eq!(sids, vec!["A", "C"]);
    }

    #[test]
    fn pinning_moves_pin_between_participants() {
        let mut reg = scenario();
        reg.change_pinned_participant("B");
        reg.change_pinned_participant("C");
        let pinned: Vec<_> = reg.participants().iter().filter(|p| p.is_pinned).collect();
        assert_eq!(pinned.len(), 1);
        assert_eq!(pinned[0].sid, "C");
    }

    #[test]
    fn readding_participant_keeps_pin_and_position() {
        let mut reg = scenario();
        reg.change_pinned_participant("B");
        reg.add_participant(make_participant("B", "bob", None));
        assert_eq!(reg.participants()[1].sid, "B");
        assert!(reg.participants()[1].is_pinned);
    }

    #[test]
    fn clear_keeps_only_local() {
        let mut reg = scenario();
        reg.change_dominant_speaker(Some("B"));
        reg.change_pinned_participant("A");
        reg.clear_remote_participants();
        assert_eq!(reg.participants().len(), 1);
        assert_eq!(reg.local_participant().unwrap().sid, "A");
        assert!(reg.pinned_participant().is_none());
        assert!(reg.dominant_speaker().is_none());
    }

    #[test]
    fn local_updates_touch_only_local() {
        let mut reg = scenario();
        reg.update_local_video_track(Some(VideoTrackViewState::new(track("local"))));
        reg.update_local_network_quality(NetworkQualityLevel::Four);
        let local = reg.local_participant().unwrap();
        assert!(local.video_track.is_some());
        assert_eq!(local.network_quality_level, NetworkQualityLevel::Four);
        assert!(reg.participant("C").unwrap().video_track.is_none());
    }
}
