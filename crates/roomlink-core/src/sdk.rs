//! Boundary to the proprietary video SDK.
//!
//! A platform adapter implements [`VideoClient`] and [`RoomHandle`] on top of
//! the real SDK and forwards its callbacks to the [`RoomListener`] it is
//! given on connect. Nothing in here is SDK specific: the types are plain
//! snapshots the adapter fills in.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::RoomListener;
use crate::settings::{AudioCodec, VideoCodec};
use crate::stats::StatsReport;

/// SDK error code for "room has reached its participant limit".
pub const ROOM_MAX_PARTICIPANTS_EXCEEDED: i32 = 53105;

/// Track names the local participant publishes under.
pub const MICROPHONE_TRACK_NAME: &str = "microphone";
pub const CAMERA_TRACK_NAME: &str = "camera";
pub const SCREEN_TRACK_NAME: &str = "screen";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sdk error {code}: {message}")]
pub struct SdkError {
    pub code: i32,
    pub message: String,
}

impl SdkError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn is_capacity_exceeded(&self) -> bool {
        self.code == ROOM_MAX_PARTICIPANTS_EXCEEDED
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkTrack {
    pub sid: String,
    pub name: String,
    pub enabled: bool,
    pub switched_off: bool,
}

impl SdkTrack {
    pub fn is_screen(&self) -> bool {
        self.name == SCREEN_TRACK_NAME
    }
}

/// A participant as the SDK currently sees it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdkParticipant {
    pub sid: String,
    pub identity: String,
    pub audio_tracks: Vec<SdkTrack>,
    /// Subscribed video tracks, camera and screen alike.
    pub video_tracks: Vec<SdkTrack>,
    pub network_quality_level: Option<u8>,
}

/// What the SDK needs to open a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub identity: String,
    pub room_name: String,
    pub preferred_audio_codec: AudioCodec,
    pub preferred_video_codec: VideoCodec,
    pub enable_network_quality: bool,
    pub enable_dominant_speaker: bool,
}

/// A local track created by [`crate::media::LocalMedia`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub sid: String,
    pub name: String,
}

#[async_trait]
pub trait VideoClient: Send + Sync {
    /// Start connecting. The returned handle may still be connecting; the
    /// outcome arrives through `listener`.
    async fn connect(
        &self,
        options: ConnectOptions,
        listener: RoomListener,
    ) -> Result<Arc<dyn RoomHandle>, SdkError>;
}

/// A room as exposed by the SDK. Also the stats provider.
#[async_trait]
pub trait RoomHandle: Send + Sync {
    fn sid(&self) -> String;
    fn name(&self) -> String;
    fn local_participant(&self) -> Option<SdkParticipant>;
    fn remote_participants(&self) -> Vec<SdkParticipant>;
    fn publish_track(&self, track: &LocalTrack);
    fn unpublish_track(&self, track: &LocalTrack);
    /// Asynchronous: completion is reported by `RoomListener::on_disconnected`.
    fn disconnect(&self);
    async fn stats(&self) -> Vec<StatsReport>;
}

/// The current room handle, written only by the session controller.
///
/// Readers take a clone of the handle and must treat `None` as "not
/// connected": the controller may clear the slot at any time.
#[derive(Clone, Default)]
pub struct RoomSlot {
    room: Arc<std::sync::RwLock<Option<Arc<dyn RoomHandle>>>>,
}

impl RoomSlot {
    pub fn get(&self) -> Option<Arc<dyn RoomHandle>> {
        self.room.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub(crate) fn set(&self, room: Arc<dyn RoomHandle>) {
        *self.room.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(room);
    }

    pub(crate) fn take(&self) -> Option<Arc<dyn RoomHandle>> {
        self.room.write().unwrap_or_else(|poisoned| poisoned.into_inner()).take()
    }
}
