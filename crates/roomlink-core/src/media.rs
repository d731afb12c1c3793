//! Boundary to local capture: the host creates and releases the actual
//! microphone, camera and screen tracks.

use crate::errors::RoomError;
use crate::sdk::LocalTrack;
use crate::settings::VideoDimensions;

pub trait LocalMedia: Send + Sync {
    fn create_audio_track(&self, name: &str) -> Result<LocalTrack, RoomError>;
    fn set_audio_enabled(&self, track: &LocalTrack, enabled: bool);
    fn release_audio_track(&self, track: &LocalTrack);

    fn create_camera_track(&self, name: &str, dimensions: VideoDimensions) -> Result<LocalTrack, RoomError>;
    fn set_video_enabled(&self, track: &LocalTrack, enabled: bool);
    fn release_video_track(&self, track: &LocalTrack);
    fn switch_camera(&self);

    fn start_screen_capture(&self, name: &str) -> Result<LocalTrack, RoomError>;
    fn stop_screen_capture(&self, track: &LocalTrack);
}
