//! Roomlink core business logic.
//!
//! Pure Rust crate with no platform dependencies.
//! Consumed by native UI shells via UniFFI bindings.

pub mod channel;
pub mod config;
pub mod devices;
pub mod errors;
pub mod events;
pub mod local;
pub mod media;
pub mod participants;
pub mod reducer;
pub mod sdk;
pub mod session;
pub mod settings;
pub mod stats;
pub mod view_model;
pub mod view_state;

pub use channel::{RoomEventChannel, RoomEventListener, RoomEventStream};
pub use config::SessionConfig;
pub use devices::{AudioDevice, AudioDeviceKind, AudioDeviceManager, Permission, PermissionSource};
pub use errors::RoomError;
pub use events::{LocalParticipantEvent, RemoteParticipantEvent, RoomEvent};
pub use media::LocalMedia;
pub use participants::ParticipantRegistry;
pub use reducer::RoomReducer;
pub use sdk::{RoomHandle, SdkError, VideoClient};
pub use session::{RoomListener, RoomSessionController, SessionCommand, SessionState};
pub use settings::{FileSettings, MediaPreferences, MemorySettings, SettingsSource};
pub use stats::{RoomStats, StatsReport, StatsScheduler, TrackStats};
pub use view_model::{RoomViewEvent, RoomViewModel};
pub use view_state::{RoomViewConfiguration, RoomViewEffect, RoomViewState};
