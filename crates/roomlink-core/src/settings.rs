use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::RwLock;

/// Preference keys, stored as plain strings by the host app.
pub mod keys {
    pub const VIDEO_CODEC: &str = "pref_video_codec";
    pub const AUDIO_CODEC: &str = "pref_audio_codec";
    pub const VIDEO_CAPTURE_RESOLUTION: &str = "pref_video_capture_resolution";
}

/// Read-only access to persisted user preferences.
pub trait SettingsSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    #[default]
    Vp8,
    H264,
    Vp9,
}

impl VideoCodec {
    pub fn name(self) -> &'static str {
        match self {
            Self::Vp8 => "VP8",
            Self::H264 => "H264",
            Self::Vp9 => "VP9",
        }
    }
}

impl FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VP8" => Ok(Self::Vp8),
            "H264" => Ok(Self::H264),
            "VP9" => Ok(Self::Vp9),
            other => Err(format!("unknown video codec {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioCodec {
    Isac,
    #[default]
    Opus,
    Pcma,
    Pcmu,
    G722,
}

impl AudioCodec {
    pub fn name(self) -> &'static str {
        match self {
            Self::Isac => "ISAC",
            Self::Opus => "opus",
            Self::Pcma => "PCMA",
            Self::Pcmu => "PCMU",
            Self::G722 => "G722",
        }
    }
}

impl FromStr for AudioCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ISAC" => Ok(Self::Isac),
            "opus" => Ok(Self::Opus),
            "PCMA" => Ok(Self::Pcma),
            "PCMU" => Ok(Self::Pcmu),
            "G722" => Ok(Self::G722),
            other => Err(format!("unknown audio codec {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
}

/// Capture resolutions offered to the user. The resolution preference is
/// stored as an index into this list.
pub const VIDEO_DIMENSIONS: [VideoDimensions; 6] = [
    VideoDimensions { width: 352, height: 288 },
    VideoDimensions { width: 640, height: 480 },
    VideoDimensions { width: 800, height: 480 },
    VideoDimensions { width: 960, height: 540 },
    VideoDimensions { width: 1280, height: 720 },
    VideoDimensions { width: 1920, height: 1080 },
];

pub const DEFAULT_RESOLUTION_INDEX: usize = 1;

/// Media preferences resolved from the settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaPreferences {
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub capture_dimensions: VideoDimensions,
}

impl Default for MediaPreferences {
    fn default() -> Self {
        Self {
            video_codec: VideoCodec::default(),
            audio_codec: AudioCodec::default(),
            capture_dimensions: VIDEO_DIMENSIONS[DEFAULT_RESOLUTION_INDEX],
        }
    }
}

impl MediaPreferences {
    /// Read preferences, falling back to defaults on missing or bad values.
    pub fn from_settings(settings: &dyn SettingsSource) -> Self {
        let defaults = Self::default();
        let video_codec = parse_or(settings, keys::VIDEO_CODEC, defaults.video_codec);
        let audio_codec = parse_or(settings, keys::AUDIO_CODEC, defaults.audio_codec);
        let capture_dimensions = settings
            .get(keys::VIDEO_CAPTURE_RESOLUTION)
            .and_then(|raw| match raw.parse::<usize>().ok().and_then(|i| VIDEO_DIMENSIONS.get(i).copied()) {
                Some(dimensions) => Some(dimensions),
                None => {
                    tracing::warn!("ignoring capture resolution {raw:?}");
                    None
                }
            })
            .unwrap_or(defaults.capture_dimensions);
        Self { video_codec, audio_codec, capture_dimensions }
    }
}

fn parse_or<T: FromStr<Err = String>>(settings: &dyn SettingsSource, key: &str, default: T) -> T {
    match settings.get(key).map(|raw| raw.parse::<T>()) {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            tracing::warn!("{key}: {e}, using default");
            default
        }
        None => default,
    }
}

/// In-memory settings, for hosts that hand over a snapshot of their store.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values: RwLock::new(values) }
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), value.to_string());
    }
}

impl SettingsSource for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }
}

/// Settings read from a flat JSON object of strings (`settings.json` in the
/// app data directory). The file is read once; a missing or corrupt file
/// yields an empty store.
#[derive(Debug)]
pub struct FileSettings {
    values: HashMap<String, String>,
    file_path: PathBuf,
}

impl FileSettings {
    pub fn new(data_dir: &str) -> Self {
        let file_path = PathBuf::from(data_dir).join("settings.json");
        let values = Self::load(&file_path);
        Self { values, file_path }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn load(path: &Path) -> HashMap<String, String> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("corrupt settings file {}: {e}", path.display());
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        }
    }
}

impl SettingsSource for FileSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_default_preferences() {
        let prefs = MediaPreferences::from_settings(&MemorySettings::default());
        assert_eq!(prefs.video_codec, VideoCodec::Vp8);
        assert_eq!(prefs.audio_codec, AudioCodec::Opus);
        assert_eq!(prefs.capture_dimensions, VideoDimensions { width: 640, height: 480 });
    }

    #[test]
    fn test_preferences_read_from_store() {
        let store = MemorySettings::default();
        store.set(keys::VIDEO_CODEC, "H264");
        store.set(keys::AUDIO_CODEC, "PCMU");
        store.set(keys::VIDEO_CAPTURE_RESOLUTION, "4");
        let prefs = MediaPreferences::from_settings(&store);
        assert_eq!(prefs.video_codec, VideoCodec::H264);
        assert_eq!(prefs.audio_codec, AudioCodec::Pcmu);
        assert_eq!(prefs.capture_dimensions, VideoDimensions { width: 1280, height: 720 });
    }

    #[test]
    fn test_bad_values_fall_back_to_defaults() {
        let store = MemorySettings::default();
        store.set(keys::VIDEO_CODEC, "AV1");
        store.set(keys::VIDEO_CAPTURE_RESOLUTION, "17");
        let prefs = MediaPreferences::from_settings(&store);
        assert_eq!(prefs, MediaPreferences::default());

        store.set(keys::VIDEO_CAPTURE_RESOLUTION, "hd");
        assert_eq!(MediaPreferences::from_settings(&store), MediaPreferences::default());
    }

    #[test]
    fn test_codec_names_match_sdk() {
        assert_eq!(AudioCodec::Opus.name(), "opus");
        assert_eq!("opus".parse::<AudioCodec>(), Ok(AudioCodec::Opus));
        assert!("OPUS".parse::<AudioCodec>().is_err());
        assert_eq!(VideoCodec::Vp9.name(), "VP9");
    }

    #[test]
    fn test_file_settings_missing_file_is_empty() {
        let dir = temp_dir();
        let store = FileSettings::new(dir.path().to_str().unwrap());
        assert_eq!(store.get(keys::VIDEO_CODEC), None);
    }

    #[test]
    fn test_file_settings_reads_values() {
        let dir = temp_dir();
        fs::write(
            dir.path().join("settings.json"),
            r#"{"pref_video_codec":"VP9","pref_video_capture_resolution":"5"}"#,
        )
        .unwrap();
        let store = FileSettings::new(dir.path().to_str().unwrap());
        let prefs = MediaPreferences::from_settings(&store);
        assert_eq!(prefs.video_codec, VideoCodec::Vp9);
        assert_eq!(prefs.capture_dimensions.height, 1080);
        assert_eq!(store.file_path(), dir.path().join("settings.json").as_path());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_empty() {
        let dir = temp_dir();
        fs::write(dir.path().join("settings.json"), "not json!!!").unwrap();
        let store = FileSettings::new(dir.path().to_str().unwrap());
        assert_eq!(MediaPreferences::from_settings(&store), MediaPreferences::default());
    }
}
