//! Host services the view model consults: audio routing and permissions.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDeviceKind {
    BluetoothHeadset,
    WiredHeadset,
    Earpiece,
    Speakerphone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub name: String,
    pub kind: AudioDeviceKind,
}

/// Called with the available devices and the selected one whenever either
/// changes.
pub type AudioDeviceListener = Box<dyn Fn(Vec<AudioDevice>, Option<AudioDevice>) + Send + Sync>;

/// Platform audio route manager.
pub trait AudioDeviceManager: Send + Sync {
    /// Start watching devices. The listener is invoked once right away and
    /// then on every change, from any thread.
    fn start(&self, listener: AudioDeviceListener);
    fn stop(&self);
    fn select_device(&self, device: &AudioDevice);
    fn activate(&self);
    fn deactivate(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Camera,
    Microphone,
}

pub trait PermissionSource: Send + Sync {
    fn is_granted(&self, permission: Permission) -> bool;
}
