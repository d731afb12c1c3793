use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::channel::RoomEventStream;
use crate::config::SessionConfig;
use crate::devices::{AudioDevice, AudioDeviceManager, Permission, PermissionSource};
use crate::events::{RemoteParticipantEvent, RoomEvent};
use crate::reducer::RoomReducer;
use crate::session::RoomSessionController;
use crate::view_state::{RoomViewConfiguration, RoomViewEffect, RoomViewState};

/// User intent coming from the room screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomViewEvent {
    OnResume,
    OnPause,
    SelectAudioDevice(AudioDevice),
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

enum Input {
    View(RoomViewEvent),
    AudioDevices { available: Vec<AudioDevice>, selected: Option<AudioDevice> },
}

/// Drives a [`RoomReducer`] from room events and user input.
///
/// One task owns the reducer and applies room events, view events and audio
/// device updates one at a time. Each change is published as a fresh
/// [`RoomViewState`] on a `watch` channel; effects go out on an mpsc channel.
pub struct RoomViewModel {
    inputs: mpsc::UnboundedSender<Input>,
    state: watch::Receiver<RoomViewState>,
    audio: Arc<dyn AudioDeviceManager>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RoomViewModel {
    pub fn start(
        runtime: &Handle,
        controller: RoomSessionController,
        audio: Arc<dyn AudioDeviceManager>,
        permissions: Arc<dyn PermissionSource>,
    ) -> (Self, mpsc::UnboundedReceiver<RoomViewEffect>) {
        let config = controller.config().clone();
        let reducer = RoomReducer::new(&config);
        let (state_tx, state) = watch::channel(reducer.state().clone());
        let (effects_tx, effects) = mpsc::unbounded_channel();
        let (inputs, input_rx) = mpsc::unbounded_channel();

        // Subscribe before the task starts so no room event is missed.
        let events = controller.subscribe();
        let fold = Fold {
            reducer,
            controller,
            audio: audio.clone(),
            permissions,
            config,
            state: state_tx,
            effects: effects_tx,
        };
        let task = runtime.spawn(fold.run(events, input_rx));

        let devices = inputs.clone();
        audio.start(Box::new(move |available, selected| {
            if devices.send(Input::AudioDevices { available, selected }).is_err() {
                tracing::debug!("audio device update after view model closed");
            }
        }));

        let view_model = Self { inputs, state, audio, task: Mutex::new(Some(task)) };
        (view_model, effects)
    }

    pub fn process_input(&self, event: RoomViewEvent) {
        tracing::debug!("view event: {event:?}");
        if self.inputs.send(Input::View(event)).is_err() {
            tracing::debug!("view event after view model closed");
        }
    }

    /// Receiver of every published snapshot.
    pub fn state(&self) -> watch::Receiver<RoomViewState> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> RoomViewState {
        self.state.borrow().clone()
    }

    /// Stop the audio device manager and the fold task.
    pub fn close(&self) {
        let task = self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(task) = task {
            self.audio.stop();
            task.abort();
            tracing::debug!("room view model closed");
        }
    }
}

impl Drop for RoomViewModel {
    fn drop(&mut self) {
        self.close();
    }
}

struct Fold {
    reducer: RoomReducer,
    controller: RoomSessionController,
    audio: Arc<dyn AudioDeviceManager>,
    permissions: Arc<dyn PermissionSource>,
    config: SessionConfig,
    state: watch::Sender<RoomViewState>,
    effects: mpsc::UnboundedSender<RoomViewEffect>,
}

impl Fold {
    async fn run(mut self, mut events: RoomEventStream, mut inputs: mpsc::UnboundedReceiver<Input>) {
        tracing::debug!("listening for room events");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.on_room_event(event),
                    None => break,
                },
                input = inputs.recv() => match input {
                    Some(Input::View(event)) => self.on_view_event(event),
                    Some(Input::AudioDevices { available, selected }) => {
                        self.reducer.apply_audio_devices(available, selected);
                    }
                    None => break,
                },
            }
            self.state.send_replace(self.reducer.state().clone());
        }
        tracing::debug!("room view model loop ended");
    }

    fn on_room_event(&mut self, event: RoomEvent) {
        tracing::debug!("room event: {}", event.name());
        let effects = self.reducer.apply_room_event(&event);
        self.send_effects(effects);

        let left = matches!(event, RoomEvent::RemoteParticipant(RemoteParticipantEvent::Disconnected { .. }));
        if left
            && self.config.leave_when_alone
            && self.reducer.remote_participant_count() == 0
            && self.reducer.state().configuration == RoomViewConfiguration::Connected
        {
            tracing::info!("last remote participant left, leaving room");
            self.controller.disconnect();
        }
    }

    fn on_view_event(&mut self, event: RoomViewEvent) {
        match event {
            RoomViewEvent::OnResume => self.check_permissions(),
            RoomViewEvent::OnPause => self.controller.on_pause(),
            RoomViewEvent::SelectAudioDevice(device) => self.audio.select_device(&device),
            RoomViewEvent::ActivateAudioDevice => self.audio.activate(),
            RoomViewEvent::DeactivateAudioDevice => self.audio.deactivate(),
            RoomViewEvent::Connect { identity, room_name } => {
                if let Err(e) = self.controller.connect(&identity, &room_name) {
                    tracing::warn!("cannot connect to {room_name}: {e}");
                }
            }
            RoomViewEvent::PinParticipant { sid } => self.reducer.pin_participant(&sid),
            RoomViewEvent::ToggleLocalVideo => self.controller.toggle_local_video(),
            RoomViewEvent::EnableLocalVideo => self.controller.enable_local_video(),
            RoomViewEvent::DisableLocalVideo => self.controller.disable_local_video(),
            RoomViewEvent::ToggleLocalAudio => self.controller.toggle_local_audio(),
            RoomViewEvent::EnableLocalAudio => self.controller.enable_local_audio(),
            RoomViewEvent::DisableLocalAudio => self.controller.disable_local_audio(),
            RoomViewEvent::StartScreenCapture => self.controller.start_screen_capture(),
            RoomViewEvent::StopScreenCapture => self.controller.stop_screen_capture(),
            RoomViewEvent::SwitchCamera => self.controller.switch_camera(),
            RoomViewEvent::VideoTrackRemoved { sid } => self.reducer.remove_video_track(&sid),
            RoomViewEvent::ScreenTrackRemoved { sid } => self.reducer.remove_screen_track(&sid),
            RoomViewEvent::Disconnect => self.controller.disconnect(),
        }
    }

    fn check_permissions(&mut self) {
        let camera = self.permissions.is_granted(Permission::Camera);
        let microphone = self.permissions.is_granted(Permission::Microphone);
        let (effects, granted) = self.reducer.apply_permissions(camera, microphone);
        self.send_effects(effects);
        if granted {
            self.controller.on_resume();
        } else {
            tracing::info!("permissions missing: camera={camera} microphone={microphone}");
        }
    }

    fn send_effects(&self, effects: Vec<RoomViewEffect>) {
        for effect in effects {
            tracing::debug!("view effect: {effect:?}");
            if self.effects.send(effect).is_err() {
                tracing::debug!("no receiver for view effects");
            }
        }
    }
}
