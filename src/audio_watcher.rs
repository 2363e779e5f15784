//! Output volume watcher
//!
//! Follows the default output device: a listener on the system object reports device
//! switches, a listener on the device reports volume/mute changes. Every change the OS
//! reports is forwarded; CoreAudio already coalesces rapid changes.
use crate::dispatcher::LoopNotifier;
use crate::error::SignalResult;
use crate::level::{EmitGate, Level, SignalKind};
use crate::sink::SharedSink;

/// Opaque id of an audio output device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u32);

/// Platform audio access used by [`AudioSignalWatcher`].
///
/// Listener guards unregister themselves when dropped.
pub trait AudioBackend {
    type Listener;

    fn default_output_device(&self) -> SignalResult<DeviceHandle>;

    /// Scalar volume as reported by the device, not yet clamped
    fn read_volume(&self, device: DeviceHandle) -> SignalResult<f32>;

    fn read_muted(&self, device: DeviceHandle) -> SignalResult<bool>;

    /// Post `LoopEvent::VolumeChanged` whenever the device's volume or mute changes
    fn watch_volume(&self, device: DeviceHandle, notifier: LoopNotifier) -> SignalResult<Self::Listener>;

    /// Post `LoopEvent::OutputDeviceChanged` whenever the default output device changes
    fn watch_default_device(&self, notifier: LoopNotifier) -> SignalResult<Self::Listener>;
}

pub struct AudioSignalWatcher<B: AudioBackend> {
    backend: B,
    sink: SharedSink,
    gate: EmitGate,
    notifier: Option<LoopNotifier>,
    device: Option<DeviceHandle>,
    volume_listener: Option<B::Listener>,
    device_listener: Option<B::Listener>,
}

impl<B: AudioBackend> AudioSignalWatcher<B> {
    pub fn new(backend: B, sink: SharedSink, threshold: f32) -> Self {
        Self {
            backend,
            sink,
            gate: EmitGate::new(threshold),
            notifier: None,
            device: None,
            volume_listener: None,
            device_listener: None,
        }
    }

    pub fn device(&self) -> Option<DeviceHandle> {
        self.device
    }

    pub fn last_emitted(&self) -> Option<Level> {
        self.gate.last()
    }

    pub fn is_attached(&self) -> bool {
        self.volume_listener.is_some()
    }

    pub fn start(&mut self, notifier: LoopNotifier) {
        match self.backend.watch_default_device(notifier.clone()) {
            Ok(listener) => self.device_listener = Some(listener),
            Err(e) => tracing::warn!("Output device changes will not be followed: {}", e),
        }
        self.notifier = Some(notifier);

        if !self.attach_default_device() {
            return;
        }

        if let Some(level) = self.read_level() {
            self.emit(level, true);
        }
    }

    /// The device reported a volume or mute change
    pub fn on_volume_changed(&mut self) {
        if self.device.is_none() {
            return;
        }
        if let Some(level) = self.read_level() {
            self.emit(level, true);
        }
    }

    /// The default output device switched; move the listener over
    pub fn on_device_changed(&mut self) {
        let previous = self.device;
        self.detach();
        self.attach_default_device();

        if previous != self.device {
            tracing::info!("Output device changed: {:?} -> {:?}", previous, self.device);
        }
    }

    pub fn stop(&mut self) {
        self.detach();
        if self.device_listener.take().is_some() {
            tracing::debug!("Released output device listener");
        }
        self.notifier = None;
    }

    fn attach_default_device(&mut self) -> bool {
        let Some(notifier) = self.notifier.clone() else {
            return false;
        };

        let device = match self.backend.default_output_device() {
            Ok(device) => device,
            Err(e) => {
                tracing::info!("Volume watcher inactive: {}", e);
                return false;
            }
        };

        match self.backend.watch_volume(device, notifier) {
            Ok(listener) => {
                self.volume_listener = Some(listener);
            }
            Err(e) => {
                // Still track the device so direct reads keep working on the next switch
                tracing::warn!("Volume listener not installed on {:?}: {}", device, e);
            }
        }
        self.device = Some(device);
        tracing::debug!("Watching output device {:?}", device);
        true
    }

    fn detach(&mut self) {
        // Dropping the guard unregisters the listener
        if self.volume_listener.take().is_some() {
            tracing::debug!("Released volume listener on {:?}", self.device);
        }
        self.device = None;
    }

    fn read_level(&self) -> Option<Level> {
        let device = self.device?;

        let raw = match self.backend.read_volume(device) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!("Volume read skipped: {}", e);
                return None;
            }
        };

        let muted = self.backend.read_muted(device).unwrap_or(false);
        if muted {
            return Some(Level::MIN);
        }
        Level::clamp(raw)
    }

    fn emit(&mut self, level: Level, force: bool) {
        if self.gate.offer(level, force) {
            self.sink.report(SignalKind::Volume, level);
        }
    }
}

impl<B: AudioBackend> Drop for AudioSignalWatcher<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
