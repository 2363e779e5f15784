//! CoreAudio access for the volume watcher
//!
//! Resolves the default output device, reads its volume and mute state, and registers
//! property listeners. Listener callbacks run on a HAL thread and only post to the
//! dispatcher.

/// Listener contexts handed to the HAL by token, never by pointer.
///
/// A HAL thread may still be inside a callback when the listener is removed, so the
/// callback resolves its token under the lock and finds nothing once the owning guard
/// has unregistered it.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod registry {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, OnceLock};

    use crate::dispatcher::{LoopEvent, LoopNotifier};

    struct Entry {
        notifier: LoopNotifier,
        event: LoopEvent,
    }

    static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(1);
    static ENTRIES: OnceLock<Mutex<HashMap<usize, Entry>>> = OnceLock::new();

    fn entries() -> &'static Mutex<HashMap<usize, Entry>> {
        ENTRIES.get_or_init(|| Mutex::new(HashMap::new()))
    }

    pub fn register(notifier: LoopNotifier, event: LoopEvent) -> usize {
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        let mut map = entries().lock().unwrap_or_else(|e| e.into_inner());
        map.insert(token, Entry { notifier, event });
        token
    }

    /// Returns false if the token was already released
    pub fn unregister(token: usize) -> bool {
        let mut map = entries().lock().unwrap_or_else(|e| e.into_inner());
        map.remove(&token).is_some()
    }

    /// Called from the HAL thread. Returns whether anything was posted.
    pub fn dispatch(token: usize) -> bool {
        let map = entries().lock().unwrap_or_else(|e| e.into_inner());
        match map.get(&token) {
            Some(entry) => {
                entry.notifier.notify(entry.event);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::dispatcher::event_channel;

        #[test]
        fn test_dispatch_posts_while_registered() {
            let (notifier, events) = event_channel();
            let token = register(notifier, LoopEvent::VolumeChanged);

            assert!(dispatch(token));
            assert_eq!(events.try_recv(), Ok(LoopEvent::VolumeChanged));
            assert!(unregister(token));
        }

        #[test]
        fn test_callback_after_release_is_ignored() {
            let (notifier, events) = event_channel();
            let token = register(notifier, LoopEvent::OutputDeviceChanged);
            assert!(unregister(token));

            assert!(!dispatch(token));
            assert!(events.try_recv().is_err());
            assert!(!unregister(token));
        }

        #[test]
        fn test_tokens_are_distinct() {
            let (notifier, events) = event_channel();
            let volume = register(notifier.clone(), LoopEvent::VolumeChanged);
            let device = register(notifier, LoopEvent::OutputDeviceChanged);
            assert_ne!(volume, device);

            unregister(volume);
            assert!(dispatch(device));
            assert_eq!(events.try_recv(), Ok(LoopEvent::OutputDeviceChanged));
            unregister(device);
        }
    }
}

#[cfg(target_os = "macos")]
pub mod macos {
    use std::ffi::c_void;
    use std::mem;
    use std::ptr;

    use crate::audio_watcher::{AudioBackend, DeviceHandle};
    use crate::dispatcher::{LoopEvent, LoopNotifier};
    use crate::error::{SignalError, SignalResult};

    type AudioObjectId = u32;
    type OsStatus = i32;

    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    struct PropertyAddress {
        selector: u32,
        scope: u32,
        element: u32,
    }

    type ListenerProc = unsafe extern "C" fn(
        object: AudioObjectId,
        address_count: u32,
        addresses: *const PropertyAddress,
        client_data: *mut c_void,
    ) -> OsStatus;

    // FFI declarations for the HAL object API
    #[link(name = "CoreAudio", kind = "framework")]
    extern "C" {
        fn AudioObjectHasProperty(object: AudioObjectId, address: *const PropertyAddress) -> u8;
        fn AudioObjectGetPropertyData(
            object: AudioObjectId,
            address: *const PropertyAddress,
            qualifier_size: u32,
            qualifier: *const c_void,
            data_size: *mut u32,
            data: *mut c_void,
        ) -> OsStatus;
        fn AudioObjectAddPropertyListener(
            object: AudioObjectId,
            address: *const PropertyAddress,
            listener: ListenerProc,
            client_data: *mut c_void,
        ) -> OsStatus;
        fn AudioObjectRemovePropertyListener(
            object: AudioObjectId,
            address: *const PropertyAddress,
            listener: ListenerProc,
            client_data: *mut c_void,
        ) -> OsStatus;
    }

    // Virtual main volume is only reachable through the hardware service API
    #[link(name = "AudioToolbox", kind = "framework")]
    extern "C" {
        fn AudioHardwareServiceHasProperty(object: AudioObjectId, address: *const PropertyAddress) -> u8;
        fn AudioHardwareServiceGetPropertyData(
            object: AudioObjectId,
            address: *const PropertyAddress,
            qualifier_size: u32,
            qualifier: *const c_void,
            data_size: *mut u32,
            data: *mut c_void,
        ) -> OsStatus;
        fn AudioHardwareServiceAddPropertyListener(
            object: AudioObjectId,
            address: *const PropertyAddress,
            listener: ListenerProc,
            client_data: *mut c_void,
        ) -> OsStatus;
        fn AudioHardwareServiceRemovePropertyListener(
            object: AudioObjectId,
            address: *const PropertyAddress,
            listener: ListenerProc,
            client_data: *mut c_void,
        ) -> OsStatus;
    }

    const fn fourcc(code: &[u8; 4]) -> u32 {
        u32::from_be_bytes(*code)
    }

    const SYSTEM_OBJECT: AudioObjectId = 1;
    const UNKNOWN_OBJECT: AudioObjectId = 0;

    const SCOPE_GLOBAL: u32 = fourcc(b"glob");
    const SCOPE_OUTPUT: u32 = fourcc(b"outp");
    const ELEMENT_MAIN: u32 = 0;

    const DEFAULT_OUTPUT_DEVICE: u32 = fourcc(b"dOut");
    const VIRTUAL_MAIN_VOLUME: u32 = fourcc(b"vmvc");
    const VOLUME_SCALAR: u32 = fourcc(b"volm");
    const MUTE: u32 = fourcc(b"mute");

    const fn address(selector: u32, scope: u32, element: u32) -> PropertyAddress {
        PropertyAddress { selector, scope, element }
    }

    /// Which HAL entry points a property goes through
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Api {
        Object,
        HardwareService,
    }

    impl Api {
        fn has(self, object: AudioObjectId, address: &PropertyAddress) -> bool {
            let present = unsafe {
                match self {
                    Api::Object => AudioObjectHasProperty(object, address),
                    Api::HardwareService => AudioHardwareServiceHasProperty(object, address),
                }
            };
            present != 0
        }

        fn get<T: Copy + Default>(self, object: AudioObjectId, address: &PropertyAddress) -> Result<T, OsStatus> {
            let mut value = T::default();
            let mut size = mem::size_of::<T>() as u32;
            let data = &mut value as *mut T as *mut c_void;

            let status = unsafe {
                match self {
                    Api::Object => AudioObjectGetPropertyData(object, address, 0, ptr::null(), &mut size, data),
                    Api::HardwareService => {
                        AudioHardwareServiceGetPropertyData(object, address, 0, ptr::null(), &mut size, data)
                    }
                }
            };

            if status == 0 {
                Ok(value)
            } else {
                Err(status)
            }
        }
    }

    unsafe extern "C" fn on_property_changed(
        _object: AudioObjectId,
        _address_count: u32,
        _addresses: *const PropertyAddress,
        client_data: *mut c_void,
    ) -> OsStatus {
        super::registry::dispatch(client_data as usize);
        0
    }

    /// One registered HAL property listener; unregistered on drop
    pub struct PropertyListener {
        api: Api,
        object: AudioObjectId,
        address: PropertyAddress,
        token: usize,
    }

    impl PropertyListener {
        fn register(
            api: Api,
            object: AudioObjectId,
            address: PropertyAddress,
            what: &'static str,
            notifier: LoopNotifier,
            event: LoopEvent,
        ) -> SignalResult<Self> {
            let token = super::registry::register(notifier, event);
            let client_data = token as *mut c_void;

            let status = unsafe {
                match api {
                    Api::Object => AudioObjectAddPropertyListener(object, &address, on_property_changed, client_data),
                    Api::HardwareService => {
                        AudioHardwareServiceAddPropertyListener(object, &address, on_property_changed, client_data)
                    }
                }
            };

            if status != 0 {
                super::registry::unregister(token);
                return Err(SignalError::ListenerRejected { what, status });
            }

            Ok(PropertyListener {
                api,
                object,
                address,
                token,
            })
        }
    }

    impl Drop for PropertyListener {
        fn drop(&mut self) {
            let client_data = self.token as *mut c_void;
            let status = unsafe {
                match self.api {
                    Api::Object => {
                        AudioObjectRemovePropertyListener(self.object, &self.address, on_property_changed, client_data)
                    }
                    Api::HardwareService => AudioHardwareServiceRemovePropertyListener(
                        self.object,
                        &self.address,
                        on_property_changed,
                        client_data,
                    ),
                }
            };
            if status != 0 {
                tracing::debug!("Removing listener on object {} returned {}", self.object, status);
            }
            super::registry::unregister(self.token);
        }
    }

    /// Listeners installed for one watch call, released together
    pub struct ListenerSet {
        _listeners: Vec<PropertyListener>,
    }

    /// Where a device's volume can be read from, best source first
    #[derive(Debug, Clone, Copy)]
    enum VolumeSource {
        VirtualMain,
        MainScalar,
        Channels,
    }

    const VIRTUAL_MAIN: PropertyAddress = address(VIRTUAL_MAIN_VOLUME, SCOPE_OUTPUT, ELEMENT_MAIN);
    const MAIN_SCALAR: PropertyAddress = address(VOLUME_SCALAR, SCOPE_OUTPUT, ELEMENT_MAIN);
    const STEREO_CHANNELS: [u32; 2] = [1, 2];

    #[derive(Debug, Default)]
    pub struct CoreAudioBackend;

    impl CoreAudioBackend {
        pub fn new() -> Self {
            CoreAudioBackend
        }

        fn volume_source(&self, device: AudioObjectId) -> Option<VolumeSource> {
            if Api::HardwareService.has(device, &VIRTUAL_MAIN) {
                return Some(VolumeSource::VirtualMain);
            }
            if Api::Object.has(device, &MAIN_SCALAR) {
                return Some(VolumeSource::MainScalar);
            }
            let any_channel = STEREO_CHANNELS
                .iter()
                .any(|&channel| Api::Object.has(device, &address(VOLUME_SCALAR, SCOPE_OUTPUT, channel)));
            any_channel.then_some(VolumeSource::Channels)
        }

        fn read_channels(&self, device: AudioObjectId) -> SignalResult<f32> {
            let mut total = 0.0f32;
            let mut count = 0;
            let mut last_status = 0;

            for channel in STEREO_CHANNELS {
                match Api::Object.get::<f32>(device, &address(VOLUME_SCALAR, SCOPE_OUTPUT, channel)) {
                    Ok(value) => {
                        total += value;
                        count += 1;
                    }
                    Err(status) => last_status = status,
                }
            }

            if count == 0 {
                return Err(SignalError::ReadFailure {
                    what: "channel volume",
                    status: last_status,
                });
            }
            Ok(total / count as f32)
        }
    }

    impl AudioBackend for CoreAudioBackend {
        type Listener = ListenerSet;

        fn default_output_device(&self) -> SignalResult<DeviceHandle> {
            let default_output = address(DEFAULT_OUTPUT_DEVICE, SCOPE_GLOBAL, ELEMENT_MAIN);
            let device = Api::Object
                .get::<AudioObjectId>(SYSTEM_OBJECT, &default_output)
                .map_err(|status| SignalError::ReadFailure {
                    what: "default output device",
                    status,
                })?;

            if device == UNKNOWN_OBJECT {
                return Err(SignalError::NoDevice);
            }
            Ok(DeviceHandle(device))
        }

        fn read_volume(&self, device: DeviceHandle) -> SignalResult<f32> {
            let id = device.0;
            match self.volume_source(id) {
                Some(VolumeSource::VirtualMain) => Api::HardwareService
                    .get::<f32>(id, &VIRTUAL_MAIN)
                    .map_err(|status| SignalError::ReadFailure {
                        what: "virtual main volume",
                        status,
                    }),
                Some(VolumeSource::MainScalar) => {
                    Api::Object
                        .get::<f32>(id, &MAIN_SCALAR)
                        .map_err(|status| SignalError::ReadFailure {
                            what: "main volume",
                            status,
                        })
                }
                Some(VolumeSource::Channels) => self.read_channels(id),
                None => Err(SignalError::ReadFailure {
                    what: "volume (device has no volume control)",
                    status: 0,
                }),
            }
        }

        fn read_muted(&self, device: DeviceHandle) -> SignalResult<bool> {
            let mute = address(MUTE, SCOPE_OUTPUT, ELEMENT_MAIN);
            if !Api::Object.has(device.0, &mute) {
                return Ok(false);
            }
            Api::Object
                .get::<u32>(device.0, &mute)
                .map(|value| value != 0)
                .map_err(|status| SignalError::ReadFailure { what: "mute", status })
        }

        fn watch_volume(&self, device: DeviceHandle, notifier: LoopNotifier) -> SignalResult<ListenerSet> {
            let id = device.0;
            let mut targets: Vec<(Api, PropertyAddress)> = match self.volume_source(id) {
                Some(VolumeSource::VirtualMain) => vec![(Api::HardwareService, VIRTUAL_MAIN)],
                Some(VolumeSource::MainScalar) => vec![(Api::Object, MAIN_SCALAR)],
                Some(VolumeSource::Channels) => STEREO_CHANNELS
                    .iter()
                    .map(|&channel| (Api::Object, address(VOLUME_SCALAR, SCOPE_OUTPUT, channel)))
                    .filter(|(api, addr)| api.has(id, addr))
                    .collect(),
                None => Vec::new(),
            };

            let mute = address(MUTE, SCOPE_OUTPUT, ELEMENT_MAIN);
            if Api::Object.has(id, &mute) {
                targets.push((Api::Object, mute));
            }

            let mut listeners = Vec::with_capacity(targets.len());
            let mut last_error = None;
            for (api, addr) in targets {
                match PropertyListener::register(api, id, addr, "volume", notifier.clone(), LoopEvent::VolumeChanged) {
                    Ok(listener) => listeners.push(listener),
                    Err(e) => {
                        tracing::debug!("Skipping volume property {:#x}: {}", addr.selector, e);
                        last_error = Some(e);
                    }
                }
            }

            if listeners.is_empty() {
                return Err(last_error.unwrap_or(SignalError::ListenerRejected {
                    what: "volume",
                    status: 0,
                }));
            }
            Ok(ListenerSet { _listeners: listeners })
        }

        fn watch_default_device(&self, notifier: LoopNotifier) -> SignalResult<ListenerSet> {
            let listener = PropertyListener::register(
                Api::Object,
                SYSTEM_OBJECT,
                address(DEFAULT_OUTPUT_DEVICE, SCOPE_GLOBAL, ELEMENT_MAIN),
                "default output device",
                notifier,
                LoopEvent::OutputDeviceChanged,
            )?;
            Ok(ListenerSet {
                _listeners: vec![listener],
            })
        }
    }
}

#[cfg(not(target_os = "macos"))]
pub mod macos {
    use crate::audio_watcher::{AudioBackend, DeviceHandle};
    use crate::dispatcher::LoopNotifier;
    use crate::error::{SignalError, SignalResult};

    /// Volume is only observed on macOS; elsewhere there is never an output device
    #[derive(Debug, Default)]
    pub struct CoreAudioBackend;

    impl CoreAudioBackend {
        pub fn new() -> Self {
            CoreAudioBackend
        }
    }

    impl AudioBackend for CoreAudioBackend {
        type Listener = ();

        fn default_output_device(&self) -> SignalResult<DeviceHandle> {
            Err(SignalError::NoDevice)
        }

        fn read_volume(&self, _device: DeviceHandle) -> SignalResult<f32> {
            Err(SignalError::NoDevice)
        }

        fn read_muted(&self, _device: DeviceHandle) -> SignalResult<bool> {
            Err(SignalError::NoDevice)
        }

        fn watch_volume(&self, _device: DeviceHandle, _notifier: LoopNotifier) -> SignalResult<()> {
            Err(SignalError::NoDevice)
        }

        fn watch_default_device(&self, _notifier: LoopNotifier) -> SignalResult<()> {
            Err(SignalError::NoDevice)
        }
    }
}
