//! Decoding of system-defined key events and the seam for installing an interceptor
//!
//! The platform adapter (see `event_tap`) pulls `subtype` and `data1` out of the raw event
//! and hands them to [`decode_system_event`]; everything after that is platform-neutral.
use crate::constants::system_event::*;
use crate::dispatcher::LoopNotifier;
use crate::error::SignalResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKey {
    BrightnessUp,
    BrightnessDown,
    SoundUp,
    SoundDown,
    Mute,
    Other(u16),
}

/// One decoded hardware key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareKey {
    pub key: MediaKey,
    pub pressed: bool,
    pub repeat: bool,
}

impl HardwareKey {
    /// Brightness delta direction for a pressed brightness key, if this is one
    pub fn brightness_direction(&self) -> Option<f32> {
        if !self.pressed {
            return None;
        }
        match self.key {
            MediaKey::BrightnessUp => Some(1.0),
            MediaKey::BrightnessDown => Some(-1.0),
            _ => None,
        }
    }
}

/// Map the payload of an NSSystemDefined event to a key transition.
///
/// Layout of `data1` for aux control buttons: key code in bits 16..32, key flags in the low
/// 16 bits (state byte in 8..16, repeat in bit 0).
pub fn decode_system_event(subtype: i16, data1: i64) -> Option<HardwareKey> {
    if subtype != AUX_CONTROL_BUTTONS {
        return None;
    }

    let code = (data1 & 0xFFFF_0000) >> 16;
    let flags = data1 & 0xFFFF;
    let state = (flags & 0xFF00) >> 8;

    let pressed = match state {
        KEY_STATE_DOWN => true,
        KEY_STATE_UP => false,
        _ => return None,
    };

    let key = match code {
        NX_KEYTYPE_BRIGHTNESS_UP => MediaKey::BrightnessUp,
        NX_KEYTYPE_BRIGHTNESS_DOWN => MediaKey::BrightnessDown,
        NX_KEYTYPE_SOUND_UP => MediaKey::SoundUp,
        NX_KEYTYPE_SOUND_DOWN => MediaKey::SoundDown,
        NX_KEYTYPE_MUTE => MediaKey::Mute,
        other => MediaKey::Other(other as u16),
    };

    Some(HardwareKey {
        key,
        pressed,
        repeat: flags & 0x1 != 0,
    })
}

/// Something that can install a passive, listen-only key interceptor.
///
/// The returned guard keeps the interceptor alive; dropping it uninstalls it.
pub trait KeyIntercept {
    type Guard;

    fn install(&self, notifier: LoopNotifier) -> SignalResult<Self::Guard>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(code: i64, state: i64, repeat: bool) -> i64 {
        (code << 16) | (state << 8) | i64::from(repeat)
    }

    #[test]
    fn test_brightness_down_press() {
        let key = decode_system_event(8, payload(NX_KEYTYPE_BRIGHTNESS_DOWN, KEY_STATE_DOWN, false)).unwrap();
        assert_eq!(key.key, MediaKey::BrightnessDown);
        assert!(key.pressed);
        assert!(!key.repeat);
        assert_eq!(key.brightness_direction(), Some(-1.0));
    }

    #[test]
    fn test_brightness_up_release_has_no_direction() {
        let key = decode_system_event(8, payload(NX_KEYTYPE_BRIGHTNESS_UP, KEY_STATE_UP, false)).unwrap();
        assert_eq!(key.key, MediaKey::BrightnessUp);
        assert!(!key.pressed);
        assert_eq!(key.brightness_direction(), None);
    }

    #[test]
    fn test_repeat_flag() {
        let key = decode_system_event(8, payload(NX_KEYTYPE_BRIGHTNESS_UP, KEY_STATE_DOWN, true)).unwrap();
        assert!(key.repeat);
        assert_eq!(key.brightness_direction(), Some(1.0));
    }

    #[test]
    fn test_other_subtypes_ignored() {
        // subtype 7 is a power-button style event, not aux controls
        assert_eq!(decode_system_event(7, payload(NX_KEYTYPE_BRIGHTNESS_UP, KEY_STATE_DOWN, false)), None);
    }

    #[test]
    fn test_unknown_state_ignored() {
        assert_eq!(decode_system_event(8, payload(NX_KEYTYPE_BRIGHTNESS_UP, 0x01, false)), None);
    }

    #[test]
    fn test_volume_keys_decode_without_brightness_direction() {
        let key = decode_system_event(8, payload(NX_KEYTYPE_MUTE, KEY_STATE_DOWN, false)).unwrap();
        assert_eq!(key.key, MediaKey::Mute);
        assert_eq!(key.brightness_direction(), None);

        let key = decode_system_event(8, payload(20, KEY_STATE_DOWN, false)).unwrap();
        assert_eq!(key.key, MediaKey::Other(20));
    }
}
