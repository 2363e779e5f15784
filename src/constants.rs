/// Application-wide constants for signal normalization, polling and key decoding

pub mod level {
    /// Minimum change between two emitted levels before a non-forced reading is reported
    pub const DEBOUNCE_THRESHOLD: f32 = 0.01;
}

pub mod brightness {
    /// Step applied per brightness key press (macOS moves brightness in 16 notches)
    pub const KEY_STEP: f32 = 1.0 / 16.0;

    /// Estimate used until the first poll or key event lands
    pub const INITIAL_ESTIMATE: f32 = 0.5;

    /// Interval between authoritative brightness queries
    pub const POLL_INTERVAL_MS: u64 = 200;
}

pub mod event_loop {
    /// Upper bound on how long the run loop sleeps between pumps (~60fps)
    pub const FRAME_MS: u64 = 16;
}

pub mod hud {
    /// How long the tray indicator shows a level before reverting to the idle icon
    pub const HIDE_AFTER_MS: u64 = 1500;
}

pub mod system_event {
    /// CGEventType value of NSSystemDefined events
    pub const NX_SYSDEFINED: u32 = 14;

    /// NSEvent subtype carrying auxiliary control buttons (media and brightness keys)
    pub const AUX_CONTROL_BUTTONS: i16 = 8;

    /// Key state byte reported for a key-down
    pub const KEY_STATE_DOWN: i64 = 0x0A;

    /// Key state byte reported for a key-up
    pub const KEY_STATE_UP: i64 = 0x0B;

    pub const NX_KEYTYPE_SOUND_UP: i64 = 0;
    pub const NX_KEYTYPE_SOUND_DOWN: i64 = 1;
    pub const NX_KEYTYPE_BRIGHTNESS_UP: i64 = 2;
    pub const NX_KEYTYPE_BRIGHTNESS_DOWN: i64 = 3;
    pub const NX_KEYTYPE_MUTE: i64 = 7;
}
