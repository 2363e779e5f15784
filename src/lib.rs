// Library exports for the binary and tests
pub mod audio_watcher;
pub mod brightness;
pub mod config;
pub mod constants;
pub mod coreaudio;
pub mod dispatcher;
pub mod display;
pub mod error;
pub mod event_tap;
pub mod intercept;
pub mod level;
pub mod sink;
pub mod tray;
