//! Brightness estimate reconciled from two sources
//!
//! Key presses give immediate but relative feedback; the hardware poll is slow but
//! authoritative. Both write the same estimate, last writer wins. Everything runs on the
//! dispatcher thread so the estimate needs no synchronization.
use crate::dispatcher::LoopNotifier;
use crate::error::SignalResult;
use crate::intercept::{HardwareKey, KeyIntercept};
use crate::level::{EmitGate, Level, SignalKind};
use crate::sink::SharedSink;

/// Direct query of the current display brightness
pub trait BrightnessSource {
    /// Raw brightness, not yet clamped
    fn read_brightness(&self) -> SignalResult<f32>;
}

pub struct BrightnessEstimator<S: BrightnessSource, K: KeyIntercept> {
    source: S,
    intercept: K,
    sink: SharedSink,
    gate: EmitGate,
    estimate: Level,
    step: f32,
    guard: Option<K::Guard>,
    query_available: Option<bool>,
    consecutive_failures: u32,
}

impl<S: BrightnessSource, K: KeyIntercept> BrightnessEstimator<S, K> {
    pub fn new(source: S, intercept: K, sink: SharedSink, threshold: f32, step: f32, initial: Level) -> Self {
        Self {
            source,
            intercept,
            sink,
            gate: EmitGate::new(threshold),
            estimate: initial,
            step,
            guard: None,
            query_available: None,
            consecutive_failures: 0,
        }
    }

    pub fn estimate(&self) -> Level {
        self.estimate
    }

    pub fn last_emitted(&self) -> Option<Level> {
        self.gate.last()
    }

    pub fn is_intercepting(&self) -> bool {
        self.guard.is_some()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn start(&mut self, notifier: LoopNotifier) {
        match self.intercept.install(notifier) {
            Ok(guard) => {
                self.guard = Some(guard);
                tracing::debug!("Brightness key intercept installed");
            }
            Err(e) => {
                tracing::warn!("Brightness keys will not be observed: {}", e);
            }
        }

        if let Some(level) = self.query() {
            self.estimate = level;
            self.emit(level, true);
        }
    }

    /// Path A: a physical key press always surfaces
    pub fn on_key(&mut self, key: HardwareKey) {
        let Some(direction) = key.brightness_direction() else {
            return;
        };

        self.estimate = self.estimate.offset(direction * self.step);
        tracing::trace!("Brightness key {:?} -> estimate {}", key.key, self.estimate);
        self.emit(self.estimate, true);
    }

    /// Path B: authoritative poll, debounced
    pub fn on_poll(&mut self) {
        if let Some(level) = self.query() {
            self.estimate = level;
            self.emit(level, false);
        }
    }

    pub fn stop(&mut self) {
        if self.guard.take().is_some() {
            tracing::debug!("Brightness key intercept released");
        }
    }

    fn query(&mut self) -> Option<Level> {
        match self.source.read_brightness().map(Level::clamp) {
            Ok(Some(level)) => {
                if self.query_available != Some(true) {
                    tracing::info!("Brightness query available");
                }
                self.query_available = Some(true);
                self.consecutive_failures = 0;
                Some(level)
            }
            Ok(None) => {
                self.consecutive_failures += 1;
                tracing::debug!("Brightness query returned no reading");
                None
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.query_available != Some(false) {
                    tracing::warn!("Brightness query unavailable, relying on key events: {}", e);
                }
                self.query_available = Some(false);
                None
            }
        }
    }

    fn emit(&mut self, level: Level, force: bool) {
        if self.gate.offer(level, force) {
            self.sink.report(SignalKind::Brightness, level);
        }
    }
}

impl<S: BrightnessSource, K: KeyIntercept> Drop for BrightnessEstimator<S, K> {
    fn drop(&mut self) {
        self.stop();
    }
}
