//! Level normalization and the debounce gate shared by both watchers
use std::fmt;

/// Which hardware signal a report is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Volume,
    Brightness,
}

impl SignalKind {
    pub fn label(self) -> &'static str {
        match self {
            SignalKind::Volume => "Volume",
            SignalKind::Brightness => "Brightness",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A reading saturated into [0.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Level(f32);

impl Level {
    pub const MIN: Level = Level(0.0);
    pub const MAX: Level = Level(1.0);

    /// Saturate a raw reading. NaN is not a reading and yields `None`.
    pub fn clamp(raw: f32) -> Option<Level> {
        if raw.is_nan() {
            return None;
        }
        Some(Level(raw.clamp(0.0, 1.0)))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Move by `delta` and saturate again
    pub fn offset(self, delta: f32) -> Level {
        Level::clamp(self.0 + delta).unwrap_or(self)
    }

    pub fn percent(self) -> u8 {
        (self.0 * 100.0).round() as u8
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

/// Gate deciding whether `candidate` is worth reporting after `previous`
pub fn should_emit(previous: Option<Level>, candidate: Level, threshold: f32, force: bool) -> bool {
    match previous {
        None => true,
        Some(_) if force => true,
        Some(prev) => (candidate.value() - prev.value()).abs() > threshold,
    }
}

/// Per-watcher debounce state: the last level that actually went out
#[derive(Debug, Clone)]
pub struct EmitGate {
    last: Option<Level>,
    threshold: f32,
}

impl EmitGate {
    pub fn new(threshold: f32) -> Self {
        Self {
            last: None,
            threshold,
        }
    }

    pub fn last(&self) -> Option<Level> {
        self.last
    }

    /// Returns true and records `candidate` if it passes the gate
    pub fn offer(&mut self, candidate: Level, force: bool) -> bool {
        if !should_emit(self.last, candidate, self.threshold, force) {
            return false;
        }
        self.last = Some(candidate);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_saturates() {
        assert_eq!(Level::clamp(-0.3), Some(Level::MIN));
        assert_eq!(Level::clamp(1.7), Some(Level::MAX));
        assert_eq!(Level::clamp(0.42).map(Level::value), Some(0.42));
    }

    #[test]
    fn test_clamp_rejects_nan() {
        assert_eq!(Level::clamp(f32::NAN), None);
    }

    #[test]
    fn test_clamp_saturates_infinities() {
        assert_eq!(Level::clamp(f32::INFINITY), Some(Level::MAX));
        assert_eq!(Level::clamp(f32::NEG_INFINITY), Some(Level::MIN));
    }

    #[test]
    fn test_offset_stays_in_range() {
        let top = Level::clamp(0.98).unwrap();
        assert_eq!(top.offset(0.0625), Level::MAX);

        let bottom = Level::clamp(0.02).unwrap();
        assert_eq!(bottom.offset(-0.0625), Level::MIN);
    }

    #[test]
    fn test_percent_rounds() {
        assert_eq!(Level::clamp(0.4375).unwrap().percent(), 44);
        assert_eq!(Level::MAX.to_string(), "100%");
    }

    #[test]
    fn test_gate_first_offer_always_passes() {
        let mut gate = EmitGate::new(0.5);
        assert!(gate.offer(Level::clamp(0.3).unwrap(), false));
        assert_eq!(gate.last(), Level::clamp(0.3));
    }

    #[test]
    fn test_gate_suppresses_small_changes() {
        let mut gate = EmitGate::new(0.01);
        assert!(gate.offer(Level::clamp(0.60).unwrap(), false));
        assert!(!gate.offer(Level::clamp(0.601).unwrap(), false));
        // Suppressed readings do not move the reference point
        assert_eq!(gate.last(), Level::clamp(0.60));
        assert!(gate.offer(Level::clamp(0.62).unwrap(), false));
    }

    #[test]
    fn test_gate_force_bypasses_threshold() {
        let mut gate = EmitGate::new(0.01);
        assert!(gate.offer(Level::clamp(0.5).unwrap(), false));
        assert!(gate.offer(Level::clamp(0.5).unwrap(), true));
    }
}
