// Properties of the level normalizer and the debounce gate

use hud_watch::level::{should_emit, EmitGate, Level};
use proptest::prelude::*;

proptest! {
    #[test]
    fn clamp_stays_in_range_and_is_idempotent(x in proptest::num::f32::ANY) {
        match Level::clamp(x) {
            Some(level) => {
                prop_assert!((0.0..=1.0).contains(&level.value()));
                prop_assert_eq!(Level::clamp(level.value()), Some(level));
            }
            None => prop_assert!(x.is_nan()),
        }
    }

    #[test]
    fn unset_previous_always_emits(v in 0.0f32..=1.0, t in 0.0f32..1.0, force in any::<bool>()) {
        let candidate = Level::clamp(v).unwrap();
        prop_assert!(should_emit(None, candidate, t, force));
    }

    #[test]
    fn threshold_decides_unforced_emission(p in 0.0f32..=1.0, v in 0.0f32..=1.0, t in 0.0f32..1.0) {
        let previous = Level::clamp(p).unwrap();
        let candidate = Level::clamp(v).unwrap();
        let expected = (v - p).abs() > t;
        prop_assert_eq!(should_emit(Some(previous), candidate, t, false), expected);
    }

    #[test]
    fn forced_emission_always_passes(p in 0.0f32..=1.0, v in 0.0f32..=1.0, t in 0.0f32..1.0) {
        let previous = Level::clamp(p).unwrap();
        let candidate = Level::clamp(v).unwrap();
        prop_assert!(should_emit(Some(previous), candidate, t, true));
    }

    #[test]
    fn gate_reference_only_moves_on_emission(readings in proptest::collection::vec(0.0f32..=1.0, 1..50)) {
        let mut gate = EmitGate::new(0.01);
        let mut last = None;
        for raw in readings {
            let level = Level::clamp(raw).unwrap();
            if gate.offer(level, false) {
                last = Some(level);
            }
            prop_assert_eq!(gate.last(), last);
        }
    }
}

#[test]
fn test_offset_matches_key_step() {
    let level = Level::clamp(0.5).unwrap();
    assert_eq!(level.offset(-1.0 / 16.0).value(), 0.4375);
    assert_eq!(level.offset(3.0 / 16.0).value(), 0.6875);
}
