//! Property-based tests for filters, stabilizer and cache.
//!
//! Run with: cargo test -p motion-compensation -- proptest

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use glam::{Quat, Vec3};
use motion_compensation::{
    EmaFilter, FilterOrder, MatchKind, PoseCache, SlerpFilter, Stabilizer, StabilizerConfig,
    StabilizerKind, wrap_degrees,
};
use motion_types::{DofAxis, DofSample, Duration, Timestamp};
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

fn arb_order() -> impl Strategy<Value = FilterOrder> {
    prop_oneof![
        Just(FilterOrder::Single),
        Just(FilterOrder::Double),
        Just(FilterOrder::Triple),
    ]
}

fn arb_vec3() -> impl Strategy<Value = Vec3> {
    prop::array::uniform3(-10.0..10.0f32).prop_map(Vec3::from_array)
}

fn arb_quat() -> impl Strategy<Value = Quat> {
    prop::array::uniform3(-3.0..3.0f32)
        .prop_map(|[x, y, z]| Quat::from_euler(glam::EulerRot::YXZ, y, x, z))
}

fn arb_windowed_kind() -> impl Strategy<Value = StabilizerKind> {
    prop_oneof![
        Just(StabilizerKind::Average),
        Just(StabilizerKind::WeightedAverage),
        Just(StabilizerKind::Median),
        Just(StabilizerKind::WeightedMedian),
    ]
}

// =============================================================================
// Filters
// =============================================================================

proptest! {
    #[test]
    fn proptest_ema_zero_strength_is_passthrough(
        order in arb_order(),
        inputs in prop::collection::vec(arb_vec3(), 1..20),
    ) {
        let mut filter = EmaFilter::new(order, 0.0);
        for input in inputs {
            prop_assert_eq!(filter.filter(input), input);
        }
    }

    #[test]
    fn proptest_ema_constant_input_is_fixed_point(
        order in arb_order(),
        strength in 0.0..1.0f32,
        value in arb_vec3(),
    ) {
        let mut filter = EmaFilter::new(order, strength);
        filter.reset(value);
        for _ in 0..5 {
            let out = filter.filter(value);
            prop_assert!((out - value).abs().max_element() < 1e-4);
        }
    }

    #[test]
    fn proptest_slerp_identity_after_reset(
        order in arb_order(),
        strength in 0.0..1.0f32,
        value in arb_quat(),
    ) {
        let mut filter = SlerpFilter::new(order, strength);
        filter.reset(value);
        let out = filter.filter(value);
        prop_assert!(out.dot(value).abs() > 1.0 - 1e-5);
    }

    #[test]
    fn proptest_strength_is_clamped(strength in -5.0..5.0f32) {
        let mut ema = EmaFilter::new(FilterOrder::Single, 0.5);
        let mut slerp = SlerpFilter::new(FilterOrder::Single, 0.5);
        let applied = ema.set_strength(strength);
        prop_assert!((0.0..=1.0).contains(&applied));
        prop_assert_eq!(slerp.set_strength(strength), applied);
    }
}

// =============================================================================
// Stabilizer
// =============================================================================

proptest! {
    #[test]
    fn proptest_window_bound(
        kind in arb_windowed_kind(),
        window_ms in 1u64..50,
        steps in prop::collection::vec((0u64..10, -1.0..1.0f64), 1..60),
    ) {
        let window = Duration::from_millis(window_ms);
        let stabilizer = Stabilizer::new(&StabilizerConfig::windowed(kind, window));

        let mut now = Timestamp::zero();
        for (gap, value) in steps {
            now = now.saturating_add(Duration::from_millis(gap));
            let mut sample = DofSample::zero(now);
            sample.set(DofAxis::Sway, value);
            prop_assert!(stabilizer.insert_sample(&sample, now));

            let (oldest, newest) = stabilizer.window_range().unwrap();
            prop_assert_eq!(newest, now);
            prop_assert!(oldest >= now.saturating_sub(window));
        }
    }

    #[test]
    fn proptest_estimate_within_window_values(
        kind in arb_windowed_kind(),
        values in prop::collection::vec(-1.0..1.0f64, 1..30),
    ) {
        let stabilizer = Stabilizer::new(&StabilizerConfig::windowed(kind, Duration::from_secs(1)));
        for (i, value) in values.iter().enumerate() {
            let now = Timestamp::from_millis(i as u64);
            let mut sample = DofSample::zero(now);
            sample.set(DofAxis::Heave, *value);
            stabilizer.insert_sample(&sample, now);
        }

        let estimate = stabilizer.stabilize().unwrap().get(DofAxis::Heave);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(estimate >= min - 1e-9 && estimate <= max + 1e-9);
    }

    #[test]
    fn proptest_stabilize_is_idempotent(
        kind in arb_windowed_kind(),
        values in prop::collection::vec(-180.0..180.0f64, 1..20),
    ) {
        let stabilizer = Stabilizer::new(&StabilizerConfig::windowed(kind, Duration::from_millis(10)));
        for (i, value) in values.iter().enumerate() {
            let now = Timestamp::from_millis(i as u64);
            let mut sample = DofSample::zero(now);
            sample.set(DofAxis::Yaw, *value);
            stabilizer.insert_sample(&sample, now);
        }
        prop_assert_eq!(stabilizer.stabilize(), stabilizer.stabilize());
    }

    #[test]
    fn proptest_biquad_holds_constant_input(
        strength in 0.0..0.99f64,
        value in -170.0..170.0f64,
        axis in prop::sample::select(DofAxis::ALL.to_vec()),
    ) {
        let stabilizer = Stabilizer::new(&StabilizerConfig::biquad(strength));
        for i in 0..20 {
            let now = Timestamp::from_millis(i * 2);
            let mut sample = DofSample::zero(now);
            sample.set(axis, value);
            stabilizer.insert_sample(&sample, now);
            let out = stabilizer.stabilize().unwrap().get(axis);
            prop_assert!((out - value).abs() < 1e-6);
        }
    }

    #[test]
    fn proptest_wrap_degrees_range(angle in -2000.0..2000.0f64) {
        let wrapped = wrap_degrees(angle);
        prop_assert!(wrapped > -180.0 && wrapped <= 180.0);
        let turns = (angle - wrapped) / 360.0;
        prop_assert!((turns - turns.round()).abs() < 1e-9);
    }
}

// =============================================================================
// Cache
// =============================================================================

proptest! {
    #[test]
    fn proptest_cache_exact_round_trip(times in prop::collection::btree_set(0u64..1000, 1..30)) {
        let cache = PoseCache::new(Duration::from_millis(2));
        for &t in &times {
            prop_assert!(cache.add_sample(Timestamp::from_millis(t), t, false));
        }
        for &t in &times {
            let hit = cache.nearest(Timestamp::from_millis(t)).unwrap();
            prop_assert_eq!(hit.kind, MatchKind::Exact);
            prop_assert_eq!(hit.value, t);
        }
    }

    #[test]
    fn proptest_cache_nearest_is_closest(
        times in prop::collection::btree_set(0u64..1000, 1..30),
        query in 0u64..1100,
    ) {
        let cache = PoseCache::new(Duration::from_millis(2));
        for &t in &times {
            cache.add_sample(Timestamp::from_millis(t), t, false);
        }
        let hit = cache.nearest(Timestamp::from_millis(query)).unwrap();
        let best = times.iter().map(|t| t.abs_diff(query)).min().unwrap();
        prop_assert_eq!(hit.value.abs_diff(query), best);

        // ties go to the earlier entry
        let earliest_best = times.iter().copied().find(|t| t.abs_diff(query) == best).unwrap();
        prop_assert_eq!(hit.value, earliest_best);

        let expected_kind = if best == 0 {
            MatchKind::Exact
        } else if best <= 2 {
            MatchKind::WithinTolerance
        } else {
            MatchKind::Nearest
        };
        prop_assert_eq!(hit.kind, expected_kind);
    }

    #[test]
    fn proptest_cache_clean_up_keeps_recent(
        times in prop::collection::btree_set(0u64..1000, 1..30),
        cut in 0u64..1000,
    ) {
        let cache = PoseCache::new(Duration::from_millis(2));
        for &t in &times {
            cache.add_sample(Timestamp::from_millis(t), t, false);
        }
        cache.clean_up(Timestamp::from_millis(cut));
        let kept = times.iter().filter(|&&t| t + 2 >= cut).count();
        prop_assert_eq!(cache.len(), kept);
    }
}
