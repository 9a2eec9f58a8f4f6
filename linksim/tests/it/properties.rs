use std::{f64::consts::TAU, time::Duration};

use linksim::{
    capacity::{CapacityController, LinearModel, PeriodicModel, StepModel},
    drop::{CyclicDrop, DropConfig, DropPolicy, DropReason},
    CapacityModel, DataRate, SimTime, Simulator, Trace,
};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

fn started(model: CapacityModel) -> (CapacityController, Simulator) {
    let controller = CapacityController::new(model, Trace::disabled()).unwrap();
    let mut sim = Simulator::new();
    controller.start(&mut sim, CancellationToken::new());
    (controller, sim)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn step_rate_follows_the_cycle(
        high_ms in 1u64..2_000,
        low_ms in 1u64..2_000,
        mut instants in prop::collection::vec(0u64..10_000, 1..32),
    ) {
        let model = StepModel {
            high: DataRate::from_bps(10_000_000),
            low: DataRate::from_bps(1_000_000),
            high_duration: Duration::from_millis(high_ms),
            low_duration: Duration::from_millis(low_ms),
        };
        let (controller, mut sim) = started(CapacityModel::Step(model));

        instants.sort_unstable();
        for ms in instants {
            let at = SimTime::from_millis(ms);
            sim.run_until(at);

            let expected = if ms % (high_ms + low_ms) < high_ms { model.high } else { model.low };
            prop_assert_eq!(controller.current_rate(at), expected);
            prop_assert_eq!(model.rate_at(Duration::from_millis(ms)), expected);
        }
    }

    #[test]
    fn linear_rate_stays_in_bounds(
        low in 1u64..5_000_000,
        span in 1u64..5_000_000,
        change in 1u64..1_000_000,
        start in 0.0f64..=1.0,
        ticks in 1usize..300,
    ) {
        let high = low + span;
        let initial = low + (span as f64 * start) as u64;
        let model = LinearModel {
            initial: DataRate::from_bps(initial),
            low: DataRate::from_bps(low),
            high: DataRate::from_bps(high),
            change_per_tick: DataRate::from_bps(change),
        };
        let (controller, mut sim) = started(CapacityModel::Linear(model));

        let mut previous = initial;
        for tick in 1..=ticks as u64 {
            sim.run_until(SimTime::from_millis(100 * tick));
            let rate = controller.last_rate().bps();

            prop_assert!(low <= rate && rate <= high);
            prop_assert!(rate.abs_diff(previous) <= change);
            previous = rate;
        }
        prop_assert_eq!(controller.transitions(), ticks as u64);
    }

    #[test]
    fn periodic_rate_matches_the_formula(
        mean in 1_000u64..100_000_000,
        ratio in 0.0f64..=1.0,
        period_ms in 1u64..60_000,
        t_ns in 0u64..600_000_000_000,
    ) {
        let amplitude = ((mean as f64 * ratio) as u64).max(1).min(mean);
        let model = PeriodicModel {
            mean: DataRate::from_bps(mean),
            amplitude: DataRate::from_bps(amplitude),
            period: Duration::from_millis(period_ms),
        };
        let (controller, _sim) = started(CapacityModel::Periodic(model));

        let t = Duration::from_nanos(t_ns);
        let expected =
            mean as f64 + amplitude as f64 * (TAU * t.as_secs_f64() / model.period.as_secs_f64()).sin();

        prop_assert_eq!(model.rate_bps_at(t).to_bits(), expected.to_bits());
        prop_assert_eq!(
            controller.current_rate(SimTime::from_nanos(t_ns)),
            DataRate::from_bps_f64(expected).max(DataRate::from_bps(1))
        );
    }

    #[test]
    fn outage_windows_are_evenly_spaced(
        period_ms in 2u64..5_000,
        duration_frac in 0.01f64..=1.0,
        mut instants in prop::collection::vec(0u64..100_000, 1..200),
    ) {
        let duration_ms = ((period_ms as f64 * duration_frac) as u64).clamp(1, period_ms);
        let cyclic = CyclicDrop {
            period: Duration::from_millis(period_ms),
            duration: Duration::from_millis(duration_ms),
        };
        let mut policy = DropPolicy::new(DropConfig::default().with_cyclic(cyclic), SimTime::ZERO, 1).unwrap();

        instants.sort_unstable();
        let mut window = policy.next_window().unwrap();
        for ms in instants {
            let now = SimTime::from_millis(ms);
            let decision = policy.decide_at(now);
            prop_assert_eq!(decision.is_some(), window.contains(now));

            let next = policy.next_window().unwrap();
            if next != window {
                prop_assert!(next.start >= window.end);
                prop_assert_eq!(next.start.as_nanos() - window.start.as_nanos(), period_ms * 1_000_000);
                window = next;
            }
            prop_assert_eq!(window.end.as_nanos() - window.start.as_nanos(), duration_ms * 1_000_000);
        }
    }

    #[test]
    fn lossless_policy_never_drops(
        seed in any::<u64>(),
        times in prop::collection::vec(any::<u32>(), 0..256),
    ) {
        let mut policy = DropPolicy::new(DropConfig::default(), SimTime::ZERO, seed).unwrap();
        for ms in times {
            prop_assert_eq!(policy.decide_at(SimTime::from_millis(ms as u64)), None);
        }
    }

    #[test]
    fn certain_loss_never_bursts(seed in any::<u64>(), count in 1usize..512) {
        let mut policy =
            DropPolicy::new(DropConfig::default().with_drop_rate(1.0), SimTime::ZERO, seed).unwrap();
        for ms in 0..count as u64 {
            prop_assert_eq!(policy.decide_at(SimTime::from_millis(ms)), Some(DropReason::Random));
            prop_assert_eq!(policy.burst_remaining(), 0);
        }
    }
}
