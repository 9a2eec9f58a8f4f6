//! Time-varying link capacity.
//!
//! A [`CapacityController`] owns the current bandwidth of a link and evolves it over simulated
//! time according to a [`CapacityModel`]:
//!
//! - [`CapacityModel::Step`]: alternates between a high and a low rate, holding each for its
//!   configured duration. Starts high.
//! - [`CapacityModel::Linear`]: every [`TICK_INTERVAL`] the rate moves by a fixed amount, starting
//!   downwards and reversing at the configured bounds (triangle wave).
//! - [`CapacityModel::Periodic`]: `mean + amplitude * sin(2π t / period)`, evaluated exactly at
//!   the instant asked and sampled every [`TICK_INTERVAL`] for reporting.
//! - [`CapacityModel::Fixed`]: a constant rate, no timers.
//!
//! Transitions are self-rescheduling actions on the [`Clock`]; they stop once the token passed
//! to [`CapacityController::start`] is cancelled.

use std::{f64::consts::TAU, fmt, str::FromStr, sync::Arc, time::Duration};

use linksim_common::DataRate;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{Clock, ClockExt},
    error::{ConfigError, Result},
    time::SimTime,
    trace::Trace,
};

/// Cadence of the linear ramp and of the periodic sampling.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Lowest rate ever handed out, so transmission delays stay finite.
pub const MIN_RATE: DataRate = DataRate::from_bps(1);

/// The bandwidth variation modes selectable with the `mode` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapacityMode {
    /// Alternate between two rates.
    Step,
    /// Ramp between two bounds.
    Linear,
    /// Follow a sine around a mean.
    Periodic,
}

impl FromStr for CapacityMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "step" => Ok(Self::Step),
            "linear" => Ok(Self::Linear),
            "periodic" => Ok(Self::Periodic),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for CapacityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Step => "step",
            Self::Linear => "linear",
            Self::Periodic => "periodic",
        };
        f.write_str(name)
    }
}

/// Parameters of the step mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepModel {
    /// Rate of the high phase, which comes first.
    pub high: DataRate,
    /// Rate of the low phase.
    pub low: DataRate,
    /// How long the high rate holds before switching to low.
    pub high_duration: Duration,
    /// How long the low rate holds before switching back to high.
    pub low_duration: Duration,
}

impl StepModel {
    /// Rate at `elapsed` time since the controller started.
    pub fn rate_at(&self, elapsed: Duration) -> DataRate {
        let cycle = (self.high_duration + self.low_duration).as_nanos();
        let offset = elapsed.as_nanos() % cycle;
        if offset < self.high_duration.as_nanos() {
            self.high
        } else {
            self.low
        }
    }
}

/// Parameters of the linear mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearModel {
    /// Starting rate. The ramp moves down first.
    pub initial: DataRate,
    /// Lower bound, where the ramp turns up.
    pub low: DataRate,
    /// Upper bound, where the ramp turns down.
    pub high: DataRate,
    /// Rate change applied on every tick.
    pub change_per_tick: DataRate,
}

/// Parameters of the periodic mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicModel {
    /// Centre of the sine.
    pub mean: DataRate,
    /// Peak deviation from `mean`, at most `mean`.
    pub amplitude: DataRate,
    /// Length of one full sine cycle.
    pub period: Duration,
}

impl PeriodicModel {
    /// `mean + amplitude * sin(2π t / period)`, with `t` in seconds since the controller started.
    pub fn rate_bps_at(&self, elapsed: Duration) -> f64 {
        let t = elapsed.as_secs_f64();
        let period = self.period.as_secs_f64();
        self.mean.bps() as f64 + self.amplitude.bps() as f64 * (TAU * t / period).sin()
    }
}

/// How a link's capacity evolves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CapacityModel {
    /// A constant rate.
    Fixed(DataRate),
    Step(StepModel),
    Linear(LinearModel),
    Periodic(PeriodicModel),
}

impl Default for CapacityModel {
    fn default() -> Self {
        Self::Fixed(DataRate::from_bps(10 * linksim_common::constants::Mbps))
    }
}

fn positive_rate(option: &'static str, rate: DataRate) -> Result<()> {
    if rate.is_zero() {
        return Err(ConfigError::out_of_range(option, "must be greater than 0"));
    }
    Ok(())
}

fn positive_duration(option: &'static str, duration: Duration) -> Result<()> {
    if duration.is_zero() {
        return Err(ConfigError::out_of_range(option, "must be greater than 0"));
    }
    Ok(())
}

impl CapacityModel {
    /// The variation mode, `None` for a fixed rate.
    pub fn mode(&self) -> Option<CapacityMode> {
        match self {
            Self::Fixed(_) => None,
            Self::Step(_) => Some(CapacityMode::Step),
            Self::Linear(_) => Some(CapacityMode::Linear),
            Self::Periodic(_) => Some(CapacityMode::Periodic),
        }
    }

    /// The rate in effect when the controller starts.
    pub fn initial_rate(&self) -> DataRate {
        match self {
            Self::Fixed(rate) => *rate,
            Self::Step(m) => m.high,
            Self::Linear(m) => m.initial,
            Self::Periodic(m) => m.mean,
        }
    }

    /// Rejects zero rates and durations, inverted linear bounds, a linear start outside its
    /// bounds and an amplitude above the mean.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Fixed(rate) => positive_rate("bandwidth", *rate),
            Self::Step(m) => {
                positive_rate("high_bandwidth", m.high)?;
                positive_rate("low_bandwidth", m.low)?;
                positive_duration("duration_high", m.high_duration)?;
                positive_duration("duration_low", m.low_duration)
            }
            Self::Linear(m) => {
                positive_rate("low_bandwidth", m.low)?;
                positive_rate("high_bandwidth", m.high)?;
                positive_rate("bandwidth_change_rate", m.change_per_tick)?;
                if m.low > m.high {
                    return Err(ConfigError::out_of_range(
                        "low_bandwidth",
                        format!("{} is above high_bandwidth {}", m.low, m.high),
                    ));
                }
                if m.initial < m.low || m.initial > m.high {
                    return Err(ConfigError::out_of_range(
                        "bandwidth",
                        format!("{} is outside [{}, {}]", m.initial, m.low, m.high),
                    ));
                }
                Ok(())
            }
            Self::Periodic(m) => {
                positive_rate("mean_bandwidth", m.mean)?;
                positive_rate("amplitude", m.amplitude)?;
                positive_duration("period", m.period)?;
                if m.amplitude > m.mean {
                    return Err(ConfigError::out_of_range(
                        "amplitude",
                        format!("{} exceeds mean_bandwidth {}", m.amplitude, m.mean),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// The two states of the step mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    High,
    Low,
}

/// Direction of the linear ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Down,
    Up,
}

#[derive(Debug)]
struct CapacityState {
    model: CapacityModel,
    current: DataRate,
    phase: StepPhase,
    direction: Direction,
    started_at: SimTime,
    transitions: u64,
}

/// Owns a link's current bandwidth. Clones are handles to the same state.
#[derive(Debug, Clone)]
pub struct CapacityController {
    state: Arc<Mutex<CapacityState>>,
    trace: Trace,
}

impl CapacityController {
    /// Validates `model` and creates a stopped controller at the model's initial rate.
    pub fn new(model: CapacityModel, trace: Trace) -> Result<Self> {
        model.validate()?;

        let state = CapacityState {
            model,
            current: model.initial_rate(),
            phase: StepPhase::High,
            direction: Direction::Down,
            started_at: SimTime::ZERO,
            transitions: 0,
        };

        Ok(Self { state: Arc::new(Mutex::new(state)), trace })
    }

    /// The model this controller was created with.
    pub fn model(&self) -> CapacityModel {
        self.state.lock().model
    }

    /// Arms the first transition. Timers stop once `token` is cancelled.
    pub fn start(&self, clock: &mut dyn Clock, token: CancellationToken) {
        let model = {
            let mut state = self.state.lock();
            state.started_at = clock.now();
            state.model
        };

        tracing::debug!(?model, at = %clock.now(), "starting capacity controller");

        match model {
            CapacityModel::Fixed(_) => {}
            CapacityModel::Step(m) => self.arm_switch(clock, token, m.high_duration, StepPhase::Low),
            CapacityModel::Linear(_) | CapacityModel::Periodic(_) => self.arm_tick(clock, token),
        }
    }

    /// The rate to use for a transmission starting at `now`.
    ///
    /// Never below [`MIN_RATE`].
    pub fn current_rate(&self, now: SimTime) -> DataRate {
        let state = self.state.lock();
        let rate = match state.model {
            CapacityModel::Periodic(m) => {
                let elapsed = now.saturating_duration_since(state.started_at);
                DataRate::from_bps_f64(m.rate_bps_at(elapsed))
            }
            _ => state.current,
        };

        if rate < MIN_RATE {
            tracing::warn!(%rate, %now, "capacity fell below the minimum rate, clamping");
            return MIN_RATE;
        }
        rate
    }

    /// The last rate applied by a transition (or periodic sample).
    pub fn last_rate(&self) -> DataRate {
        self.state.lock().current
    }

    /// Current state of the step mode, `None` in other modes.
    pub fn step_phase(&self) -> Option<StepPhase> {
        let state = self.state.lock();
        matches!(state.model, CapacityModel::Step(_)).then_some(state.phase)
    }

    /// Current direction of the linear ramp, `None` in other modes.
    pub fn direction(&self) -> Option<Direction> {
        let state = self.state.lock();
        matches!(state.model, CapacityModel::Linear(_)).then_some(state.direction)
    }

    /// Number of timer callbacks applied so far.
    pub fn transitions(&self) -> u64 {
        self.state.lock().transitions
    }

    fn arm_switch(
        &self,
        clock: &mut dyn Clock,
        token: CancellationToken,
        after: Duration,
        to: StepPhase,
    ) {
        let this = self.clone();
        let next = token.clone();
        clock.schedule(after, token, move |clock| this.switch(clock, next, to));
    }

    fn switch(&self, clock: &mut dyn Clock, token: CancellationToken, to: StepPhase) {
        let CapacityModel::Step(m) = self.model() else {
            return;
        };

        let (rate, hold, next, event) = match to {
            StepPhase::High => (m.high, m.high_duration, StepPhase::Low, "switch to high bandwidth"),
            StepPhase::Low => (m.low, m.low_duration, StepPhase::High, "switch to low bandwidth"),
        };

        {
            let mut state = self.state.lock();
            state.current = rate;
            state.phase = to;
            state.transitions += 1;
        }

        self.trace.record(clock.now(), event, rate);
        self.arm_switch(clock, token, hold, next);
    }

    fn arm_tick(&self, clock: &mut dyn Clock, token: CancellationToken) {
        let this = self.clone();
        let next = token.clone();
        clock.schedule(TICK_INTERVAL, token, move |clock| this.tick(clock, next));
    }

    fn tick(&self, clock: &mut dyn Clock, token: CancellationToken) {
        let now = clock.now();
        let reversal = {
            let mut state = self.state.lock();
            state.transitions += 1;

            let model = state.model;
            match model {
                CapacityModel::Linear(m) => Self::ramp(&mut state, &m),
                CapacityModel::Periodic(m) => {
                    let elapsed = now.saturating_duration_since(state.started_at);
                    state.current = DataRate::from_bps_f64(m.rate_bps_at(elapsed)).max(MIN_RATE);
                    tracing::trace!(rate = %state.current, %now, "periodic capacity sample");
                    None
                }
                CapacityModel::Fixed(_) | CapacityModel::Step(_) => return,
            }
        };

        if let Some((event, rate)) = reversal {
            self.trace.record(now, event, rate);
        }

        self.arm_tick(clock, token);
    }

    /// Moves the linear ramp by one tick. Returns the trace event when a bound is hit.
    fn ramp(state: &mut CapacityState, m: &LinearModel) -> Option<(&'static str, DataRate)> {
        let step = m.change_per_tick.bps();
        let current = state.current.bps();

        let reversal = match state.direction {
            Direction::Down => match current.checked_sub(step).filter(|next| *next >= m.low.bps()) {
                Some(next) => {
                    state.current = DataRate::from_bps(next);
                    None
                }
                None => {
                    state.current = m.low;
                    state.direction = Direction::Up;
                    Some(("linear bandwidth reached low bound", m.low))
                }
            },
            Direction::Up => match current.checked_add(step).filter(|next| *next <= m.high.bps()) {
                Some(next) => {
                    state.current = DataRate::from_bps(next);
                    None
                }
                None => {
                    state.current = m.high;
                    state.direction = Direction::Down;
                    Some(("linear bandwidth reached high bound", m.high))
                }
            },
        };

        tracing::trace!(rate = %state.current, direction = ?state.direction, "linear capacity tick");
        reversal
    }
}

#[cfg(test)]
mod tests {
    use linksim_common::constants::{Kbps, Mbps};

    use super::*;
    use crate::clock::Simulator;

    fn rate(bps: u64) -> DataRate {
        DataRate::from_bps(bps)
    }

    fn step_model() -> StepModel {
        StepModel {
            high: rate(10 * Mbps),
            low: rate(Mbps),
            high_duration: Duration::from_secs(10),
            low_duration: Duration::from_secs(5),
        }
    }

    #[test]
    fn step_alternates_and_traces() {
        let trace = Trace::memory();
        let controller = CapacityController::new(CapacityModel::Step(step_model()), trace.clone()).unwrap();
        let mut sim = Simulator::new();
        controller.start(&mut sim, CancellationToken::new());

        assert_eq!(controller.current_rate(sim.now()), rate(10 * Mbps));
        assert_eq!(controller.step_phase(), Some(StepPhase::High));

        sim.run_until(SimTime::from_secs(12));
        assert_eq!(controller.current_rate(sim.now()), rate(Mbps));
        assert_eq!(controller.step_phase(), Some(StepPhase::Low));

        sim.run_until(SimTime::from_secs(31));
        assert_eq!(
            trace.lines(),
            vec![
                "10s: switch to low bandwidth: 1Mbps",
                "15s: switch to high bandwidth: 10Mbps",
                "25s: switch to low bandwidth: 1Mbps",
                "30s: switch to high bandwidth: 10Mbps",
            ]
        );
    }

    #[test]
    fn step_stops_when_cancelled() {
        let trace = Trace::memory();
        let controller = CapacityController::new(CapacityModel::Step(step_model()), trace.clone()).unwrap();
        let mut sim = Simulator::new();
        let token = CancellationToken::new();
        controller.start(&mut sim, token.child_token());

        sim.run_until(SimTime::from_secs(11));
        token.cancel();
        sim.run_until(SimTime::from_secs(100));

        assert_eq!(trace.lines().len(), 1);
        assert_eq!(sim.pending(), 0);
    }

    #[test]
    fn linear_ramps_down_then_up() {
        let model = LinearModel {
            initial: rate(1_000 * Kbps),
            low: rate(700 * Kbps),
            high: rate(1_000 * Kbps),
            change_per_tick: rate(100 * Kbps),
        };
        let trace = Trace::memory();
        let controller = CapacityController::new(CapacityModel::Linear(model), trace.clone()).unwrap();
        let mut sim = Simulator::new();
        controller.start(&mut sim, CancellationToken::new());

        let mut seen = Vec::new();
        for tick in 1..=8 {
            sim.run_until(SimTime::from_millis(100 * tick));
            seen.push(controller.last_rate().bps() / Kbps);
        }

        // 900, 800, 700 (exact bound), clamp + reverse, then back up.
        assert_eq!(seen, vec![900, 800, 700, 700, 800, 900, 1_000, 1_000]);
        assert_eq!(
            trace.lines(),
            vec![
                "0.4s: linear bandwidth reached low bound: 700Kbps",
                "0.8s: linear bandwidth reached high bound: 1Mbps",
            ]
        );
        assert_eq!(controller.direction(), Some(Direction::Down));
    }

    #[test]
    fn linear_clamps_overshoot() {
        let model = LinearModel {
            initial: rate(1_000 * Kbps),
            low: rate(750 * Kbps),
            high: rate(1_000 * Kbps),
            change_per_tick: rate(100 * Kbps),
        };
        let controller = CapacityController::new(CapacityModel::Linear(model), Trace::disabled()).unwrap();
        let mut sim = Simulator::new();
        controller.start(&mut sim, CancellationToken::new());

        sim.run_until(SimTime::from_millis(300));
        assert_eq!(controller.last_rate(), rate(750 * Kbps));
        assert_eq!(controller.direction(), Some(Direction::Up));
    }

    #[test]
    fn periodic_is_exact_at_any_instant() {
        let model = PeriodicModel {
            mean: rate(5 * Mbps),
            amplitude: rate(2 * Mbps),
            period: Duration::from_secs(4),
        };
        let controller = CapacityController::new(CapacityModel::Periodic(model), Trace::disabled()).unwrap();
        let mut sim = Simulator::new();
        controller.start(&mut sim, CancellationToken::new());

        assert_eq!(controller.current_rate(SimTime::ZERO), rate(5 * Mbps));
        assert_eq!(controller.current_rate(SimTime::from_secs(1)), rate(7 * Mbps));
        assert_eq!(controller.current_rate(SimTime::from_secs(3)), rate(3 * Mbps));

        let t = SimTime::from_millis(1_234);
        let expected = 5e6 + 2e6 * (TAU * 1.234 / 4.0).sin();
        assert_eq!(model.rate_bps_at(Duration::from_millis(1_234)), expected);
        assert_eq!(controller.current_rate(t), DataRate::from_bps_f64(expected));

        sim.run_until(SimTime::from_secs(1));
        assert_eq!(controller.last_rate(), rate(7 * Mbps));
    }

    #[test]
    fn periodic_at_full_amplitude_never_hits_zero() {
        let model = PeriodicModel {
            mean: rate(Mbps),
            amplitude: rate(Mbps),
            period: Duration::from_secs(4),
        };
        let controller = CapacityController::new(CapacityModel::Periodic(model), Trace::disabled()).unwrap();
        assert_eq!(controller.current_rate(SimTime::from_secs(3)), MIN_RATE);
    }

    #[test]
    fn invalid_models_are_rejected() {
        let periodic = PeriodicModel {
            mean: rate(Mbps),
            amplitude: rate(2 * Mbps),
            period: Duration::from_secs(1),
        };
        assert!(matches!(
            CapacityController::new(CapacityModel::Periodic(periodic), Trace::disabled()),
            Err(ConfigError::OutOfRange { option: "amplitude", .. })
        ));

        let zero_period = PeriodicModel { amplitude: rate(Kbps), period: Duration::ZERO, ..periodic };
        assert!(matches!(
            CapacityModel::Periodic(zero_period).validate(),
            Err(ConfigError::OutOfRange { option: "period", .. })
        ));

        let step = StepModel { low_duration: Duration::ZERO, ..step_model() };
        assert!(matches!(
            CapacityModel::Step(step).validate(),
            Err(ConfigError::OutOfRange { option: "duration_low", .. })
        ));

        let linear = LinearModel {
            initial: rate(2 * Mbps),
            low: rate(Mbps),
            high: rate(10 * Mbps),
            change_per_tick: DataRate::ZERO,
        };
        assert!(matches!(
            CapacityModel::Linear(linear).validate(),
            Err(ConfigError::OutOfRange { option: "bandwidth_change_rate", .. })
        ));

        assert!(matches!(
            CapacityModel::Fixed(DataRate::ZERO).validate(),
            Err(ConfigError::OutOfRange { option: "bandwidth", .. })
        ));
    }

    #[test]
    fn mode_names() {
        assert_eq!("step".parse::<CapacityMode>().unwrap(), CapacityMode::Step);
        assert_eq!("Linear".parse::<CapacityMode>().unwrap(), CapacityMode::Linear);
        assert_eq!("periodic".parse::<CapacityMode>().unwrap(), CapacityMode::Periodic);
        assert!(matches!("sawtooth".parse::<CapacityMode>(), Err(ConfigError::UnknownMode(_))));
    }
}
