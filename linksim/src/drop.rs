//! Receive-side packet loss.
//!
//! A [`DropPolicy`] combines two loss processes into one decision per packet:
//!
//! 1. Cyclic outage windows. While a window is open every packet is lost. Windows are advanced
//!    lazily, on the first decision made after the current window has closed: a link that stays
//!    idle for several periods moves forward by one window only.
//! 2. Bursty random loss. A uniform draw below the drop rate loses the packet and, when bursts
//!    are enabled, also loses up to `max_burst - 1` of the packets that follow.

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    error::{ConfigError, Result},
    jitter::JitterSource,
    packet::Packet,
    time::{SignedDelay, SimTime},
};

/// Recurring outage windows: every `period`, the link is down for `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclicDrop {
    /// Time between the starts of two windows. The first opens one period after install.
    pub period: Duration,
    /// Length of each window, at most `period`.
    pub duration: Duration,
}

impl Default for CyclicDrop {
    fn default() -> Self {
        Self { period: Duration::from_secs(10), duration: Duration::from_secs(1) }
    }
}

impl CyclicDrop {
    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(ConfigError::out_of_range("cyclic_period", "must be greater than 0"));
        }
        if self.duration.is_zero() {
            return Err(ConfigError::out_of_range("cyclic_duration", "must be greater than 0"));
        }
        if self.duration > self.period {
            return Err(ConfigError::out_of_range(
                "cyclic_duration",
                format!("{:?} is longer than cyclic_period {:?}", self.duration, self.period),
            ));
        }
        Ok(())
    }
}

/// Loss configuration of one receiving endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropConfig {
    /// Probability in `[0, 1]` that a packet starts a loss burst.
    pub drop_rate: f64,
    /// Maximum number of consecutive losses once a burst starts.
    pub max_burst: u32,
    /// Outage windows, checked before random loss.
    pub cyclic: Option<CyclicDrop>,
}

impl Default for DropConfig {
    fn default() -> Self {
        Self { drop_rate: 0.0, max_burst: 1, cyclic: None }
    }
}

impl DropConfig {
    pub fn with_drop_rate(mut self, drop_rate: f64) -> Self {
        self.drop_rate = drop_rate;
        self
    }

    pub fn with_max_burst(mut self, max_burst: u32) -> Self {
        self.max_burst = max_burst;
        self
    }

    /// Enables outage windows.
    pub fn with_cyclic(mut self, cyclic: CyclicDrop) -> Self {
        self.cyclic = Some(cyclic);
        self
    }

    /// True when no packet can ever be lost.
    pub fn is_lossless(&self) -> bool {
        self.drop_rate == 0.0 && self.cyclic.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.drop_rate) {
            return Err(ConfigError::out_of_range(
                "drop_rate",
                format!("{} is outside [0, 1]", self.drop_rate),
            ));
        }
        if self.max_burst == 0 {
            return Err(ConfigError::out_of_range("max_burst", "must be at least 1"));
        }
        if let Some(cyclic) = &self.cyclic {
            cyclic.validate()?;
        }
        Ok(())
    }
}

/// Why a packet was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Arrived inside an outage window.
    Cyclic,
    /// Started a new loss burst.
    Random,
    /// Continuation of a running burst.
    Burst,
}

/// A half-open `[start, end)` outage window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutageWindow {
    pub start: SimTime,
    pub end: SimTime,
}

impl OutageWindow {
    #[inline]
    pub fn contains(&self, at: SimTime) -> bool {
        self.start <= at && at < self.end
    }
}

/// The drop-decision capability of a receiving endpoint.
pub trait DropModel: Send {
    /// Decides the fate of `packet` arriving at `now`. `None` means delivered.
    fn decide(&mut self, packet: &Packet, now: SimTime) -> Option<DropReason>;

    fn should_drop(&mut self, packet: &Packet, now: SimTime) -> bool {
        self.decide(packet, now).is_some()
    }
}

/// Bursty random loss combined with cyclic outage windows.
#[derive(Debug)]
pub struct DropPolicy {
    config: DropConfig,
    burst_remaining: u32,
    window: Option<OutageWindow>,
    rng: StdRng,
    jitter: Option<JitterSource>,
}

impl DropPolicy {
    /// Creates a policy whose first outage window opens one period after `now`.
    pub fn new(config: DropConfig, now: SimTime, seed: u64) -> Result<Self> {
        config.validate()?;

        let window = config.cyclic.map(|cyclic| {
            let start = now + cyclic.period;
            OutageWindow { start, end: start + cyclic.duration }
        });

        Ok(Self { config, burst_remaining: 0, window, rng: StdRng::seed_from_u64(seed), jitter: None })
    }

    pub fn config(&self) -> &DropConfig {
        &self.config
    }

    /// The outage window the next decisions are checked against.
    pub fn next_window(&self) -> Option<OutageWindow> {
        self.window
    }

    /// Losses still owed by the running burst.
    pub fn burst_remaining(&self) -> u32 {
        self.burst_remaining
    }

    /// Attaches a jitter source, sampled only through [`Self::jitter_delay`].
    pub fn set_jitter(&mut self, jitter: JitterSource) {
        self.jitter = Some(jitter);
    }

    /// Draws one jitter sample, if a source is attached.
    pub fn jitter_delay(&self) -> Option<SignedDelay> {
        self.jitter.as_ref().map(JitterSource::sample)
    }

    /// Decides the fate of a packet arriving at `now`, outage windows first.
    pub fn decide_at(&mut self, now: SimTime) -> Option<DropReason> {
        if self.in_outage(now) {
            return Some(DropReason::Cyclic);
        }

        if self.config.drop_rate <= 0.0 {
            return None;
        }

        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            return Some(DropReason::Burst);
        }

        let draw: f64 = self.rng.gen();
        if draw < self.config.drop_rate {
            if self.config.max_burst > 1 {
                self.burst_remaining = self.rng.gen_range(0..self.config.max_burst);
            }
            return Some(DropReason::Random);
        }

        None
    }

    /// Checks `now` against the current window, advancing it by one period once it has closed.
    fn in_outage(&mut self, now: SimTime) -> bool {
        let (Some(cyclic), Some(window)) = (self.config.cyclic, self.window.as_mut()) else {
            return false;
        };

        if window.contains(now) {
            return true;
        }

        if now >= window.end {
            window.start = window.end + (cyclic.period - cyclic.duration);
            window.end = window.start + cyclic.duration;
            tracing::trace!(start = %window.start, end = %window.end, "advanced outage window");
        }

        false
    }
}

impl DropModel for DropPolicy {
    fn decide(&mut self, packet: &Packet, now: SimTime) -> Option<DropReason> {
        let reason = self.decide_at(now);
        if let Some(reason) = reason {
            tracing::debug!(id = packet.id(), len = packet.len(), ?reason, %now, "dropping packet");
        }
        reason
    }
}
