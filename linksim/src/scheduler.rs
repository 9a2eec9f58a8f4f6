//! Delivery-time computation and scheduling.
//!
//! For every packet the scheduler adds up
//!
//! ```text
//! propagation + jitter + size_bits / rate(sent_at) + extra
//! ```
//!
//! and registers the delivery of a copy of the packet at `sent_at + total` on the clock.
//! The rate is sampled once, at send time. Since both jitter and capacity vary, later packets
//! can overtake earlier ones: the scheduler gives no FIFO guarantee.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    capacity::CapacityController,
    clock::Clock,
    jitter::JitterSource,
    packet::Packet,
    time::{SignedDelay, SimTime},
};

/// The components of a packet's one-way delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelayBreakdown {
    /// Fixed delay of the link.
    pub propagation: Duration,
    /// Signed jitter sample, zero without a jitter model.
    pub jitter: SignedDelay,
    /// Packet size over the rate in effect at send time.
    pub transmission: Duration,
    /// Delay supplied by the sender.
    pub extra: Duration,
}

impl DelayBreakdown {
    /// The sum of all components. A negative jitter larger than the rest yields zero.
    pub fn total(&self) -> Duration {
        let nanos = self.propagation.as_nanos() as i128 +
            self.jitter.as_nanos() as i128 +
            self.transmission.as_nanos() as i128 +
            self.extra.as_nanos() as i128;
        Duration::from_nanos(nanos.clamp(0, u64::MAX as i128) as u64)
    }
}

/// The delay-computation capability of a link.
pub trait DelayModel: Send {
    /// Delay of `packet` sent at `now`, without caller-supplied extra delay.
    fn delay(&mut self, packet: &Packet, now: SimTime) -> DelayBreakdown;
}

/// Fixed propagation delay, optional jitter and a time-varying capacity.
#[derive(Debug, Clone)]
pub struct ImpairedDelay {
    propagation: Duration,
    jitter: Option<JitterSource>,
    capacity: CapacityController,
}

impl ImpairedDelay {
    /// A delay model without jitter.
    pub fn new(propagation: Duration, capacity: CapacityController) -> Self {
        Self { propagation, jitter: None, capacity }
    }

    pub fn with_jitter(mut self, jitter: JitterSource) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn capacity(&self) -> &CapacityController {
        &self.capacity
    }

    pub fn jitter(&self) -> Option<&JitterSource> {
        self.jitter.as_ref()
    }
}

impl DelayModel for ImpairedDelay {
    fn delay(&mut self, packet: &Packet, now: SimTime) -> DelayBreakdown {
        let jitter = self.jitter.as_ref().map_or(SignedDelay::ZERO, JitterSource::sample);
        let rate = self.capacity.current_rate(now);

        DelayBreakdown {
            propagation: self.propagation,
            jitter,
            transmission: rate.transmission_time(packet.len()),
            extra: Duration::ZERO,
        }
    }
}

/// A delivery registered on the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub sent_at: SimTime,
    /// `sent_at` plus the total delay.
    pub deliver_at: SimTime,
    pub delay: DelayBreakdown,
}

/// Computes delivery times and schedules deliveries on a [`Clock`].
#[derive(Debug)]
pub struct LinkDeliveryScheduler<D = ImpairedDelay> {
    delay: D,
}

impl<D: DelayModel> LinkDeliveryScheduler<D> {
    pub fn new(delay: D) -> Self {
        Self { delay }
    }

    pub fn delay_model(&self) -> &D {
        &self.delay
    }

    /// Schedules `deliver` with a copy of `packet` at `now + delay + extra`.
    ///
    /// The delivery is skipped if `token` is cancelled before it fires.
    pub fn send<F>(
        &mut self,
        clock: &mut dyn Clock,
        packet: &Packet,
        extra: Duration,
        token: CancellationToken,
        deliver: F,
    ) -> Delivery
    where
        F: FnOnce(&mut dyn Clock, Packet) + Send + 'static,
    {
        let sent_at = clock.now();
        let mut delay = self.delay.delay(packet, sent_at);
        delay.extra = extra;

        let deliver_at = sent_at + delay.total();
        tracing::trace!(
            id = packet.id(),
            len = packet.len(),
            %sent_at,
            %deliver_at,
            jitter_ms = delay.jitter.as_millis_f64(),
            transmission = ?delay.transmission,
            "scheduling delivery"
        );

        let copy = packet.clone();
        clock.schedule_at(deliver_at, token, Box::new(move |clock| deliver(clock, copy)));

        Delivery { sent_at, deliver_at, delay }
    }
}
