//! Link assembly.
//!
//! A [`Link`] joins two endpoints, [`Side::A`] and [`Side::B`]. Packets sent from one side are
//! delayed by the link's [`DelayModel`] and, on arrival, judged by the receiving side's
//! [`DropModel`]. Surviving packets are pushed to that side's receiver in [`Ports`].
//!
//! [`Link::install`] builds the standard composition from a [`LinkConfig`]: one capacity
//! controller, one jitter source shared by the scheduler and both drop policies, and one drop
//! policy per receiving side with its own random stream.
//!
//! Every action a link registers on the clock carries a child of the link's cancellation token.
//! Tearing the link down, explicitly or by dropping it, cancels all of them.

use std::{fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{
    capacity::CapacityController,
    clock::Clock,
    config::{LinkConfig, Stream},
    drop::{DropModel, DropPolicy},
    error::Result,
    jitter::{JitterRegistry, JitterSource},
    packet::Packet,
    scheduler::{DelayModel, Delivery, ImpairedDelay, LinkDeliveryScheduler},
    stats::{LinkSnapshot, LinkStats},
    time::SimTime,
    trace::Trace,
};

/// One end of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

impl Side {
    /// The opposite end.
    pub fn peer(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}

/// A packet handed to a receiving endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub packet: Packet,
    /// Simulated delivery time.
    pub at: SimTime,
}

/// The receiving ends of both endpoints.
#[derive(Debug)]
pub struct Ports {
    /// Packets delivered to endpoint A
    pub a: mpsc::UnboundedReceiver<Received>,
    /// Packets delivered to endpoint B
    pub b: mpsc::UnboundedReceiver<Received>,
}

impl Ports {
    /// The receiver of endpoint `side`.
    pub fn side(&mut self, side: Side) -> &mut mpsc::UnboundedReceiver<Received> {
        match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        }
    }
}

struct Endpoint {
    side: Side,
    drop: Mutex<Box<dyn DropModel>>,
    tx: mpsc::UnboundedSender<Received>,
    stats: Arc<LinkStats>,
}

impl Endpoint {
    fn receive(&self, packet: Packet, at: SimTime) {
        let stats = self.stats.side(self.side);
        stats.increment_received();

        if let Some(reason) = self.drop.lock().decide(&packet, at) {
            stats.increment_dropped(reason);
            return;
        }

        let id = packet.id();
        if self.tx.send(Received { packet, at }).is_err() {
            tracing::debug!(side = %self.side, id, "receiver closed, discarding packet");
            return;
        }

        stats.increment_delivered();
        tracing::trace!(side = %self.side, id, %at, "delivered packet");
    }
}

/// A point-to-point impaired link.
pub struct Link<D = ImpairedDelay> {
    capacity: CapacityController,
    scheduler: LinkDeliveryScheduler<D>,
    endpoints: [Arc<Endpoint>; 2],
    stats: Arc<LinkStats>,
    token: CancellationToken,
    _guard: DropGuard,
}

impl<D> fmt::Debug for Link<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats.snapshot())
            .field("torn_down", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Link {
    /// Builds a link from `config` with the built-in jitter distributions and starts its
    /// capacity controller.
    pub fn install(clock: &mut dyn Clock, config: &LinkConfig, trace: Trace) -> Result<(Self, Ports)> {
        Self::install_with_registry(clock, config, &JitterRegistry::default(), trace)
    }

    /// Like [`Link::install`], resolving the jitter model through `registry`.
    pub fn install_with_registry(
        clock: &mut dyn Clock,
        config: &LinkConfig,
        registry: &JitterRegistry,
        trace: Trace,
    ) -> Result<(Self, Ports)> {
        config.validate()?;

        let jitter = config
            .jitter
            .as_ref()
            .map(|spec| JitterSource::from_spec(spec, registry, config.stream_seed(Stream::Jitter)))
            .transpose()?;

        let capacity = CapacityController::new(config.capacity, trace)?;

        let now = clock.now();
        let mut drop_a = DropPolicy::new(config.drop, now, config.stream_seed(Stream::DropA))?;
        let mut drop_b = DropPolicy::new(config.drop, now, config.stream_seed(Stream::DropB))?;

        let mut delay = ImpairedDelay::new(config.delay, capacity.clone());
        if let Some(jitter) = jitter {
            drop_a.set_jitter(jitter.clone());
            drop_b.set_jitter(jitter.clone());
            delay = delay.with_jitter(jitter);
        }

        tracing::debug!(
            delay = ?config.delay,
            capacity = ?config.capacity,
            jitter = ?config.jitter,
            drop = ?config.drop,
            seed = config.seed,
            "installing link"
        );

        Ok(Self::from_parts(
            clock,
            capacity,
            LinkDeliveryScheduler::new(delay),
            Box::new(drop_a),
            Box::new(drop_b),
        ))
    }
}

impl<D: DelayModel> Link<D> {
    /// Assembles a link from its components and starts the capacity controller.
    ///
    /// `drop_a` judges packets arriving at side A, `drop_b` those arriving at side B.
    pub fn from_parts(
        clock: &mut dyn Clock,
        capacity: CapacityController,
        scheduler: LinkDeliveryScheduler<D>,
        drop_a: Box<dyn DropModel>,
        drop_b: Box<dyn DropModel>,
    ) -> (Self, Ports) {
        let token = CancellationToken::new();
        let stats = Arc::new(LinkStats::default());

        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let endpoint = |side, drop, tx| {
            Arc::new(Endpoint { side, drop: Mutex::new(drop), tx, stats: Arc::clone(&stats) })
        };
        let endpoints = [endpoint(Side::A, drop_a, tx_a), endpoint(Side::B, drop_b, tx_b)];

        capacity.start(clock, token.child_token());

        let link = Self {
            capacity,
            scheduler,
            endpoints,
            stats,
            _guard: token.clone().drop_guard(),
            token,
        };

        (link, Ports { a: rx_a, b: rx_b })
    }

    /// Sends `packet` from `from` to the opposite side, `extra` on top of the modelled delay.
    pub fn send(&mut self, clock: &mut dyn Clock, from: Side, packet: &Packet, extra: Duration) -> Delivery {
        if self.token.is_cancelled() {
            tracing::warn!(side = %from, id = packet.id(), "sending on a torn down link, the packet will be lost");
        }

        self.stats.side(from).increment_sent();

        let endpoint = Arc::clone(&self.endpoints[from.peer().index()]);
        self.scheduler.send(clock, packet, extra, self.token.child_token(), move |clock, packet| {
            endpoint.receive(packet, clock.now())
        })
    }

    pub fn capacity(&self) -> &CapacityController {
        &self.capacity
    }

    pub fn scheduler(&self) -> &LinkDeliveryScheduler<D> {
        &self.scheduler
    }

    /// Counters of both endpoints at this instant.
    pub fn stats(&self) -> LinkSnapshot {
        self.stats.snapshot()
    }

    /// Cancels the capacity timers and every pending delivery.
    pub fn teardown(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!(stats = ?self.stats.snapshot(), "tearing down link");
        }
        self.token.cancel();
    }

    pub fn is_torn_down(&self) -> bool {
        self.token.is_cancelled()
    }
}
