use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{drop::DropReason, link::Side};

/// Counters of one link endpoint. Shared between the link and its scheduled deliveries.
#[derive(Debug, Default)]
pub struct SideStats {
    /// Packets sent from this side
    sent: AtomicUsize,
    /// Packets that reached this side, before the drop decision
    received: AtomicUsize,
    /// Packets handed to this side's receiver
    delivered: AtomicUsize,
    /// Packets lost in an outage window
    dropped_cyclic: AtomicUsize,
    /// Packets lost to random loss, bursts included
    dropped_random: AtomicUsize,
}

impl SideStats {
    #[inline]
    pub(crate) fn increment_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_dropped(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::Cyclic => &self.dropped_cyclic,
            DropReason::Random | DropReason::Burst => &self.dropped_random,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn received(&self) -> usize {
        self.received.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_cyclic(&self) -> usize {
        self.dropped_cyclic.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_random(&self) -> usize {
        self.dropped_random.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SideSnapshot {
        SideSnapshot {
            sent: self.sent(),
            received: self.received(),
            delivered: self.delivered(),
            dropped_cyclic: self.dropped_cyclic(),
            dropped_random: self.dropped_random(),
        }
    }
}

/// A point-in-time copy of [`SideStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideSnapshot {
    /// Packets sent from this side
    pub sent: usize,
    /// Packets that reached this side, before the drop decision
    pub received: usize,
    /// Packets handed to this side's receiver
    pub delivered: usize,
    /// Packets lost in an outage window
    pub dropped_cyclic: usize,
    /// Packets lost to random loss, bursts included
    pub dropped_random: usize,
}

impl SideSnapshot {
    /// All packets lost on this side, for either reason.
    pub fn dropped(&self) -> usize {
        self.dropped_cyclic + self.dropped_random
    }
}

/// Counters of both endpoints of a link.
#[derive(Debug, Default)]
pub struct LinkStats {
    pub(crate) a: SideStats,
    pub(crate) b: SideStats,
}

impl LinkStats {
    pub fn a(&self) -> &SideStats {
        &self.a
    }

    pub fn b(&self) -> &SideStats {
        &self.b
    }

    /// Counters of the endpoint `side`.
    pub fn side(&self, side: Side) -> &SideStats {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot { a: self.a.snapshot(), b: self.b.snapshot() }
    }
}

/// A point-in-time copy of [`LinkStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkSnapshot {
    /// Counters of endpoint A
    pub a: SideSnapshot,
    /// Counters of endpoint B
    pub b: SideSnapshot,
}

impl LinkSnapshot {
    pub fn side(&self, side: Side) -> &SideSnapshot {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }
}
