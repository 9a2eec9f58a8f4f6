//! A degraded point-to-point link for protocol testing.
//!
//! A [`Link`] perturbs every packet it carries with:
//!
//! - a time-varying capacity ([`CapacityController`]), which sets the transmission delay,
//! - a fixed propagation delay plus an optional random jitter ([`JitterSource`]),
//! - receive-side loss ([`DropPolicy`]): bursty random drops and cyclic outage windows.
//!
//! Everything runs on a discrete event [`Clock`], normally a [`Simulator`]. Given the same
//! configuration and seed, a run is reproducible bit for bit.
//!
//! ```
//! use std::time::Duration;
//!
//! use linksim::{Clock, Link, LinkConfig, Packet, Side, SimTime, Simulator, Trace};
//!
//! let config = LinkConfig::from_options([("delay", "10ms"), ("bandwidth", "1Mbps")])?;
//!
//! let mut sim = Simulator::new();
//! let (mut link, mut ports) = Link::install(&mut sim, &config, Trace::disabled())?;
//!
//! link.send(&mut sim, Side::A, &Packet::zeroed(1, 1500), Duration::ZERO);
//! sim.run_until(SimTime::from_secs(1));
//!
//! let received = ports.b.try_recv()?;
//! assert_eq!(received.at, SimTime::from_millis(22));
//! assert_eq!(sim.now(), SimTime::from_secs(1));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod capacity;
pub mod clock;
pub mod config;
pub mod driver;
pub mod drop;
pub mod dynch;
pub mod error;
pub mod jitter;
pub mod link;
pub mod packet;
pub mod scheduler;
pub mod stats;
pub mod time;
pub mod trace;

pub use capacity::{CapacityController, CapacityMode, CapacityModel, LinearModel, PeriodicModel, StepModel};
pub use clock::{Clock, ClockExt, Simulator};
pub use config::LinkConfig;
pub use driver::{LinkDriver, LinkHandle};
pub use drop::{CyclicDrop, DropConfig, DropModel, DropPolicy, DropReason};
pub use error::ConfigError;
pub use jitter::{JitterRegistry, JitterSource, JitterSpec};
pub use link::{Link, Ports, Received, Side};
pub use packet::Packet;
pub use scheduler::{DelayModel, LinkDeliveryScheduler};
pub use time::{SignedDelay, SimTime};
pub use trace::Trace;

pub use linksim_common::{parse_duration, DataRate};
