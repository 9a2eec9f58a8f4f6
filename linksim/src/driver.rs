//! A link owned by its own tokio task.
//!
//! [`LinkDriver::spawn`] installs a link on a fresh [`Simulator`] and moves both into a task.
//! The returned [`LinkHandle`] is the only way to reach them: every call is a closure shipped
//! over a [`dynch`](crate::dynch) channel and run with exclusive access to the
//! [`LinkContext`], so all mutation of one link stays serialized. Distinct links share nothing.

use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    clock::{Clock, Simulator},
    config::LinkConfig,
    dynch::{self, DynRequest, DynRequestSender},
    error::ConfigError,
    link::{Link, Ports, Side},
    packet::Packet,
    scheduler::Delivery,
    stats::LinkSnapshot,
    time::SimTime,
    trace::Trace,
};

const REQUEST_BUFFER: usize = 64;

/// Errors returned by [`LinkHandle`] calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The link could not be installed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The driver task has stopped.
    #[error("link driver closed")]
    Closed,
}

/// Result of a driver call.
pub type Result<T> = std::result::Result<T, Error>;

/// The state owned by the driver task.
#[derive(Debug)]
pub struct LinkContext {
    /// Clock of the link. Only advances when a handle asks.
    pub sim: Simulator,
    pub link: Link,
}

/// The task side of a driven link.
pub struct LinkDriver {
    ctx: LinkContext,
    requests: mpsc::Receiver<DynRequest<LinkContext>>,
    token: CancellationToken,
}

impl LinkDriver {
    /// Installs a link from `config` and spawns its driver task on the current runtime.
    pub fn spawn(config: &LinkConfig, trace: Trace) -> Result<(LinkHandle, Ports, JoinHandle<()>)> {
        let mut sim = Simulator::new();
        let (link, ports) = Link::install(&mut sim, config, trace)?;

        let (tx, requests) = dynch::channel(REQUEST_BUFFER);
        let token = CancellationToken::new();

        let driver = Self { ctx: LinkContext { sim, link }, requests, token: token.clone() };
        let span = tracing::debug_span!("link_driver", seed = config.seed);
        let task = tokio::spawn(driver.run().instrument(span));

        Ok((LinkHandle { tx, token }, ports, task))
    }

    async fn run(mut self) {
        tracing::debug!("link driver started");

        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    tracing::debug!("shutdown requested");
                    break;
                }
                request = self.requests.recv() => match request {
                    Some(request) => request.run(&mut self.ctx),
                    None => {
                        tracing::debug!("all handles dropped");
                        break;
                    }
                },
            }
        }

        self.ctx.link.teardown();
        tracing::debug!(
            now = %self.ctx.sim.now(),
            executed = self.ctx.sim.executed(),
            stats = ?self.ctx.link.stats(),
            "link driver stopped"
        );
    }
}

/// A cloneable handle to a driven link.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    tx: DynRequestSender<LinkContext>,
    token: CancellationToken,
}

impl LinkHandle {
    /// Runs `f` on the driver task with exclusive access to the simulator and the link.
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut LinkContext) -> T + Send + 'static,
    {
        let response = self.tx.submit(f).await.map_err(|_| Error::Closed)?;
        response.receive().await.map_err(|_| Error::Closed)
    }

    /// Sends `packet` from `from` at the link's current simulated time.
    pub async fn send(&self, from: Side, packet: Packet) -> Result<Delivery> {
        self.send_with_extra(from, packet, Duration::ZERO).await
    }

    /// Like [`Self::send`], with `extra` added to the delivery delay.
    pub async fn send_with_extra(&self, from: Side, packet: Packet, extra: Duration) -> Result<Delivery> {
        self.call(move |ctx| ctx.link.send(&mut ctx.sim, from, &packet, extra)).await
    }

    /// Advances simulated time to `end`. Returns the number of actions executed.
    pub async fn run_until(&self, end: SimTime) -> Result<u64> {
        self.call(move |ctx| ctx.sim.run_until(end)).await
    }

    pub async fn now(&self) -> Result<SimTime> {
        self.call(|ctx| ctx.sim.now()).await
    }

    /// Counters of both endpoints.
    pub async fn stats(&self) -> Result<LinkSnapshot> {
        self.call(|ctx| ctx.link.stats()).await
    }

    /// Stops the driver task, which tears the link down.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }
}
