//! `linksim`: sends test traffic over an impaired link and prints the transition trace.
//!
//! ```text
//! linksim --delay 15ms --high_bandwidth 10Mbps --low_bandwidth 1Mbps \
//!     --duration_high 10s --duration_low 5s --run_time 60s
//! ```

use std::{process::ExitCode, time::Duration};

use clap::Parser;
use linksim::{
    link::Ports, stats::SideSnapshot, Clock, Link, LinkConfig, Packet, Side, SimTime, Simulator,
    Trace,
};
use linksim_common::parse_duration;

#[derive(Debug, Parser)]
#[command(name = "linksim")]
#[command(about = "Degraded point-to-point link: variable bandwidth, jitter, bursty and cyclic loss")]
struct Cli {
    /// Fixed propagation delay, e.g. `10ms`.
    #[arg(long)]
    delay: Option<String>,
    /// Fixed bandwidth, or the starting rate of the linear mode, e.g. `10Mbps`.
    #[arg(long)]
    bandwidth: Option<String>,
    /// Bandwidth variation mode: step, linear or periodic.
    #[arg(long)]
    mode: Option<String>,
    /// Set to 1 to alternate between high and low bandwidth.
    #[arg(long = "bandwidth_variation")]
    bandwidth_variation: Option<String>,
    #[arg(long = "high_bandwidth")]
    high_bandwidth: Option<String>,
    #[arg(long = "low_bandwidth")]
    low_bandwidth: Option<String>,
    #[arg(long = "duration_high", alias = "high_duration")]
    duration_high: Option<String>,
    #[arg(long = "duration_low", alias = "low_duration")]
    duration_low: Option<String>,
    /// Linear mode change per 100ms tick.
    #[arg(long = "bandwidth_change_rate")]
    bandwidth_change_rate: Option<String>,
    #[arg(long = "mean_bandwidth")]
    mean_bandwidth: Option<String>,
    #[arg(long)]
    amplitude: Option<String>,
    #[arg(long)]
    period: Option<String>,
    /// Probability in [0, 1] that a packet starts a loss burst.
    #[arg(long = "drop_rate")]
    drop_rate: Option<String>,
    #[arg(long = "max_burst", alias = "MaxDropBurst")]
    max_burst: Option<String>,
    /// Set to 1 to enable outage windows.
    #[arg(long = "cyclic_drop")]
    cyclic_drop: Option<String>,
    #[arg(long = "cyclic_period")]
    cyclic_period: Option<String>,
    #[arg(long = "cyclic_duration")]
    cyclic_duration: Option<String>,
    /// Jitter distribution, e.g. `ns3::NormalRandomVariable`.
    #[arg(long = "jitter_model")]
    jitter_model: Option<String>,
    /// Jitter parameters, e.g. `Mean=5|Variance=2`.
    #[arg(long = "jitter_params")]
    jitter_params: Option<String>,
    /// Accepted for compatibility, queue sizing is not modelled.
    #[arg(long)]
    queue: Option<String>,
    #[arg(long)]
    seed: Option<String>,

    /// Simulated run time.
    #[arg(long = "run_time", default_value = "60s")]
    run_time: String,
    /// Interval between test packets, sent from both sides.
    #[arg(long = "send_interval", default_value = "10ms")]
    send_interval: String,
    /// Test packet size in bytes.
    #[arg(long = "packet_size", default_value_t = 1500)]
    packet_size: usize,
}

impl Cli {
    fn options(&self) -> Vec<(&'static str, &str)> {
        let options = [
            ("delay", &self.delay),
            ("bandwidth", &self.bandwidth),
            ("mode", &self.mode),
            ("bandwidth_variation", &self.bandwidth_variation),
            ("high_bandwidth", &self.high_bandwidth),
            ("low_bandwidth", &self.low_bandwidth),
            ("duration_high", &self.duration_high),
            ("duration_low", &self.duration_low),
            ("bandwidth_change_rate", &self.bandwidth_change_rate),
            ("mean_bandwidth", &self.mean_bandwidth),
            ("amplitude", &self.amplitude),
            ("period", &self.period),
            ("drop_rate", &self.drop_rate),
            ("max_burst", &self.max_burst),
            ("cyclic_drop", &self.cyclic_drop),
            ("cyclic_period", &self.cyclic_period),
            ("cyclic_duration", &self.cyclic_duration),
            ("jitter_model", &self.jitter_model),
            ("jitter_params", &self.jitter_params),
            ("queue", &self.queue),
            ("seed", &self.seed),
        ];

        options.into_iter().filter_map(|(name, value)| Some((name, value.as_deref()?))).collect()
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "aborting");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = LinkConfig::from_options(cli.options())?;
    let run_time = SimTime::from(parse_duration(&cli.run_time)?);
    let interval = parse_duration(&cli.send_interval)?;
    if interval.is_zero() {
        return Err("send_interval must be greater than 0".into());
    }

    let mut sim = Simulator::new();
    let (mut link, mut ports) = Link::install(&mut sim, &config, Trace::stdout())?;
    tracing::info!(?config, %run_time, ?interval, "starting run");

    let traffic = Traffic::send(&mut sim, &mut link, interval, cli.packet_size, run_time);
    traffic.settle(&mut sim);

    let latency = drain(&mut ports, &traffic.sent_at);
    let stats = link.stats();
    for side in [Side::A, Side::B] {
        println!("{}", summary(side, stats.side(side), latency.side(side)));
    }

    link.teardown();
    Ok(())
}

/// Test traffic sent over the run.
#[derive(Debug, Default)]
struct Traffic {
    /// Send time of every packet, indexed by packet id.
    sent_at: Vec<SimTime>,
    /// Latest delivery instant scheduled so far.
    last_delivery: SimTime,
}

impl Traffic {
    /// Sends one packet from each side every `interval` until `end`.
    fn send(
        sim: &mut Simulator,
        link: &mut Link,
        interval: Duration,
        packet_size: usize,
        end: SimTime,
    ) -> Self {
        let mut traffic = Self::default();

        while sim.now() < end {
            for from in [Side::A, Side::B] {
                let packet = Packet::zeroed(traffic.sent_at.len() as u64, packet_size);
                let delivery = link.send(sim, from, &packet, Duration::ZERO);
                traffic.sent_at.push(delivery.sent_at);
                traffic.last_delivery = traffic.last_delivery.max(delivery.deliver_at);
            }
            let next = sim.now() + interval;
            sim.run_until(next.min(end));
        }

        traffic
    }

    /// Runs until the last scheduled delivery has landed. Jitter and transmission time
    /// included.
    fn settle(&self, sim: &mut Simulator) {
        let until = self.last_delivery.max(sim.now());
        tracing::debug!(%until, "waiting for in-flight packets");
        sim.run_until(until);
    }
}

#[derive(Debug, Default)]
struct Latency {
    count: u64,
    total: Duration,
    max: Duration,
}

impl Latency {
    fn record(&mut self, latency: Duration) {
        self.count += 1;
        self.total += latency;
        self.max = self.max.max(latency);
    }

    fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.total.as_nanos() / self.count as u128) as u64)
    }
}

#[derive(Debug, Default)]
struct Latencies {
    a: Latency,
    b: Latency,
}

impl Latencies {
    fn side(&self, side: Side) -> &Latency {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }
}

/// Empties both receivers. Packet ids index `sent_at`.
fn drain(ports: &mut Ports, sent_at: &[SimTime]) -> Latencies {
    let mut latencies = Latencies::default();

    for side in [Side::A, Side::B] {
        let rx = ports.side(side);
        while let Ok(received) = rx.try_recv() {
            let Some(sent) = sent_at.get(received.packet.id() as usize) else {
                continue;
            };
            let latency = received.at.saturating_duration_since(*sent);
            match side {
                Side::A => latencies.a.record(latency),
                Side::B => latencies.b.record(latency),
            }
        }
    }

    latencies
}

fn summary(side: Side, stats: &SideSnapshot, latency: &Latency) -> String {
    format!(
        "side {side}: sent={} received={} delivered={} dropped_cyclic={} dropped_random={} mean_latency={:?} max_latency={:?}",
        stats.sent,
        stats.received,
        stats.delivered,
        stats.dropped_cyclic,
        stats.dropped_random,
        latency.mean(),
        latency.max,
    )
}
