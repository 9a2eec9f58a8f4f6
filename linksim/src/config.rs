//! Link configuration.
//!
//! A [`LinkConfig`] is either built directly with the `with_*` builders or mapped from the
//! string options of the command line with [`LinkConfig::from_options`]:
//!
//! | option | meaning |
//! |---|---|
//! | `delay` | fixed propagation delay (required) |
//! | `bandwidth` | fixed rate, or the starting rate of the linear mode |
//! | `mode` | `step`, `linear` or `periodic` |
//! | `high_bandwidth`, `low_bandwidth` | step rates and linear bounds |
//! | `duration_high`, `duration_low` | step hold times (`high_duration`, `low_duration` also accepted) |
//! | `bandwidth_change_rate` | linear change per tick |
//! | `mean_bandwidth`, `amplitude`, `period` | periodic parameters |
//! | `bandwidth_variation` | `1` selects the step mode when `mode` is absent |
//! | `drop_rate`, `max_burst` (`MaxDropBurst`) | bursty random loss |
//! | `cyclic_drop`, `cyclic_period`, `cyclic_duration` | outage windows |
//! | `jitter_model`, `jitter_params` | jitter distribution |
//! | `seed` | base seed of every random stream |

use std::{collections::BTreeMap, time::Duration};

use linksim_common::{parse_duration, DataRate};

use crate::{
    capacity::{CapacityMode, CapacityModel, LinearModel, PeriodicModel, StepModel},
    drop::{CyclicDrop, DropConfig},
    error::{ConfigError, Result},
    jitter::JitterSpec,
};

/// Seed used when `seed` is not given.
pub const DEFAULT_SEED: u64 = 1;
/// Step hold time of the high rate when `duration_high` is not given.
pub const DEFAULT_HIGH_DURATION: Duration = Duration::from_secs(10);
/// Step hold time of the low rate when `duration_low` is not given.
pub const DEFAULT_LOW_DURATION: Duration = Duration::from_secs(5);

/// Options accepted for compatibility and ignored: queue sizing is not modelled.
const IGNORED_OPTIONS: &[&str] = &["queue"];

/// The independent random streams of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Jitter,
    DropA,
    DropB,
}

/// Everything needed to install a link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// Fixed propagation delay added to every delivery.
    pub delay: Duration,
    /// How the link rate varies over time.
    pub capacity: CapacityModel,
    /// Jitter distribution, `None` for no jitter.
    pub jitter: Option<JitterSpec>,
    /// Loss applied on both receiving sides, each with its own stream.
    pub drop: DropConfig,
    /// Base seed, see [`Self::stream_seed`].
    pub seed: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            capacity: CapacityModel::default(),
            jitter: None,
            drop: DropConfig::default(),
            seed: DEFAULT_SEED,
        }
    }
}

impl LinkConfig {
    /// A lossless, jitter-free link with the default fixed rate and the given delay.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use linksim::{CapacityModel, CyclicDrop, DataRate, DropConfig, LinkConfig};
    ///
    /// let config = LinkConfig::new(Duration::from_millis(10))
    ///     .with_capacity(CapacityModel::Fixed(DataRate::from_bps(2_000_000)))
    ///     .with_drop(DropConfig::default().with_cyclic(CyclicDrop::default()))
    ///     .with_seed(7);
    ///
    /// assert!(config.validate().is_ok());
    /// assert!(config.jitter.is_none());
    /// assert!(!config.drop.is_lossless());
    /// ```
    pub fn new(delay: Duration) -> Self {
        Self { delay, ..Default::default() }
    }

    /// Sets how the link rate varies over time.
    pub fn with_capacity(mut self, capacity: CapacityModel) -> Self {
        self.capacity = capacity;
        self
    }

    /// Adds jitter drawn from the given distribution to every delivery.
    pub fn with_jitter(mut self, jitter: JitterSpec) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Sets the loss applied on both receiving sides.
    pub fn with_drop(mut self, drop: DropConfig) -> Self {
        self.drop = drop;
        self
    }

    /// Sets the base seed of every random stream.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks the capacity model and the drop config.
    pub fn validate(&self) -> Result<()> {
        self.capacity.validate()?;
        self.drop.validate()
    }

    /// Seed of one random stream, derived from [`Self::seed`].
    pub fn stream_seed(&self, stream: Stream) -> u64 {
        let index = match stream {
            Stream::Jitter => 1,
            Stream::DropA => 2,
            Stream::DropB => 3,
        };
        splitmix64(self.seed ^ splitmix64(index))
    }

    /// Maps string options to a validated config. Later duplicates win.
    pub fn from_options<I, K, V>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Options(
            options
                .into_iter()
                .map(|(k, v)| (k.as_ref().trim().to_string(), v.as_ref().trim().to_string()))
                .collect(),
        );

        let delay = options.duration("delay")?.ok_or(ConfigError::Missing("delay"))?;
        let capacity = capacity_from_options(&mut options)?;
        let jitter = jitter_from_options(&mut options)?;
        let drop = drop_from_options(&mut options)?;
        let seed = options.number::<u64>("seed")?.unwrap_or(DEFAULT_SEED);

        for ignored in IGNORED_OPTIONS {
            if let Some(value) = options.take(ignored) {
                tracing::warn!(option = *ignored, %value, "option is not modelled, ignoring");
            }
        }

        if let Some(unknown) = options.0.into_keys().next() {
            return Err(ConfigError::UnknownOption(unknown));
        }

        let config = Self { delay, capacity, jitter, drop, seed };
        config.validate()?;
        Ok(config)
    }
}

fn capacity_from_options(options: &mut Options) -> Result<CapacityModel> {
    let mode = options.take("mode").map(|mode| mode.parse::<CapacityMode>()).transpose()?;
    let variation = options.flag("bandwidth_variation")?.unwrap_or(false);
    let bandwidth = options.rate("bandwidth")?;
    let high = options.rate("high_bandwidth")?;
    let low = options.rate("low_bandwidth")?;
    let high_duration = options.duration_alias("duration_high", "high_duration")?;
    let low_duration = options.duration_alias("duration_low", "low_duration")?;
    let change = options.rate("bandwidth_change_rate")?;
    let mean = options.rate("mean_bandwidth")?;
    let amplitude = options.rate("amplitude")?;
    let period = options.duration("period")?;

    let mode = match mode {
        Some(mode) => Some(mode),
        None if variation || (high.is_some() && low.is_some()) => Some(CapacityMode::Step),
        None => None,
    };

    let model = match mode {
        None => CapacityModel::Fixed(bandwidth.ok_or(ConfigError::Missing("bandwidth"))?),
        Some(CapacityMode::Step) => CapacityModel::Step(StepModel {
            high: high.ok_or(ConfigError::Missing("high_bandwidth"))?,
            low: low.ok_or(ConfigError::Missing("low_bandwidth"))?,
            high_duration: high_duration.unwrap_or(DEFAULT_HIGH_DURATION),
            low_duration: low_duration.unwrap_or(DEFAULT_LOW_DURATION),
        }),
        Some(CapacityMode::Linear) => {
            let high = high.ok_or(ConfigError::Missing("high_bandwidth"))?;
            CapacityModel::Linear(LinearModel {
                initial: bandwidth.unwrap_or(high),
                low: low.ok_or(ConfigError::Missing("low_bandwidth"))?,
                high,
                change_per_tick: change.ok_or(ConfigError::Missing("bandwidth_change_rate"))?,
            })
        }
        Some(CapacityMode::Periodic) => CapacityModel::Periodic(PeriodicModel {
            mean: mean.ok_or(ConfigError::Missing("mean_bandwidth"))?,
            amplitude: amplitude.ok_or(ConfigError::Missing("amplitude"))?,
            period: period.ok_or(ConfigError::Missing("period"))?,
        }),
    };

    let supplied = [
        ("bandwidth", bandwidth.is_some()),
        ("high_bandwidth", high.is_some()),
        ("low_bandwidth", low.is_some()),
        ("duration_high", high_duration.is_some()),
        ("duration_low", low_duration.is_some()),
        ("bandwidth_change_rate", change.is_some()),
        ("mean_bandwidth", mean.is_some()),
        ("amplitude", amplitude.is_some()),
        ("period", period.is_some()),
    ];
    let used = capacity_options_used_by(mode);
    let mode_name = mode.map_or_else(|| "fixed".to_string(), |mode| mode.to_string());
    for (option, _) in supplied.iter().filter(|(option, given)| *given && !used.contains(option)) {
        tracing::warn!(
            option = *option,
            mode = %mode_name,
            "option is not used by this bandwidth mode, ignoring"
        );
    }

    Ok(model)
}

/// Capacity options read by each mode. `None` is the fixed rate.
fn capacity_options_used_by(mode: Option<CapacityMode>) -> &'static [&'static str] {
    match mode {
        None => &["bandwidth"],
        Some(CapacityMode::Step) => {
            &["high_bandwidth", "low_bandwidth", "duration_high", "duration_low"]
        }
        Some(CapacityMode::Linear) => {
            &["bandwidth", "high_bandwidth", "low_bandwidth", "bandwidth_change_rate"]
        }
        Some(CapacityMode::Periodic) => &["mean_bandwidth", "amplitude", "period"],
    }
}

fn jitter_from_options(options: &mut Options) -> Result<Option<JitterSpec>> {
    let model = options.take("jitter_model").filter(|model| !model.is_empty());
    let params = options.take("jitter_params");

    match (model, params) {
        (Some(model), params) => Ok(Some(JitterSpec::parse(&model, params.as_deref().unwrap_or(""))?)),
        (None, Some(params)) if !params.is_empty() => Err(ConfigError::Missing("jitter_model")),
        (None, _) => Ok(None),
    }
}

fn drop_from_options(options: &mut Options) -> Result<DropConfig> {
    let mut drop = DropConfig::default();

    if let Some(rate) = options.number::<f64>("drop_rate")? {
        drop.drop_rate = rate;
    }

    let max_burst = match options.number::<u32>("max_burst")? {
        Some(burst) => Some(burst),
        None => options.number::<u32>("MaxDropBurst")?,
    };
    if let Some(burst) = max_burst {
        drop.max_burst = burst;
    }

    let cyclic_enabled = options.flag("cyclic_drop")?.unwrap_or(false);
    let period = options.duration("cyclic_period")?;
    let duration = options.duration("cyclic_duration")?;
    if cyclic_enabled {
        let defaults = CyclicDrop::default();
        drop.cyclic = Some(CyclicDrop {
            period: period.unwrap_or(defaults.period),
            duration: duration.unwrap_or(defaults.duration),
        });
    }

    Ok(drop)
}

/// The remaining, not yet consumed options. Sorted so the first unknown key is stable.
struct Options(BTreeMap<String, String>);

impl Options {
    fn take(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    fn rate(&mut self, key: &str) -> Result<Option<DataRate>> {
        self.take(key)
            .map(|value| {
                value.parse::<DataRate>().map_err(|source| ConfigError::Parse { option: key.to_string(), source })
            })
            .transpose()
    }

    fn duration(&mut self, key: &str) -> Result<Option<Duration>> {
        self.take(key)
            .map(|value| parse_duration(&value).map_err(|source| ConfigError::Parse { option: key.to_string(), source }))
            .transpose()
    }

    fn duration_alias(&mut self, key: &str, alias: &str) -> Result<Option<Duration>> {
        let value = self.duration(key)?;
        let aliased = self.duration(alias)?;
        Ok(value.or(aliased))
    }

    fn number<T: std::str::FromStr>(&mut self, key: &str) -> Result<Option<T>> {
        self.take(key)
            .map(|value| {
                value
                    .parse::<T>()
                    .map_err(|_| ConfigError::InvalidNumber { option: key.to_string(), value })
            })
            .transpose()
    }

    fn flag(&mut self, key: &str) -> Result<Option<bool>> {
        self.take(key)
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => Ok(true),
                "0" | "false" | "off" | "no" => Ok(false),
                _ => Err(ConfigError::InvalidNumber { option: key.to_string(), value }),
            })
            .transpose()
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
