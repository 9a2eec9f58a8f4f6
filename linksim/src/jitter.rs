//! Jitter sampling.
//!
//! A [`JitterSource`] draws one independent delay offset, in milliseconds, per call. The
//! distribution kind is picked by name from a [`JitterRegistry`] and parameterized by a list of
//! `Name=value` pairs joined by `|`, e.g. `Mean=5|Variance=2`.

use std::{fmt, str::FromStr, sync::Arc};

use parking_lot::Mutex;
use rand::{distributions::Uniform, rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Exp, LogNormal, Normal, Pareto};
use rustc_hash::FxHashMap;

use crate::{
    error::{ConfigError, Result},
    time::SignedDelay,
};

/// Named numeric parameters of a jitter distribution, in the order they were given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JitterParams(Vec<(String, f64)>);

impl JitterParams {
    /// Parses `Name=value` pairs separated by `|`. Empty segments are ignored.
    pub fn parse(input: &str) -> Result<Self> {
        let mut params = Vec::new();

        for item in input.split('|').map(str::trim).filter(|item| !item.is_empty()) {
            let Some((name, value)) = item.split_once('=') else {
                return Err(ConfigError::MalformedJitterParam(item.to_string()));
            };

            let name = name.trim();
            if name.is_empty() {
                return Err(ConfigError::MalformedJitterParam(item.to_string()));
            }

            let invalid = || ConfigError::InvalidNumber {
                option: format!("jitter_params.{name}"),
                value: value.trim().to_string(),
            };
            let value = value.trim().parse::<f64>().map_err(|_| invalid())?;
            if !value.is_finite() {
                return Err(invalid());
            }

            params.push((name.to_string(), value));
        }

        Ok(Self(params))
    }

    /// Adds or replaces a parameter.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        let name = name.into();
        self.0.retain(|(n, _)| *n != name);
        self.0.push((name, value));
        self
    }

    /// The last value given for `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().rev().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    fn get_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).unwrap_or(default)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Rejects names outside `known` and non-finite values, which [`Self::with`] lets through.
    fn ensure_known(&self, model: &str, known: &[&str]) -> Result<()> {
        if let Some((name, _)) = self.0.iter().find(|(name, _)| !known.contains(&name.as_str())) {
            return Err(ConfigError::UnknownJitterParam {
                model: model.to_string(),
                param: name.clone(),
            });
        }

        match self.0.iter().find(|(_, value)| !value.is_finite()) {
            Some((name, value)) => Err(ConfigError::InvalidNumber {
                option: format!("jitter_params.{name}"),
                value: value.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl FromStr for JitterParams {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A configured jitter: the distribution name plus its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct JitterSpec {
    /// Long (`ns3::NormalRandomVariable`) or short (`normal`) kind name.
    pub model: String,
    pub params: JitterParams,
}

impl JitterSpec {
    pub fn new(model: impl Into<String>, params: JitterParams) -> Self {
        Self { model: model.into(), params }
    }

    /// Parses the `jitter_model` / `jitter_params` option pair.
    pub fn parse(model: &str, params: &str) -> Result<Self> {
        Ok(Self::new(model.trim(), JitterParams::parse(params)?))
    }
}

/// A distribution that jitter samples are drawn from, in milliseconds.
#[derive(Debug, Clone, Copy)]
pub enum JitterModel {
    Constant(f64),
    Uniform(Uniform<f64>),
    /// Samples further than `bound` from `mean` are redrawn.
    Normal { dist: Normal<f64>, mean: f64, bound: f64 },
    /// Samples above `bound` are redrawn; a zero bound disables the check.
    Exponential { dist: Exp<f64>, bound: f64 },
    /// Samples above `bound` are redrawn; a zero bound disables the check.
    Pareto { dist: Pareto<f64>, bound: f64 },
    LogNormal(LogNormal<f64>),
}

impl JitterModel {
    /// Draws one value in milliseconds, redrawing until it falls within the bound.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Self::Constant(value) => *value,
            Self::Uniform(dist) => dist.sample(rng),
            Self::Normal { dist, mean, bound } => loop {
                let value = dist.sample(rng);
                if (value - mean).abs() <= *bound {
                    break value;
                }
            },
            Self::Exponential { dist, bound } => loop {
                let value = dist.sample(rng);
                if *bound == 0.0 || value <= *bound {
                    break value;
                }
            },
            Self::Pareto { dist, bound } => loop {
                let value = dist.sample(rng);
                if *bound == 0.0 || value <= *bound {
                    break value;
                }
            },
            Self::LogNormal(dist) => dist.sample(rng),
        }
    }
}

/// Builds a [`JitterModel`] from its parameters.
pub type Constructor = fn(&JitterParams) -> Result<JitterModel>;

fn invalid(reason: String) -> ConfigError {
    ConfigError::out_of_range("jitter_params", reason)
}

fn constant(params: &JitterParams) -> Result<JitterModel> {
    params.ensure_known("constant", &["Constant"])?;
    Ok(JitterModel::Constant(params.get_or("Constant", 0.0)))
}

fn uniform(params: &JitterParams) -> Result<JitterModel> {
    params.ensure_known("uniform", &["Min", "Max"])?;
    let (min, max) = (params.get_or("Min", 0.0), params.get_or("Max", 1.0));
    // NaN fails this check too.
    if !(min < max) || !max.is_finite() || !min.is_finite() {
        return Err(invalid(format!("Min ({min}) must be below Max ({max})")));
    }
    if !(max - min).is_finite() {
        return Err(invalid(format!("range from Min ({min}) to Max ({max}) overflows")));
    }
    Ok(JitterModel::Uniform(Uniform::new(min, max)))
}

fn normal(params: &JitterParams) -> Result<JitterModel> {
    params.ensure_known("normal", &["Mean", "Variance", "Bound"])?;
    let mean = params.get_or("Mean", 0.0);
    let variance = params.get_or("Variance", 1.0);
    let bound = params.get_or("Bound", f64::INFINITY);

    if !(variance >= 0.0) {
        return Err(invalid(format!("Variance ({variance}) must be non-negative")));
    }
    if !(bound > 0.0) {
        return Err(invalid(format!("Bound ({bound}) must be positive")));
    }

    let dist = Normal::new(mean, variance.sqrt()).map_err(|e| invalid(e.to_string()))?;
    Ok(JitterModel::Normal { dist, mean, bound })
}

fn exponential(params: &JitterParams) -> Result<JitterModel> {
    params.ensure_known("exponential", &["Mean", "Bound"])?;
    let mean = params.get_or("Mean", 1.0);
    let bound = params.get_or("Bound", 0.0);

    if !(mean > 0.0) {
        return Err(invalid(format!("Mean ({mean}) must be positive")));
    }
    if !(bound >= 0.0) {
        return Err(invalid(format!("Bound ({bound}) must be non-negative")));
    }

    let dist = Exp::new(1.0 / mean).map_err(|e| invalid(e.to_string()))?;
    Ok(JitterModel::Exponential { dist, bound })
}

fn pareto(params: &JitterParams) -> Result<JitterModel> {
    params.ensure_known("pareto", &["Scale", "Shape", "Bound"])?;
    let scale = params.get_or("Scale", 1.0);
    let shape = params.get_or("Shape", 2.0);
    let bound = params.get_or("Bound", 0.0);

    if !(bound >= 0.0) {
        return Err(invalid(format!("Bound ({bound}) must be non-negative")));
    }
    // Samples never fall below Scale.
    if bound != 0.0 && bound <= scale {
        return Err(invalid(format!("Bound ({bound}) must exceed Scale ({scale})")));
    }

    let dist = Pareto::new(scale, shape).map_err(|e| invalid(e.to_string()))?;
    Ok(JitterModel::Pareto { dist, bound })
}

fn lognormal(params: &JitterParams) -> Result<JitterModel> {
    params.ensure_known("lognormal", &["Mu", "Sigma"])?;
    let (mu, sigma) = (params.get_or("Mu", 0.0), params.get_or("Sigma", 1.0));
    let dist = LogNormal::new(mu, sigma).map_err(|e| invalid(e.to_string()))?;
    Ok(JitterModel::LogNormal(dist))
}

/// Maps distribution names to their constructors.
///
/// The default registry knows every built-in kind under both its long name
/// (`ns3::NormalRandomVariable`) and its short name (`normal`).
#[derive(Clone)]
pub struct JitterRegistry {
    constructors: FxHashMap<String, Constructor>,
}

impl fmt::Debug for JitterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.kinds().collect();
        kinds.sort_unstable();
        f.debug_struct("JitterRegistry").field("kinds", &kinds).finish()
    }
}

impl Default for JitterRegistry {
    fn default() -> Self {
        let builtins: [(&str, &str, Constructor); 6] = [
            ("ns3::ConstantRandomVariable", "constant", constant),
            ("ns3::UniformRandomVariable", "uniform", uniform),
            ("ns3::NormalRandomVariable", "normal", normal),
            ("ns3::ExponentialRandomVariable", "exponential", exponential),
            ("ns3::ParetoRandomVariable", "pareto", pareto),
            ("ns3::LogNormalRandomVariable", "lognormal", lognormal),
        ];

        let mut registry = Self::empty();
        for (long, short, constructor) in builtins {
            registry.register(long, constructor);
            registry.register(short, constructor);
        }
        registry
    }
}

impl JitterRegistry {
    /// A registry without any kind.
    pub fn empty() -> Self {
        Self { constructors: FxHashMap::default() }
    }

    /// Registers (or replaces) a distribution kind.
    pub fn register(&mut self, name: impl Into<String>, constructor: Constructor) {
        self.constructors.insert(name.into(), constructor);
    }

    /// Every registered name, long and short, in no particular order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Builds the model named by `spec`, failing on unknown kinds or parameters.
    pub fn build(&self, spec: &JitterSpec) -> Result<JitterModel> {
        let constructor = self
            .constructors
            .get(spec.model.as_str())
            .ok_or_else(|| ConfigError::UnknownJitterModel(spec.model.clone()))?;

        constructor(&spec.params)
    }
}

#[derive(Debug)]
struct Inner {
    model: JitterModel,
    rng: StdRng,
    draws: u64,
}

/// A seeded stream of jitter samples.
///
/// Clones share the same stream: every draw, from any clone, advances it.
#[derive(Debug, Clone)]
pub struct JitterSource {
    inner: Arc<Mutex<Inner>>,
}

impl JitterSource {
    /// A stream over `model` seeded with `seed`.
    pub fn new(model: JitterModel, seed: u64) -> Self {
        let inner = Inner { model, rng: StdRng::seed_from_u64(seed), draws: 0 };
        Self { inner: Arc::new(Mutex::new(inner)) }
    }

    /// Resolves `spec` through `registry` and seeds the stream.
    pub fn from_spec(spec: &JitterSpec, registry: &JitterRegistry, seed: u64) -> Result<Self> {
        Ok(Self::new(registry.build(spec)?, seed))
    }

    /// Draws one offset. Negative draws are kept and shorten the delay they are added to.
    pub fn sample(&self) -> SignedDelay {
        let mut inner = self.inner.lock();
        let Inner { model, rng, draws } = &mut *inner;

        let millis = model.sample(rng);
        *draws += 1;

        tracing::trace!(millis, draws = *draws, "jitter sample");
        SignedDelay::from_millis_f64(millis)
    }

    pub fn model(&self) -> JitterModel {
        self.inner.lock().model
    }

    /// Number of samples drawn from this stream so far.
    pub fn draws(&self) -> u64 {
        self.inner.lock().draws
    }
}
