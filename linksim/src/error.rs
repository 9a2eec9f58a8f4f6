use linksim_common::ParseError;

/// Errors raised while building a link from its configuration.
///
/// All of these surface at setup, before any simulated time advances, and are not recoverable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing parameter: {0}")]
    Missing(&'static str),
    #[error("invalid value for {option}: {source}")]
    Parse {
        option: String,
        #[source]
        source: ParseError,
    },
    #[error("invalid number for {option}: {value:?}")]
    InvalidNumber { option: String, value: String },
    #[error("{option} out of range: {reason}")]
    OutOfRange { option: &'static str, reason: String },
    #[error("unknown bandwidth mode: {0:?} (expected step, linear or periodic)")]
    UnknownMode(String),
    #[error("unknown jitter model: {0:?}")]
    UnknownJitterModel(String),
    #[error("unknown parameter {param:?} for jitter model {model:?}")]
    UnknownJitterParam { model: String, param: String },
    #[error("malformed jitter parameter {0:?}, expected name=value")]
    MalformedJitterParam(String),
    #[error("unknown option: {0:?}")]
    UnknownOption(String),
}

impl ConfigError {
    pub(crate) fn out_of_range(option: &'static str, reason: impl Into<String>) -> Self {
        Self::OutOfRange { option, reason: reason.into() }
    }
}

/// Result of config parsing and validation.
pub type Result<T> = std::result::Result<T, ConfigError>;
