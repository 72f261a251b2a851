use config::{Config, ConfigError};
use serde::Deserialize;

pub mod domain;
pub mod infrastructure;

#[derive(Clone, Debug, Deserialize)]
pub struct KurumaConfig {
    pub logger: Logger,
    pub reconciler: Reconciler,
}

impl KurumaConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::with_name("kuruma.toml"))
            .add_source(config::Environment::with_prefix("KURUMA").separator("_"))
            .build()?
            .try_deserialize::<KurumaConfig>()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Logger {
    pub level: Level,
}

/// Retry budget handed to `BookingLifecycle::reconcile_with_retry` when an
/// operator repairs a partial approval.
#[derive(Clone, Debug, Deserialize)]
pub struct Reconciler {
    pub max_attempts: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub enum Level {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl From<&Level> for tracing::Level {
    fn from(value: &Level) -> Self {
        match value {
            Level::TRACE => tracing::Level::TRACE,
            Level::DEBUG => tracing::Level::DEBUG,
            Level::INFO => tracing::Level::INFO,
            Level::WARN => tracing::Level::WARN,
            Level::ERROR => tracing::Level::ERROR,
        }
    }
}
