use opentelemetry::metrics::MetricsError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Instrument creation or callback registration failed.
    #[error("metrics: {0}")]
    Metrics(#[from] MetricsError),
    /// The node has neither an address nor an explicit pool name.
    #[error("pool name is required")]
    MissingPoolName,
    #[error("unsupported client type: {0}")]
    Unsupported(&'static str),
    #[error("invalid settings: {0}")]
    Settings(#[from] toml::de::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
