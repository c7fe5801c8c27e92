#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use bon::Builder;

use crate::journal::DEFAULT_EXPORT_PREFIX;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(5);

/// Configuration for [`crate::ws::ConnectionManager`] behavior.
///
/// ```
/// use std::time::Duration;
///
/// use codoc_session::ws::config::Config;
///
/// let config = Config::builder()
///     .heartbeat_interval(Duration::from_secs(10))
///     .build();
/// assert_eq!(config.export_prefix, "codoc-log");
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Interval between PING probes while connected. The default is five (5) seconds.
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub heartbeat_interval: Duration,
    /// File name prefix for exported journals
    #[builder(into, default = DEFAULT_EXPORT_PREFIX.to_owned())]
    pub export_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}
