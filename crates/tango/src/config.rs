//! Machine configuration.

use crate::plugin::Plugin;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tango_core::StepName;
use tracing::{debug, error, info, trace, warn};

/// Verbosity of the per-step announcements enabled through [`LogSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Per-step logging switch.
///
/// The engine always emits `debug`/`warn` level diagnostics through `tracing`.
/// When `enabled` is set it additionally announces every step it dispatches
/// or compensates at `level`.
///
/// Deserializable so hosts can keep it in their own configuration files:
///
/// ```
/// use tango::{LogLevel, LogSettings};
///
/// let settings: LogSettings = serde_json::from_str(r#"{"enabled": true, "level": "warn"}"#)?;
/// assert_eq!(settings, LogSettings::at(LogLevel::Warn));
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Announce each step. Default: `false`.
    pub enabled: bool,
    /// Level of the announcements. Default: `info`.
    pub level: LogLevel,
}

impl LogSettings {
    /// Announcements enabled at the given level.
    pub fn at(level: LogLevel) -> Self {
        Self {
            enabled: true,
            level,
        }
    }

    pub(crate) fn announce(&self, machine: &str, action: &str, step: &StepName) {
        if !self.enabled {
            return;
        }
        match self.level {
            LogLevel::Trace => trace!(machine = %machine, step = %step, "{action} step"),
            LogLevel::Debug => debug!(machine = %machine, step = %step, "{action} step"),
            LogLevel::Info => info!(machine = %machine, step = %step, "{action} step"),
            LogLevel::Warn => warn!(machine = %machine, step = %step, "{action} step"),
            LogLevel::Error => error!(machine = %machine, step = %step, "{action} step"),
        }
    }
}

/// Configuration of a [`Machine`](crate::Machine): logging and attached plugins.
///
/// # Examples
///
/// ```
/// use tango::{LogLevel, LogSettings, MachineConfig};
///
/// let config: MachineConfig<(), ()> =
///     MachineConfig::new().with_logging(LogSettings::at(LogLevel::Debug));
///
/// assert!(config.logging.enabled);
/// assert!(config.plugins.is_empty());
/// ```
pub struct MachineConfig<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    /// Per-step logging.
    pub logging: LogSettings,
    /// Plugins, invoked in insertion order.
    pub plugins: Vec<Arc<dyn Plugin<Sv, St>>>,
}

impl<Sv, St> Clone for MachineConfig<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            logging: self.logging,
            plugins: self.plugins.clone(),
        }
    }
}

impl<Sv, St> Default for MachineConfig<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Sv, St> fmt::Debug for MachineConfig<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineConfig")
            .field("logging", &self.logging)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<Sv, St> MachineConfig<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    /// Logging disabled, no plugins.
    pub fn new() -> Self {
        Self {
            logging: LogSettings::default(),
            plugins: Vec::new(),
        }
    }

    pub fn with_logging(mut self, logging: LogSettings) -> Self {
        self.logging = logging;
        self
    }

    /// Attaches a plugin after the ones already configured.
    pub fn with_plugin<P: Plugin<Sv, St> + 'static>(mut self, plugin: P) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }
}
