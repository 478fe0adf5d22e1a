//! Configuration types deserialized from `retrace.toml`.

use crate::error::ConfigError;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default number of reads before a signal is considered hot.
pub const DEFAULT_HOT_ACCESS_THRESHOLD: u64 = 10;
/// Default number of indices decoded per optimizer window.
pub const DEFAULT_COMPILE_WINDOW_SIZE: u64 = 200_000;
/// Default cap on concurrently active optimizer threads.
pub const DEFAULT_MAX_OPT_THREADS: u64 = 20;
/// Default directory for persisted replay caches, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".retrace-cache";

/// The top-level configuration parsed from `retrace.toml`.
///
/// Every section is optional; a missing file yields [`RetraceConfig::default`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetraceConfig {
    /// Replay and cache-persistence settings.
    #[serde(default)]
    pub replay: ReplayConfig,
    /// Adaptive JIT optimizer settings.
    #[serde(default)]
    pub jit: JitConfig,
}

/// Settings for the replay engine outside the JIT optimizer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplayConfig {
    /// Directory holding the persisted time index and signal-name cache.
    pub cache_dir: PathBuf,
    /// Whether derived data is persisted between runs at all.
    pub persist_cache: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            persist_cache: true,
        }
    }
}

/// Tuning knobs of the adaptive JIT signal-value optimizer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JitConfig {
    /// Whether hot signals are optimized at all.
    pub enable: bool,
    /// Whether per-signal optimizer events and read timings are logged.
    pub verbose: bool,
    /// Maximum number of concurrently active optimizer threads.
    pub max_opt_threads: u64,
    /// Read count a signal must exceed before it is optimized.
    pub hot_access_threshold: u64,
    /// Number of indices decoded per optimizer window.
    pub compile_window_size: u64,
    /// Distance to the cached window's edge at which a continuation is
    /// requested. `None` (written as `-1`) follows `compile_window_size`.
    #[serde(deserialize_with = "deserialize_window")]
    pub recompile_window_size: Option<u64>,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            enable: true,
            verbose: false,
            max_opt_threads: DEFAULT_MAX_OPT_THREADS,
            hot_access_threshold: DEFAULT_HOT_ACCESS_THRESHOLD,
            compile_window_size: DEFAULT_COMPILE_WINDOW_SIZE,
            recompile_window_size: Some(DEFAULT_COMPILE_WINDOW_SIZE),
        }
    }
}

impl JitConfig {
    /// Returns the effective recompile window.
    pub fn recompile_window(&self) -> u64 {
        self.recompile_window_size
            .unwrap_or(self.compile_window_size)
    }

    /// Reads an option as an unsigned integer; flags read as 0 or 1.
    pub fn get(&self, option: JitOption) -> u64 {
        match option {
            JitOption::Enable => self.enable as u64,
            JitOption::Verbose => self.verbose as u64,
            JitOption::MaxOptThreads => self.max_opt_threads,
            JitOption::HotAccessThreshold => self.hot_access_threshold,
            JitOption::CompileWindowSize => self.compile_window_size,
            JitOption::RecompileWindowSize => self.recompile_window(),
        }
    }

    /// Sets an option and re-validates the whole section.
    ///
    /// On a validation failure the previous settings are kept.
    pub fn set(&mut self, option: JitOption, value: u64) -> Result<(), ConfigError> {
        let mut next = self.clone();
        match option {
            JitOption::Enable => next.enable = value != 0,
            JitOption::Verbose => next.verbose = value != 0,
            JitOption::MaxOptThreads => next.max_opt_threads = value,
            JitOption::HotAccessThreshold => next.hot_access_threshold = value,
            JitOption::CompileWindowSize => next.compile_window_size = value,
            JitOption::RecompileWindowSize => next.recompile_window_size = Some(value),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Checks that the window sizes are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compile_window_size == 0 {
            return Err(ConfigError::Invalid(
                "jit.compile_window_size must be greater than zero".to_string(),
            ));
        }
        if self.recompile_window() > self.compile_window_size {
            return Err(ConfigError::Invalid(format!(
                "jit.recompile_window_size ({}) must not exceed jit.compile_window_size ({})",
                self.recompile_window(),
                self.compile_window_size
            )));
        }
        Ok(())
    }
}

/// A runtime-addressable JIT option, named as in the `[jit]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JitOption {
    /// `enable`
    Enable,
    /// `verbose`
    Verbose,
    /// `max_opt_threads`
    MaxOptThreads,
    /// `hot_access_threshold`
    HotAccessThreshold,
    /// `compile_window_size`
    CompileWindowSize,
    /// `recompile_window_size`
    RecompileWindowSize,
}

impl JitOption {
    /// All options in declaration order.
    pub const ALL: [JitOption; 6] = [
        JitOption::Enable,
        JitOption::Verbose,
        JitOption::MaxOptThreads,
        JitOption::HotAccessThreshold,
        JitOption::CompileWindowSize,
        JitOption::RecompileWindowSize,
    ];

    /// Returns the option's configuration key.
    pub fn name(self) -> &'static str {
        match self {
            JitOption::Enable => "enable",
            JitOption::Verbose => "verbose",
            JitOption::MaxOptThreads => "max_opt_threads",
            JitOption::HotAccessThreshold => "hot_access_threshold",
            JitOption::CompileWindowSize => "compile_window_size",
            JitOption::RecompileWindowSize => "recompile_window_size",
        }
    }

    /// Returns the environment variable that overrides this option.
    pub fn env_key(self) -> String {
        format!("RETRACE_JIT_{}", self.name().to_ascii_uppercase())
    }
}

impl FromStr for JitOption {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JitOption::ALL
            .into_iter()
            .find(|o| o.name() == s)
            .ok_or_else(|| ConfigError::UnknownOption(s.to_string()))
    }
}

impl fmt::Display for JitOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Deserializes a window size where `-1` means "same as the compile window".
fn deserialize_window<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct WindowVisitor;

    impl Visitor<'_> for WindowVisitor {
        type Value = Option<u64>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a non-negative window size or -1")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            match v {
                -1 => Ok(None),
                v if v >= 0 => Ok(Some(v as u64)),
                v => Err(E::custom(format!("invalid window size {v}"))),
            }
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }
    }

    deserializer.deserialize_i64(WindowVisitor)
}
