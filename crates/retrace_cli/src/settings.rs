//! Configuration and trace loading shared by the subcommands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use retrace_config::{ConfigError, RetraceConfig};
use retrace_trace::{TraceError, VcdTrace};

use crate::GlobalArgs;

/// Name of the configuration file picked up from the working directory.
pub const CONFIG_FILE: &str = "retrace.toml";

/// Loads the configuration for this invocation.
///
/// An explicit `--config` must exist. Otherwise `retrace.toml` in the working
/// directory is used if present, and defaults if not. `RETRACE_JIT_*`
/// environment variables are applied last.
pub fn load_settings(global: &GlobalArgs) -> Result<RetraceConfig, ConfigError> {
    let explicit = global.config.as_deref().map(PathBuf::from);
    load_settings_from(explicit.as_deref(), Path::new(CONFIG_FILE), std::env::vars())
}

/// Loads the configuration from `explicit`, falling back to `implicit` when it
/// exists, with the given environment pairs applied on top.
pub fn load_settings_from<I, K, V>(
    explicit: Option<&Path>,
    implicit: &Path,
    vars: I,
) -> Result<RetraceConfig, ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut config = match explicit {
        Some(path) => retrace_config::load_config(path)?,
        None if implicit.is_file() => retrace_config::load_config(implicit)?,
        None => RetraceConfig::default(),
    };
    retrace_config::apply_env_overrides(&mut config, vars)?;
    Ok(config)
}

/// Opens a waveform file.
pub fn open_trace(path: &str) -> Result<Arc<VcdTrace>, TraceError> {
    log::debug!("loading {path}");
    Ok(Arc::new(VcdTrace::open(Path::new(path))?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_ENV: [(&str, &str); 0] = [];

    #[test]
    fn defaults_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_settings_from(None, &dir.path().join(CONFIG_FILE), NO_ENV).unwrap();
        assert_eq!(config, RetraceConfig::default());
    }

    #[test]
    fn implicit_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[jit]\nhot_access_threshold = 4\n").unwrap();
        let config = load_settings_from(None, &path, NO_ENV).unwrap();
        assert_eq!(config.jit.hot_access_threshold, 4);
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(load_settings_from(Some(&missing), &dir.path().join(CONFIG_FILE), NO_ENV).is_err());
    }

    #[test]
    fn environment_overrides_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[jit]\nmax_opt_threads = 8\n").unwrap();
        let config = load_settings_from(
            Some(&path),
            Path::new(CONFIG_FILE),
            [("RETRACE_JIT_MAX_OPT_THREADS", "2"), ("HOME", "/root")],
        )
        .unwrap();
        assert_eq!(config.jit.max_opt_threads, 2);
    }

    #[test]
    fn open_trace_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.vcd");
        assert!(open_trace(path.to_str().unwrap()).is_err());
    }
}
