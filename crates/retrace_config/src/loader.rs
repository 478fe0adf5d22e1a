//! Configuration file loading, environment overrides, and validation.

use crate::error::ConfigError;
use crate::types::{JitOption, RetraceConfig};
use std::path::Path;

/// Loads and validates a `retrace.toml` configuration file.
pub fn load_config(path: &Path) -> Result<RetraceConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_from_str(&content)
}

/// Parses and validates a `retrace.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<RetraceConfig, ConfigError> {
    let config: RetraceConfig = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Applies `RETRACE_JIT_*` overrides from the given environment pairs.
///
/// Flags accept `0`/`1`/`true`/`false`; the recompile window additionally
/// accepts `-1`. Unrelated variables are ignored. The result is validated.
pub fn apply_env_overrides<I, K, V>(config: &mut RetraceConfig, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    for (key, value) in vars {
        let (key, value) = (key.as_ref(), value.as_ref().trim());
        let Some(option) = JitOption::ALL.into_iter().find(|o| o.env_key() == key) else {
            continue;
        };
        let invalid = || ConfigError::InvalidOverride {
            key: key.to_string(),
            value: value.to_string(),
        };
        let jit = &mut config.jit;
        match option {
            JitOption::Enable | JitOption::Verbose => {
                let flag = match value {
                    "1" | "true" | "TRUE" | "on" => true,
                    "0" | "false" | "FALSE" | "off" => false,
                    _ => return Err(invalid()),
                };
                if option == JitOption::Enable {
                    jit.enable = flag;
                } else {
                    jit.verbose = flag;
                }
            }
            JitOption::RecompileWindowSize if value == "-1" => jit.recompile_window_size = None,
            _ => {
                let n: u64 = value.parse().map_err(|_| invalid())?;
                match option {
                    JitOption::MaxOptThreads => jit.max_opt_threads = n,
                    JitOption::HotAccessThreshold => jit.hot_access_threshold = n,
                    JitOption::CompileWindowSize => jit.compile_window_size = n,
                    _ => jit.recompile_window_size = Some(n),
                }
            }
        }
    }
    validate_config(config)
}

/// Validates that configuration values are consistent.
pub fn validate_config(config: &RetraceConfig) -> Result<(), ConfigError> {
    config.jit.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, RetraceConfig::default());
        assert_eq!(config.replay.cache_dir, PathBuf::from(".retrace-cache"));
        assert!(config.replay.persist_cache);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[replay]
cache_dir = "/tmp/retrace"
persist_cache = false

[jit]
enable = true
verbose = true
max_opt_threads = 4
hot_access_threshold = 5
compile_window_size = 100
recompile_window_size = 20
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.replay.cache_dir, PathBuf::from("/tmp/retrace"));
        assert!(!config.replay.persist_cache);
        assert!(config.jit.verbose);
        assert_eq!(config.jit.max_opt_threads, 4);
        assert_eq!(config.jit.hot_access_threshold, 5);
        assert_eq!(config.jit.compile_window_size, 100);
        assert_eq!(config.jit.recompile_window(), 20);
    }

    #[test]
    fn negative_one_recompile_window() {
        let toml = r#"
[jit]
compile_window_size = 500
recompile_window_size = -1
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.jit.recompile_window_size, None);
        assert_eq!(config.jit.recompile_window(), 500);
    }

    #[test]
    fn other_negative_window_errors() {
        let err = load_config_from_str("[jit]\nrecompile_window_size = -5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn recompile_larger_than_compile_errors() {
        let toml = r#"
[jit]
compile_window_size = 100
recompile_window_size = 101
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_field_errors() {
        let err = load_config_from_str("[jit]\nturbo = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = RetraceConfig::default();
        apply_env_overrides(
            &mut config,
            [
                ("RETRACE_JIT_ENABLE", "0"),
                ("RETRACE_JIT_VERBOSE", "true"),
                ("RETRACE_JIT_MAX_OPT_THREADS", "2"),
                ("RETRACE_JIT_HOT_ACCESS_THRESHOLD", "5"),
                ("RETRACE_JIT_COMPILE_WINDOW_SIZE", "100"),
                ("RETRACE_JIT_RECOMPILE_WINDOW_SIZE", "-1"),
                ("PATH", "/usr/bin"),
            ],
        )
        .unwrap();
        assert!(!config.jit.enable);
        assert!(config.jit.verbose);
        assert_eq!(config.jit.max_opt_threads, 2);
        assert_eq!(config.jit.hot_access_threshold, 5);
        assert_eq!(config.jit.compile_window_size, 100);
        assert_eq!(config.jit.recompile_window(), 100);
    }

    #[test]
    fn env_override_rejects_garbage() {
        let mut config = RetraceConfig::default();
        let err = apply_env_overrides(&mut config, [("RETRACE_JIT_MAX_OPT_THREADS", "many")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }

    #[test]
    fn env_override_is_validated() {
        let mut config = RetraceConfig::default();
        let err = apply_env_overrides(&mut config, [("RETRACE_JIT_COMPILE_WINDOW_SIZE", "10")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retrace.toml");
        std::fs::write(&path, "[jit]\nhot_access_threshold = 3\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.jit.hot_access_threshold, 3);
    }

    #[test]
    fn io_error_from_missing_file() {
        let err = load_config(Path::new("/nonexistent/retrace.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
