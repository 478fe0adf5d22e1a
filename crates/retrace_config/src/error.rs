//! Configuration errors.

use std::path::PathBuf;

/// A `retrace.toml` file, an environment override or a runtime option
/// change was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the configuration schema.
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// A `RETRACE_JIT_*` variable held an unparsable value.
    #[error("{key}={value:?} is not a valid setting")]
    InvalidOverride {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },

    /// A JIT option name is not recognized.
    #[error("unknown JIT option `{0}`")]
    UnknownOption(String),

    /// The settings parse but contradict each other.
    #[error("{0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_names_the_file() {
        let err = ConfigError::Read {
            path: PathBuf::from("/work/retrace.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.to_string(), "cannot read /work/retrace.toml: gone");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn toml_errors_carry_the_parser_message() {
        let parse = toml::from_str::<toml::Table>("jit = [").unwrap_err();
        let err = ConfigError::from(parse);
        assert!(err.to_string().starts_with("invalid configuration: "));
    }

    #[test]
    fn override_shows_the_assignment() {
        let err = ConfigError::InvalidOverride {
            key: "RETRACE_JIT_MAX_OPT_THREADS".to_string(),
            value: "many".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "RETRACE_JIT_MAX_OPT_THREADS=\"many\" is not a valid setting"
        );
    }

    #[test]
    fn unknown_option_and_invalid() {
        assert_eq!(
            ConfigError::UnknownOption("turbo".to_string()).to_string(),
            "unknown JIT option `turbo`"
        );
        assert_eq!(
            ConfigError::Invalid("jit.compile_window_size must be greater than zero".to_string())
                .to_string(),
            "jit.compile_window_size must be greater than zero"
        );
    }
}
