//! Trace errors.

use crate::oracle::SignalRef;

/// Loading a trace or reading a signal from it failed.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// The trace could not be read.
    #[error("cannot read trace: {0}")]
    Io(#[from] std::io::Error),

    /// A VCD line could not be understood.
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based line of the offending token.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// The file parsed but is incomplete, such as a missing `$enddefinitions`.
    #[error("malformed trace: {0}")]
    Format(String),

    /// A handle that does not belong to this trace.
    #[error("signal {0} does not exist in this trace")]
    UnknownSignal(SignalRef),

    /// A value format name outside `int`, `bin`, `hex` and `vec`.
    #[error("`{0}` is not a value format")]
    UnknownFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_lead_with_the_line() {
        let err = TraceError::Parse {
            line: 12,
            message: "invalid timestamp: #abc".to_string(),
        };
        assert_eq!(err.to_string(), "line 12: invalid timestamp: #abc");
    }

    #[test]
    fn io_keeps_its_source() {
        let err = TraceError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "dump.vcd"));
        assert_eq!(err.to_string(), "cannot read trace: dump.vcd");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn lookup_failures() {
        assert_eq!(
            TraceError::UnknownSignal(SignalRef(7)).to_string(),
            "signal #7 does not exist in this trace"
        );
        assert_eq!(
            TraceError::UnknownFormat("oct".to_string()).to_string(),
            "`oct` is not a value format"
        );
        assert_eq!(
            TraceError::Format("missing $enddefinitions".to_string()).to_string(),
            "malformed trace: missing $enddefinitions"
        );
    }
}
