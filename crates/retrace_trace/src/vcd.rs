//! VCD trace oracle.
//!
//! Parses IEEE 1364 Value Change Dump files into an in-memory, randomly
//! accessible [`VcdTrace`]. Recorded timestamps become the dense index space:
//! the n-th distinct `#time` is index n. Gzipped files are detected by their
//! magic bytes and decompressed on the fly.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use retrace_common::{Logic, LogicVec};

use crate::error::TraceError;
use crate::history::SignalHistory;
use crate::oracle::{SignalInfo, SignalRef, TraceOracle, VarType};
use crate::timescale::Timescale;

/// Leading bytes of a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A fully loaded VCD waveform.
#[derive(Debug)]
pub struct VcdTrace {
    path: Option<PathBuf>,
    timescale: Timescale,
    /// Distinct recorded times in file order (strictly increasing).
    times: Vec<u64>,
    signals: Vec<SignalHistory>,
    /// Every declared hierarchical name, aliases included.
    names: HashMap<String, SignalRef>,
}

impl VcdTrace {
    /// Opens and parses a VCD file, gzipped or not.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError`] on I/O, parse, or structural errors.
    pub fn open(path: &Path) -> Result<Self, TraceError> {
        let mut reader = BufReader::new(File::open(path)?);
        let gzipped = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
        let mut trace = if gzipped {
            log::debug!("{} is gzip-compressed", path.display());
            Self::from_reader(BufReader::new(MultiGzDecoder::new(reader)))?
        } else {
            Self::from_reader(reader)?
        };
        trace.path = Some(path.to_path_buf());
        log::info!(
            "loaded {}: {} signals, {} time steps",
            path.display(),
            trace.signals.len(),
            trace.times.len()
        );
        Ok(trace)
    }

    /// Parses a VCD waveform from a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError`] on I/O errors, parse errors, a timestamp that
    /// goes backwards, or a missing `$enddefinitions`.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, TraceError> {
        let mut parser = Parser::default();
        for (line_idx, line) in reader.lines().enumerate() {
            let line = line?;
            parser.line = line_idx + 1;
            for token in line.split_whitespace() {
                parser.token(token)?;
            }
        }
        parser.finish()
    }

    /// Returns the number of distinct signals (aliases counted once).
    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    /// Returns the distinct recorded times in order.
    pub fn times(&self) -> &[u64] {
        &self.times
    }

    fn history(&self, signal: SignalRef) -> Result<&SignalHistory, TraceError> {
        self.signals
            .get(signal.index())
            .ok_or(TraceError::UnknownSignal(signal))
    }
}

impl TraceOracle for VcdTrace {
    fn scan_time_table(&self) -> Vec<u64> {
        self.times.clone()
    }

    fn lookup(&self, name: &str) -> Option<SignalRef> {
        self.names.get(name).copied()
    }

    fn signal_info(&self, signal: SignalRef) -> Option<SignalInfo> {
        self.signals.get(signal.index()).map(|h| SignalInfo {
            width: h.width,
            var_type: h.var_type,
        })
    }

    fn bits_at(&self, signal: SignalRef, index: u64) -> Result<LogicVec, TraceError> {
        Ok(self.history(signal)?.bits_at(index))
    }

    fn word_at(&self, signal: SignalRef, index: u64) -> Result<u32, TraceError> {
        Ok(self.history(signal)?.word_at(index))
    }

    fn signal_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.keys().cloned().collect();
        names.sort();
        names
    }

    fn source_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn timescale(&self) -> Timescale {
        self.timescale
    }
}

/// Streaming token-level VCD parser state.
#[derive(Default)]
struct Parser {
    line: usize,
    saw_enddefinitions: bool,
    /// Open `$keyword` and the tokens collected before its `$end`.
    keyword: Option<(String, Vec<String>)>,
    /// A `b...`/`r...` value waiting for its identifier code.
    pending_vector: Option<String>,
    scopes: Vec<String>,
    timescale: Timescale,
    times: Vec<u64>,
    signals: Vec<SignalHistory>,
    names: HashMap<String, SignalRef>,
    by_code: HashMap<String, SignalRef>,
}

impl Parser {
    fn token(&mut self, token: &str) -> Result<(), TraceError> {
        if self.keyword.is_some() {
            if token == "$end" {
                if let Some((kw, body)) = self.keyword.take() {
                    self.end_keyword(&kw, &body)?;
                }
            } else if let Some((_, body)) = self.keyword.as_mut() {
                body.push(token.to_string());
            }
            return Ok(());
        }
        if let Some(value) = self.pending_vector.take() {
            return self.vector_change(&value, token);
        }
        if let Some(kw) = token.strip_prefix('$') {
            let kw = kw.to_ascii_lowercase();
            match kw.as_str() {
                // Value-section blocks whose contents are ordinary changes.
                "dumpvars" | "dumpall" | "dumpon" | "dumpoff" | "end" if !self.in_header() => {}
                _ => self.keyword = Some((kw, Vec::new())),
            }
            return Ok(());
        }
        if self.in_header() {
            return Err(self.error(format!("unexpected token in header: {token}")));
        }
        match token.as_bytes()[0] {
            b'#' => self.timestamp(&token[1..]),
            b'b' | b'B' | b'r' | b'R' => {
                self.pending_vector = Some(token.to_string());
                Ok(())
            }
            b'0' | b'1' | b'x' | b'X' | b'z' | b'Z' => self.scalar_change(token),
            _ => Err(self.error(format!("unrecognized value change: {token}"))),
        }
    }

    fn in_header(&self) -> bool {
        !self.saw_enddefinitions
    }

    fn end_keyword(&mut self, keyword: &str, body: &[String]) -> Result<(), TraceError> {
        match keyword {
            "enddefinitions" => self.saw_enddefinitions = true,
            "timescale" => {
                let joined = body.concat();
                self.timescale = Timescale::parse(&joined)
                    .ok_or_else(|| self.error(format!("invalid timescale: {joined}")))?;
            }
            "scope" => {
                // "module <name>", "begin <name>", ...
                if let Some(name) = body.get(1).or(body.first()) {
                    self.scopes.push(name.clone());
                }
            }
            "upscope" => {
                self.scopes.pop();
            }
            "var" => self.declare(body)?,
            // $comment, $date, $version, ...
            _ => {}
        }
        Ok(())
    }

    /// Handles `$var <type> <width> <code> <name> [range] $end`.
    fn declare(&mut self, body: &[String]) -> Result<(), TraceError> {
        let [var_type, width, code, name, ..] = body else {
            return Err(self.error(format!("invalid $var: {}", body.join(" "))));
        };
        let width: u32 = width
            .parse()
            .map_err(|_| self.error(format!("invalid width in $var: {width}")))?;
        let full_name = if self.scopes.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", self.scopes.join("."), name)
        };

        let signal = match self.by_code.get(code) {
            // Same identifier code: an alias of an already declared signal.
            Some(&existing) => existing,
            None => {
                let signal = SignalRef(self.signals.len() as u32);
                self.signals
                    .push(SignalHistory::new(width, VarType::from_vcd(var_type)));
                self.by_code.insert(code.clone(), signal);
                signal
            }
        };
        self.names.insert(full_name, signal);
        Ok(())
    }

    fn timestamp(&mut self, digits: &str) -> Result<(), TraceError> {
        let time: u64 = digits
            .parse()
            .map_err(|_| self.error(format!("invalid timestamp: #{digits}")))?;
        match self.times.last() {
            Some(&last) if time == last => {}
            Some(&last) if time < last => {
                return Err(self.error(format!("timestamp #{time} precedes #{last}")));
            }
            _ => self.times.push(time),
        }
        Ok(())
    }

    /// Index of the current time step. Changes before any `#time` happen at 0.
    fn current_index(&mut self) -> u64 {
        if self.times.is_empty() {
            self.times.push(0);
        }
        (self.times.len() - 1) as u64
    }

    fn scalar_change(&mut self, token: &str) -> Result<(), TraceError> {
        let (value, code) = token.split_at(1);
        if code.is_empty() {
            return Err(self.error(format!("missing identifier in value change: {token}")));
        }
        let Some(&signal) = self.by_code.get(code) else {
            log::debug!("line {}: change for undeclared code {code}", self.line);
            return Ok(());
        };
        let logic = value.chars().next().and_then(Logic::from_char).unwrap_or(Logic::X);
        let width = self.signals[signal.index()].width;
        let mut bits = LogicVec::new(width.max(1));
        bits.set(0, logic);
        let index = self.current_index();
        self.signals[signal.index()].record(index, bits);
        Ok(())
    }

    fn vector_change(&mut self, value: &str, code: &str) -> Result<(), TraceError> {
        let Some(&signal) = self.by_code.get(code) else {
            log::debug!("line {}: change for undeclared code {code}", self.line);
            return Ok(());
        };
        if value.starts_with(['r', 'R']) {
            log::debug!("line {}: real value for {code} ignored", self.line);
            return Ok(());
        }
        let width = self.signals[signal.index()].width;
        let bits = parse_binary_value(&value[1..], width)
            .ok_or_else(|| self.error(format!("invalid binary value: {value}")))?;
        let index = self.current_index();
        self.signals[signal.index()].record(index, bits);
        Ok(())
    }

    fn finish(self) -> Result<VcdTrace, TraceError> {
        if let Some((kw, _)) = self.keyword {
            return Err(TraceError::Format(format!("unterminated ${kw}")));
        }
        if !self.saw_enddefinitions && !self.signals.is_empty() {
            return Err(TraceError::Format("missing $enddefinitions".to_string()));
        }
        Ok(VcdTrace {
            path: None,
            timescale: self.timescale,
            times: self.times,
            signals: self.signals,
            names: self.names,
        })
    }

    fn error(&self, message: String) -> TraceError {
        TraceError::Parse {
            line: self.line,
            message,
        }
    }
}

/// Parses an MSB-first binary value into a vector of `width` bits.
///
/// Short values are left-extended with 0, or with `x`/`z` when that is the
/// leading digit. Long values keep their low `width` bits.
fn parse_binary_value(bits: &str, width: u32) -> Option<LogicVec> {
    let digits: Vec<Logic> = bits.chars().map(Logic::from_char).collect::<Option<_>>()?;
    let fill = match digits.first() {
        Some(Logic::X) => Logic::X,
        Some(Logic::Z) => Logic::Z,
        _ => Logic::Zero,
    };
    let mut v = LogicVec::new(width);
    for i in 0..width {
        let from_right = i as usize;
        let logic = if from_right < digits.len() {
            digits[digits.len() - 1 - from_right]
        } else {
            fill
        };
        v.set(i, logic);
    }
    Some(v)
}
