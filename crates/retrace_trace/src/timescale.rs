//! `$timescale` handling.
//!
//! Times stay in trace units everywhere in the replay. The timescale is only
//! consulted to print them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// SI unit of a timescale, from seconds down to femtoseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeUnit {
    /// Seconds.
    S,
    /// Milliseconds.
    Ms,
    /// Microseconds.
    Us,
    /// Nanoseconds.
    Ns,
    /// Picoseconds.
    Ps,
    /// Femtoseconds.
    Fs,
}

impl TimeUnit {
    const ALL: [TimeUnit; 6] = [
        TimeUnit::S,
        TimeUnit::Ms,
        TimeUnit::Us,
        TimeUnit::Ns,
        TimeUnit::Ps,
        TimeUnit::Fs,
    ];

    fn symbol(self) -> &'static str {
        match self {
            TimeUnit::S => "s",
            TimeUnit::Ms => "ms",
            TimeUnit::Us => "us",
            TimeUnit::Ns => "ns",
            TimeUnit::Ps => "ps",
            TimeUnit::Fs => "fs",
        }
    }

    /// Length of one unit in femtoseconds.
    pub fn femtos(self) -> u64 {
        let steps_below_seconds = TimeUnit::ALL.len() - 1 - self as usize;
        1000u64.pow(steps_below_seconds as u32)
    }
}

/// Length of one trace time unit, e.g. `10ps`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timescale {
    /// Multiplier, normally 1, 10 or 100.
    pub magnitude: u32,
    /// Base unit.
    pub unit: TimeUnit,
}

impl Default for Timescale {
    fn default() -> Self {
        Self {
            magnitude: 1,
            unit: TimeUnit::Fs,
        }
    }
}

impl Timescale {
    /// Parses the body of a `$timescale` declaration such as `1ns`, `10 ps`
    /// or `100fs`. A missing number means 1 and a missing unit means fs.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let split = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());
        let (digits, unit) = text.split_at(split);
        let magnitude = match digits {
            "" => 1,
            digits => digits.parse().ok().filter(|&m| m > 0)?,
        };
        let unit = unit.trim().to_ascii_lowercase();
        let unit = if unit.is_empty() {
            TimeUnit::Fs
        } else {
            TimeUnit::ALL.into_iter().find(|u| u.symbol() == unit)?
        };
        Some(Self { magnitude, unit })
    }

    /// Femtoseconds per trace unit.
    pub fn femtos_per_unit(&self) -> u64 {
        u64::from(self.magnitude).saturating_mul(self.unit.femtos())
    }

    /// `time` trace units in femtoseconds, saturating at `u64::MAX`.
    pub fn to_fs(&self, time: u64) -> u64 {
        time.saturating_mul(self.femtos_per_unit())
    }

    /// Prints `time` in the coarsest unit that represents it exactly,
    /// e.g. `2 us` rather than `2000 ns`.
    pub fn format_time(&self, time: u64) -> String {
        let fs = self.to_fs(time);
        if fs == 0 {
            return "0 fs".to_string();
        }
        let unit = TimeUnit::ALL
            .into_iter()
            .find(|u| fs % u.femtos() == 0)
            .unwrap_or(TimeUnit::Fs);
        format!("{} {}", fs / unit.femtos(), unit.symbol())
    }
}

impl fmt::Display for Timescale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit.symbol())
    }
}
