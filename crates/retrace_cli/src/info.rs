//! `retrace info`: summarize a waveform file.

use std::error::Error;

use retrace_trace::{TraceOracle, VcdTrace};

use crate::settings::open_trace;
use crate::{GlobalArgs, InfoArgs};

/// One row of the signal listing.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SignalRow {
    name: String,
    width: u32,
    var_type: &'static str,
}

/// What `retrace info` reports about a trace.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TraceSummary {
    timescale: String,
    time_steps: usize,
    first_time: Option<u64>,
    last_time: Option<u64>,
    distinct_signals: usize,
    names: usize,
    signals: Vec<SignalRow>,
}

/// Runs the `retrace info` command.
pub fn run(args: &InfoArgs, _global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let trace = open_trace(&args.wave)?;
    let summary = summarize(&trace, args.signals);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary_json(&summary))?);
    } else {
        print!("{}", render(&args.wave, &summary));
    }
    Ok(0)
}

fn summarize(trace: &VcdTrace, with_signals: bool) -> TraceSummary {
    let times = trace.times();
    let names = trace.signal_names();
    let signals = if with_signals {
        names
            .iter()
            .filter_map(|name| {
                let info = trace.signal_info(trace.lookup(name)?)?;
                Some(SignalRow {
                    name: name.clone(),
                    width: info.width,
                    var_type: info.var_type.type_string(),
                })
            })
            .collect()
    } else {
        Vec::new()
    };
    TraceSummary {
        timescale: trace.timescale().to_string(),
        time_steps: times.len(),
        first_time: times.first().copied(),
        last_time: times.last().copied(),
        distinct_signals: trace.signal_count(),
        names: names.len(),
        signals,
    }
}

fn render(path: &str, summary: &TraceSummary) -> String {
    let mut text = format!("{path}\n");
    text.push_str(&format!("  timescale:  {}\n", summary.timescale));
    text.push_str(&format!("  time steps: {}\n", summary.time_steps));
    if let (Some(first), Some(last)) = (summary.first_time, summary.last_time) {
        text.push_str(&format!("  time range: {first} .. {last}\n"));
    }
    text.push_str(&format!(
        "  signals:    {} ({} names)\n",
        summary.distinct_signals, summary.names
    ));
    let name_width = summary.signals.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for row in &summary.signals {
        text.push_str(&format!(
            "    {:<name_width$}  {:>4}  {}\n",
            row.name, row.width, row.var_type
        ));
    }
    text
}

fn summary_json(summary: &TraceSummary) -> serde_json::Value {
    let signals: Vec<serde_json::Value> = summary
        .signals
        .iter()
        .map(|s| serde_json::json!({ "name": s.name, "width": s.width, "type": s.var_type }))
        .collect();
    serde_json::json!({
        "timescale": summary.timescale,
        "time_steps": summary.time_steps,
        "first_time": summary.first_time,
        "last_time": summary.last_time,
        "distinct_signals": summary.distinct_signals,
        "names": summary.names,
        "signals": signals,
    })
}
