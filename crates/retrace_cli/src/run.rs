//! `retrace run`: replay a waveform through a probe testbench.
//!
//! The probe resolves every `--watch` name, registers a value-change callback
//! for it and prints one line per change. SIGINT and SIGTERM raise the
//! engine's interrupt flag; the replay then ends at the next step and the
//! command exits with code 130.

use std::cell::{Cell, RefCell};
use std::error::Error;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use retrace_config::{ConfigError, RetraceConfig};
use retrace_replay::{ReplayEngine, ReplayError, RunOutcome, TerminateReason};
use retrace_trace::{TraceOracle, ValueFormat};

use crate::settings::{load_settings, open_trace};
use crate::{GlobalArgs, PrintFormat, RunArgs, EXIT_INTERRUPTED};

/// A configured engine and the counter its watch callbacks bump.
struct Probe {
    engine: ReplayEngine,
    changes: Rc<Cell<u64>>,
}

/// Runs the `retrace run` command.
///
/// Returns exit code 0 when the replay ends on its own or through `$stop` or
/// `$finish`, and 130 when it was interrupted. A failing or panicking
/// callback is an error, which `main` turns into exit code 1.
pub fn run(args: &RunArgs, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let mut config = load_settings(global)?;
    apply_run_overrides(&mut config, args)?;

    let trace = open_trace(&args.wave)?;
    if !global.quiet && !args.json {
        eprintln!("   Replaying {}", args.wave);
    }

    let out = Rc::new(RefCell::new(io::stdout()));
    let mut probe = build_probe(trace, &config, args, out)?;

    let interrupt = probe.engine.interrupt_handle();
    ctrlc::set_handler(move || interrupt.store(true, Ordering::Relaxed))?;

    let outcome = probe.engine.run()?;
    let changes = probe.changes.get();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary_json(&outcome, changes))?);
    } else if !global.quiet {
        let stats = &outcome.statistics;
        eprintln!(
            "   Finished ({}) at time {} (index {}), {changes} value changes",
            outcome.reason, outcome.final_time, outcome.final_index
        );
        eprintln!(
            "   JIT {} cached reads, {} oracle reads, {} workers",
            stats.read_from_cache, stats.read_from_oracle, stats.tasks_spawned
        );
    }

    Ok(exit_code(outcome.reason))
}

/// Applies the command-line JIT and cache flags on top of `config`.
///
/// A `--window` smaller than the configured recompile window shrinks the
/// recompile window with it.
fn apply_run_overrides(config: &mut RetraceConfig, args: &RunArgs) -> Result<(), ConfigError> {
    if args.no_cache {
        config.replay.persist_cache = false;
    }
    let jit = &mut config.jit;
    if args.no_jit {
        jit.enable = false;
    }
    if let Some(threshold) = args.threshold {
        jit.hot_access_threshold = threshold;
    }
    if let Some(threads) = args.max_threads {
        jit.max_opt_threads = threads;
    }
    if let Some(window) = args.window {
        jit.compile_window_size = window;
        if jit.recompile_window() > window {
            jit.recompile_window_size = Some(window);
        }
    }
    retrace_config::validate_config(config)
}

fn build_probe<W: Write + 'static>(
    oracle: Arc<dyn TraceOracle>,
    config: &RetraceConfig,
    args: &RunArgs,
    out: Rc<RefCell<W>>,
) -> Result<Probe, Box<dyn Error>> {
    let timescale = oracle.timescale();
    let mut engine = ReplayEngine::from_config(oracle, config)?;
    let changes = Rc::new(Cell::new(0u64));
    let format = value_format(args.format);

    for name in &args.watch {
        let Some(signal) = engine.resolve(name) else {
            let suggestions = engine.oracle().suggest(name, 3);
            return Err(if suggestions.is_empty() {
                format!("no signal named `{name}` in {}", args.wave).into()
            } else {
                format!("no signal named `{name}`; did you mean {}?", suggestions.join(", ")).into()
            });
        };

        let name = name.clone();
        let out = Rc::clone(&out);
        let counter = Rc::clone(&changes);
        let silent = args.json;
        engine.register_value_change(signal, format, move |_, data| {
            counter.set(counter.get() + 1);
            if silent {
                return Ok(());
            }
            let Some(value) = &data.value else {
                return Ok(());
            };
            writeln!(
                out.borrow_mut(),
                "{:>12} {name} = {value}",
                timescale.format_time(data.time)
            )
            .map_err(|e| ReplayError::Callback(e.to_string()))
        })?;
    }

    if let Some(delay) = args.stop_after {
        engine.register_after_delay(delay, |engine, data| {
            log::info!("stopping at time {}", data.time);
            engine.finish();
            Ok(())
        })?;
    }

    Ok(Probe { engine, changes })
}

fn value_format(format: PrintFormat) -> ValueFormat {
    match format {
        PrintFormat::Int => ValueFormat::Integer,
        PrintFormat::Bin => ValueFormat::BinStr,
        PrintFormat::Hex => ValueFormat::HexStr,
        PrintFormat::Vec => ValueFormat::Vector,
    }
}

fn exit_code(reason: TerminateReason) -> i32 {
    match reason {
        TerminateReason::Interrupted => EXIT_INTERRUPTED,
        TerminateReason::Aborted => 1,
        TerminateReason::Natural | TerminateReason::Stop | TerminateReason::Finish => 0,
    }
}

fn summary_json(outcome: &RunOutcome, changes: u64) -> serde_json::Value {
    let stats = &outcome.statistics;
    serde_json::json!({
        "reason": outcome.reason.to_string(),
        "final_index": outcome.final_index,
        "final_time": outcome.final_time,
        "value_changes": changes,
        "jit": {
            "read_from_cache": stats.read_from_cache,
            "read_from_oracle": stats.read_from_oracle,
            "unoptimizable_reads": stats.unoptimizable_reads,
            "tasks_spawned": stats.tasks_spawned,
            "first_windows_finished": stats.first_windows_finished,
            "thread_cap_blocked": stats.thread_cap_blocked,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use retrace_trace::{MemoryTrace, VarType};

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["run", "mem.vcd"];
        argv.extend_from_slice(extra);
        RunArgs::parse_from(argv)
    }

    /// A 4-bit counter incrementing at every time 0..=8.
    fn counter() -> Arc<dyn TraceOracle> {
        let mut b = MemoryTrace::builder();
        let count = b.signal("top.count", 4, VarType::Reg);
        let clk = b.signal("top.clk", 1, VarType::Wire);
        for t in 0..=8 {
            b.change(count, t, t);
            b.change(clk, t, t % 2);
        }
        Arc::new(b.build())
    }

    fn no_cache() -> RetraceConfig {
        let mut config = RetraceConfig::default();
        config.replay.persist_cache = false;
        config
    }

    fn replay(args: &RunArgs) -> (RunOutcome, u64, String) {
        let out = Rc::new(RefCell::new(Vec::<u8>::new()));
        let mut probe = build_probe(counter(), &no_cache(), args, Rc::clone(&out)).unwrap();
        let outcome = probe.engine.run().unwrap();
        let text = String::from_utf8(out.borrow().clone()).unwrap();
        (outcome, probe.changes.get(), text)
    }

    #[test]
    fn watched_changes_are_printed() {
        let (outcome, changes, text) = replay(&args(&["-w", "top.count"]));
        assert_eq!(outcome.reason, TerminateReason::Natural);
        // The last index ends the replay without being stepped.
        assert_eq!(changes, 7);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].ends_with("top.count = 'h1"), "{}", lines[0]);
        assert!(lines[6].ends_with("top.count = 'h7"), "{}", lines[6]);
    }

    #[test]
    fn format_flag_selects_the_encoding() {
        let (_, _, text) = replay(&args(&["-w", "top.count", "--format", "bin"]));
        assert!(text.lines().next().unwrap().ends_with("top.count = 'b0001"));
    }

    #[test]
    fn stop_after_finishes_early() {
        let (outcome, changes, _) = replay(&args(&["-w", "top.clk", "--stop-after", "3"]));
        assert_eq!(outcome.reason, TerminateReason::Finish);
        assert_eq!(outcome.final_time, 3);
        assert_eq!(changes, 2);
    }

    #[test]
    fn json_mode_counts_without_printing() {
        let (outcome, changes, text) = replay(&args(&["-w", "top.count", "--json"]));
        assert!(text.is_empty());
        let summary = summary_json(&outcome, changes);
        assert_eq!(summary["reason"], "end of trace");
        assert_eq!(summary["value_changes"], 7);
        assert_eq!(summary["final_index"], 8);
    }

    #[test]
    fn unknown_watch_suggests_names() {
        let out = Rc::new(RefCell::new(Vec::<u8>::new()));
        let err = build_probe(counter(), &no_cache(), &args(&["-w", "top.cnt"]), out)
            .err()
            .unwrap();
        assert!(err.to_string().contains("no signal named `top.cnt`"));
    }

    #[test]
    fn run_overrides() {
        let mut config = RetraceConfig::default();
        apply_run_overrides(
            &mut config,
            &args(&["--no-cache", "--no-jit", "--threshold", "2", "--window", "64"]),
        )
        .unwrap();
        assert!(!config.replay.persist_cache);
        assert!(!config.jit.enable);
        assert_eq!(config.jit.hot_access_threshold, 2);
        assert_eq!(config.jit.compile_window_size, 64);
        assert_eq!(config.jit.recompile_window(), 64);
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut config = RetraceConfig::default();
        assert!(apply_run_overrides(&mut config, &args(&["--window", "0"])).is_err());
    }

    #[test]
    fn interrupted_runs_exit_130() {
        assert_eq!(exit_code(TerminateReason::Interrupted), 130);
        assert_eq!(exit_code(TerminateReason::Finish), 0);
        assert_eq!(exit_code(TerminateReason::Natural), 0);
        assert_eq!(exit_code(TerminateReason::Aborted), 1);
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            panic!("output closed")
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn panicking_output_aborts_the_replay() {
        let out = Rc::new(RefCell::new(BrokenPipe));
        let mut probe = build_probe(counter(), &no_cache(), &args(&["-w", "top.count"]), out).unwrap();
        let err = probe.engine.run().unwrap_err();
        assert!(matches!(err, ReplayError::Panicked(ref m) if m == "output closed"));
        assert_eq!(probe.engine.termination_reason(), Some(TerminateReason::Aborted));
        assert_eq!(probe.changes.get(), 1);
    }

    #[test]
    fn raised_interrupt_ends_the_replay() {
        let out = Rc::new(RefCell::new(Vec::<u8>::new()));
        let mut probe = build_probe(counter(), &no_cache(), &args(&["-w", "top.count"]), out).unwrap();
        probe.engine.interrupt_handle().store(true, Ordering::Relaxed);
        let outcome = probe.engine.run().unwrap();
        assert_eq!(outcome.reason, TerminateReason::Interrupted);
        assert_eq!(probe.changes.get(), 0);
    }
}
