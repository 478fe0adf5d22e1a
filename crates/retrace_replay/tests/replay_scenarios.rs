//! End-to-end replay scenarios over synthetic and on-disk traces.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use retrace_cache::{TraceCache, MIN_PERSISTED_SIGNALS};
use retrace_config::{JitConfig, RetraceConfig};
use retrace_replay::{CallbackReason, ReplayEngine, ReplayError, TerminateReason};
use retrace_trace::{MemoryTrace, SignalValue, TraceOracle, ValueFormat, VarType, VcdTrace};

/// A 2-bit counter over times 0..=30 that steps at indices 1, 4, 7, ...
fn counter_trace() -> Arc<MemoryTrace> {
    let mut b = MemoryTrace::builder();
    let count = b.signal("top.count", 2, VarType::Reg);
    for i in 0..=30u64 {
        b.change(count, i, ((i + 2) / 3) % 4);
    }
    Arc::new(b.build())
}

/// A clock with one change every 10 time units, `steps` recorded times.
fn clock_trace(steps: u64) -> Arc<MemoryTrace> {
    let mut b = MemoryTrace::builder();
    let clk = b.signal("top.clk", 1, VarType::Wire);
    for i in 0..steps {
        b.change(clk, i * 10, i % 2);
    }
    Arc::new(b.build())
}

#[test]
fn counter_value_changes_fire_once_per_change() {
    let trace = counter_trace();
    let oracle: Arc<dyn TraceOracle> = trace.clone();
    let mut engine = ReplayEngine::new(oracle, JitConfig::default()).unwrap();
    let count = engine.resolve("top.count").unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    engine
        .register_value_change(count, ValueFormat::Integer, move |_, data| {
            assert_eq!(data.reason, CallbackReason::ValueChange);
            s.borrow_mut().push((data.index, data.value.clone()));
            Ok(())
        })
        .unwrap();

    let outcome = engine.run().unwrap();
    assert_eq!(outcome.reason, TerminateReason::Natural);
    assert_eq!(outcome.final_index, 30);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 10);
    let indices: Vec<u64> = seen.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, (0..10).map(|k| 1 + 3 * k).collect::<Vec<u64>>());
    let signal = trace.lookup("top.count").unwrap();
    for (index, value) in seen.iter() {
        assert_eq!(
            value.as_ref().unwrap(),
            &trace.value_at(signal, *index, ValueFormat::Integer).unwrap()
        );
    }
}

#[test]
fn timed_callback_fires_once_at_first_time_reached() {
    let mut engine = ReplayEngine::new(clock_trace(10), JitConfig::default()).unwrap();
    let fired = Rc::new(RefCell::new(Vec::new()));
    let f = Rc::clone(&fired);
    engine
        .register_after_delay(25, move |_, data| {
            f.borrow_mut().push((data.index, data.time));
            Ok(())
        })
        .unwrap();
    engine.run().unwrap();
    assert_eq!(*fired.borrow(), vec![(3, 30)]);
}

#[test]
fn delay_is_relative_to_the_registering_step() {
    let mut engine = ReplayEngine::new(clock_trace(10), JitConfig::default()).unwrap();
    let fired = Rc::new(RefCell::new(Vec::new()));
    let f = Rc::clone(&fired);
    engine
        .register_after_delay(20, move |e, _| {
            let f = Rc::clone(&f);
            e.register_after_delay(15, move |_, data| {
                f.borrow_mut().push(data.time);
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();
    engine.run().unwrap();
    assert_eq!(*fired.borrow(), vec![40]);
}

#[test]
fn delay_past_the_end_is_an_error() {
    let mut engine = ReplayEngine::new(clock_trace(5), JitConfig::default()).unwrap();
    assert!(matches!(
        engine.register_after_delay(41, |_, _| Ok(())),
        Err(ReplayError::BeyondTrace { time: 41, max_time: 40 })
    ));
    assert!(engine.register_after_delay(40, |_, _| Ok(())).is_ok());
}

#[test]
fn delay_past_the_end_inside_a_callback_aborts_the_run() {
    let mut engine = ReplayEngine::new(clock_trace(5), JitConfig::default()).unwrap();
    let ended = Rc::new(RefCell::new(0));
    let e2 = Rc::clone(&ended);
    engine
        .register_end_of_simulation(move |_, _| {
            *e2.borrow_mut() += 1;
            Ok(())
        })
        .unwrap();
    engine
        .register_start_of_simulation(|e, _| {
            e.register_after_delay(1_000, |_, _| Ok(()))?;
            Ok(())
        })
        .unwrap();
    assert!(matches!(engine.run(), Err(ReplayError::BeyondTrace { .. })));
    assert_eq!(*ended.borrow(), 1);
}

#[test]
fn removed_registration_stops_firing() {
    let mut engine = ReplayEngine::new(clock_trace(10), JitConfig::default()).unwrap();
    let clk = engine.resolve("top.clk").unwrap();
    let count = Rc::new(RefCell::new(0));
    let c = Rc::clone(&count);
    let id = engine
        .register_value_change(clk, ValueFormat::BinStr, move |_, _| {
            *c.borrow_mut() += 1;
            Ok(())
        })
        .unwrap();
    engine
        .register_after_delay(30, move |e, _| {
            e.remove_callback(id);
            Ok(())
        })
        .unwrap();
    engine.run().unwrap();
    // Changes at indices 1 and 2. The timer removes it before the value
    // changes of step 3 are checked.
    assert_eq!(*count.borrow(), 2);
    assert_eq!(engine.value_change_count(), 0);
}

#[test]
fn removed_timer_never_fires() {
    let mut engine = ReplayEngine::new(clock_trace(10), JitConfig::default()).unwrap();
    let clk = engine.resolve("top.clk").unwrap();
    let fired = Rc::new(RefCell::new(0));
    let f = Rc::clone(&fired);
    let timer = engine
        .register_after_delay(30, move |_, _| {
            *f.borrow_mut() += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(engine.pending_timer_count(), 0);
    engine
        .register_value_change(clk, ValueFormat::Integer, move |e, data| {
            if data.index == 2 {
                e.remove_callback(timer);
            }
            Ok(())
        })
        .unwrap();
    let outcome = engine.run().unwrap();
    assert_eq!(outcome.reason, TerminateReason::Natural);
    assert_eq!(*fired.borrow(), 0);
    assert_eq!(engine.pending_timer_count(), 0);
}

#[test]
fn removed_next_step_callback_never_fires() {
    let mut engine = ReplayEngine::new(clock_trace(10), JitConfig::default()).unwrap();
    let clk = engine.resolve("top.clk").unwrap();
    let fired = Rc::new(RefCell::new(Vec::new()));
    let pending = Rc::new(RefCell::new(None));

    let f = Rc::clone(&fired);
    let p = Rc::clone(&pending);
    engine
        .register_value_change(clk, ValueFormat::Integer, move |e, data| {
            match data.index {
                2 => {
                    let f = Rc::clone(&f);
                    let id = e.register_next_sim_time(move |_, d| {
                        f.borrow_mut().push(d.index);
                        Ok(())
                    });
                    *p.borrow_mut() = Some(id);
                }
                3 => {
                    if let Some(id) = p.borrow_mut().take() {
                        e.remove_callback(id);
                    }
                }
                _ => {}
            }
            Ok(())
        })
        .unwrap();
    engine.run().unwrap();
    assert!(fired.borrow().is_empty(), "fired at {:?}", fired.borrow());
}

#[test]
fn timer_on_the_last_time_is_dropped_at_the_end() {
    let mut engine = ReplayEngine::new(clock_trace(5), JitConfig::default()).unwrap();
    let fired = Rc::new(RefCell::new(0));
    let f = Rc::clone(&fired);
    engine
        .register_after_delay(40, move |_, _| {
            *f.borrow_mut() += 1;
            Ok(())
        })
        .unwrap();
    let outcome = engine.run().unwrap();
    assert_eq!(outcome.final_index, 4);
    assert_eq!(*fired.borrow(), 0);
}

#[test]
fn add_then_remove_in_one_window_never_fires() {
    let mut engine = ReplayEngine::new(clock_trace(10), JitConfig::default()).unwrap();
    let clk = engine.resolve("top.clk").unwrap();
    let count = Rc::new(RefCell::new(0));
    let c = Rc::clone(&count);
    let id = engine
        .register_value_change(clk, ValueFormat::Integer, move |_, _| {
            *c.borrow_mut() += 1;
            Ok(())
        })
        .unwrap();
    engine.remove_callback(id);
    engine.run().unwrap();
    assert_eq!(*count.borrow(), 0);
}

#[test]
fn next_step_registrations_defer_to_the_following_step() {
    fn rearm(engine: &mut ReplayEngine, seen: Rc<RefCell<Vec<u64>>>) {
        engine.register_next_sim_time(move |e, data| {
            seen.borrow_mut().push(data.index);
            rearm(e, Rc::clone(&seen));
            Ok(())
        });
    }

    let mut engine = ReplayEngine::new(clock_trace(6), JitConfig::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    rearm(&mut engine, Rc::clone(&seen));
    engine.run().unwrap();
    assert_eq!(*seen.borrow(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn finish_from_a_value_change_skips_later_callbacks() {
    let mut engine = ReplayEngine::new(clock_trace(10), JitConfig::default()).unwrap();
    let clk = engine.resolve("top.clk").unwrap();
    let later = Rc::new(RefCell::new(0));
    engine
        .register_value_change(clk, ValueFormat::Integer, |e, data| {
            if data.index == 2 {
                e.finish();
            }
            Ok(())
        })
        .unwrap();
    let l = Rc::clone(&later);
    engine
        .register_value_change(clk, ValueFormat::Integer, move |_, _| {
            *l.borrow_mut() += 1;
            Ok(())
        })
        .unwrap();
    let outcome = engine.run().unwrap();
    assert_eq!(outcome.reason, TerminateReason::Finish);
    assert_eq!(outcome.final_index, 2);
    assert_eq!(*later.borrow(), 1);
}

#[test]
fn wide_signal_changes_are_detected() {
    let mut b = MemoryTrace::builder();
    let bus = b.signal("top.bus", 40, VarType::Wire);
    b.change(bus, 0, 1 << 35)
        .change(bus, 1, 1 << 35)
        .change(bus, 2, (1 << 35) | 1)
        .time(3);
    let mut engine = ReplayEngine::new(Arc::new(b.build()), JitConfig::default()).unwrap();
    let id = engine.resolve("top.bus").unwrap();
    let values = Rc::new(RefCell::new(Vec::new()));
    let v = Rc::clone(&values);
    engine
        .register_value_change(id, ValueFormat::HexStr, move |_, data| {
            v.borrow_mut().push(data.value.clone().unwrap());
            Ok(())
        })
        .unwrap();
    engine.run().unwrap();
    assert_eq!(
        *values.borrow(),
        vec![SignalValue::HexStr("0800000001".to_string())]
    );
}

#[test]
fn unresolved_names_are_none() {
    let mut engine = ReplayEngine::new(clock_trace(3), JitConfig::default()).unwrap();
    assert!(engine.resolve("top.missing").is_none());
    assert!(engine.resolve("top.missing").is_none());
    assert_eq!(engine.resolve("top.clk"), engine.resolve("top.clk"));
}

#[test]
fn single_time_trace_is_rejected() {
    let mut b = MemoryTrace::builder();
    let a = b.signal("top.a", 1, VarType::Wire);
    b.change(a, 0, 1);
    assert!(matches!(
        ReplayEngine::new(Arc::new(b.build()), JitConfig::default()),
        Err(ReplayError::TraceTooShort(1))
    ));
}

fn write_vcd(path: &std::path::Path, signals: usize, steps: u64) {
    let mut vcd = String::from("$timescale 1ns $end\n$scope module top $end\n");
    for i in 0..signals {
        vcd.push_str(&format!("$var wire 4 s{i} sig{i} $end\n"));
    }
    vcd.push_str("$upscope $end\n$enddefinitions $end\n");
    for t in 0..steps {
        vcd.push_str(&format!("#{}\n", t * 10));
        for i in 0..signals {
            vcd.push_str(&format!("b{:b} s{i}\n", (t + i as u64) % 16));
        }
    }
    std::fs::write(path, vcd).unwrap();
}

#[test]
fn vcd_replay_persists_time_index_and_names() {
    let dir = tempfile::tempdir().unwrap();
    let wave = dir.path().join("wave.vcd");
    let signals = MIN_PERSISTED_SIGNALS + 1;
    write_vcd(&wave, signals, 8);

    let mut config = RetraceConfig::default();
    config.replay.cache_dir = dir.path().join("cache");

    let trace = VcdTrace::open(&wave).unwrap();
    let mut engine = ReplayEngine::from_config(Arc::new(trace), &config).unwrap();
    for i in 0..signals {
        let id = engine.resolve(&format!("top.sig{i}")).unwrap();
        assert_eq!(engine.signal_width(id).unwrap(), 4);
    }
    let sig3 = engine.resolve("top.sig3").unwrap();
    engine.set_cursor_index(2).unwrap();
    assert_eq!(
        engine.value(sig3, ValueFormat::Integer).unwrap(),
        SignalValue::Integer(5)
    );
    engine.set_cursor_index(0).unwrap();
    engine.run().unwrap();

    let cache = TraceCache::open(&config.replay.cache_dir, &wave, env!("CARGO_PKG_VERSION")).unwrap();
    assert_eq!(
        cache.load_time_table().unwrap(),
        vec![0, 10, 20, 30, 40, 50, 60, 70]
    );
    let names = cache.load_signal_names().unwrap();
    assert_eq!(names.len(), signals);
    assert_eq!(names["top.sig3"].width, 4);

    // A second replay of the unchanged file starts from the persisted data.
    let trace = VcdTrace::open(&wave).unwrap();
    let mut engine = ReplayEngine::from_config(Arc::new(trace), &config).unwrap();
    let id = engine.resolve("top.sig3").unwrap();
    assert_eq!(engine.signal_type(id).unwrap(), "vpiNet");
    assert_eq!(engine.max_cursor_index(), 7);
}

#[test]
fn disabled_persistence_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let wave = dir.path().join("wave.vcd");
    write_vcd(&wave, 2, 4);
    let mut config = RetraceConfig::default();
    config.replay.cache_dir = dir.path().join("cache");
    config.replay.persist_cache = false;

    let trace = VcdTrace::open(&wave).unwrap();
    let mut engine = ReplayEngine::from_config(Arc::new(trace), &config).unwrap();
    engine.run().unwrap();
    assert!(!config.replay.cache_dir.exists());
}
