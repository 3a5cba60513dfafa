//! # Driver Tests
//!
//! Warmup polling, stats rotation, instruction limits, checkpointing and exit
//! code propagation, driven by the scripted engine and a `mockall` engine.

use std::path::PathBuf;

use mockall::predicate::eq;
use pretty_assertions::assert_eq;
use rstest::rstest;
use simdrive_core::common::DriverError;
use simdrive_core::config::RunConfig;
use simdrive_core::sim::{SimEvent, SimulationDriver, StatsSink};

use crate::common::harness::{outdir, read};
use crate::common::mocks::engine::{ScriptedEngine, Step};
use crate::common::mocks::mock_engine::MockEngine;

const EXIT: &str = "exiting with last active thread context";
const SLICE: u64 = 250_000_000;

/// Sink that records nothing and never writes.
struct NullStats;

impl StatsSink for NullStats {
    fn dump(&mut self) -> simdrive_core::common::Result<()> {
        Ok(())
    }

    fn reset(&mut self) {}
}

#[test]
fn test_run_without_warmup() {
    let dir = outdir();
    let engine = ScriptedEngine::new(1, [Step::exit(1_000, 500, EXIT, 0)]);
    let stats = engine.stats(dir.path());
    let config = RunConfig::new(dir.path());

    let mut driver = SimulationDriver::new(config, engine, stats);
    let outcome = driver.run().unwrap();

    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.tick, 1_000);
    assert_eq!(outcome.warmup, None);
    assert_eq!(outcome.final_stats, None);
    assert!(dir.path().join("stats.txt").exists());
    assert!(!dir.path().join("stats_warmup.txt").exists());
    assert!(!dir.path().join("stats_final.txt").exists());

    let (engine, _) = driver.into_parts();
    assert_eq!(engine.log(), ["instantiate", "simulate", "dump"]);
    assert_eq!(engine.bounds, [None]);
    assert_eq!(engine.limits, [None]);
}

#[test]
fn test_warmup_polls_until_target() {
    let dir = outdir();
    let engine = ScriptedEngine::new(
        1,
        [
            Step::slice(SLICE, 2_000_000),
            Step::slice(SLICE, 4_999_999),
            Step::slice(SLICE, 5_000_001),
            Step::exit(SLICE, 9_000_000, EXIT, 0),
        ],
    );
    let stats = engine.stats(dir.path());
    let config = RunConfig::new(dir.path()).with_warmup(5_000_000);

    let mut driver = SimulationDriver::new(config, engine, stats);
    let outcome = driver.run().unwrap();

    let warmup = outcome.warmup.unwrap();
    assert_eq!(warmup.slices, 3);
    assert!(warmup.reached_target);
    assert_eq!(warmup.tick, 3 * SLICE);
    assert_eq!(warmup.last_cause, "simulate() limit reached");

    let (engine, _) = driver.into_parts();
    assert_eq!(engine.bounds, [Some(SLICE), Some(SLICE), Some(SLICE), None]);
    assert_eq!(engine.limits, [Some(5_000_000)]);
}

#[test]
fn test_warmup_boundary_sequence() {
    let dir = outdir();
    let engine = ScriptedEngine::new(1, [Step::slice(SLICE, 10), Step::exit(5, 20, EXIT, 0)]);
    let stats = engine.stats(dir.path());
    let config = RunConfig::new(dir.path()).with_warmup(10);

    let mut driver = SimulationDriver::new(config, engine, stats);
    let _ = driver.run().unwrap();

    let (engine, _) = driver.into_parts();
    assert_eq!(
        engine.log(),
        [
            "instantiate",
            "limit 0 10",
            "simulate",
            "dump",
            "dump",
            "reset",
            "reset",
            "simulate",
            "dump",
        ]
    );
}

#[test]
fn test_warmup_rotates_stats_files() {
    let dir = outdir();
    let engine = ScriptedEngine::new(
        1,
        [Step::slice(SLICE, 6_000_000), Step::exit(SLICE, 7_000_000, EXIT, 0)],
    );
    let stats = engine.stats(dir.path());
    let config = RunConfig::new(dir.path()).with_warmup(5_000_000);

    let mut driver = SimulationDriver::new(config, engine, stats);
    let outcome = driver.run().unwrap();

    let warmup_file = dir.path().join("stats_warmup.txt");
    let final_file = dir.path().join("stats_final.txt");
    assert_eq!(outcome.warmup.unwrap().archive, Some(warmup_file.clone()));
    assert_eq!(outcome.final_stats, Some(final_file.clone()));
    assert!(!dir.path().join("stats.txt").exists());

    // Two dumps at the warmup boundary, both before truncation.
    let warmup_text = read(&warmup_file);
    assert_eq!(warmup_text.matches("simInsts").count(), 2);
    assert!(warmup_text.contains("6000000"));

    let final_text = read(&final_file);
    assert!(final_text.starts_with(
        "Final stats after warmup\n---------- Begin Simulation Statistics ----------\n"
    ));
    assert!(final_text.contains("7000000"));
    assert!(!final_text.contains("6000000"));
}

#[test]
fn test_live_stats_hold_only_placeholder_after_warmup() {
    let dir = outdir();
    let engine = ScriptedEngine::new(
        1,
        [Step::slice(SLICE, 1_000), Step::slice(SLICE, 2_500)],
    );
    let stats = engine.stats(dir.path());
    let config = RunConfig::new(dir.path()).with_warmup(2_000);

    let mut driver = SimulationDriver::new(config, engine, stats);
    let summary = driver.run_warmup(2_000).unwrap();

    assert!(summary.reached_target);
    assert_eq!(summary.slices, 2);
    assert_eq!(
        read(&dir.path().join("stats.txt")),
        "Final stats after warmup\n"
    );
    let archived = read(&dir.path().join("stats_warmup.txt"));
    assert_eq!(archived.matches("simInsts").count(), 3);
}

#[test]
fn test_warmup_ends_when_workload_exits_early() {
    let dir = outdir();
    let engine = ScriptedEngine::new(
        1,
        [
            Step::slice(SLICE, 1_000),
            Step::exit(100, 2_000, EXIT, 4),
            Step::exit(0, 2_000, EXIT, 4),
        ],
    );
    let stats = engine.stats(dir.path());
    let config = RunConfig::new(dir.path()).with_warmup(5_000_000);

    let mut driver = SimulationDriver::new(config, engine, stats);
    let outcome = driver.run().unwrap();

    let warmup = outcome.warmup.clone().unwrap();
    assert!(!warmup.reached_target);
    assert_eq!(warmup.slices, 2);
    assert_eq!(warmup.last_cause, EXIT);
    assert_eq!(warmup.tick, SLICE + 100);
    assert_eq!(outcome.exit_code(), 4);
}

#[test]
fn test_warmup_missing_stats_file_is_not_fatal() {
    let dir = outdir();
    let engine = ScriptedEngine::new(
        1,
        [
            Step::slice(SLICE, 9_000_000),
            Step::slice(SLICE, 9_000_000),
            Step::exit(10, 9_000_000, "user interrupt received", 0),
            Step::exit(10, 9_000_000, EXIT, 0),
        ],
    );
    let stats = engine.silent_stats();
    let config = RunConfig::new(dir.path()).with_warmup(1);

    let mut driver = SimulationDriver::new(config, engine, stats);
    let outcome = driver.run().unwrap();

    // Without a stats file the target is never observed; only the unexpected cause ends warmup.
    let warmup = outcome.warmup.unwrap();
    assert_eq!(warmup.slices, 3);
    assert!(!warmup.reached_target);
    assert_eq!(warmup.archive, None);

    // The placeholder becomes the final stats file.
    assert_eq!(
        read(&dir.path().join("stats_final.txt")),
        "Final stats after warmup\n"
    );
}

#[test]
fn test_zero_warmup_is_disabled() {
    let dir = outdir();
    let engine = ScriptedEngine::new(1, [Step::exit(1, 1, EXIT, 0)]);
    let stats = engine.stats(dir.path());
    let config = RunConfig::new(dir.path()).with_warmup(0);

    let mut driver = SimulationDriver::new(config, engine, stats);
    let outcome = driver.run().unwrap();

    assert_eq!(outcome.warmup, None);
    assert_eq!(driver.into_parts().0.bounds, [None]);
}

#[test]
fn test_main_limit_includes_warmup() {
    let dir = outdir();
    let engine = ScriptedEngine::new(
        4,
        [
            Step::slice(SLICE, 300),
            Step::exit(SLICE, 1_200, "a thread reached the max instruction count", 0),
        ],
    );
    let stats = engine.stats(dir.path());
    let config = RunConfig::new(dir.path())
        .with_max_insts(1000)
        .with_warmup(200);

    let mut driver = SimulationDriver::new(config, engine, stats);
    let _ = driver.run().unwrap();

    let (engine, _) = driver.into_parts();
    assert_eq!(engine.limits, [Some(1200); 4]);
    let log = engine.log();
    let limits: Vec<_> = log.iter().filter(|l| l.starts_with("limit")).collect();
    assert_eq!(
        limits,
        [
            "limit 0 200",
            "limit 1 200",
            "limit 2 200",
            "limit 3 200",
            "limit 0 1200",
            "limit 1 1200",
            "limit 2 1200",
            "limit 3 1200",
        ]
    );
}

#[test]
fn test_checkpoint_does_not_end_main_loop() {
    let dir = outdir();
    let engine = ScriptedEngine::new(
        1,
        [
            Step::checkpoint(100),
            Step::checkpoint(150),
            Step::exit(50, 10, "m5_exit instruction encountered", 7),
        ],
    );
    let stats = engine.stats(dir.path());
    let mut config = RunConfig::new(dir.path());
    config.checkpoint = true;

    let mut driver = SimulationDriver::new(config, engine, stats);
    let outcome = driver.run().unwrap();

    let expected = vec![dir.path().join("cpt.100"), dir.path().join("cpt.250")];
    assert_eq!(outcome.checkpoints, expected);
    assert!(expected.iter().all(|d| d.is_dir()));
    assert_eq!(outcome.tick, 300);
    assert_eq!(outcome.event.cause, "m5_exit instruction encountered");
    assert_eq!(outcome.exit_code(), 7);

    let (engine, _) = driver.into_parts();
    assert_eq!(engine.checkpoints, expected);
    assert_eq!(engine.bounds, [None, None, None]);
}

#[rstest]
#[case("exiting with last active thread context", 0)]
#[case("m5_exit instruction encountered", 1)]
#[case("a thread reached the max instruction count", 0)]
#[case("simulate() limit reached", 0)]
#[case("fatal: unmapped address", 255)]
fn test_any_other_cause_is_terminal(#[case] cause: &str, #[case] code: i32) {
    let dir = outdir();
    let engine = ScriptedEngine::new(1, [Step::exit(10, 1, cause, code)]);
    let stats = engine.stats(dir.path());

    let mut driver = SimulationDriver::new(RunConfig::new(dir.path()), engine, stats);
    let outcome = driver.run().unwrap();

    assert_eq!(outcome.event, SimEvent::new(cause, code));
    assert_eq!(outcome.exit_code(), code);
    assert!(outcome.checkpoints.is_empty());
}

#[test]
fn test_restore_is_passed_to_engine() {
    let dir = outdir();
    let engine = ScriptedEngine::new(1, [Step::exit(1, 1, EXIT, 0)]);
    let stats = engine.stats(dir.path());
    let mut config = RunConfig::new(dir.path());
    config.restore = Some(PathBuf::from("m5out/cpt.1000"));

    let mut driver = SimulationDriver::new(config, engine, stats);
    let _ = driver.run().unwrap();

    assert_eq!(
        driver.engine().restored,
        Some(PathBuf::from("m5out/cpt.1000"))
    );
}

#[test]
fn test_mock_engine_limits_and_exit() {
    let dir = outdir();
    let mut engine = MockEngine::new();
    let _ = engine
        .expect_instantiate()
        .with(eq(None))
        .times(1)
        .returning(|_| Ok(()));
    let _ = engine.expect_num_cores().return_const(2_usize);
    let _ = engine
        .expect_set_max_insts()
        .withf(|_, limit| *limit == 1_000)
        .times(2)
        .return_const(());
    let _ = engine
        .expect_simulate()
        .with(eq(None))
        .times(1)
        .returning(|_| SimEvent::new("a thread reached the max instruction count", 0));
    let _ = engine.expect_cur_tick().return_const(42_u64);
    let _ = engine.expect_checkpoint().never();

    let config = RunConfig::new(dir.path()).with_max_insts(1_000);
    let mut driver = SimulationDriver::new(config, engine, NullStats);
    let outcome = driver.run().unwrap();

    assert_eq!(outcome.tick, 42);
    assert_eq!(outcome.exit_code(), 0);
}

#[test]
fn test_checkpoint_failure_is_reported() {
    let dir = outdir();
    let mut engine = MockEngine::new();
    let _ = engine.expect_instantiate().returning(|_| Ok(()));
    let _ = engine.expect_num_cores().return_const(1_usize);
    let _ = engine
        .expect_simulate()
        .times(1)
        .returning(|_| SimEvent::checkpoint());
    let _ = engine.expect_cur_tick().return_const(500_u64);
    let _ = engine
        .expect_checkpoint()
        .withf(|dir| dir.ends_with("cpt.500"))
        .times(1)
        .returning(|dir| {
            Err(DriverError::Checkpoint {
                path: dir.to_path_buf(),
                reason: "disk full".to_owned(),
            })
        });

    let mut driver = SimulationDriver::new(RunConfig::new(dir.path()), engine, NullStats);
    let err = driver.run().unwrap_err();

    assert!(matches!(err, DriverError::Checkpoint { .. }));
    assert!(err.to_string().contains("disk full"));
}

#[test]
fn test_restore_failure_stops_before_simulating() {
    let dir = outdir();
    let mut engine = MockEngine::new();
    let _ = engine
        .expect_instantiate()
        .withf(|restore| restore.as_deref() == Some(std::path::Path::new("missing")))
        .returning(|restore| {
            Err(DriverError::Checkpoint {
                path: restore.unwrap_or_default(),
                reason: "no such checkpoint".to_owned(),
            })
        });
    let _ = engine.expect_simulate().never();

    let mut config = RunConfig::new(dir.path());
    config.restore = Some(PathBuf::from("missing"));
    let mut driver = SimulationDriver::new(config, engine, NullStats);

    assert!(matches!(driver.run(), Err(DriverError::Checkpoint { .. })));
}
