//! Failure handling: fail-fast, best-effort, retries and errors raised
//! before any chunk is dispatched.

mod common;

use chunkflow::processor::MuonCutflow;
use chunkflow::schema::EventView;
use chunkflow::{
    ConfigurationError, ExecutorArgs, FailureMode, Fileset, JobError, JobFailure, Processor,
    ResolutionError, SchemaKind, Strategy,
};
use common::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// ZJets plus a dataset whose second chunk has a corrupt muon counter
fn broken_fileset() -> Fileset {
    muon_fileset()
        .with_dataset("Broken", [sample("nano_corrupt.json")])
}

fn nano_args(strategy: Strategy) -> ExecutorArgs {
    args_for(strategy, 2)
        .with_schema(SchemaKind::NanoAod)
        .with_chunk_size(Some(5))
}

#[tokio::test]
async fn test_fail_fast_reports_the_corrupt_chunk() {
    for strategy in Strategy::ALL {
        let err = run_muons(
            &broken_fileset(),
            MuonCutflow::default(),
            strategy,
            &nano_args(strategy),
        )
        .await
        .unwrap_err();

        let chunk = err.chunk().unwrap_or_else(|| panic!("{strategy}: {err}"));
        assert_eq!(chunk.dataset, "Broken");
        assert_eq!(chunk.file, sample("nano_corrupt.json"));
        assert_eq!((chunk.range.start, chunk.range.stop), (5, 10));
        match err {
            JobError::Failed(JobFailure::Chunk(failure)) => {
                assert!(failure.reason.contains("nMuon"), "{}", failure.reason);
                assert_eq!(failure.attempts, 1);
            }
            other => panic!("{strategy}: expected a chunk failure, got {other}"),
        }
    }
}

#[tokio::test]
async fn test_best_effort_excludes_and_reports_the_corrupt_chunk() {
    for strategy in Strategy::ALL {
        let args = nano_args(strategy).with_failure_mode(FailureMode::BestEffort);
        let output = run_muons(&broken_fileset(), MuonCutflow::default(), strategy, &args)
            .await
            .unwrap();

        assert!(!output.is_complete());
        assert_eq!(output.failures.len(), 1, "{strategy}");
        assert_eq!(output.failures[0].chunk.dataset, "Broken");
        assert_eq!(output.failures[0].chunk.range.start, 5);
        assert_eq!(output.metrics.chunks_failed, 1);
        assert_eq!(
            output.metrics.chunks_processed + 1,
            output.metrics.chunks_total
        );

        let cutflow = &output.result.cutflow;
        assert_eq!(cutflow["ZJets_pt"], 18);
        assert_eq!(cutflow["Data_mass"], 66);
        assert_eq!(cutflow["Broken_pt"], 5);
        assert_eq!(cutflow["Broken_mass"], 0);
    }
}

#[tokio::test]
async fn test_retries_are_counted() {
    for strategy in Strategy::ALL {
        let args = nano_args(strategy).with_retries(2);
        let err = run_muons(&broken_fileset(), MuonCutflow::default(), strategy, &args)
            .await
            .unwrap_err();
        match err {
            JobError::Failed(JobFailure::Chunk(failure)) => assert_eq!(failure.attempts, 3),
            other => panic!("{strategy}: expected a chunk failure, got {other}"),
        }
    }
}

/// Panics on any chunk from the `Data` dataset
#[derive(Default, Serialize, Deserialize)]
struct PanicOnData;

impl Processor for PanicOnData {
    const NAME: &'static str = "panic_on_data";
    type Output = u64;

    fn process(&self, events: &EventView) -> anyhow::Result<u64> {
        if events.dataset() == "Data" {
            panic!("cannot handle real data");
        }
        Ok(events.len() as u64)
    }
}

#[tokio::test]
async fn test_panics_become_chunk_failures() {
    for strategy in [Strategy::Serial, Strategy::ThreadParallel] {
        let args = ExecutorArgs::default()
            .with_workers(2)
            .with_failure_mode(FailureMode::BestEffort);
        let output = chunkflow::run(&muon_fileset(), "Events", PanicOnData, strategy, &args)
            .await
            .unwrap();
        assert_eq!(output.result, 40, "{strategy}");
        assert_eq!(output.failures.len(), 1);
        assert!(output.failures[0].reason.contains("cannot handle real data"));
    }
}

#[tokio::test]
async fn test_unregistered_processor_is_a_strategy_fault() {
    let args = args_for(Strategy::ProcessParallel, 2);
    let err = chunkflow::run(
        &muon_fileset(),
        "Events",
        PanicOnData,
        Strategy::ProcessParallel,
        &args,
    )
    .await
    .unwrap_err();

    assert!(err.chunk().is_none());
    match err {
        JobError::Failed(JobFailure::Strategy { strategy, reason }) => {
            assert_eq!(strategy, "process_parallel");
            assert!(reason.contains("panic_on_data"), "{reason}");
        }
        other => panic!("Expected a strategy fault, got {other}"),
    }
}

#[tokio::test]
async fn test_resolution_errors_abort_before_dispatch() {
    let missing_file = Fileset::new().with_dataset("ZJets", [sample("nano_missing.json")]);
    let err = run_muons(
        &missing_file,
        MuonCutflow::default(),
        Strategy::Serial,
        &ExecutorArgs::default(),
    )
    .await
    .unwrap_err();
    match err {
        JobError::Resolution(ResolutionError::Open { dataset, path, .. }) => {
            assert_eq!(dataset, "ZJets");
            assert_eq!(path, sample("nano_missing.json"));
        }
        other => panic!("Expected an open error, got {other}"),
    }

    let err = chunkflow::run(
        &muon_fileset(),
        "Runs",
        MuonCutflow::default(),
        Strategy::ThreadParallel,
        &ExecutorArgs::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        JobError::Resolution(ResolutionError::MissingTable { .. })
    ));

    let empty = muon_fileset().with_dataset("Empty", Vec::<std::path::PathBuf>::new());
    let err = run_muons(
        &empty,
        MuonCutflow::default(),
        Strategy::Serial,
        &ExecutorArgs::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(
        match err {
            JobError::Resolution(e) => e.dataset().to_string(),
            other => panic!("Expected a resolution error, got {other}"),
        },
        "Empty"
    );
}

#[tokio::test]
async fn test_configuration_errors_abort_before_dispatch() {
    // the fileset would fail resolution; configuration is checked first
    let unresolvable = Fileset::new().with_dataset("ZJets", [sample("nano_missing.json")]);

    let invalid = [
        (ExecutorArgs::default().with_workers(0), Strategy::ThreadParallel),
        (
            ExecutorArgs::default()
                .with_schema(SchemaKind::NanoAod)
                .with_flatten(true),
            Strategy::Serial,
        ),
        (
            ExecutorArgs::default().with_worker_program(worker_program()),
            Strategy::Serial,
        ),
        (
            ExecutorArgs::default().with_compression(Some(10)),
            Strategy::ProcessParallel,
        ),
    ];
    for (args, strategy) in invalid {
        let err = run_muons(&unresolvable, MuonCutflow::default(), strategy, &args)
            .await
            .unwrap_err();
        assert!(
            matches!(err, JobError::Configuration(_)),
            "{args:?}: expected a configuration error, got {err}"
        );
    }

    assert!(matches!(
        ExecutorArgs::from_options(json!({"workers": 2, "skipbadfiles": true})),
        Err(ConfigurationError::UnknownOption { .. })
    ));
}
