//! Common test utilities and helpers
#![allow(dead_code)]

use chunkflow::processor::MuonOutput;
use chunkflow::{Cutflow, ExecutorArgs, Fileset, JobError, JobOutput, Processor, Strategy};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Path of a fixture under `tests/samples`
pub fn sample(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("samples")
        .join(name)
}

/// The built binary, used as the process-parallel worker program
pub fn worker_program() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_chunkflow"))
}

/// Drell-Yan and dimuon samples, one file each
pub fn muon_fileset() -> Fileset {
    Fileset::new()
        .with_dataset("ZJets", [sample("nano_dy.json")])
        .with_dataset("Data", [sample("nano_dimuon.json")])
}

pub fn expected_cutflow() -> Cutflow {
    Cutflow::from([
        ("ZJets_pt".to_string(), 18),
        ("ZJets_mass".to_string(), 6),
        ("Data_pt".to_string(), 84),
        ("Data_mass".to_string(), 66),
    ])
}

/// Options for `strategy`, pointing process workers at the built binary
pub fn args_for(strategy: Strategy, workers: usize) -> ExecutorArgs {
    let args = ExecutorArgs::default().with_workers(workers);
    match strategy {
        Strategy::ProcessParallel => args.with_worker_program(worker_program()),
        _ => args,
    }
}

pub async fn run_muons<P>(
    fileset: &Fileset,
    processor: P,
    strategy: Strategy,
    args: &ExecutorArgs,
) -> Result<JobOutput<MuonOutput>, JobError>
where
    P: Processor<Output = MuonOutput>,
{
    chunkflow::run(fileset, "Events", processor, strategy, args).await
}

/// Write a fileset JSON file into `dir`
pub fn write_fileset(dir: &TempDir, fileset: &Fileset) -> PathBuf {
    let path = dir.path().join("fileset.json");
    std::fs::write(&path, serde_json::to_string_pretty(fileset).unwrap()).unwrap();
    path
}
