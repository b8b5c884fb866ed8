//! Record/replay store.
//!
//! A first run persists its [`SoloBenchmark`] as JSON under
//! `<data_dir>/<sha256(specs)><suffix>`; the second run against the other instance loads
//! it, replays it and removes it once the comparison has been reported.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::adapter::QueryResult;
use crate::error::{DxError, DxResult};
use crate::holder::Instance;
use crate::specs::Specs;
use crate::workload::IngestParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Ingest,
    Query,
}

impl CommandKind {
    /// File name suffix appended to the workload fingerprint.
    pub fn suffix(self) -> &'static str {
        match self {
            CommandKind::Ingest => "-ingest",
            CommandKind::Query => "-query",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Ingest => write!(f, "ingest"),
            CommandKind::Query => write!(f, "query"),
        }
    }
}

impl FromStr for CommandKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingest" => Ok(CommandKind::Ingest),
            "query" => Ok(CommandKind::Query),
            other => Err(format!("invalid command: {}", other)),
        }
    }
}

/// One executed intersect query.
///
/// `result` is `None` when the query was recorded but its execution failed; the
/// position is kept so replays stay aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub index: String,
    pub field: String,
    pub rows: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResult>,
    #[serde(with = "crate::duration::as_text")]
    pub time: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryBenchmark {
    pub num_queries: usize,
    #[serde(with = "crate::duration::as_text")]
    pub time: Duration,
    #[serde(default)]
    pub queries: Vec<Query>,
}

impl QueryBenchmark {
    pub fn new(num_queries: usize) -> Self {
        Self {
            num_queries,
            time: Duration::ZERO,
            queries: Vec::with_capacity(num_queries),
        }
    }
}

/// Everything one side of a comparison needs to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoloBenchmark {
    #[serde(rename = "type")]
    pub command: CommandKind,
    pub instance: Instance,
    #[serde(alias = "threadcount")]
    pub thread_count: usize,
    #[serde(default)]
    pub num_benchmarks: usize,
    #[serde(default)]
    pub benchmarks: Vec<QueryBenchmark>,
    /// Wall-clock time of the whole run.
    #[serde(default, with = "crate::duration::as_text")]
    pub time: Duration,
    #[serde(default)]
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest: Option<IngestParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl SoloBenchmark {
    pub fn new(command: CommandKind, instance: Instance, thread_count: usize, seed: u64) -> Self {
        Self {
            command,
            instance,
            thread_count,
            num_benchmarks: 0,
            benchmarks: Vec::new(),
            time: Duration::ZERO,
            seed,
            ingest: None,
            created_at: Some(Utc::now()),
        }
    }

    pub fn push(&mut self, bench: QueryBenchmark) {
        self.benchmarks.push(bench);
        self.num_benchmarks = self.benchmarks.len();
    }
}

/// `<hex sha256 of the specs bytes><suffix>`.
pub fn artifact_name(specs: &Specs, command: CommandKind) -> String {
    format!("{}{}", specs.fingerprint(), command.suffix())
}

pub fn artifact_path(data_dir: &Path, specs: &Specs, command: CommandKind) -> PathBuf {
    data_dir.join(artifact_name(specs, command))
}

/// Persist `bench` at `path` via a temporary file in the same directory and a rename.
pub fn write(path: &Path, bench: &SoloBenchmark) -> DxResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let bytes = serde_json::to_vec_pretty(bench)
        .map_err(|e| DxError::Artifact(format!("cannot encode benchmark: {}", e)))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
        DxError::Artifact(format!("cannot create file in {}: {}", dir.display(), e))
    })?;
    tmp.write_all(&bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| DxError::Artifact(format!("cannot write {}: {}", path.display(), e)))?;
    set_shared_permissions(tmp.path())?;
    tmp.persist(path)
        .map_err(|e| DxError::Artifact(format!("cannot write {}: {}", path.display(), e.error)))?;

    tracing::info!("Recorded {} run to {}", bench.command, path.display());
    Ok(())
}

#[cfg(unix)]
fn set_shared_permissions(path: &Path) -> DxResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))
        .map_err(|e| DxError::Artifact(format!("cannot set mode on {}: {}", path.display(), e)))
}

#[cfg(not(unix))]
fn set_shared_permissions(_path: &Path) -> DxResult<()> {
    Ok(())
}

pub fn read(path: &Path) -> DxResult<SoloBenchmark> {
    let bytes = std::fs::read(path)
        .map_err(|e| DxError::Artifact(format!("cannot read {}: {}", path.display(), e)))?;
    let bench: SoloBenchmark = serde_json::from_slice(&bytes)
        .map_err(|e| DxError::Artifact(format!("cannot parse {}: {}", path.display(), e)))?;
    if bench.num_benchmarks > bench.benchmarks.len() {
        return Err(DxError::Artifact(format!(
            "{} lists {} benchmarks but holds {}",
            path.display(),
            bench.num_benchmarks,
            bench.benchmarks.len()
        )));
    }
    Ok(bench)
}

/// Load a recorded run for replay by `command` against `instance`.
pub fn load_for_replay(
    path: &Path,
    command: CommandKind,
    instance: Instance,
) -> DxResult<SoloBenchmark> {
    let bench = read(path)?;
    if bench.command != command {
        return Err(DxError::Artifact(format!(
            "running {}, but previous result in {} was recorded by {}",
            command,
            path.display(),
            bench.command
        )));
    }
    if bench.instance != instance.other() {
        return Err(DxError::Artifact(format!(
            "running on instance {}, but previous result in {} was already recorded on {}",
            instance,
            path.display(),
            bench.instance
        )));
    }
    Ok(bench)
}

pub fn remove(path: &Path) -> DxResult<()> {
    std::fs::remove_file(path).map_err(|e| {
        DxError::Artifact(format!(
            "run succeeded, but previous result {} could not be deleted: {}",
            path.display(),
            e
        ))
    })?;
    tracing::info!("Removed {}", path.display());
    Ok(())
}
