//! Two-phase solo runs.
//!
//! The first invocation for a `(specs, command)` pair records its workload and results
//! as an artifact. The next invocation, against the other instance, replays the
//! recording, reports the comparison and removes the artifact.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::adapter::{IndexClient, IngestBatch};
use crate::artifact::{self, CommandKind, Query, QueryBenchmark, SoloBenchmark};
use crate::compare::{self, Comparison};
use crate::error::{DxError, DxResult};
use crate::holder::{Holder, Instance};
use crate::pool::WorkerPool;
use crate::report::{self, ReportFormat};
use crate::rng::derive_seed;
use crate::specs::Specs;
use crate::workload::{specs_ingest, IngestParams, QueryGenerator, QueryTask};

/// Run-wide settings shared by both commands.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub threads: usize,
    pub seed: u64,
    pub format: ReportFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            threads: 1,
            seed: 1,
            format: ReportFormat::Table,
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// First run: the artifact written.
    Recorded(PathBuf),
    /// Second run: the reported comparison. The artifact is gone.
    Compared(Comparison),
    /// Second run: the comparison was reported, but the artifact could not be removed
    /// and a later invocation would replay it again.
    StaleArtifact { comparison: Comparison, error: DxError },
}

pub struct Engine {
    holder: Arc<Holder>,
    specs: Specs,
    config: EngineConfig,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(holder: Arc<Holder>, specs: Specs, config: EngineConfig, cancel: CancellationToken) -> Self {
        Self {
            holder,
            specs,
            config,
            cancel,
        }
    }

    pub fn instance(&self) -> Instance {
        self.holder.instance()
    }

    pub fn artifact_path(&self, command: CommandKind) -> PathBuf {
        artifact::artifact_path(&self.config.data_dir, &self.specs, command)
    }

    /// Record or replay random intersect queries, one batch per entry of `batch_sizes`.
    pub async fn run_query<W: Write>(
        &self,
        batch_sizes: &[usize],
        num_rows: usize,
        out: &mut W,
    ) -> DxResult<RunOutcome> {
        let path = self.artifact_path(CommandKind::Query);
        if !path.exists() {
            tracing::info!(
                "No recorded query run for these specs, recording on {}",
                self.instance()
            );
            let bench = self.record_queries(batch_sizes, num_rows).await?;
            artifact::write(&path, &bench)?;
            return Ok(RunOutcome::Recorded(path));
        }

        let recorded = artifact::load_for_replay(&path, CommandKind::Query, self.instance())?;
        tracing::info!(
            "Replaying {} query batches recorded on {} ({} workers)",
            recorded.benchmarks.len(),
            recorded.instance,
            recorded.thread_count
        );
        let replayed = self.replay_queries(&recorded).await?;
        let comparison = compare::compare_replay(&recorded, &replayed)?;
        self.finish_replay(&path, comparison, out)
    }

    /// Record or replay the ingest workload implied by the specs.
    pub async fn run_ingest<W: Write>(
        &self,
        params: &IngestParams,
        out: &mut W,
    ) -> DxResult<RunOutcome> {
        let path = self.artifact_path(CommandKind::Ingest);
        if !path.exists() {
            tracing::info!(
                "No recorded ingest run for these specs, recording on {}",
                self.instance()
            );
            let mut bench = SoloBenchmark::new(
                CommandKind::Ingest,
                self.instance(),
                self.config.threads,
                self.config.seed,
            );
            bench.time = self
                .ingest(self.config.threads, self.config.seed, params)
                .await?;
            bench.ingest = Some(*params);
            artifact::write(&path, &bench)?;
            return Ok(RunOutcome::Recorded(path));
        }

        let recorded = artifact::load_for_replay(&path, CommandKind::Ingest, self.instance())?;
        let params = recorded.ingest.unwrap_or(*params);
        tracing::info!(
            "Replaying ingest recorded on {} (seed {}, {} workers)",
            recorded.instance,
            recorded.seed,
            recorded.thread_count
        );
        let mut replayed = SoloBenchmark::new(
            CommandKind::Ingest,
            self.instance(),
            recorded.thread_count,
            recorded.seed,
        );
        replayed.time = self
            .ingest(recorded.thread_count, recorded.seed, &params)
            .await?;
        replayed.ingest = Some(params);
        let comparison = compare::compare_replay(&recorded, &replayed)?;
        self.finish_replay(&path, comparison, out)
    }

    fn finish_replay<W: Write>(
        &self,
        path: &Path,
        comparison: Comparison,
        out: &mut W,
    ) -> DxResult<RunOutcome> {
        report::write_report(out, &comparison, self.config.format)?;
        match artifact::remove(path) {
            Ok(()) => Ok(RunOutcome::Compared(comparison)),
            Err(error) => {
                tracing::warn!("{}", error);
                Ok(RunOutcome::StaleArtifact { comparison, error })
            }
        }
    }

    async fn record_queries(
        &self,
        batch_sizes: &[usize],
        num_rows: usize,
    ) -> DxResult<SoloBenchmark> {
        let started = Instant::now();
        let mut solo = SoloBenchmark::new(
            CommandKind::Query,
            self.instance(),
            self.config.threads,
            self.config.seed,
        );
        let pool = WorkerPool::new(self.config.threads, self.cancel.clone());

        for (i, &num_queries) in batch_sizes.iter().enumerate() {
            let generator = QueryGenerator::new(
                self.holder.clone(),
                derive_seed(self.config.seed, i as u64),
                num_rows,
            )?;
            let client = self.holder.client().clone();
            let mut run = pool.run(generator.take(num_queries), move |task: QueryTask| {
                let client = client.clone();
                async move { record_one(client.as_ref(), task).await }
            });

            let mut slots: Vec<Option<Query>> = vec![None; num_queries];
            while let Some((position, query)) = run.recv().await {
                slots[position] = Some(query);
            }
            run.finish().await?;

            let mut bench = QueryBenchmark::new(num_queries);
            bench.queries = slots.into_iter().flatten().collect();
            bench.time = bench.queries.iter().map(|q| q.time).sum();
            tracing::info!(
                "Recorded batch {} ({} queries) in {}",
                i,
                bench.queries.len(),
                crate::duration::format(bench.time)
            );
            solo.push(bench);
        }

        solo.time = started.elapsed();
        Ok(solo)
    }

    async fn replay_queries(&self, recorded: &SoloBenchmark) -> DxResult<SoloBenchmark> {
        let started = Instant::now();
        let mut solo = SoloBenchmark::new(
            CommandKind::Query,
            self.instance(),
            recorded.thread_count,
            recorded.seed,
        );
        let pool = WorkerPool::new(recorded.thread_count, self.cancel.clone());

        for (i, bench) in recorded.benchmarks.iter().enumerate() {
            let holder = self.holder.clone();
            let mut run = pool.run(bench.queries.clone(), move |query: Query| {
                let holder = holder.clone();
                async move { replay_one(&holder, query).await }
            });

            let mut slots: Vec<Option<Query>> = vec![None; bench.queries.len()];
            while let Some((position, query)) = run.recv().await {
                slots[position] = Some(query);
            }
            let summary = run.finish().await?;
            if summary.dropped > 0 {
                tracing::warn!("Batch {}: {} queries failed on replay", i, summary.dropped);
            }

            let mut replayed = QueryBenchmark::new(bench.num_queries);
            replayed.queries = slots
                .into_iter()
                .zip(&bench.queries)
                .map(|(slot, original)| slot.unwrap_or_else(|| failed(original)))
                .collect();
            replayed.time = replayed.queries.iter().map(|q| q.time).sum();
            solo.push(replayed);
        }

        solo.time = started.elapsed();
        Ok(solo)
    }

    /// Push the deterministic ingest workload through the pool; returns wall-clock time.
    async fn ingest(&self, threads: usize, seed: u64, params: &IngestParams) -> DxResult<Duration> {
        let batches = specs_ingest(&self.specs, seed, params)?;
        tracing::info!(
            "Ingesting {} bits in {} batches on {}",
            batches.total_bits(),
            batches.batch_count(),
            self.instance()
        );

        let started = Instant::now();
        let pool = WorkerPool::new(threads, self.cancel.clone());
        let client = self.holder.client().clone();
        let mut run = pool.run(batches, move |batch: IngestBatch| {
            let client = client.clone();
            async move { client.ingest_batch(&batch).await }
        });
        while run.recv().await.is_some() {}
        let summary = run.finish().await?;
        let elapsed = started.elapsed();

        if summary.dropped > 0 {
            tracing::warn!("{} ingest batches failed", summary.dropped);
        }
        tracing::info!("Ingest finished in {}", crate::duration::format(elapsed));
        Ok(elapsed)
    }
}

/// Failed first-run queries stay in the record without a result.
async fn record_one(client: &dyn IndexClient, task: QueryTask) -> DxResult<Query> {
    let outcome = client.execute_query(&task.index, &task.pql()).await;
    let (result, time) = match outcome {
        Ok((result, time)) => (Some(result), time),
        Err(e) if e.is_transient() => {
            tracing::warn!(index = %task.index, field = %task.field, "query failed: {}", e);
            (None, Duration::ZERO)
        }
        Err(e) => return Err(e),
    };
    Ok(Query {
        index: task.index,
        field: task.field,
        rows: task.rows,
        result,
        time,
    })
}

async fn replay_one(holder: &Holder, query: Query) -> DxResult<Query> {
    let cif = holder
        .new_cif(&query.index, &query.field)
        .map_err(|e| DxError::transient(e.to_string()))?;
    let pql = index_client::render_intersect(&cif.field, &query.rows);
    let (result, time) = holder.client().execute_query(&cif.index, &pql).await?;
    Ok(Query {
        result: Some(result),
        time,
        ..query
    })
}

fn failed(original: &Query) -> Query {
    Query {
        result: None,
        time: Duration::ZERO,
        ..original.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockIndex;
    use tempfile::TempDir;

    const SPECS: &str = r#"
[[indexes]]
name = "i1"
columns = 50
[[indexes.fields]]
name = "f1"
max = 9
cardinality = 200
"#;

    async fn engine(
        instance: Instance,
        index: Arc<MockIndex>,
        dir: &TempDir,
    ) -> Engine {
        let specs = Specs::parse(SPECS.as_bytes().to_vec()).unwrap();
        let holder = Holder::build(instance, index, &specs).await.unwrap();
        Engine::new(
            Arc::new(holder),
            specs,
            EngineConfig {
                data_dir: dir.path().to_path_buf(),
                threads: 2,
                seed: 42,
                format: ReportFormat::Json,
            },
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_query_record_then_replay() {
        let dir = TempDir::new().unwrap();
        let index = MockIndex::new();
        for row in 0..10 {
            for col in 0..5 {
                index.set_bit("i1", "f1", row, col + row);
            }
        }

        let first = engine(Instance::Candidate, index.clone(), &dir).await;
        let mut out = Vec::new();
        let path = match first.run_query(&[8, 4], 2, &mut out).await.unwrap() {
            RunOutcome::Recorded(path) => path,
            other => panic!("expected a recording, got {:?}", other),
        };
        assert!(path.exists());
        assert!(out.is_empty());
        let recorded = artifact::read(&path).unwrap();
        assert_eq!(recorded.num_benchmarks, 2);
        assert_eq!(recorded.benchmarks[0].queries.len(), 8);
        assert!(recorded.benchmarks[0].queries.iter().all(|q| q.result.is_some()));

        let second = engine(Instance::Primary, index, &dir).await;
        let cmp = match second.run_query(&[8, 4], 2, &mut out).await.unwrap() {
            RunOutcome::Compared(cmp) => cmp,
            other => panic!("expected a comparison, got {:?}", other),
        };
        assert!(!path.exists());
        assert_eq!(cmp.benchmarks.len(), 2);
        assert!(cmp.benchmarks.iter().all(|b| b.accuracy == 1.0));
        assert!(!out.is_empty());
    }

    #[tokio::test]
    async fn test_same_instance_cannot_replay() {
        let dir = TempDir::new().unwrap();
        let index = MockIndex::new();
        let first = engine(Instance::Primary, index.clone(), &dir).await;
        let mut out = Vec::new();
        first.run_query(&[3], 1, &mut out).await.unwrap();

        let again = engine(Instance::Primary, index, &dir).await;
        let err = again.run_query(&[3], 1, &mut out).await.unwrap_err();
        assert!(matches!(err, DxError::Artifact(_)));
        // left in place for a retry on the right instance
        assert!(again.artifact_path(CommandKind::Query).exists());
    }

    #[tokio::test]
    async fn test_ingest_record_then_replay() {
        let dir = TempDir::new().unwrap();
        let candidate_index = MockIndex::new();
        let primary_index = MockIndex::new();

        let first = engine(Instance::Candidate, candidate_index, &dir).await;
        let mut out = Vec::new();
        let params = IngestParams {
            batch_size: 64,
            ..Default::default()
        };
        assert!(matches!(
            first.run_ingest(&params, &mut out).await.unwrap(),
            RunOutcome::Recorded(_)
        ));
        let recorded = artifact::read(&first.artifact_path(CommandKind::Ingest)).unwrap();
        assert_eq!(recorded.ingest, Some(params));
        assert_eq!(recorded.seed, 42);

        let second = engine(Instance::Primary, primary_index.clone(), &dir).await;
        let outcome = second.run_ingest(&IngestParams::default(), &mut out).await.unwrap();
        let RunOutcome::Compared(cmp) = outcome else {
            panic!("expected a comparison");
        };
        assert_eq!(cmp.command, CommandKind::Ingest);
        assert_eq!(cmp.first, Instance::Candidate);
        assert!(!second.artifact_path(CommandKind::Ingest).exists());
    }
}
