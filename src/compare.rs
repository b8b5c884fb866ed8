//! Differential comparison of two recorded or replayed runs.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::adapter::QueryResult;
use crate::artifact::{self, CommandKind, Query, QueryBenchmark, SoloBenchmark};
use crate::error::{DxError, DxResult};
use crate::holder::Instance;

/// Comparison of one batch (or of a whole ingest run).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Benchmark {
    /// Target query count of the batch; 0 for ingest.
    pub size: usize,
    pub valid_queries: usize,
    pub num_correct: usize,
    #[serde(with = "crate::duration::as_text")]
    pub first_time: Duration,
    #[serde(with = "crate::duration::as_text")]
    pub second_time: Duration,
    /// `(second - first) / first`; positive means the second instance was slower.
    pub time_delta: f64,
    /// `num_correct / valid_queries`, NaN when nothing was valid.
    pub accuracy: f64,
}

/// Report-ready outcome of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub command: CommandKind,
    pub first: Instance,
    pub second: Instance,
    pub benchmarks: Vec<Benchmark>,
}

/// Equality of two query results: multiset equality for two column sets, value
/// equality for two counts, cardinality against count when the shapes differ.
pub fn results_equal(a: &QueryResult, b: &QueryResult) -> bool {
    match (a, b) {
        (QueryResult::ColumnSet { columns: x }, QueryResult::ColumnSet { columns: y }) => {
            if x.len() != y.len() {
                return false;
            }
            let mut x = x.clone();
            let mut y = y.clone();
            x.sort_unstable();
            y.sort_unstable();
            x == y
        }
        (QueryResult::Count(x), QueryResult::Count(y)) => x == y,
        (QueryResult::ColumnSet { columns }, QueryResult::Count(n))
        | (QueryResult::Count(n), QueryResult::ColumnSet { columns }) => {
            columns.len() as u64 == *n
        }
    }
}

/// `(second - first) / first`, NaN when `first` is zero.
pub fn time_delta(first: Duration, second: Duration) -> f64 {
    if first.is_zero() {
        return f64::NAN;
    }
    let first = first.as_nanos() as f64;
    (second.as_nanos() as f64 - first) / first
}

/// How a position that has a recorded result but no replayed one is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReplay {
    /// Still valid, never correct. Used when comparing two artifact files.
    Incorrect,
    /// Not valid. Used by a live replay, where the position was dropped by a failed call.
    Invalid,
}

/// Position-wise comparison of a batch and its replay.
///
/// Positions `0..first.num_queries` are considered. A position without a recorded result
/// is not valid; a valid position without a replayed result counts against accuracy.
/// Times only accumulate over positions present in both runs.
pub fn compare_query_benchmarks(first: &QueryBenchmark, second: &QueryBenchmark) -> Benchmark {
    compare_batches(first, second, MissingReplay::Incorrect)
}

pub fn compare_batches(
    first: &QueryBenchmark,
    second: &QueryBenchmark,
    missing: MissingReplay,
) -> Benchmark {
    let mut valid_queries = 0;
    let mut num_correct = 0;
    let mut first_time = Duration::ZERO;
    let mut second_time = Duration::ZERO;

    for i in 0..first.num_queries {
        let Some((q1, r1)) = with_result(first.queries.get(i)) else {
            continue;
        };
        let Some((q2, r2)) = with_result(second.queries.get(i)) else {
            if missing == MissingReplay::Incorrect {
                valid_queries += 1;
            }
            continue;
        };
        valid_queries += 1;
        if results_equal(r1, r2) {
            num_correct += 1;
        }
        first_time += q1.time;
        second_time += q2.time;
    }

    let accuracy = if valid_queries == 0 {
        f64::NAN
    } else {
        num_correct as f64 / valid_queries as f64
    };

    Benchmark {
        size: first.num_queries,
        valid_queries,
        num_correct,
        first_time,
        second_time,
        time_delta: time_delta(first_time, second_time),
        accuracy,
    }
}

fn with_result(query: Option<&Query>) -> Option<(&Query, &QueryResult)> {
    let query = query?;
    query.result.as_ref().map(|r| (query, r))
}

pub fn compare_ingest(first: &SoloBenchmark, second: &SoloBenchmark) -> Benchmark {
    Benchmark {
        size: 0,
        valid_queries: 0,
        num_correct: 0,
        first_time: first.time,
        second_time: second.time,
        time_delta: time_delta(first.time, second.time),
        accuracy: f64::NAN,
    }
}

/// Compare two recorded runs of the same kind. Query runs are compared batch by batch
/// up to the shorter run's batch count.
pub fn compare_solo(first: &SoloBenchmark, second: &SoloBenchmark) -> DxResult<Comparison> {
    compare_runs(first, second, MissingReplay::Incorrect)
}

/// Compare a recording with its live replay; positions the replay dropped are not valid.
pub fn compare_replay(recorded: &SoloBenchmark, replayed: &SoloBenchmark) -> DxResult<Comparison> {
    compare_runs(recorded, replayed, MissingReplay::Invalid)
}

fn compare_runs(
    first: &SoloBenchmark,
    second: &SoloBenchmark,
    missing: MissingReplay,
) -> DxResult<Comparison> {
    if first.command != second.command {
        return Err(DxError::Artifact(format!(
            "cannot compare results of different kinds: {} and {}",
            first.command, second.command
        )));
    }

    let benchmarks = match first.command {
        CommandKind::Ingest => vec![compare_ingest(first, second)],
        CommandKind::Query => {
            let total = first.num_benchmarks.min(second.num_benchmarks);
            first
                .benchmarks
                .iter()
                .zip(&second.benchmarks)
                .take(total)
                .map(|(a, b)| compare_batches(a, b, missing))
                .collect()
        }
    };

    Ok(Comparison {
        command: first.command,
        first: first.instance,
        second: second.instance,
        benchmarks,
    })
}

/// Compare two artifact files without contacting any instance.
pub fn execute_compare(file1: &Path, file2: &Path) -> DxResult<Comparison> {
    for file in [file1, file2] {
        if !file.is_file() {
            return Err(DxError::Config(format!("{} does not exist", file.display())));
        }
    }
    let first = artifact::read(file1)?;
    let second = artifact::read(file2)?;
    compare_solo(&first, &second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set(columns: &[u64]) -> Option<QueryResult> {
        Some(QueryResult::ColumnSet {
            columns: columns.to_vec(),
        })
    }

    fn query(result: Option<QueryResult>, micros: u64) -> Query {
        Query {
            index: "i1".into(),
            field: "f1".into(),
            rows: vec![1, 2],
            result,
            time: Duration::from_micros(micros),
        }
    }

    fn batch(queries: Vec<Query>) -> QueryBenchmark {
        QueryBenchmark {
            num_queries: queries.len(),
            time: queries.iter().map(|q| q.time).sum(),
            queries,
        }
    }

    #[test]
    fn test_results_equal_rules() {
        let a = QueryResult::ColumnSet { columns: vec![3, 1, 2, 2] };
        let b = QueryResult::ColumnSet { columns: vec![2, 1, 2, 3] };
        let c = QueryResult::ColumnSet { columns: vec![1, 2, 3, 3] };
        assert!(results_equal(&a, &b));
        assert!(!results_equal(&a, &c));
        assert!(results_equal(&QueryResult::Count(4), &QueryResult::Count(4)));
        assert!(!results_equal(&QueryResult::Count(4), &QueryResult::Count(5)));
        assert!(results_equal(&a, &QueryResult::Count(4)));
        assert!(results_equal(&QueryResult::Count(4), &c));
        assert!(!results_equal(&QueryResult::Count(3), &a));
    }

    #[test]
    fn test_cardinality_match_counts_as_correct() {
        let first = batch(vec![query(set(&[10, 11, 12, 13, 14]), 100)]);
        let second = batch(vec![query(Some(QueryResult::Count(5)), 100)]);
        let bench = compare_query_benchmarks(&first, &second);
        assert_eq!(bench.num_correct, 1);
        assert_eq!(bench.accuracy, 1.0);
    }

    #[test]
    fn test_missing_positions() {
        let first = batch(vec![
            query(set(&[1]), 100),
            query(None, 100),
            query(set(&[2]), 100),
            query(set(&[3]), 100),
        ]);
        let second = batch(vec![
            query(set(&[1]), 150),
            query(set(&[9]), 150),
            query(None, 150),
            query(set(&[4]), 150),
        ]);
        let bench = compare_query_benchmarks(&first, &second);
        assert_eq!(bench.size, 4);
        assert_eq!(bench.valid_queries, 3);
        assert_eq!(bench.num_correct, 1);
        assert!((bench.accuracy - 1.0 / 3.0).abs() < 1e-12);
        // positions 0 and 3 only
        assert_eq!(bench.first_time, Duration::from_micros(200));
        assert_eq!(bench.second_time, Duration::from_micros(300));
        assert!((bench.time_delta - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_live_replay_drops_are_not_valid() {
        let first = batch(vec![query(set(&[1]), 10), query(set(&[2]), 10)]);
        let second = batch(vec![query(set(&[1]), 10), query(None, 0)]);
        let bench = compare_batches(&first, &second, MissingReplay::Invalid);
        assert_eq!(bench.valid_queries, 1);
        assert_eq!(bench.accuracy, 1.0);
        let bench = compare_batches(&first, &second, MissingReplay::Incorrect);
        assert_eq!(bench.valid_queries, 2);
        assert_eq!(bench.accuracy, 0.5);
    }

    #[test]
    fn test_short_replay_is_tolerated() {
        let first = batch(vec![query(set(&[1]), 10), query(set(&[2]), 10)]);
        let second = batch(vec![query(set(&[1]), 10)]);
        let bench = compare_query_benchmarks(&first, &second);
        assert_eq!(bench.valid_queries, 2);
        assert_eq!(bench.num_correct, 1);
        assert_eq!(bench.accuracy, 0.5);
    }

    #[test]
    fn test_no_valid_queries_gives_nan() {
        let first = batch(vec![query(None, 1), query(None, 1)]);
        let bench = compare_query_benchmarks(&first, &first.clone());
        assert_eq!(bench.valid_queries, 0);
        assert!(bench.accuracy.is_nan());
        assert!(bench.time_delta.is_nan());
        let json = serde_json::to_value(&bench).unwrap();
        assert!(json["accuracy"].is_null());
    }

    #[test]
    fn test_ingest_delta() {
        let mut first = SoloBenchmark::new(CommandKind::Ingest, Instance::Candidate, 1, 1);
        first.time = Duration::from_secs(1);
        let mut second = SoloBenchmark::new(CommandKind::Ingest, Instance::Primary, 1, 1);
        second.time = Duration::from_millis(1_250);
        let cmp = compare_solo(&first, &second).unwrap();
        assert_eq!(cmp.benchmarks.len(), 1);
        assert_eq!(cmp.benchmarks[0].time_delta, 0.25);
        assert_eq!(cmp.first, Instance::Candidate);
    }

    #[test]
    fn test_kinds_must_match() {
        let a = SoloBenchmark::new(CommandKind::Ingest, Instance::Candidate, 1, 1);
        let b = SoloBenchmark::new(CommandKind::Query, Instance::Primary, 1, 1);
        let err = compare_solo(&a, &b).unwrap_err();
        assert!(err.to_string().contains("different kinds"));
    }

    #[test]
    fn test_batches_compared_up_to_shorter_run() {
        let mut a = SoloBenchmark::new(CommandKind::Query, Instance::Candidate, 1, 1);
        a.push(batch(vec![query(set(&[1]), 1)]));
        a.push(batch(vec![query(set(&[1]), 1)]));
        let mut b = SoloBenchmark::new(CommandKind::Query, Instance::Primary, 1, 1);
        b.push(batch(vec![query(set(&[1]), 1)]));
        assert_eq!(compare_solo(&a, &b).unwrap().benchmarks.len(), 1);
    }

    #[test]
    fn test_execute_compare_missing_file() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("present-query");
        artifact::write(
            &present,
            &SoloBenchmark::new(CommandKind::Query, Instance::Candidate, 1, 1),
        )
        .unwrap();
        let err = execute_compare(&present, &dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, DxError::Config(_)));
    }
}
