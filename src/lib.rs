pub mod adapter;
pub mod artifact;
pub mod compare;
pub mod config;
pub mod duration;
pub mod engine;
pub mod error;
pub mod holder;
pub mod pool;
pub mod report;
pub mod rng;
pub mod specs;
#[doc(hidden)]
pub mod testing;
pub mod workload;
pub mod zipf;

pub use adapter::{AdapterOptions, ClientType, HostPool, IndexClient, IngestBatch, QueryResult};
pub use artifact::{CommandKind, Query, QueryBenchmark, SoloBenchmark};
pub use compare::{execute_compare, results_equal, Benchmark, Comparison};
pub use engine::{Engine, EngineConfig, RunOutcome};
pub use error::{DxError, DxResult};
pub use holder::{Cif, Holder, Instance};
pub use pool::WorkerPool;
pub use report::{write_report, ReportFormat};
pub use specs::Specs;
