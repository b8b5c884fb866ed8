//! Common test utilities for solo run tests
//!
//! Provides shared helpers for:
//! - An in-memory bitmap index standing in for a remote deployment
//! - Building holders and engines over it
//! - Parsing specs documents inline

#![allow(dead_code)]

use std::sync::Arc;

use dxbench::{Engine, EngineConfig, Holder, Instance, ReportFormat, Specs};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub use dxbench::testing::MockIndex;

pub const SPECS: &str = r#"
[[indexes]]
name = "i1"
columns = 64
[[indexes.fields]]
name = "f1"
min = 0
max = 99
cardinality = 500
"#;

pub fn specs(doc: &str) -> Specs {
    Specs::parse(doc.as_bytes().to_vec()).expect("Failed to parse specs")
}

pub fn engine_config(dir: &TempDir, threads: usize) -> EngineConfig {
    EngineConfig {
        data_dir: dir.path().to_path_buf(),
        threads,
        seed: 42,
        format: ReportFormat::Json,
    }
}

pub async fn create_test_engine(
    instance: Instance,
    index: Arc<MockIndex>,
    doc: &str,
    config: EngineConfig,
) -> Engine {
    create_cancellable_engine(instance, index, doc, config, CancellationToken::new()).await
}

pub async fn create_cancellable_engine(
    instance: Instance,
    index: Arc<MockIndex>,
    doc: &str,
    config: EngineConfig,
    cancel: CancellationToken,
) -> Engine {
    let specs = specs(doc);
    let holder = Holder::build(instance, index, &specs)
        .await
        .expect("Failed to build holder");
    Engine::new(Arc::new(holder), specs, config, cancel)
}
