//! Bitmap-index HTTP client
//!
//! Thin async client for a bitmap-index service speaking PQL over HTTP. It covers the
//! handful of calls the dxbench harness needs: idempotent schema creation, query
//! execution and bulk bit mutation.
//!
//! # Example
//!
//! ```rust,no_run
//! use index_client::{ContentType, IndexClientBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), index_client::DriverError> {
//!     let client = IndexClientBuilder::new("localhost:10101")
//!         .content_type(ContentType::Textual)
//!         .timeout_ms(5_000)
//!         .build()?;
//!
//!     client.ensure_index("i1").await?;
//!     client.ensure_field("i1", "f1", &Default::default()).await?;
//!     let result = client.query("i1", "Intersect(Row(f1=1), Row(f1=2))").await?;
//!     println!("{:?}", result);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod protocol;

pub use client::{HttpClient, IndexClientBuilder};
pub use protocol::{
    render_intersect, render_mutations, Bit, ContentType, DriverError, FieldOptions, QueryResponse,
    QueryResult,
};
