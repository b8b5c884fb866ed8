mod error;
mod pql;
mod response;
mod types;

pub use error::DriverError;
pub use pql::{render_intersect, render_mutations};
pub use response::QueryResponse;
pub use types::{Bit, ContentType, FieldOptions, QueryRequest, QueryResult};
