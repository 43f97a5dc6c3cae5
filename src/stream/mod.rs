//! Columnar query results
//!
//! * `RecordBatch` / `Schema`: Arrow's in-memory columnar model
//! * `ResultStream`: async stream of batches for one query
//! * `BatchReader`: batch-at-a-time cursor with by-name column access

mod reader;
mod result_stream;

pub use arrow_array::{ArrayRef, RecordBatch};
pub use arrow_schema::{DataType, Field, Schema, SchemaRef};
pub use reader::BatchReader;
pub use result_stream::{ResultStream, DEFAULT_BATCH_BUFFER};
