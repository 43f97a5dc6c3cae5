//! Batch-at-a-time cursor over a result

use super::{ArrayRef, RecordBatch, ResultStream, SchemaRef};
use crate::Result;
use futures::StreamExt;

/// Cursor exposing one batch at a time, column by column.
///
/// ```ignore
/// let mut reader = BatchReader::new(session.query(sql).await?);
/// while reader.load_next_batch().await? > 0 {
///     let cities = reader.get_vector("origin_city").unwrap().as_string::<i32>();
///     // ...
/// }
/// ```
#[derive(Debug)]
pub struct BatchReader {
    stream: ResultStream,
    current: Option<RecordBatch>,
}

impl BatchReader {
    /// Wrap a result stream
    pub fn new(stream: ResultStream) -> Self {
        Self {
            stream,
            current: None,
        }
    }

    /// Schema of the result
    pub fn schema(&self) -> &SchemaRef {
        self.stream.schema()
    }

    /// Advance to the next non-empty batch.
    ///
    /// Returns its row count, or 0 once the result is exhausted. Empty batches
    /// are skipped so that 0 always means the end.
    pub async fn load_next_batch(&mut self) -> Result<usize> {
        loop {
            match self.stream.next().await {
                Some(Ok(batch)) => {
                    let rows = batch.num_rows();
                    self.current = Some(batch);
                    if rows > 0 {
                        return Ok(rows);
                    }
                }
                Some(Err(e)) => {
                    self.current = None;
                    return Err(e);
                }
                None => {
                    self.current = None;
                    return Ok(0);
                }
            }
        }
    }

    /// Named column of the current batch, `None` before the first batch,
    /// after the last one, or for an unknown name
    pub fn get_vector(&self, name: &str) -> Option<&ArrayRef> {
        self.current.as_ref()?.column_by_name(name)
    }

    /// The current batch
    pub fn current(&self) -> Option<&RecordBatch> {
        self.current.as_ref()
    }
}

impl From<ResultStream> for BatchReader {
    fn from(stream: ResultStream) -> Self {
        Self::new(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{DataType, Field, Schema};
    use crate::Error;
    use arrow_array::cast::AsArray;
    use arrow_array::types::Int64Type;
    use arrow_array::Int64Array;
    use std::sync::Arc;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, true)]))
    }

    fn batch(values: Vec<Option<i64>>) -> RecordBatch {
        RecordBatch::try_new(schema(), vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    #[tokio::test]
    async fn test_skips_empty_batches() {
        let stream = ResultStream::from_batches(
            schema(),
            vec![Ok(batch(vec![Some(1)])), Ok(batch(vec![])), Ok(batch(vec![Some(2), Some(3)]))],
        );
        let mut reader = BatchReader::new(stream);

        assert_eq!(reader.load_next_batch().await.unwrap(), 1);
        assert_eq!(reader.get_vector("n").unwrap().as_primitive::<Int64Type>().value(0), 1);
        assert_eq!(reader.load_next_batch().await.unwrap(), 2);
        assert_eq!(reader.get_vector("n").unwrap().as_primitive::<Int64Type>().value(1), 3);
        assert!(reader.get_vector("missing").is_none());
        assert_eq!(reader.load_next_batch().await.unwrap(), 0);
        assert!(reader.get_vector("n").is_none());
    }

    #[tokio::test]
    async fn test_error_clears_current_batch() {
        let stream = ResultStream::from_batches(
            schema(),
            vec![Ok(batch(vec![Some(1)])), Err(Error::ConnectionClosed)],
        );
        let mut reader = BatchReader::new(stream);

        reader.load_next_batch().await.unwrap();
        assert!(reader.current().is_some());
        assert!(reader.load_next_batch().await.is_err());
        assert!(reader.current().is_none());
    }
}
