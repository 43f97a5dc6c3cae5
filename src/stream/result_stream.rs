//! Streaming query results
//!
//! A background task owns the connection lock for the lifetime of one result
//! and forwards batches through a bounded channel, so a slow consumer applies
//! backpressure to the socket. If the consumer drops the stream early the task
//! keeps reading until the server reports completion; the shared connection
//! must end up positioned at a frame boundary for the next RPC.

use crate::metrics::{counters, histograms, labels};
use crate::session::registry::{ConnectionSlot, InFlight, TransportHandle};
use crate::session::with_timeout;
use crate::stream::{RecordBatch, SchemaRef};
use crate::Result;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, OwnedMutexGuard};

/// Batches buffered between the reader task and the consumer
pub const DEFAULT_BATCH_BUFFER: usize = 16;

/// Lazy stream of record batches for one query
pub struct ResultStream {
    schema: SchemaRef,
    receiver: mpsc::Receiver<Result<RecordBatch>>,
}

impl ResultStream {
    /// Start reading the result that `slot` has just begun
    pub(crate) fn spawn(
        schema: SchemaRef,
        handle: Arc<TransportHandle>,
        slot: OwnedMutexGuard<ConnectionSlot>,
        timeout: Option<Duration>,
        started: Instant,
    ) -> Self {
        let (tx, rx) = mpsc::channel(DEFAULT_BATCH_BUFFER);
        tokio::spawn(read_batches(handle, slot, tx, timeout, started));
        Self {
            schema,
            receiver: rx,
        }
    }

    /// Build a stream over batches that are already in memory
    pub fn from_batches(schema: SchemaRef, batches: Vec<Result<RecordBatch>>) -> Self {
        let (tx, rx) = mpsc::channel(batches.len().max(1));
        for batch in batches {
            // Capacity covers every batch, so this never fails
            let _ = tx.try_send(batch);
        }
        Self {
            schema,
            receiver: rx,
        }
    }

    /// Schema of every batch in this result
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Read the whole result into memory
    pub async fn collect_batches(mut self) -> Result<Vec<RecordBatch>> {
        let mut batches = Vec::new();
        while let Some(batch) = self.receiver.recv().await {
            batches.push(batch?);
        }
        Ok(batches)
    }
}

impl Stream for ResultStream {
    type Item = Result<RecordBatch>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl std::fmt::Debug for ResultStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream")
            .field("columns", &self.schema.fields().len())
            .finish()
    }
}

async fn read_batches(
    handle: Arc<TransportHandle>,
    mut slot: OwnedMutexGuard<ConnectionSlot>,
    tx: mpsc::Sender<Result<RecordBatch>>,
    timeout: Option<Duration>,
    started: Instant,
) {
    let mut delivering = true;
    let mut total_rows = 0u64;

    let status = loop {
        let mut rpc = InFlight::new(&handle, &mut slot);
        let next = match rpc.connection() {
            Ok(conn) => with_timeout(timeout, conn.next_batch()).await,
            Err(e) => Err(e),
        };
        let next = rpc.finish(next);

        match next {
            Ok(Some(batch)) => {
                let rows = batch.num_rows() as u64;
                total_rows += rows;
                counters::batch_received(rows);
                if delivering && tx.send(Ok(batch)).await.is_err() {
                    tracing::debug!("result stream dropped, draining remaining batches");
                    delivering = false;
                }
            }
            Ok(None) => {
                break if delivering {
                    labels::STATUS_OK
                } else {
                    labels::STATUS_CANCELLED
                };
            }
            Err(e) => {
                counters::query_error(e.category());
                tracing::debug!(error = %e, "query failed while reading results");
                if delivering {
                    let _ = tx.send(Err(e)).await;
                }
                break labels::STATUS_ERROR;
            }
        }
    };

    histograms::query_duration(started.elapsed().as_millis() as u64);
    counters::query_completed(status);
    tracing::debug!(rows = total_rows, status, "result finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{DataType, Field, Schema};
    use crate::Error;
    use arrow_array::Int64Array;
    use futures::StreamExt;

    fn batch(values: Vec<Option<i64>>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, true)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    #[tokio::test]
    async fn test_from_batches_yields_in_order() {
        let first = batch(vec![Some(1)]);
        let schema = first.schema().clone();
        let mut stream = ResultStream::from_batches(
            schema,
            vec![Ok(first), Ok(batch(vec![Some(2), None]))],
        );

        assert_eq!(stream.next().await.unwrap().unwrap().num_rows(), 1);
        assert_eq!(stream.next().await.unwrap().unwrap().num_rows(), 2);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_collect_batches_surfaces_error() {
        let first = batch(vec![Some(1)]);
        let schema = first.schema().clone();
        let stream = ResultStream::from_batches(
            schema,
            vec![Ok(first), Err(Error::Query("division by zero".into()))],
        );
        let err = stream.collect_batches().await.unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }
}
