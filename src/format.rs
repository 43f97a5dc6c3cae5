//! Plain-text table rendering for query results

use crate::stream::{BatchReader, ResultStream};
use crate::Result;
use arrow_cast::display::{ArrayFormatter, FormatOptions};

/// Default cell delimiter
pub const DEFAULT_DELIMITER: &str = ", ";

/// Renders a result as delimited text: one header line of column names, then
/// one line per row. Null cells render empty.
#[derive(Debug, Clone)]
pub struct ResultFormatter {
    delimiter: String,
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }
}

impl ResultFormatter {
    /// Formatter using `", "` between cells
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `delimiter` between cells
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Drain `reader` into a table
    pub async fn format(&self, reader: &mut BatchReader) -> Result<String> {
        let names: Vec<String> = reader
            .schema()
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect();
        let mut lines = vec![names.join(&self.delimiter)];
        let options = FormatOptions::default().with_null("");

        loop {
            let rows = reader.load_next_batch().await?;
            if rows == 0 {
                break;
            }
            let columns = names
                .iter()
                .map(|name| {
                    reader
                        .get_vector(name)
                        .map(|array| ArrayFormatter::try_new(array.as_ref(), &options))
                        .transpose()
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for row in 0..rows {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|column| {
                        column
                            .as_ref()
                            .map(|formatter| formatter.value(row).to_string())
                            .unwrap_or_default()
                    })
                    .collect();
                lines.push(cells.join(&self.delimiter));
            }
        }

        Ok(lines.join("\n"))
    }
}

/// Render a whole result with the default formatter
pub async fn format_table(stream: ResultStream) -> Result<String> {
    let mut reader = BatchReader::new(stream);
    ResultFormatter::new().format(&mut reader).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ArrayRef, DataType, Field, RecordBatch, Schema, SchemaRef};
    use crate::Error;
    use arrow_array::{Float64Array, Int64Array, StringArray};
    use std::sync::Arc;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("origin_lat", DataType::Float64, true),
            Field::new("origin_city", DataType::Utf8, true),
        ]))
    }

    fn batch(lat: Vec<Option<f64>>, city: Vec<Option<&str>>) -> RecordBatch {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Float64Array::from(lat)),
            Arc::new(StringArray::from(city)),
        ];
        RecordBatch::try_new(schema(), columns).unwrap()
    }

    #[tokio::test]
    async fn test_header_and_rows_across_batches() {
        let stream = ResultStream::from_batches(
            schema(),
            vec![
                Ok(batch(vec![Some(32.5)], vec![Some("Dallas")])),
                Ok(batch(vec![Some(29.75), None], vec![Some("Houston"), None])),
            ],
        );

        let table = format_table(stream).await.unwrap();
        assert_eq!(
            table,
            "origin_lat, origin_city\n32.5, Dallas\n29.75, Houston\n, "
        );
    }

    #[tokio::test]
    async fn test_empty_result_is_header_only() {
        let stream = ResultStream::from_batches(schema(), vec![]);
        assert_eq!(format_table(stream).await.unwrap(), "origin_lat, origin_city");
    }

    #[tokio::test]
    async fn test_custom_delimiter() {
        let counts = Arc::new(Schema::new(vec![
            Field::new("row_count", DataType::Int64, false),
            Field::new("dest_city", DataType::Utf8, true),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(vec![10_000])),
            Arc::new(StringArray::from(vec![Some("Austin")])),
        ];
        let stream = ResultStream::from_batches(
            counts.clone(),
            vec![Ok(RecordBatch::try_new(counts, columns).unwrap())],
        );
        let mut reader = BatchReader::new(stream);
        let table = ResultFormatter::new()
            .delimiter("|")
            .format(&mut reader)
            .await
            .unwrap();
        assert_eq!(table, "row_count|dest_city\n10000|Austin");
    }

    #[tokio::test]
    async fn test_error_mid_result_propagates() {
        let stream = ResultStream::from_batches(
            schema(),
            vec![
                Ok(batch(vec![Some(1.5)], vec![Some("Austin")])),
                Err(Error::Query("table dropped".into())),
            ],
        );
        assert!(matches!(format_table(stream).await, Err(Error::Query(_))));
    }
}
