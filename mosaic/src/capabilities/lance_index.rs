//! Persistent vector index on LanceDB
//!
//! One table holds every modality. Owner and modality live in their own
//! columns so searches can push those conditions down to LanceDB; the
//! full metadata is kept as a JSON string.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    IndexMatch, IndexRecord, Metadata, MetadataFilter, VectorIndex, MODALITY_KEY, OWNER_KEY,
};

const TABLE_NAME: &str = "records";

/// Metadata fields stored as columns
const COLUMN_FIELDS: [&str; 2] = [OWNER_KEY, MODALITY_KEY];

pub struct LanceVectorIndex {
    connection: Connection,
    dimension: usize,
    schema: SchemaRef,
    table: Mutex<Option<Table>>,
}

impl LanceVectorIndex {
    /// Connect to (or create) the database directory at `path`
    pub async fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        let path = path.as_ref();
        if dimension == 0 {
            bail!("vector dimension must be greater than 0");
        }
        info!("Opening LanceDB index at {:?} (dimension {})", path, dimension);

        let connection = lancedb::connect(path.to_string_lossy().as_ref())
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self {
            connection,
            dimension,
            schema: record_schema(dimension)?,
            table: Mutex::new(None),
        })
    }

    pub async fn count(&self) -> Result<usize> {
        let table = self.table().await?;
        Ok(table.count_rows(None).await?)
    }

    async fn table(&self) -> Result<Table> {
        let mut cached = self.table.lock().await;
        if let Some(table) = cached.as_ref() {
            return Ok(table.clone());
        }

        let names = self.connection.table_names().execute().await?;
        let table = if names.iter().any(|name| name == TABLE_NAME) {
            debug!("Opening existing table: {}", TABLE_NAME);
            self.connection
                .open_table(TABLE_NAME)
                .execute()
                .await
                .context("Failed to open table")?
        } else {
            info!("Creating table: {}", TABLE_NAME);
            let empty = RecordBatch::new_empty(self.schema.clone());
            let batches = RecordBatchIterator::new(vec![Ok(empty)], self.schema.clone());
            self.connection
                .create_table(TABLE_NAME, Box::new(batches))
                .execute()
                .await
                .context("Failed to create table")?
        };

        *cached = Some(table.clone());
        Ok(table)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            bail!(
                "vector dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            );
        }
        Ok(())
    }
}

fn record_schema(dimension: usize) -> Result<SchemaRef> {
    let width = i32::try_from(dimension).context("vector dimension too large")?;
    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new(OWNER_KEY, DataType::Utf8, true),
        Field::new(MODALITY_KEY, DataType::Utf8, true),
        Field::new("metadata", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                width,
            ),
            false,
        ),
    ])))
}

/// SQL predicate for the column-backed conditions of `filter`
fn pushdown_predicate(filter: &MetadataFilter) -> Option<String> {
    let clauses: Vec<String> = filter
        .conditions
        .iter()
        .filter(|(field, _)| COLUMN_FIELDS.contains(&field.as_str()))
        .map(|(field, value)| format!("{} = '{}'", field, value.replace('\'', "''")))
        .collect();

    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" AND "))
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexMatch>> {
        self.check_dimension(vector)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let table = self.table().await?;
        let mut query = table.vector_search(vector.to_vec())?.limit(k);
        if let Some(predicate) = filter.and_then(pushdown_predicate) {
            query = query.only_if(predicate);
        }

        let batches: Vec<RecordBatch> = query.execute().await?.try_collect().await?;

        let mut matches = Vec::new();
        for batch in batches {
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            let (Some(contents), Some(metadata), Some(distances)) = (
                string_column(&batch, "content"),
                string_column(&batch, "metadata"),
                distances,
            ) else {
                bail!("LanceDB result is missing expected columns");
            };

            for row in 0..batch.num_rows() {
                let metadata: Metadata =
                    serde_json::from_str(metadata.value(row)).unwrap_or_default();
                // Conditions without a column are checked here
                if filter.is_some_and(|f| !f.matches(&metadata)) {
                    continue;
                }

                let distance = distances.value(row);
                matches.push(IndexMatch {
                    content: contents.value(row).to_string(),
                    metadata,
                    score: Some(1.0 / (1.0 + distance)),
                });
            }
        }

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        Ok(matches)
    }

    async fn insert(&self, record: IndexRecord) -> Result<String> {
        self.check_dimension(&record.vector)?;
        let table = self.table().await?;

        let id = Uuid::new_v4().to_string();
        let column = |key: &str| record.metadata.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let owner = column(OWNER_KEY);
        let modality = column(MODALITY_KEY);
        let metadata = serde_json::to_string(&record.metadata)?;

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vectors = FixedSizeListArray::try_new(
            field,
            i32::try_from(self.dimension)?,
            Arc::new(Float32Array::from(record.vector)),
            None,
        )?;

        let batch = RecordBatch::try_new(
            self.schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![id.as_str()])),
                Arc::new(StringArray::from(vec![record.content.as_str()])),
                Arc::new(StringArray::from(vec![owner.as_deref()])),
                Arc::new(StringArray::from(vec![modality.as_deref()])),
                Arc::new(StringArray::from(vec![metadata.as_str()])),
                Arc::new(vectors),
            ],
        )?;

        let batches = RecordBatchIterator::new(vec![Ok(batch)], self.schema.clone());
        table.add(Box::new(batches)).execute().await?;

        debug!("Indexed record {}", id);
        Ok(id)
    }
}
