//! In-process vector index
//!
//! Brute-force cosine search over a `Vec`. Good for tests, demos and small
//! corpora; a remote index implements the same trait.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{IndexMatch, IndexRecord, MetadataFilter, VectorIndex};

struct StoredRecord {
    id: String,
    record: IndexRecord,
}

#[derive(Clone, Default)]
pub struct InMemoryVectorIndex {
    records: Arc<RwLock<Vec<StoredRecord>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<IndexRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|stored| stored.id == id)
            .map(|stored| stored.record.clone())
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexMatch>> {
        let records = self.records.read().await;

        let mut matches: Vec<IndexMatch> = records
            .iter()
            .filter(|stored| filter.map_or(true, |f| f.matches(&stored.record.metadata)))
            .filter(|stored| stored.record.vector.len() == vector.len())
            .map(|stored| {
                let distance = cosine_distance(vector, &stored.record.vector);
                IndexMatch {
                    content: stored.record.content.clone(),
                    metadata: stored.record.metadata.clone(),
                    // Convert distance to similarity score
                    score: Some(1.0 / (1.0 + distance)),
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);

        debug!("In-memory search returned {} of {} records", matches.len(), records.len());
        Ok(matches)
    }

    async fn insert(&self, record: IndexRecord) -> Result<String> {
        if record.vector.is_empty() {
            bail!("cannot index a record without a vector");
        }

        let id = Uuid::new_v4().to_string();
        self.records.write().await.push(StoredRecord {
            id: id.clone(),
            record,
        });
        debug!("Indexed record {}", id);
        Ok(id)
    }
}
