//! Qdrant-backed vector store adapter.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    vectors_config::Config, Condition, CreateCollection, Distance, FieldType, Filter,
    PointStruct, Range, SearchPoints, VectorParams, VectorsConfig, WithPayloadSelector,
    WithVectorsSelector,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

/// One retrieval candidate returned from the store.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub logical_id: String,
    pub score: f32,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, Value>,
}

/// Metadata filters supported on `search`, matching the original service's
/// `filter_metadata` dict plus the range filter on document creation time
/// the spec adds.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub document_id: Option<String>,
    pub owner_id: Option<String>,
    pub content_type: Option<String>,
    pub created_after_ts: Option<i64>,
    pub created_before_ts: Option<i64>,
}

/// Trait over the vector store so retrieval/ingestion code can be tested
/// against an in-memory fake.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn ensure_collection(&self, vector_size: u64) -> Result<()>;
    async fn upsert(
        &self,
        logical_ids: &[String],
        vectors: &[Vec<f32>],
        payloads: &[HashMap<String, Value>],
    ) -> Result<()>;
    async fn search(
        &self,
        query_vector: &[f32],
        limit: u64,
        filter: &SearchFilter,
        score_threshold: Option<f32>,
        with_vectors: bool,
    ) -> Result<Vec<VectorHit>>;
    async fn delete_by_logical_ids(&self, logical_ids: &[String]) -> Result<()>;
    async fn delete_by_document_id(&self, document_id: &str) -> Result<()>;
}

pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
}

impl QdrantVectorStore {
    pub fn new(client: Qdrant, collection: String) -> Self {
        Self { client, collection }
    }

    fn build_filter(filter: &SearchFilter) -> Option<Filter> {
        let mut must = Vec::new();
        if let Some(document_id) = &filter.document_id {
            must.push(Condition::matches("document_id", document_id.clone()));
        }
        if let Some(owner_id) = &filter.owner_id {
            must.push(Condition::matches("document_owner_id", owner_id.clone()));
        }
        if let Some(content_type) = &filter.content_type {
            must.push(Condition::matches("content_type", content_type.clone()));
        }
        if filter.created_after_ts.is_some() || filter.created_before_ts.is_some() {
            must.push(Condition::range(
                "document_created_at_ts",
                Range {
                    gte: filter.created_after_ts.map(|v| v as f64),
                    lte: filter.created_before_ts.map(|v| v as f64),
                    ..Default::default()
                },
            ));
        }
        if must.is_empty() {
            None
        } else {
            Some(Filter {
                must,
                ..Default::default()
            })
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self, vector_size: u64) -> Result<()> {
        let exists = self.client.collection_exists(&self.collection).await?;
        if !exists {
            self.client
                .create_collection(CreateCollection {
                    collection_name: self.collection.clone(),
                    vectors_config: Some(VectorsConfig {
                        config: Some(Config::Params(VectorParams {
                            size: vector_size,
                            distance: Distance::Cosine.into(),
                            ..Default::default()
                        })),
                    }),
                    ..Default::default()
                })
                .await?;

            self.client
                .create_field_index(
                    qdrant_client::qdrant::CreateFieldIndexCollection {
                        collection_name: self.collection.clone(),
                        field_name: "document_id".to_string(),
                        field_type: Some(FieldType::Keyword.into()),
                        ..Default::default()
                    },
                )
                .await
                .ok();
        }
        Ok(())
    }

    async fn upsert(
        &self,
        logical_ids: &[String],
        vectors: &[Vec<f32>],
        payloads: &[HashMap<String, Value>],
    ) -> Result<()> {
        let points: Vec<PointStruct> = logical_ids
            .iter()
            .zip(vectors.iter())
            .zip(payloads.iter())
            .map(|((logical_id, vector), payload)| {
                let mut payload = payload.clone();
                payload
                    .entry("logical_id".to_string())
                    .or_insert_with(|| Value::String(logical_id.clone()));
                let point_id = Uuid::new_v4().to_string();
                PointStruct::new(
                    point_id,
                    vector.clone(),
                    Payload::try_from(serde_json::Value::Object(payload.into_iter().collect()))
                        .unwrap_or_default(),
                )
            })
            .collect();

        self.client
            .upsert_points(qdrant_client::qdrant::UpsertPoints {
                collection_name: self.collection.clone(),
                points,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        limit: u64,
        filter: &SearchFilter,
        score_threshold: Option<f32>,
        with_vectors: bool,
    ) -> Result<Vec<VectorHit>> {
        let response = self
            .client
            .search_points(SearchPoints {
                collection_name: self.collection.clone(),
                vector: query_vector.to_vec(),
                limit,
                filter: Self::build_filter(filter),
                score_threshold,
                with_payload: Some(WithPayloadSelector::from(true)),
                with_vectors: Some(WithVectorsSelector::from(with_vectors)),
                ..Default::default()
            })
            .await?;

        let hits = response
            .result
            .into_iter()
            .map(|point| {
                let payload: HashMap<String, Value> = point
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, qdrant_value_to_json(v)))
                    .collect();
                let logical_id = payload
                    .get("logical_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let vector = point
                    .vectors
                    .and_then(|v| match v.vectors_options {
                        Some(qdrant_client::qdrant::vectors::VectorsOptions::Vector(vec)) => {
                            Some(vec.data)
                        }
                        _ => None,
                    })
                    .unwrap_or_default();
                VectorHit {
                    logical_id,
                    score: point.score,
                    vector,
                    payload,
                }
            })
            .collect();
        Ok(hits)
    }

    async fn delete_by_logical_ids(&self, logical_ids: &[String]) -> Result<()> {
        if logical_ids.is_empty() {
            return Ok(());
        }
        let filter = Filter {
            must: vec![Condition::matches(
                "logical_id",
                logical_ids.to_vec(),
            )],
            ..Default::default()
        };
        self.client
            .delete_points(qdrant_client::qdrant::DeletePoints {
                collection_name: self.collection.clone(),
                points: Some(filter.into()),
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    async fn delete_by_document_id(&self, document_id: &str) -> Result<()> {
        let filter = Filter {
            must: vec![Condition::matches("document_id", document_id.to_string())],
            ..Default::default()
        };
        self.client
            .delete_points(qdrant_client::qdrant::DeletePoints {
                collection_name: self.collection.clone(),
                points: Some(filter.into()),
                ..Default::default()
            })
            .await?;
        Ok(())
    }
}

fn qdrant_value_to_json(v: qdrant_client::qdrant::Value) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}
