//! Vector store adapter for Qdrant
//!
//! Collection and point operations against the asset bound to the
//! `vector-store` capability. Every operation is best effort: failures are
//! logged and surfaced as neutral values (false, empty, None) so a sleeping
//! or unreachable store never takes a request path down with it.

use qdrant_client::config::QdrantConfig as ClientConfig;
use qdrant_client::qdrant::{
    Condition, CreateCollection, DeleteCollection, DeletePoints, Distance, Filter, GetPoints,
    PointId, PointStruct, PointsIdsList, PointsSelector, SearchPoints, UpsertPoints,
    Value as QdrantValue, VectorParams, VectorsConfig, WithPayloadSelector,
};
use qdrant_client::Qdrant;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One stored or retrieved point in JSON form.
#[derive(Debug, Clone, Serialize)]
pub struct VectorPoint {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    pub payload: Value,
}

/// Collection summary for admin output.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub points_count: u64,
    pub status: String,
}

/// Adapter over one Qdrant instance.
pub struct VectorStoreAdapter {
    client: Option<Arc<Qdrant>>,
    url: String,
}

impl VectorStoreAdapter {
    /// Connect to the store at `url`. A client that cannot even be
    /// constructed leaves the adapter inert rather than failing startup.
    pub fn connect(url: impl Into<String>) -> Self {
        let url = url.into();
        let client = match Qdrant::new(ClientConfig::from_url(&url)) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "vector store client unavailable");
                None
            }
        };
        Self { client, url }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn list_collections(&self) -> Vec<String> {
        let Some(client) = &self.client else {
            return Vec::new();
        };
        match client.list_collections().await {
            Ok(response) => response.collections.into_iter().map(|c| c.name).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "list_collections failed");
                Vec::new()
            }
        }
    }

    pub async fn create_collection(&self, name: &str, dimension: u64, distance: Distance) -> bool {
        let Some(client) = &self.client else {
            return false;
        };
        let request = CreateCollection {
            collection_name: name.to_string(),
            vectors_config: Some(VectorsConfig {
                config: Some(qdrant_client::qdrant::vectors_config::Config::Params(
                    VectorParams {
                        size: dimension,
                        distance: distance as i32,
                        ..Default::default()
                    },
                )),
            }),
            ..Default::default()
        };
        match client.create_collection(request).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(collection = name, error = %e, "create_collection failed");
                false
            }
        }
    }

    pub async fn delete_collection(&self, name: &str) -> bool {
        let Some(client) = &self.client else {
            return false;
        };
        let request = DeleteCollection {
            collection_name: name.to_string(),
            ..Default::default()
        };
        match client.delete_collection(request).await {
            Ok(response) => response.result,
            Err(e) => {
                tracing::warn!(collection = name, error = %e, "delete_collection failed");
                false
            }
        }
    }

    pub async fn collection_info(&self, name: &str) -> Option<CollectionInfo> {
        let client = self.client.as_ref()?;
        match client.collection_info(name).await {
            Ok(response) => response.result.map(|info| CollectionInfo {
                name: name.to_string(),
                points_count: info.points_count.unwrap_or(0),
                status: format!("{:?}", info.status()),
            }),
            Err(e) => {
                tracing::warn!(collection = name, error = %e, "collection_info failed");
                None
            }
        }
    }

    /// Upsert points with JSON payloads. Returns the number stored.
    pub async fn upsert(&self, collection: &str, points: Vec<VectorUpsert>) -> usize {
        let Some(client) = &self.client else {
            return 0;
        };
        let count = points.len();
        let points = points
            .into_iter()
            .map(|p| PointStruct::new(p.id, p.vector, json_to_payload(&p.payload)))
            .collect();
        let request = UpsertPoints {
            collection_name: collection.to_string(),
            wait: Some(true),
            points,
            ..Default::default()
        };
        match client.upsert_points(request).await {
            Ok(_) => count,
            Err(e) => {
                tracing::warn!(collection, error = %e, "upsert failed");
                0
            }
        }
    }

    /// Similarity search with optional keyword-match payload filters.
    pub async fn search(
        &self,
        collection: &str,
        query: Vec<f32>,
        top_k: u64,
        filters: &HashMap<String, String>,
    ) -> Vec<VectorPoint> {
        let Some(client) = &self.client else {
            return Vec::new();
        };
        let filter = if filters.is_empty() {
            None
        } else {
            Some(Filter {
                must: filters
                    .iter()
                    .map(|(field, value)| Condition::matches(field.clone(), value.clone()))
                    .collect(),
                ..Default::default()
            })
        };
        let request = SearchPoints {
            collection_name: collection.to_string(),
            vector: query,
            limit: top_k,
            filter,
            with_payload: Some(WithPayloadSelector::from(true)),
            ..Default::default()
        };
        match client.search_points(request).await {
            Ok(response) => response
                .result
                .into_iter()
                .map(|point| VectorPoint {
                    id: point_id_string(point.id.as_ref()),
                    score: Some(point.score),
                    payload: payload_to_json(&point.payload),
                })
                .collect(),
            Err(e) => {
                tracing::warn!(collection, error = %e, "search failed");
                Vec::new()
            }
        }
    }

    pub async fn get_points(&self, collection: &str, ids: &[String]) -> Vec<VectorPoint> {
        let Some(client) = &self.client else {
            return Vec::new();
        };
        let request = GetPoints {
            collection_name: collection.to_string(),
            ids: ids.iter().map(|id| PointId::from(id.clone())).collect(),
            with_payload: Some(WithPayloadSelector::from(true)),
            ..Default::default()
        };
        match client.get_points(request).await {
            Ok(response) => response
                .result
                .into_iter()
                .map(|point| VectorPoint {
                    id: point_id_string(point.id.as_ref()),
                    score: None,
                    payload: payload_to_json(&point.payload),
                })
                .collect(),
            Err(e) => {
                tracing::warn!(collection, error = %e, "get_points failed");
                Vec::new()
            }
        }
    }

    pub async fn delete_points(&self, collection: &str, ids: &[String]) -> bool {
        let Some(client) = &self.client else {
            return false;
        };
        let request = DeletePoints {
            collection_name: collection.to_string(),
            wait: Some(true),
            points: Some(PointsSelector {
                points_selector_one_of: Some(
                    qdrant_client::qdrant::points_selector::PointsSelectorOneOf::Points(
                        PointsIdsList {
                            ids: ids.iter().map(|id| PointId::from(id.clone())).collect(),
                        },
                    ),
                ),
            }),
            ..Default::default()
        };
        match client.delete_points(request).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(collection, error = %e, "delete_points failed");
                false
            }
        }
    }
}

/// Input to [`VectorStoreAdapter::upsert`].
#[derive(Debug, Clone)]
pub struct VectorUpsert {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

fn point_id_string(id: Option<&PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match id.and_then(|id| id.point_id_options.as_ref()) {
        Some(PointIdOptions::Uuid(uuid)) => uuid.clone(),
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

/// JSON object to Qdrant payload; non-object values go under a `value` key.
fn json_to_payload(value: &Value) -> HashMap<String, QdrantValue> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), json_to_qdrant_value(v)))
            .collect(),
        other => HashMap::from([("value".to_string(), json_to_qdrant_value(other))]),
    }
}

fn json_to_qdrant_value(value: &Value) -> QdrantValue {
    use qdrant_client::qdrant::value::Kind;
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Kind::IntegerValue(i)
            } else {
                Kind::DoubleValue(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(items) => Kind::ListValue(qdrant_client::qdrant::ListValue {
            values: items.iter().map(json_to_qdrant_value).collect(),
        }),
        Value::Object(map) => Kind::StructValue(qdrant_client::qdrant::Struct {
            fields: map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_qdrant_value(v)))
                .collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

fn payload_to_json(payload: &HashMap<String, QdrantValue>) -> Value {
    Value::Object(
        payload
            .iter()
            .map(|(k, v)| (k.clone(), qdrant_value_to_json(v)))
            .collect(),
    )
}

fn qdrant_value_to_json(value: &QdrantValue) -> Value {
    use qdrant_client::qdrant::value::Kind;
    match &value.kind {
        Some(Kind::NullValue(_)) | None => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::IntegerValue(i)) => Value::from(*i),
        Some(Kind::DoubleValue(d)) => {
            serde_json::Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null)
        }
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(fields)) => Value::Object(
            fields
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), qdrant_value_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_payload_round_trips_through_qdrant_values() {
        let original = serde_json::json!({
            "source": "docs",
            "chunk": 3,
            "score": 0.5,
            "tags": ["a", "b"],
            "nested": {"ok": true}
        });
        let payload = json_to_payload(&original);
        assert_eq!(payload_to_json(&payload), original);
    }

    #[test]
    fn scalar_payload_is_wrapped_under_value_key() {
        let payload = json_to_payload(&serde_json::json!("bare"));
        assert_eq!(
            payload_to_json(&payload),
            serde_json::json!({"value": "bare"})
        );
    }

    #[test]
    fn numeric_point_ids_render_as_strings() {
        let id = PointId::from(42u64);
        assert_eq!(point_id_string(Some(&id)), "42");
        let id = PointId::from("abc".to_string());
        assert_eq!(point_id_string(Some(&id)), "abc");
        assert_eq!(point_id_string(None), "");
    }
}
