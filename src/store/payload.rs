//! Payload schema for Qdrant points

use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{ListValue, PointStruct, Struct, Value as QdrantValue};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Payload key holding the raw document text
pub const DOCUMENT_KEY: &str = "document";

/// A crawled page ready to be written to the vector store
///
/// Every instance carries a freshly minted id; the store never deduplicates,
/// so indexing the same page twice yields two points.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub id: Uuid,
    pub document: String,
    pub metadata: Map<String, Value>,
}

impl IndexedDocument {
    pub fn new(document: String, metadata: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document,
            metadata,
        }
    }

    /// Convert to Qdrant payload format
    ///
    /// Metadata keys are copied as-is; the document text is stored under
    /// [`DOCUMENT_KEY`] and wins over a metadata key of the same name.
    pub fn to_qdrant_payload(&self) -> HashMap<String, QdrantValue> {
        let mut map: HashMap<String, QdrantValue> = self
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), json_to_qdrant_value(v)))
            .collect();

        map.insert(
            DOCUMENT_KEY.to_string(),
            QdrantValue {
                kind: Some(Kind::StringValue(self.document.clone())),
            },
        );

        map
    }

    /// Convert to a qdrant-client PointStruct with the given vector
    pub fn to_point_struct(&self, vector: Vec<f32>) -> PointStruct {
        PointStruct::new(self.id.to_string(), vector, self.to_qdrant_payload())
    }
}

/// Convert serde_json Value to a Qdrant value
pub fn json_to_qdrant_value(v: &Value) -> QdrantValue {
    let kind = match v {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(json_to_qdrant_value).collect(),
        }),
        Value::Object(fields) => Kind::StructValue(Struct {
            fields: fields
                .iter()
                .map(|(k, v)| (k.clone(), json_to_qdrant_value(v)))
                .collect(),
        }),
    };

    QdrantValue { kind: Some(kind) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_new_documents_get_distinct_ids() {
        let a = IndexedDocument::new("same".to_string(), Map::new());
        let b = IndexedDocument::new("same".to_string(), Map::new());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_payload_carries_document_and_metadata() {
        let doc = IndexedDocument::new(
            "# Title".to_string(),
            metadata(json!({"url": "https://example.com", "statusCode": 200})),
        );

        let payload = doc.to_qdrant_payload();
        assert_eq!(payload.len(), 3);
        assert_eq!(
            payload[DOCUMENT_KEY].kind,
            Some(Kind::StringValue("# Title".to_string()))
        );
        assert_eq!(payload["statusCode"].kind, Some(Kind::IntegerValue(200)));
    }

    #[test]
    fn test_document_key_overrides_metadata() {
        let doc = IndexedDocument::new(
            "body".to_string(),
            metadata(json!({"document": "stale"})),
        );
        let payload = doc.to_qdrant_payload();
        assert_eq!(
            payload[DOCUMENT_KEY].kind,
            Some(Kind::StringValue("body".to_string()))
        );
    }

    #[test]
    fn test_nested_values_convert() {
        let value = json!({"tags": ["a", 1.5, null], "og": {"title": "t"}});
        let converted = json_to_qdrant_value(&value);

        let Some(Kind::StructValue(fields)) = converted.kind else {
            panic!("expected struct value");
        };
        let Some(Kind::ListValue(list)) = &fields.fields["tags"].kind else {
            panic!("expected list value");
        };
        assert_eq!(list.values.len(), 3);
        assert_eq!(list.values[1].kind, Some(Kind::DoubleValue(1.5)));
        assert_eq!(list.values[2].kind, Some(Kind::NullValue(0)));
    }
}
