//! Turns database rows into entities.

use serde_json::{Map, Value};

use crate::client::Row;
use crate::error::{GraphError, Result};
use crate::schema::{Cardinality, EntityDescriptor};

/// Maps one result row of a read statement to an entity.
pub trait RecordMapper: Send + Sync {
    /// Entity type produced.
    type Entity: Send;

    /// Builds the entity for `descriptor` from `row`.
    fn map(&self, descriptor: &EntityDescriptor, row: &Row) -> Result<Self::Entity>;
}

/// Produces `serde_json::Value` objects.
///
/// The node's properties form the object. Each declared relationship is
/// nested under its name: `one` as an object (or `null`), `many` as an array.
/// Edge properties land under `edgeProps` on the related object. Columns a
/// custom return clause did not project are left out.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonRecordMapper;

impl RecordMapper for JsonRecordMapper {
    type Entity = Value;

    fn map(&self, descriptor: &EntityDescriptor, row: &Row) -> Result<Value> {
        let node = descriptor.model.node_variable.as_str();
        let mut entity = match row.get(node).map(properties) {
            Some(Value::Object(map)) => map,
            Some(_) | None => {
                return Err(GraphError::mapping(format!(
                    "{}: row has no '{node}' node column",
                    descriptor.label()
                )))
            }
        };
        for (name, rel) in &descriptor.relationships {
            let column = format!("{node}_{name}");
            let Some(value) = row.get(&column) else {
                continue;
            };
            let related = match rel.cardinality {
                Cardinality::One => {
                    let mut target = properties(value);
                    if let Value::Object(target) = &mut target {
                        let edge: Map<String, Value> = rel
                            .fields
                            .iter()
                            .filter_map(|field| {
                                row.get(&format!("{column}_{}", field.name))
                                    .map(|v| (field.name.clone(), v.clone()))
                            })
                            .collect();
                        if !edge.is_empty() {
                            target.insert("edgeProps".into(), Value::Object(edge));
                        }
                    }
                    target
                }
                Cardinality::Many => {
                    let edges = row.get(&format!("{column}_edges"));
                    let items = value
                        .as_array()
                        .map(|items| items.iter().filter(|item| !item.is_null()))
                        .into_iter()
                        .flatten()
                        .map(|item| {
                            let mut target = properties(item);
                            if let (Value::Object(target), Some(edges)) = (&mut target, edges) {
                                if let Some(props) = edge_props_for(edges, target.get("id")) {
                                    target.insert("edgeProps".into(), props);
                                }
                            }
                            target
                        })
                        .collect();
                    Value::Array(items)
                }
            };
            entity.insert(name.clone(), related);
        }
        Ok(Value::Object(entity))
    }
}

/// Node values arrive either as plain property maps or as
/// `{ labels, properties }` structures depending on the driver.
fn properties(value: &Value) -> Value {
    match value {
        Value::Object(map) if map.contains_key("labels") => match map.get("properties") {
            Some(props @ Value::Object(_)) => props.clone(),
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

fn edge_props_for(edges: &Value, id: Option<&Value>) -> Option<Value> {
    let id = id?;
    edges
        .as_array()?
        .iter()
        .find(|entry| entry.get("relatedId") == Some(id))
        .and_then(|entry| entry.get("edgeProps"))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldType, RelationshipDef};
    use serde_json::json;

    fn article() -> EntityDescriptor {
        EntityDescriptor::new("Article", "article")
            .field("title", FieldDef::of(FieldType::String))
            .relationship(
                "author",
                RelationshipDef::new("AUTHORED_BY", "User").edge_field("role", None),
            )
            .relationship(
                "tags",
                RelationshipDef::new("TAGGED", "Tag").many().edge_field("weight", None),
            )
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn nests_related_nodes_with_edge_props() {
        let mapped = JsonRecordMapper
            .map(
                &article(),
                &row(json!({
                    "article": {"id": "a1", "title": "Hello"},
                    "article_author": {"id": "u1", "name": "Ada"},
                    "article_author_role": "editor",
                    "article_tags": [{"id": "t1"}, {"id": "t2"}],
                    "article_tags_edges": [
                        {"relatedId": "t2", "edgeProps": {"weight": 2}},
                        {"relatedId": "t1", "edgeProps": {"weight": 1}}
                    ]
                })),
            )
            .expect("maps");
        assert_eq!(mapped["title"], "Hello");
        assert_eq!(mapped["author"]["edgeProps"]["role"], "editor");
        assert_eq!(mapped["tags"][0]["edgeProps"]["weight"], 1);
        assert_eq!(mapped["tags"][1]["edgeProps"]["weight"], 2);
    }

    #[test]
    fn absent_one_relationship_stays_null() {
        let mapped = JsonRecordMapper
            .map(
                &article(),
                &row(json!({
                    "article": {"labels": ["Article"], "properties": {"id": "a1"}},
                    "article_author": null,
                    "article_tags": []
                })),
            )
            .expect("maps");
        assert_eq!(mapped["id"], "a1");
        assert!(mapped["author"].is_null());
        assert_eq!(mapped["tags"], json!([]));
    }

    #[test]
    fn missing_node_column_is_a_mapping_error() {
        let err = JsonRecordMapper
            .map(&article(), &row(json!({"other": 1})))
            .unwrap_err();
        assert_eq!(err.code(), "MappingError");
    }
}
