//! Referential-integrity pre-check for writes.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{GraphError, MissingRelated, Result};
use crate::client::Row;
use crate::query::ast::{BoolExpr, Comparison, Expr, NodePattern, Pattern, Projection, Var};
use crate::query::builder::StatementBuilder;
use crate::query::compiler::QueryCompiler;
use crate::query::statement::Statement;

/// A related node a write is about to link to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelatedRef {
    /// Relationship name on the written entity.
    pub relationship: String,
    /// Label the target must carry.
    pub label: String,
    /// Target id.
    pub id: String,
}

impl<'a> QueryCompiler<'a> {
    /// One batched lookup for every referenced id; `None` when nothing is referenced.
    pub fn related_existence(&self, refs: &[RelatedRef]) -> Result<Option<Statement>> {
        if refs.is_empty() {
            return Ok(None);
        }
        let reference = Var::new("ref");
        let related = Var::new("related");
        let mut b = StatementBuilder::for_entity(self.descriptor.label(), None);
        let list: Vec<Value> = refs
            .iter()
            .map(|r| json!({"relationship": r.relationship, "label": r.label, "id": r.id}))
            .collect();
        let list = b.bind("relatedRefs", list);
        b.unwind(list, reference.clone())
            .optional_match(Pattern::node(NodePattern {
                var: Some(related.clone()),
                label: None,
                props: vec![("id".into(), reference.prop("id"))],
            }))
            .filter(BoolExpr::Cmp(Comparison::InLabels(
                reference.prop("label"),
                related.clone(),
            )))
            .ret(
                vec![
                    Projection::Expr {
                        expr: reference.prop("relationship"),
                        alias: "relationship".into(),
                    },
                    Projection::Expr {
                        expr: reference.prop("id"),
                        alias: "id".into(),
                    },
                    Projection::Expr {
                        expr: reference.prop("label"),
                        alias: "label".into(),
                    },
                    Projection::Expr {
                        expr: Expr::Bool(Box::new(BoolExpr::Cmp(Comparison::IsNotNull(
                            related.expr(),
                        )))),
                        alias: "found".into(),
                    },
                ],
                Vec::new(),
            );
        b.build().map(Some)
    }
}

/// Collects the `found = false` rows of an existence check.
pub fn missing_from_rows(rows: &[Row]) -> Result<Vec<MissingRelated>> {
    let mut missing = Vec::new();
    for row in rows {
        let found = row
            .get("found")
            .and_then(Value::as_bool)
            .ok_or_else(|| GraphError::mapping("existence row without 'found'"))?;
        if found {
            continue;
        }
        let text = |key: &str| {
            row.get(key)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| GraphError::mapping(format!("existence row without '{key}'")))
        };
        missing.push(MissingRelated {
            relationship: text("relationship")?,
            label: text("label")?,
            id: text("id")?,
        });
    }
    Ok(missing)
}

/// Flattens a relationship input value into target ids.
///
/// Accepts a single id, a list of ids, `{id}` objects or lists of them, and
/// `null` (no targets). Duplicates collapse, first occurrence kept.
pub fn related_ids(relationship: &str, value: &Value) -> Result<Vec<String>> {
    let mut ids: Vec<String> = Vec::new();
    let mut push = |id: String| {
        if !ids.contains(&id) {
            ids.push(id);
        }
    };
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items.iter().filter(|v| !v.is_null()) {
                push(single_id(relationship, item)?);
            }
        }
        other => push(single_id(relationship, other)?),
    }
    Ok(ids)
}

fn single_id(relationship: &str, value: &Value) -> Result<String> {
    let id = match value {
        Value::String(id) => Some(id.as_str()),
        Value::Object(map) => map.get("id").and_then(Value::as_str),
        _ => None,
    };
    match id {
        Some(id) if !id.is_empty() => Ok(id.to_owned()),
        _ => Err(GraphError::invalid(format!(
            "relationship '{relationship}' expects ids, got {value}"
        ))),
    }
}
