//! Write statements: create, put, patch and delete.
//!
//! Every write returns `<node>.id AS id`; an empty result means the match
//! found nothing (or the tenant was out of reach) and lets the repository
//! tell a miss apart from success.

use serde_json::{Map, Value};

use crate::error::{GraphError, Result};
use crate::query::ast::{BoolExpr, Comparison, Expr, NodePattern, Pattern, Projection, SetItem, Var};
use crate::query::builder::StatementBuilder;
use crate::query::compiler::{cast, QueryCompiler};
use crate::query::context::RequestContext;
use crate::query::integrity::{related_ids, RelatedRef};
use crate::query::statement::Statement;
use crate::schema::{Cardinality, RelationshipDef};

/// Input object for a write: field values, relationship ids and edge props.
pub type WriteInput = Map<String, Value>;

/// Which write semantics to apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// New node; defaults merged, null fields skipped.
    Create,
    /// Full replacement; absent fields cleared.
    Put,
    /// Partial update; only present keys touched.
    Patch,
}

/// Statements produced for one write call.
#[derive(Clone, Debug)]
pub struct WriteStatements {
    /// Id of the written entity.
    pub id: String,
    /// Related-node existence check, when the input references any.
    pub precheck: Option<Statement>,
    /// The write itself.
    pub write: Statement,
}

/// Relationship targets resolved from the input.
struct LinkWrite<'d> {
    name: &'d str,
    rel: &'d RelationshipDef,
    ids: Vec<String>,
    edge_props: Option<Value>,
}

/// Edge-only property update for already linked targets.
struct EdgeUpdate<'d> {
    name: &'d str,
    rel: &'d RelationshipDef,
    props: Map<String, Value>,
}

impl<'a> QueryCompiler<'a> {
    /// Creates the entity, linking it to its tenant when company scoped.
    pub fn create(&self, ctx: &RequestContext, input: &WriteInput) -> Result<WriteStatements> {
        self.write(ctx, input, WriteMode::Create)
    }

    /// Replaces every field; relationships whose key is present are replaced.
    pub fn put(&self, ctx: &RequestContext, input: &WriteInput) -> Result<WriteStatements> {
        self.write(ctx, input, WriteMode::Put)
    }

    /// Updates only the keys present in `input`.
    pub fn patch(&self, ctx: &RequestContext, input: &WriteInput) -> Result<WriteStatements> {
        self.write(ctx, input, WriteMode::Patch)
    }

    /// Removes the entity and its relationships.
    pub fn delete(&self, ctx: &RequestContext, id: &str) -> Result<Statement> {
        let node = self.node();
        let deleted = Var::new("deletedId");
        let mut b = self.builder();
        self.match_by_id(&mut b, ctx, id)?;
        b.with(vec![
            Projection::from(&node),
            Projection::Expr {
                expr: node.prop("id"),
                alias: deleted.as_str().to_owned(),
            },
        ])
        .delete(vec![node], true)
        .ret(
            vec![Projection::Var {
                var: deleted,
                alias: Some("id".into()),
            }],
            Vec::new(),
        );
        b.build()
    }

    /// Compiles a write in the given mode.
    pub fn write(
        &self,
        ctx: &RequestContext,
        input: &WriteInput,
        mode: WriteMode,
    ) -> Result<WriteStatements> {
        let id = input
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                GraphError::invalid(format!("{} write needs a string id", self.descriptor.label()))
            })?
            .to_owned();
        let links = self.resolve_links(ctx, input, mode)?;
        let updates = match mode {
            WriteMode::Patch => self.resolve_edge_updates(input)?,
            _ => Vec::new(),
        };
        let refs: Vec<RelatedRef> = links
            .iter()
            .flat_map(|link| {
                link.ids.iter().map(|target| RelatedRef {
                    relationship: link.name.to_owned(),
                    label: link.rel.target_label.clone(),
                    id: target.clone(),
                })
            })
            .collect();
        let precheck = self.related_existence(&refs)?;

        let node = self.node();
        let now = Expr::call("datetime", Vec::new());
        let mut b = self.builder();
        let mut assignments = Vec::new();
        match mode {
            WriteMode::Create => {
                let id_param = b.bind("id", id.as_str());
                let start =
                    NodePattern::labeled(&node, self.descriptor.label()).with_prop("id", id_param);
                if self.descriptor.is_company_scoped {
                    let company = ctx
                        .company_id
                        .as_deref()
                        .filter(|c| !c.is_empty())
                        .ok_or_else(|| GraphError::MissingTenant {
                            entity: self.descriptor.label().to_owned(),
                        })?;
                    let tenant = self.tenant_pattern(&mut b, company);
                    b.r#match(Pattern::node(tenant))
                        .create(Pattern::node(start))
                        .create(self.membership_pattern(
                            NodePattern::var(&node),
                            NodePattern::var(&self.tenant_var()),
                        ));
                } else {
                    b.create(Pattern::node(start));
                }
                assignments.push(assign(&node, "createdAt", now.clone()));
            }
            WriteMode::Put | WriteMode::Patch => self.match_by_id(&mut b, ctx, &id)?,
        }
        assignments.push(assign(&node, "updatedAt", now));

        for (name, def) in &self.descriptor.fields {
            let value = match mode {
                WriteMode::Create => input
                    .get(name)
                    .filter(|v| !v.is_null())
                    .or(def.default.as_ref())
                    .filter(|v| !v.is_null())
                    .cloned(),
                WriteMode::Put => Some(input.get(name).cloned().unwrap_or(Value::Null)),
                WriteMode::Patch => input.get(name).cloned(),
            };
            let expr = match value {
                None => continue,
                Some(Value::Null) => Expr::Null,
                Some(value) => cast(def.field_type, b.bind(name.clone(), value)),
            };
            assignments.push(assign(&node, name, expr));
        }
        b.set(assignments);

        for link in &links {
            self.merge_links(&mut b, link, mode != WriteMode::Create);
        }
        for update in &updates {
            self.update_edges(&mut b, update);
        }
        b.ret(
            vec![Projection::Expr {
                expr: node.prop("id"),
                alias: "id".into(),
            }],
            Vec::new(),
        );
        Ok(WriteStatements {
            id,
            precheck,
            write: b.build()?,
        })
    }

    fn resolve_links<'d>(
        &'d self,
        ctx: &RequestContext,
        input: &WriteInput,
        mode: WriteMode,
    ) -> Result<Vec<LinkWrite<'d>>>
    where
        'a: 'd,
    {
        let label = self.descriptor.label();
        let mut links = Vec::new();
        for (name, rel) in &self.descriptor.relationships {
            let value = match input.get(rel.input_key(name)) {
                Some(value) => Some(value.clone()),
                None if mode == WriteMode::Create => {
                    rel.context_key.as_deref().and_then(|key| ctx.value(key))
                }
                None => None,
            };
            let Some(value) = value else {
                if mode == WriteMode::Create && rel.required {
                    return Err(GraphError::invalid(format!(
                        "{label}: relationship '{name}' is required"
                    )));
                }
                continue;
            };
            let ids = related_ids(name, &value)?;
            if rel.required && ids.is_empty() {
                return Err(GraphError::invalid(format!(
                    "{label}: relationship '{name}' is required"
                )));
            }
            if rel.cardinality == Cardinality::One && ids.len() > 1 {
                return Err(GraphError::invalid(format!(
                    "{label}: relationship '{name}' links at most one node"
                )));
            }
            let edge_props = edge_props(name, rel, input, &ids)?;
            links.push(LinkWrite {
                name: name.as_str(),
                rel,
                ids,
                edge_props,
            });
        }
        Ok(links)
    }

    fn resolve_edge_updates<'d>(&'d self, input: &WriteInput) -> Result<Vec<EdgeUpdate<'d>>>
    where
        'a: 'd,
    {
        let mut updates = Vec::new();
        for (name, rel) in &self.descriptor.relationships {
            let key = format!("{name}EdgePropsUpdate");
            let props = match input.get(&key) {
                None | Some(Value::Null) => continue,
                Some(Value::Object(props)) if !rel.fields.is_empty() => props,
                Some(_) => {
                    return Err(GraphError::invalid(format!(
                        "'{key}' must map target ids to declared edge fields"
                    )))
                }
            };
            for value in props.values() {
                check_edge_fields(name, rel, value)?;
            }
            updates.push(EdgeUpdate {
                name: name.as_str(),
                rel,
                props: props.clone(),
            });
        }
        Ok(updates)
    }

    /// Shared merge-relationship-set routine: drop edges to ids that are no
    /// longer listed, then merge an edge to every listed target.
    fn merge_links(&self, b: &mut StatementBuilder, link: &LinkWrite<'_>, replace: bool) {
        let node = self.node();
        let name = link.name;
        let rel = link.rel;
        if replace {
            let existing = Var::new(format!("{name}_existing"));
            let stale = Var::new(format!("{name}_stale"));
            let mut nested = StatementBuilder::new();
            let ids = nested.bind(name, link.ids.clone());
            nested
                .r#match(self.relationship_pattern(
                    Some(stale.clone()),
                    &rel.relationship_label,
                    rel.direction,
                    NodePattern::labeled(&existing, rel.target_label.clone()),
                ))
                .filter(BoolExpr::Not(Box::new(BoolExpr::Cmp(Comparison::In(
                    existing.prop("id"),
                    ids,
                )))))
                .delete(vec![stale], false);
            b.subquery(vec![node.clone()], nested);
        }
        if link.ids.is_empty() {
            return;
        }
        let each = Var::new(format!("{name}_id"));
        let target = Var::new(format!("{name}_target"));
        let edge = Var::new(format!("{name}_edge"));
        let mut nested = StatementBuilder::new();
        let ids = nested.bind(name, link.ids.clone());
        nested
            .unwind(ids, each.clone())
            .r#match(Pattern::node(
                NodePattern::labeled(&target, rel.target_label.clone()).with_prop("id", each.expr()),
            ))
            .merge(self.relationship_pattern(
                Some(edge.clone()),
                &rel.relationship_label,
                rel.direction,
                NodePattern::var(&target),
            ));
        if let Some(props) = &link.edge_props {
            let param = format!("{name}EdgeProps");
            let uniform = nested.bind(param.clone(), props.clone());
            let map = match rel.cardinality {
                Cardinality::One => uniform,
                Cardinality::Many => Expr::ParamIndex(param, Box::new(each.expr())),
            };
            nested.set(vec![SetItem::Merge { var: edge, map }]);
        }
        b.subquery(vec![node], nested);
    }

    fn update_edges(&self, b: &mut StatementBuilder, update: &EdgeUpdate<'_>) {
        let node = self.node();
        let name = update.name;
        let rel = update.rel;
        let param = format!("{name}EdgePropsUpdate");
        let each = Var::new(format!("{name}_id"));
        let target = Var::new(format!("{name}_target"));
        let edge = Var::new(format!("{name}_edge"));
        let mut nested = StatementBuilder::new();
        let props = nested.bind(param.clone(), Value::Object(update.props.clone()));
        nested
            .unwind(Expr::Keys(Box::new(props)), each.clone())
            .r#match(self.relationship_pattern(
                Some(edge.clone()),
                &rel.relationship_label,
                rel.direction,
                NodePattern::labeled(&target, rel.target_label.clone()).with_prop("id", each.expr()),
            ))
            .set(vec![SetItem::Merge {
                var: edge,
                map: Expr::ParamIndex(param, Box::new(each.expr())),
            }]);
        b.subquery(vec![node], nested);
    }
}

fn assign(node: &Var, prop: &str, value: Expr) -> SetItem {
    SetItem::Assign {
        var: node.clone(),
        prop: prop.to_owned(),
        value,
    }
}

/// Edge properties for a link: defaults overlaid with `<name>EdgeProps`.
///
/// `one` relationships take a single map; `many` relationships take a map
/// keyed by target id and get one filled-in entry per linked id.
fn edge_props(
    name: &str,
    rel: &RelationshipDef,
    input: &WriteInput,
    ids: &[String],
) -> Result<Option<Value>> {
    let key = format!("{name}EdgeProps");
    let supplied = input.get(&key).filter(|v| !v.is_null());
    if rel.fields.is_empty() {
        return match supplied {
            Some(_) => Err(GraphError::invalid(format!(
                "relationship '{name}' declares no edge fields"
            ))),
            None => Ok(None),
        };
    }
    match rel.cardinality {
        Cardinality::One => Ok(Some(Value::Object(fill_edge(name, rel, supplied)?))),
        Cardinality::Many => {
            let per_target = match supplied {
                None => None,
                Some(Value::Object(map)) => Some(map),
                Some(_) => {
                    return Err(GraphError::invalid(format!(
                        "'{key}' must map target ids to edge properties"
                    )))
                }
            };
            if let Some(stray) = per_target
                .and_then(|map| map.keys().find(|target| !ids.contains(*target)))
            {
                return Err(GraphError::invalid(format!(
                    "'{key}' has properties for '{stray}', which is not linked"
                )));
            }
            let mut out = Map::new();
            for target in ids {
                let props = fill_edge(name, rel, per_target.and_then(|map| map.get(target)))?;
                out.insert(target.clone(), Value::Object(props));
            }
            Ok(Some(Value::Object(out)))
        }
    }
}

fn fill_edge(name: &str, rel: &RelationshipDef, supplied: Option<&Value>) -> Result<Map<String, Value>> {
    let mut props = Map::new();
    for field in &rel.fields {
        if let Some(default) = &field.default {
            props.insert(field.name.clone(), default.clone());
        }
    }
    if let Some(value) = supplied {
        check_edge_fields(name, rel, value)?;
        if let Value::Object(map) = value {
            props.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
    Ok(props)
}

fn check_edge_fields(name: &str, rel: &RelationshipDef, value: &Value) -> Result<()> {
    match value {
        Value::Null => Ok(()),
        Value::Object(map) => match map
            .keys()
            .find(|key| !rel.fields.iter().any(|f| &f.name == *key))
        {
            Some(unknown) => Err(GraphError::invalid(format!(
                "relationship '{name}' has no edge field '{unknown}'"
            ))),
            None => Ok(()),
        },
        other => Err(GraphError::invalid(format!(
            "edge properties for '{name}' must be an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::query::compiler::CompilerSettings;
    use crate::schema::{Direction, EntityDescriptor, FieldDef, FieldType};

    fn article() -> EntityDescriptor {
        EntityDescriptor::new("Article", "article")
            .company_scoped()
            .field("title", FieldDef::of(FieldType::String))
            .field("status", FieldDef::of(FieldType::String).with_default("draft"))
            .field("publishedAt", FieldDef::of(FieldType::Datetime))
            .relationship(
                "author",
                RelationshipDef::new("WRITTEN_BY", "User")
                    .direction(Direction::In)
                    .required()
                    .context_key("userId"),
            )
            .relationship(
                "tags",
                RelationshipDef::new("TAGGED", "Tag")
                    .many()
                    .edge_field("weight", Some(json!(1))),
            )
    }

    fn input(value: Value) -> WriteInput {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn create_merges_defaults_and_links_the_tenant() {
        let descriptor = article();
        let settings = CompilerSettings::default();
        let statements = QueryCompiler::new(&descriptor, &settings)
            .create(
                &RequestContext::tenant("c1", "u1"),
                &input(json!({"id": "a1", "title": "Hello", "publishedAt": null})),
            )
            .expect("compiles");
        let text = statements.write.render().text;
        assert!(text.starts_with(
            "MATCH (company:Company {id: $companyId})\n\
             CREATE (article:Article {id: $id})\n\
             CREATE (article)-[:BELONGS_TO]->(company)\n\
             SET article.createdAt = datetime(), article.updatedAt = datetime(), \
             article.status = $status, article.title = $title"
        ));
        assert!(!text.contains("publishedAt"));
        assert!(text.ends_with("RETURN article.id AS id"));
        let params = statements.write.params();
        assert_eq!(params["status"], "draft");
        // author fell back to the context user
        assert_eq!(params["author"], json!(["u1"]));
        assert!(statements.precheck.is_some());
    }

    #[test]
    fn patch_touches_only_present_keys() {
        let descriptor = article();
        let settings = CompilerSettings::default();
        let text = QueryCompiler::new(&descriptor, &settings)
            .patch(
                &RequestContext::tenant("c1", "u1"),
                &input(json!({"id": "a1", "title": "New"})),
            )
            .expect("compiles")
            .write
            .render()
            .text;
        assert_eq!(
            text,
            "MATCH (article:Article {id: $id})-[:BELONGS_TO]->(company:Company {id: $companyId})\n\
             SET article.updatedAt = datetime(), article.title = $title\n\
             RETURN article.id AS id"
        );
    }

    #[test]
    fn put_clears_absent_fields() {
        let descriptor = article();
        let settings = CompilerSettings::default();
        let statements = QueryCompiler::new(&descriptor, &settings)
            .put(
                &RequestContext::tenant("c1", "u1"),
                &input(json!({"id": "a1", "title": "New"})),
            )
            .expect("compiles");
        let text = statements.write.render().text;
        assert!(text.contains("article.publishedAt = NULL"));
        assert!(text.contains("article.status = NULL"));
        assert!(text.contains("article.title = $title"));
        assert!(statements.precheck.is_none());
    }

    #[test]
    fn relationship_merge_replaces_stale_edges() {
        let descriptor = article();
        let settings = CompilerSettings::default();
        let statements = QueryCompiler::new(&descriptor, &settings)
            .patch(
                &RequestContext::tenant("c1", "u1"),
                &input(json!({
                    "id": "a1",
                    "tags": ["t1", "t2"],
                    "tagsEdgeProps": {"t2": {"weight": 5}}
                })),
            )
            .expect("compiles");
        let text = statements.write.render().text;
        assert!(text.contains(
            "CALL {\n  WITH article\n  MATCH (article)-[tags_stale:TAGGED]->(tags_existing:Tag)\n  \
             WHERE NOT (tags_existing.id IN $tags)\n  DELETE tags_stale\n}"
        ));
        assert!(text.contains(
            "CALL {\n  WITH article\n  UNWIND $tags AS tags_id\n  \
             MATCH (tags_target:Tag {id: tags_id})\n  \
             MERGE (article)-[tags_edge:TAGGED]->(tags_target)\n  \
             SET tags_edge += $tagsEdgeProps[tags_id]\n}"
        ));
        let props = &statements.write.params()["tagsEdgeProps"];
        assert_eq!(props["t1"], json!({"weight": 1}));
        assert_eq!(props["t2"], json!({"weight": 5}));
    }

    #[test]
    fn edge_only_update_keeps_links() {
        let descriptor = article();
        let settings = CompilerSettings::default();
        let text = QueryCompiler::new(&descriptor, &settings)
            .patch(
                &RequestContext::tenant("c1", "u1"),
                &input(json!({"id": "a1", "tagsEdgePropsUpdate": {"t1": {"weight": 9}}})),
            )
            .expect("compiles")
            .write
            .render()
            .text;
        assert!(text.contains("UNWIND keys($tagsEdgePropsUpdate) AS tags_id"));
        assert!(text.contains("SET tags_edge += $tagsEdgePropsUpdate[tags_id]"));
        assert!(!text.contains("DELETE"));
    }

    #[test]
    fn invalid_inputs_fail_before_any_statement() {
        let descriptor = article();
        let settings = CompilerSettings::default();
        let compiler = QueryCompiler::new(&descriptor, &settings);
        let ctx = RequestContext::tenant("c1", "u1");
        assert!(compiler.create(&ctx, &input(json!({"title": "x"}))).is_err());
        assert!(compiler
            .patch(&ctx, &input(json!({"id": "a1", "author": ["u1", "u2"]})))
            .is_err());
        assert!(compiler
            .patch(&ctx, &input(json!({"id": "a1", "tags": ["t1"], "tagsEdgeProps": {"t1": {"colour": 1}}})))
            .is_err());
        assert!(compiler
            .patch(&ctx, &input(json!({"id": "a1", "author": null})))
            .is_err());
    }

    #[test]
    fn delete_is_tenant_scoped() {
        let descriptor = article();
        let settings = CompilerSettings::default();
        let text = QueryCompiler::new(&descriptor, &settings)
            .delete(&RequestContext::tenant("c1", "u1"), "a1")
            .expect("compiles")
            .render()
            .text;
        assert_eq!(
            text,
            "MATCH (article:Article {id: $id})-[:BELONGS_TO]->(company:Company {id: $companyId})\n\
             WITH article, article.id AS deletedId\n\
             DETACH DELETE article\n\
             RETURN deletedId AS id"
        );
    }
}
