//! Recursive document assembly.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::error::{GraphError, Result};
use crate::jsonapi::document::{
    Document, Links, PrimaryData, Relationship, RelationshipData, Resource, ResourceIdentifier,
};
use crate::jsonapi::included::IncludedSet;
use crate::jsonapi::serializer::{
    FieldSource, RelationshipSpec, SerializerDescriptor, SerializerResolver, JOIN_SEPARATOR,
};
use crate::pagination::{Cursor, Page, Paginator};
use crate::query::RequestContext;

/// Per-request inputs to assembly.
#[derive(Clone, Debug, Default)]
pub struct AssemblyContext {
    /// Caller identity, handed to computed fields.
    pub request: RequestContext,
    /// Types allowed in `included`; `None` keeps everything.
    pub include: Option<Vec<String>>,
    /// URL of the request being answered.
    pub request_url: Option<Url>,
    /// Cursor of the page being rendered.
    pub cursor: Option<Cursor>,
    /// Total matching rows.
    pub total: Option<u64>,
}

impl AssemblyContext {
    /// Context for `request` with nothing else set.
    pub fn new(request: RequestContext) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    /// Restricts `included` to these types.
    pub fn with_include<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the request URL used for links.
    pub fn with_request_url(mut self, url: Url) -> Self {
        self.request_url = Some(url);
        self
    }

    /// Sets the page position and total.
    pub fn with_page(mut self, cursor: Cursor, total: Option<u64>) -> Self {
        self.cursor = Some(cursor);
        self.total = total;
        self
    }
}

type Assembled = (Resource, IncludedSet);

/// Related values found under a relationship key.
enum Related<'v> {
    One(Option<&'v Value>),
    Many(Vec<&'v Value>),
}

/// Builds JSON:API documents from entities and serializer descriptors.
#[derive(Clone, Debug, Default)]
pub struct DocumentAssembler {
    base_url: Option<Url>,
}

impl DocumentAssembler {
    /// Assembler without resource self links.
    pub fn new() -> Self {
        Self::default()
    }

    /// Base for `links.self` on serializers that ask for it.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Base used for resource self links, if any.
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Document for one entity; `None` renders `data: null`.
    pub async fn single(
        &self,
        serializer: &SerializerDescriptor,
        entity: Option<&Value>,
        ctx: &AssemblyContext,
    ) -> Result<Document> {
        let (data, included) = match entity {
            Some(entity) => {
                let (resource, included) = self.resource(serializer, entity, ctx).await?;
                let primary = [primary_key(&resource)];
                let included = included.finish(ctx.include.as_deref(), &primary);
                (Some(Box::new(resource)), included)
            }
            None => (None, Vec::new()),
        };
        Ok(Document {
            links: ctx
                .request_url
                .as_ref()
                .map(|url| Links::to_self(url.to_string())),
            data: Some(PrimaryData::One(data)),
            included,
            ..Document::default()
        })
    }

    /// Document for a list. Items are serialized concurrently and come back
    /// in source order.
    pub async fn list(
        &self,
        serializer: &SerializerDescriptor,
        entities: &[Value],
        ctx: &AssemblyContext,
    ) -> Result<Document> {
        let started = Instant::now();
        let assembled = join_all(
            entities
                .iter()
                .map(|entity| self.resource(serializer, entity, ctx)),
        )
        .await;
        let mut resources = Vec::with_capacity(assembled.len());
        let mut included = IncludedSet::new();
        for item in assembled {
            let (resource, found) = item?;
            included.extend(found);
            resources.push(resource);
        }
        let primary: Vec<(String, String)> = resources.iter().map(primary_key).collect();
        let included = included.finish(ctx.include.as_deref(), &primary);
        let links = ctx.request_url.as_ref().map(|url| {
            let cursor = ctx.cursor.clone().unwrap_or_default();
            Paginator::links(url, &cursor, resources.len(), ctx.total)
        });
        let meta = ctx.total.map(|total| {
            let mut meta = Map::new();
            meta.insert("total".into(), Value::from(total));
            meta
        });
        debug!(
            resource_type = %serializer.resource_type,
            items = resources.len(),
            included = included.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "jsonapi.list.assembled"
        );
        Ok(Document {
            links,
            data: Some(PrimaryData::Many(resources)),
            included,
            meta,
            errors: Vec::new(),
        })
    }

    /// Document for a repository page; cursor and total come from the page.
    pub async fn page(
        &self,
        serializer: &SerializerDescriptor,
        page: &Page<Value>,
        ctx: &AssemblyContext,
    ) -> Result<Document> {
        let ctx = ctx.clone().with_page(page.cursor.clone(), page.total);
        self.list(serializer, &page.items, &ctx).await
    }

    /// Resolves id, attributes, meta and relationships, in that order.
    fn resource<'a>(
        &'a self,
        serializer: &'a SerializerDescriptor,
        entity: &'a Value,
        ctx: &'a AssemblyContext,
    ) -> BoxFuture<'a, Result<Assembled>> {
        async move {
            let request = &ctx.request;
            let id = id_of(&serializer.id.resolve(entity, request)).ok_or_else(|| {
                GraphError::mapping(format!(
                    "{}: entity has no usable id",
                    serializer.resource_type
                ))
            })?;
            let attributes = resolve_all(&serializer.attributes, entity, request);
            let meta = resolve_all(&serializer.meta, entity, request);

            let mut included = IncludedSet::new();
            let mut relationships = BTreeMap::new();
            for (name, spec) in &serializer.relationships {
                let data = match spec {
                    RelationshipSpec::Identifier { resource_type, id } => {
                        linkage(name, resource_type, &id.resolve(entity, request))?
                    }
                    RelationshipSpec::Nested {
                        serializer: fallback,
                        resolver,
                    } => {
                        let Some(related) = related_values(entity, name) else {
                            continue;
                        };
                        match related {
                            Related::One(None) => RelationshipData::One(None),
                            Related::One(Some(item)) => {
                                let (resource, found) =
                                    self.related(item, fallback, resolver.as_ref(), ctx).await?;
                                let identifier = resource.identifier();
                                included.insert(resource);
                                included.extend(found);
                                RelationshipData::One(Some(identifier))
                            }
                            Related::Many(items) => {
                                let assembled = join_all(items.into_iter().map(|item| {
                                    self.related(item, fallback, resolver.as_ref(), ctx)
                                }))
                                .await;
                                let mut identifiers = Vec::with_capacity(assembled.len());
                                for item in assembled {
                                    let (resource, found) = item?;
                                    identifiers.push(resource.identifier());
                                    included.insert(resource);
                                    included.extend(found);
                                }
                                RelationshipData::Many(identifiers)
                            }
                        }
                    }
                };
                relationships.insert(name.clone(), Relationship { data, links: None });
            }

            let links = match (&self.base_url, serializer.self_link) {
                (Some(base), true) => Some(Links::to_self(format!(
                    "{}/{}/{}",
                    base.as_str().trim_end_matches('/'),
                    serializer.resource_type,
                    id
                ))),
                _ => None,
            };
            let resource = Resource {
                resource_type: serializer.resource_type.clone(),
                id,
                attributes,
                relationships: (!relationships.is_empty()).then_some(relationships),
                links,
                meta: (!meta.is_empty()).then_some(meta),
            };
            Ok((resource, included))
        }
        .boxed()
    }

    async fn related(
        &self,
        item: &Value,
        fallback: &Arc<SerializerDescriptor>,
        resolver: Option<&SerializerResolver>,
        ctx: &AssemblyContext,
    ) -> Result<Assembled> {
        let chosen = resolver
            .and_then(|resolve| resolve(item))
            .unwrap_or_else(|| Arc::clone(fallback));
        self.resource(&chosen, item, ctx).await
    }
}

fn primary_key(resource: &Resource) -> (String, String) {
    (resource.resource_type.clone(), resource.id.clone())
}

fn resolve_all(
    sources: &[(String, FieldSource)],
    entity: &Value,
    request: &RequestContext,
) -> Map<String, Value> {
    sources
        .iter()
        .map(|(name, source)| (name.clone(), source.resolve(entity, request)))
        .collect()
}

/// Ids are strings, numbers, or objects carrying either under `id`.
fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        Value::Object(map) => map.get("id").and_then(id_of),
        _ => None,
    }
}

fn linkage(name: &str, resource_type: &str, value: &Value) -> Result<RelationshipData> {
    let identifier = |value: &Value| {
        id_of(value)
            .map(|id| ResourceIdentifier::new(resource_type, id))
            .ok_or_else(|| {
                GraphError::mapping(format!("relationship '{name}' has an unusable id: {value}"))
            })
    };
    match value {
        Value::Null => Ok(RelationshipData::One(None)),
        Value::Array(items) => items
            .iter()
            .map(identifier)
            .collect::<Result<Vec<_>>>()
            .map(RelationshipData::Many),
        other => identifier(other).map(|id| RelationshipData::One(Some(id))),
    }
}

/// Finds the values behind a nested relationship key; `None` when the
/// entity does not carry the key at all.
fn related_values<'v>(entity: &'v Value, key: &str) -> Option<Related<'v>> {
    if let Some((join, target)) = key.split_once(JOIN_SEPARATOR) {
        if let Some(Value::Array(rows)) = entity.get(join) {
            return Some(Related::Many(
                rows.iter()
                    .filter_map(|row| row.get(target))
                    .filter(|value| value.is_object())
                    .collect(),
            ));
        }
    }
    match entity.get(key)? {
        Value::Null => Some(Related::One(None)),
        Value::Array(items) => Some(Related::Many(
            items.iter().filter(|item| !item.is_null()).collect(),
        )),
        other => Some(Related::One(Some(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> Arc<SerializerDescriptor> {
        SerializerDescriptor::new("users").attribute("name").shared()
    }

    #[tokio::test]
    async fn single_resolves_attributes_and_links() {
        let articles = SerializerDescriptor::new("articles")
            .attribute("title")
            .nested("author", users())
            .identifier("company", "companies", FieldSource::field("companyId"))
            .meta(
                "wordCount",
                FieldSource::computed(|e, _| {
                    json!(e["body"].as_str().map_or(0, |b| b.split_whitespace().count()))
                }),
            )
            .with_self_link();
        let assembler =
            DocumentAssembler::new().with_base_url(Url::parse("https://api.test/").expect("url"));
        let entity = json!({
            "id": "a1", "title": "Hi", "body": "one two three", "companyId": "c1",
            "author": {"id": "u1", "name": "Ada"}
        });
        let ctx = AssemblyContext::new(RequestContext::system())
            .with_request_url(Url::parse("https://api.test/articles/a1").expect("url"));
        let doc = assembler
            .single(&articles, Some(&entity), &ctx)
            .await
            .expect("assembles");
        let body = serde_json::to_value(&doc).expect("serializes");
        assert_eq!(body["links"]["self"], "https://api.test/articles/a1");
        assert_eq!(body["data"]["links"]["self"], "https://api.test/articles/a1");
        assert_eq!(body["data"]["meta"]["wordCount"], 3);
        assert_eq!(body["data"]["relationships"]["company"]["data"]["id"], "c1");
        assert_eq!(body["data"]["relationships"]["author"]["data"]["type"], "users");
        assert_eq!(body["included"][0]["attributes"]["name"], "Ada");
    }

    #[tokio::test]
    async fn list_without_request_url_has_no_links() {
        let doc = DocumentAssembler::new()
            .list(&users(), &[json!({"id": "u1", "name": "Ada"})], &AssemblyContext::default())
            .await
            .expect("assembles");
        assert!(doc.links.is_none());
        assert_eq!(doc.primary().len(), 1);
    }

    #[tokio::test]
    async fn missing_id_is_a_mapping_error() {
        let err = DocumentAssembler::new()
            .single(&users(), Some(&json!({"name": "nobody"})), &AssemblyContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MappingError");
    }

    #[test]
    fn join_keys_read_the_first_segment() {
        let entity = json!({"members": [{"user": {"id": "u1"}}, {"user": {"id": "u2"}}, {"role": "x"}]});
        match related_values(&entity, "members__user") {
            Some(Related::Many(items)) => assert_eq!(items.len(), 2),
            _ => panic!("expected a join list"),
        }
        assert!(related_values(&entity, "owner").is_none());
    }
}
