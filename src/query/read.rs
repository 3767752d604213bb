//! Read statements: find, find by id, find by related, similarity search.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{GraphError, Result};
use crate::query::ast::{
    BoolExpr, Clause, Comparison, Expr, NodePattern, Pattern, Projection, SortItem, Var,
};
use crate::query::builder::StatementBuilder;
use crate::query::compiler::{equals, QueryCompiler, SEARCH_PARAM};
use crate::query::context::RequestContext;
use crate::query::search::fulltext_pattern;
use crate::query::statement::Statement;
use crate::schema::{Cardinality, OrderBy, ReturnScope, SortDirection};

/// Caller-controlled knobs for list reads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindParams {
    /// Free-text term matched against the descriptor's full-text index.
    pub term: Option<String>,
    /// Explicit ordering; must name a declared or system field.
    pub order_by: Option<OrderBy>,
    /// Equality filters on declared fields.
    pub filters: BTreeMap<String, Value>,
}

impl FindParams {
    /// Sets the search term.
    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.term = Some(term.into());
        self
    }

    /// Sets the ordering.
    pub fn order(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    /// Adds an equality filter.
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }
}

/// Where the candidate entity nodes come from.
enum Source {
    Label,
    Index {
        procedure: &'static str,
        args: Vec<Expr>,
    },
}

impl<'a> QueryCompiler<'a> {
    /// Paginated list read.
    pub fn find(&self, ctx: &RequestContext, params: &FindParams) -> Result<Statement> {
        self.list(ctx, params, None)
    }

    /// Paginated list of entities linked through `relationship` to any of `related_ids`.
    pub fn find_by_related(
        &self,
        ctx: &RequestContext,
        relationship: &str,
        related_ids: &[String],
        params: &FindParams,
    ) -> Result<Statement> {
        // Resolve first so an unknown name fails before anything is built.
        self.descriptor.relationship_def(relationship)?;
        self.list(ctx, params, Some((relationship, related_ids)))
    }

    /// Single entity by id, with the same traversals as [`find`](Self::find).
    pub fn find_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Statement> {
        let mut b = self.builder();
        let node = self.node();
        self.open(&mut b, ctx, Source::Label)?;
        let id_param = b.bind(SEARCH_PARAM, id);
        b.filter(BoolExpr::Cmp(Comparison::Eq(node.prop("id"), id_param)));
        self.traverse_and_return(&mut b, vec![node], Vec::new());
        b.build()
    }

    /// Nearest neighbours of `vector` through the descriptor's vector index.
    pub fn find_similar(&self, ctx: &RequestContext, vector: &[f64], k: usize) -> Result<Statement> {
        let index = self.descriptor.vector_index().ok_or_else(|| {
            GraphError::invalid(format!(
                "{} declares no vector index",
                self.descriptor.label()
            ))
        })?;
        if k == 0 {
            return Err(GraphError::invalid("similarity search needs k > 0"));
        }
        let mut b = self.builder();
        let args = vec![
            Expr::Name(index.name.clone()),
            b.bind("k", k as u64),
            b.bind("vector", vector.to_vec()),
        ];
        let score = self
            .open(
                &mut b,
                ctx,
                Source::Index {
                    procedure: "db.index.vector.queryNodes",
                    args,
                },
            )?
            .ok_or_else(|| GraphError::invalid("vector lookup yields no score"))?;
        let order = vec![SortItem {
            expr: score.expr(),
            descending: true,
        }];
        self.traverse_and_return(&mut b, vec![self.node(), score], order);
        b.build()
    }

    /// Whether an entity with `id` exists anywhere, ignoring tenant scope.
    pub fn exists_unscoped(&self, id: &str) -> Result<Statement> {
        let node = self.node();
        let mut b = StatementBuilder::for_entity(self.descriptor.label(), None);
        let id_param = b.bind(SEARCH_PARAM, id);
        let count = Expr::call("count", vec![node.expr()]);
        b.r#match(Pattern::node(NodePattern::labeled(&node, self.descriptor.label())))
            .filter(BoolExpr::Cmp(Comparison::Eq(node.prop("id"), id_param)))
            .ret(
                vec![Projection::Expr {
                    expr: Expr::Bool(Box::new(BoolExpr::Cmp(Comparison::Gt(
                        count,
                        Expr::Int(0),
                    )))),
                    alias: "exists".into(),
                }],
                Vec::new(),
            );
        b.build()
    }

    fn list(
        &self,
        ctx: &RequestContext,
        params: &FindParams,
        related: Option<(&str, &[String])>,
    ) -> Result<Statement> {
        let mut b = self.builder();
        let node = self.node();

        let pattern = match (&self.descriptor.fulltext_index_name, params.term.as_deref()) {
            (Some(index), Some(term)) => fulltext_pattern(term).map(|p| (index.clone(), p)),
            _ => None,
        };
        let source = match pattern {
            Some((index, pattern)) => Source::Index {
                procedure: "db.index.fulltext.queryNodes",
                args: vec![Expr::Name(index), b.bind("term", pattern)],
            },
            None => Source::Label,
        };
        let score = self.open(&mut b, ctx, source)?;
        self.apply_filters(&mut b, &params.filters)?;
        self.require_mandatory_edges(&mut b);

        if let Some((name, ids)) = related {
            let rel = self.descriptor.relationship_def(name)?;
            let target = Var::new("related");
            let ids_param = b.bind("relatedIds", ids.to_vec());
            b.r#match(self.relationship_pattern(
                None,
                &rel.relationship_label,
                rel.direction,
                NodePattern::labeled(&target, rel.target_label.clone()),
            ))
            .filter(BoolExpr::Cmp(Comparison::In(target.prop("id"), ids_param)));
        }

        let order = match &score {
            Some(score) => vec![SortItem {
                expr: score.expr(),
                descending: true,
            }],
            None => self.order_items(params.order_by.as_ref())?,
        };
        let mut carried = vec![node];
        carried.extend(score);
        b.with_page(
            carried.iter().map(Projection::from).collect(),
            order.clone(),
            related.is_some(),
        );
        self.traverse_and_return(&mut b, carried, order);
        b.build()
    }

    /// Emits the clauses that bind the entity node, tenant-restricted when
    /// required. Index sources also bind and return the `score` variable.
    fn open(
        &self,
        b: &mut StatementBuilder,
        ctx: &RequestContext,
        source: Source,
    ) -> Result<Option<Var>> {
        let node = self.node();
        let label = self.descriptor.label();
        let scope = self.scoped_for(ctx)?;
        match source {
            Source::Label => {
                let start = NodePattern::labeled(&node, label);
                match scope {
                    Some(company) => {
                        let tenant = self.tenant_pattern(b, &company);
                        b.r#match(Pattern::node(tenant));
                        b.r#match(self.membership_pattern(start, NodePattern::var(&self.tenant_var())));
                    }
                    None => {
                        b.r#match(Pattern::node(start));
                    }
                }
                Ok(None)
            }
            Source::Index { procedure, args } => {
                let hit = Var::new("node");
                let score = Var::new("score");
                b.call(procedure, args, vec![hit.clone(), score.clone()]);
                b.push(Clause::With {
                    items: vec![
                        Projection::Var {
                            var: hit,
                            alias: Some(node.as_str().to_owned()),
                        },
                        Projection::from(&score),
                    ],
                    distinct: false,
                    predicate: Some(BoolExpr::Cmp(Comparison::HasLabel(
                        node.clone(),
                        label.to_owned(),
                    ))),
                    order_by: Vec::new(),
                    page: false,
                });
                if let Some(company) = scope {
                    let tenant = self.tenant_pattern(b, &company);
                    b.r#match(self.membership_pattern(NodePattern::var(&node), tenant));
                }
                Ok(Some(score))
            }
        }
    }

    fn apply_filters(
        &self,
        b: &mut StatementBuilder,
        filters: &BTreeMap<String, Value>,
    ) -> Result<()> {
        let node = self.node();
        for (field, value) in filters {
            if !self.descriptor.knows_property(field) {
                return Err(GraphError::invalid(format!(
                    "{} has no field '{field}' to filter on",
                    self.descriptor.label()
                )));
            }
            let param = if value.is_null() {
                Expr::Null
            } else {
                b.bind(format!("filter_{field}"), value.clone())
            };
            b.filter(equals(node.prop(field.as_str()), param, value));
        }
        Ok(())
    }

    /// Drops entities lacking a required `one` edge before the page window,
    /// so the window and the derived count only see rows the traversal keeps.
    fn require_mandatory_edges(&self, b: &mut StatementBuilder) {
        for rel in self.descriptor.relationships.values() {
            if rel.is_optional() {
                continue;
            }
            b.filter(BoolExpr::Exists(Box::new(self.relationship_pattern(
                None,
                &rel.relationship_label,
                rel.direction,
                NodePattern::anonymous(rel.target_label.clone()),
            ))));
        }
    }

    /// Caller order, else descriptor default, else `updatedAt DESC`.
    pub(crate) fn order_items(&self, requested: Option<&OrderBy>) -> Result<Vec<SortItem>> {
        let order = match requested {
            Some(order) if self.descriptor.knows_property(&order.field) => order.clone(),
            Some(order) => {
                return Err(GraphError::invalid(format!(
                    "{} cannot be ordered by '{}'",
                    self.descriptor.label(),
                    order.field
                )))
            }
            None => self
                .descriptor
                .default_order_by
                .clone()
                .unwrap_or_else(|| OrderBy::desc("updatedAt")),
        };
        Ok(vec![SortItem {
            expr: self.node().prop(order.field),
            descending: order.direction == SortDirection::Desc,
        }])
    }

    /// Relationship traversals in name order, then the final projection.
    ///
    /// `bound` holds the variables in scope when traversal starts. Every
    /// traversal is followed by an aggregating `WITH` carrying the variables
    /// bound so far: `one` keeps the first related node, so a source row never
    /// fans out, and `many` collects the distinct targets.
    fn traverse_and_return(&self, b: &mut StatementBuilder, mut bound: Vec<Var>, order: Vec<SortItem>) {
        let node = self.node();
        let mut columns = vec![Projection::from(&node)];
        for (name, rel) in &self.descriptor.relationships {
            let target = Var::new(format!("{node}_{name}"));
            let rel_var = (!rel.fields.is_empty())
                .then(|| Var::new(format!("{node}_{name}_relationship")));
            b.match_with(
                self.relationship_pattern(
                    rel_var.clone(),
                    &rel.relationship_label,
                    rel.direction,
                    NodePattern::labeled(&target, rel.target_label.clone()),
                ),
                rel.is_optional(),
            );
            match rel.cardinality {
                Cardinality::One => {
                    let mut items: Vec<Projection> = bound.iter().map(Projection::from).collect();
                    items.push(first_of(&target));
                    if let Some(rel_var) = &rel_var {
                        items.push(first_of(rel_var));
                    }
                    b.with(items);
                    bound.push(target.clone());
                    columns.push(Projection::from(&target));
                    if let Some(rel_var) = rel_var {
                        for field in &rel.fields {
                            columns.push(Projection::Expr {
                                expr: rel_var.prop(field.name.clone()),
                                alias: format!("{node}_{name}_{}", field.name),
                            });
                        }
                        bound.push(rel_var);
                    }
                }
                Cardinality::Many => {
                    let mut items: Vec<Projection> = bound.iter().map(Projection::from).collect();
                    items.push(Projection::Expr {
                        expr: Expr::call_distinct("collect", target.expr()),
                        alias: target.as_str().to_owned(),
                    });
                    let edges = Var::new(format!("{target}_edges"));
                    if let Some(rel_var) = &rel_var {
                        let edge_props = rel
                            .fields
                            .iter()
                            .map(|f| (f.name.clone(), rel_var.prop(f.name.clone())))
                            .collect();
                        let entry = Expr::Case {
                            when: Box::new(BoolExpr::Cmp(Comparison::IsNull(target.expr()))),
                            then: Box::new(Expr::Null),
                            otherwise: Box::new(Expr::Map(vec![
                                ("relatedId".into(), target.prop("id")),
                                ("edgeProps".into(), Expr::Map(edge_props)),
                            ])),
                        };
                        items.push(Projection::Expr {
                            expr: Expr::call_distinct("collect", entry),
                            alias: edges.as_str().to_owned(),
                        });
                    }
                    b.with(items);
                    bound.push(target.clone());
                    columns.push(Projection::from(&target));
                    if rel_var.is_some() {
                        columns.push(Projection::from(&edges));
                        bound.push(edges);
                    }
                }
            }
        }
        match &self.descriptor.return_clause {
            Some(custom) => {
                b.push((custom.0)(&ReturnScope {
                    node: &node,
                    bound: &bound,
                }));
            }
            None => {
                b.ret(columns, order);
            }
        }
    }
}

/// `head(collect(var)) AS var`
fn first_of(var: &Var) -> Projection {
    Projection::Expr {
        expr: Expr::call("head", vec![Expr::call("collect", vec![var.expr()])]),
        alias: var.as_str().to_owned(),
    }
}
