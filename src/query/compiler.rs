//! Descriptor-driven statement compiler: shared plumbing.
//!
//! The read, write and integrity compilers live in sibling modules as further
//! `impl QueryCompiler` blocks; this file holds the settings, the tenant
//! scoping helpers and the type casts they share.

use serde_json::Value;

use crate::error::{GraphError, Result};
use crate::pagination::DEFAULT_TAKE;
use crate::query::ast::{
    BoolExpr, Comparison, EdgeDirection, Expr, NodePattern, Pattern, Var,
};
use crate::query::builder::StatementBuilder;
use crate::query::context::RequestContext;
use crate::schema::{Direction, EntityDescriptor, FieldType};

/// Parameter carrying the caller's tenant id.
pub const COMPANY_PARAM: &str = "companyId";
/// Parameter carrying the id a single-entity lookup searches for.
pub const SEARCH_PARAM: &str = "searchValue";

/// Deployment-wide knobs the compiler needs besides the descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerSettings {
    /// Label of tenant nodes.
    pub tenant_label: String,
    /// Relationship linking scoped entities to their tenant.
    pub membership_edge: String,
    /// Page size when the caller does not pass `take`.
    pub default_take: usize,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            tenant_label: "Company".into(),
            membership_edge: "BELONGS_TO".into(),
            default_take: DEFAULT_TAKE,
        }
    }
}

/// Compiles statements for one descriptor.
#[derive(Clone, Copy)]
pub struct QueryCompiler<'a> {
    pub(crate) descriptor: &'a EntityDescriptor,
    pub(crate) settings: &'a CompilerSettings,
}

impl<'a> QueryCompiler<'a> {
    /// Binds a compiler to a descriptor and the deployment settings.
    pub fn new(descriptor: &'a EntityDescriptor, settings: &'a CompilerSettings) -> Self {
        Self {
            descriptor,
            settings,
        }
    }

    /// Descriptor this compiler works for.
    pub fn descriptor(&self) -> &'a EntityDescriptor {
        self.descriptor
    }

    pub(crate) fn node(&self) -> Var {
        self.descriptor.node_var()
    }

    pub(crate) fn tenant_var(&self) -> Var {
        Var::new("company")
    }

    pub(crate) fn builder(&self) -> StatementBuilder {
        StatementBuilder::for_entity(self.descriptor.label(), Some(self.node()))
    }

    /// Whether reads and writes for `ctx` must be restricted to its tenant.
    ///
    /// Elevation is evaluated once here; callers branch on the result.
    pub(crate) fn scoped_for(&self, ctx: &RequestContext) -> Result<Option<String>> {
        if !self.descriptor.is_company_scoped || ctx.elevated {
            return Ok(None);
        }
        match ctx.company_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(Some(id.to_owned())),
            _ => Err(GraphError::MissingTenant {
                entity: self.descriptor.label().to_owned(),
            }),
        }
    }

    /// `(company:Company {id: $companyId})`
    pub(crate) fn tenant_pattern(&self, b: &mut StatementBuilder, company_id: &str) -> NodePattern {
        let param = b.bind(COMPANY_PARAM, company_id);
        NodePattern::labeled(&self.tenant_var(), self.settings.tenant_label.clone())
            .with_prop("id", param)
    }

    /// `(node)-[:BELONGS_TO]->(company)` starting from `start`.
    pub(crate) fn membership_pattern(&self, start: NodePattern, tenant: NodePattern) -> Pattern {
        Pattern::node(start).hop(
            None,
            self.settings.membership_edge.clone(),
            EdgeDirection::Out,
            tenant,
        )
    }

    /// Matches the entity node by id, scoped to the caller's tenant unless elevated.
    pub(crate) fn match_by_id(
        &self,
        b: &mut StatementBuilder,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<()> {
        let node = self.node();
        let id_param = b.bind("id", id);
        let start = NodePattern::labeled(&node, self.descriptor.label()).with_prop("id", id_param);
        match self.scoped_for(ctx)? {
            Some(company) => {
                let tenant = self.tenant_pattern(b, &company);
                b.r#match(self.membership_pattern(start, tenant));
            }
            None => {
                b.r#match(Pattern::node(start));
            }
        }
        Ok(())
    }

    /// Relationship hop from the entity node to `target`, honouring direction.
    pub(crate) fn relationship_pattern(
        &self,
        rel_var: Option<Var>,
        rel_type: &str,
        direction: Direction,
        target: NodePattern,
    ) -> Pattern {
        Pattern::node(NodePattern::var(&self.node())).hop(
            rel_var,
            rel_type,
            edge_direction(direction),
            target,
        )
    }
}

pub(crate) fn edge_direction(direction: Direction) -> EdgeDirection {
    match direction {
        Direction::Out => EdgeDirection::Out,
        Direction::In => EdgeDirection::In,
    }
}

/// Wraps a parameter in the cast its declared type requires.
pub(crate) fn cast(field_type: FieldType, value: Expr) -> Expr {
    let item = Var::new("value");
    match field_type {
        FieldType::Datetime => Expr::call("datetime", vec![value]),
        FieldType::Date => date_of(value),
        FieldType::DatetimeList => Expr::ListComprehension {
            map: Box::new(Expr::call("datetime", vec![item.expr()])),
            var: item,
            list: Box::new(value),
        },
        FieldType::DateList => Expr::ListComprehension {
            map: Box::new(date_of(item.expr())),
            var: item,
            list: Box::new(value),
        },
        _ => value,
    }
}

fn date_of(value: Expr) -> Expr {
    Expr::call("date", vec![Expr::call("left", vec![value, Expr::Int(10)])])
}

/// `lhs = rhs`, or `lhs IS NULL` when the bound value is null.
pub(crate) fn equals(lhs: Expr, rhs: Expr, value: &Value) -> BoolExpr {
    if value.is_null() {
        BoolExpr::Cmp(Comparison::IsNull(lhs))
    } else {
        BoolExpr::Cmp(Comparison::Eq(lhs, rhs))
    }
}
