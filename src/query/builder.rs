//! Imperative statement builder used by the compilers.

use serde_json::Value;

use crate::error::{GraphError, Result};
use crate::query::ast::{
    BoolExpr, Clause, Expr, Pattern, Projection, SetItem, SortItem, Var,
};
use crate::query::statement::{Params, Statement};

/// Accumulates clauses and parameters for one statement.
///
/// Misuse (binding a parameter twice with different values, filtering when
/// no `MATCH` precedes) is recorded and surfaced by [`StatementBuilder::build`]
/// so call sites can keep chaining.
#[derive(Default)]
pub struct StatementBuilder {
    clauses: Vec<Clause>,
    params: Params,
    primary: Option<Var>,
    entity: Option<String>,
    error: Option<GraphError>,
}

impl StatementBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder for a statement about `entity`, whose rows are keyed by `primary`.
    pub fn for_entity(entity: impl Into<String>, primary: Option<Var>) -> Self {
        Self {
            entity: Some(entity.into()),
            primary,
            ..Self::default()
        }
    }

    /// Binds a parameter and returns its `$name` expression.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Expr {
        let name = name.into();
        let value = value.into();
        match self.params.get(&name) {
            Some(existing) if *existing != value => {
                self.record_error(GraphError::invalid(format!(
                    "parameter '{name}' bound twice with different values"
                )));
            }
            _ => {
                self.params.insert(name.clone(), value);
            }
        }
        Expr::Param(name)
    }

    /// Whether a parameter name is already taken.
    pub fn is_bound(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Appends `MATCH pattern`.
    pub fn r#match(&mut self, pattern: Pattern) -> &mut Self {
        self.push(Clause::Match {
            pattern,
            optional: false,
            predicate: None,
        })
    }

    /// Appends `OPTIONAL MATCH pattern`.
    pub fn optional_match(&mut self, pattern: Pattern) -> &mut Self {
        self.push(Clause::Match {
            pattern,
            optional: true,
            predicate: None,
        })
    }

    /// Appends `MATCH` or `OPTIONAL MATCH`.
    pub fn match_with(&mut self, pattern: Pattern, optional: bool) -> &mut Self {
        self.push(Clause::Match {
            pattern,
            optional,
            predicate: None,
        })
    }

    /// ANDs a predicate onto the most recent `MATCH` or `WITH`.
    pub fn filter(&mut self, predicate: BoolExpr) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        let slot = match self.clauses.last_mut() {
            Some(Clause::Match { predicate, .. }) | Some(Clause::With { predicate, .. }) => {
                predicate
            }
            _ => {
                self.record_error(GraphError::invalid(
                    "filter requires a preceding MATCH or WITH",
                ));
                return self;
            }
        };
        *slot = Some(match slot.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Appends `CALL procedure(args) YIELD ..`.
    pub fn call(&mut self, procedure: impl Into<String>, args: Vec<Expr>, yields: Vec<Var>) -> &mut Self {
        self.push(Clause::Call {
            procedure: procedure.into(),
            args,
            yields,
        })
    }

    /// Appends a unit subquery built by `nested`, merging its parameters.
    pub fn subquery(&mut self, imports: Vec<Var>, nested: StatementBuilder) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        if let Some(err) = nested.error {
            self.record_error(err);
            return self;
        }
        for (name, value) in nested.params {
            self.bind(name, value);
        }
        self.push(Clause::Subquery {
            imports,
            body: nested.clauses,
        })
    }

    /// Appends `WITH items`.
    pub fn with(&mut self, items: Vec<Projection>) -> &mut Self {
        self.push(Clause::With {
            items,
            distinct: false,
            predicate: None,
            order_by: Vec::new(),
            page: false,
        })
    }

    /// Appends `WITH DISTINCT items`.
    pub fn with_distinct(&mut self, items: Vec<Projection>) -> &mut Self {
        self.push(Clause::With {
            items,
            distinct: true,
            predicate: None,
            order_by: Vec::new(),
            page: false,
        })
    }

    /// Appends the ordered `WITH` that carries the page marker.
    pub fn with_page(
        &mut self,
        items: Vec<Projection>,
        order_by: Vec<SortItem>,
        distinct: bool,
    ) -> &mut Self {
        if self.clauses.iter().any(Clause::is_page_marker) {
            self.record_error(GraphError::invalid("statement already has a page marker"));
            return self;
        }
        self.push(Clause::With {
            items,
            distinct,
            predicate: None,
            order_by,
            page: true,
        })
    }

    /// Appends `UNWIND list AS var`.
    pub fn unwind(&mut self, list: Expr, var: Var) -> &mut Self {
        self.push(Clause::Unwind { list, var })
    }

    /// Appends `CREATE pattern`.
    pub fn create(&mut self, pattern: Pattern) -> &mut Self {
        self.push(Clause::Create { pattern })
    }

    /// Appends `MERGE pattern`.
    pub fn merge(&mut self, pattern: Pattern) -> &mut Self {
        self.push(Clause::Merge { pattern })
    }

    /// Appends `SET items`; empty assignment lists are skipped.
    pub fn set(&mut self, items: Vec<SetItem>) -> &mut Self {
        if items.is_empty() {
            return self;
        }
        self.push(Clause::Set { items })
    }

    /// Appends `DELETE` / `DETACH DELETE`.
    pub fn delete(&mut self, vars: Vec<Var>, detach: bool) -> &mut Self {
        self.push(Clause::Delete { vars, detach })
    }

    /// Appends `RETURN items ORDER BY ..`.
    pub fn ret(&mut self, items: Vec<Projection>, order_by: Vec<SortItem>) -> &mut Self {
        self.push(Clause::Return {
            items,
            distinct: false,
            order_by,
        })
    }

    /// Appends an already-built clause.
    pub fn push(&mut self, clause: Clause) -> &mut Self {
        if self.error.is_none() {
            self.clauses.push(clause);
        }
        self
    }

    /// Records a failure to report from [`build`](Self::build).
    pub fn record_error(&mut self, err: GraphError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Finishes the statement.
    pub fn build(self) -> Result<Statement> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.clauses.is_empty() {
            return Err(GraphError::invalid("statement has no clauses"));
        }
        Ok(Statement {
            clauses: self.clauses,
            params: self.params,
            primary: self.primary,
            entity: self.entity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::{Comparison, NodePattern};

    #[test]
    fn builder_adds_match_filter_and_return() {
        let n = Var::new("n");
        let mut builder = StatementBuilder::for_entity("Tag", Some(n.clone()));
        let id = builder.bind("searchValue", "t1");
        builder
            .r#match(Pattern::node(NodePattern::labeled(&n, "Tag")))
            .filter(BoolExpr::Cmp(Comparison::Eq(n.prop("id"), id)))
            .ret(vec![Projection::from(&n)], Vec::new());
        let statement = builder.build().expect("builder should succeed");
        assert_eq!(
            statement.render().text,
            "MATCH (n:Tag)\nWHERE n.id = $searchValue\nRETURN n"
        );
        assert_eq!(statement.params()["searchValue"], "t1");
        assert_eq!(statement.entity(), Some("Tag"));
    }

    #[test]
    fn conflicting_parameters_fail_the_build() {
        let mut builder = StatementBuilder::new();
        builder.bind("id", "a");
        builder.bind("id", "b");
        builder.r#match(Pattern::node(NodePattern::default()));
        assert!(matches!(
            builder.build(),
            Err(GraphError::InvalidArgument(_))
        ));
    }

    #[test]
    fn filter_without_match_is_rejected() {
        let mut builder = StatementBuilder::new();
        builder.filter(BoolExpr::Cmp(Comparison::IsNull(Expr::Null)));
        assert!(builder.build().is_err());
    }

    #[test]
    fn subquery_parameters_merge_into_parent() {
        let n = Var::new("n");
        let mut nested = StatementBuilder::new();
        let ids = nested.bind("tags", vec!["t1", "t2"]);
        nested.unwind(ids, Var::new("tag_id"));
        let mut builder = StatementBuilder::new();
        builder
            .r#match(Pattern::node(NodePattern::labeled(&n, "Article")))
            .subquery(vec![n.clone()], nested);
        let statement = builder.build().expect("builder should succeed");
        assert!(statement.params().contains_key("tags"));
        assert!(statement.render().text.contains("UNWIND $tags AS tag_id"));
    }
}
