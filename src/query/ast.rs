//! Clause-level abstract syntax tree for compiled Cypher statements.
//!
//! Compilers assemble these nodes; nothing is turned into text until
//! [`Statement::render`](crate::query::Statement::render) runs. Expressions
//! are kept as small typed nodes so the only strings that ever reach the
//! output are identifiers the descriptor validated and `$parameter` names.

use std::fmt;

/// Identifier assigned to a binding (node, edge or projected value).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Var(pub String);

impl Var {
    /// Creates a variable.
    pub fn new(name: impl Into<String>) -> Self {
        Var(name.into())
    }

    /// Variable name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Property access on this variable.
    pub fn prop(&self, prop: impl Into<String>) -> Expr {
        Expr::Prop(self.clone(), prop.into())
    }

    /// The variable as an expression.
    pub fn expr(&self) -> Expr {
        Expr::Var(self.clone())
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Var {
    fn from(value: &str) -> Self {
        Var(value.to_owned())
    }
}

/// Direction selector for edge patterns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeDirection {
    /// `(a)-[..]->(b)`
    Out,
    /// `(a)<-[..]-(b)`
    In,
    /// `(a)-[..]-(b)`
    Both,
}

impl Default for EdgeDirection {
    fn default() -> Self {
        EdgeDirection::Out
    }
}

/// Expressions that may appear in predicates, projections and assignments.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A bound variable.
    Var(Var),
    /// `var.prop`
    Prop(Var, String),
    /// `$name`
    Param(String),
    /// `$map[key]`, a dynamic lookup into a map parameter.
    ParamIndex(String, Box<Expr>),
    /// `NULL`
    Null,
    /// Integer literal produced by the compiler (never caller input).
    Int(i64),
    /// Quoted string literal holding a validated identifier (index names).
    Name(String),
    /// Function call such as `datetime($p)` or `count(DISTINCT n)`.
    Call {
        /// Function name.
        name: String,
        /// Whether the single argument is prefixed with `DISTINCT`.
        distinct: bool,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// `[v IN list | map]`
    ListComprehension {
        /// Loop variable.
        var: Var,
        /// Source list.
        list: Box<Expr>,
        /// Mapped expression.
        map: Box<Expr>,
    },
    /// `{key: expr, ..}`
    Map(Vec<(String, Expr)>),
    /// `CASE WHEN cond THEN a ELSE b END`
    Case {
        /// Condition.
        when: Box<BoolExpr>,
        /// Value when the condition holds.
        then: Box<Expr>,
        /// Fallback value.
        otherwise: Box<Expr>,
    },
    /// `keys(expr)`
    Keys(Box<Expr>),
    /// Boolean expression used as a value (`count(n) > 0 AS exists`).
    Bool(Box<BoolExpr>),
}

impl Expr {
    /// `$name`
    pub fn param(name: impl Into<String>) -> Self {
        Expr::Param(name.into())
    }

    /// Function call with plain arguments.
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            distinct: false,
            args,
        }
    }

    /// Function call with a `DISTINCT` argument (`collect(DISTINCT x)`).
    pub fn call_distinct(name: impl Into<String>, arg: Expr) -> Self {
        Expr::Call {
            name: name.into(),
            distinct: true,
            args: vec![arg],
        }
    }
}

/// Binary comparisons supported in predicates.
#[derive(Clone, Debug, PartialEq)]
pub enum Comparison {
    /// `lhs = rhs`
    Eq(Expr, Expr),
    /// `lhs > rhs`
    Gt(Expr, Expr),
    /// `lhs IN rhs`
    In(Expr, Expr),
    /// `lhs IS NULL`
    IsNull(Expr),
    /// `lhs IS NOT NULL`
    IsNotNull(Expr),
    /// `var:Label`
    HasLabel(Var, String),
    /// `expr IN labels(var)`
    InLabels(Expr, Var),
}

/// Boolean predicate tree.
#[derive(Clone, Debug, PartialEq)]
pub enum BoolExpr {
    /// Single comparison.
    Cmp(Comparison),
    /// Conjunction.
    And(Vec<BoolExpr>),
    /// Disjunction.
    Or(Vec<BoolExpr>),
    /// Negation.
    Not(Box<BoolExpr>),
    /// `EXISTS { MATCH pattern }`
    Exists(Box<Pattern>),
}

impl BoolExpr {
    /// Joins two predicates with AND, flattening nested conjunctions.
    pub fn and(self, other: BoolExpr) -> BoolExpr {
        match self {
            BoolExpr::And(mut args) => {
                args.push(other);
                BoolExpr::And(args)
            }
            existing => BoolExpr::And(vec![existing, other]),
        }
    }
}

/// Property map written inline in a node pattern (`{id: $id}`).
pub type InlineProps = Vec<(String, Expr)>;

/// Node pattern `(var:Label {props})`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodePattern {
    /// Bound variable, if any.
    pub var: Option<Var>,
    /// Label, if any.
    pub label: Option<String>,
    /// Inline property equality.
    pub props: InlineProps,
}

impl NodePattern {
    /// `(:Label)`, an anonymous node.
    pub fn anonymous(label: impl Into<String>) -> Self {
        Self {
            var: None,
            label: Some(label.into()),
            props: Vec::new(),
        }
    }

    /// `(var)`
    pub fn var(var: &Var) -> Self {
        Self {
            var: Some(var.clone()),
            label: None,
            props: Vec::new(),
        }
    }

    /// `(var:Label)`
    pub fn labeled(var: &Var, label: impl Into<String>) -> Self {
        Self {
            var: Some(var.clone()),
            label: Some(label.into()),
            props: Vec::new(),
        }
    }

    /// Adds `{key: value}`.
    pub fn with_prop(mut self, key: impl Into<String>, value: Expr) -> Self {
        self.props.push((key.into(), value));
        self
    }
}

/// Relationship pattern `-[var:TYPE]->`.
#[derive(Clone, Debug, PartialEq)]
pub struct RelPattern {
    /// Bound variable, if any.
    pub var: Option<Var>,
    /// Relationship type.
    pub rel_type: String,
    /// Arrow direction relative to the left node.
    pub direction: EdgeDirection,
}

/// Path pattern: a start node followed by zero or more hops.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    /// Leftmost node.
    pub start: NodePattern,
    /// Relationship/node pairs to the right.
    pub hops: Vec<(RelPattern, NodePattern)>,
}

impl Pattern {
    /// Pattern consisting of a single node.
    pub fn node(node: NodePattern) -> Self {
        Self {
            start: node,
            hops: Vec::new(),
        }
    }

    /// Appends a hop.
    pub fn hop(
        mut self,
        rel_var: Option<Var>,
        rel_type: impl Into<String>,
        direction: EdgeDirection,
        node: NodePattern,
    ) -> Self {
        self.hops.push((
            RelPattern {
                var: rel_var,
                rel_type: rel_type.into(),
                direction,
            },
            node,
        ));
        self
    }
}

/// Projection item in `WITH` / `RETURN`.
#[derive(Clone, Debug, PartialEq)]
pub enum Projection {
    /// Projection of a variable binding.
    Var {
        /// Variable to project.
        var: Var,
        /// Optional alias for the projected variable.
        alias: Option<String>,
    },
    /// Projection of a computed expression.
    Expr {
        /// Expression to evaluate.
        expr: Expr,
        /// Alias for the expression result.
        alias: String,
    },
}

impl Projection {
    /// Name the projection binds downstream.
    pub fn binding(&self) -> &str {
        match self {
            Projection::Var { var, alias } => alias.as_deref().unwrap_or(var.as_str()),
            Projection::Expr { alias, .. } => alias,
        }
    }
}

impl From<&Var> for Projection {
    fn from(var: &Var) -> Self {
        Projection::Var {
            var: var.clone(),
            alias: None,
        }
    }
}

/// Sort key.
#[derive(Clone, Debug, PartialEq)]
pub struct SortItem {
    /// Expression to sort by.
    pub expr: Expr,
    /// Descending when true.
    pub descending: bool,
}

/// Target of a `SET`.
#[derive(Clone, Debug, PartialEq)]
pub enum SetItem {
    /// `var.prop = value`
    Assign {
        /// Node or relationship variable.
        var: Var,
        /// Property name.
        prop: String,
        /// Assigned value.
        value: Expr,
    },
    /// `var += map`
    Merge {
        /// Node or relationship variable.
        var: Var,
        /// Map expression merged into the properties.
        map: Expr,
    },
}

/// Statement clauses.
#[derive(Clone, Debug, PartialEq)]
pub enum Clause {
    /// `MATCH` / `OPTIONAL MATCH` with an optional `WHERE`.
    Match {
        /// Path pattern.
        pattern: Pattern,
        /// Renders as `OPTIONAL MATCH` when true.
        optional: bool,
        /// Attached predicate.
        predicate: Option<BoolExpr>,
    },
    /// `CALL proc(args) YIELD a, b`
    Call {
        /// Procedure name.
        procedure: String,
        /// Arguments.
        args: Vec<Expr>,
        /// Yielded columns.
        yields: Vec<Var>,
    },
    /// `CALL { WITH imports <body> }`, a unit subquery that never changes
    /// the outer row count.
    Subquery {
        /// Outer variables imported into the subquery.
        imports: Vec<Var>,
        /// Subquery clauses.
        body: Vec<Clause>,
    },
    /// `WITH`, optionally ordered, filtered and carrying the page marker.
    With {
        /// Projected items.
        items: Vec<Projection>,
        /// `WITH DISTINCT`.
        distinct: bool,
        /// `WHERE` applied after projection.
        predicate: Option<BoolExpr>,
        /// `ORDER BY` keys.
        order_by: Vec<SortItem>,
        /// Marks where `SKIP`/`LIMIT` go once a cursor is known.
        page: bool,
    },
    /// `UNWIND list AS var`
    Unwind {
        /// List expression.
        list: Expr,
        /// Element variable.
        var: Var,
    },
    /// `CREATE pattern`
    Create {
        /// Pattern to create.
        pattern: Pattern,
    },
    /// `MERGE pattern`
    Merge {
        /// Pattern to merge.
        pattern: Pattern,
    },
    /// `SET a, b, ..`
    Set {
        /// Assignments.
        items: Vec<SetItem>,
    },
    /// `DELETE` / `DETACH DELETE`
    Delete {
        /// Variables to delete.
        vars: Vec<Var>,
        /// Also remove attached relationships.
        detach: bool,
    },
    /// `RETURN`
    Return {
        /// Projected items.
        items: Vec<Projection>,
        /// `RETURN DISTINCT`.
        distinct: bool,
        /// `ORDER BY` keys.
        order_by: Vec<SortItem>,
    },
}

impl Clause {
    /// `MATCH pattern`
    pub fn matching(pattern: Pattern) -> Self {
        Clause::Match {
            pattern,
            optional: false,
            predicate: None,
        }
    }

    /// Plain `WITH a, b`.
    pub fn with_vars<'a, I>(vars: I) -> Self
    where
        I: IntoIterator<Item = &'a Var>,
    {
        Clause::With {
            items: vars.into_iter().map(Projection::from).collect(),
            distinct: false,
            predicate: None,
            order_by: Vec::new(),
            page: false,
        }
    }

    /// Whether this is the paged `WITH`.
    pub fn is_page_marker(&self) -> bool {
        matches!(self, Clause::With { page: true, .. })
    }
}
