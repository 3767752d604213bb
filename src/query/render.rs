//! Turns the clause AST into Cypher text.

use std::fmt::{self, Display, Formatter, Write};

use crate::pagination::Window;
use crate::query::ast::{
    BoolExpr, Clause, Comparison, EdgeDirection, Expr, NodePattern, Pattern, Projection,
    RelPattern, SetItem, SortItem,
};

/// Parameter holding the number of rows to skip.
pub const SKIP_PARAM: &str = "cursorSkip";
/// Parameter holding the page size.
pub const LIMIT_PARAM: &str = "cursorLimit";

/// Renders clauses one per line, resolving the page marker with `window`.
pub fn render(clauses: &[Clause], window: &Window) -> String {
    let mut out = String::new();
    for (idx, clause) in clauses.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        // Writing into a String cannot fail.
        let _ = write_clause(&mut out, clause, window);
    }
    out
}

fn write_clause(out: &mut String, clause: &Clause, window: &Window) -> fmt::Result {
    match clause {
        Clause::Match {
            pattern,
            optional,
            predicate,
        } => {
            if *optional {
                out.push_str("OPTIONAL ");
            }
            write!(out, "MATCH {pattern}")?;
            if let Some(pred) = predicate {
                write!(out, "\nWHERE {pred}")?;
            }
        }
        Clause::Call {
            procedure,
            args,
            yields,
        } => {
            write!(out, "CALL {procedure}({})", join(args, ", "))?;
            if !yields.is_empty() {
                write!(out, " YIELD {}", join(yields, ", "))?;
            }
        }
        Clause::Subquery { imports, body } => {
            out.push_str("CALL {");
            let mut inner = String::new();
            if !imports.is_empty() {
                write!(inner, "WITH {}\n", join(imports, ", "))?;
            }
            inner.push_str(&render(body, window));
            for line in inner.lines() {
                write!(out, "\n  {line}")?;
            }
            out.push_str("\n}");
        }
        Clause::With {
            items,
            distinct,
            predicate,
            order_by,
            page,
        } => {
            out.push_str("WITH ");
            if *distinct {
                out.push_str("DISTINCT ");
            }
            out.push_str(&join(items, ", "));
            if let Some(pred) = predicate {
                write!(out, "\nWHERE {pred}")?;
            }
            write_order(out, order_by)?;
            if *page {
                write_window(out, window)?;
            }
        }
        Clause::Unwind { list, var } => write!(out, "UNWIND {list} AS {var}")?,
        Clause::Create { pattern } => write!(out, "CREATE {pattern}")?,
        Clause::Merge { pattern } => write!(out, "MERGE {pattern}")?,
        Clause::Set { items } => write!(out, "SET {}", join(items, ", "))?,
        Clause::Delete { vars, detach } => {
            if *detach {
                out.push_str("DETACH ");
            }
            write!(out, "DELETE {}", join(vars, ", "))?;
        }
        Clause::Return {
            items,
            distinct,
            order_by,
        } => {
            out.push_str("RETURN ");
            if *distinct {
                out.push_str("DISTINCT ");
            }
            out.push_str(&join(items, ", "));
            write_order(out, order_by)?;
        }
    }
    Ok(())
}

fn write_order(out: &mut String, order_by: &[SortItem]) -> fmt::Result {
    if order_by.is_empty() {
        return Ok(());
    }
    write!(out, "\nORDER BY {}", join(order_by, ", "))
}

fn write_window(out: &mut String, window: &Window) -> fmt::Result {
    match window {
        Window::All => Ok(()),
        Window::First { .. } => write!(out, "\nLIMIT ${LIMIT_PARAM}"),
        Window::Offset { .. } => write!(out, "\nSKIP ${SKIP_PARAM} LIMIT ${LIMIT_PARAM}"),
    }
}

fn join<T: Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(var) => write!(f, "{var}"),
            Expr::Prop(var, prop) => write!(f, "{var}.{prop}"),
            Expr::Param(name) => write!(f, "${name}"),
            Expr::ParamIndex(name, key) => write!(f, "${name}[{key}]"),
            Expr::Null => f.write_str("NULL"),
            Expr::Int(value) => write!(f, "{value}"),
            Expr::Name(name) => write!(f, "\"{name}\""),
            Expr::Call {
                name,
                distinct,
                args,
            } => {
                let prefix = if *distinct { "DISTINCT " } else { "" };
                write!(f, "{name}({prefix}{})", join(args, ", "))
            }
            Expr::ListComprehension { var, list, map } => {
                write!(f, "[{var} IN {list} | {map}]")
            }
            Expr::Map(entries) => {
                f.write_str("{")?;
                for (idx, (key, value)) in entries.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Expr::Case {
                when,
                then,
                otherwise,
            } => write!(f, "CASE WHEN {when} THEN {then} ELSE {otherwise} END"),
            Expr::Keys(inner) => write!(f, "keys({inner})"),
            Expr::Bool(inner) => write!(f, "{inner}"),
        }
    }
}

impl Display for Comparison {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Eq(lhs, rhs) => write!(f, "{lhs} = {rhs}"),
            Comparison::Gt(lhs, rhs) => write!(f, "{lhs} > {rhs}"),
            Comparison::In(lhs, rhs) => write!(f, "{lhs} IN {rhs}"),
            Comparison::IsNull(expr) => write!(f, "{expr} IS NULL"),
            Comparison::IsNotNull(expr) => write!(f, "{expr} IS NOT NULL"),
            Comparison::HasLabel(var, label) => write!(f, "{var}:{label}"),
            Comparison::InLabels(expr, var) => write!(f, "{expr} IN labels({var})"),
        }
    }
}

impl Display for BoolExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BoolExpr::Cmp(cmp) => write!(f, "{cmp}"),
            BoolExpr::And(args) => f.write_str(&join(args, " AND ")),
            BoolExpr::Or(args) => write!(f, "({})", join(args, " OR ")),
            BoolExpr::Not(inner) => write!(f, "NOT ({inner})"),
            BoolExpr::Exists(pattern) => write!(f, "EXISTS {{ MATCH {pattern} }}"),
        }
    }
}

impl Display for NodePattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        if let Some(var) = &self.var {
            write!(f, "{var}")?;
        }
        if let Some(label) = &self.label {
            write!(f, ":{label}")?;
        }
        if !self.props.is_empty() {
            if self.var.is_some() || self.label.is_some() {
                f.write_str(" ")?;
            }
            write!(f, "{}", Expr::Map(self.props.clone()))?;
        }
        f.write_str(")")
    }
}

impl Display for RelPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let var = self.var.as_ref().map(|v| v.as_str()).unwrap_or("");
        let body = format!("[{var}:{}]", self.rel_type);
        match self.direction {
            EdgeDirection::Out => write!(f, "-{body}->"),
            EdgeDirection::In => write!(f, "<-{body}-"),
            EdgeDirection::Both => write!(f, "-{body}-"),
        }
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)?;
        for (rel, node) in &self.hops {
            write!(f, "{rel}{node}")?;
        }
        Ok(())
    }
}

impl Display for Projection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Projection::Var { var, alias: None } => write!(f, "{var}"),
            Projection::Var {
                var,
                alias: Some(alias),
            } => write!(f, "{var} AS {alias}"),
            Projection::Expr { expr, alias } => write!(f, "{expr} AS {alias}"),
        }
    }
}

impl Display for SortItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let dir = if self.descending { "DESC" } else { "ASC" };
        write!(f, "{} {dir}", self.expr)
    }
}

impl Display for SetItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SetItem::Assign { var, prop, value } => write!(f, "{var}.{prop} = {value}"),
            SetItem::Merge { var, map } => write!(f, "{var} += {map}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::Var;

    #[test]
    fn renders_directed_patterns() {
        let article = Var::new("article");
        let author = Var::new("article_author");
        let pattern = Pattern::node(NodePattern::var(&article)).hop(
            Some(Var::new("article_author_relationship")),
            "WRITTEN_BY",
            EdgeDirection::In,
            NodePattern::labeled(&author, "User"),
        );
        assert_eq!(
            pattern.to_string(),
            "(article)<-[article_author_relationship:WRITTEN_BY]-(article_author:User)"
        );
    }

    #[test]
    fn page_marker_follows_window() {
        let n = Var::new("n");
        let clauses = vec![
            Clause::matching(Pattern::node(NodePattern::labeled(&n, "Tag"))),
            Clause::With {
                items: vec![Projection::from(&n)],
                distinct: false,
                predicate: None,
                order_by: vec![SortItem {
                    expr: n.prop("updatedAt"),
                    descending: true,
                }],
                page: true,
            },
            Clause::Return {
                items: vec![Projection::from(&n)],
                distinct: false,
                order_by: Vec::new(),
            },
        ];
        assert_eq!(
            render(&clauses, &Window::All),
            "MATCH (n:Tag)\nWITH n\nORDER BY n.updatedAt DESC\nRETURN n"
        );
        assert_eq!(
            render(&clauses, &Window::First { limit: 26 }),
            "MATCH (n:Tag)\nWITH n\nORDER BY n.updatedAt DESC\nLIMIT $cursorLimit\nRETURN n"
        );
        assert!(render(&clauses, &Window::Offset { skip: 26, limit: 26 })
            .contains("SKIP $cursorSkip LIMIT $cursorLimit"));
    }

    #[test]
    fn subqueries_are_indented() {
        let n = Var::new("n");
        let clause = Clause::Subquery {
            imports: vec![n.clone()],
            body: vec![Clause::Delete {
                vars: vec![Var::new("old")],
                detach: false,
            }],
        };
        assert_eq!(
            render(&[clause], &Window::All),
            "CALL {\n  WITH n\n  DELETE old\n}"
        );
    }

    #[test]
    fn case_and_maps_render_inline() {
        let t = Var::new("t");
        let expr = Expr::Case {
            when: Box::new(BoolExpr::Cmp(Comparison::IsNull(t.expr()))),
            then: Box::new(Expr::Null),
            otherwise: Box::new(Expr::Map(vec![("relatedId".into(), t.prop("id"))])),
        };
        assert_eq!(
            expr.to_string(),
            "CASE WHEN t IS NULL THEN NULL ELSE {relatedId: t.id} END"
        );
    }

    #[test]
    fn existence_predicates_wrap_a_match() {
        let article = Var::new("article");
        let pattern = Pattern::node(NodePattern::var(&article)).hop(
            None,
            "WROTE",
            EdgeDirection::In,
            NodePattern::anonymous("User"),
        );
        let predicate = BoolExpr::Cmp(Comparison::IsNotNull(article.prop("title")))
            .and(BoolExpr::Exists(Box::new(pattern)));
        assert_eq!(
            predicate.to_string(),
            "article.title IS NOT NULL AND EXISTS { MATCH (article)<-[:WROTE]-(:User) }"
        );
    }
}
