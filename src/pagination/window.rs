use crate::error::Result;
use crate::pagination::cursor::Cursor;
use crate::query::ast::{Clause, Expr, Projection};
use crate::query::Statement;

/// What the page marker turns into when a statement is rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Window {
    /// Marker removed; every row is returned.
    All,
    /// `LIMIT $cursorLimit`
    First {
        /// Page size.
        limit: usize,
    },
    /// `SKIP $cursorSkip LIMIT $cursorLimit`
    Offset {
        /// Rows to skip.
        skip: usize,
        /// Page size.
        limit: usize,
    },
}

impl Window {
    /// Resolves a cursor: fetch-all drops the marker, a present cursor skips.
    pub fn for_cursor(cursor: &Cursor) -> Result<Window> {
        if cursor.fetch_all {
            return Ok(Window::All);
        }
        match cursor.offset {
            None => Ok(Window::First { limit: cursor.take }),
            Some(_) => Ok(Window::Offset {
                skip: cursor.position()?,
                limit: cursor.take,
            }),
        }
    }
}

/// Alias of the count column.
pub const TOTAL_COLUMN: &str = "total";

/// Derives the total-count statement from a paginated read.
///
/// Keeps every clause up to and including the paged `WITH`, strips ordering
/// and the marker, then returns `count(DISTINCT <primary>) AS total`. Returns
/// `None` when the statement has no primary variable or no page marker.
pub fn count_statement(statement: &Statement) -> Option<Statement> {
    let primary = statement.primary()?.clone();
    let marker = statement.clauses().iter().position(Clause::is_page_marker)?;
    let mut clauses: Vec<Clause> = statement.clauses()[..=marker].to_vec();
    for clause in &mut clauses {
        if let Clause::With { order_by, page, .. } = clause {
            order_by.clear();
            *page = false;
        }
    }
    clauses.push(Clause::Return {
        items: vec![Projection::Expr {
            expr: Expr::call_distinct("count", primary.expr()),
            alias: TOTAL_COLUMN.into(),
        }],
        distinct: false,
        order_by: Vec::new(),
    });
    Some(Statement {
        clauses,
        params: statement.params().clone(),
        primary: Some(primary),
        entity: statement.entity().map(str::to_owned),
    })
}
