use serde::Serialize;

use crate::error::Result;
use crate::pagination::cursor::Cursor;

/// One page of mapped entities plus the total row count.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<T> {
    /// Entities in result order.
    pub items: Vec<T>,
    /// Total matching rows, when a count ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Cursor that produced this page.
    pub cursor: Cursor,
}

impl<T> Page<T> {
    /// Wraps a page.
    pub fn new(items: Vec<T>, total: Option<u64>, cursor: Cursor) -> Self {
        Self {
            items,
            total,
            cursor,
        }
    }

    /// Number of entities on this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the page holds nothing.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Cursor for the following page.
    pub fn next_cursor(&self) -> Option<Cursor> {
        self.cursor.next(self.items.len(), self.total)
    }

    /// Cursor for the preceding page.
    pub fn prev_cursor(&self) -> Option<Cursor> {
        self.cursor.prev()
    }

    /// Maps every item, keeping the paging state.
    pub fn try_map<U, F>(self, f: F) -> Result<Page<U>>
    where
        F: FnMut(T) -> Result<U>,
    {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<_>>()?,
            total: self.total,
            cursor: self.cursor,
        })
    }
}
