use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::pagination::window::Window;

/// Page size used when the caller does not pass `take`.
pub const DEFAULT_TAKE: usize = 26;

/// Caller position in a paginated list.
///
/// `offset` is opaque to callers; today it carries the decimal row offset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    /// Opaque position; `None` means the first page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    /// Page size.
    pub take: usize,
    /// Disables pagination entirely.
    #[serde(default)]
    pub fetch_all: bool,
}

impl Default for Cursor {
    fn default() -> Self {
        Self::first(DEFAULT_TAKE)
    }
}

impl Cursor {
    /// First page of `take` rows.
    pub fn first(take: usize) -> Self {
        Self {
            offset: None,
            take,
            fetch_all: false,
        }
    }

    /// Page starting at row `offset`.
    pub fn at(offset: usize, take: usize) -> Self {
        Self {
            offset: Some(offset.to_string()),
            take,
            fetch_all: false,
        }
    }

    /// Every row, no page marker.
    pub fn all() -> Self {
        Self {
            offset: None,
            take: DEFAULT_TAKE,
            fetch_all: true,
        }
    }

    /// Reads `cursor`, `take` and `fetchAll` from request query parameters.
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self> {
        Self::from_query_with(query, DEFAULT_TAKE)
    }

    /// Like [`from_query`](Self::from_query) with a configured default page size.
    pub fn from_query_with(query: &HashMap<String, String>, default_take: usize) -> Result<Self> {
        let take = match query.get("take").map(|t| t.trim()) {
            None | Some("") => default_take,
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| GraphError::invalid(format!("take must be a positive integer, got '{raw}'")))?,
        };
        if take == 0 {
            return Err(GraphError::invalid("take must be greater than zero"));
        }
        let offset = match query.get("cursor").map(|c| c.trim()) {
            None | Some("") => None,
            Some(raw) => {
                parse_offset(raw)?;
                Some(raw.to_owned())
            }
        };
        let fetch_all = matches!(
            query.get("fetchAll").map(|v| v.trim()),
            Some("true") | Some("1")
        );
        Ok(Self {
            offset,
            take,
            fetch_all,
        })
    }

    /// Row offset this cursor starts at.
    pub fn position(&self) -> Result<usize> {
        self.offset.as_deref().map(parse_offset).unwrap_or(Ok(0))
    }

    /// Window the page marker resolves to.
    pub fn window(&self) -> Result<Window> {
        Window::for_cursor(self)
    }

    /// Cursor for the page after one that returned `returned` rows.
    ///
    /// `None` once the end is known to be reached: a short page, or the next
    /// offset at or beyond `total`.
    pub fn next(&self, returned: usize, total: Option<u64>) -> Option<Cursor> {
        if self.fetch_all || returned < self.take {
            return None;
        }
        let next = self.position().ok()? + self.take;
        if total.is_some_and(|total| next as u64 >= total) {
            return None;
        }
        Some(Cursor::at(next, self.take))
    }

    /// Cursor for the previous page, `None` on the first page.
    pub fn prev(&self) -> Option<Cursor> {
        if self.fetch_all {
            return None;
        }
        let position = self.position().ok()?;
        if position == 0 {
            return None;
        }
        Some(Cursor::at(position.saturating_sub(self.take), self.take))
    }
}

fn parse_offset(raw: &str) -> Result<usize> {
    raw.parse::<usize>()
        .map_err(|_| GraphError::invalid(format!("cursor '{raw}' is not a valid position")))
}
