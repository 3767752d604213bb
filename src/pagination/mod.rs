#![forbid(unsafe_code)]

//! Cursor pagination and total counts.
//!
//! Read statements carry a page marker on the ordered `WITH` that projects
//! the primary node. A [`Cursor`] resolves that marker to a [`Window`]; the
//! count query is derived from the same statement so filters and tenant scope
//! can never drift apart.

/// Cursor parsing and navigation.
pub mod cursor;

/// Pagination links.
pub mod links;

/// Page container.
pub mod page;

/// Window resolution and count derivation.
pub mod window;

pub use cursor::{Cursor, DEFAULT_TAKE};
pub use links::Paginator;
pub use page::Page;
pub use window::{count_statement, Window, TOTAL_COLUMN};
