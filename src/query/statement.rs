use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::pagination::Window;
use crate::query::ast::{Clause, Var};
use crate::query::render::{self, LIMIT_PARAM, SKIP_PARAM};

/// Named parameters passed alongside the statement text.
pub type Params = BTreeMap<String, Value>;

/// A compiled statement: clause AST plus its parameters.
///
/// Statements are built per call and consumed by the execution client; they
/// are never shared between requests.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub(crate) clauses: Vec<Clause>,
    pub(crate) params: Params,
    pub(crate) primary: Option<Var>,
    pub(crate) entity: Option<String>,
}

impl Statement {
    /// Clauses in execution order.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Bound parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Primary entity variable, used for count derivation.
    pub fn primary(&self) -> Option<&Var> {
        self.primary.as_ref()
    }

    /// Label of the entity the statement was compiled for.
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Whether a page marker is present at the top level.
    pub fn is_paginated(&self) -> bool {
        self.clauses.iter().any(Clause::is_page_marker)
    }

    /// Renders with the page marker removed.
    pub fn render(&self) -> CompiledQuery {
        self.render_window(&Window::All)
    }

    /// Renders with the page marker resolved to `window`.
    pub fn render_window(&self, window: &Window) -> CompiledQuery {
        let paginated = self.is_paginated();
        let mut params = self.params.clone();
        if paginated {
            match window {
                Window::All => {}
                Window::First { limit } => {
                    params.insert(LIMIT_PARAM.into(), Value::from(*limit as u64));
                }
                Window::Offset { skip, limit } => {
                    params.insert(SKIP_PARAM.into(), Value::from(*skip as u64));
                    params.insert(LIMIT_PARAM.into(), Value::from(*limit as u64));
                }
            }
        }
        CompiledQuery {
            text: render::render(&self.clauses, window),
            params,
            paginated,
            entity: self.entity.clone(),
        }
    }
}

/// Statement text ready for the driver.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompiledQuery {
    /// Cypher text.
    pub text: String,
    /// Named parameters.
    pub params: Params,
    /// Whether the source statement carried a page marker.
    pub paginated: bool,
    /// Entity label the statement belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl CompiledQuery {
    /// Ad-hoc statement text without parameters.
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Params::new(),
            paginated: false,
            entity: None,
        }
    }

    /// Attaches a parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Entity label for log and error context.
    pub fn entity_label(&self) -> &str {
        self.entity.as_deref().unwrap_or("-")
    }
}
