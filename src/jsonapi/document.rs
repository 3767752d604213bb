//! JSON:API document types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GraphError;

/// Top-level document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document links; omitted when there is no request URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    /// Primary data; absent in error documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PrimaryData>,
    /// Related resources, unique by `(type, id)`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
    /// Non-standard top-level information such as `total`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
    /// Error objects; only in error documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorObject>,
}

/// `data` member: one resource (possibly null) or a list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    /// Single resource document.
    One(Option<Box<Resource>>),
    /// Collection document.
    Many(Vec<Resource>),
}

/// A resource object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource id.
    pub id: String,
    /// Attribute values.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Relationships by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<BTreeMap<String, Relationship>>,
    /// Resource links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    /// Resource meta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl Resource {
    /// Identifier pointing at this resource.
    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier::new(self.resource_type.clone(), self.id.clone())
    }

    /// `(type, id)` key used for deduplication.
    pub fn key(&self) -> (&str, &str) {
        (&self.resource_type, &self.id)
    }
}

/// `{ type, id }`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource id.
    pub id: String,
}

impl ResourceIdentifier {
    /// Identifier for `resource_type`/`id`.
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

/// Relationship object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Linkage.
    pub data: RelationshipData,
    /// Relationship links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

/// Resource linkage: to-one (possibly null) or to-many.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    /// To-one.
    One(Option<ResourceIdentifier>),
    /// To-many.
    Many(Vec<ResourceIdentifier>),
}

/// Links object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    /// `self`
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    /// Following page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Preceding page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    /// Related resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,
}

impl Links {
    /// Only a `self` link.
    pub fn to_self(url: impl Into<String>) -> Self {
        Self {
            self_link: Some(url.into()),
            ..Self::default()
        }
    }
}

/// Error object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// HTTP status as a string.
    pub status: String,
    /// Stable error code.
    pub code: String,
    /// Short summary of the failure class.
    pub title: String,
    /// Occurrence-specific message.
    pub detail: String,
}

impl Document {
    /// Error document for `err`. Referential-integrity failures get one
    /// error object per missing node.
    pub fn errors(err: &GraphError) -> Self {
        let status = err.status().to_string();
        let code = err.code().to_owned();
        let title = title(err).to_owned();
        let errors = match err {
            GraphError::ReferentialIntegrity { missing } if !missing.is_empty() => missing
                .iter()
                .map(|related| ErrorObject {
                    status: status.clone(),
                    code: code.clone(),
                    title: title.clone(),
                    detail: format!("referenced node not found: {related}"),
                })
                .collect(),
            _ => vec![ErrorObject {
                status,
                code,
                title,
                detail: err.to_string(),
            }],
        };
        Self {
            errors,
            ..Self::default()
        }
    }

    /// Primary resources, whichever shape `data` has.
    pub fn primary(&self) -> Vec<&Resource> {
        match &self.data {
            Some(PrimaryData::One(Some(resource))) => vec![resource.as_ref()],
            Some(PrimaryData::Many(resources)) => resources.iter().collect(),
            _ => Vec::new(),
        }
    }
}

fn title(err: &GraphError) -> &'static str {
    match err.status() {
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Internal Server Error",
    }
}
