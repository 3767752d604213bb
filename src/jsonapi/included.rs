use std::collections::HashSet;

use crate::jsonapi::document::Resource;

/// Included resources, unique by `(type, id)`, in discovery order.
///
/// The first resource seen for a key wins; later duplicates are dropped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IncludedSet {
    resources: Vec<Resource>,
    seen: HashSet<(String, String)>,
}

impl IncludedSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `resource` unless its key is already present. Returns whether it
    /// was added.
    pub fn insert(&mut self, resource: Resource) -> bool {
        let key = (resource.resource_type.clone(), resource.id.clone());
        if !self.seen.insert(key) {
            return false;
        }
        self.resources.push(resource);
        true
    }

    /// Merges `other` into `self`, keeping existing entries.
    pub fn extend(&mut self, other: IncludedSet) {
        for resource in other.resources {
            self.insert(resource);
        }
    }

    /// Whether `(resource_type, id)` is present.
    pub fn contains(&self, resource_type: &str, id: &str) -> bool {
        self.seen
            .contains(&(resource_type.to_owned(), id.to_owned()))
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources in discovery order, minus the primary ones and, when an
    /// include list is given, minus any type it does not name.
    pub fn finish(self, include: Option<&[String]>, primary: &[(String, String)]) -> Vec<Resource> {
        self.resources
            .into_iter()
            .filter(|resource| {
                !primary
                    .iter()
                    .any(|(t, id)| *t == resource.resource_type && *id == resource.id)
            })
            .filter(|resource| {
                include.map_or(true, |types| types.iter().any(|t| *t == resource.resource_type))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn resource(kind: &str, id: &str, title: &str) -> Resource {
        let mut attributes = Map::new();
        attributes.insert("title".into(), title.into());
        Resource {
            resource_type: kind.into(),
            id: id.into(),
            attributes,
            relationships: None,
            links: None,
            meta: None,
        }
    }

    #[test]
    fn first_occurrence_wins() {
        let mut set = IncludedSet::new();
        assert!(set.insert(resource("tags", "t1", "first")));
        assert!(!set.insert(resource("tags", "t1", "second")));
        assert!(set.insert(resource("users", "t1", "other type")));
        let out = set.finish(None, &[]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].attributes["title"], "first");
    }

    #[test]
    fn finish_filters_types_and_primaries() {
        let mut set = IncludedSet::new();
        set.insert(resource("tags", "t1", "a"));
        set.insert(resource("users", "u1", "b"));
        set.insert(resource("articles", "a1", "c"));
        let include = vec!["tags".to_owned(), "articles".to_owned()];
        let out = set.finish(Some(include.as_slice()), &[("articles".into(), "a1".into())]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "t1");
    }
}
