use std::collections::{HashMap, HashSet};

use penumbra::jsonapi::{IncludedSet, Resource};
use penumbra::pagination::{Cursor, Window};
use penumbra::query::search::fulltext_pattern;
use proptest::prelude::*;
use serde_json::Map;

fn resource(resource_type: &str, id: &str) -> Resource {
    Resource {
        resource_type: resource_type.to_owned(),
        id: id.to_owned(),
        attributes: Map::new(),
        relationships: None,
        links: None,
        meta: None,
    }
}

proptest! {
    #[test]
    fn paging_forward_visits_every_row_once(total in 0u64..400, take in 1usize..60) {
        let mut cursor = Cursor::first(take);
        let mut seen = 0u64;
        let mut pages = 0;
        loop {
            let start = cursor.position().expect("valid offset") as u64;
            prop_assert_eq!(start, seen);
            let returned = total.saturating_sub(start).min(take as u64) as usize;
            seen += returned as u64;
            pages += 1;
            match cursor.next(returned, Some(total)) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        prop_assert_eq!(seen, total);
        prop_assert!(pages <= (total as usize / take) + 1);
    }

    #[test]
    fn prev_undoes_next(offset in 0usize..10_000, take in 1usize..100) {
        let cursor = Cursor::at(offset * take, take);
        if let Some(next) = cursor.next(take, None) {
            prop_assert_eq!(next.prev(), Some(cursor.clone()));
        }
        match cursor.prev() {
            Some(prev) => prop_assert_eq!(prev.position().expect("offset"), (offset - 1) * take),
            None => prop_assert_eq!(offset, 0),
        }
    }

    #[test]
    fn query_cursors_resolve_to_matching_windows(skip in 0usize..5_000, take in 1usize..200) {
        let mut query = HashMap::new();
        query.insert("cursor".to_owned(), skip.to_string());
        query.insert("take".to_owned(), take.to_string());
        let cursor = Cursor::from_query(&query).expect("valid query");
        prop_assert_eq!(cursor.window().expect("window"), Window::Offset { skip, limit: take });
    }

    #[test]
    fn included_set_holds_each_key_once(keys in prop::collection::vec((0u8..3, 0u8..20), 0..80)) {
        let mut set = IncludedSet::new();
        let mut expected = HashSet::new();
        for (kind, id) in &keys {
            let kind = format!("type{kind}");
            let id = format!("id{id}");
            let fresh = expected.insert((kind.clone(), id.clone()));
            prop_assert_eq!(set.insert(resource(&kind, &id)), fresh);
        }
        prop_assert_eq!(set.len(), expected.len());
        let finished = set.finish(None, &[]);
        let unique: HashSet<(String, String)> = finished
            .iter()
            .map(|r| (r.resource_type.clone(), r.id.clone()))
            .collect();
        prop_assert_eq!(unique.len(), finished.len());
    }

    #[test]
    fn fulltext_patterns_never_leak_operators(term in "[a-z+\\-()\":* ]{0,40}") {
        if let Some(pattern) = fulltext_pattern(&term) {
            for token in pattern.split(" AND ") {
                prop_assert!(token.ends_with('*'));
                let body = &token[..token.len() - 1];
                let mut escaped = false;
                for c in body.chars() {
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else {
                        prop_assert!(c.is_ascii_lowercase(), "unescaped {c:?} in {token}");
                    }
                }
            }
        } else {
            prop_assert!(term.trim().is_empty());
        }
    }
}
