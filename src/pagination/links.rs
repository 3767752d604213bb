use url::Url;

use crate::jsonapi::Links;
use crate::pagination::cursor::Cursor;

/// Builds `self` / `next` / `prev` links by rewriting the request's `cursor`
/// query parameter.
#[derive(Clone, Copy, Debug, Default)]
pub struct Paginator;

impl Paginator {
    /// Links for a page that returned `returned` rows out of `total`.
    pub fn links(request_url: &Url, cursor: &Cursor, returned: usize, total: Option<u64>) -> Links {
        Links {
            self_link: Some(request_url.to_string()),
            next: cursor
                .next(returned, total)
                .map(|next| with_cursor(request_url, &next)),
            prev: cursor.prev().map(|prev| with_cursor(request_url, &prev)),
            related: None,
        }
    }
}

fn with_cursor(base: &Url, cursor: &Cursor) -> String {
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| key != "cursor" && key != "take")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let mut url = base.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.extend_pairs(kept);
        if let Some(offset) = &cursor.offset {
            pairs.append_pair("cursor", offset);
        }
        pairs.append_pair("take", &cursor.take.to_string());
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_link_carries_the_following_offset() {
        let url = Url::parse("https://api.test/tags?filter=a&cursor=0&take=26").expect("url");
        let links = Paginator::links(&url, &Cursor::at(0, 26), 26, Some(30));
        assert_eq!(
            links.next.as_deref(),
            Some("https://api.test/tags?filter=a&cursor=26&take=26")
        );
        assert_eq!(links.prev, None);
        assert_eq!(
            links.self_link.as_deref(),
            Some("https://api.test/tags?filter=a&cursor=0&take=26")
        );
    }

    #[test]
    fn last_page_links_back_only() {
        let url = Url::parse("https://api.test/tags?cursor=26").expect("url");
        let links = Paginator::links(&url, &Cursor::at(26, 26), 4, Some(30));
        assert_eq!(links.next, None);
        assert_eq!(
            links.prev.as_deref(),
            Some("https://api.test/tags?cursor=0&take=26")
        );
    }
}
