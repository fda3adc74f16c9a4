//! Cursor pagination for list endpoints (§6: `limit`/`starting_after`,
//! opaque `continuation_token` seeded by the last element's key).

use serde::Serialize;

/// Default page size when the caller omits `limit`.
pub const DEFAULT_LIMIT: usize = 50;
/// Upper bound on `limit`, inclusive.
pub const MAX_LIMIT: usize = 256;

/// Clamp a caller-supplied `limit` into `[0, MAX_LIMIT]`, substituting
/// `DEFAULT_LIMIT` when `None`.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub continuation_token: Option<String>,
}

/// Paginate `items` (assumed already sorted in list order) starting after
/// the element whose key equals `starting_after`, for at most `limit`
/// entries. The returned token is the key of the last returned item,
/// unless the page reached the end of `items`.
///
/// `limit == 0` always returns an empty page with no token (§8 boundary).
pub fn paginate<T, K>(
    items: &[T],
    key: impl Fn(&T) -> K,
    starting_after: Option<&K>,
    limit: usize,
) -> Page<T>
where
    T: Clone,
    K: PartialEq + ToString,
{
    if limit == 0 {
        return Page {
            items: Vec::new(),
            continuation_token: None,
        };
    }

    let start = match starting_after {
        None => 0,
        Some(cursor) => items
            .iter()
            .position(|item| key(item) == *cursor)
            .map(|idx| idx + 1)
            .unwrap_or(items.len()),
    };

    let slice = &items[start.min(items.len())..];
    let page_len = limit.min(slice.len());
    let page = &slice[..page_len];

    let continuation_token = if start + page_len < items.len() {
        page.last().map(|last| key(last).to_string())
    } else {
        None
    };

    Page {
        items: page.to_vec(),
        continuation_token,
    }
}
