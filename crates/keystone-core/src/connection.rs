//! Cursor-based pagination over ordered result sets.
//!
//! Cursors are opaque strings encoding a zero-based offset into the ordered
//! set: `base64("arrayconnection:" + offset)`. The same windowing runs for
//! in-memory arrays and traversal results; traversal-backed sets additionally
//! refuse pagination arguments while no adapter can serve cursor-bounded
//! range queries.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{KeystoneError, Result};

const CURSOR_PREFIX: &str = "arrayconnection:";

/// Encode an offset as an opaque cursor.
pub fn encode_cursor(offset: usize) -> String {
    STANDARD.encode(format!("{CURSOR_PREFIX}{offset}"))
}

/// Decode a cursor back to its offset. `None` marks a cursor that is not
/// valid base64, lacks the prefix, or does not hold a non-negative integer;
/// it is never confused with a legitimate offset 0.
pub fn decode_cursor(cursor: &str) -> Option<usize> {
    let bytes = STANDARD.decode(cursor).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    text.strip_prefix(CURSOR_PREFIX)?.parse::<usize>().ok()
}

/// Offset held by `cursor`, or `default` when the cursor is absent or
/// malformed. Malformed cursors are ignored rather than rejected.
pub fn offset_with_default(cursor: Option<&str>, default: i64) -> i64 {
    cursor
        .and_then(decode_cursor)
        .and_then(|offset| i64::try_from(offset).ok())
        .unwrap_or(default)
}

/// The four standard pagination arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionArgs {
    pub first: Option<i64>,
    pub after: Option<String>,
    pub last: Option<i64>,
    pub before: Option<String>,
}

impl ConnectionArgs {
    pub fn first(n: i64) -> Self {
        Self {
            first: Some(n),
            ..Default::default()
        }
    }

    pub fn last(n: i64) -> Self {
        Self {
            last: Some(n),
            ..Default::default()
        }
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    pub fn before(mut self, cursor: impl Into<String>) -> Self {
        self.before = Some(cursor.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none() && self.after.is_none() && self.last.is_none() && self.before.is_none()
    }

    /// Read the arguments out of an API argument map; missing or
    /// wrongly-typed entries are treated as absent.
    pub fn from_json(args: &serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            first: args.get("first").and_then(|v| v.as_i64()),
            after: args.get("after").and_then(|v| v.as_str()).map(str::to_string),
            last: args.get("last").and_then(|v| v.as_i64()),
            before: args.get("before").and_then(|v| v.as_str()).map(str::to_string),
        }
    }
}

/// Where `items` sits inside the full ordered set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceMeta {
    pub slice_start: usize,
    pub total_length: usize,
}

impl SliceMeta {
    pub fn whole(len: usize) -> Self {
        Self {
            slice_start: 0,
            total_length: len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEdge<T> {
    pub node: T,
    pub cursor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub edges: Vec<ConnectionEdge<T>>,
    pub page_info: PageInfo,
}

impl<T> Connection<T> {
    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|e| &e.node)
    }

    pub fn into_nodes(self) -> Vec<T> {
        self.edges.into_iter().map(|e| e.node).collect()
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Connection<U> {
        Connection {
            edges: self
                .edges
                .into_iter()
                .map(|e| ConnectionEdge {
                    node: f(e.node),
                    cursor: e.cursor,
                })
                .collect(),
            page_info: self.page_info,
        }
    }
}

/// Window `items` (a slice of a larger ordered set described by `meta`)
/// according to `args`.
pub fn paginate<T>(items: Vec<T>, args: &ConnectionArgs, meta: SliceMeta) -> Result<Connection<T>> {
    let slice_start = meta.slice_start as i64;
    let total = meta.total_length as i64;
    let slice_end = slice_start + items.len() as i64;

    let mut start = slice_start.max(0);
    let mut end = slice_end.min(total);

    // Cursors that are malformed or fall outside the set are ignored for
    // both the window and the page-info bounds.
    let in_range = |offset: i64| (0..total).contains(&offset).then_some(offset);
    let after_offset = in_range(offset_with_default(args.after.as_deref(), -1));
    let before_offset = in_range(offset_with_default(args.before.as_deref(), total));

    if let Some(after) = after_offset {
        start = start.max(after + 1);
    }
    if let Some(before) = before_offset {
        end = end.min(before);
    }

    if let Some(first) = args.first {
        if first < 0 {
            return Err(KeystoneError::InvalidArgument(
                "argument \"first\" must be a non-negative integer".into(),
            ));
        }
        end = end.min(start.saturating_add(first));
    }

    if let Some(last) = args.last {
        if last < 0 {
            return Err(KeystoneError::InvalidArgument(
                "argument \"last\" must be a non-negative integer".into(),
            ));
        }
        start = start.max(end.saturating_sub(last));
    }

    let lower_bound = after_offset.map_or(0, |after| after + 1);
    let upper_bound = before_offset.unwrap_or(total);

    let skip = (start - slice_start).max(0) as usize;
    let take = (end - start).max(0) as usize;
    let edges: Vec<ConnectionEdge<T>> = items
        .into_iter()
        .skip(skip)
        .take(take)
        .enumerate()
        .map(|(i, node)| ConnectionEdge {
            node,
            cursor: encode_cursor(start as usize + i),
        })
        .collect();

    let page_info = PageInfo {
        start_cursor: edges.first().map(|e| e.cursor.clone()),
        end_cursor: edges.last().map(|e| e.cursor.clone()),
        has_next_page: args.first.is_some() && end < upper_bound,
        has_previous_page: args.last.is_some() && start > lower_bound,
    };

    Ok(Connection { edges, page_info })
}

/// Paginate a fully materialized in-memory array.
pub fn paginate_array<T>(items: Vec<T>, args: &ConnectionArgs) -> Result<Connection<T>> {
    let meta = SliceMeta::whole(items.len());
    paginate(items, args, meta)
}

/// Paginate a traversal result. Without range-query support in the backing
/// adapter any pagination argument fails with `NotImplemented`, instead of
/// windowing only what happened to be materialized.
pub fn paginate_traversal<T>(
    items: Vec<T>,
    args: &ConnectionArgs,
    range_queries: bool,
) -> Result<Connection<T>> {
    if !range_queries && !args.is_empty() {
        return Err(KeystoneError::NotImplemented(
            "cursor pagination over traversal results requires range-query support in the backend"
                .into(),
        ));
    }
    paginate_array(items, args)
}
