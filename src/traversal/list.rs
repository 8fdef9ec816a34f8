//! `list`: filter, sort and paginate stored outputs by metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{TraversalError, TraversalResult};
use crate::store::{truncate_chars, OutputStore, StoredOutputMeta};

pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 100;
pub const DEFAULT_PREVIEW_LENGTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListSortKey {
    #[default]
    CreatedAt,
    Size,
    ToolName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filters and paging for `list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    /// Only outputs created strictly after this instant
    #[serde(default)]
    pub after: Option<DateTime<Utc>>,
    /// Only outputs created strictly before this instant
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub sort_by: ListSortKey,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default = "default_true")]
    pub include_preview: bool,
    #[serde(default = "default_preview_length")]
    pub preview_length: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

fn default_true() -> bool {
    true
}

fn default_preview_length() -> usize {
    DEFAULT_PREVIEW_LENGTH
}

impl Default for ListRequest {
    fn default() -> Self {
        Self {
            conversation_id: None,
            tool_name: None,
            success: None,
            after: None,
            before: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
            sort_by: ListSortKey::default(),
            sort_order: SortOrder::default(),
            include_preview: true,
            preview_length: DEFAULT_PREVIEW_LENGTH,
        }
    }
}

impl ListRequest {
    fn matches(&self, meta: &StoredOutputMeta) -> bool {
        if let Some(ref cid) = self.conversation_id {
            if &meta.conversation_id != cid {
                return false;
            }
        }
        if let Some(ref tool) = self.tool_name {
            if &meta.tool_name != tool {
                return false;
            }
        }
        if let Some(success) = self.success {
            if meta.success != success {
                return false;
            }
        }
        if let Some(after) = self.after {
            if meta.created_at <= after {
                return false;
            }
        }
        if let Some(before) = self.before {
            if meta.created_at >= before {
                return false;
            }
        }
        true
    }
}

/// One row of a `list` page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEntry {
    pub id: String,
    pub tool_name: String,
    pub conversation_id: String,
    pub message_id: String,
    pub created_at: DateTime<Utc>,
    pub success: bool,
    pub size_bytes: u64,
    pub root_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub outputs: Vec<ListEntry>,
    /// Number of outputs matching the filters, before paging
    pub total: usize,
    pub has_more: bool,
}

pub fn list(store: &OutputStore, request: &ListRequest) -> TraversalResult<ListResponse> {
    if request.limit == 0 {
        return Err(TraversalError::InvalidRequest(
            "limit must be at least 1".to_string(),
        ));
    }
    let limit = request.limit.min(MAX_LIST_LIMIT);

    let mut items: Vec<StoredOutputMeta> = store
        .list_meta()?
        .into_iter()
        .filter(|meta| request.matches(meta))
        .collect();

    items.sort_by(|a, b| {
        let cmp = match request.sort_by {
            ListSortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            ListSortKey::Size => a.size_bytes.cmp(&b.size_bytes),
            ListSortKey::ToolName => a.tool_name.cmp(&b.tool_name),
        }
        .then_with(|| a.id.cmp(&b.id));
        match request.sort_order {
            SortOrder::Asc => cmp,
            SortOrder::Desc => cmp.reverse(),
        }
    });

    let total = items.len();
    let has_more = request.offset.saturating_add(limit) < total;

    let outputs = items
        .into_iter()
        .skip(request.offset)
        .take(limit)
        .map(|meta| {
            let preview = request
                .include_preview
                .then(|| truncate_chars(&meta.preview, request.preview_length).0);
            ListEntry {
                id: meta.id,
                tool_name: meta.tool_name,
                conversation_id: meta.conversation_id,
                message_id: meta.message_id,
                created_at: meta.created_at,
                success: meta.success,
                size_bytes: meta.size_bytes,
                root_type: meta.summary.root_type,
                item_count: meta.summary.item_count,
                preview,
            }
        })
        .collect();

    Ok(ListResponse {
        outputs,
        total,
        has_more,
    })
}
