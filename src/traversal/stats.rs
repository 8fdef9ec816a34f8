//! `stats`: size, shape and type summary of a stored payload

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::core::TraversalResult;
use crate::store::{value_type_name, StoredOutput};

use super::path::CompiledPath;

pub const DEFAULT_STATS_DEPTH: usize = 5;
pub const MAX_STATS_DEPTH: usize = 10;

/// Arrays with more items than this are walked through first/middle/last only
const ITEM_TYPE_SCAN_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsRequest {
    pub id: String,
    /// Synthesize a structural schema of the payload
    #[serde(default)]
    pub include_schema: bool,
    #[serde(default = "default_depth")]
    pub max_depth: usize,
    /// Walk only representative array items instead of every item
    #[serde(default = "default_true")]
    pub sample_arrays: bool,
    /// Restrict analysis to the values these paths select
    #[serde(default)]
    pub paths: Option<Vec<String>>,
}

fn default_depth() -> usize {
    DEFAULT_STATS_DEPTH
}

fn default_true() -> bool {
    true
}

impl StatsRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            include_schema: false,
            max_depth: DEFAULT_STATS_DEPTH,
            sample_arrays: true,
            paths: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeInfo {
    pub bytes: u64,
    pub formatted: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureInfo {
    pub root_type: String,
    /// Array length or key count of the root, for container roots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_length: Option<usize>,
    pub max_depth: usize,
    pub total_keys: u64,
    pub total_values: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArraySummary {
    pub path: String,
    pub length: usize,
    pub item_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub path: String,
    pub keys: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub id: String,
    pub tool_name: String,
    pub created_at: DateTime<Utc>,
    pub size: SizeInfo,
    pub structure: StructureInfo,
    /// Count of visited values per JSON type
    pub types: BTreeMap<String, u64>,
    pub arrays: Vec<ArraySummary>,
    pub objects: Vec<ObjectSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

#[derive(Default)]
struct Walk {
    max_depth: usize,
    total_keys: u64,
    total_values: u64,
    types: BTreeMap<String, u64>,
    arrays: Vec<ArraySummary>,
    objects: Vec<ObjectSummary>,
}

impl Walk {
    fn visit(&mut self, value: &Value, path: &str, depth: usize, limit: usize, sample: bool) {
        self.max_depth = self.max_depth.max(depth);
        self.total_values += 1;
        *self
            .types
            .entry(value_type_name(value).to_string())
            .or_insert(0) += 1;

        match value {
            Value::Object(map) => {
                self.total_keys += map.len() as u64;
                self.objects.push(ObjectSummary {
                    path: path.to_string(),
                    keys: map.len(),
                });
                if depth < limit {
                    for (key, child) in map {
                        self.visit(child, &format!("{}.{}", path, key), depth + 1, limit, sample);
                    }
                }
            }
            Value::Array(items) => {
                self.arrays.push(ArraySummary {
                    path: path.to_string(),
                    length: items.len(),
                    item_type: array_item_type(items),
                });
                if depth < limit {
                    let indices: Vec<usize> = if sample {
                        representative_indices(items.len())
                    } else {
                        (0..items.len()).collect()
                    };
                    for idx in indices {
                        self.visit(&items[idx], &format!("{}[{}]", path, idx), depth + 1, limit, sample);
                    }
                }
            }
            _ => {}
        }
    }
}

/// First, middle and last index (deduplicated)
fn representative_indices(len: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let mut indices = vec![0, len / 2, len - 1];
    indices.dedup();
    indices
}

fn array_item_type(items: &[Value]) -> String {
    let Some(first) = items.first() else {
        return "unknown".to_string();
    };
    let first_type = value_type_name(first);
    if items
        .iter()
        .take(ITEM_TYPE_SCAN_LIMIT)
        .all(|v| value_type_name(v) == first_type)
    {
        first_type.to_string()
    } else {
        "mixed".to_string()
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Structural schema of `value`, truncated at `max_depth`
pub fn infer_schema(value: &Value, depth: usize, max_depth: usize) -> Value {
    if depth >= max_depth {
        return json!({});
    }
    match value {
        Value::Object(map) => {
            let properties: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), infer_schema(v, depth + 1, max_depth)))
                .collect();
            json!({ "type": "object", "properties": properties })
        }
        Value::Array(items) => {
            let item_schema = items
                .first()
                .map(|first| infer_schema(first, depth + 1, max_depth))
                .unwrap_or_else(|| json!({}));
            json!({ "type": "array", "items": item_schema })
        }
        other => json!({ "type": value_type_name(other) }),
    }
}

pub fn stats(record: &StoredOutput, request: &StatsRequest) -> TraversalResult<StatsResponse> {
    let limit = request.max_depth.clamp(1, MAX_STATS_DEPTH);
    let root = &record.content;

    let mut walk = Walk::default();
    match &request.paths {
        Some(paths) if !paths.is_empty() => {
            for expr in paths {
                let path = CompiledPath::compile(expr)?;
                for node in path.query(root) {
                    walk.visit(node, path.as_str(), 0, limit, request.sample_arrays);
                }
            }
        }
        _ => walk.visit(root, "$", 0, limit, request.sample_arrays),
    }

    let root_length = match root {
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    };

    Ok(StatsResponse {
        id: record.meta.id.clone(),
        tool_name: record.meta.tool_name.clone(),
        created_at: record.meta.created_at,
        size: SizeInfo {
            bytes: record.meta.size_bytes,
            formatted: format_bytes(record.meta.size_bytes),
        },
        structure: StructureInfo {
            root_type: value_type_name(root).to_string(),
            root_length,
            max_depth: walk.max_depth,
            total_keys: walk.total_keys,
            total_values: walk.total_values,
        },
        types: walk.types,
        arrays: walk.arrays,
        objects: walk.objects,
        schema: request
            .include_schema
            .then(|| infer_schema(root, 0, limit)),
    })
}
