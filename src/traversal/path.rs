//! Path expressions over stored payloads
//!
//! Thin wrapper around `serde_json_path` (RFC 9535 JSONPath): member names,
//! array indices and slices, `*` wildcards, `..` recursive descent and
//! `?` filter predicates.

use serde_json::Value;
use serde_json_path::JsonPath;

use crate::core::{TraversalError, TraversalResult};

/// A compiled path expression
#[derive(Debug, Clone)]
pub struct CompiledPath {
    source: String,
    path: JsonPath,
}

impl CompiledPath {
    /// Compile an expression. `items[0]` is shorthand for `$.items[0]`.
    pub fn compile(expr: &str) -> TraversalResult<Self> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(TraversalError::InvalidPath {
                path: expr.to_string(),
                message: "path expression is empty".to_string(),
            });
        }

        let normalized = if trimmed.starts_with('$') {
            trimmed.to_string()
        } else if trimmed.starts_with('[') {
            format!("${}", trimmed)
        } else if let Some(rest) = trimmed.strip_prefix('.') {
            format!("$.{}", rest)
        } else {
            format!("$.{}", trimmed)
        };

        let path = JsonPath::parse(&normalized).map_err(|e| TraversalError::InvalidPath {
            path: expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            source: expr.to_string(),
            path,
        })
    }

    /// The expression as the caller wrote it
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// All nodes matched in `root`, in document order
    pub fn query<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        self.path.query(root).all()
    }

    /// First matched node, if any
    pub fn first<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.query(root).into_iter().next()
    }
}
