//! `extract`: pull values out of a stored payload by path

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{TraversalError, TraversalResult};
use crate::store::StoredOutput;

use super::path::CompiledPath;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRequest {
    pub id: String,
    pub paths: Vec<String>,
    /// Merge every match from every path into one sequence
    #[serde(default)]
    pub flatten: bool,
    /// Return `[{path, value}]` entries instead of an object keyed by path
    #[serde(default)]
    pub include_paths: bool,
    /// Substituted for paths that match nothing
    #[serde(default)]
    pub default_value: Option<Value>,
}

impl ExtractRequest {
    pub fn new(id: impl Into<String>, paths: Vec<String>) -> Self {
        Self {
            id: id.into(),
            paths,
            flatten: false,
            include_paths: false,
            default_value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMatch {
    pub path: String,
    pub value: Value,
}

/// Extracted values in the shape the request asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Extracted {
    /// Path expression -> array of matches (or the default)
    ByPath(Map<String, Value>),
    /// One entry per path, in request order
    Entries(Vec<PathMatch>),
    /// Every match in one sequence
    Flat(Vec<Value>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub extracted: Extracted,
    /// Paths that matched nothing
    pub missing_paths: Vec<String>,
}

pub fn extract(record: &StoredOutput, request: &ExtractRequest) -> TraversalResult<ExtractResponse> {
    if request.paths.is_empty() {
        return Err(TraversalError::InvalidRequest(
            "'paths' must contain at least one path".to_string(),
        ));
    }

    // Compile everything first so a bad path fails the whole request.
    let compiled = request
        .paths
        .iter()
        .map(|p| CompiledPath::compile(p))
        .collect::<TraversalResult<Vec<_>>>()?;

    let root = &record.content;
    let mut missing_paths = Vec::new();
    let mut per_path: Vec<(String, Option<Vec<Value>>)> = Vec::with_capacity(compiled.len());

    for path in &compiled {
        let matches = path.query(root);
        if matches.is_empty() {
            missing_paths.push(path.as_str().to_string());
            per_path.push((path.as_str().to_string(), None));
        } else {
            per_path.push((
                path.as_str().to_string(),
                Some(matches.into_iter().cloned().collect()),
            ));
        }
    }

    let fallback = || request.default_value.clone().unwrap_or(Value::Null);

    let extracted = if request.flatten {
        let mut all = Vec::new();
        for (_, matches) in per_path {
            match matches {
                Some(values) => all.extend(values),
                None => {
                    if let Some(ref default) = request.default_value {
                        all.push(default.clone());
                    }
                }
            }
        }
        Extracted::Flat(all)
    } else if request.include_paths {
        Extracted::Entries(
            per_path
                .into_iter()
                .map(|(path, matches)| PathMatch {
                    path,
                    value: matches.map(Value::Array).unwrap_or_else(fallback),
                })
                .collect(),
        )
    } else {
        let mut map = Map::new();
        for (path, matches) in per_path {
            map.insert(path, matches.map(Value::Array).unwrap_or_else(fallback));
        }
        Extracted::ByPath(map)
    };

    Ok(ExtractResponse {
        extracted,
        missing_paths,
    })
}
