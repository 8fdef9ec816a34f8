//! `count`: named counters over a stored payload

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{TraversalError, TraversalResult};
use crate::store::StoredOutput;

use super::path::CompiledPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CountMode {
    /// Sum of lengths of the matched arrays
    #[default]
    ArrayLength,
    /// Sum of key counts of the matched objects
    ObjectKeys,
    /// Number of matched nodes
    Matches,
    /// Items of matched arrays, including items of arrays nested inside them
    NestedTotal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountSpec {
    pub name: String,
    pub path: String,
    #[serde(default, alias = "count_type")]
    pub mode: CountMode,
}

impl CountSpec {
    pub fn new(name: impl Into<String>, path: impl Into<String>, mode: CountMode) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            mode,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountRequest {
    pub id: String,
    pub counts: Vec<CountSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountResponse {
    pub counts: BTreeMap<String, u64>,
    /// Sum of every counter
    pub total: u64,
}

fn nested_total(value: &Value) -> u64 {
    match value {
        Value::Array(items) => {
            items.len() as u64
                + items
                    .iter()
                    .filter(|item| item.is_array())
                    .map(nested_total)
                    .sum::<u64>()
        }
        _ => 0,
    }
}

fn count_one(root: &Value, spec: &CountSpec) -> TraversalResult<u64> {
    let path = CompiledPath::compile(&spec.path)?;
    let nodes = path.query(root);

    // Missing paths and values of the wrong type count as zero.
    let count = match spec.mode {
        CountMode::ArrayLength => nodes
            .iter()
            .filter_map(|v| v.as_array())
            .map(|a| a.len() as u64)
            .sum(),
        CountMode::ObjectKeys => nodes
            .iter()
            .filter_map(|v| v.as_object())
            .map(|o| o.len() as u64)
            .sum(),
        CountMode::Matches => nodes.len() as u64,
        CountMode::NestedTotal => nodes.iter().map(|v| nested_total(v)).sum(),
    };
    Ok(count)
}

pub fn count(record: &StoredOutput, request: &CountRequest) -> TraversalResult<CountResponse> {
    if request.counts.is_empty() {
        return Err(TraversalError::InvalidRequest(
            "'counts' must contain at least one counter".to_string(),
        ));
    }

    let mut counts = BTreeMap::new();
    let mut total = 0u64;
    for spec in &request.counts {
        if spec.name.trim().is_empty() {
            return Err(TraversalError::InvalidRequest(
                "each counter requires a non-empty 'name'".to_string(),
            ));
        }
        if counts.contains_key(&spec.name) {
            return Err(TraversalError::InvalidRequest(format!(
                "duplicate counter name '{}'",
                spec.name
            )));
        }
        let n = count_one(&record.content, spec)?;
        total += n;
        counts.insert(spec.name.clone(), n);
    }

    Ok(CountResponse { counts, total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> StoredOutput {
        StoredOutput::new(
            "t",
            "c",
            "m",
            true,
            0,
            json!({}),
            json!({
                "items": [{"ok": true}, {"ok": false}, {"ok": true}],
                "meta": {"a": 1, "b": 2},
                "grid": [[1, 2], [3, [4, 5]]],
                "empty": []
            }),
        )
    }

    fn run(specs: Vec<CountSpec>) -> CountResponse {
        let rec = record();
        count(
            &rec,
            &CountRequest {
                id: rec.id().to_string(),
                counts: specs,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_modes_and_total() {
        let resp = run(vec![
            CountSpec::new("items", "$.items", CountMode::ArrayLength),
            CountSpec::new("keys", "$.meta", CountMode::ObjectKeys),
            CountSpec::new("ok", "$.items[?@.ok == true]", CountMode::Matches),
            CountSpec::new("cells", "$.grid", CountMode::NestedTotal),
        ]);

        assert_eq!(resp.counts["items"], 3);
        assert_eq!(resp.counts["keys"], 2);
        assert_eq!(resp.counts["ok"], 2);
        // 2 rows + 2 + 2 + nested [4, 5]
        assert_eq!(resp.counts["cells"], 8);
        assert_eq!(resp.total, 15);
    }

    #[test]
    fn test_missing_or_empty_is_zero() {
        let resp = run(vec![
            CountSpec::new("empty", "$.empty", CountMode::ArrayLength),
            CountSpec::new("missing", "$.nope", CountMode::ArrayLength),
            CountSpec::new("scalar", "$.meta.a", CountMode::ArrayLength),
        ]);
        assert_eq!(resp.counts["empty"], 0);
        assert_eq!(resp.counts["missing"], 0);
        assert_eq!(resp.counts["scalar"], 0);
        assert_eq!(resp.total, 0);
    }

    #[test]
    fn test_count_type_alias() {
        let spec: CountSpec =
            serde_json::from_value(json!({"name": "n", "path": "$", "count_type": "object_keys"}))
                .unwrap();
        assert_eq!(spec.mode, CountMode::ObjectKeys);

        let spec: CountSpec = serde_json::from_value(json!({"name": "n", "path": "$"})).unwrap();
        assert_eq!(spec.mode, CountMode::ArrayLength);
    }

    #[test]
    fn test_rejects_empty_request() {
        let rec = record();
        let req = CountRequest {
            id: rec.id().to_string(),
            counts: vec![],
        };
        assert!(matches!(
            count(&rec, &req),
            Err(TraversalError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let rec = record();
        let req = CountRequest {
            id: rec.id().to_string(),
            counts: vec![
                CountSpec::new("n", "$.items", CountMode::ArrayLength),
                CountSpec::new("n", "$.meta", CountMode::ObjectKeys),
            ],
        };
        let err = count(&rec, &req).unwrap_err();
        assert!(matches!(err, TraversalError::InvalidRequest(_)));
        assert!(err.to_string().contains("duplicate counter name 'n'"));
    }
}
