//! Read-only queries over stored tool outputs
//!
//! Every operation addresses a record by id and returns a bounded response,
//! so the model can inspect a large result without loading it whole.

pub mod count;
pub mod extract;
pub mod list;
pub mod path;
pub mod sample;
pub mod stats;

use std::fmt;

pub use count::{CountMode, CountRequest, CountResponse, CountSpec};
pub use extract::{ExtractRequest, ExtractResponse, Extracted, PathMatch};
pub use list::{ListEntry, ListRequest, ListResponse, ListSortKey, SortOrder};
pub use path::CompiledPath;
pub use sample::{SampleRequest, SampleResponse, SampleStrategy};
pub use stats::{StatsRequest, StatsResponse};

use crate::core::TraversalResult;
use crate::store::{OutputStore, StoredOutput};

/// The five traversal operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraversalOperation {
    List,
    Stats,
    Extract,
    Count,
    Sample,
}

impl TraversalOperation {
    pub const ALL: [TraversalOperation; 5] = [
        TraversalOperation::List,
        TraversalOperation::Stats,
        TraversalOperation::Extract,
        TraversalOperation::Count,
        TraversalOperation::Sample,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TraversalOperation::List => "list",
            TraversalOperation::Stats => "stats",
            TraversalOperation::Extract => "extract",
            TraversalOperation::Count => "count",
            TraversalOperation::Sample => "sample",
        }
    }
}

impl fmt::Display for TraversalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Traversal operations bound to one output store
#[derive(Debug, Clone)]
pub struct TraversalSuite {
    store: OutputStore,
}

impl TraversalSuite {
    pub fn new(store: OutputStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    fn load(&self, id: &str) -> TraversalResult<StoredOutput> {
        Ok(self.store.read(id.trim())?)
    }

    pub fn list(&self, request: &ListRequest) -> TraversalResult<ListResponse> {
        list::list(&self.store, request)
    }

    pub fn stats(&self, request: &StatsRequest) -> TraversalResult<StatsResponse> {
        let record = self.load(&request.id)?;
        stats::stats(&record, request)
    }

    pub fn extract(&self, request: &ExtractRequest) -> TraversalResult<ExtractResponse> {
        let record = self.load(&request.id)?;
        extract::extract(&record, request)
    }

    pub fn count(&self, request: &CountRequest) -> TraversalResult<CountResponse> {
        let record = self.load(&request.id)?;
        count::count(&record, request)
    }

    pub fn sample(&self, request: &SampleRequest) -> TraversalResult<SampleResponse> {
        let record = self.load(&request.id)?;
        sample::sample(&record, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TraversalError;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_suite() -> (TraversalSuite, String, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = OutputStore::new(temp.path());
        let output = StoredOutput::new(
            "db.query",
            "conv",
            "msg",
            true,
            64,
            json!({"sql": "select"}),
            json!({"rows": [{"v": 1}, {"v": 2}, {"v": 3}]}),
        );
        store.write(&output).unwrap();
        let id = output.id().to_string();
        (TraversalSuite::new(store), id, temp)
    }

    #[test]
    fn test_operations_load_by_id() {
        let (suite, id, _temp) = create_test_suite();

        let stats = suite.stats(&StatsRequest::new(&id)).unwrap();
        assert_eq!(stats.tool_name, "db.query");

        let counted = suite
            .count(&CountRequest {
                id: id.clone(),
                counts: vec![CountSpec::new("rows", "$.rows", CountMode::ArrayLength)],
            })
            .unwrap();
        assert_eq!(counted.total, 3);

        let sampled = suite
            .sample(&SampleRequest::new(&id, "rows", 2).with_strategy(SampleStrategy::Last))
            .unwrap();
        assert_eq!(sampled.indices, vec![1, 2]);

        let listed = suite.list(&ListRequest::default()).unwrap();
        assert_eq!(listed.outputs[0].id, id);
    }

    #[test]
    fn test_unknown_id() {
        let (suite, _id, _temp) = create_test_suite();
        let err = suite
            .extract(&ExtractRequest::new("does-not-exist", vec!["$".into()]))
            .unwrap_err();
        assert!(matches!(err, TraversalError::UnknownId(id) if id == "does-not-exist"));
    }

    #[test]
    fn test_operation_names() {
        let names: Vec<&str> = TraversalOperation::ALL.iter().map(|op| op.name()).collect();
        assert_eq!(names, vec!["list", "stats", "extract", "count", "sample"]);
    }
}
