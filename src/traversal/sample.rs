//! `sample`: bounded subsets of an array inside a stored payload

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{TraversalError, TraversalResult};
use crate::store::{value_type_name, StoredOutput};

use super::path::CompiledPath;

/// Largest subset returned when the array has more items than requested
pub const MAX_SAMPLE_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SampleStrategy {
    First,
    Last,
    #[default]
    Random,
    /// Every `stride`-th item from the start
    Systematic,
    /// Proportional allocation across groups keyed by `group_by`
    Stratified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRequest {
    pub id: String,
    /// Path selecting the array to sample
    pub path: String,
    pub size: usize,
    #[serde(default)]
    pub strategy: SampleStrategy,
    /// Fixes the random choice for `random` and `stratified`
    #[serde(default)]
    pub seed: Option<u64>,
    /// Step for `systematic`; defaults to `len / size`
    #[serde(default)]
    pub stride: Option<usize>,
    /// Path, relative to each item, whose value keys the strata
    #[serde(default)]
    pub group_by: Option<String>,
}

impl SampleRequest {
    pub fn new(id: impl Into<String>, path: impl Into<String>, size: usize) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            size,
            strategy: SampleStrategy::default(),
            seed: None,
            stride: None,
            group_by: None,
        }
    }

    pub fn with_strategy(mut self, strategy: SampleStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleResponse {
    pub sample: Vec<Value>,
    /// Positions of the sampled items in the source array, ascending
    pub indices: Vec<usize>,
    /// Length of the source array
    pub total_items: usize,
    pub sample_size: usize,
    /// The requested size exceeded `MAX_SAMPLE_SIZE` and was cut down to it
    #[serde(default)]
    pub truncated: bool,
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

fn random_indices(rng: &mut StdRng, len: usize, amount: usize) -> Vec<usize> {
    let mut picked = index::sample(rng, len, amount).into_vec();
    picked.sort_unstable();
    picked
}

fn systematic_indices(len: usize, size: usize, stride: Option<usize>) -> Vec<usize> {
    let stride = stride.unwrap_or(len / size).max(1);
    (0..len).step_by(stride).take(size).collect()
}

fn stratified_indices(
    items: &[Value],
    size: usize,
    group_by: &CompiledPath,
    rng: &mut StdRng,
) -> Vec<usize> {
    // Groups in order of first appearance
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        let key = group_by
            .first(item)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "null".to_string());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(idx),
            None => groups.push((key, vec![idx])),
        }
    }

    // Largest-remainder allocation of `size` across groups
    let total = items.len();
    let mut quotas: Vec<usize> = groups
        .iter()
        .map(|(_, m)| size * m.len() / total)
        .collect();
    let mut leftover = size - quotas.iter().sum::<usize>();
    let mut by_remainder: Vec<usize> = (0..groups.len()).collect();
    by_remainder.sort_by_key(|&g| std::cmp::Reverse(size * groups[g].1.len() % total));
    for g in by_remainder {
        if leftover == 0 {
            break;
        }
        if quotas[g] < groups[g].1.len() {
            quotas[g] += 1;
            leftover -= 1;
        }
    }

    let mut picked = Vec::with_capacity(size);
    for ((_, members), quota) in groups.iter().zip(quotas) {
        if quota == 0 {
            continue;
        }
        for i in index::sample(rng, members.len(), quota).into_iter() {
            picked.push(members[i]);
        }
    }
    picked.sort_unstable();
    picked
}

pub fn sample(record: &StoredOutput, request: &SampleRequest) -> TraversalResult<SampleResponse> {
    if request.size == 0 {
        return Err(TraversalError::InvalidRequest(
            "size must be at least 1".to_string(),
        ));
    }

    let path = CompiledPath::compile(&request.path)?;
    let nodes = path.query(&record.content);
    if nodes.is_empty() {
        return Err(TraversalError::NoMatch(request.path.clone()));
    }
    let items = match nodes.iter().find_map(|v| v.as_array()) {
        Some(items) => items,
        None => {
            return Err(TraversalError::TypeMismatch {
                path: request.path.clone(),
                expected: "array",
                found: value_type_name(nodes[0]),
            })
        }
    };

    let total_items = items.len();
    let (take, truncated) = if request.size >= total_items {
        (total_items, false)
    } else if request.size > MAX_SAMPLE_SIZE {
        (MAX_SAMPLE_SIZE, true)
    } else {
        (request.size, false)
    };

    let indices: Vec<usize> = if take == total_items {
        // Whole array requested (or more than exists)
        (0..total_items).collect()
    } else {
        match request.strategy {
            SampleStrategy::First => (0..take).collect(),
            SampleStrategy::Last => (total_items - take..total_items).collect(),
            SampleStrategy::Random => random_indices(&mut rng_for(request.seed), total_items, take),
            SampleStrategy::Systematic => systematic_indices(total_items, take, request.stride),
            SampleStrategy::Stratified => {
                let expr = request.group_by.as_deref().ok_or_else(|| {
                    TraversalError::InvalidRequest(
                        "strategy 'stratified' requires 'group_by'".to_string(),
                    )
                })?;
                let group_by = CompiledPath::compile(expr)?;
                stratified_indices(items, take, &group_by, &mut rng_for(request.seed))
            }
        }
    };

    let sample: Vec<Value> = indices.iter().map(|&i| items[i].clone()).collect();
    Ok(SampleResponse {
        sample_size: indices.len(),
        sample,
        indices,
        total_items,
        truncated,
    })
}
