//! Batch computation: Kahn-style topological layering over the step graph.
//!
//! A batch holds steps whose dependencies are all satisfied by earlier
//! batches, so everything within one batch may run concurrently. Layering
//! minimizes the batch count, which maximizes exploitable parallelism.
//! Sequential-mode plans use the same batches; the worker pool's concurrency
//! cap of 1 degrades them to a strict linear order.

use crate::dag::builder::{StepGraph, StepIndex};
use crate::errors::PlanError;
use crate::plan::Plan;
use std::collections::HashSet;

/// A transient group of mutually independent step ids. Not persisted beyond
/// the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub step_ids: Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.step_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.step_ids.is_empty()
    }
}

/// Options controlling batch computation.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Split a batch into sequential sub-batches when two of its steps
    /// declare overlapping target files. Closes the lost-update race between
    /// dependency-independent steps that touch the same path.
    pub split_file_overlaps: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            split_file_overlaps: true,
        }
    }
}

/// Compute the ordered batch sequence for a plan.
///
/// Guarantees: every step appears in exactly one batch; a step's batch index
/// is strictly greater than that of each of its dependencies; within a batch,
/// original plan order is preserved for determinism. Re-validates acyclicity
/// defensively even though `Plan::load` already rejects cycles.
pub fn compute_batches(plan: &Plan, options: &BatchOptions) -> Result<Vec<Batch>, PlanError> {
    let graph = StepGraph::build(plan.steps())?;
    let mut batches = Vec::new();
    let mut completed: HashSet<StepIndex> = HashSet::new();

    while completed.len() < graph.len() {
        // Plan-order scan keeps the tie-break deterministic.
        let layer: Vec<StepIndex> = (0..graph.len())
            .filter(|i| !completed.contains(i) && graph.dependencies_satisfied(*i, &completed))
            .collect();

        if layer.is_empty() {
            // Graph validation should have caught this; residual steps mean
            // a cycle survived.
            let residual: Vec<String> = (0..graph.len())
                .filter(|i| !completed.contains(i))
                .filter_map(|i| graph.get_step(i).map(|s| s.id.clone()))
                .collect();
            return Err(PlanError::Cycle { steps: residual });
        }

        completed.extend(layer.iter().copied());

        if options.split_file_overlaps {
            for sub in split_by_file_overlap(&graph, &layer) {
                batches.push(to_batch(&graph, &sub));
            }
        } else {
            batches.push(to_batch(&graph, &layer));
        }
    }

    Ok(batches)
}

fn to_batch(graph: &StepGraph, indices: &[StepIndex]) -> Batch {
    Batch {
        step_ids: indices
            .iter()
            .filter_map(|&i| graph.get_step(i).map(|s| s.id.clone()))
            .collect(),
    }
}

/// Partition a topological layer into sub-batches with pairwise-disjoint
/// target files. Greedy first-fit in plan order: each step lands in the
/// earliest sub-batch that has none of its files yet.
fn split_by_file_overlap(graph: &StepGraph, layer: &[StepIndex]) -> Vec<Vec<StepIndex>> {
    let mut subs: Vec<(Vec<StepIndex>, HashSet<&std::path::Path>)> = Vec::new();

    for &idx in layer {
        let Some(step) = graph.get_step(idx) else {
            continue;
        };
        let files: Vec<&std::path::Path> = step.files.iter().map(|p| p.as_path()).collect();

        let slot = subs
            .iter_mut()
            .find(|(_, used)| files.iter().all(|f| !used.contains(f)));

        match slot {
            Some((members, used)) => {
                members.push(idx);
                used.extend(files);
            }
            None => {
                subs.push((vec![idx], files.into_iter().collect()));
            }
        }
    }

    subs.into_iter().map(|(members, _)| members).collect()
}
