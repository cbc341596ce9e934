//! Dependency graph construction and validation for plan steps.
//!
//! The graph validates structure on build: every dependency must reference a
//! known step, ids must be unique, and no cycles are allowed. The plan loader
//! already checks ids and references; the graph re-checks defensively since it
//! is also reachable from hand-built plans in library use.

use crate::errors::PlanError;
use crate::plan::Step;
use std::collections::{HashMap, HashSet};

/// Index into the plan's step list.
pub type StepIndex = usize;

/// A validated directed acyclic graph over a plan's steps.
#[derive(Debug)]
pub struct StepGraph {
    /// Steps in original plan order.
    steps: Vec<Step>,
    /// Map from step id to index.
    index_map: HashMap<String, StepIndex>,
    /// Forward edges: index -> steps that depend on it.
    dependents: Vec<Vec<StepIndex>>,
    /// Reverse edges: index -> steps it depends on.
    dependencies: Vec<Vec<StepIndex>>,
}

impl StepGraph {
    /// Build and validate a graph from plan steps.
    pub fn build(steps: &[Step]) -> Result<Self, PlanError> {
        let mut index_map = HashMap::new();
        for (i, step) in steps.iter().enumerate() {
            if index_map.insert(step.id.clone(), i).is_some() {
                return Err(PlanError::DuplicateStep {
                    id: step.id.clone(),
                });
            }
        }

        let mut dependents: Vec<Vec<StepIndex>> = vec![Vec::new(); steps.len()];
        let mut dependencies: Vec<Vec<StepIndex>> = vec![Vec::new(); steps.len()];

        for (to_idx, step) in steps.iter().enumerate() {
            for dep in &step.depends_on {
                let from_idx =
                    *index_map
                        .get(dep)
                        .ok_or_else(|| PlanError::UnknownDependency {
                            step: step.id.clone(),
                            dependency: dep.clone(),
                        })?;

                dependents[from_idx].push(to_idx);
                dependencies[to_idx].push(from_idx);
            }
        }

        let graph = Self {
            steps: steps.to_vec(),
            index_map,
            dependents,
            dependencies,
        };

        graph.validate_no_cycles()?;
        Ok(graph)
    }

    /// Number of steps in the graph.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Get a step by its index.
    pub fn get_step(&self, index: StepIndex) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Get the index for a step id.
    pub fn get_index(&self, id: &str) -> Option<StepIndex> {
        self.index_map.get(id).copied()
    }

    /// All steps in plan order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Steps that depend on the given step.
    pub fn dependents(&self, index: StepIndex) -> &[StepIndex] {
        self.dependents.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Steps the given step depends on.
    pub fn dependencies(&self, index: StepIndex) -> &[StepIndex] {
        self.dependencies.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Check if all dependencies of a step are in the completed set.
    pub fn dependencies_satisfied(&self, index: StepIndex, completed: &HashSet<StepIndex>) -> bool {
        self.dependencies(index)
            .iter()
            .all(|dep| completed.contains(dep))
    }

    /// Validate acyclicity using Kahn's algorithm.
    ///
    /// Maintains an in-degree per step; repeatedly removes zero-in-degree
    /// steps and decrements their dependents. A non-empty residual means a
    /// cycle, reported with the step ids still carrying in-degree.
    fn validate_no_cycles(&self) -> Result<(), PlanError> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(|deps| deps.len()).collect();

        let mut queue: Vec<StepIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;

        while let Some(node) = queue.pop() {
            processed += 1;

            for &dependent in self.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if processed != self.len() {
            let cycle_steps: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .filter_map(|(i, _)| self.get_step(i).map(|s| s.id.clone()))
                .collect();

            return Err(PlanError::Cycle { steps: cycle_steps });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Step;

    fn step(id: &str, deps: Vec<&str>) -> Step {
        Step::new(
            id,
            &format!("Step {}", id),
            "true",
            deps.into_iter().map(String::from).collect(),
        )
    }

    #[test]
    fn test_build_simple_graph() {
        let steps = vec![
            step("01", vec![]),
            step("02", vec!["01"]),
            step("03", vec!["01"]),
            step("04", vec!["02", "03"]),
        ];

        let graph = StepGraph::build(&steps).unwrap();

        assert_eq!(graph.len(), 4);
        assert!(graph.dependencies(0).is_empty());
        assert_eq!(graph.dependencies(3), &[1, 2]);
        let dependents = graph.dependents(0);
        assert!(dependents.contains(&1));
        assert!(dependents.contains(&2));
    }

    #[test]
    fn test_cycle_detection_names_members() {
        let steps = vec![
            step("01", vec!["03"]),
            step("02", vec!["01"]),
            step("03", vec!["02"]),
        ];

        match StepGraph::build(&steps) {
            Err(PlanError::Cycle { steps }) => {
                assert_eq!(steps.len(), 3);
                assert!(steps.contains(&"01".to_string()));
            }
            other => panic!("Expected Cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let steps = vec![step("01", vec!["01"])];
        assert!(matches!(
            StepGraph::build(&steps),
            Err(PlanError::Cycle { .. })
        ));
    }

    #[test]
    fn test_partial_cycle_excludes_acyclic_steps() {
        // 01 is fine; 02 and 03 form a cycle.
        let steps = vec![
            step("01", vec![]),
            step("02", vec!["03"]),
            step("03", vec!["02"]),
        ];

        match StepGraph::build(&steps) {
            Err(PlanError::Cycle { steps }) => {
                assert!(!steps.contains(&"01".to_string()));
                assert!(steps.contains(&"02".to_string()));
                assert!(steps.contains(&"03".to_string()));
            }
            other => panic!("Expected Cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_dependency() {
        let steps = vec![step("01", vec!["nonexistent"])];
        let result = StepGraph::build(&steps);
        assert!(matches!(
            result,
            Err(PlanError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_duplicate_id() {
        let steps = vec![step("01", vec![]), step("01", vec![])];
        assert!(matches!(
            StepGraph::build(&steps),
            Err(PlanError::DuplicateStep { .. })
        ));
    }

    #[test]
    fn test_empty_graph() {
        let graph = StepGraph::build(&[]).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_dependencies_satisfied() {
        let steps = vec![
            step("01", vec![]),
            step("02", vec!["01"]),
            step("03", vec!["01", "02"]),
        ];

        let graph = StepGraph::build(&steps).unwrap();
        let mut completed = HashSet::new();

        assert!(graph.dependencies_satisfied(0, &completed));
        assert!(!graph.dependencies_satisfied(1, &completed));

        completed.insert(0);
        assert!(graph.dependencies_satisfied(1, &completed));
        assert!(!graph.dependencies_satisfied(2, &completed));

        completed.insert(1);
        assert!(graph.dependencies_satisfied(2, &completed));
    }
}
