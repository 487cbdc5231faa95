//! Graph builder for the review pipeline.
//!
//! The builder takes stages in declaration order and validates the graph once:
//! ids are unique and well-formed, every dependency names a declared stage, and
//! there are no cycles.

use crate::errors::{PipelineError, Result};
use crate::stage::Stage;
use std::collections::{BTreeSet, HashMap};

/// Index into the stage list (declaration order).
pub type StageIndex = usize;

/// A validated, acyclic graph of stages.
#[derive(Debug)]
pub struct PipelineGraph {
    stages: Vec<Box<dyn Stage>>,
    /// Stage id to index
    index_map: HashMap<String, StageIndex>,
    /// index -> stages that depend on it
    forward_edges: Vec<Vec<StageIndex>>,
    /// index -> stages it depends on
    reverse_edges: Vec<Vec<StageIndex>>,
}

impl PipelineGraph {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, index: StageIndex) -> Option<&dyn Stage> {
        self.stages.get(index).map(|s| s.as_ref())
    }

    pub fn stage_by_id(&self, id: &str) -> Option<&dyn Stage> {
        self.index_of(id).and_then(|i| self.stage(i))
    }

    pub fn index_of(&self, id: &str) -> Option<StageIndex> {
        self.index_map.get(id).copied()
    }

    /// Stages that depend on `index`.
    pub fn dependents(&self, index: StageIndex) -> &[StageIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Stages `index` depends on.
    pub fn dependencies(&self, index: StageIndex) -> &[StageIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Topological order; ties go to the stage declared first.
    pub fn topological_order(&self) -> Vec<StageIndex> {
        let mut in_degree: Vec<usize> = self.reverse_edges.iter().map(|d| d.len()).collect();
        let mut ready: BTreeSet<StageIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &dependent in self.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }
        order
    }

    /// Every stage downstream of `index`, in ascending index order.
    pub fn transitive_dependents(&self, index: StageIndex) -> Vec<StageIndex> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<StageIndex> = self.dependents(index).to_vec();
        while let Some(node) = stack.pop() {
            if seen.insert(node) {
                stack.extend_from_slice(self.dependents(node));
            }
        }
        seen.into_iter().collect()
    }
}

/// Builder for [`PipelineGraph`].
pub struct GraphBuilder {
    stages: Vec<Box<dyn Stage>>,
}

impl GraphBuilder {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Validate and build the graph.
    pub fn build(self) -> Result<PipelineGraph> {
        let mut index_map = HashMap::new();
        for (i, stage) in self.stages.iter().enumerate() {
            let id = stage.id();
            if !is_valid_id(id) {
                return Err(PipelineError::Other(anyhow::anyhow!(
                    "Invalid stage id '{}': use lowercase letters, digits and underscores",
                    id
                )));
            }
            if index_map.insert(id.to_string(), i).is_some() {
                return Err(PipelineError::DuplicateStage(id.to_string()));
            }
        }

        let mut forward_edges: Vec<Vec<StageIndex>> = vec![Vec::new(); self.stages.len()];
        let mut reverse_edges: Vec<Vec<StageIndex>> = vec![Vec::new(); self.stages.len()];

        for (to_idx, stage) in self.stages.iter().enumerate() {
            for dep in stage.depends_on() {
                let from_idx = *index_map.get(dep).ok_or_else(|| {
                    PipelineError::UnknownDependency {
                        stage: stage.id().to_string(),
                        dependency: dep.to_string(),
                    }
                })?;
                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        let graph = PipelineGraph {
            stages: self.stages,
            index_map,
            forward_edges,
            reverse_edges,
        };

        Self::validate_no_cycles(&graph)?;
        Ok(graph)
    }

    fn validate_no_cycles(graph: &PipelineGraph) -> Result<()> {
        let order = graph.topological_order();
        if order.len() == graph.len() {
            return Ok(());
        }

        let stages: Vec<String> = (0..graph.len())
            .filter(|i| !order.contains(i))
            .filter_map(|i| graph.stage(i).map(|s| s.id().to_string()))
            .collect();
        Err(PipelineError::CycleDetected { stages })
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
