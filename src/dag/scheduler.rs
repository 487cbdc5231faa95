//! Stage scheduler.
//!
//! The scheduler holds no status of its own. Everything is derived from the
//! session's [`StageRecords`], so a scheduler built in a fresh process picks
//! up exactly where the last one stopped.

use super::builder::{GraphBuilder, PipelineGraph, StageIndex};
use crate::changeset::ChangeSet;
use crate::errors::{PipelineError, Result};
use crate::session::{StageRecord, StageRecords, StageStatus, status_of};
use crate::stage::Stage;
use chrono::Utc;
use tracing::debug;

/// Result of asking for the next stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Stage to request next; `None` when every stage is terminal
    pub next: Option<String>,
    /// Stages whose gate was false, now recorded as skipped
    pub skipped: Vec<String>,
}

/// Orders stages and picks the next eligible one.
#[derive(Debug)]
pub struct PipelineScheduler {
    graph: PipelineGraph,
    /// Computed once at construction
    order: Vec<StageIndex>,
}

impl PipelineScheduler {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Result<Self> {
        let graph = GraphBuilder::new(stages).build()?;
        let order = graph.topological_order();
        Ok(Self { graph, order })
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    pub fn stage_count(&self) -> usize {
        self.graph.len()
    }

    pub fn stage(&self, id: &str) -> Result<&dyn Stage> {
        self.graph
            .stage_by_id(id)
            .ok_or_else(|| PipelineError::UnknownStage(id.to_string()))
    }

    /// Stages in topological order.
    pub fn ordered_stages(&self) -> impl Iterator<Item = &dyn Stage> {
        self.order.iter().filter_map(|&i| self.graph.stage(i))
    }

    fn dependencies_done(&self, index: StageIndex, records: &StageRecords) -> bool {
        self.graph.dependencies(index).iter().all(|&dep| {
            self.graph
                .stage(dep)
                .is_some_and(|s| status_of(records, s.id()).is_terminal())
        })
    }

    /// Every stage, in declaration order.
    fn all_stages(&self) -> impl Iterator<Item = &dyn Stage> {
        (0..self.graph.len()).filter_map(|i| self.graph.stage(i))
    }

    /// The stage with a request outstanding, if any.
    pub fn in_flight_stage(&self, records: &StageRecords) -> Option<&dyn Stage> {
        self.all_stages()
            .find(|s| status_of(records, s.id()).is_in_flight())
    }

    /// Pick the first pending stage, in topological order, whose dependencies
    /// are all completed or skipped.
    ///
    /// Stages whose gate is false are recorded as skipped in `records` on the
    /// way, strictly before any later stage is offered. The caller persists
    /// them. Fails with `Deadlock` if stages remain but none can ever run.
    pub fn next_eligible_stage(
        &self,
        records: &mut StageRecords,
        changes: &ChangeSet,
    ) -> Result<Selection> {
        let mut selection = Selection::default();

        for &index in &self.order {
            let Some(stage) = self.graph.stage(index) else {
                continue;
            };
            if status_of(records, stage.id()) != StageStatus::Pending {
                continue;
            }
            if !self.dependencies_done(index, records) {
                continue;
            }
            if !stage.gate(changes) {
                debug!(stage = stage.id(), "Gate is false, skipping");
                records.insert(
                    stage.id().to_string(),
                    StageRecord::skipped(stage.id(), Utc::now()),
                );
                selection.skipped.push(stage.id().to_string());
                continue;
            }
            selection.next = Some(stage.id().to_string());
            return Ok(selection);
        }

        if !self.all_terminal(records) && self.in_flight_stage(records).is_none() {
            let blocked = self
                .all_stages()
                .filter(|s| !status_of(records, s.id()).is_terminal())
                .map(|s| s.id().to_string())
                .collect();
            return Err(PipelineError::Deadlock { blocked });
        }

        Ok(selection)
    }

    /// Ids of every stage downstream of `stage`, in topological order.
    pub fn transitive_dependents(&self, stage: &str) -> Result<Vec<String>> {
        let index = self
            .graph
            .index_of(stage)
            .ok_or_else(|| PipelineError::UnknownStage(stage.to_string()))?;
        let downstream = self.graph.transitive_dependents(index);
        Ok(self
            .order
            .iter()
            .filter(|i| downstream.contains(i))
            .filter_map(|&i| self.graph.stage(i).map(|s| s.id().to_string()))
            .collect())
    }

    pub fn all_terminal(&self, records: &StageRecords) -> bool {
        self.all_stages()
            .all(|s| status_of(records, s.id()).is_terminal())
    }
}
