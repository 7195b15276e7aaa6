//! Dispatch bookkeeping for one plan run
//!
//! The scheduler owns no tasks. It answers which steps may start now and
//! records how started steps ended; the orchestrator drives the actual
//! execution. A step becomes ready once every dependency has completed, and
//! starts only while its agent type is under its concurrency ceiling. A failed
//! step blocks everything downstream of it, and a failed critical step halts
//! all further dispatch.

use std::collections::HashMap;

use forge_core::{AgentType, PlanStep};
use tracing::{debug, warn};

use crate::config::ConcurrencyConfig;
use crate::graph::DependencyGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Waiting,
    Running,
    Completed,
    Failed,
    /// A dependency failed; the step can never run in this pass.
    Blocked,
}

#[derive(Debug)]
pub struct TaskScheduler {
    steps: HashMap<String, PlanStep>,
    graph: DependencyGraph,
    limits: ConcurrencyConfig,
    slots: HashMap<String, Slot>,
    running: HashMap<AgentType, usize>,
    halted_by: Option<String>,
}

impl TaskScheduler {
    pub fn new(steps: &[PlanStep], graph: DependencyGraph, limits: ConcurrencyConfig) -> Self {
        Self {
            steps: steps.iter().map(|s| (s.id.clone(), s.clone())).collect(),
            slots: steps
                .iter()
                .map(|s| (s.id.clone(), Slot::Waiting))
                .collect(),
            graph,
            limits,
            running: HashMap::new(),
            halted_by: None,
        }
    }

    fn slot(&self, id: &str) -> Slot {
        self.slots.get(id).copied().unwrap_or(Slot::Blocked)
    }

    fn is_ready(&self, id: &str) -> bool {
        self.slot(id) == Slot::Waiting
            && self
                .graph
                .dependencies(id)
                .iter()
                .all(|dep| self.slot(dep) == Slot::Completed)
    }

    /// Steps to start now, in topological order. Each returned step is
    /// marked running and counted against its agent type's ceiling.
    pub fn next_ready(&mut self) -> Vec<PlanStep> {
        if self.halted_by.is_some() {
            return Vec::new();
        }

        let mut ready = Vec::new();
        for id in self.graph.order().to_vec() {
            if !self.is_ready(&id) {
                continue;
            }
            let Some(step) = self.steps.get(&id) else {
                continue;
            };
            let running = self.running.get(&step.agent_type).copied().unwrap_or(0);
            if running >= self.limits.limit(step.agent_type) {
                debug!(
                    step_id = %id,
                    agent_type = %step.agent_type,
                    running,
                    "Concurrency ceiling reached, deferring step"
                );
                continue;
            }

            *self.running.entry(step.agent_type).or_default() += 1;
            self.slots.insert(id.clone(), Slot::Running);
            ready.push(step.clone());
        }
        ready
    }

    fn release(&mut self, step_id: &str) -> bool {
        if self.slot(step_id) != Slot::Running {
            warn!(step_id = %step_id, "Outcome for a step that is not running");
            return false;
        }
        if let Some(step) = self.steps.get(step_id) {
            if let Some(count) = self.running.get_mut(&step.agent_type) {
                *count = count.saturating_sub(1);
            }
        }
        true
    }

    pub fn record_completed(&mut self, step_id: &str) {
        if self.release(step_id) {
            self.slots.insert(step_id.to_string(), Slot::Completed);
        }
    }

    /// Record a terminal failure. Returns true when the failure halts the
    /// plan, i.e. the step is critical.
    pub fn record_failed(&mut self, step_id: &str) -> bool {
        if !self.release(step_id) {
            return false;
        }
        self.slots.insert(step_id.to_string(), Slot::Failed);

        for dependent in self.graph.transitive_dependents(step_id) {
            if self.slot(&dependent) == Slot::Waiting {
                self.slots.insert(dependent, Slot::Blocked);
            }
        }

        let critical = self.steps.get(step_id).map(|s| s.critical).unwrap_or(false);
        if critical && self.halted_by.is_none() {
            self.halted_by = Some(step_id.to_string());
        }
        critical
    }

    /// The critical step whose failure stopped dispatch.
    pub fn halted_by(&self) -> Option<&str> {
        self.halted_by.as_deref()
    }

    pub fn in_flight(&self) -> usize {
        self.slots.values().filter(|s| **s == Slot::Running).count()
    }

    pub fn running_for(&self, agent_type: AgentType) -> usize {
        self.running.get(&agent_type).copied().unwrap_or(0)
    }

    /// Nothing is running and nothing can start.
    pub fn is_finished(&self) -> bool {
        if self.in_flight() > 0 {
            return false;
        }
        self.halted_by.is_some() || !self.graph.order().iter().any(|id| self.is_ready(id))
    }

    /// Steps that never started, in topological order.
    pub fn undispatched(&self) -> Vec<PlanStep> {
        self.graph
            .order()
            .iter()
            .filter(|id| matches!(self.slot(id), Slot::Waiting | Slot::Blocked))
            .filter_map(|id| self.steps.get(id).cloned())
            .collect()
    }
}
