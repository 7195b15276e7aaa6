//! Dependency graph construction and validation
//!
//! A plan is only executable when every dependency names a step in the plan,
//! step ids are unique, and the graph is acyclic. Validation happens before
//! any step is dispatched.

use std::collections::{HashMap, HashSet, VecDeque};

use forge_core::PlanStep;

use crate::error::{OrchestratorError, Result};

/// Validated adjacency structure for one plan.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Step ids in plan order.
    ids: Vec<String>,
    /// step id -> ids it depends on
    dependencies: HashMap<String, Vec<String>>,
    /// step id -> ids that depend on it
    dependents: HashMap<String, Vec<String>>,
    order: Vec<String>,
}

impl DependencyGraph {
    pub fn build(steps: &[PlanStep]) -> Result<Self> {
        if steps.is_empty() {
            return Err(OrchestratorError::EmptyPlan);
        }

        let mut ids = Vec::with_capacity(steps.len());
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        for step in steps {
            if dependencies.contains_key(&step.id) {
                return Err(OrchestratorError::DuplicateStep(step.id.clone()));
            }
            ids.push(step.id.clone());
            dependencies.insert(step.id.clone(), step.dependencies.clone());
        }

        let mut dependents: HashMap<String, Vec<String>> =
            ids.iter().map(|id| (id.clone(), Vec::new())).collect();
        for step in steps {
            for dep in &step.dependencies {
                match dependents.get_mut(dep) {
                    Some(list) => list.push(step.id.clone()),
                    None => return Err(OrchestratorError::unknown_dependency(&step.id, dep)),
                }
            }
        }

        let mut graph = Self {
            ids,
            dependencies,
            dependents,
            order: Vec::new(),
        };

        if let Some(cycle) = graph.find_cycle() {
            return Err(OrchestratorError::CyclicDependency { cycle });
        }
        graph.order = graph.topological_order();

        Ok(graph)
    }

    /// Depth-first search with an explicit recursion stack. Returns the cycle
    /// path, first node repeated at the end, on the first back edge found.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();
        let mut on_stack: HashSet<&str> = HashSet::new();

        for id in &self.ids {
            if !visited.contains(id.as_str()) {
                if let Some(cycle) = self.visit(id, &mut visited, &mut stack, &mut on_stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
        on_stack: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(id);
        stack.push(id);
        on_stack.insert(id);

        for dep in self.dependencies.get(id).into_iter().flatten() {
            let dep = dep.as_str();
            if on_stack.contains(dep) {
                let start = stack.iter().position(|s| *s == dep).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
            if !visited.contains(dep) {
                if let Some(cycle) = self.visit(dep, visited, stack, on_stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        on_stack.remove(id);
        None
    }

    /// Kahn's algorithm, ties broken by plan order.
    fn topological_order(&self) -> Vec<String> {
        let mut in_degree: HashMap<&str, usize> = self
            .ids
            .iter()
            .map(|id| (id.as_str(), self.dependencies[id].len()))
            .collect();

        let mut queue: VecDeque<&str> = self
            .ids
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree[id] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.ids.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            for dependent in &self.dependents[id] {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
        order
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn dependencies(&self, id: &str) -> &[String] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dependents(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every step reachable through dependents, not including `id` itself.
    pub fn transitive_dependents(&self, id: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents(current) {
                if seen.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }
        seen
    }

    pub fn contains(&self, id: &str) -> bool {
        self.dependencies.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::AgentType;

    fn step(id: &str, deps: &[&str]) -> PlanStep {
        let mut step = PlanStep::new(id, AgentType::Backend, "noop");
        step.dependencies = deps.iter().map(|d| d.to_string()).collect();
        step
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|s| s == id).unwrap()
    }

    #[test]
    fn test_linear_order() {
        let graph = DependencyGraph::build(&[
            step("c", &["b"]),
            step("b", &["a"]),
            step("a", &[]),
        ])
        .unwrap();

        assert_eq!(graph.order(), &["a", "b", "c"]);
    }

    #[test]
    fn test_order_respects_every_edge() {
        let steps = vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
            step("e", &[]),
        ];
        let graph = DependencyGraph::build(&steps).unwrap();
        let order = graph.order();

        assert_eq!(order.len(), 5);
        for s in &steps {
            for dep in &s.dependencies {
                assert!(position(order, dep) < position(order, &s.id));
            }
        }
    }

    #[test]
    fn test_two_node_cycle() {
        let err = DependencyGraph::build(&[step("a", &["b"]), step("b", &["a"])]).unwrap_err();

        match err {
            OrchestratorError::CyclicDependency { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 3);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_cycle() {
        let err = DependencyGraph::build(&[step("a", &["a"])]).unwrap_err();
        assert!(matches!(err, OrchestratorError::CyclicDependency { .. }));
    }

    #[test]
    fn test_cycle_behind_valid_prefix() {
        let err = DependencyGraph::build(&[
            step("a", &[]),
            step("b", &["a", "d"]),
            step("c", &["b"]),
            step("d", &["c"]),
        ])
        .unwrap_err();

        match err {
            OrchestratorError::CyclicDependency { cycle } => {
                assert!(!cycle.contains(&"a".to_string()));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let err = DependencyGraph::build(&[step("a", &["ghost"])]).unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownDependency { .. }));
    }

    #[test]
    fn test_duplicate_and_empty() {
        let err = DependencyGraph::build(&[step("a", &[]), step("a", &[])]).unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateStep(_)));

        let err = DependencyGraph::build(&[]).unwrap_err();
        assert!(matches!(err, OrchestratorError::EmptyPlan));
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = DependencyGraph::build(&[
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["b"]),
            step("d", &[]),
        ])
        .unwrap();

        let downstream = graph.transitive_dependents("a");
        assert!(downstream.contains("b"));
        assert!(downstream.contains("c"));
        assert!(!downstream.contains("d"));
        assert_eq!(graph.dependents("a"), &["b".to_string()]);
    }
}
