//! The Rule Graph: a directed graph of Services with named Dependants edges
//! (spec §4.4).
//!
//! The graph itself is consumed read-mostly: structural edits (insert/remove)
//! only happen during reload, while a running cycle only mutates per-Service
//! state reached through [`Graph::get_mut`]. Traversal order is computed
//! fresh on every call rather than cached, since the graph is small and edits
//! are rare.

use indexmap::IndexMap;
use vigil_core::{Service, ServiceName};

use crate::error::GraphError;

/// A directed graph of Services, keyed by name, with "Dependants" edges
/// recorded on each [`Service`] (spec §3, §4.4).
#[derive(Debug, Default)]
pub struct Graph {
    services: IndexMap<ServiceName, Service>,
}

impl Graph {
    pub fn new() -> Self {
        Self { services: IndexMap::new() }
    }

    pub fn insert(&mut self, service: Service) {
        self.services.insert(service.name.clone(), service);
    }

    pub fn remove(&mut self, name: &ServiceName) -> Option<Service> {
        self.services.shift_remove(name)
    }

    pub fn get(&self, name: &ServiceName) -> Option<&Service> {
        self.services.get(name)
    }

    pub fn get_mut(&mut self, name: &ServiceName) -> Option<&mut Service> {
        self.services.get_mut(name)
    }

    pub fn contains(&self, name: &ServiceName) -> bool {
        self.services.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &ServiceName> {
        self.services.keys()
    }

    /// Services `name` depends on: every service whose `dependants` list
    /// names `name`. Parents are derived, not stored, since the graph only
    /// records the forward (Dependants) edge.
    fn parents_of(&self, name: &ServiceName) -> Vec<ServiceName> {
        self.services
            .values()
            .filter(|svc| svc.dependants.iter().any(|d| d == name))
            .map(|svc| svc.name.clone())
            .collect()
    }

    fn dependants_of(&self, name: &ServiceName) -> Vec<ServiceName> {
        match self.services.get(name) {
            Some(svc) => svc.dependants.clone(),
            None => Vec::new(),
        }
    }

    /// Post-order DFS over `neighbors_of(name)`, excluding `root` itself.
    /// Visits the deepest nodes first, so a caller appending `root` at the
    /// end always sees every transitive neighbor already listed.
    fn post_order(
        &self,
        root: &ServiceName,
        neighbors_of: impl Fn(&Self, &ServiceName) -> Vec<ServiceName>,
    ) -> Result<Vec<ServiceName>, GraphError> {
        if !self.contains(root) {
            return Err(GraphError::Missing(root.clone()));
        }
        let mut visited = std::collections::HashSet::new();
        let mut on_stack = std::collections::HashSet::new();
        let mut out = Vec::new();
        self.post_order_visit(root, &neighbors_of, &mut visited, &mut on_stack, &mut out)?;
        out.pop(); // drop root, callers append it explicitly after their own step
        Ok(out)
    }

    fn post_order_visit(
        &self,
        node: &ServiceName,
        neighbors_of: &impl Fn(&Self, &ServiceName) -> Vec<ServiceName>,
        visited: &mut std::collections::HashSet<ServiceName>,
        on_stack: &mut std::collections::HashSet<ServiceName>,
        out: &mut Vec<ServiceName>,
    ) -> Result<(), GraphError> {
        if visited.contains(node) {
            return Ok(());
        }
        if !on_stack.insert(node.clone()) {
            return Err(GraphError::Cycle(node.clone()));
        }
        for neighbor in neighbors_of(self, node) {
            self.post_order_visit(&neighbor, neighbors_of, visited, on_stack, out)?;
        }
        on_stack.remove(node);
        visited.insert(node.clone());
        out.push(node.clone());
        Ok(())
    }

    /// Start(s): every transitive parent, deepest first, then `s` (spec
    /// §4.4).
    pub fn start_order(&self, target: &ServiceName) -> Result<Vec<ServiceName>, GraphError> {
        let mut order = self.post_order(target, Self::parents_of_adapter)?;
        order.push(target.clone());
        Ok(order)
    }

    /// Monitor(s): same traversal as Start, since Monitor "post-orders
    /// parents" identically (spec §4.4).
    pub fn monitor_order(&self, target: &ServiceName) -> Result<Vec<ServiceName>, GraphError> {
        self.start_order(target)
    }

    /// Stop(s): every transitive dependant, deepest first, filtered to only
    /// the ones currently monitored, then `s` (spec §4.4).
    pub fn stop_order(&self, target: &ServiceName) -> Result<Vec<ServiceName>, GraphError> {
        let mut order: Vec<ServiceName> = self
            .post_order(target, Self::dependants_of_adapter)?
            .into_iter()
            .filter(|name| self.get(name).is_some_and(|svc| svc.is_monitored()))
            .collect();
        order.push(target.clone());
        Ok(order)
    }

    /// Unmonitor(s): every transitive dependant, deepest first (unfiltered),
    /// then `s` (spec §4.4).
    pub fn unmonitor_order(&self, target: &ServiceName) -> Result<Vec<ServiceName>, GraphError> {
        let mut order = self.post_order(target, Self::dependants_of_adapter)?;
        order.push(target.clone());
        Ok(order)
    }

    /// Restart(s): Stop over dependants, then `s` itself, then Start over
    /// the same dependants in the reverse (dependency-respecting) order
    /// (spec §4.4).
    pub fn restart_plan(&self, target: &ServiceName) -> Result<RestartPlan, GraphError> {
        let stop_dependants: Vec<ServiceName> = self
            .post_order(target, Self::dependants_of_adapter)?
            .into_iter()
            .filter(|name| self.get(name).is_some_and(|svc| svc.is_monitored()))
            .collect();
        let mut start_dependants = stop_dependants.clone();
        start_dependants.reverse();
        Ok(RestartPlan { stop_dependants, target: target.clone(), start_dependants })
    }

    fn parents_of_adapter(&self, name: &ServiceName) -> Vec<ServiceName> {
        self.parents_of(name)
    }

    fn dependants_of_adapter(&self, name: &ServiceName) -> Vec<ServiceName> {
        self.dependants_of(name)
    }
}

/// The three phases of Restart(s): stop dependants, act on the target
/// itself (explicit restart command, or stop+start), then start dependants
/// back up (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPlan {
    pub stop_dependants: Vec<ServiceName>,
    pub target: ServiceName,
    pub start_dependants: Vec<ServiceName>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::ServiceKind;

    fn svc(name: &str, dependants: &[&str]) -> Service {
        let mut s = Service::new(ServiceName::new(name), ServiceKind::Process);
        s.dependants = dependants.iter().map(|d| ServiceName::new(*d)).collect();
        s.state = vigil_core::MonitorState::Yes;
        s
    }

    // db <- api <- web   (db.dependants = [api], api.dependants = [web])
    fn chain() -> Graph {
        let mut g = Graph::new();
        g.insert(svc("db", &["api"]));
        g.insert(svc("api", &["web"]));
        g.insert(svc("web", &[]));
        g
    }

    #[test]
    fn start_order_visits_parents_before_target() {
        let g = chain();
        let order = g.start_order(&ServiceName::new("web")).unwrap();
        assert_eq!(order, vec![ServiceName::new("db"), ServiceName::new("api"), ServiceName::new("web")]);
    }

    #[test]
    fn stop_order_visits_dependants_before_target() {
        let g = chain();
        let order = g.stop_order(&ServiceName::new("db")).unwrap();
        assert_eq!(order, vec![ServiceName::new("web"), ServiceName::new("api"), ServiceName::new("db")]);
    }

    #[test]
    fn stop_order_skips_dependants_that_are_not_monitored() {
        let mut g = chain();
        g.get_mut(&ServiceName::new("api")).unwrap().state = vigil_core::MonitorState::NotMonitored;
        let order = g.stop_order(&ServiceName::new("db")).unwrap();
        assert_eq!(order, vec![ServiceName::new("web"), ServiceName::new("db")]);
    }

    #[test]
    fn restart_plan_starts_dependants_back_in_dependency_order() {
        let g = chain();
        let plan = g.restart_plan(&ServiceName::new("db")).unwrap();
        assert_eq!(plan.stop_dependants, vec![ServiceName::new("web"), ServiceName::new("api")]);
        assert_eq!(plan.target, ServiceName::new("db"));
        assert_eq!(plan.start_dependants, vec![ServiceName::new("api"), ServiceName::new("web")]);
    }

    #[test]
    fn missing_service_is_an_error() {
        let g = chain();
        let err = g.start_order(&ServiceName::new("ghost")).unwrap_err();
        assert_eq!(err, GraphError::Missing(ServiceName::new("ghost")));
    }

    #[test]
    fn dependency_cycle_is_detected() {
        let mut g = Graph::new();
        g.insert(svc("a", &["b"]));
        g.insert(svc("b", &["a"]));
        let err = g.start_order(&ServiceName::new("a")).unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)));
    }

    #[test]
    fn diamond_dependency_is_visited_once() {
        // base <- {left, right} <- top
        let mut g = Graph::new();
        g.insert(svc("base", &["left", "right"]));
        g.insert(svc("left", &["top"]));
        g.insert(svc("right", &["top"]));
        g.insert(svc("top", &[]));
        let order = g.start_order(&ServiceName::new("top")).unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(order.last(), Some(&ServiceName::new("top")));
        let base_idx = order.iter().position(|n| n == &ServiceName::new("base")).unwrap();
        let left_idx = order.iter().position(|n| n == &ServiceName::new("left")).unwrap();
        assert!(base_idx < left_idx);
    }
}
