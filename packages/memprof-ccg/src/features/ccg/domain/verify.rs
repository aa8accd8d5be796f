//! Graph invariant checks
//!
//! Programming invariants abort; there is no runtime recovery. The
//! whole-graph check runs between stages when `verify_graph` is set,
//! the per-node check during cloning when `verify_nodes` is set.

use crate::features::ccg::domain::graph::CallsiteContextGraph;
use crate::features::ccg::domain::node::{EdgeId, NodeId};
use crate::features::ccg::ports::CallsiteSource;
use crate::shared::models::ContextId;
use rustc_hash::FxHashSet;

impl<S: CallsiteSource> CallsiteContextGraph<S> {
    /// Assert the invariants of a single edge: a live edge carries at
    /// least one context id and a non-None label.
    pub(crate) fn check_edge(&self, edge: EdgeId) {
        assert!(
            !self.edge(edge).alloc_types.is_none(),
            "edge {edge} has None alloc type"
        );
        assert!(
            !self.edge(edge).context_ids.is_empty(),
            "edge {edge} has no context ids"
        );
    }

    /// Assert the invariants of one node:
    /// - its context ids equal the union over its callee edges;
    /// - they equal the union over its caller edges, except that an
    ///   alloc node may hold extra ids for contexts terminating at it
    ///   (shorter profiled stacks);
    /// - every attached edge is live when `check_edges` is set.
    pub(crate) fn check_node(&self, id: NodeId, check_edges: bool) {
        let node = self.node(id);
        if node.is_removed() {
            assert!(
                node.callee_edges.is_empty() && node.caller_edges.is_empty(),
                "removed node {id} still has edges"
            );
            return;
        }

        if !node.caller_edges.is_empty() {
            let mut caller_ids: FxHashSet<ContextId> = FxHashSet::default();
            for &edge in &node.caller_edges {
                if check_edges {
                    self.check_edge(edge);
                }
                caller_ids.extend(self.edge(edge).context_ids.iter().copied());
            }
            assert!(
                node.context_ids == caller_ids
                    || caller_ids.is_subset(&node.context_ids),
                "node {id} context ids diverge from caller edge union"
            );
        }

        if !node.callee_edges.is_empty() {
            let mut callee_ids: FxHashSet<ContextId> = FxHashSet::default();
            for &edge in &node.callee_edges {
                if check_edges {
                    self.check_edge(edge);
                }
                callee_ids.extend(self.edge(edge).context_ids.iter().copied());
            }
            assert_eq!(
                node.context_ids, callee_ids,
                "node {id} context ids diverge from callee edge union"
            );
        }
    }

    /// Assert the invariants of the whole graph
    pub fn verify(&self) {
        for id in 0..self.node_count() {
            self.check_node(id, false);
            for &edge in &self.node(id).caller_edges {
                self.check_edge(edge);
            }
        }
    }
}
