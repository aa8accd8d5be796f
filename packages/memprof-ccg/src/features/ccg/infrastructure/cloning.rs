//! Graph cloning
//!
//! Splits nodes so every callsite ends up with a single effective
//! allocation label. Works bottom-up from each allocation: callers are
//! processed first, then caller edges demanding a different label than
//! the node's are peeled off onto clones. The caller-edge sort keeps
//! NotCold last so the original node retains the fallback behavior for
//! callers the profile never saw.

use crate::features::ccg::domain::graph::CallsiteContextGraph;
use crate::features::ccg::domain::node::{EdgeId, NodeId};
use crate::features::ccg::ports::CallsiteSource;
use crate::shared::models::AllocTypes;
use crate::shared::set_ops::{set_intersection, set_subtract};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

impl<S: CallsiteSource> CallsiteContextGraph<S> {
    /// Purge callee edges that no longer carry any context
    pub(crate) fn remove_none_type_callee_edges(&mut self, node: NodeId) {
        let mut i = 0;
        while i < self.nodes[node].callee_edges.len() {
            let edge = self.nodes[node].callee_edges[i];
            if self.edges[edge].alloc_types.is_none() {
                assert!(self.edges[edge].context_ids.is_empty());
                let callee = self.edges[edge].callee;
                self.erase_caller_edge(callee, edge);
                self.nodes[node].callee_edges.remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// True when the per-position effective labels in `in_alloc_types`
    /// match `node`'s callee edges. A `None` on either side matches:
    /// the edge carries nothing for those contexts, so it imposes no
    /// constraint.
    fn alloc_types_match(&self, in_alloc_types: &[AllocTypes], node: NodeId) -> bool {
        let edges = &self.nodes[node].callee_edges;
        if in_alloc_types.len() != edges.len() {
            return false;
        }
        in_alloc_types.iter().zip(edges.iter()).all(|(&lhs, &edge)| {
            let rhs = self.edges[edge].alloc_types;
            if lhs.is_none() || rhs.is_none() {
                return true;
            }
            lhs.effective() == rhs.effective()
        })
    }

    /// Re-point `edge` at `new_callee` (a clone of its current callee),
    /// moving the edge's context ids and the matching portion of the
    /// old callee's outgoing edges along with it.
    pub(crate) fn move_edge_to_existing_callee_clone(
        &mut self,
        edge: EdgeId,
        new_callee: NodeId,
        new_clone: bool,
    ) {
        let old_callee = self.edges[edge].callee;
        assert_eq!(
            self.get_orig_node(new_callee),
            self.get_orig_node(old_callee),
            "callee and clone must share an original"
        );
        let edge_context_ids = self.edges[edge].context_ids.clone();

        self.erase_caller_edge(old_callee, edge);
        self.edges[edge].callee = new_callee;
        self.nodes[new_callee].caller_edges.push(edge);

        // The edge's own ids are unchanged; only the endpoints move.
        set_subtract(&mut self.nodes[old_callee].context_ids, &edge_context_ids);
        self.nodes[new_callee]
            .context_ids
            .extend(edge_context_ids.iter().copied());
        let edge_alloc_types = self.edges[edge].alloc_types;
        self.nodes[new_callee].alloc_types.union_with(edge_alloc_types);
        let old_alloc_types = self.compute_alloc_type(&self.nodes[old_callee].context_ids);
        self.nodes[old_callee].alloc_types = old_alloc_types;
        assert_eq!(
            old_alloc_types.is_none(),
            self.nodes[old_callee].context_ids.is_empty()
        );

        // Split the old callee's outgoing edges: the portion of each
        // carrying the moved contexts now belongs to the clone.
        let old_callee_edges = self.nodes[old_callee].callee_edges.clone();
        for old_edge in old_callee_edges {
            let ids_to_move =
                set_intersection(&self.edges[old_edge].context_ids, &edge_context_ids);
            set_subtract(&mut self.edges[old_edge].context_ids, &ids_to_move);
            let remaining_types = self.compute_alloc_type(&self.edges[old_edge].context_ids);
            self.edges[old_edge].alloc_types = remaining_types;
            let moved_types = self.compute_alloc_type(&ids_to_move);
            if !new_clone {
                // Reusing an existing clone: augment its corresponding
                // edge if one survives. None-type edges may have been
                // purged after earlier moves, in which case fall
                // through and recreate.
                let target = self.edges[old_edge].callee;
                if let Some(existing) = self.find_edge_from_callee(new_callee, target) {
                    self.edges[existing]
                        .context_ids
                        .extend(ids_to_move.iter().copied());
                    self.edges[existing].alloc_types.union_with(moved_types);
                    continue;
                }
            }
            let target = self.edges[old_edge].callee;
            self.add_edge(target, new_callee, moved_types, ids_to_move);
        }
    }

    /// Clone `edge`'s callee and move the edge onto the clone
    pub(crate) fn move_edge_to_new_callee_clone(&mut self, edge: EdgeId) -> NodeId {
        let node = self.edges[edge].callee;
        let is_allocation = self.nodes[node].is_allocation;
        let call = self.nodes[node].call.clone();
        let clone = self.new_node(is_allocation, call);
        self.add_clone(node, clone);
        let func = self.node_to_calling_func[&node];
        self.node_to_calling_func.insert(clone, func);
        self.stats.node_clones += 1;
        trace!(node, clone, "created node clone");
        self.move_edge_to_existing_callee_clone(edge, clone, true);
        clone
    }

    /// Clone nodes until every allocation context reaching a callsite
    /// resolves to a single effective label there.
    pub(crate) fn identify_clones(&mut self, verify_nodes: bool) {
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        for alloc_node in self.alloc_nodes() {
            self.identify_clones_for_node(alloc_node, &mut visited, verify_nodes);
        }
        debug!(clones = self.stats.node_clones, "graph cloning complete");
    }

    fn identify_clones_for_node(
        &mut self,
        node: NodeId,
        visited: &mut FxHashSet<NodeId>,
        verify_nodes: bool,
    ) {
        if verify_nodes {
            self.check_node(node, true);
        }
        assert!(self.nodes[node].clone_of.is_none());

        // A null call means nothing can be rewritten at this site
        // (unmatched stack id, recursion, or a neutralized multi-target
        // call); don't bother cloning above it either.
        if !self.nodes[node].has_call() {
            return;
        }

        let inserted = visited.insert(node);
        assert!(inserted, "node visited twice");

        // Recurse into callers over a snapshot; cloning during the
        // recursion mutates the live list and may detach edges.
        let caller_edges = self.nodes[node].caller_edges.clone();
        for edge in caller_edges {
            if !self.caller_edge_attached(node, edge) {
                continue;
            }
            let caller = self.edges[edge].caller;
            if !visited.contains(&caller) && self.nodes[caller].clone_of.is_none() {
                self.identify_clones_for_node(caller, visited, verify_nodes);
            }
        }

        // Unambiguous already, or a single caller: nothing to split.
        if self.nodes[node].alloc_types.is_single() || self.nodes[node].caller_edges.len() <= 1 {
            return;
        }

        // Cold edges first so the greedy peel below leaves NotCold on
        // the original node; ties broken by smallest context id for
        // determinism. Sort is stable.
        let mut order = self.nodes[node].caller_edges.clone();
        order.sort_by(|&a, &b| {
            let types_a = self.edges[a].alloc_types;
            let types_b = self.edges[b].alloc_types;
            assert!(!types_a.is_none() && !types_b.is_none());
            if types_a == types_b {
                let min_a = self.edges[a].context_ids.iter().min();
                let min_b = self.edges[b].context_ids.iter().min();
                min_a.cmp(&min_b)
            } else {
                types_a.cloning_priority().cmp(&types_b.cloning_priority())
            }
        });
        self.nodes[node].caller_edges = order;

        assert!(!self.nodes[node].alloc_types.is_none());

        let mut i = 0;
        while i < self.nodes[node].caller_edges.len() {
            // A prior peel may have already left the node unambiguous.
            if self.nodes[node].alloc_types.is_single()
                || self.nodes[node].caller_edges.len() <= 1
            {
                break;
            }
            let caller_edge = self.nodes[node].caller_edges[i];

            // Signature: per callee edge, the label set of the contexts
            // this caller edge would pull onto a clone.
            let caller_ids = self.edges[caller_edge].context_ids.clone();
            let signature: Vec<AllocTypes> = self.nodes[node]
                .callee_edges
                .iter()
                .map(|&callee_edge| {
                    self.intersect_alloc_types(&self.edges[callee_edge].context_ids, &caller_ids)
                })
                .collect();

            let caller_types = self.edges[caller_edge].alloc_types;
            let node_types = self.nodes[node].alloc_types;
            assert!(!caller_types.is_none());
            assert!(!node_types.is_none());

            // Skip if cloning would not disambiguate anything, at this
            // node or across its callee edges.
            if caller_types.effective() == node_types.effective()
                && self.alloc_types_match(&signature, node)
            {
                i += 1;
                continue;
            }

            // Prefer an existing clone with a compatible signature.
            let mut target_clone = None;
            for &clone in &self.nodes[node].clones {
                if self.nodes[clone].alloc_types.effective() != caller_types.effective() {
                    continue;
                }
                if !self.alloc_types_match(&signature, clone) {
                    continue;
                }
                target_clone = Some(clone);
                break;
            }

            match target_clone {
                Some(clone) => {
                    self.move_edge_to_existing_callee_clone(caller_edge, clone, false)
                }
                None => {
                    self.move_edge_to_new_callee_clone(caller_edge);
                }
            }
            // The moved edge left position i; the next edge shifted in.
        }

        // Cloning can leave emptied callee edges on the original and on
        // clones; purge them.
        let clones = self.nodes[node].clones.clone();
        for clone in clones {
            self.remove_none_type_callee_edges(clone);
            assert!(!self.nodes[clone].alloc_types.is_none());
            if verify_nodes {
                self.check_node(clone, true);
            }
        }
        // The original always keeps some contexts.
        assert!(!self.nodes[node].context_ids.is_empty());
        self.remove_none_type_callee_edges(node);

        assert!(!self.nodes[node].alloc_types.is_none());
        debug_assert!(self.nodes[node]
            .callee_edges
            .iter()
            .all(|&e| !self.edges[e].alloc_types.is_none()));
        debug_assert!(self.nodes[node]
            .caller_edges
            .iter()
            .all(|&e| !self.edges[e].alloc_types.is_none()));

        if verify_nodes {
            self.check_node(node, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::DisambiguationConfig;
    use crate::features::sources::domain::module::{MibRecord, Module, ModuleCall};
    use crate::shared::models::AllocationType;
    use crate::CallsiteContextGraph;

    fn split_module() -> Module {
        let mut module = Module::new();
        let foo = module.add_function("foo");
        let main = module.add_function("main");
        module.add_call(
            foo,
            ModuleCall::allocation(
                vec![1],
                vec![
                    MibRecord::new(vec![1, 2], AllocationType::Cold),
                    MibRecord::new(vec![1, 3], AllocationType::NotCold),
                ],
            ),
        );
        module.add_call(main, ModuleCall::callsite(foo, vec![2]));
        module.add_call(main, ModuleCall::callsite(foo, vec![3]));
        module
    }

    #[test]
    fn test_identify_clones_is_idempotent() {
        let config = DisambiguationConfig::new().with_verify_nodes(true);
        let mut graph =
            CallsiteContextGraph::from_module(split_module(), &config).expect("build");

        graph.identify_clones(true);
        let nodes_after_first = graph.node_count();
        assert_eq!(graph.stats().node_clones, 1);

        // A second pass over the already-disambiguated graph must not
        // create anything.
        graph.identify_clones(true);
        assert_eq!(graph.node_count(), nodes_after_first);
        assert_eq!(graph.stats().node_clones, 1);
        graph.verify();
    }

    #[test]
    fn test_clone_shares_call_and_function() {
        let config = DisambiguationConfig::new();
        let mut graph =
            CallsiteContextGraph::from_module(split_module(), &config).expect("build");
        graph.identify_clones(false);

        let alloc_node = graph.alloc_nodes()[0];
        let clones = graph.node(alloc_node).clones.clone();
        assert_eq!(clones.len(), 1);
        let clone = clones[0];
        assert_eq!(graph.node(clone).clone_of, Some(alloc_node));
        assert_eq!(graph.node(clone).call, graph.node(alloc_node).call);
        assert_eq!(
            graph.node(clone).is_allocation,
            graph.node(alloc_node).is_allocation
        );
    }
}
