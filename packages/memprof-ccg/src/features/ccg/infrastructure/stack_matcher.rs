//! Callsite-to-node matching
//!
//! Attaches the program's non-allocation callsites to the stack nodes
//! built from MIB chains, synthesizing new nodes where inlining made
//! one real call correspond to a sequence of stack ids. Calls that
//! share an identical chain get duplicated context ids so each ends up
//! with a disjoint identity.

use crate::features::ccg::domain::graph::CallsiteContextGraph;
use crate::features::ccg::domain::node::NodeId;
use crate::features::ccg::ports::CallsiteSource;
use crate::shared::models::{CallInfo, ContextId, StackId};
use crate::shared::set_ops::{set_intersect, set_subtract, set_subtract_split};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use tracing::debug;

/// One matched call: its handle, the prefix of its stack-id chain that
/// has context nodes (innermost first), its enclosing function, and the
/// context ids the analysis assigns to it.
struct CallContextInfo<S: CallsiteSource> {
    call: CallInfo<S::Call>,
    stack_ids: Vec<StackId>,
    func: S::Func,
    saved_context_ids: FxHashSet<ContextId>,
}

impl<S: CallsiteSource> CallsiteContextGraph<S> {
    /// The prefix of the call's context whose stack ids have nodes.
    /// Profile pruning can leave outer frames without nodes; matching
    /// stops at the first gap.
    pub(crate) fn stack_ids_with_context_nodes_for_call(&self, call: &S::Call) -> Vec<StackId> {
        let mut stack_ids = Vec::new();
        for raw in self.source.callsite_context(call) {
            let stack_id = self.source.stack_id(raw);
            if self.get_node_for_stack_id(stack_id).is_none() {
                break;
            }
            stack_ids.push(stack_id);
        }
        stack_ids
    }

    /// Match every non-allocation call onto the graph.
    pub(crate) fn update_stack_nodes(&mut self) {
        // Bucket calls by the outermost stack id in their chain that
        // has a node. Bucket iteration order is observable through
        // duplicate-id minting, so the map is ordered.
        let mut stack_id_to_matching_calls: BTreeMap<StackId, Vec<CallContextInfo<S>>> =
            BTreeMap::new();
        let func_calls = self.func_to_calls_with_metadata.clone();
        for (func, calls) in func_calls {
            for call in calls {
                if self.alloc_call_to_node.contains_key(&call) {
                    continue;
                }
                let Some(handle) = call.call() else { continue };
                let stack_ids = self.stack_ids_with_context_nodes_for_call(handle);
                // No nodes at all: this context lived entirely in the
                // pruned part of the MIB stacks.
                if stack_ids.is_empty() {
                    continue;
                }
                let last = *stack_ids.last().expect("chain is non-empty");
                stack_id_to_matching_calls
                    .entry(last)
                    .or_default()
                    .push(CallContextInfo {
                        call: call.clone(),
                        stack_ids,
                        func,
                        saved_context_ids: FxHashSet::default(),
                    });
            }
        }

        // Compute the context ids belonging to each call, duplicating
        // ids when two calls share an identical chain.
        let mut old_to_new_context_ids: FxHashMap<ContextId, FxHashSet<ContextId>> =
            FxHashMap::default();
        let bucket_keys: Vec<StackId> = stack_id_to_matching_calls.keys().copied().collect();
        for last_id in bucket_keys {
            let mut calls = stack_id_to_matching_calls
                .remove(&last_id)
                .expect("bucket exists");
            self.compute_bucket_context_ids(last_id, &mut calls, &mut old_to_new_context_ids);
            stack_id_to_matching_calls.insert(last_id, calls);
        }

        self.propagate_duplicate_context_ids(&old_to_new_context_ids);

        // Post-order from the allocations so interior nodes are handled
        // after every node above them.
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        for alloc_node in self.alloc_nodes() {
            self.assign_stack_nodes_post_order(
                alloc_node,
                &mut visited,
                &mut stack_id_to_matching_calls,
            );
        }
    }

    /// First matcher pass for one bucket: sort entries, intersect edge
    /// context ids along each chain, and record the resulting id set
    /// per call (fresh duplicates for identical chains).
    fn compute_bucket_context_ids(
        &mut self,
        last_id: StackId,
        calls: &mut [CallContextInfo<S>],
        old_to_new_context_ids: &mut FxHashMap<ContextId, FxHashSet<ContextId>>,
    ) {
        // Single call with a single stack id needs no new node and is
        // bound directly during the post-order walk.
        if calls.len() == 1 && calls[0].stack_ids.len() == 1 {
            return;
        }

        // Longest chains first for maximal matching; identical chains
        // adjacent via the lexicographic tie-break (sort is stable).
        calls.sort_by(|a, b| {
            b.stack_ids
                .len()
                .cmp(&a.stack_ids.len())
                .then_with(|| a.stack_ids.cmp(&b.stack_ids))
        });

        let last_node = self
            .get_node_for_stack_id(last_id)
            .expect("bucket key has a node");
        if self.nodes[last_node].recursive {
            return;
        }

        // Ids still available at the outermost node; entries consume
        // from this pool as they match.
        let mut last_node_context_ids = self.nodes[last_node].context_ids.clone();
        assert!(!last_node_context_ids.is_empty());

        for i in 0..calls.len() {
            let ids = calls[i].stack_ids.clone();
            assert_eq!(last_id, *ids.last().expect("chain is non-empty"));
            debug_assert!(calls[i].saved_context_ids.is_empty());

            // Intersect edge context ids walking the chain inward from
            // the outermost node.
            let mut stack_sequence_ids = last_node_context_ids.clone();
            let mut prev_node = last_node;
            let mut cur_node = last_node;
            let mut skip = false;
            for &id in ids.iter().rev().skip(1) {
                cur_node = self
                    .get_node_for_stack_id(id)
                    .expect("kept stack ids have nodes");
                if self.nodes[cur_node].recursive {
                    skip = true;
                    break;
                }
                // No edge between adjacent chain nodes means the two
                // frames were never profiled in sequence in any MIB;
                // this inlined sequence matches nothing.
                let Some(edge) = self.find_edge_from_caller(cur_node, prev_node) else {
                    skip = true;
                    break;
                };
                prev_node = cur_node;
                set_intersect(&mut stack_sequence_ids, &self.edges[edge].context_ids);
                if stack_sequence_ids.is_empty() {
                    skip = true;
                    break;
                }
            }
            if skip {
                continue;
            }

            // Chain stopped short of the call's outermost frame: drop
            // ids continuing past the innermost matched node, they
            // belong to unrelated longer contexts. Valid contexts lost
            // to aggressive pruning are not recovered.
            let call_handle = calls[i].call.call().expect("tracked calls have handles");
            if *ids.last().expect("chain is non-empty") != self.source.last_stack_id(call_handle) {
                for &edge in &self.nodes[cur_node].caller_edges {
                    set_subtract(&mut stack_sequence_ids, &self.edges[edge].context_ids);
                    if stack_sequence_ids.is_empty() {
                        break;
                    }
                }
                if stack_sequence_ids.is_empty() {
                    continue;
                }
            }

            // Identical chains are adjacent after the sort; duplicate
            // the computed ids for this call and leave the originals in
            // the pool for its neighbor.
            let duplicate_context_ids =
                i + 1 < calls.len() && calls[i + 1].stack_ids == ids;

            calls[i].saved_context_ids = if duplicate_context_ids {
                self.duplicate_context_ids(&stack_sequence_ids, old_to_new_context_ids)
            } else {
                stack_sequence_ids.clone()
            };
            assert!(!calls[i].saved_context_ids.is_empty());

            if !duplicate_context_ids {
                set_subtract(&mut last_node_context_ids, &stack_sequence_ids);
                if last_node_context_ids.is_empty() {
                    break;
                }
            }
        }
    }

    /// Mint a fresh id per input id, with the same label, recording the
    /// old -> new mapping for propagation.
    fn duplicate_context_ids(
        &mut self,
        context_ids: &FxHashSet<ContextId>,
        old_to_new_context_ids: &mut FxHashMap<ContextId, FxHashSet<ContextId>>,
    ) -> FxHashSet<ContextId> {
        let mut new_ids = FxHashSet::default();
        for &old_id in context_ids {
            let label = self.allocation_type(old_id);
            let new_id = self.mint_context_id(label);
            new_ids.insert(new_id);
            old_to_new_context_ids.entry(old_id).or_default().insert(new_id);
        }
        debug!(count = new_ids.len(), "duplicated context ids");
        new_ids
    }

    /// Extend node and edge context-id sets with the duplicates of the
    /// ids they already carry, walking caller edges up from each alloc
    /// node. Each edge is visited at most once.
    fn propagate_duplicate_context_ids(
        &mut self,
        old_to_new_context_ids: &FxHashMap<ContextId, FxHashSet<ContextId>>,
    ) {
        if old_to_new_context_ids.is_empty() {
            return;
        }
        let mut visited_edges = FxHashSet::default();
        for alloc_node in self.alloc_nodes() {
            // Seed the alloc node itself first; the edge walk then only
            // has to look at edge sets.
            let new_ids = duplicated_ids_for(old_to_new_context_ids, &self.nodes[alloc_node].context_ids);
            self.nodes[alloc_node].context_ids.extend(new_ids);
            self.propagate_duplicates_to_callers(alloc_node, &mut visited_edges, old_to_new_context_ids);
        }
    }

    fn propagate_duplicates_to_callers(
        &mut self,
        node: NodeId,
        visited_edges: &mut FxHashSet<usize>,
        old_to_new_context_ids: &FxHashMap<ContextId, FxHashSet<ContextId>>,
    ) {
        let caller_edges = self.nodes[node].caller_edges.clone();
        for edge in caller_edges {
            if !visited_edges.insert(edge) {
                continue;
            }
            let new_ids = duplicated_ids_for(old_to_new_context_ids, &self.edges[edge].context_ids);
            if new_ids.is_empty() {
                continue;
            }
            let next_node = self.edges[edge].caller;
            self.edges[edge].context_ids.extend(new_ids.iter().copied());
            self.nodes[next_node].context_ids.extend(new_ids.iter().copied());
            self.propagate_duplicates_to_callers(next_node, visited_edges, old_to_new_context_ids);
        }
    }

    /// Post-order assignment of calls to nodes. For a node whose stack
    /// id keys a bucket, either bind the single trivial call directly
    /// or synthesize one new node per call that received context ids,
    /// splicing it in between the chain's callees and callers.
    fn assign_stack_nodes_post_order(
        &mut self,
        node: NodeId,
        visited: &mut FxHashSet<NodeId>,
        stack_id_to_matching_calls: &mut BTreeMap<StackId, Vec<CallContextInfo<S>>>,
    ) {
        if !visited.insert(node) {
            return;
        }
        // Iterate a snapshot: the recursive calls may add callers, and
        // freshly created nodes were already handled on creation.
        let caller_edges = self.nodes[node].caller_edges.clone();
        for edge in caller_edges {
            let caller = self.edges[edge].caller;
            self.assign_stack_nodes_post_order(caller, visited, stack_id_to_matching_calls);
        }

        if self.nodes[node].is_allocation {
            return;
        }
        let last_id = self.nodes[node].orig_stack_or_alloc_id;
        if !stack_id_to_matching_calls.contains_key(&last_id) {
            return;
        }

        // Trivial case: one call, one stack id - assign this node.
        {
            let calls = &stack_id_to_matching_calls[&last_id];
            if calls.len() == 1 && calls[0].stack_ids.len() == 1 {
                debug_assert!(calls[0].saved_context_ids.is_empty());
                if self.nodes[node].recursive {
                    return;
                }
                let call = calls[0].call.clone();
                let func = calls[0].func;
                self.nodes[node].call = call.clone();
                self.non_alloc_call_to_node.insert(call, node);
                self.node_to_calling_func.insert(node, func);
                return;
            }
        }

        let last_node = self
            .get_node_for_stack_id(last_id)
            .expect("bucket key has a node");
        debug_assert_eq!(last_node, node);

        let num_calls = stack_id_to_matching_calls[&last_id].len();
        for i in 0..num_calls {
            let (call, func, mut saved, ids) = {
                let calls = stack_id_to_matching_calls
                    .get_mut(&last_id)
                    .expect("bucket exists");
                let entry = &mut calls[i];
                (
                    entry.call.clone(),
                    entry.func,
                    std::mem::take(&mut entry.saved_context_ids),
                    entry.stack_ids.clone(),
                )
            };
            // Entries that got no ids don't get a node.
            if saved.is_empty() {
                continue;
            }
            assert_eq!(last_id, *ids.last().expect("chain is non-empty"));

            let first_node = self
                .get_node_for_stack_id(ids[0])
                .expect("kept stack ids have nodes");

            // Recompute the ids for this sequence: saved ids may
            // overlap with chains ending at other nodes that were
            // already consumed during this traversal.
            set_intersect(&mut saved, &self.nodes[first_node].context_ids);
            let mut prev_node: Option<NodeId> = None;
            for &id in &ids {
                let cur_node = self
                    .get_node_for_stack_id(id)
                    .expect("kept stack ids have nodes");
                assert!(!self.nodes[cur_node].recursive);
                if let Some(prev) = prev_node {
                    let Some(edge) = self.find_edge_from_callee(cur_node, prev) else {
                        saved.clear();
                        break;
                    };
                    set_intersect(&mut saved, &self.edges[edge].context_ids);
                    if saved.is_empty() {
                        break;
                    }
                }
                prev_node = Some(cur_node);
            }
            if saved.is_empty() {
                continue;
            }

            // Synthesize the node for this inlined call sequence.
            let new_node = self.new_node(false, call.clone());
            self.node_to_calling_func.insert(new_node, func);
            self.non_alloc_call_to_node.insert(call, new_node);
            let alloc_types = self.compute_alloc_type(&saved);
            self.nodes[new_node].context_ids = saved;
            self.nodes[new_node].alloc_types = alloc_types;

            // Splice in: callees of the innermost chain node, callers
            // of the outermost.
            self.connect_new_node(new_node, first_node, true);
            self.connect_new_node(new_node, last_node, false);

            // The moved ids no longer traverse the original chain.
            let moved = self.nodes[new_node].context_ids.clone();
            let mut prev_node: Option<NodeId> = None;
            for &id in &ids {
                let cur_node = self
                    .get_node_for_stack_id(id)
                    .expect("kept stack ids have nodes");
                set_subtract(&mut self.nodes[cur_node].context_ids, &moved);
                if let Some(prev) = prev_node {
                    let edge = self
                        .find_edge_from_callee(cur_node, prev)
                        .expect("chain edge exists");
                    set_subtract(&mut self.edges[edge].context_ids, &moved);
                    if self.edges[edge].context_ids.is_empty() {
                        self.remove_edge(edge);
                    }
                }
                prev_node = Some(cur_node);
            }
        }
    }

    /// Connect `new_node` to `orig_node`'s callees (or callers), moving
    /// the context ids it owns from the original edges onto fresh edges
    /// and dropping originals that empty out.
    pub(crate) fn connect_new_node(
        &mut self,
        new_node: NodeId,
        orig_node: NodeId,
        towards_callee: bool,
    ) {
        let mut remaining = self.nodes[new_node].context_ids.clone();
        let orig_edges = if towards_callee {
            self.nodes[orig_node].callee_edges.clone()
        } else {
            self.nodes[orig_node].caller_edges.clone()
        };
        for edge in orig_edges {
            let (new_edge_ids, not_found) =
                set_subtract_split(&mut self.edges[edge].context_ids, &remaining);
            remaining = not_found;
            if new_edge_ids.is_empty() {
                continue;
            }
            let alloc_types = self.compute_alloc_type(&new_edge_ids);
            if towards_callee {
                let callee = self.edges[edge].callee;
                self.add_edge(callee, new_node, alloc_types, new_edge_ids);
            } else {
                let caller = self.edges[edge].caller;
                self.add_edge(new_node, caller, alloc_types, new_edge_ids);
            }
            if self.edges[edge].context_ids.is_empty() {
                self.remove_edge(edge);
            }
        }
    }
}

/// The duplicates minted for any of the given ids
fn duplicated_ids_for(
    old_to_new_context_ids: &FxHashMap<ContextId, FxHashSet<ContextId>>,
    context_ids: &FxHashSet<ContextId>,
) -> FxHashSet<ContextId> {
    let mut new_ids = FxHashSet::default();
    for id in context_ids {
        if let Some(duplicates) = old_to_new_context_ids.get(id) {
            new_ids.extend(duplicates.iter().copied());
        }
    }
    new_ids
}

#[cfg(test)]
mod tests {
    use crate::config::DisambiguationConfig;
    use crate::features::sources::domain::module::{MibRecord, Module, ModuleCall};
    use crate::shared::models::AllocationType;
    use crate::CallsiteContextGraph;

    #[test]
    fn test_rerun_without_callsites_is_noop() {
        // With no non-allocation calls, the matcher must leave the
        // graph untouched, run after run.
        let mut module = Module::new();
        let foo = module.add_function("foo");
        module.add_call(
            foo,
            ModuleCall::allocation(
                Vec::new(),
                vec![
                    MibRecord::new(vec![1, 2, 3], AllocationType::Cold),
                    MibRecord::new(vec![1, 2, 4], AllocationType::NotCold),
                ],
            ),
        );

        let config = DisambiguationConfig::new();
        let mut graph = CallsiteContextGraph::from_module(module, &config).expect("build");
        let before = format!("{graph}");

        graph.update_stack_nodes();
        assert_eq!(format!("{graph}"), before);
        graph.verify();
    }
}
