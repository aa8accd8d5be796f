//! Function assignment
//!
//! Graph cloning leaves several clones per real callsite, each needing
//! a particular callee version. This stage greedily maps callsite
//! clones onto function clones, materializing new function clones
//! through the source only when an existing one cannot host the
//! combination, then walks the graph once more to emit the recorded
//! decisions (allocation labels, call retargets) through the source.

use crate::features::ccg::domain::graph::CallsiteContextGraph;
use crate::features::ccg::domain::node::NodeId;
use crate::features::ccg::ports::CallsiteSource;
use crate::shared::models::{AllocationType, CallInfo, FuncInfo};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

type CallMap<S> = BTreeMap<
    CallInfo<<S as CallsiteSource>::Call>,
    CallInfo<<S as CallsiteSource>::Call>,
>;

impl<S: CallsiteSource> CallsiteContextGraph<S> {
    /// Map every callsite clone onto a function clone; returns true if
    /// any function clone was created.
    pub(crate) fn assign_functions(&mut self) -> bool {
        let mut changed = false;

        // Which function clone each callsite node has been assigned to
        // call.
        let mut callsite_to_callee_func_clone: FxHashMap<NodeId, FuncInfo<S::Func>> =
            FxHashMap::default();

        let func_calls = self.func_to_calls_with_metadata.clone();
        for (func, calls_with_metadata) in &func_calls {
            let orig_func = FuncInfo::original(*func);

            // Per clone of this function, the mapping from each original
            // call to its copy inside that clone.
            let mut func_clones_to_call_map: BTreeMap<FuncInfo<S::Func>, CallMap<S>> =
                BTreeMap::new();

            for call in calls_with_metadata {
                let Some(node) = self.get_node_for_inst(call) else {
                    continue;
                };
                if self.nodes[node].clones.is_empty() {
                    continue;
                }
                assert!(
                    self.nodes[node].has_call(),
                    "a cloned node must have a call"
                );

                // Which callsite clone occupies each function clone,
                // for the node currently being placed.
                let mut func_clone_to_cur_node_clone_map: BTreeMap<FuncInfo<S::Func>, NodeId> =
                    BTreeMap::new();

                let mut worklist: VecDeque<NodeId> = VecDeque::new();
                // The original drops out if cloning moved all of its
                // contexts away.
                if !self.nodes[node].context_ids.is_empty() {
                    worklist.push_back(node);
                }
                worklist.extend(self.nodes[node].clones.iter().copied());

                let mut node_clone_count = 0usize;
                while let Some(clone) = worklist.pop_front() {
                    node_clone_count += 1;

                    // More callsite clones than function clones: grow.
                    if func_clones_to_call_map.len() < node_clone_count {
                        if node_clone_count == 1 {
                            // First copy goes to the original function;
                            // no caller can have an assignment yet.
                            debug_assert!(self.callers_of(clone).iter().all(
                                |caller| !callsite_to_callee_func_clone.contains_key(caller)
                            ));
                            func_clones_to_call_map.insert(orig_func, BTreeMap::new());
                            self.place_callsite_clone(
                                orig_func,
                                call,
                                clone,
                                &mut func_clone_to_cur_node_clone_map,
                                &func_clones_to_call_map,
                            );
                            for caller in self.callers_of(clone) {
                                if !self.nodes[caller].has_call() {
                                    continue;
                                }
                                callsite_to_callee_func_clone.insert(caller, orig_func);
                            }
                            continue;
                        }

                        // If a caller of this clone already calls some
                        // function clone, that one is being displaced.
                        let mut previous_assigned_func_clone = None;
                        for caller in self.callers_of(clone) {
                            if let Some(&assigned) = callsite_to_callee_func_clone.get(&caller)
                            {
                                previous_assigned_func_clone = Some(assigned);
                                break;
                            }
                        }

                        let mut new_call_map = BTreeMap::new();
                        let clone_no = func_clones_to_call_map.len() as u32;
                        assert!(clone_no > 0, "clone 0 is the original function");
                        let new_func_clone = self.source.clone_function_for_callsite(
                            orig_func,
                            call,
                            &mut new_call_map,
                            calls_with_metadata,
                            clone_no,
                        );
                        func_clones_to_call_map.insert(new_func_clone, new_call_map);
                        self.stats.function_clones += 1;
                        changed = true;
                        debug!(clone_no, "created function clone");

                        let Some(previous) = previous_assigned_func_clone else {
                            // No caller was assigned yet; the new
                            // function clone takes this callsite clone
                            // and all its callers.
                            self.place_callsite_clone(
                                new_func_clone,
                                call,
                                clone,
                                &mut func_clone_to_cur_node_clone_map,
                                &func_clones_to_call_map,
                            );
                            for caller in self.callers_of(clone) {
                                if !self.nodes[caller].has_call() {
                                    continue;
                                }
                                callsite_to_callee_func_clone.insert(caller, new_func_clone);
                            }
                            continue;
                        };

                        // Redirect: every caller previously bound to
                        // `previous` now calls the new function clone,
                        // and each of their other callsites bound to it
                        // is cloned over so the new function clone
                        // holds the right mix.
                        let caller_list = self.callers_of(clone);
                        for caller in caller_list {
                            if !self.nodes[caller].has_call() {
                                continue;
                            }
                            if callsite_to_callee_func_clone.get(&caller) != Some(&previous) {
                                continue;
                            }
                            callsite_to_callee_func_clone.insert(caller, new_func_clone);

                            let callee_edges = self.nodes[caller].callee_edges.clone();
                            for callee_edge in callee_edges {
                                // May have been purged while cleaning
                                // up none-type edges below.
                                if !self.callee_edge_attached(caller, callee_edge) {
                                    continue;
                                }
                                let callee = self.edges[callee_edge].callee;
                                if callee == clone || !self.nodes[callee].has_call() {
                                    continue;
                                }
                                let moved_clone =
                                    self.move_edge_to_new_callee_clone(callee_edge);
                                self.remove_none_type_callee_edges(moved_clone);
                                self.remove_none_type_callee_edges(callee);
                                assert!(!self.nodes[moved_clone].alloc_types.is_none());
                                if let Some(&assigned) =
                                    callsite_to_callee_func_clone.get(&callee)
                                {
                                    callsite_to_callee_func_clone
                                        .insert(moved_clone, assigned);
                                }
                                // Bind the fresh callsite clone to the
                                // matching call copy inside the new
                                // function clone. Callers only call
                                // callsites of one function, so the
                                // callee's call is in this function.
                                let orig_node = self.get_orig_node(callee);
                                let orig_call = self.nodes[orig_node].call.at_original();
                                let call_map = func_clones_to_call_map
                                    .get(&new_func_clone)
                                    .expect("new function clone has a call map");
                                let new_call = call_map
                                    .get(&orig_call)
                                    .cloned()
                                    .expect("call mapped in function clone");
                                self.nodes[moved_clone].call = new_call;
                            }
                        }
                        // Fall through: record the function for this
                        // callsite clone below.
                    }

                    // Walk caller edges: reuse the function clone a
                    // caller is bound to when possible, otherwise split
                    // off further callsite clones.
                    let mut func_clone_to_new_callsite_clone_map: BTreeMap<
                        FuncInfo<S::Func>,
                        NodeId,
                    > = BTreeMap::new();
                    let mut assigned_func_clone: Option<FuncInfo<S::Func>> = None;

                    let mut ei = 0;
                    while ei < self.nodes[clone].caller_edges.len() {
                        let edge = self.nodes[clone].caller_edges[ei];
                        let caller = self.edges[edge].caller;
                        if !self.nodes[caller].has_call() {
                            ei += 1;
                            continue;
                        }

                        if let Some(&caller_func_clone) =
                            callsite_to_callee_func_clone.get(&caller)
                        {
                            // The caller's function clone may already be
                            // occupied by a different clone of this
                            // callsite, or this clone may already be
                            // pinned elsewhere; either way, split.
                            let occupied_by_other = func_clone_to_cur_node_clone_map
                                .get(&caller_func_clone)
                                .is_some_and(|&occupant| occupant != clone);
                            let pinned_elsewhere = assigned_func_clone
                                .is_some_and(|assigned| assigned != caller_func_clone);
                            if occupied_by_other || pinned_elsewhere {
                                if let Some(&existing) = func_clone_to_new_callsite_clone_map
                                    .get(&caller_func_clone)
                                {
                                    // A split for this function clone
                                    // already exists; reuse it.
                                    self.move_edge_to_existing_callee_clone(
                                        edge, existing, false,
                                    );
                                    self.remove_none_type_callee_edges(existing);
                                } else {
                                    let new_callsite_clone =
                                        self.move_edge_to_new_callee_clone(edge);
                                    self.remove_none_type_callee_edges(new_callsite_clone);
                                    func_clone_to_new_callsite_clone_map
                                        .insert(caller_func_clone, new_callsite_clone);
                                    // Process the new clone on a later
                                    // worklist iteration.
                                    worklist.push_back(new_callsite_clone);
                                    assert!(!self.nodes[new_callsite_clone]
                                        .alloc_types
                                        .is_none());
                                }
                                // Moving the caller edge may have left
                                // none-type callee edges behind.
                                self.remove_none_type_callee_edges(clone);
                                // The edge left position ei.
                                continue;
                            }

                            // Use the caller's function clone.
                            if assigned_func_clone.is_none() {
                                assigned_func_clone = Some(caller_func_clone);
                                self.place_callsite_clone(
                                    caller_func_clone,
                                    call,
                                    clone,
                                    &mut func_clone_to_cur_node_clone_map,
                                    &func_clones_to_call_map,
                                );
                            } else {
                                assert_eq!(assigned_func_clone, Some(caller_func_clone));
                            }
                        } else {
                            // Caller not assigned yet: pick the first
                            // function clone not occupied by a clone of
                            // this callsite and bind both to it.
                            if assigned_func_clone.is_none() {
                                let chosen = func_clones_to_call_map
                                    .keys()
                                    .copied()
                                    .find(|func_clone| {
                                        !func_clone_to_cur_node_clone_map
                                            .contains_key(func_clone)
                                    })
                                    .expect("an unoccupied function clone exists");
                                assigned_func_clone = Some(chosen);
                                self.place_callsite_clone(
                                    chosen,
                                    call,
                                    clone,
                                    &mut func_clone_to_cur_node_clone_map,
                                    &func_clones_to_call_map,
                                );
                            } else {
                                debug_assert_eq!(
                                    func_clone_to_cur_node_clone_map
                                        .get(&assigned_func_clone.expect("assigned"))
                                        .copied(),
                                    Some(clone)
                                );
                            }
                            callsite_to_callee_func_clone.insert(
                                caller,
                                assigned_func_clone.expect("assigned above"),
                            );
                        }

                        ei += 1;
                    }
                }
            }
        }

        // Emit the recorded decisions through the source.
        let mut visited = rustc_hash::FxHashSet::default();
        for alloc_node in self.alloc_nodes() {
            self.update_calls_dfs(alloc_node, &mut visited, &callsite_to_callee_func_clone);
        }

        changed
    }

    /// Callers of a node, by value
    fn callers_of(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes[node]
            .caller_edges
            .iter()
            .map(|&edge| self.edges[edge].caller)
            .collect()
    }

    pub(crate) fn callee_edge_attached(&self, node: NodeId, edge: usize) -> bool {
        self.nodes[node].callee_edges.contains(&edge)
    }

    /// Put `callsite_clone` into `func_clone`, rebinding its call to
    /// the copy living inside that function clone.
    fn place_callsite_clone(
        &mut self,
        func_clone: FuncInfo<S::Func>,
        call: &CallInfo<S::Call>,
        callsite_clone: NodeId,
        func_clone_to_cur_node_clone_map: &mut BTreeMap<FuncInfo<S::Func>, NodeId>,
        func_clones_to_call_map: &BTreeMap<FuncInfo<S::Func>, CallMap<S>>,
    ) {
        func_clone_to_cur_node_clone_map.insert(func_clone, callsite_clone);
        let call_map = func_clones_to_call_map
            .get(&func_clone)
            .expect("function clone has a call map");
        let call_clone = call_map.get(call).cloned().unwrap_or_else(|| call.clone());
        self.nodes[callsite_clone].call = call_clone;
    }

    /// Post-cloning DFS from the allocations: emit each allocation
    /// clone's effective label and each callsite clone's target
    /// function clone.
    fn update_calls_dfs(
        &mut self,
        node: NodeId,
        visited: &mut rustc_hash::FxHashSet<NodeId>,
        assignments: &FxHashMap<NodeId, FuncInfo<S::Func>>,
    ) {
        if !visited.insert(node) {
            return;
        }
        let clones = self.nodes[node].clones.clone();
        for clone in clones {
            self.update_calls_dfs(clone, visited, assignments);
        }
        let caller_edges = self.nodes[node].caller_edges.clone();
        for edge in caller_edges {
            let caller = self.edges[edge].caller;
            self.update_calls_dfs(caller, visited, assignments);
        }

        // Nothing to update, or all contexts moved onto other clones.
        if !self.nodes[node].has_call() || self.nodes[node].context_ids.is_empty() {
            return;
        }

        if self.nodes[node].is_allocation {
            let effective = self.nodes[node].alloc_types.effective();
            match effective {
                AllocationType::Cold => self.stats.allocs_cold += 1,
                AllocationType::NotCold => self.stats.allocs_not_cold += 1,
            }
            let call = self.nodes[node].call.clone();
            self.source.update_allocation_call(&call, effective);
            return;
        }

        let Some(&callee_func) = assignments.get(&node) else {
            return;
        };
        let call = self.nodes[node].call.clone();
        self.source.update_call(&call, callee_func);
    }
}
