//! Graph construction from allocation profiles
//!
//! One alloc node per profiled allocation call; one stack node per
//! distinct stack id appearing in any MIB chain. Each MIB mints a
//! fresh context id which is threaded through the alloc node and every
//! stack node on its chain, building caller edges outward.

use crate::features::ccg::domain::graph::CallsiteContextGraph;
use crate::features::ccg::domain::node::NodeId;
use crate::features::ccg::ports::CallsiteSource;
use crate::shared::models::{AllocationType, CallInfo, StackId};
use rustc_hash::FxHashSet;
use tracing::debug;

impl<S: CallsiteSource> CallsiteContextGraph<S> {
    /// Create the node for an allocation call in `func`. MIB chains are
    /// added separately with [`add_stack_nodes_for_mib`].
    ///
    /// [`add_stack_nodes_for_mib`]: Self::add_stack_nodes_for_mib
    pub(crate) fn add_alloc_node(&mut self, call: CallInfo<S::Call>, func: S::Func) -> NodeId {
        assert!(
            self.get_node_for_alloc(&call).is_none(),
            "allocation already has a node"
        );
        let node = self.new_node(true, call.clone());
        self.alloc_call_to_node.insert(call, node);
        self.node_to_calling_func.insert(node, func);
        // Labeling id only: the first context id this allocation will mint.
        self.nodes[node].orig_stack_or_alloc_id = u64::from(self.last_context_id) + 1;
        node
    }

    /// Ingest one MIB: mint its context id, register the label, and
    /// walk the stack chain outward creating or augmenting stack nodes
    /// and caller edges.
    ///
    /// `stack_context` is the MIB chain ordered from the allocation
    /// outward; `callsite_context` is the allocation call's own context
    /// (non-empty when the allocation was inlined). Any prefix the two
    /// share was already consumed by that inlining and is skipped.
    pub(crate) fn add_stack_nodes_for_mib(
        &mut self,
        alloc_node: NodeId,
        stack_context: &[u64],
        callsite_context: &[u64],
        alloc_type: AllocationType,
    ) {
        let context_id = self.mint_context_id(alloc_type);

        self.nodes[alloc_node].alloc_types.insert(alloc_type);
        self.nodes[alloc_node].context_ids.insert(context_id);

        let shared = stack_context
            .iter()
            .zip(callsite_context.iter())
            .take_while(|(a, b)| a == b)
            .count();

        // Direct recursion is collapsed by the summary producer; a
        // repeated stack id within one chain means mutual recursion.
        // Those nodes are excluded from matching and cloning.
        let mut seen: FxHashSet<StackId> = FxHashSet::default();
        let mut prev_node = alloc_node;
        for &raw in &stack_context[shared..] {
            let stack_id = self.source.stack_id(raw);
            let stack_node = match self.get_node_for_stack_id(stack_id) {
                Some(node) => node,
                None => {
                    let node = self.new_node(false, CallInfo::none());
                    self.stack_entry_id_to_node.insert(stack_id, node);
                    self.nodes[node].orig_stack_or_alloc_id = stack_id;
                    node
                }
            };
            if !seen.insert(stack_id) {
                debug!(stack_id, "mutual recursion in MIB chain");
                self.nodes[stack_node].recursive = true;
            }
            self.nodes[stack_node].context_ids.insert(context_id);
            self.nodes[stack_node].alloc_types.insert(alloc_type);
            self.add_or_update_caller_edge(prev_node, stack_node, alloc_type, context_id);
            prev_node = stack_node;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::features::sources::domain::module::Module;
    use crate::features::sources::infrastructure::module_source::ModuleSource;
    use crate::shared::models::{AllocTypes, AllocationType, CallInfo};
    use crate::CallsiteContextGraph;

    use crate::features::sources::domain::module::CallRef;

    fn empty_graph() -> CallsiteContextGraph<ModuleSource> {
        let mut module = Module::new();
        module.add_function("foo");
        CallsiteContextGraph::new(ModuleSource::new(module))
    }

    #[test]
    fn test_mib_builds_shared_stack_nodes() {
        let mut graph = empty_graph();
        let alloc = graph.add_alloc_node(CallInfo::new(CallRef::new(0, 0)), 0);
        graph.add_stack_nodes_for_mib(alloc, &[1, 2, 3], &[], AllocationType::Cold);
        graph.add_stack_nodes_for_mib(alloc, &[1, 2, 4], &[], AllocationType::NotCold);

        let alloc_node = graph.node(alloc);
        assert_eq!(alloc_node.context_ids.len(), 2);
        assert!(alloc_node.context_ids.contains(&1));
        assert!(alloc_node.context_ids.contains(&2));
        assert_eq!(alloc_node.alloc_types, AllocTypes::BOTH);

        // s1 and s2 shared between both contexts, s3/s4 exclusive.
        let s2 = graph.get_node_for_stack_id(2).unwrap();
        assert_eq!(graph.node(s2).context_ids.len(), 2);
        let s3 = graph.get_node_for_stack_id(3).unwrap();
        assert_eq!(graph.node(s3).alloc_types, AllocTypes::COLD);
        let s4 = graph.get_node_for_stack_id(4).unwrap();
        assert_eq!(graph.node(s4).alloc_types, AllocTypes::NOT_COLD);

        graph.verify();
    }

    #[test]
    fn test_inlined_prefix_skipped() {
        let mut graph = empty_graph();
        let alloc = graph.add_alloc_node(CallInfo::new(CallRef::new(0, 0)), 0);
        // Frames 1 and 2 were consumed by inlining the allocation.
        graph.add_stack_nodes_for_mib(alloc, &[1, 2, 3], &[1, 2], AllocationType::Cold);

        assert!(graph.get_node_for_stack_id(1).is_none());
        assert!(graph.get_node_for_stack_id(2).is_none());
        assert!(graph.get_node_for_stack_id(3).is_some());
    }

    #[test]
    fn test_repeated_stack_id_marks_recursive() {
        let mut graph = empty_graph();
        let alloc = graph.add_alloc_node(CallInfo::new(CallRef::new(0, 0)), 0);
        graph.add_stack_nodes_for_mib(alloc, &[1, 2, 1], &[], AllocationType::NotCold);

        let s1 = graph.get_node_for_stack_id(1).unwrap();
        assert!(graph.node(s1).recursive);
        let s2 = graph.get_node_for_stack_id(2).unwrap();
        assert!(!graph.node(s2).recursive);
    }

    #[test]
    fn test_context_ids_mint_from_one() {
        let mut graph = empty_graph();
        let alloc = graph.add_alloc_node(CallInfo::new(CallRef::new(0, 0)), 0);
        assert_eq!(graph.node(alloc).orig_stack_or_alloc_id, 1);
        graph.add_stack_nodes_for_mib(alloc, &[7], &[], AllocationType::Cold);
        assert_eq!(graph.allocation_type(1), AllocationType::Cold);
    }
}
