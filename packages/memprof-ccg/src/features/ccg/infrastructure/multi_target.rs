//! Multi-target callsite sanitizer
//!
//! A callsite node whose callee edges point at a function other than
//! the call's actual target represents an indirect or otherwise
//! ambiguous call. Specializing it would require devirtualization, so
//! the node is neutralized instead: it loses its call binding and its
//! entry in the call map, stays in the graph for structure, and is
//! skipped by cloning and assignment.

use crate::features::ccg::domain::graph::CallsiteContextGraph;
use crate::features::ccg::ports::CallsiteSource;
use crate::shared::models::CallInfo;
use tracing::debug;

impl<S: CallsiteSource> CallsiteContextGraph<S> {
    pub(crate) fn handle_callsites_with_multiple_targets(&mut self) {
        let entries: Vec<(CallInfo<S::Call>, usize)> = self
            .non_alloc_call_to_node
            .iter()
            .map(|(call, &node)| (call.clone(), node))
            .collect();
        for (call_info, node) in entries {
            assert!(self.nodes[node].clones.is_empty());
            let Some(call) = call_info.call() else { continue };
            let callee_edges = self.nodes[node].callee_edges.clone();
            for edge in callee_edges {
                let callee_node = self.edges[edge].callee;
                if !self.nodes[callee_node].has_call() {
                    continue;
                }
                let callee_func = self.node_to_calling_func[&callee_node];
                if self.source.callee_matches_func(call, callee_func) {
                    continue;
                }
                debug!(node, "callsite targets multiple functions, dropping binding");
                self.non_alloc_call_to_node.shift_remove(&call_info);
                self.nodes[node].call = CallInfo::none();
                break;
            }
        }
    }
}
