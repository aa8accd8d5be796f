//! Summary-index source adapter
//!
//! Binds the graph engine to a whole-program summary. Chain elements
//! are indices into the canonical stack-id table; cloning decisions
//! land in per-allocation version arrays and per-callsite clone
//! arrays instead of touching any IR.

use crate::config::DisambiguationConfig;
use crate::errors::Result;
use crate::features::ccg::domain::graph::CallsiteContextGraph;
use crate::features::ccg::ports::CallsiteSource;
use crate::features::sources::domain::summary::{SummaryCall, SummaryFuncId, SummaryIndex};
use crate::shared::models::{memprof_clone_name, AllocationType, CallInfo, FuncInfo, StackId};
use std::collections::BTreeMap;

/// Source adapter over a whole-program summary
pub struct SummarySource {
    summary: SummaryIndex,
}

impl SummarySource {
    pub fn new(summary: SummaryIndex) -> Self {
        Self { summary }
    }

    pub fn summary(&self) -> &SummaryIndex {
        &self.summary
    }

    pub fn into_summary(self) -> SummaryIndex {
        self.summary
    }
}

impl CallsiteSource for SummarySource {
    type Func = SummaryFuncId;
    type Call = SummaryCall;

    fn stack_id(&self, id_or_index: u64) -> StackId {
        // Summary chains hold indices into the canonical table.
        self.summary.stack_id_at_index(id_or_index as u32)
    }

    fn last_stack_id(&self, call: &SummaryCall) -> StackId {
        let SummaryCall::Callsite { func, index } = call else {
            unreachable!("allocations have no interior callsite context")
        };
        let record = self.summary.callsite(*func, *index);
        let last = record
            .stack_id_indices
            .last()
            .expect("callsite context is non-empty");
        self.summary.stack_id_at_index(*last)
    }

    fn callsite_context(&self, call: &SummaryCall) -> Vec<u64> {
        match call {
            SummaryCall::Callsite { func, index } => self
                .summary
                .callsite(*func, *index)
                .stack_id_indices
                .iter()
                .map(|&idx| u64::from(idx))
                .collect(),
            // Inlined ids on the allocation were collapsed when the
            // summary was produced.
            SummaryCall::Alloc { .. } => Vec::new(),
        }
    }

    fn callee_matches_func(&self, call: &SummaryCall, func: SummaryFuncId) -> bool {
        match call {
            SummaryCall::Callsite {
                func: enclosing,
                index,
            } => self.summary.callsite(*enclosing, *index).callee == func,
            SummaryCall::Alloc { .. } => false,
        }
    }

    fn update_allocation_call(&mut self, call: &CallInfo<SummaryCall>, alloc_type: AllocationType) {
        let SummaryCall::Alloc { func, index } = call.call().expect("annotated call has a handle")
        else {
            unreachable!("allocation update on a callsite record")
        };
        let versions =
            &mut self.summary.functions[*func as usize].allocs[*index as usize].versions;
        let slot = call.clone_no() as usize;
        assert!(slot < versions.len(), "version slot exists for clone");
        versions[slot] = Some(alloc_type);
    }

    fn update_call(&mut self, caller_call: &CallInfo<SummaryCall>, callee_func: FuncInfo<SummaryFuncId>) {
        let SummaryCall::Callsite { func, index } =
            caller_call.call().expect("retargeted call has a handle")
        else {
            unreachable!("allocations do not have profiled callees")
        };
        let clones =
            &mut self.summary.functions[*func as usize].callsites[*index as usize].clones;
        let slot = caller_call.clone_no() as usize;
        assert!(slot < clones.len(), "clone slot exists for clone");
        clones[slot] = callee_func.clone_no();
    }

    fn clone_function_for_callsite(
        &mut self,
        func: FuncInfo<SummaryFuncId>,
        _call: &CallInfo<SummaryCall>,
        call_map: &mut BTreeMap<CallInfo<SummaryCall>, CallInfo<SummaryCall>>,
        calls_with_metadata: &[CallInfo<SummaryCall>],
        clone_no: u32,
    ) -> FuncInfo<SummaryFuncId> {
        // Add one version slot per record; labels and targets are
        // filled in later by the update primitives.
        for call in calls_with_metadata {
            assert_eq!(call.clone_no(), 0);
            let handle = call.call().expect("tracked call has a handle");
            match handle {
                SummaryCall::Alloc { func: f, index } => {
                    let versions =
                        &mut self.summary.functions[*f as usize].allocs[*index as usize].versions;
                    assert_eq!(versions.len(), clone_no as usize);
                    versions.push(None);
                }
                SummaryCall::Callsite { func: f, index } => {
                    let clones = &mut self.summary.functions[*f as usize].callsites
                        [*index as usize]
                        .clones;
                    assert_eq!(clones.len(), clone_no as usize);
                    clones.push(0);
                }
            }
            call_map.insert(call.clone(), CallInfo::with_clone_no(*handle, clone_no));
        }
        FuncInfo::with_clone_no(func.func(), clone_no)
    }

    fn label(&self, func: SummaryFuncId, call: &SummaryCall, clone_no: u32) -> String {
        let name = &self.summary.function(func).name;
        match call {
            SummaryCall::Alloc { .. } => format!("{name} -> alloc"),
            SummaryCall::Callsite {
                func: enclosing,
                index,
            } => {
                let record = self.summary.callsite(*enclosing, *index);
                let callee_name = &self.summary.function(record.callee).name;
                let callee_clone = record.clones.get(clone_no as usize).copied().unwrap_or(0);
                format!("{name} -> {}", memprof_clone_name(callee_name, callee_clone))
            }
        }
    }
}

impl CallsiteContextGraph<SummarySource> {
    /// Build the graph from a summary index.
    pub fn from_summary(summary: SummaryIndex, config: &DisambiguationConfig) -> Result<Self> {
        let mut graph = Self::new(SummarySource::new(summary));
        let num_funcs = graph.source().summary().functions.len();
        for func_idx in 0..num_funcs {
            let func = func_idx as SummaryFuncId;
            let mut calls_with_metadata = Vec::new();

            let num_allocs = graph.source().summary().functions[func_idx].allocs.len();
            for alloc_idx in 0..num_allocs {
                let mibs = graph.source().summary().functions[func_idx].allocs[alloc_idx]
                    .mibs
                    .clone();
                // Recursion elimination in the summary producer can
                // leave records without MIBs; skip them.
                if mibs.is_empty() {
                    continue;
                }
                let handle = SummaryCall::Alloc {
                    func,
                    index: alloc_idx as u32,
                };
                let call = CallInfo::new(handle);
                calls_with_metadata.push(call.clone());
                let alloc_node = graph.add_alloc_node(call, func);
                for mib in &mibs {
                    let raw: Vec<u64> =
                        mib.stack_id_indices.iter().map(|&idx| u64::from(idx)).collect();
                    graph.add_stack_nodes_for_mib(alloc_node, &raw, &[], mib.alloc_type);
                }
                let alloc_types = graph.node(alloc_node).alloc_types;
                assert!(!alloc_types.is_none(), "allocation carries at least one MIB");
                // Seed version 0 with the collapsed whole-allocation
                // label, so an allocation that never gets cloned keeps
                // the conservative behavior.
                graph.source_mut().summary.functions[func_idx].allocs[alloc_idx].versions[0] =
                    Some(alloc_types.effective());
            }

            let num_callsites = graph.source().summary().functions[func_idx].callsites.len();
            for callsite_idx in 0..num_callsites {
                calls_with_metadata.push(CallInfo::new(SummaryCall::Callsite {
                    func,
                    index: callsite_idx as u32,
                }));
            }

            if !calls_with_metadata.is_empty() {
                graph
                    .func_to_calls_with_metadata
                    .push((func, calls_with_metadata));
            }
        }
        graph.finish_build(config)?;
        Ok(graph)
    }
}
