//! Shared builders for scenario tests

#![allow(dead_code)]

use memprof_ccg::{
    AllocationType, CallRef, FuncId, MibRecord, Module, ModuleCall, SummaryFuncId, SummaryIndex,
};

pub fn cold(stack_ids: &[u64]) -> MibRecord {
    MibRecord::new(stack_ids.to_vec(), AllocationType::Cold)
}

pub fn not_cold(stack_ids: &[u64]) -> MibRecord {
    MibRecord::new(stack_ids.to_vec(), AllocationType::NotCold)
}

/// An allocation call with no inlining context of its own
pub fn alloc(mibs: Vec<MibRecord>) -> ModuleCall {
    ModuleCall::allocation(Vec::new(), mibs)
}

/// An allocation call inlined through the given frames
pub fn inlined_alloc(callsite_context: &[u64], mibs: Vec<MibRecord>) -> ModuleCall {
    ModuleCall::allocation(callsite_context.to_vec(), mibs)
}

pub fn call(callee: FuncId, callsite_context: &[u64]) -> ModuleCall {
    ModuleCall::callsite(callee, callsite_context.to_vec())
}

/// Name of the callee a call currently targets
pub fn callee_name(module: &Module, call: CallRef) -> String {
    let callee = module.call(call).callee.expect("call has a callee");
    module.function(callee).name.clone()
}

pub fn attribute_of(module: &Module, call: CallRef) -> Option<AllocationType> {
    module.call(call).memprof_attribute
}

/// Summary builders

pub fn summary_mib(indices: &[u32], alloc_type: AllocationType) -> memprof_ccg::MibSummary {
    memprof_ccg::MibSummary {
        stack_id_indices: indices.to_vec(),
        alloc_type,
    }
}

pub fn summary_with_stack_ids(stack_ids: &[u64]) -> SummaryIndex {
    let mut index = SummaryIndex::new();
    index.stack_ids = stack_ids.to_vec();
    index
}

pub fn add_summary_function(index: &mut SummaryIndex, name: &str) -> SummaryFuncId {
    index
        .functions
        .push(memprof_ccg::FunctionSummary::new(name));
    (index.functions.len() - 1) as SummaryFuncId
}
