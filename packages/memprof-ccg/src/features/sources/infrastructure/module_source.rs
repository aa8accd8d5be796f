//! Live-module source adapter
//!
//! Binds the graph engine to a [`Module`]: stack ids are already
//! canonical, allocation labels become call attributes, retargets
//! rewrite the callee in place, and function clones are materialized
//! as real functions named `base.memprof.N`.

use crate::config::DisambiguationConfig;
use crate::errors::Result;
use crate::features::ccg::domain::graph::CallsiteContextGraph;
use crate::features::ccg::ports::CallsiteSource;
use crate::features::sources::domain::module::{CallRef, FuncId, Module, ModuleFunction};
use crate::shared::models::{memprof_clone_name, AllocationType, CallInfo, FuncInfo, StackId};
use std::collections::BTreeMap;

/// Source adapter over a live module
pub struct ModuleSource {
    module: Module,
}

impl ModuleSource {
    pub fn new(module: Module) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn into_module(self) -> Module {
        self.module
    }
}

impl CallsiteSource for ModuleSource {
    type Func = FuncId;
    type Call = CallRef;

    fn stack_id(&self, id_or_index: u64) -> StackId {
        // Module chains already hold canonical ids.
        id_or_index
    }

    fn last_stack_id(&self, call: &CallRef) -> StackId {
        *self
            .module
            .call(*call)
            .callsite_context
            .last()
            .expect("callsite context is non-empty")
    }

    fn callsite_context(&self, call: &CallRef) -> Vec<u64> {
        self.module.call(*call).callsite_context.clone()
    }

    fn callee_matches_func(&self, call: &CallRef, func: FuncId) -> bool {
        self.module.call(*call).callee == Some(func)
    }

    fn update_allocation_call(&mut self, call: &CallInfo<CallRef>, alloc_type: AllocationType) {
        let handle = call.call().expect("annotated call has a handle");
        self.module.call_mut(*handle).memprof_attribute = Some(alloc_type);
    }

    fn update_call(&mut self, caller_call: &CallInfo<CallRef>, callee_func: FuncInfo<FuncId>) {
        // Clone 0 is the original callee; nothing to rewrite.
        if callee_func.clone_no() == 0 {
            return;
        }
        let handle = caller_call.call().expect("retargeted call has a handle");
        self.module.call_mut(*handle).callee = Some(callee_func.func());
    }

    fn clone_function_for_callsite(
        &mut self,
        func: FuncInfo<FuncId>,
        _call: &CallInfo<CallRef>,
        call_map: &mut BTreeMap<CallInfo<CallRef>, CallInfo<CallRef>>,
        calls_with_metadata: &[CallInfo<CallRef>],
        clone_no: u32,
    ) -> FuncInfo<FuncId> {
        let base = self.module.function(func.func()).name.clone();
        let name = memprof_clone_name(&base, clone_no);
        assert!(
            self.module.function_by_name(&name).is_none(),
            "clone name already taken"
        );
        let calls = self.module.function(func.func()).calls.clone();
        let new_id = self.module.functions.len() as FuncId;
        self.module.functions.push(ModuleFunction {
            name,
            calls,
        });
        for call in calls_with_metadata {
            // The tracked list always holds the initial versions.
            assert_eq!(call.clone_no(), 0);
            let handle = call.call().expect("tracked call has a handle");
            call_map.insert(
                call.clone(),
                CallInfo::with_clone_no(CallRef::new(new_id, handle.index), clone_no),
            );
        }
        FuncInfo::with_clone_no(new_id, clone_no)
    }

    fn label(&self, func: FuncId, call: &CallRef, _clone_no: u32) -> String {
        let caller = &self.module.function(func).name;
        match self.module.call(*call).callee {
            Some(callee) => format!("{caller} -> {}", self.module.function(callee).name),
            None => format!("{caller} -> alloc"),
        }
    }
}

impl CallsiteContextGraph<ModuleSource> {
    /// Build the graph from a module: one alloc node per allocation
    /// call, stack nodes from its MIB chains, then callsite matching
    /// and multi-target sanitization.
    pub fn from_module(module: Module, config: &DisambiguationConfig) -> Result<Self> {
        let mut graph = Self::new(ModuleSource::new(module));
        let num_funcs = graph.source().module().functions.len();
        for func_idx in 0..num_funcs {
            let func = func_idx as FuncId;
            let mut calls_with_metadata = Vec::new();
            let num_calls = graph.source().module().functions[func_idx].calls.len();
            for call_idx in 0..num_calls {
                let call_ref = CallRef::new(func, call_idx as u32);
                let module_call = graph.source().module().call(call_ref).clone();
                if module_call.is_allocation() {
                    let call = CallInfo::new(call_ref);
                    calls_with_metadata.push(call.clone());
                    let alloc_node = graph.add_alloc_node(call, func);
                    for mib in &module_call.mibs {
                        graph.add_stack_nodes_for_mib(
                            alloc_node,
                            &mib.stack_ids,
                            &module_call.callsite_context,
                            mib.alloc_type,
                        );
                    }
                    assert!(
                        !graph.node(alloc_node).alloc_types.is_none(),
                        "allocation carries at least one MIB"
                    );
                } else if !module_call.callsite_context.is_empty() {
                    calls_with_metadata.push(CallInfo::new(call_ref));
                }
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
