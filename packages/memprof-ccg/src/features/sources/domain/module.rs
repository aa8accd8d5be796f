//! Live-module input model
//!
//! A deliberately small stand-in for a compiler module: functions with
//! profiled calls. Producing it (IR parsing, profile matching) is the
//! host's job; the engine only reads chains and writes decisions back
//! through the source port.

use crate::shared::models::{AllocationType, StackId};

/// Index of a function in the module
pub type FuncId = u32;

/// Handle of one call: enclosing function plus call index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallRef {
    pub func: FuncId,
    pub index: u32,
}

impl CallRef {
    pub fn new(func: FuncId, index: u32) -> Self {
        Self { func, index }
    }
}

/// One observed allocation context with its behavior label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MibRecord {
    /// Stack ids ordered from the allocation outward
    pub stack_ids: Vec<StackId>,

    pub alloc_type: AllocationType,
}

impl MibRecord {
    pub fn new(stack_ids: Vec<StackId>, alloc_type: AllocationType) -> Self {
        Self {
            stack_ids,
            alloc_type,
        }
    }
}

/// A call carrying profile metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleCall {
    /// Direct callee, if uniquely known
    pub callee: Option<FuncId>,

    /// The call's own context: stack ids ordered from the callsite
    /// itself outward. Longer than one entry when the call was inlined.
    pub callsite_context: Vec<StackId>,

    /// Profiled allocation contexts; non-empty marks an allocation call
    pub mibs: Vec<MibRecord>,

    /// Effective label attached by the transformation
    pub memprof_attribute: Option<AllocationType>,
}

impl ModuleCall {
    /// An allocation call with its MIBs and callsite context
    pub fn allocation(callsite_context: Vec<StackId>, mibs: Vec<MibRecord>) -> Self {
        Self {
            callee: None,
            callsite_context,
            mibs,
            memprof_attribute: None,
        }
    }

    /// An interior call with a callsite context
    pub fn callsite(callee: FuncId, callsite_context: Vec<StackId>) -> Self {
        Self {
            callee: Some(callee),
            callsite_context,
            mibs: Vec::new(),
            memprof_attribute: None,
        }
    }

    #[inline]
    pub fn is_allocation(&self) -> bool {
        !self.mibs.is_empty()
    }
}

/// Function with its profiled calls, in program order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFunction {
    pub name: String,
    pub calls: Vec<ModuleCall>,
}

impl ModuleFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Vec::new(),
        }
    }
}

/// The module being transformed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub functions: Vec<ModuleFunction>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, name: impl Into<String>) -> FuncId {
        self.functions.push(ModuleFunction::new(name));
        (self.functions.len() - 1) as FuncId
    }

    pub fn add_call(&mut self, func: FuncId, call: ModuleCall) -> CallRef {
        let calls = &mut self.functions[func as usize].calls;
        calls.push(call);
        CallRef::new(func, (calls.len() - 1) as u32)
    }

    #[inline]
    pub fn function(&self, func: FuncId) -> &ModuleFunction {
        &self.functions[func as usize]
    }

    #[inline]
    pub fn call(&self, call: CallRef) -> &ModuleCall {
        &self.functions[call.func as usize].calls[call.index as usize]
    }

    #[inline]
    pub fn call_mut(&mut self, call: CallRef) -> &mut ModuleCall {
        &mut self.functions[call.func as usize].calls[call.index as usize]
    }

    /// Function id for a name, if present
    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|idx| idx as FuncId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_construction() {
        let mut module = Module::new();
        let foo = module.add_function("foo");
        let bar = module.add_function("bar");
        let call = module.add_call(foo, ModuleCall::callsite(bar, vec![10]));

        assert_eq!(module.function(foo).name, "foo");
        assert_eq!(module.call(call).callee, Some(bar));
        assert!(!module.call(call).is_allocation());
        assert_eq!(module.function_by_name("bar"), Some(bar));
        assert_eq!(module.function_by_name("baz"), None);
    }

    #[test]
    fn test_allocation_call_marker() {
        let call = ModuleCall::allocation(
            vec![1],
            vec![MibRecord::new(vec![1, 2], AllocationType::Cold)],
        );
        assert!(call.is_allocation());
        assert!(call.callee.is_none());
    }
}
