//! Source capability port
//!
//! The graph engine is generic over where calls and functions come
//! from: a live module or a serialized whole-program summary. A source
//! supplies opaque handle types plus this capability set, and the
//! engine never peers behind it.

use crate::shared::models::{AllocationType, CallInfo, FuncInfo, StackId};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Capabilities the graph engine requires from a source flavor.
///
/// The update and clone primitives mutate the source; the engine calls
/// them when emitting cloning decisions.
pub trait CallsiteSource {
    /// Opaque function handle
    type Func: Copy + Eq + Ord + Hash + Debug;

    /// Opaque call handle
    type Call: Clone + Eq + Ord + Hash + Debug;

    /// Canonical stack id for a raw chain element (for a live module
    /// this is the identity; for a summary it resolves an index into
    /// the canonical stack id table).
    fn stack_id(&self, id_or_index: u64) -> StackId;

    /// Outermost raw stack id of the call's own callsite context
    fn last_stack_id(&self, call: &Self::Call) -> StackId;

    /// The call's callsite context as raw chain elements, ordered from
    /// the callsite itself outward. Empty for calls without context.
    fn callsite_context(&self, call: &Self::Call) -> Vec<u64>;

    /// True if the call targets the given function
    fn callee_matches_func(&self, call: &Self::Call, func: Self::Func) -> bool;

    /// Record the effective allocation label on an allocation call clone
    fn update_allocation_call(&mut self, call: &CallInfo<Self::Call>, alloc_type: AllocationType);

    /// Retarget a call clone at the given callee function clone
    fn update_call(&mut self, caller_call: &CallInfo<Self::Call>, callee_func: FuncInfo<Self::Func>);

    /// Produce clone `clone_no` of `func`, recording into `call_map`
    /// the mapping from each tracked original call to its version in
    /// the new clone.
    fn clone_function_for_callsite(
        &mut self,
        func: FuncInfo<Self::Func>,
        call: &CallInfo<Self::Call>,
        call_map: &mut BTreeMap<CallInfo<Self::Call>, CallInfo<Self::Call>>,
        calls_with_metadata: &[CallInfo<Self::Call>],
        clone_no: u32,
    ) -> FuncInfo<Self::Func>;

    /// Human-readable label for diagnostics and dot output
    fn label(&self, func: Self::Func, call: &Self::Call, clone_no: u32) -> String;
}
