//! Core identifier and label types
//!
//! Context ids are minted per observed allocation context (one per
//! MIB), monotonically from zero per run. Stack ids are canonical
//! frame identifiers supplied by the source flavor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique id for one observed (stack chain, label) context
pub type ContextId = u32;

/// Canonical id of a single frame position in call contexts
pub type StackId = u64;

/// Behavior label of a single profiled context
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AllocationType {
    NotCold = 1,
    Cold = 2,
}

impl AllocationType {
    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for AllocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationType::NotCold => write!(f, "notcold"),
            AllocationType::Cold => write!(f, "cold"),
        }
    }
}

/// OR of allocation-type labels across a set of contexts
///
/// Formed by ORing `AllocationType` bits; `NONE` means no contexts.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocTypes(u8);

impl AllocTypes {
    pub const NONE: AllocTypes = AllocTypes(0);
    pub const NOT_COLD: AllocTypes = AllocTypes(1);
    pub const COLD: AllocTypes = AllocTypes(2);
    pub const BOTH: AllocTypes = AllocTypes(3);

    #[inline]
    pub fn of(ty: AllocationType) -> Self {
        AllocTypes(ty.bits())
    }

    #[inline]
    pub fn insert(&mut self, ty: AllocationType) {
        self.0 |= ty.bits();
    }

    #[inline]
    pub fn union(self, other: AllocTypes) -> AllocTypes {
        AllocTypes(self.0 | other.0)
    }

    #[inline]
    pub fn union_with(&mut self, other: AllocTypes) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// True when exactly one label is present
    #[inline]
    pub fn is_single(self) -> bool {
        self.0.count_ones() == 1
    }

    /// The label to actually apply at a callsite.
    ///
    /// A context mixing both labels falls back to `NotCold`; cloning to
    /// separate `NotCold|Cold` from `NotCold` yields no benefit, so the
    /// mixed form collapses. Must not be called on `NONE`.
    #[inline]
    pub fn effective(self) -> AllocationType {
        assert!(!self.is_none(), "no allocation type to collapse");
        if self == AllocTypes::COLD {
            AllocationType::Cold
        } else {
            AllocationType::NotCold
        }
    }

    /// Sort key used when ordering caller edges for cloning.
    ///
    /// Cold first, then mixed, then NotCold last so the original node
    /// keeps the fallback behavior for untracked callers.
    #[inline]
    pub fn cloning_priority(self) -> u8 {
        match self.0 {
            2 => 1, // Cold
            3 => 2, // NotCold|Cold
            0 => 3, // None (never expected on a live edge)
            _ => 4, // NotCold
        }
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl fmt::Debug for AllocTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for AllocTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "None"),
            1 => write!(f, "NotCold"),
            2 => write!(f, "Cold"),
            _ => write!(f, "NotColdCold"),
        }
    }
}

/// A call handle plus clone number
///
/// `call == None` marks a node created from a profiled stack id with no
/// matching callsite in the current program, or one neutralized by the
/// multi-target sanitizer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallInfo<C> {
    call: Option<C>,
    clone_no: u32,
}

impl<C> CallInfo<C> {
    pub fn new(call: C) -> Self {
        Self {
            call: Some(call),
            clone_no: 0,
        }
    }

    pub fn with_clone_no(call: C, clone_no: u32) -> Self {
        Self {
            call: Some(call),
            clone_no,
        }
    }

    /// A cleared binding
    pub fn none() -> Self {
        Self {
            call: None,
            clone_no: 0,
        }
    }

    #[inline]
    pub fn call(&self) -> Option<&C> {
        self.call.as_ref()
    }

    #[inline]
    pub fn has_call(&self) -> bool {
        self.call.is_some()
    }

    #[inline]
    pub fn clone_no(&self) -> u32 {
        self.clone_no
    }

    pub fn set_clone_no(&mut self, clone_no: u32) {
        self.clone_no = clone_no;
    }

    /// Same handle at clone number zero (the original version)
    pub fn at_original(&self) -> Self
    where
        C: Clone,
    {
        Self {
            call: self.call.clone(),
            clone_no: 0,
        }
    }
}

impl<C> Default for CallInfo<C> {
    fn default() -> Self {
        Self::none()
    }
}

/// A function handle plus clone number; clone 0 is the original
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncInfo<F> {
    func: F,
    clone_no: u32,
}

impl<F: Copy> FuncInfo<F> {
    pub fn original(func: F) -> Self {
        Self { func, clone_no: 0 }
    }

    pub fn with_clone_no(func: F, clone_no: u32) -> Self {
        Self { func, clone_no }
    }

    #[inline]
    pub fn func(&self) -> F {
        self.func
    }

    #[inline]
    pub fn clone_no(&self) -> u32 {
        self.clone_no
    }
}

/// Name for clone `clone_no` of function `base`; clone 0 keeps the
/// original name.
pub fn memprof_clone_name(base: &str, clone_no: u32) -> String {
    if clone_no == 0 {
        base.to_string()
    } else {
        format!("{base}.memprof.{clone_no}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_types_or() {
        let mut types = AllocTypes::NONE;
        types.insert(AllocationType::NotCold);
        assert_eq!(types, AllocTypes::NOT_COLD);
        assert!(types.is_single());

        types.insert(AllocationType::Cold);
        assert_eq!(types, AllocTypes::BOTH);
        assert!(!types.is_single());
    }

    #[test]
    fn test_effective_label_collapses_mixed() {
        assert_eq!(AllocTypes::COLD.effective(), AllocationType::Cold);
        assert_eq!(AllocTypes::NOT_COLD.effective(), AllocationType::NotCold);
        // Mixed contexts fall back to the non-cold behavior.
        assert_eq!(AllocTypes::BOTH.effective(), AllocationType::NotCold);
    }

    #[test]
    fn test_cloning_priority_orders_cold_first() {
        assert!(AllocTypes::COLD.cloning_priority() < AllocTypes::BOTH.cloning_priority());
        assert!(AllocTypes::BOTH.cloning_priority() < AllocTypes::NOT_COLD.cloning_priority());
    }

    #[test]
    fn test_clone_name() {
        assert_eq!(memprof_clone_name("foo", 0), "foo");
        assert_eq!(memprof_clone_name("foo", 2), "foo.memprof.2");
    }

    #[test]
    fn test_call_info_binding() {
        let mut call: CallInfo<u32> = CallInfo::new(7);
        assert!(call.has_call());
        assert_eq!(call.clone_no(), 0);
        call.set_clone_no(3);
        assert_eq!(call.at_original().clone_no(), 0);
        assert!(!CallInfo::<u32>::none().has_call());
    }
}
