//! Whole-program summary input model
//!
//! The serialized flavor: per-function allocation and callsite records
//! whose chains are indices into one canonical stack-id table. Cloning
//! decisions are stored into the records (version arrays on
//! allocations, clone arrays on callsites) rather than applied to any
//! IR; a backend replays them later.

use crate::errors::{MemProfError, Result};
use crate::shared::models::{AllocationType, StackId};
use serde::{Deserialize, Serialize};

/// Index of a function summary in the index
pub type SummaryFuncId = u32;

/// Handle of one summary record (allocation or interior callsite)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SummaryCall {
    Alloc { func: SummaryFuncId, index: u32 },
    Callsite { func: SummaryFuncId, index: u32 },
}

/// One observed allocation context, chain held as stack-id indices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MibSummary {
    /// Indices into the canonical stack-id table, ordered from the
    /// allocation outward
    pub stack_id_indices: Vec<u32>,

    pub alloc_type: AllocationType,
}

/// Allocation record with its per-version labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocRecord {
    pub mibs: Vec<MibSummary>,

    /// One label slot per function clone; slot 0 is the original.
    /// `None` means the version never received a label.
    #[serde(default = "default_versions")]
    pub versions: Vec<Option<AllocationType>>,
}

fn default_versions() -> Vec<Option<AllocationType>> {
    vec![None]
}

impl AllocRecord {
    pub fn new(mibs: Vec<MibSummary>) -> Self {
        Self {
            mibs,
            versions: default_versions(),
        }
    }
}

/// Interior callsite record with its per-clone callee versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallsiteRecord {
    /// Index of the callee function summary
    pub callee: SummaryFuncId,

    /// Indices into the canonical stack-id table, ordered from the
    /// callsite itself outward
    pub stack_id_indices: Vec<u32>,

    /// Callee function clone called by each clone of this callsite;
    /// slot 0 is the original, value 0 the original callee.
    #[serde(default = "default_clones")]
    pub clones: Vec<u32>,
}

fn default_clones() -> Vec<u32> {
    vec![0]
}

impl CallsiteRecord {
    pub fn new(callee: SummaryFuncId, stack_id_indices: Vec<u32>) -> Self {
        Self {
            callee,
            stack_id_indices,
            clones: default_clones(),
        }
    }
}

/// Function summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSummary {
    pub name: String,
    #[serde(default)]
    pub allocs: Vec<AllocRecord>,
    #[serde(default)]
    pub callsites: Vec<CallsiteRecord>,
}

impl FunctionSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allocs: Vec::new(),
            callsites: Vec::new(),
        }
    }
}

/// Whole-program summary index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryIndex {
    /// Canonical stack ids; chain entries index into this table
    pub stack_ids: Vec<StackId>,

    pub functions: Vec<FunctionSummary>,
}

impl SummaryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn stack_id_at_index(&self, index: u32) -> StackId {
        self.stack_ids[index as usize]
    }

    #[inline]
    pub fn function(&self, func: SummaryFuncId) -> &FunctionSummary {
        &self.functions[func as usize]
    }

    pub fn alloc(&self, func: SummaryFuncId, index: u32) -> &AllocRecord {
        &self.functions[func as usize].allocs[index as usize]
    }

    pub fn callsite(&self, func: SummaryFuncId, index: u32) -> &CallsiteRecord {
        &self.functions[func as usize].callsites[index as usize]
    }

    /// Check internal consistency of an imported index: every chain
    /// index must resolve in the stack-id table and every callsite
    /// callee must name a function.
    pub fn validate(&self) -> Result<()> {
        let stack_len = self.stack_ids.len() as u64;
        let func_len = self.functions.len() as u32;
        for (fi, func) in self.functions.iter().enumerate() {
            for alloc in &func.allocs {
                for mib in &alloc.mibs {
                    if let Some(&bad) = mib
                        .stack_id_indices
                        .iter()
                        .find(|&&idx| u64::from(idx) >= stack_len)
                    {
                        return Err(MemProfError::summary(format!(
                            "function {fi}: MIB stack id index {bad} out of range"
                        )));
                    }
                }
            }
            for callsite in &func.callsites {
                if callsite.callee >= func_len {
                    return Err(MemProfError::summary(format!(
                        "function {fi}: callee index {} out of range",
                        callsite.callee
                    )));
                }
                if let Some(&bad) = callsite
                    .stack_id_indices
                    .iter()
                    .find(|&&idx| u64::from(idx) >= stack_len)
                {
                    return Err(MemProfError::summary(format!(
                        "function {fi}: callsite stack id index {bad} out of range"
                    )));
                }
            }
        }
        Ok(())
    }
}
