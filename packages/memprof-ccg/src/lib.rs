/*
 * memprof-ccg - Allocation-Context Disambiguation Engine
 *
 * Feature-First Architecture:
 * - shared/   : Common models (context ids, allocation types, call/func handles)
 * - features/ : Vertical slices (ccg graph engine, source flavors)
 * - config/   : Run configuration (dump/verify/export toggles)
 *
 * Pipeline:
 *   (allocations + MIBs) -> builder -> stack matcher -> multi-target
 *   sanitizer -> cloning -> function assignment -> source updates
 *
 * The graph engine is generic over a source flavor: a live module or a
 * serialized whole-program summary. Cloning decisions are identical for
 * both; only the update primitives differ.
 */

/// Shared models and set utilities
pub mod shared;

/// Feature modules (graph engine + source flavors)
pub mod features;

/// Run configuration
pub mod config;

/// Error types
pub mod errors;

pub use config::DisambiguationConfig;
pub use errors::{MemProfError, Result};
pub use features::ccg::application::{DisambiguationOutcome, DisambiguationStats};
pub use features::ccg::domain::graph::CallsiteContextGraph;
pub use features::ccg::ports::CallsiteSource;
pub use features::sources::domain::module::{
    CallRef, FuncId, MibRecord, Module, ModuleCall, ModuleFunction,
};
pub use features::sources::domain::summary::{
    AllocRecord, CallsiteRecord, FunctionSummary, MibSummary, SummaryCall, SummaryFuncId,
    SummaryIndex,
};
pub use features::sources::infrastructure::import::import_summary;
pub use features::sources::infrastructure::module_source::ModuleSource;
pub use features::sources::infrastructure::summary_source::SummarySource;
pub use shared::models::{AllocTypes, AllocationType, CallInfo, ContextId, FuncInfo, StackId};
