//! Feature modules

/// Calling context graph engine (build, match, clone, assign)
pub mod ccg;

/// Source flavors the engine binds to (module, summary)
pub mod sources;
