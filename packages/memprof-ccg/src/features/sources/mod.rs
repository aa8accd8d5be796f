//! Source flavors
//!
//! Two instantiations of the graph engine's source port: a live module
//! (calls updated in place, functions cloned as real entities) and a
//! whole-program summary (decisions stored into per-allocation version
//! arrays and per-callsite clone arrays, to be applied later by a
//! backend).

pub mod domain;
pub mod infrastructure;
