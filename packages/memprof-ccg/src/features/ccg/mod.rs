//! Calling Context Graph engine
//!
//! Builds a graph of profiled allocation contexts, matches program
//! callsites onto it, clones nodes to isolate allocation behavior, and
//! maps callsite clones onto function clones.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;
