//! Run configuration
//!
//! Debugging and verification toggles for the disambiguation pipeline.
//! All options are off by default.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Disambiguation pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisambiguationConfig {
    /// Dump the graph to the log after each major stage
    pub dump_graph: bool,

    /// Run invariant checks on the whole graph after each major stage
    pub verify_graph: bool,

    /// Run invariant checks on every node touched during cloning
    pub verify_nodes: bool,

    /// Write dot files after each major stage, using this path prefix
    pub dot_file_path_prefix: Option<PathBuf>,

    /// Summary file to import for the summary flavor (consumed by the
    /// import shim, not by the graph engine)
    pub import_summary_path: Option<PathBuf>,
}

impl DisambiguationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dump_graph(mut self, enable: bool) -> Self {
        self.dump_graph = enable;
        self
    }

    pub fn with_verify_graph(mut self, enable: bool) -> Self {
        self.verify_graph = enable;
        self
    }

    pub fn with_verify_nodes(mut self, enable: bool) -> Self {
        self.verify_nodes = enable;
        self
    }

    pub fn with_dot_file_path_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.dot_file_path_prefix = Some(prefix.into());
        self
    }

    /// True if dot export is requested
    pub fn export_dot(&self) -> bool {
        self.dot_file_path_prefix.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_off() {
        let config = DisambiguationConfig::new();
        assert!(!config.dump_graph);
        assert!(!config.verify_graph);
        assert!(!config.verify_nodes);
        assert!(!config.export_dot());
        assert!(config.import_summary_path.is_none());
    }

    #[test]
    fn test_builder_toggles() {
        let config = DisambiguationConfig::new()
            .with_verify_graph(true)
            .with_dot_file_path_prefix("/tmp/ccg-");
        assert!(config.verify_graph);
        assert!(config.export_dot());
    }
}
