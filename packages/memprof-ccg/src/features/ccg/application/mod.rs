//! Pipeline orchestration
//!
//! Stage order: build -> match -> sanitize (done during construction),
//! then clone -> assign here. Dumps, invariant checks and dot exports
//! run at stage boundaries per the configuration.

use crate::config::DisambiguationConfig;
use crate::errors::Result;
use crate::features::ccg::domain::graph::CallsiteContextGraph;
use crate::features::ccg::ports::CallsiteSource;
use tracing::{debug, info};

pub use crate::features::ccg::domain::graph::DisambiguationStats;

/// Result of running the transformation
#[derive(Debug, Clone)]
pub struct DisambiguationOutcome {
    /// True if any function clone was created
    pub changed: bool,

    pub stats: DisambiguationStats,
}

impl<S: CallsiteSource> CallsiteContextGraph<S> {
    /// Shared tail of graph construction: dump the freshly built graph
    /// if requested, then match callsites and neutralize multi-target
    /// calls.
    pub(crate) fn finish_build(&mut self, config: &DisambiguationConfig) -> Result<()> {
        if config.dump_graph {
            debug!("CCG before updating call stack chains:\n{self}");
        }
        if let Some(prefix) = &config.dot_file_path_prefix {
            self.export_to_dot("prestackupdate", prefix)?;
        }
        if config.verify_graph {
            self.verify();
        }

        self.update_stack_nodes();
        self.handle_callsites_with_multiple_targets();
        Ok(())
    }

    /// Run cloning and function assignment on the built graph.
    pub fn process(&mut self, config: &DisambiguationConfig) -> Result<DisambiguationOutcome> {
        self.stage_boundary("postbuild", config, config.verify_graph)?;

        self.identify_clones(config.verify_nodes);

        self.stage_boundary("cloned", config, config.verify_graph)?;

        let changed = self.assign_functions();

        self.stage_boundary("clonefuncassign", config, false)?;

        info!(
            changed,
            function_clones = self.stats().function_clones,
            node_clones = self.stats().node_clones,
            "context disambiguation finished"
        );
        Ok(DisambiguationOutcome {
            changed,
            stats: self.stats().clone(),
        })
    }

    fn stage_boundary(
        &self,
        stage: &str,
        config: &DisambiguationConfig,
        verify: bool,
    ) -> Result<()> {
        if config.dump_graph {
            debug!("CCG at {stage}:\n{self}");
        }
        if let Some(prefix) = &config.dot_file_path_prefix {
            self.export_to_dot(stage, prefix)?;
        }
        if verify {
            self.verify();
        }
        Ok(())
    }
}
